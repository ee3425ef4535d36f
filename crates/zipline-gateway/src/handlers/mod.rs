pub mod admin;
pub mod health;
pub mod links;
pub mod redirect;
