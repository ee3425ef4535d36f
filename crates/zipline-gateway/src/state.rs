use crate::limit::AdmissionController;
use std::sync::Arc;
use typed_builder::TypedBuilder;
use zipline_cache::RedisCache;
use zipline_service::LinkService;
use zipline_storage::PostgresStore;

/// The concrete service type this gateway fronts.
pub type Service = LinkService<PostgresStore, RedisCache>;

/// Shared application state handed to every handler.
#[derive(Clone, TypedBuilder)]
pub struct AppState {
    /// The lookup/mutation service.
    pub service: Arc<Service>,
    /// Admission control for the whole surface.
    pub limiter: Arc<AdmissionController>,
}
