//! Request and response envelopes of the public HTTP surface.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use zipline_core::UrlMetadata;
use zipline_service::CreatedUrl;

#[derive(Debug, Deserialize)]
pub struct CreateUrlRequest {
    pub url: String,
    pub custom_alias: Option<String>,
    pub expire_at: Option<Timestamp>,
    pub created_by: Option<String>,
    pub metadata: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateUrlResponse {
    pub code: String,
    pub short_url: String,
    pub long_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<CreatedUrl> for CreateUrlResponse {
    fn from(created: CreatedUrl) -> Self {
        Self {
            code: created.code.to_string(),
            short_url: created.short_url,
            long_url: created.long_url,
            expire_at: created.expire_at,
            created_at: created.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct UrlMetadataResponse {
    pub code: String,
    pub long_url: String,
    pub created_at: Timestamp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expire_at: Option<Timestamp>,
    pub total_clicks: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_access_at: Option<Timestamp>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_access_at: Option<Timestamp>,
}

impl From<UrlMetadata> for UrlMetadataResponse {
    fn from(metadata: UrlMetadata) -> Self {
        Self {
            code: metadata.code.to_string(),
            long_url: metadata.long_url,
            created_at: metadata.created_at,
            expire_at: metadata.expire_at,
            total_clicks: metadata.total_clicks,
            first_access_at: metadata.first_access_at,
            last_access_at: metadata.last_access_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeleteUrlResponse {
    pub message: String,
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct CleanupResponse {
    pub message: String,
    pub timestamp: Timestamp,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: Timestamp,
    pub services: BTreeMap<&'static str, &'static str>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: &'static str,
    pub message: String,
}
