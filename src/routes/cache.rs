//! Result-cache maintenance endpoints.

use crate::cache::{CacheStats, MessageCache};
use crate::error::ApiError;
use rocket::{State, get, post, serde::json::Json};
use rocket_okapi::okapi::schemars::JsonSchema;
use rocket_okapi::openapi;
use serde::Serialize;
use std::sync::Arc;

/// Generic acknowledgement.
#[derive(Debug, Serialize, JsonSchema)]
pub struct MessageResponse {
    /// Response text.
    pub message: String,
}

/// Entry count and stored size of the result cache.
#[openapi(tag = "Cache")]
#[get("/cache/stats")]
pub async fn cache_stats(cache: &State<Arc<MessageCache>>) -> Result<Json<CacheStats>, ApiError> {
    Ok(Json(cache.stats().await?))
}

/// Delete every cached result and compact the store.
#[openapi(tag = "Cache")]
#[post("/cache/clear")]
pub async fn clear_cache(
    cache: &State<Arc<MessageCache>>,
) -> Result<Json<MessageResponse>, ApiError> {
    cache.clear().await?;
    Ok(Json(MessageResponse {
        message: "cache_cleared".to_string(),
    }))
}
