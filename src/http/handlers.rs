//! Request handlers.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use mongodb::bson::Document;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::{Value, json};
use tracing::debug;

use super::{ApiError, AppState};
use crate::cache::FlushOutcome;
use crate::model::Model;

/// Body of `POST /query`.
///
/// A present `pipeline` selects an aggregation and the filter fields are
/// ignored. Values may use extended JSON (`{"$oid": ...}`,
/// `{"$regularExpression": ...}`).
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub entity: String,
    #[serde(default)]
    pub conditions: Document,
    #[serde(default)]
    pub projection: Document,
    #[serde(default)]
    pub options: Document,
    #[serde(default)]
    pub pipeline: Option<Vec<Document>>,
    #[serde(default)]
    pub single: bool,
    /// Present to cache the result.
    #[serde(default)]
    pub cache: Option<CacheRequest>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheRequest {
    pub key: Option<String>,
    /// Seconds until expiry. `false` or absent means no expiry.
    #[serde(default, deserialize_with = "ttl_or_false")]
    pub ttl: Option<u64>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TtlField {
    Seconds(u64),
    Flag(bool),
}

fn ttl_or_false<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<TtlField>::deserialize(deserializer)? {
        Some(TtlField::Seconds(seconds)) => Ok(Some(seconds)),
        Some(TtlField::Flag(false)) | None => Ok(None),
        Some(TtlField::Flag(true)) => Err(D::Error::custom(
            "ttl must be a number of seconds or false",
        )),
    }
}

/// POST /query
pub async fn run_query(
    State(state): State<Arc<AppState>>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<Value>, ApiError> {
    if request.entity.trim().is_empty() {
        return Err(ApiError::bad_request("entity must not be empty"));
    }

    let model = Model::new(request.entity, state.executor.clone());
    let mut pending = match request.pipeline {
        Some(pipeline) => model.aggregate(pipeline),
        None if request.single => model.find_one(request.conditions).select(request.projection),
        None => model.find(request.conditions).select(request.projection),
    }
    .options(request.options);

    if let Some(cache) = request.cache {
        pending = pending.cache(cache.key, cache.ttl);
    }

    debug!(entity = model.name(), "Running query");
    let result = pending.exec().await?;
    Ok(Json(result))
}

/// DELETE /cache/:entity
pub async fn flush_cache(
    State(state): State<Arc<AppState>>,
    Path(entity): Path<String>,
) -> Json<FlushOutcome> {
    Json(Model::new(entity, state.executor.clone()).flush_cache().await)
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let engine = state.executor.engine();
    let connection = engine.connection();
    Json(json!({
        "status": "ok",
        "cache": {
            "backend": connection.backend().name(),
            "state": connection.state(),
            "stats": engine.stats().snapshot(),
        },
    }))
}
