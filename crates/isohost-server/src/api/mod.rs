//! HTTP endpoints of the sample application
//!
//! Small read-only surface used to check that a host runs against its own
//! catalog: the current site, baseline settings and feature state.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use isohost_core::platform::{Feature, Platform, SiteInfo};
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// Error body returned by the endpoints
#[derive(Debug, Serialize)]
pub struct ApiError {
    /// Error message
    pub error: String,
    #[serde(skip)]
    status: StatusCode,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status,
        }
    }
}

impl From<isohost_core::Error> for ApiError {
    fn from(e: isohost_core::Error) -> Self {
        let status = match e {
            isohost_core::Error::CatalogNotFound(_) | isohost_core::Error::TableNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}

/// Router over a platform
pub fn router() -> Router<Platform> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/site", get(current_site))
        .route("/settings/{key}", get(setting))
        .route("/features", get(features))
}

async fn index() -> Json<Value> {
    Json(json!({
        "name": "isohost",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(State(platform): State<Platform>) -> Json<Value> {
    let catalog = platform.open_catalog().map(|s| s.catalog().to_string()).ok();
    let status = if catalog.is_some() { "healthy" } else { "degraded" };
    Json(json!({
        "status": status,
        "catalog": catalog,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

async fn current_site(State(platform): State<Platform>) -> Result<Json<SiteInfo>, ApiError> {
    let name = platform
        .current_site()
        .map(|site| site.site_name)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "No current site"))?;

    // Read through the catalog so the response reflects the stored record
    let session = platform.open_catalog()?;
    SiteInfo::get(&session, &name)?
        .map(Json)
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Site '{}' not found", name)))
}

async fn setting(
    State(platform): State<Platform>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let session = platform.open_catalog()?;
    let value = session
        .get_record::<Value>("settings", &key)?
        .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, format!("Setting '{}' not found", key)))?;
    Ok(Json(json!({ "key": key, "value": value })))
}

async fn features(State(platform): State<Platform>) -> Json<BTreeMap<String, bool>> {
    let switches = platform.features();
    Json(
        Feature::REQUEST_SCOPED
            .iter()
            .map(|f| (f.to_string(), switches.is_enabled(*f)))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use isohost_core::testing::setup_test_platform;
    use tower::ServiceExt;

    async fn body_json(body: Body) -> Value {
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_index() {
        let (platform, _engine, _ctx) = setup_test_platform(&[]).unwrap();
        let response = router()
            .with_state(platform)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response.into_body()).await["name"], "isohost");
    }

    #[tokio::test]
    async fn test_site_without_current_site() {
        let (platform, _engine, _ctx) = setup_test_platform(&[]).unwrap();
        let response = router()
            .with_state(platform)
            .oneshot(Request::builder().uri("/site").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_health_degraded_without_catalog() {
        let (platform, _engine, _ctx) = setup_test_platform(&[]).unwrap();
        let response = router()
            .with_state(platform)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response.into_body()).await["status"], "degraded");
    }
}
