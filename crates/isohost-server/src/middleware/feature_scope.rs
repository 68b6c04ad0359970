//! Request-scoped feature suppression
//!
//! Test requests must not trigger search indexing, web farm traffic, e-mail
//! or other work that outlives the request. The guard taken here is released
//! on every exit path of the request future, including errors, panics and
//! cancellation.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use isohost_core::platform::{Feature, FeatureSwitches};
use std::sync::Arc;

/// Suppress [`Feature::REQUEST_SCOPED`] for the duration of the request
pub async fn feature_scope(
    State(switches): State<Arc<FeatureSwitches>>,
    request: Request,
    next: Next,
) -> Response {
    let _guard = FeatureSwitches::suppress(&switches, &Feature::REQUEST_SCOPED);
    next.run(request).await
}
