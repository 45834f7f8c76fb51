use axum::{
    routing::get,
    Router,
    extract::{Json, Query, State},
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use std::time::Instant;
use tracing::{info, warn};

use crate::api::models::{RoastRequest, RoastResponse};
use crate::api::response;
use crate::AppState;

pub fn create_router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/roast", get(roast_query_handler).post(roast_handler))
        .route("/api/cache/stats", get(cache_stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(app_state)
}

async fn roast_handler(
    State(state): State<AppState>,
    payload: Result<Json<RoastRequest>, JsonRejection>,
) -> Response {
    match payload {
        Ok(Json(req)) => process_roast_request(&state, &req).await,
        Err(rejection) => bad_request(rejection.body_text()),
    }
}

/// Same computation as the POST form; a miss or an expired entry recomputes.
async fn roast_query_handler(
    State(state): State<AppState>,
    query: Result<Query<RoastRequest>, QueryRejection>,
) -> Response {
    match query {
        Ok(Query(req)) => process_roast_request(&state, &req).await,
        Err(rejection) => bad_request(rejection.body_text()),
    }
}

/// Malformed input still gets the `{data, meta}` envelope.
fn bad_request(message: String) -> Response {
    warn!(%message, "rejected roast request");
    response::error::<()>(StatusCode::BAD_REQUEST, message).into_response()
}

async fn process_roast_request(state: &AppState, req: &RoastRequest) -> Response {
    info!(url = %req.url, "processing roast request");
    let start_time = Instant::now();

    let result = state.service.roast(&req.url).await;
    let elapsed = start_time.elapsed();

    match result {
        Ok(result) => {
            info!(url = %req.url, cached = result.cached, ?elapsed, "roast request succeeded");
            response::success(RoastResponse::from(result))
                .with_elapsed(elapsed)
                .into_response()
        }
        Err(err) => {
            warn!(url = %req.url, error = %err, ?elapsed, "roast request failed");
            err.into_response()
        }
    }
}

async fn cache_stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    response::success(state.service.cache().stats())
}
