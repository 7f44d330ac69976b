//! HTTP routes for the query server.
//!
//! Every query answers `200` with either `{"data": ...}` or `{"error": "..."}`;
//! clients inspect the body rather than the status code.

use crate::error::AppError;
use crate::services::query::{AwaitedReviews, PullRequestList, QueryService, StatusReport};
use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;

// ── Response envelope ────────────────────────────────────────────────────────

/// `{"data": T}` or `{"error": message}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope<T> {
    Data(T),
    Error(String),
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

impl<T> From<Result<T, AppError>> for Envelope<T> {
    fn from(result: Result<T, AppError>) -> Self {
        match result {
            Ok(data) => Envelope::Data(data),
            Err(e) => {
                log::debug!("[server] Query rejected: {}", e);
                Envelope::Error(e.to_string())
            }
        }
    }
}

// ── Query parameter types ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserQuery {
    username: Option<String>,
}

/// Username from the query string, or the envelope to answer with.
fn username<T>(
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Result<Option<String>, Envelope<T>> {
    query
        .map(|Query(q)| q.username)
        .map_err(|rejection| Envelope::Error(rejection.body_text()))
}

// ── Routes ───────────────────────────────────────────────────────────────────

/// Build the query router with permissive CORS.
pub fn api_routes(query: QueryService) -> Router {
    Router::new()
        .route("/pull-requests", get(get_pull_requests))
        .route("/awaited-reviews", get(get_awaited_reviews))
        .route("/status", get(get_status))
        .fallback(not_found)
        .layer(CorsLayer::permissive())
        .with_state(query)
}

async fn get_pull_requests(
    State(service): State<QueryService>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Envelope<PullRequestList> {
    match username(query) {
        Ok(username) => service.find_prs_for_user(username.as_deref()).into(),
        Err(envelope) => envelope,
    }
}

async fn get_awaited_reviews(
    State(service): State<QueryService>,
    query: Result<Query<UserQuery>, QueryRejection>,
) -> Envelope<AwaitedReviews> {
    match username(query) {
        Ok(username) => service.awaited_review_count(username.as_deref()).into(),
        Err(envelope) => envelope,
    }
}

async fn get_status(State(service): State<QueryService>) -> Envelope<StatusReport> {
    Envelope::Data(service.status())
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(Envelope::<()>::Error("not found".to_string())),
    )
        .into_response()
}
