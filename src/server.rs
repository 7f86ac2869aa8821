use crate::config::Config;
use crate::db::Database;
use crate::error::{Error, ErrorKind};
use crate::handlers::{self, RowCount};
use crate::models::{
    ComparisonTable, EvaluationRow, EvaluationRowUpdate, NewComparisonTable, NewEvaluationRow,
};
use crate::voting::TallyResult;
use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub database: Arc<Database>,
    pub list_limit_max: u32,
}

impl AppState {
    pub fn new(database: Arc<Database>, config: &Config) -> Self {
        Self {
            database,
            list_limit_max: config.list_limit_max,
        }
    }
}

// Boundary wrapper turning crate errors into JSON responses
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(Error::invalid(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self(Error::invalid(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = match kind {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidArgument => StatusCode::BAD_REQUEST,
            ErrorKind::Persistence => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if kind == ErrorKind::Persistence {
            error!("Request failed: {}", self.0);
        } else {
            warn!("Request rejected ({}): {}", kind, self.0);
        }

        let body = serde_json::json!({
            "error": { "kind": kind.as_str(), "message": self.0.to_string() }
        });
        (status, Json(body)).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CountQuery {
    vote: Option<String>,
}

#[derive(Debug, Serialize)]
struct VotesData {
    votes_data: TallyResult,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/comparison_tables",
            post(create_comparison_table).get(list_comparison_tables),
        )
        .route("/comparison_tables/{table_id}", get(get_comparison_table))
        .route(
            "/comparison_tables/{table_id}/evaluation_row",
            post(create_evaluation_row),
        )
        .route(
            "/comparison_tables/{table_id}/evaluation_row/{row_id}",
            put(update_evaluation_row),
        )
        .route(
            "/comparison_tables/{table_id}/evaluation_rows/count",
            get(count_evaluation_rows),
        )
        .route("/comparison_tables/{table_id}/votes_data", get(fetch_votes_data))
        .with_state(state)
}

pub async fn run(state: AppState, config: &Config) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received, draining requests");
}

async fn create_comparison_table(
    State(state): State<AppState>,
    payload: Result<Json<NewComparisonTable>, JsonRejection>,
) -> Result<Json<ComparisonTable>, ApiError> {
    let Json(request) = payload?;
    let table = handlers::create_comparison_table(state.database.as_ref(), request).await?;
    Ok(Json(table))
}

async fn list_comparison_tables(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<ComparisonTable>>, ApiError> {
    let Query(query) = query?;
    let tables =
        handlers::list_comparison_tables(state.database.as_ref(), query.limit, state.list_limit_max)
            .await?;
    Ok(Json(tables))
}

async fn get_comparison_table(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
) -> Result<Json<ComparisonTable>, ApiError> {
    let table = handlers::get_comparison_table(state.database.as_ref(), &table_id).await?;
    Ok(Json(table))
}

async fn create_evaluation_row(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    payload: Result<Json<NewEvaluationRow>, JsonRejection>,
) -> Result<Json<EvaluationRow>, ApiError> {
    let Json(fields) = payload?;
    let row = handlers::create_evaluation_row(state.database.as_ref(), &table_id, fields).await?;
    Ok(Json(row))
}

async fn update_evaluation_row(
    State(state): State<AppState>,
    Path((table_id, row_id)): Path<(String, String)>,
    payload: Result<Json<EvaluationRowUpdate>, JsonRejection>,
) -> Result<Json<EvaluationRow>, ApiError> {
    let Json(update) = payload?;
    let row =
        handlers::update_evaluation_row_vote(state.database.as_ref(), &table_id, &row_id, update)
            .await?;
    Ok(Json(row))
}

async fn count_evaluation_rows(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
    query: Result<Query<CountQuery>, QueryRejection>,
) -> Result<Json<RowCount>, ApiError> {
    let Query(query) = query?;
    let count =
        handlers::count_evaluation_rows(state.database.as_ref(), &table_id, query.vote).await?;
    Ok(Json(count))
}

async fn fetch_votes_data(
    State(state): State<AppState>,
    Path(table_id): Path<String>,
) -> Result<Json<VotesData>, ApiError> {
    let votes_data = handlers::fetch_votes_data(state.database.as_ref(), &table_id).await?;
    Ok(Json(VotesData { votes_data }))
}
