//! JSON HTTP surface over the query service, resolver, explorer and sync
//! engine.

use crate::chain::BlockLookup;
use crate::error::{PageError, QueryError, ResolveError, SourceError};
use crate::explorer::Explorer;
use crate::query::{Page, PageRequest, QueryService};
use crate::resolver::AddressResolver;
use crate::sync::SyncEngine;
use alloy_primitives::{Address, B256};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, warn};

const DEFAULT_PAGE_SIZE: u64 = 10;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Clone)]
pub struct AppState {
    pub query: Arc<QueryService>,
    pub resolver: Arc<AddressResolver>,
    pub explorer: Arc<Explorer>,
    pub sync: Arc<SyncEngine>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/transactions", get(list_transactions))
        .route("/blocks", get(list_blocks))
        .route("/blocks/:id", get(block_detail))
        .route("/tx/:hash", get(transaction_detail))
        .route("/address/:address", get(address_activity))
        .route("/address/:address/transactions", get(address_transactions))
        .route("/search", get(search))
        .route("/stats", get(stats))
        .route("/sync", get(trigger_sync).post(trigger_sync))
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    /// The chain source failed or returned unusable data.
    Upstream(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Upstream(message) => {
                warn!("Upstream failure: {}", message);
                (StatusCode::BAD_GATEWAY, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<SourceError> for ApiError {
    fn from(error: SourceError) -> Self {
        ApiError::Upstream(error.to_string())
    }
}

impl From<QueryError> for ApiError {
    fn from(error: QueryError) -> Self {
        match error {
            QueryError::InvalidPage(e) => ApiError::BadRequest(e.to_string()),
            other @ QueryError::FallbackFailed { .. } => ApiError::Upstream(other.to_string()),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::InvalidPage(e) => ApiError::BadRequest(e.to_string()),
            ResolveError::Source(error) => error.into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageParams {
    pub page: Option<u64>,
    pub page_size: Option<u64>,
}

impl PageParams {
    /// Defaults to the first page of ten; oversized pages are clamped.
    fn request<E: From<PageError>>(&self) -> Result<PageRequest, E> {
        let page = self.page.unwrap_or(1);
        let page_size = self.page_size.unwrap_or(DEFAULT_PAGE_SIZE).min(MAX_PAGE_SIZE);
        Ok(PageRequest::new(page, page_size)?)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: String,
}

/// `{ <items_key>, pagination: { currentPage, totalPages, <total_key>, estimated }, source }`
fn page_body<T: Serialize>(page: Page<T>, items_key: &str, total_key: &str) -> Value {
    json!({
        items_key: page.items,
        "pagination": {
            "currentPage": page.pagination.current_page,
            "totalPages": page.pagination.total_pages,
            total_key: page.pagination.total_items,
            "estimated": page.pagination.estimated,
        },
        "source": page.source,
    })
}

fn parse_address(raw: &str) -> Result<Address, ApiError> {
    Address::from_str(raw).map_err(|_| ApiError::BadRequest(format!("Invalid address: {raw}")))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_transactions(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, ApiError> {
    let request = params.request::<QueryError>()?;
    let page = state.query.list_transactions(request).await?;
    Ok(Json(page_body(page, "transactions", "totalTransactions")))
}

async fn list_blocks(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, ApiError> {
    let request = params.request::<QueryError>()?;
    let page = state.query.list_blocks(request).await?;
    Ok(Json(page_body(page, "blocks", "totalBlocks")))
}

async fn block_detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let lookup = BlockLookup::from_str(&id).map_err(ApiError::BadRequest)?;
    let detail = state
        .explorer
        .block_detail(lookup)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Block {lookup} not found")))?;
    Ok(Json(detail).into_response())
}

async fn transaction_detail(
    State(state): State<AppState>,
    Path(hash): Path<String>,
) -> Result<Response, ApiError> {
    let hash = B256::from_str(&hash)
        .map_err(|_| ApiError::BadRequest(format!("Invalid transaction hash: {hash}")))?;
    let detail = state
        .explorer
        .transaction_detail(hash)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {hash:?} not found")))?;
    Ok(Json(detail).into_response())
}

async fn address_activity(
    State(state): State<AppState>,
    Path(address): Path<String>,
) -> Result<Response, ApiError> {
    let address = parse_address(&address)?;
    let activity = state.resolver.resolve(address).await?;
    Ok(Json(activity).into_response())
}

async fn address_transactions(
    State(state): State<AppState>,
    Path(address): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<Value>, ApiError> {
    let address = parse_address(&address)?;
    let page = state
        .resolver
        .recent_transactions(address, params.request::<ResolveError>()?)
        .await?;
    Ok(Json(page_body(page, "transactions", "totalTransactions")))
}

async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Response, ApiError> {
    let result = state.explorer.search(&params.q).await?;
    Ok(Json(result).into_response())
}

async fn stats(State(state): State<AppState>) -> Result<Response, ApiError> {
    let overview = state.explorer.overview().await?;
    Ok(Json(overview).into_response())
}

async fn trigger_sync(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.sync.run_sync().await {
        Ok(report) => match report.shortfall() {
            None => (
                StatusCode::OK,
                Json(json!({ "success": true, "report": report })),
            ),
            Some(message) => {
                warn!("Triggered sync stopped early: {}", message);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "success": false, "error": message, "report": report })),
                )
            }
        },
        Err(e) => {
            error!("Triggered sync failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
        }
    }
}
