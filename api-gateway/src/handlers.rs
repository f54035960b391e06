// ==============================================================================
// handlers.rs - API Request Handlers
// ==============================================================================
// Description: HTTP handlers for status queries, order intake and upload
//              requests
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-10-19
// Version: 1.1.0
// ==============================================================================

use std::collections::HashSet;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use cg_core::constants::CaseAction;
use cg_core::models::{Application, Customer, Family, Sample};
use cg_core::orderform::{JsonOrderformParser, OrderError, OrderResult, OrderType, OrdersApi};
use cg_core::store::StoreError;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use tracing::{error, info, warn};

use crate::{
    middleware::AuthUser,
    models::*,
    queue::{UploadQueue, UploadRequest},
    state::AppState,
};

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Clinical Genomics API Gateway",
        version: env!("CARGO_PKG_VERSION"),
        endpoints: vec![
            "/api/v1/health - Health check",
            "/api/v1/ready - Readiness check",
            "/api/v1/cases - List cases (GET)",
            "/api/v1/cases/{case_id} - Case with samples (GET)",
            "/api/v1/samples - List samples (GET)",
            "/api/v1/samples/{sample_id} - Sample (GET)",
            "/api/v1/applications - Application tags (GET)",
            "/api/v1/orders/{order_type}/validate - Validate order (POST)",
            "/api/v1/orders/{order_type} - Submit order (POST)",
            "/api/v1/uploads/{case_id} - Request upload (POST, admin)",
            "/api/v1/uploads/{case_id}/ws - WebSocket upload progress",
        ],
    })
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now(),
    })
}

pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_ready = state.store().ping().await.is_ok();

    let redis_ready = match state.redis_client().get_multiplexed_async_connection().await {
        Ok(mut conn) => redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok(),
        Err(_) => false,
    };

    let ready = db_ready && redis_ready;
    let response = ReadinessResponse {
        ready,
        database: db_ready,
        redis: redis_ready,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Resolve an optional customer filter, refusing customers outside the
/// caller's groups
async fn customer_filter(
    state: &AppState,
    auth: &AuthUser,
    customer_id: Option<&str>,
) -> Result<Option<Customer>, AppError> {
    let Some(customer_id) = customer_id else {
        return Ok(None);
    };

    let customer = state.store().customer(customer_id).await?.ok_or(AppError::NotFound)?;
    if !auth.can_access(&customer) {
        return Err(AppError::Forbidden);
    }
    Ok(Some(customer))
}

/// Customers whose groups a non-admin query spans
fn scope_customers(auth: &AuthUser, filter: Option<Customer>) -> Vec<Customer> {
    match filter {
        Some(customer) => vec![customer],
        None => {
            let mut seen = HashSet::new();
            auth.customers
                .iter()
                .filter(|c| seen.insert(c.customer_group_id))
                .cloned()
                .collect()
        }
    }
}

/// Keep the newest `limit` cases with the given action
fn select_cases(mut cases: Vec<Family>, action: Option<CaseAction>, limit: usize) -> Vec<Family> {
    let mut seen = HashSet::new();
    cases.retain(|case| seen.insert(case.id));
    if let Some(action) = action {
        cases.retain(|case| case.case_action() == Some(action));
    }
    cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    cases.truncate(limit);
    cases
}

pub async fn list_cases(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<CasesQuery>,
) -> Result<Json<Vec<Family>>, AppError> {
    let action = params
        .action
        .as_deref()
        .map(str::parse::<CaseAction>)
        .transpose()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let limit = clamp_limit(params.limit);
    let filter = customer_filter(&state, &auth, params.customer.as_deref()).await?;
    let query = params.query.as_deref();

    let cases = if auth.is_admin() {
        state
            .store()
            .families(filter.map(|c| c.id), query, action)
            .await?
    } else {
        let mut cases = Vec::new();
        for customer in scope_customers(&auth, filter) {
            cases.extend(
                state
                    .store()
                    .families_in_customer_group(customer.id, query, action)
                    .await?,
            );
        }
        cases
    };

    Ok(Json(select_cases(cases, action, limit)))
}

pub async fn get_case(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(case_id): Path<String>,
) -> Result<Json<CaseResponse>, AppError> {
    let case = state.store().family(&case_id).await?.ok_or(AppError::NotFound)?;
    check_owner(&state, &auth, case.customer_id).await?;

    let links = state.store().family_samples(&case_id).await?;
    Ok(Json(CaseResponse { case, links }))
}

pub async fn list_samples(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<SamplesQuery>,
) -> Result<Json<Vec<Sample>>, AppError> {
    let limit = clamp_limit(params.limit);
    let filter = customer_filter(&state, &auth, params.customer.as_deref()).await?;
    let query = params.query.as_deref();

    let mut samples = if auth.is_admin() {
        state.store().samples(filter.map(|c| c.id), query).await?
    } else {
        let mut samples = Vec::new();
        for customer in scope_customers(&auth, filter) {
            samples.extend(state.store().samples_in_customer_group(customer.id, query).await?);
        }
        samples.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        samples
    };

    samples.truncate(limit);
    Ok(Json(samples))
}

pub async fn get_sample(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(sample_id): Path<String>,
) -> Result<Json<Sample>, AppError> {
    let sample = state.store().sample(&sample_id).await?.ok_or(AppError::NotFound)?;
    check_owner(&state, &auth, sample.customer_id).await?;
    Ok(Json(sample))
}

pub async fn list_applications(
    State(state): State<AppState>,
    _auth: AuthUser,
    Query(params): Query<ApplicationsQuery>,
) -> Result<Json<Vec<Application>>, AppError> {
    let applications = state
        .store()
        .applications(params.category.as_deref(), params.archived)
        .await?;
    Ok(Json(applications))
}

async fn check_owner(state: &AppState, auth: &AuthUser, customer_id: i32) -> Result<(), AppError> {
    if auth.is_admin() {
        return Ok(());
    }
    let owner = state
        .store()
        .customer_by_id(customer_id)
        .await?
        .ok_or(AppError::NotFound)?;
    if auth.can_access(&owner) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

fn parse_order_type(raw: &str) -> Result<OrderType, AppError> {
    raw.parse().map_err(|e: cg_core::constants::UnknownOption| AppError::BadRequest(e.to_string()))
}

/// Parse and check an order without touching the database
pub fn validate_order_payload(order_type: OrderType, payload: serde_json::Value) -> ValidationResponse {
    let order = match JsonOrderformParser::new().parse_orderform(payload) {
        Ok(order) => order,
        Err(e) => {
            return ValidationResponse {
                valid: false,
                errors: vec![e.to_string()],
            }
        }
    };

    match order_type.validate(&order) {
        Ok(()) => ValidationResponse {
            valid: true,
            errors: Vec::new(),
        },
        Err(errors) => ValidationResponse {
            valid: false,
            errors: errors.iter().map(|e| e.to_string()).collect(),
        },
    }
}

pub async fn validate_order(
    _auth: AuthUser,
    Path(order_type): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<ValidationResponse>, AppError> {
    let order_type = parse_order_type(&order_type)?;
    Ok(Json(validate_order_payload(order_type, payload)))
}

pub async fn submit_order(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(order_type): Path<String>,
    Json(payload): Json<serde_json::Value>,
) -> Result<Json<OrderResult>, AppError> {
    if !state.allow_order() {
        warn!("Order submission rate limit hit by {}", auth.user.email);
        return Err(AppError::RateLimited);
    }

    let order_type = parse_order_type(&order_type)?;
    let order = JsonOrderformParser::new().parse_orderform(payload)?;

    let customer = state
        .store()
        .customer(&order.customer)
        .await?
        .ok_or_else(|| AppError::BadRequest(format!("Unknown customer: {}", order.customer)))?;
    if !auth.can_access(&customer) {
        return Err(AppError::Forbidden);
    }

    info!("{} submitting {} order {}", auth.user.email, order_type, order.name);
    let result = OrdersApi::new(state.store())
        .submit(order_type, &order, &auth.user.email)
        .await?;

    Ok(Json(result))
}

pub async fn request_upload(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(case_id): Path<String>,
    Query(params): Query<UploadParams>,
) -> Result<(StatusCode, Json<UploadAccepted>), AppError> {
    if !auth.is_admin() {
        return Err(AppError::Forbidden);
    }

    state.store().family(&case_id).await?.ok_or(AppError::NotFound)?;

    let notify_email = params.notify.then(|| auth.user.email.clone());
    let request = UploadRequest::new(&case_id, params.restart, &auth.user.email, notify_email);

    UploadQueue::new(state.redis_client().clone())
        .enqueue(&request)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to enqueue upload: {:#}", e)))?;

    info!("Queued upload {} of {} for {}", request.request_id, case_id, auth.user.email);

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            request_id: request.request_id,
            progress_channel: UploadQueue::progress_channel(&case_id),
            case_id,
            status: "queued",
        }),
    ))
}

/// WebSocket progress updates for a case upload
pub async fn upload_progress_ws(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    auth: AuthUser,
    Path(case_id): Path<String>,
) -> Result<Response, AppError> {
    let case = state.store().family(&case_id).await?.ok_or(AppError::NotFound)?;
    check_owner(&state, &auth, case.customer_id).await?;

    Ok(ws.on_upgrade(move |socket| handle_progress_socket(socket, state, case)))
}

async fn send_json(sender: &mut futures::stream::SplitSink<WebSocket, Message>, value: serde_json::Value) -> bool {
    sender.send(Message::Text(value.to_string().into())).await.is_ok()
}

async fn handle_progress_socket(socket: WebSocket, state: AppState, case: Family) {
    let case_id = case.internal_id.clone();
    info!("WebSocket connected for upload of {}", case_id);

    let (mut sender, mut receiver) = socket.split();

    // Current state first, so late subscribers know where the upload stands
    let initial = match state.store().latest_analysis(case.id).await {
        Ok(Some(analysis)) => serde_json::json!({
            "type": "status",
            "case_id": case_id,
            "upload_started_at": analysis.upload_started_at,
            "uploaded_at": analysis.uploaded_at,
        }),
        Ok(None) => serde_json::json!({
            "type": "status",
            "case_id": case_id,
            "message": "Case has no analysis",
        }),
        Err(e) => {
            error!("Failed to query analysis of {}: {}", case_id, e);
            send_json(
                &mut sender,
                serde_json::json!({
                    "type": "error",
                    "error": "database_error",
                    "message": "Failed to query upload status",
                }),
            )
            .await;
            return;
        }
    };
    if !send_json(&mut sender, initial).await {
        return;
    }

    let mut pubsub = match state.redis_client().get_async_pubsub().await {
        Ok(pubsub) => pubsub,
        Err(e) => {
            error!("Failed to create pub/sub connection: {}", e);
            return;
        }
    };
    if let Err(e) = pubsub.subscribe(UploadQueue::progress_channel(&case_id)).await {
        error!("Failed to subscribe to progress of {}: {}", case_id, e);
        return;
    }
    let mut messages = pubsub.on_message();

    let mut ping_interval = tokio::time::interval(tokio::time::Duration::from_secs(30));
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            Some(msg) = messages.next() => {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Unreadable progress message for {}: {}", case_id, e);
                        continue;
                    }
                };
                if sender.send(Message::Text(payload.into())).await.is_err() {
                    break;
                }
            }

            _ = ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        error!("WebSocket error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket disconnected for upload of {}", case_id);
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound,
    BadRequest(String),
    Forbidden,
    RateLimited,
    Internal(String),
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { .. } => AppError::NotFound,
            StoreError::AlreadyExists { .. } | StoreError::InvalidInput(_) => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<OrderError> for AppError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::Store(store) => store.into(),
            OrderError::Io(io) => AppError::Internal(io.to_string()),
            other => AppError::BadRequest(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access denied".to_string()),
            AppError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many order submissions, try again later".to_string(),
            ),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(ErrorResponse::new(error_message));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn case(id: i32, action: Option<&str>, age_days: i64) -> Family {
        let created = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap() - Duration::days(age_days);
        Family {
            id,
            internal_id: format!("case{}", id),
            name: format!("family{}", id),
            customer_id: 1,
            data_analysis: "mip-dna".to_string(),
            data_delivery: "scout".to_string(),
            panels: vec!["OMIM".to_string()],
            cohorts: Vec::new(),
            priority: 1,
            action: action.map(str::to_string),
            avatar_url: None,
            synopsis: None,
            ordered_at: created,
            created_at: created,
        }
    }

    #[test]
    fn test_select_cases_dedupes_filters_and_sorts() {
        let cases = vec![
            case(1, Some("hold"), 3),
            case(2, Some("analyze"), 1),
            case(1, Some("hold"), 3),
            case(3, Some("hold"), 0),
        ];

        let selected = select_cases(cases, Some(CaseAction::Hold), 10);
        let ids: Vec<i32> = selected.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3, 1]);
    }

    #[test]
    fn test_select_cases_limit() {
        let cases = (0..5).map(|i| case(i, None, i as i64)).collect();
        assert_eq!(select_cases(cases, None, 2).len(), 2);
    }

    #[test]
    fn test_validate_order_payload_reports_errors() {
        let response = validate_order_payload(
            OrderType::Mip,
            json!({ "name": "order", "customer": "cust000", "samples": [] }),
        );
        assert!(!response.valid);
        assert_eq!(response.errors, vec!["Order has no samples".to_string()]);
    }

    #[test]
    fn test_validate_order_payload_malformed_json() {
        let response = validate_order_payload(OrderType::Fastq, json!({ "name": "order" }));
        assert!(!response.valid);
        assert_eq!(response.errors.len(), 1);
    }

    #[test]
    fn test_unknown_order_type_is_bad_request() {
        assert!(matches!(parse_order_type("wgs-deluxe"), Err(AppError::BadRequest(_))));
        assert!(matches!(parse_order_type("sars-cov-2"), Ok(OrderType::SarsCov2)));
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(AppError::NotFound.into_response().status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::Forbidden.into_response().status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::RateLimited.into_response().status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            AppError::Internal("boom".to_string()).into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_order_errors_map_to_bad_request() {
        let err: AppError = OrderError::UnknownCustomer("cust999".to_string()).into();
        assert!(matches!(err, AppError::BadRequest(msg) if msg.contains("cust999")));

        let err: AppError = OrderError::Store(StoreError::not_found("sample", "ACC1")).into();
        assert!(matches!(err, AppError::NotFound));
    }
}
