use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result as AnyResult;
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
};
use tracing::{error, info, warn};
use uuid::Uuid;
use voyara_core::{
    Commission, CommissionFilter, PartnerBalance, Payout, PayoutFilter, SettlementError,
    SystemClock,
};
use voyara_eventstore::Outbox;
use voyara_finance::{BatchReport, ScanReport, SettlementEngine, TierChange};
use voyara_platform::{
    ApproveCommissionRequest, BookingCompletedEvent, CancelPayoutRequest, CreatePayoutRequest,
    ErrorResponse, HttpPaymentRail, ListCommissionsQuery, ListPayoutsQuery, PgSettlementStore,
    RedisBus, RejectCommissionRequest, ServiceConfig, apply_schema, connect_database,
};

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Clone)]
struct AppState {
    engine: Arc<SettlementEngine<PgSettlementStore>>,
    default_payment_method: String,
}

#[tokio::main]
async fn main() -> AnyResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "voyara_gateway=info".to_string()),
        )
        .init();

    let config = ServiceConfig::from_env("0.0.0.0:8080")?;
    let pool = connect_database(&config.database_url, config.db_timeouts).await?;
    apply_schema(&pool).await?;
    let redis = RedisBus::connect(&config.redis_url)?;
    let (outbox, _forwarder) = Outbox::spawn(Arc::new(redis));
    let rail = HttpPaymentRail::new(&config.payment_rail_url, config.payment_timeout)?;

    let engine = SettlementEngine::new(
        Arc::new(PgSettlementStore::new(pool)),
        Arc::new(rail),
        Arc::new(outbox),
        Arc::new(SystemClock),
        config.settlement_policy(),
    );
    let state = AppState {
        engine: Arc::new(engine),
        default_payment_method: config.default_payment_method.clone(),
    };

    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/bookings/completed", post(booking_completed))
        .route("/commissions", get(list_commissions))
        .route("/commissions/{commission_id}", get(get_commission))
        .route(
            "/commissions/{commission_id}/approve",
            post(approve_commission),
        )
        .route("/commissions/{commission_id}/reject", post(reject_commission))
        .route("/partners/{partner_id}/balance", get(partner_balance))
        .route(
            "/partners/{partner_id}/tier/recalculate",
            post(recalculate_tier),
        )
        .route("/payouts", get(list_payouts).post(create_payout))
        .route("/payouts/eligible", get(eligible_partners))
        .route("/payouts/automatic", post(run_automatic_payouts))
        .route("/payouts/{payout_id}", get(get_payout))
        .route("/payouts/{payout_id}/process", post(process_payout))
        .route("/payouts/{payout_id}/cancel", post(cancel_payout))
        .with_state(state);

    let addr: SocketAddr = config.http_addr.parse()?;
    info!("gateway listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn booking_completed(
    State(state): State<AppState>,
    Json(payload): Json<BookingCompletedEvent>,
) -> ApiResult<Commission> {
    let commission = state
        .engine
        .ledger
        .calculate_commission(
            payload.booking_id,
            payload.partner_id,
            payload.booking_amount,
        )
        .await
        .map_err(settlement_error)?;

    if let Err(err) = state.engine.tiers.recalculate_tier(payload.partner_id).await {
        warn!(partner_id = %payload.partner_id, "tier refresh after booking failed: {err}");
    }

    Ok(Json(commission))
}

async fn list_commissions(
    State(state): State<AppState>,
    Query(query): Query<ListCommissionsQuery>,
) -> ApiResult<Vec<Commission>> {
    let commissions = state
        .engine
        .ledger
        .list_commissions(CommissionFilter {
            partner_id: query.partner_id,
            status: query.status,
            limit: query.limit,
        })
        .await
        .map_err(settlement_error)?;
    Ok(Json(commissions))
}

async fn get_commission(
    State(state): State<AppState>,
    Path(commission_id): Path<Uuid>,
) -> ApiResult<Commission> {
    let commission = state
        .engine
        .ledger
        .commission(commission_id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(commission))
}

async fn approve_commission(
    State(state): State<AppState>,
    Path(commission_id): Path<Uuid>,
    Json(payload): Json<ApproveCommissionRequest>,
) -> ApiResult<Commission> {
    let commission = state
        .engine
        .ledger
        .approve_commission(commission_id, &payload.approved_by)
        .await
        .map_err(settlement_error)?;
    Ok(Json(commission))
}

async fn reject_commission(
    State(state): State<AppState>,
    Path(commission_id): Path<Uuid>,
    Json(payload): Json<RejectCommissionRequest>,
) -> ApiResult<Commission> {
    let commission = state
        .engine
        .ledger
        .reject_commission(commission_id, &payload.reason)
        .await
        .map_err(settlement_error)?;
    Ok(Json(commission))
}

async fn partner_balance(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> ApiResult<PartnerBalance> {
    let balance = state
        .engine
        .ledger
        .get_partner_balance(partner_id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(balance))
}

async fn recalculate_tier(
    State(state): State<AppState>,
    Path(partner_id): Path<Uuid>,
) -> ApiResult<TierChange> {
    let change = state
        .engine
        .tiers
        .recalculate_tier(partner_id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(change))
}

async fn create_payout(
    State(state): State<AppState>,
    Json(payload): Json<CreatePayoutRequest>,
) -> Result<(StatusCode, Json<Payout>), ApiError> {
    let payment_method = payload
        .payment_method
        .as_deref()
        .unwrap_or(&state.default_payment_method);
    let payout = state
        .engine
        .payouts
        .create_payout(
            payload.partner_id,
            payload.amount,
            payment_method,
            payload.notes,
        )
        .await
        .map_err(settlement_error)?;
    Ok((StatusCode::CREATED, Json(payout)))
}

async fn list_payouts(
    State(state): State<AppState>,
    Query(query): Query<ListPayoutsQuery>,
) -> ApiResult<Vec<Payout>> {
    let payouts = state
        .engine
        .payouts
        .list_payouts(PayoutFilter {
            partner_id: query.partner_id,
            status: query.status,
            limit: query.limit,
        })
        .await
        .map_err(settlement_error)?;
    Ok(Json(payouts))
}

async fn get_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> ApiResult<Payout> {
    let payout = state
        .engine
        .payouts
        .payout(payout_id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(payout))
}

/// Returns the payout in its final state. A declined or timed-out rail call
/// still answers 200 with a FAILED payout.
async fn process_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
) -> ApiResult<Payout> {
    let payout = state
        .engine
        .payouts
        .process_payout(payout_id)
        .await
        .map_err(settlement_error)?;
    Ok(Json(payout))
}

async fn cancel_payout(
    State(state): State<AppState>,
    Path(payout_id): Path<Uuid>,
    Json(payload): Json<CancelPayoutRequest>,
) -> ApiResult<Payout> {
    let payout = state
        .engine
        .payouts
        .cancel_payout(payout_id, &payload.reason)
        .await
        .map_err(settlement_error)?;
    Ok(Json(payout))
}

async fn eligible_partners(State(state): State<AppState>) -> ApiResult<ScanReport> {
    let report = state
        .engine
        .scanner
        .scan()
        .await
        .map_err(settlement_error)?;
    Ok(Json(report))
}

async fn run_automatic_payouts(State(state): State<AppState>) -> ApiResult<BatchReport> {
    let report = state
        .engine
        .payouts
        .process_automatic_payouts()
        .await
        .map_err(settlement_error)?;
    info!(
        eligible = report.eligible,
        succeeded = report.succeeded,
        failed = report.failures.len(),
        "manual payout sweep finished"
    );
    Ok(Json(report))
}

fn status_for(err: &SettlementError) -> StatusCode {
    match err {
        SettlementError::PartnerNotFound(_)
        | SettlementError::CommissionNotFound(_)
        | SettlementError::PayoutNotFound(_) => StatusCode::NOT_FOUND,
        SettlementError::InvalidStateTransition { .. }
        | SettlementError::InvalidPayoutState { .. } => StatusCode::CONFLICT,
        SettlementError::InsufficientCommission { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        SettlementError::Validation(_) => StatusCode::BAD_REQUEST,
        SettlementError::PaymentRail(_) => StatusCode::BAD_GATEWAY,
        SettlementError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn settlement_error(err: SettlementError) -> ApiError {
    let status = status_for(&err);
    if status.is_server_error() {
        error!("request failed: {err:#}");
    }
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}
