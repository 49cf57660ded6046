//! Axum router and HTTP handlers.

use axum::extract::{FromRequest, Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post, put};
use axum::Router;
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tower_http::trace::TraceLayer;
use tracing::warn;

use karma_core::error::{KarmaError, UnlockError, ValidationError};
use karma_core::ledger::{BehaviorFeed, BehaviorRequest, MarkedRead};
use karma_core::reporting::{GlobalAnalytics, UserSummary};
use karma_core::rewards::CatalogEntry;
use karma_core::types::{Behavior, BehaviorId, NewUser, RewardId, User};

use crate::identity::{Admin, Caller};
use crate::AppState;

// ---------------------------------------------------------------------------
// Error helper
// ---------------------------------------------------------------------------

/// An error response: status, stable machine-readable code and message.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            code: "unauthenticated",
            message: "missing caller identity".into(),
        }
    }

    pub fn forbidden() -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            code: "forbidden",
            message: "admin role required".into(),
        }
    }
}

impl From<KarmaError> for ApiError {
    fn from(e: KarmaError) -> Self {
        let (status, code) = match &e {
            KarmaError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            KarmaError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            KarmaError::Unlock(UnlockError::InsufficientBalance { .. }) => {
                (StatusCode::BAD_REQUEST, "insufficient_karma")
            }
            KarmaError::Unlock(UnlockError::AlreadyUnlocked(_)) => {
                (StatusCode::BAD_REQUEST, "already_unlocked")
            }
            KarmaError::DuplicateUser(_) => (StatusCode::CONFLICT, "duplicate_user"),
            KarmaError::StoreUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "store_unavailable"),
        };
        Self {
            status,
            code,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        warn!(status = %self.status, code = self.code, error = %self.message, "request failed");
        let body = json!({ "error": self.message, "code": self.code });
        (self.status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// JSON body extractor whose decode failures are validation errors.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => {
                Err(KarmaError::from(ValidationError::MalformedBody(rejection.body_text())).into())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/behaviors", get(feed).post(record_behavior))
        .route("/api/behaviors/summary", get(summary))
        .route("/api/behaviors/read-all", put(mark_all_read))
        .route("/api/behaviors/:id/read", put(mark_read))
        .route("/api/rewards", get(catalog))
        .route("/api/rewards/:id/unlock", post(unlock_reward))
        .route("/api/dashboard/analytics", get(analytics))
        .route("/api/admin/users", post(register_user))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// `GET /api/behaviors`: the caller's latest events and unread count.
async fn feed(State(state): State<AppState>, caller: Caller) -> ApiResult<BehaviorFeed> {
    Ok(Json(state.service.ledger().feed(&caller.id)?))
}

/// `POST /api/behaviors`: record an event and move the caller's score.
async fn record_behavior(
    State(state): State<AppState>,
    caller: Caller,
    ApiJson(req): ApiJson<BehaviorRequest>,
) -> Result<(StatusCode, Json<Behavior>), ApiError> {
    let behavior = state.service.ledger().record(&caller.id, req, Utc::now())?;
    Ok((StatusCode::CREATED, Json(behavior)))
}

/// `PUT /api/behaviors/:id/read`
async fn mark_read(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
) -> ApiResult<MarkedRead> {
    Ok(Json(state.service.ledger().mark_read(&caller.id, BehaviorId(id))?))
}

/// `PUT /api/behaviors/read-all`
async fn mark_all_read(State(state): State<AppState>, caller: Caller) -> ApiResult<Value> {
    let ledger = state.service.ledger();
    let updated = ledger.mark_all_read(&caller.id)?;
    let unread = ledger.count_unread(&caller.id)?;
    Ok(Json(json!({ "updated": updated, "unreadCount": unread })))
}

/// `GET /api/behaviors/summary`: live score plus per-type totals.
async fn summary(State(state): State<AppState>, caller: Caller) -> ApiResult<UserSummary> {
    Ok(Json(state.service.reporter().summary_for(&caller.id)?))
}

/// `GET /api/rewards`: active rewards flagged for the caller.
async fn catalog(State(state): State<AppState>, caller: Caller) -> ApiResult<Vec<CatalogEntry>> {
    Ok(Json(state.service.rewards().catalog(&caller.id)?))
}

/// `POST /api/rewards/:id/unlock`
async fn unlock_reward(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<u64>,
) -> ApiResult<Value> {
    let reward = state.service.rewards().unlock(&caller.id, RewardId(id))?;
    Ok(Json(json!({ "message": "Reward unlocked", "reward": reward })))
}

/// `GET /api/dashboard/analytics`: admin only.
async fn analytics(State(state): State<AppState>, _admin: Admin) -> ApiResult<GlobalAnalytics> {
    Ok(Json(state.service.reporter().global_analytics(Utc::now())?))
}

/// `POST /api/admin/users`: register a user; admin only.
async fn register_user(
    State(state): State<AppState>,
    _admin: Admin,
    ApiJson(user): ApiJson<NewUser>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let user = state.service.store().register_user(user)?;
    Ok((StatusCode::CREATED, Json(user)))
}
