use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use server_api::ApiContext;
use shared::{
    domain::{ClientId, LeadId, TaskId},
    error::{ApiError, ErrorCode},
    protocol::{
        AnalyticsSummary, ApproveConversionRequest, Client, CreateClientRequest,
        CreateLeadRequest, CreateTaskRequest, Lead, LoginRequest, LoginResponse, Page, PageQuery,
        Task, TaskListScope, TaskPageQuery, UpdateClientRequest, UpdateLeadRequest,
        UpdateTaskRequest, UserSummary,
    },
};
use storage::Storage;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

mod app_state;
mod auth;
mod config;

use app_state::AppState;
use auth::{mint_token, Authenticated, TokenConfig};
use config::{load_settings, prepare_database_url};

type HttpError = (StatusCode, Json<ApiError>);
type HttpResult<T> = Result<Json<T>, HttpError>;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct ListQuery {
    page: Option<u32>,
    size: Option<u32>,
    #[serde(default)]
    scope: TaskListScope,
}

impl ListQuery {
    fn page_query(&self, default_size: u32) -> PageQuery {
        PageQuery {
            page: self.page.unwrap_or(0),
            size: self.size.unwrap_or(default_size),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;

    let state = AppState {
        api: ApiContext { storage },
        tokens: TokenConfig {
            secret: settings.jwt_secret,
            ttl_seconds: settings.token_ttl_seconds,
        },
        default_page_size: settings.default_page_size,
    };
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/auth/login", post(login))
        .route("/users/me", get(http_current_user))
        .route("/leads", get(http_list_leads).post(http_create_lead))
        .route("/leads/pending", get(http_list_pending_leads))
        .route("/leads/:lead_id", put(http_update_lead).delete(http_delete_lead))
        .route("/leads/:lead_id/conversion", post(http_request_conversion))
        .route("/leads/:lead_id/approve", post(http_decide_conversion))
        .route("/clients", get(http_list_clients).post(http_create_client))
        .route(
            "/clients/:client_id",
            put(http_update_client).delete(http_delete_client),
        )
        .route("/tasks", get(http_list_tasks).post(http_create_task))
        .route("/tasks/:task_id", put(http_update_task).delete(http_delete_task))
        .route("/analytics", get(http_analytics))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorCode::Forbidden => StatusCode::FORBIDDEN,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::AlreadyPending | ErrorCode::NotPending | ErrorCode::DependencyConflict => {
            StatusCode::CONFLICT
        }
        ErrorCode::InvalidTransition => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    let status = status_for(err.code);
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    }
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state
        .api
        .storage
        .health_check()
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;
    Ok("ok")
}

async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<LoginResponse> {
    let user = server_api::login(&state.api, &req.username)
        .await
        .map_err(reject)?;
    let token = mint_token(&state.tokens, &user).map_err(|e| {
        reject(ApiError::new(ErrorCode::Internal, e.to_string()))
    })?;
    info!(user_id = user.id.0, role = %user.role, "user signed in");
    Ok(Json(LoginResponse { token, user }))
}

async fn http_current_user(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
) -> HttpResult<UserSummary> {
    server_api::current_user(&state.api, actor)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_leads(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Query(q): Query<ListQuery>,
) -> HttpResult<Page<Lead>> {
    server_api::list_leads(&state.api, actor, q.page_query(state.default_page_size))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_pending_leads(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Query(q): Query<ListQuery>,
) -> HttpResult<Page<Lead>> {
    server_api::list_pending_leads(&state.api, actor, q.page_query(state.default_page_size))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_lead(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Json(req): Json<CreateLeadRequest>,
) -> HttpResult<Lead> {
    server_api::create_lead(&state.api, actor, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_lead(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(lead_id): Path<i64>,
    Json(req): Json<UpdateLeadRequest>,
) -> HttpResult<Lead> {
    server_api::update_lead(&state.api, actor, LeadId(lead_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_lead(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(lead_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_lead(&state.api, actor, LeadId(lead_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_request_conversion(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(lead_id): Path<i64>,
) -> HttpResult<Lead> {
    server_api::request_conversion(&state.api, actor, LeadId(lead_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_decide_conversion(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(lead_id): Path<i64>,
    Json(req): Json<ApproveConversionRequest>,
) -> HttpResult<Lead> {
    server_api::decide_conversion(&state.api, actor, LeadId(lead_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_list_clients(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Query(q): Query<ListQuery>,
) -> HttpResult<Page<Client>> {
    server_api::list_clients(&state.api, actor, q.page_query(state.default_page_size))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_client(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Json(req): Json<CreateClientRequest>,
) -> HttpResult<Client> {
    server_api::create_client(&state.api, actor, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_client(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(client_id): Path<i64>,
    Json(req): Json<UpdateClientRequest>,
) -> HttpResult<Client> {
    server_api::update_client(&state.api, actor, ClientId(client_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_client(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(client_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_client(&state.api, actor, ClientId(client_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_tasks(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Query(q): Query<ListQuery>,
) -> HttpResult<Page<Task>> {
    let page = q.page_query(state.default_page_size);
    let query = TaskPageQuery {
        page: page.page,
        size: page.size,
        scope: q.scope,
    };
    server_api::list_tasks(&state.api, actor, query)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_task(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Json(req): Json<CreateTaskRequest>,
) -> HttpResult<Task> {
    server_api::create_task(&state.api, actor, req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_update_task(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(task_id): Path<i64>,
    Json(req): Json<UpdateTaskRequest>,
) -> HttpResult<Task> {
    server_api::update_task(&state.api, actor, TaskId(task_id), req)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_task(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
    Path(task_id): Path<i64>,
) -> Result<StatusCode, HttpError> {
    server_api::delete_task(&state.api, actor, TaskId(task_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_analytics(
    State(state): State<Arc<AppState>>,
    Authenticated(actor): Authenticated,
) -> HttpResult<AnalyticsSummary> {
    server_api::analytics(&state.api, actor)
        .await
        .map(Json)
        .map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
