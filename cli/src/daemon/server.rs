// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! Daemon HTTP server implementation
//!
//! Every engine operation is exposed under `/api`. Engine errors become a
//! JSON body `{"error": <message>, "kind": <kind>}` with a status derived
//! from the error kind.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Query, Request, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    routing::{get, post, put},
    Json, Router,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use uuid::Uuid;

use hive_core::application::SandboxService;
use hive_core::domain::engine_config::{EngineConfigManifest, MetricsConfig};
use hive_core::domain::runtime::ResourceLimits;
use hive_core::domain::sandbox::Sandbox;
use hive_core::infrastructure::event_bus::EventBus;
use hive_core::{AgentId, OrchestratorError, ProjectId, SandboxId, SwarmId, TaskId};
use hive_swarm::application::{
    CreateSwarmRequest, SpawnAgentRequest, SwarmCoordinator, SwarmStatusReport,
};
use hive_swarm::domain::{Agent, MemoryEntry, NewTask, Swarm, Task, TaskStatus};

use super::engine::Engine;

// ============================================================================
// Error mapping
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

pub struct ApiError(OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

pub fn status_for(err: &OrchestratorError) -> StatusCode {
    match err {
        OrchestratorError::NotFound { .. } => StatusCode::NOT_FOUND,
        OrchestratorError::InvalidConfiguration(_) | OrchestratorError::InvalidPort { .. } => {
            StatusCode::BAD_REQUEST
        }
        OrchestratorError::InvalidTransition { .. }
        | OrchestratorError::InvalidState { .. }
        | OrchestratorError::AgentBusy { .. }
        | OrchestratorError::AlreadyExists { .. }
        | OrchestratorError::OperationInProgress { .. } => StatusCode::CONFLICT,
        OrchestratorError::CapacityExceeded { .. } => StatusCode::TOO_MANY_REQUESTS,
        OrchestratorError::PoolExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
        OrchestratorError::RuntimeFailure { .. } => StatusCode::BAD_GATEWAY,
        OrchestratorError::StoreFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            kind: self.0.kind().to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `Json` body extractor whose rejections (unknown enum values, missing
/// fields, malformed JSON) surface as `invalid_configuration` errors.
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiError(OrchestratorError::InvalidConfiguration(
                rejection.body_text(),
            ))),
        }
    }
}

// ============================================================================
// State and router
// ============================================================================

pub struct AppState {
    pub coordinator: Arc<dyn SwarmCoordinator>,
    pub sandboxes: Arc<dyn SandboxService>,
    pub event_bus: Arc<EventBus>,
    pub start_time: Instant,
}

impl AppState {
    pub fn from_engine(engine: &Engine) -> Self {
        Self {
            coordinator: engine.coordinator.clone(),
            sandboxes: engine.sandboxes.clone(),
            event_bus: engine.event_bus.clone(),
            start_time: Instant::now(),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/events", get(events_handler))
        // Swarms
        .route("/api/swarms", post(create_swarm_handler).get(list_swarms_handler))
        .route("/api/swarms/{id}", get(get_swarm_handler).delete(terminate_swarm_handler))
        .route("/api/swarms/{id}/scale", post(scale_swarm_handler))
        .route("/api/swarms/{id}/status", get(swarm_status_handler))
        // Agents
        .route("/api/swarms/{id}/agents", post(spawn_agent_handler).get(list_agents_handler))
        .route("/api/agents/{id}", get(get_agent_handler).delete(remove_agent_handler))
        .route("/api/agents/{id}/error", post(agent_error_handler))
        // Tasks
        .route("/api/swarms/{id}/tasks", post(submit_task_handler).get(list_tasks_handler))
        .route("/api/tasks/{id}", get(get_task_handler))
        .route("/api/tasks/{id}/result", post(report_result_handler))
        .route("/api/tasks/{id}/cancel", post(cancel_task_handler))
        // Memory
        .route("/api/swarms/{id}/memory/{namespace}", get(list_memory_handler))
        .route(
            "/api/swarms/{id}/memory/{namespace}/{key}",
            put(put_memory_handler).get(get_memory_handler).delete(delete_memory_handler),
        )
        // Sandboxes
        .route("/api/sandboxes", post(create_sandbox_handler).get(list_sandboxes_handler))
        .route("/api/sandboxes/reconcile", post(reconcile_handler))
        .route("/api/sandboxes/{id}", get(get_sandbox_handler))
        .route("/api/sandboxes/{id}/stop", post(stop_sandbox_handler))
        .route("/api/sandboxes/{id}/reset", post(reset_sandbox_handler))
        .route("/api/sandboxes/{id}/touch", post(touch_sandbox_handler))
        .route("/api/projects/{project_id}/sandbox", get(sandbox_by_project_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ============================================================================
// Daemon entry point
// ============================================================================

/// Run the daemon in the foreground until Ctrl+C / SIGTERM.
pub async fn run(config: EngineConfigManifest, port_override: Option<u16>) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    info!(name = %config.metadata.name, "Hive daemon starting (PID: {})", std::process::id());

    if let Some(metrics) = config.spec.observability.as_ref().and_then(|o| o.metrics.as_ref()) {
        install_metrics_exporter(metrics)?;
    }

    let engine = Engine::from_config(&config)?;
    engine.initialize().await?;
    let background = engine.start_background_tasks();

    let state = Arc::new(AppState::from_engine(&engine));
    let app = router(state);

    let port = port_override.unwrap_or(config.spec.api.port);
    let addr = format!("{}:{}", config.spec.api.bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Daemon listening on {}", addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed");

    info!("Daemon shutting down");
    engine.shutdown();
    for handle in background {
        if let Err(e) = handle.await {
            error!("Background task ended abnormally: {}", e);
        }
    }

    served
}

fn install_metrics_exporter(config: &MetricsConfig) -> Result<()> {
    if !config.enabled {
        return Ok(());
    }
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install Prometheus exporter")?;
    info!("Prometheus metrics exposed on {}", addr);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleRequest {
    pub max_agents: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RemoveAgentQuery {
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AgentErrorRequest {
    pub reason: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ListTasksQuery {
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReportResultRequest {
    pub success: bool,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PutMemoryRequest {
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl_seconds: Option<u64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeletedResponse {
    pub deleted: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSandboxRequest {
    pub project_id: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub resources: Option<ResourceLimits>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReconcileResponse {
    pub failed: usize,
    pub pruned: usize,
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
    }))
}

/// Server-sent stream of every domain event.
async fn events_handler(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.event_bus.subscribe();
    let events = stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let data = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().data(data)), receiver));
                }
                // Lagged subscribers skip what they missed
                Err(hive_core::infrastructure::event_bus::EventBusError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn create_swarm_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateSwarmRequest>,
) -> Result<(StatusCode, Json<Swarm>), ApiError> {
    let swarm = state.coordinator.create_swarm(request).await?;
    Ok((StatusCode::CREATED, Json(swarm)))
}

async fn list_swarms_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Swarm>> {
    Ok(Json(state.coordinator.list_swarms().await?))
}

async fn get_swarm_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Swarm> {
    Ok(Json(state.coordinator.get_swarm(SwarmId(id)).await?))
}

async fn terminate_swarm_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Swarm> {
    Ok(Json(state.coordinator.terminate_swarm(SwarmId(id)).await?))
}

async fn scale_swarm_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<ScaleRequest>,
) -> ApiResult<Swarm> {
    Ok(Json(state.coordinator.scale_swarm(SwarmId(id), request.max_agents).await?))
}

async fn swarm_status_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<SwarmStatusReport> {
    Ok(Json(state.coordinator.swarm_status(SwarmId(id)).await?))
}

async fn spawn_agent_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<SpawnAgentRequest>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let agent = state.coordinator.spawn_agent(SwarmId(id), request).await?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn list_agents_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<Agent>> {
    Ok(Json(state.coordinator.list_agents(SwarmId(id)).await?))
}

async fn get_agent_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Agent> {
    Ok(Json(state.coordinator.get_agent(AgentId(id)).await?))
}

async fn remove_agent_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<RemoveAgentQuery>,
) -> ApiResult<Agent> {
    Ok(Json(state.coordinator.remove_agent(AgentId(id), query.force).await?))
}

async fn agent_error_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<AgentErrorRequest>,
) -> ApiResult<Agent> {
    Ok(Json(
        state.coordinator.report_agent_error(AgentId(id), request.reason).await?,
    ))
}

async fn submit_task_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<NewTask>,
) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.coordinator.submit_task(SwarmId(id), request).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

async fn list_tasks_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Vec<Task>> {
    let status = query.status.as_deref().map(str::parse::<TaskStatus>).transpose()?;
    Ok(Json(state.coordinator.list_tasks(SwarmId(id), status).await?))
}

async fn get_task_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Task> {
    Ok(Json(state.coordinator.get_task(TaskId(id)).await?))
}

async fn report_result_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    ApiJson(request): ApiJson<ReportResultRequest>,
) -> ApiResult<Task> {
    Ok(Json(
        state
            .coordinator
            .report_result(TaskId(id), request.success, request.payload)
            .await?,
    ))
}

async fn cancel_task_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Task> {
    Ok(Json(state.coordinator.cancel_task(TaskId(id)).await?))
}

async fn list_memory_handler(
    State(state): State<Arc<AppState>>,
    Path((id, namespace)): Path<(Uuid, String)>,
) -> ApiResult<Vec<MemoryEntry>> {
    Ok(Json(state.coordinator.list_memory(SwarmId(id), Some(namespace)).await?))
}

async fn put_memory_handler(
    State(state): State<Arc<AppState>>,
    Path((id, namespace, key)): Path<(Uuid, String, String)>,
    ApiJson(request): ApiJson<PutMemoryRequest>,
) -> ApiResult<MemoryEntry> {
    Ok(Json(
        state
            .coordinator
            .put_memory(SwarmId(id), Some(namespace), key, request.value, request.ttl_seconds)
            .await?,
    ))
}

async fn get_memory_handler(
    State(state): State<Arc<AppState>>,
    Path((id, namespace, key)): Path<(Uuid, String, String)>,
) -> ApiResult<MemoryEntry> {
    Ok(Json(
        state.coordinator.get_memory(SwarmId(id), Some(namespace), key).await?,
    ))
}

async fn delete_memory_handler(
    State(state): State<Arc<AppState>>,
    Path((id, namespace, key)): Path<(Uuid, String, String)>,
) -> ApiResult<DeletedResponse> {
    let deleted = state.coordinator.delete_memory(SwarmId(id), Some(namespace), key).await?;
    Ok(Json(DeletedResponse { deleted }))
}

async fn create_sandbox_handler(
    State(state): State<Arc<AppState>>,
    ApiJson(request): ApiJson<CreateSandboxRequest>,
) -> Result<(StatusCode, Json<Sandbox>), ApiError> {
    let sandbox = state
        .sandboxes
        .create_sandbox(ProjectId::new(request.project_id), request.image, request.resources)
        .await?;
    Ok((StatusCode::CREATED, Json(sandbox)))
}

async fn list_sandboxes_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<Sandbox>> {
    Ok(Json(state.sandboxes.list_sandboxes().await?))
}

async fn get_sandbox_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sandbox> {
    Ok(Json(state.sandboxes.get_sandbox(SandboxId(id)).await?))
}

async fn stop_sandbox_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sandbox> {
    Ok(Json(state.sandboxes.stop_sandbox(SandboxId(id)).await?))
}

async fn reset_sandbox_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sandbox> {
    Ok(Json(state.sandboxes.reset_sandbox(SandboxId(id)).await?))
}

async fn touch_sandbox_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Sandbox> {
    Ok(Json(state.sandboxes.touch(SandboxId(id)).await?))
}

async fn sandbox_by_project_handler(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
) -> ApiResult<Sandbox> {
    Ok(Json(
        state
            .sandboxes
            .get_sandbox_by_project(&ProjectId::new(project_id))
            .await?,
    ))
}

async fn reconcile_handler(State(state): State<Arc<AppState>>) -> ApiResult<ReconcileResponse> {
    let failed = state.sandboxes.reconcile().await?;
    let pruned = state.sandboxes.prune_orphans().await?;
    Ok(Json(ReconcileResponse { failed, pruned }))
}
