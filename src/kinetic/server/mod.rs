// SPDX-License-Identifier: MIT

//! HTTP trigger surface
//!
//! Thin axum layer over [`Engine`]: start runs, resume waits by id and
//! dispatch inbound events.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::kinetic::workflow::correlation::InboundEvent;
use crate::kinetic::workflow::Engine;
use crate::ndk::error::EngineError;

type SharedEngine = Arc<Engine>;

/// Install the fmt subscriber that prints request spans from `TraceLayer`.
/// Library `log` records are bridged into it.
pub fn init_tracing() {
    if let Err(e) = tracing_subscriber::fmt().with_target(false).try_init() {
        eprintln!("tracing subscriber already installed: {}", e);
    }
}

pub fn router(engine: SharedEngine) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/flows", get(list_flows))
        .route("/api/flows/{id}", get(get_flow))
        .route("/api/runs", get(list_runs).post(start_run))
        .route("/api/runs/{id}", get(get_run))
        .route("/api/runs/{id}/terminate", post(terminate_run))
        .route("/api/waits", get(list_waits))
        .route("/api/waits/{id}/resume", post(resume_wait))
        .route("/api/events", post(dispatch_event))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(engine)
}

pub async fn serve(engine: SharedEngine, port: u16) -> Result<(), EngineError> {
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

/// Engine error rendered as `{"error": message}` with a matching status
struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        if self.0.is_validation() {
            return StatusCode::UNPROCESSABLE_ENTITY;
        }
        match &self.0 {
            EngineError::AlreadyResumed { .. }
            | EngineError::DuplicateWait(_)
            | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
            EngineError::ExpiredWait { .. } => StatusCode::GONE,
            EngineError::WaitNotFound(_)
            | EngineError::RunNotFound(_)
            | EngineError::FlowNotFound(_) => StatusCode::NOT_FOUND,
            EngineError::Signal(_) | EngineError::Json(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn to_json<T: serde::Serialize>(value: &T) -> ApiResult {
    Ok(Json(serde_json::to_value(value).map_err(EngineError::from)?))
}

async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn list_flows(State(engine): State<SharedEngine>) -> ApiResult {
    let flows = engine.flows().list().await?;
    let summaries: Vec<Value> = flows
        .iter()
        .map(|flow| {
            json!({
                "id": flow.id,
                "name": flow.name,
                "description": flow.description,
                "nodes": flow.nodes.len(),
            })
        })
        .collect();
    Ok(Json(Value::Array(summaries)))
}

async fn get_flow(State(engine): State<SharedEngine>, Path(id): Path<String>) -> ApiResult {
    match engine.flows().get(&id).await? {
        Some(flow) => to_json(flow.as_ref()),
        None => Err(EngineError::FlowNotFound(id).into()),
    }
}

#[derive(Deserialize)]
struct StartRunRequest {
    flow_id: String,
    #[serde(default)]
    input: Value,
}

async fn start_run(
    State(engine): State<SharedEngine>,
    Json(request): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let input = match request.input {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    let state = engine.start_run(&request.flow_id, input).await?;
    let Json(body) = to_json(&state)?;
    Ok((StatusCode::CREATED, Json(body)))
}

async fn list_runs(State(engine): State<SharedEngine>) -> ApiResult {
    to_json(&engine.list_runs().await?)
}

async fn get_run(State(engine): State<SharedEngine>, Path(id): Path<String>) -> ApiResult {
    to_json(&engine.get_run(&id).await?)
}

async fn terminate_run(State(engine): State<SharedEngine>, Path(id): Path<String>) -> ApiResult {
    to_json(&engine.terminate(&id).await?)
}

async fn list_waits(State(engine): State<SharedEngine>) -> ApiResult {
    to_json(&engine.active_waits().await)
}

#[derive(Deserialize)]
struct ResumeRequest {
    #[serde(default)]
    output: Map<String, Value>,
}

async fn resume_wait(
    State(engine): State<SharedEngine>,
    Path(id): Path<String>,
    Json(request): Json<ResumeRequest>,
) -> ApiResult {
    to_json(&engine.resume(&id, request.output).await?)
}

async fn dispatch_event(
    State(engine): State<SharedEngine>,
    Json(event): Json<InboundEvent>,
) -> ApiResult {
    let matched = engine.dispatch(&event).await?;
    Ok(Json(json!({ "matched": matched })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::config::EngineConfig;
    use crate::kinetic::nodes::builtin_registry;
    use crate::kinetic::workflow::loader::FlowLoader;

    const FLOW: &str = r#"
id: approval
nodes:
  - { id: start, type: trigger }
  - { id: review, type: human_task, config: { task_id: "task-{{ input.ticket }}", title: Review } }
edges:
  - { source: start, target: review }
"#;

    async fn spawn_server() -> String {
        let config = EngineConfig::default();
        let engine = Engine::new(builtin_registry(&config).unwrap(), &config);
        engine
            .register_flow(FlowLoader::parse_yaml(FLOW).unwrap())
            .await
            .unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(Arc::new(engine))).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_start_and_resume_over_http() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let health: Value = client
            .get(format!("{}/api/health", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(health["status"], json!("ok"));

        let response = client
            .post(format!("{}/api/runs", base))
            .json(&json!({"flow_id": "approval", "input": {"ticket": 7}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
        let run: Value = response.json().await.unwrap();
        assert_eq!(run["status"], json!("PAUSED"));
        assert_eq!(run["wait_id"], json!("task-7"));

        let resume = format!("{}/api/waits/task-7/resume", base);
        let response = client
            .post(&resume)
            .json(&json!({"output": {"approved": true}}))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let run: Value = response.json().await.unwrap();
        assert_eq!(run["status"], json!("COMPLETED"));
        assert_eq!(run["steps"]["review"]["output"]["approved"], json!(true));

        let again = client.post(&resume).json(&json!({})).send().await.unwrap();
        assert_eq!(again.status().as_u16(), 409);
    }

    #[tokio::test]
    async fn test_error_statuses() {
        let base = spawn_server().await;
        let client = reqwest::Client::new();

        let missing = client
            .get(format!("{}/api/runs/nope", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status().as_u16(), 404);

        let unknown_flow = client
            .post(format!("{}/api/runs", base))
            .json(&json!({"flow_id": "nope"}))
            .send()
            .await
            .unwrap();
        assert_eq!(unknown_flow.status().as_u16(), 404);

        let events: Value = client
            .post(format!("{}/api/events", base))
            .json(&json!({
                "name": "invoice.paid",
                "data": {"invoice_id": "42"}
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(events["matched"], json!(0));
    }

    #[test]
    fn test_status_mapping() {
        use crate::ndk::error::GraphError;

        let cases = [
            (
                EngineError::Graph(GraphError::Cycle {
                    nodes: vec!["a".to_string()],
                }),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                EngineError::AlreadyResumed {
                    wait_id: "w".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                EngineError::ExpiredWait {
                    wait_id: "w".to_string(),
                },
                StatusCode::GONE,
            ),
            (EngineError::WaitNotFound("w".to_string()), StatusCode::NOT_FOUND),
            (EngineError::config("bad"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status(), expected);
        }
    }
}
