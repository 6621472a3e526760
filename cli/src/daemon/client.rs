// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

//! HTTP client for communicating with daemon API

use anyhow::{Context, Result};
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;

use hive_core::domain::runtime::ResourceLimits;
use hive_core::domain::sandbox::Sandbox;
use hive_core::{AgentId, SandboxId, SwarmId, TaskId};
use hive_swarm::application::{CreateSwarmRequest, SpawnAgentRequest, SwarmStatusReport};
use hive_swarm::domain::{Agent, MemoryEntry, NewTask, Swarm, Task, TaskStatus};

use super::server::{
    AgentErrorRequest, CreateSandboxRequest, DeletedResponse, ErrorBody, PutMemoryRequest,
    ReconcileResponse, ReportResultRequest, ScaleRequest,
};

#[derive(Debug, Clone)]
pub struct DaemonClient {
    client: Client,
    base_url: String,
}

impl DaemonClient {
    pub fn new(host: &str, port: u16) -> Result<Self> {
        let client = Client::builder()
            // No global timeout: terminate waits out the swarm grace period
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = if host.starts_with("http://") || host.starts_with("https://") {
            format!("{}:{}", host, port)
        } else {
            format!("http://{}:{}", host, port)
        };

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Memory routes carry caller-chosen namespace and key segments, which
    /// are percent-encoded here.
    fn memory_url(&self, swarm_id: SwarmId, namespace: &str, key: Option<&str>) -> Result<Url> {
        let swarm = swarm_id.to_string();
        let mut url = Url::parse(&self.base_url).context("Invalid daemon URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Daemon URL {} cannot carry a path", self.base_url))?
            .pop_if_empty()
            .extend(["api", "swarms", swarm.as_str(), "memory", namespace])
            .extend(key);
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, action: &str) -> Result<T> {
        let response = request
            .send()
            .await
            .with_context(|| format!("Failed to {}", action))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            match serde_json::from_str::<ErrorBody>(&text) {
                Ok(body) => anyhow::bail!("Failed to {} ({}): {}", action, body.kind, body.error),
                Err(_) => anyhow::bail!("Failed to {} (HTTP {}): {}", action, status, text),
            }
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse response to {}", action))
    }

    async fn get<T: DeserializeOwned>(&self, path: &str, action: &str) -> Result<T> {
        self.send(self.client.get(self.url(path)), action).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        action: &str,
    ) -> Result<T> {
        self.send(self.client.post(self.url(path)).json(body), action).await
    }

    // Swarms

    pub async fn create_swarm(&self, request: &CreateSwarmRequest) -> Result<Swarm> {
        self.post("/api/swarms", request, "create swarm").await
    }

    pub async fn list_swarms(&self) -> Result<Vec<Swarm>> {
        self.get("/api/swarms", "list swarms").await
    }

    pub async fn get_swarm(&self, id: SwarmId) -> Result<Swarm> {
        self.get(&format!("/api/swarms/{}", id), "get swarm").await
    }

    pub async fn terminate_swarm(&self, id: SwarmId) -> Result<Swarm> {
        self.send(
            self.client.delete(self.url(&format!("/api/swarms/{}", id))),
            "terminate swarm",
        )
        .await
    }

    pub async fn scale_swarm(&self, id: SwarmId, max_agents: u32) -> Result<Swarm> {
        self.post(
            &format!("/api/swarms/{}/scale", id),
            &ScaleRequest { max_agents },
            "scale swarm",
        )
        .await
    }

    pub async fn swarm_status(&self, id: SwarmId) -> Result<SwarmStatusReport> {
        self.get(&format!("/api/swarms/{}/status", id), "get swarm status")
            .await
    }

    // Agents

    pub async fn spawn_agent(
        &self,
        swarm_id: SwarmId,
        request: &SpawnAgentRequest,
    ) -> Result<Agent> {
        self.post(&format!("/api/swarms/{}/agents", swarm_id), request, "spawn agent")
            .await
    }

    pub async fn list_agents(&self, swarm_id: SwarmId) -> Result<Vec<Agent>> {
        self.get(&format!("/api/swarms/{}/agents", swarm_id), "list agents")
            .await
    }

    pub async fn get_agent(&self, id: AgentId) -> Result<Agent> {
        self.get(&format!("/api/agents/{}", id), "get agent").await
    }

    pub async fn remove_agent(&self, id: AgentId, force: bool) -> Result<Agent> {
        self.send(
            self.client
                .delete(self.url(&format!("/api/agents/{}", id)))
                .query(&[("force", force)]),
            "remove agent",
        )
        .await
    }

    pub async fn report_agent_error(&self, id: AgentId, reason: String) -> Result<Agent> {
        self.post(
            &format!("/api/agents/{}/error", id),
            &AgentErrorRequest { reason },
            "report agent error",
        )
        .await
    }

    // Tasks

    pub async fn submit_task(&self, swarm_id: SwarmId, request: &NewTask) -> Result<Task> {
        self.post(&format!("/api/swarms/{}/tasks", swarm_id), request, "submit task")
            .await
    }

    pub async fn list_tasks(
        &self,
        swarm_id: SwarmId,
        status: Option<TaskStatus>,
    ) -> Result<Vec<Task>> {
        let mut request = self.client.get(self.url(&format!("/api/swarms/{}/tasks", swarm_id)));
        if let Some(status) = status {
            request = request.query(&[("status", status.as_str())]);
        }
        self.send(request, "list tasks").await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task> {
        self.get(&format!("/api/tasks/{}", id), "get task").await
    }

    pub async fn report_result(
        &self,
        id: TaskId,
        success: bool,
        payload: Option<serde_json::Value>,
    ) -> Result<Task> {
        self.post(
            &format!("/api/tasks/{}/result", id),
            &ReportResultRequest { success, payload },
            "report task result",
        )
        .await
    }

    pub async fn cancel_task(&self, id: TaskId) -> Result<Task> {
        self.post(&format!("/api/tasks/{}/cancel", id), &serde_json::json!({}), "cancel task")
            .await
    }

    // Memory

    pub async fn put_memory(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        ttl_seconds: Option<u64>,
    ) -> Result<MemoryEntry> {
        self.send(
            self.client
                .put(self.memory_url(swarm_id, namespace, Some(key))?)
                .json(&PutMemoryRequest { value, ttl_seconds }),
            "store memory entry",
        )
        .await
    }

    pub async fn get_memory(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
        key: &str,
    ) -> Result<MemoryEntry> {
        self.send(
            self.client.get(self.memory_url(swarm_id, namespace, Some(key))?),
            "get memory entry",
        )
        .await
    }

    pub async fn delete_memory(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
        key: &str,
    ) -> Result<bool> {
        let response: DeletedResponse = self
            .send(
                self.client.delete(self.memory_url(swarm_id, namespace, Some(key))?),
                "delete memory entry",
            )
            .await?;
        Ok(response.deleted)
    }

    pub async fn list_memory(
        &self,
        swarm_id: SwarmId,
        namespace: &str,
    ) -> Result<Vec<MemoryEntry>> {
        self.send(
            self.client.get(self.memory_url(swarm_id, namespace, None)?),
            "list memory entries",
        )
        .await
    }

    // Sandboxes

    pub async fn create_sandbox(
        &self,
        project_id: String,
        image: Option<String>,
        resources: Option<ResourceLimits>,
    ) -> Result<Sandbox> {
        self.post(
            "/api/sandboxes",
            &CreateSandboxRequest {
                project_id,
                image,
                resources,
            },
            "create sandbox",
        )
        .await
    }

    pub async fn list_sandboxes(&self) -> Result<Vec<Sandbox>> {
        self.get("/api/sandboxes", "list sandboxes").await
    }

    pub async fn get_sandbox(&self, id: SandboxId) -> Result<Sandbox> {
        self.get(&format!("/api/sandboxes/{}", id), "get sandbox").await
    }

    pub async fn get_sandbox_by_project(&self, project_id: &str) -> Result<Sandbox> {
        self.get(&format!("/api/projects/{}/sandbox", project_id), "get project sandbox")
            .await
    }

    pub async fn stop_sandbox(&self, id: SandboxId) -> Result<Sandbox> {
        self.post(&format!("/api/sandboxes/{}/stop", id), &serde_json::json!({}), "stop sandbox")
            .await
    }

    pub async fn reset_sandbox(&self, id: SandboxId) -> Result<Sandbox> {
        self.post(&format!("/api/sandboxes/{}/reset", id), &serde_json::json!({}), "reset sandbox")
            .await
    }

    pub async fn touch_sandbox(&self, id: SandboxId) -> Result<Sandbox> {
        self.post(&format!("/api/sandboxes/{}/touch", id), &serde_json::json!({}), "touch sandbox")
            .await
    }

    pub async fn reconcile_sandboxes(&self) -> Result<ReconcileResponse> {
        self.post("/api/sandboxes/reconcile", &serde_json::json!({}), "reconcile sandboxes")
            .await
    }

    /// Raw `/health` response.
    pub async fn health(&self) -> Result<serde_json::Value> {
        self.get("/health", "check daemon health").await
    }
}
