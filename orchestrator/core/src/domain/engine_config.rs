// Copyright (c) 2026 Hive Orchestrator Contributors
// SPDX-License-Identifier: AGPL-3.0

// Engine Configuration Types
//
// Defines the configuration schema consumed by the engine:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Port pool range for sandbox allocation
// - Sandbox image allow-list, default resources, isolation network, timeouts
// - Swarm termination grace and memory TTL sweep interval
// - API binding and observability settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::port_pool::{DEFAULT_PORT_BASE, DEFAULT_PORT_POOL_SIZE};
use crate::domain::runtime::ResourceLimits;

pub const API_VERSION: &str = "hive.dev/v1";
pub const KIND: &str = "EngineConfig";
pub const CONFIG_PATH_ENV: &str = "HIVE_CONFIG_PATH";

/// Top-level Kubernetes-style engine configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfigManifest {
    /// API version (must be "hive.dev/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "EngineConfig")
    pub kind: String,

    pub metadata: ManifestMetadata,

    #[serde(default)]
    pub spec: EngineConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    /// Human-readable engine name
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

/// Engine configuration specification (content under spec:)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfigSpec {
    #[serde(default)]
    pub port_pool: PortPoolConfig,

    #[serde(default)]
    pub sandbox: SandboxConfig,

    #[serde(default)]
    pub swarm: SwarmConfig,

    #[serde(default)]
    pub api: ApiConfig,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortPoolConfig {
    /// First port of the pool
    #[serde(default = "default_port_base")]
    pub base: u16,

    /// Number of ports in the pool
    #[serde(default = "default_port_pool_size")]
    pub size: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeBackend {
    /// Local Docker daemon via bollard
    Docker,
    /// In-process runtime that starts nothing (development and tests)
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    #[serde(default = "default_runtime_backend")]
    pub runtime: RuntimeBackend,

    /// Images a sandbox may be created from
    #[serde(default = "default_allowed_images")]
    pub allowed_images: Vec<String>,

    /// Image used when the caller does not name one
    #[serde(default = "default_image")]
    pub default_image: String,

    #[serde(default)]
    pub default_resources: ResourceLimits,

    /// Dedicated bridge network with inter-container traffic disabled
    #[serde(default = "default_sandbox_network")]
    pub network: String,

    #[serde(default = "default_start_timeout")]
    pub start_timeout_seconds: u64,

    /// Grace period before a stop falls back to forced removal
    #[serde(default = "default_stop_grace")]
    pub stop_grace_seconds: u64,

    /// Automatic retries of a failed container start
    #[serde(default = "default_start_retries")]
    pub start_retries: u32,

    #[serde(default = "default_reconcile_interval")]
    pub reconcile_interval_seconds: u64,

    /// Docker socket path (auto-detected when unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub docker_socket: Option<String>,
}

impl SandboxConfig {
    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_seconds)
    }

    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// How long TerminateSwarm waits for in-progress tasks
    #[serde(default = "default_termination_grace")]
    pub termination_grace_seconds: u64,

    /// Interval of the background memory TTL sweep
    #[serde(default = "default_memory_sweep_interval")]
    pub memory_sweep_interval_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_api_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "trace")
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format ("json" or "text")
    #[serde(default = "default_log_format")]
    pub format: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Prometheus exporter port
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_port_base() -> u16 {
    DEFAULT_PORT_BASE
}

fn default_port_pool_size() -> u16 {
    DEFAULT_PORT_POOL_SIZE
}

fn default_runtime_backend() -> RuntimeBackend {
    RuntimeBackend::Docker
}

fn default_image() -> String {
    "ubuntu:22.04".to_string()
}

fn default_allowed_images() -> Vec<String> {
    vec![default_image()]
}

fn default_sandbox_network() -> String {
    "hive-sandbox-isolated".to_string()
}

fn default_start_timeout() -> u64 {
    60
}

fn default_stop_grace() -> u64 {
    10
}

fn default_start_retries() -> u32 {
    1
}

fn default_reconcile_interval() -> u64 {
    30
}

fn default_termination_grace() -> u64 {
    30
}

fn default_memory_sweep_interval() -> u64 {
    60
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for PortPoolConfig {
    fn default() -> Self {
        Self {
            base: default_port_base(),
            size: default_port_pool_size(),
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            runtime: default_runtime_backend(),
            allowed_images: default_allowed_images(),
            default_image: default_image(),
            default_resources: ResourceLimits::default(),
            network: default_sandbox_network(),
            start_timeout_seconds: default_start_timeout(),
            stop_grace_seconds: default_stop_grace(),
            start_retries: default_start_retries(),
            reconcile_interval_seconds: default_reconcile_interval(),
            docker_socket: None,
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            termination_grace_seconds: default_termination_grace(),
            memory_sweep_interval_seconds: default_memory_sweep_interval(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_api_port(),
        }
    }
}

impl Default for EngineConfigManifest {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "hive-engine".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: hostname,
                version: Some("1.0.0".to_string()),
                labels: None,
            },
            spec: EngineConfigSpec::default(),
        }
    }
}

impl EngineConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Parse configuration from YAML string
    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. HIVE_CONFIG_PATH environment variable
    /// 2. ./hive-config.yaml (working directory)
    /// 3. ~/.hive/config.yaml (user home)
    /// 4. /etc/hive/config.yaml (system, Unix) or C:\ProgramData\Hive\config.yaml (Windows)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./hive-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".hive").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        #[cfg(unix)]
        let system_config = PathBuf::from("/etc/hive/config.yaml");
        #[cfg(windows)]
        let system_config = PathBuf::from("C:\\ProgramData\\Hive\\config.yaml");

        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        if let Some(config_path) = Self::discover_config() {
            tracing::info!("Loading configuration from discovered path: {:?}", config_path);
            let mut config = Self::from_yaml_file(config_path)?;
            config.apply_env_overrides();
            Ok(config)
        } else {
            tracing::warn!("No configuration file found in standard locations. Using defaults.");
            let mut config = Self::default();
            config.apply_env_overrides();
            Ok(config)
        }
    }

    /// Apply environment variable overrides to configuration
    /// This allows container deployments to override config via env vars
    pub fn apply_env_overrides(&mut self) {
        if let Some(base) = parse_env::<u16>("HIVE_PORT_POOL_BASE") {
            tracing::info!("Environment override: HIVE_PORT_POOL_BASE={}", base);
            self.spec.port_pool.base = base;
        }

        if let Some(size) = parse_env::<u16>("HIVE_PORT_POOL_SIZE") {
            tracing::info!("Environment override: HIVE_PORT_POOL_SIZE={}", size);
            self.spec.port_pool.size = size;
        }

        if let Ok(socket) = std::env::var("HIVE_DOCKER_SOCKET") {
            tracing::info!("Environment override: HIVE_DOCKER_SOCKET={}", socket);
            self.spec.sandbox.docker_socket = Some(socket);
        }

        if let Ok(network) = std::env::var("HIVE_SANDBOX_NETWORK") {
            tracing::info!("Environment override: HIVE_SANDBOX_NETWORK={}", network);
            self.spec.sandbox.network = network;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        let pool = &self.spec.port_pool;
        if pool.size == 0 {
            anyhow::bail!("spec.port_pool.size must be greater than zero");
        }
        if pool.base as u32 + pool.size as u32 > u16::MAX as u32 + 1 {
            anyhow::bail!(
                "spec.port_pool range {}+{} exceeds the highest port",
                pool.base,
                pool.size
            );
        }

        let sandbox = &self.spec.sandbox;
        if sandbox.allowed_images.is_empty() {
            anyhow::bail!("spec.sandbox.allowed_images cannot be empty");
        }
        if !sandbox.allowed_images.contains(&sandbox.default_image) {
            anyhow::bail!(
                "spec.sandbox.default_image '{}' is not in allowed_images",
                sandbox.default_image
            );
        }
        if sandbox.network.is_empty() {
            anyhow::bail!("spec.sandbox.network cannot be empty");
        }
        if sandbox.start_timeout_seconds == 0 || sandbox.stop_grace_seconds == 0 {
            anyhow::bail!("spec.sandbox timeouts must be greater than zero");
        }
        if sandbox.default_resources.memory_limit == 0 {
            anyhow::bail!("spec.sandbox.default_resources.memory_limit must be greater than zero");
        }
        if sandbox.reconcile_interval_seconds == 0 {
            anyhow::bail!("spec.sandbox.reconcile_interval_seconds must be greater than zero");
        }

        if self.spec.swarm.memory_sweep_interval_seconds == 0 {
            anyhow::bail!("spec.swarm.memory_sweep_interval_seconds must be greater than zero");
        }

        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let val = std::env::var(name).ok()?;
    match val.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Invalid value for {}: '{}'. Ignoring.", name, val);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let manifest = EngineConfigManifest::default();
        assert_eq!(manifest.api_version, "hive.dev/v1");
        assert_eq!(manifest.kind, "EngineConfig");
        assert!(!manifest.metadata.name.is_empty());
        assert_eq!(manifest.spec.port_pool.base, 8010);
        assert_eq!(manifest.spec.port_pool.size, 80);
        assert_eq!(manifest.spec.sandbox.start_retries, 1);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: hive.dev/v1
kind: EngineConfig
metadata:
  name: test-engine
spec:
  port_pool:
    base: 9100
  sandbox:
    runtime: mock
    allowed_images: ["ubuntu:22.04", "python:3.12-slim"]
"#;
        let manifest = EngineConfigManifest::from_yaml_str(yaml).unwrap();
        assert_eq!(manifest.metadata.name, "test-engine");
        assert_eq!(manifest.spec.port_pool.base, 9100);
        assert_eq!(manifest.spec.port_pool.size, 80);
        assert_eq!(manifest.spec.sandbox.runtime, RuntimeBackend::Mock);
        assert_eq!(manifest.spec.sandbox.allowed_images.len(), 2);
        assert_eq!(manifest.spec.sandbox.network, "hive-sandbox-isolated");
        assert_eq!(manifest.spec.swarm.memory_sweep_interval_seconds, 60);
        assert!(manifest.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive-config.yaml");

        let mut manifest = EngineConfigManifest::default();
        manifest.metadata.name = "roundtrip".to_string();
        manifest.spec.swarm.termination_grace_seconds = 5;
        manifest.to_yaml_file(&path).unwrap();

        let loaded = EngineConfigManifest::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert_eq!(loaded.spec.swarm.termination_grace_seconds, 5);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = EngineConfigManifest::load_or_default(Some(PathBuf::from(
            "/definitely/not/here/hive-config.yaml",
        )));
        assert!(result.is_err());
    }

    #[test]
    fn test_validation() {
        let mut manifest = EngineConfigManifest::default();
        assert!(manifest.validate().is_ok());

        manifest.api_version = "wrong/v1".to_string();
        assert!(manifest.validate().is_err());
        manifest.api_version = API_VERSION.to_string();

        manifest.kind = "WrongKind".to_string();
        assert!(manifest.validate().is_err());
        manifest.kind = KIND.to_string();

        manifest.spec.port_pool.size = 0;
        assert!(manifest.validate().is_err());
        manifest.spec.port_pool.size = 80;

        manifest.spec.port_pool.base = 65500;
        assert!(manifest.validate().is_err());
        manifest.spec.port_pool.base = 8010;

        manifest.spec.sandbox.default_image = "alpine:latest".to_string();
        assert!(manifest.validate().is_err());
        manifest.spec.sandbox.default_image = "ubuntu:22.04".to_string();

        manifest.spec.swarm.memory_sweep_interval_seconds = 0;
        assert!(manifest.validate().is_err());
    }
}
