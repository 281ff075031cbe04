use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Effective daemon configuration. Every section falls back to its defaults
/// when omitted from the TOML file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimlinkConfig {
    pub grpc: GrpcConfig,
    pub environment: EnvironmentConfig,
    pub player: PlayerConfig,
    pub agent: AgentConfig,
    pub dispatcher: DispatcherConfig,
    pub security: SecurityConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrpcConfig {
    pub listen: SocketAddr,
    pub keepalive_secs: u64,
    pub shutdown_grace_ms: u64,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 50051)),
            keepalive_secs: 30,
            shutdown_grace_ms: 5000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    pub default_radius: u32,
    pub max_radius: u32,
    pub update_interval_ms: u64,
    pub max_blocks: u32,
    pub max_entities: u32,
    pub include_air_blocks: bool,
    pub include_entities: bool,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            default_radius: 16,
            max_radius: 64,
            update_interval_ms: 1000,
            max_blocks: 10_000,
            max_entities: 100,
            include_air_blocks: false,
            include_entities: true,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    pub default_move_speed: f64,
    pub max_move_speed: f64,
    pub min_action_delay_ms: u64,
    pub max_action_delay_ms: u64,
    pub enable_pathfinding: bool,
    pub max_pathfinding_range: f64,
    pub state_update_interval_ms: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            default_move_speed: 1.0,
            max_move_speed: 3.0,
            min_action_delay_ms: 50,
            max_action_delay_ms: 5000,
            enable_pathfinding: true,
            max_pathfinding_range: 100.0,
            state_update_interval_ms: 1000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub max_active_agents: usize,
    pub heartbeat_timeout_ms: u64,
    pub session_timeout_minutes: u64,
    pub enable_authentication: bool,
    pub allowed_types: Vec<String>,
    /// Period of the standing expiry sweep; zero disables it.
    pub sweep_interval_ms: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_active_agents: 10,
            heartbeat_timeout_ms: 30_000,
            session_timeout_minutes: 60,
            enable_authentication: true,
            allowed_types: [
                "reinforcement_learning",
                "behavior_tree",
                "scripted",
                "neural_network",
            ]
            .iter()
            .map(|kind| kind.to_string())
            .collect(),
            sweep_interval_ms: 5000,
        }
    }
}

impl AgentConfig {
    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_minutes * 60)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub queue_capacity: usize,
    pub call_timeout_ms: u64,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            call_timeout_ms: 10_000,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    pub enable_rate_limiting: bool,
    pub requests_per_minute: u32,
    pub max_request_size_bytes: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            enable_rate_limiting: true,
            requests_per_minute: 1000,
            max_request_size_bytes: 1_048_576,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub otlp_endpoint: Option<String>,
}

impl SimlinkConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: SimlinkConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing config")
    }

    pub fn validate(&self) -> Result<()> {
        let env = &self.environment;
        check_range("environment.default_radius", env.default_radius, 1, 128)?;
        check_range("environment.max_radius", env.max_radius, 1, 256)?;
        check_range(
            "environment.update_interval_ms",
            env.update_interval_ms,
            100,
            10_000,
        )?;
        if env.default_radius > env.max_radius {
            bail!(
                "environment.default_radius ({}) exceeds environment.max_radius ({})",
                env.default_radius,
                env.max_radius
            );
        }
        if env.max_blocks == 0 {
            bail!("environment.max_blocks must be positive");
        }

        let player = &self.player;
        if player.default_move_speed <= 0.0 || player.max_move_speed <= 0.0 {
            bail!("player move speeds must be positive");
        }
        if player.default_move_speed > player.max_move_speed {
            bail!("player.default_move_speed exceeds player.max_move_speed");
        }
        if player.min_action_delay_ms > player.max_action_delay_ms {
            bail!("player.min_action_delay_ms exceeds player.max_action_delay_ms");
        }
        if player.max_pathfinding_range <= 0.0 {
            bail!("player.max_pathfinding_range must be positive");
        }
        check_range(
            "player.state_update_interval_ms",
            player.state_update_interval_ms,
            100,
            10_000,
        )?;

        if self.agent.max_active_agents == 0 {
            bail!("agent.max_active_agents must be positive");
        }
        if self.agent.heartbeat_timeout_ms == 0 || self.agent.session_timeout_minutes == 0 {
            bail!("agent timeouts must be positive");
        }

        if self.dispatcher.queue_capacity == 0 {
            bail!("dispatcher.queue_capacity must be positive");
        }
        if self.dispatcher.call_timeout_ms == 0 {
            bail!("dispatcher.call_timeout_ms must be positive");
        }

        if self.security.enable_rate_limiting && self.security.requests_per_minute == 0 {
            bail!("security.requests_per_minute must be positive when rate limiting is enabled");
        }
        Ok(())
    }
}

fn check_range<T>(name: &str, value: T, min: T, max: T) -> Result<()>
where
    T: PartialOrd + std::fmt::Display,
{
    if value < min || value > max {
        bail!("{name} must be within {min}..={max}, got {value}");
    }
    Ok(())
}
