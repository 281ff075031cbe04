use super::value_object::{AgentId, AgentKind};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Fallback heartbeat cadence when a registration does not supply one.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(10_000);

#[derive(Clone, Debug, PartialEq)]
pub struct AgentProfile {
    pub name: String,
    pub kind: AgentKind,
    pub description: String,
    pub capabilities: BTreeMap<String, String>,
    pub heartbeat_interval: Duration,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>, kind: AgentKind) -> Self {
        Self {
            name: name.into(),
            kind,
            description: String::new(),
            capabilities: BTreeMap::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    /// Non-positive intervals fall back to the default cadence.
    pub fn with_heartbeat_interval_ms(mut self, interval_ms: i64) -> Self {
        self.heartbeat_interval = if interval_ms > 0 {
            Duration::from_millis(interval_ms as u64)
        } else {
            DEFAULT_HEARTBEAT_INTERVAL
        };
        self
    }
}

#[derive(Clone, Debug)]
pub struct AgentSession {
    id: AgentId,
    profile: AgentProfile,
    registered_at: DateTime<Utc>,
    last_heartbeat: DateTime<Utc>,
}

impl AgentSession {
    pub fn open(id: AgentId, profile: AgentProfile, now: DateTime<Utc>) -> Self {
        Self {
            id,
            profile,
            registered_at: now,
            last_heartbeat: now,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    pub fn registered_at(&self) -> DateTime<Utc> {
        self.registered_at
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.last_heartbeat
    }

    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        if now > self.last_heartbeat {
            self.last_heartbeat = now;
        }
    }

    /// Still within the heartbeat window.
    pub fn is_active(&self, now: DateTime<Utc>, heartbeat_timeout: Duration) -> bool {
        elapsed(self.last_heartbeat, now) <= heartbeat_timeout
    }

    /// Heartbeat silence or absolute session age, whichever elapses first.
    pub fn is_expired(
        &self,
        now: DateTime<Utc>,
        heartbeat_timeout: Duration,
        session_timeout: Duration,
    ) -> bool {
        !self.is_active(now, heartbeat_timeout) || elapsed(self.registered_at, now) > session_timeout
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Clone, Debug)]
pub struct AgentSnapshot {
    pub session: AgentSession,
    pub is_active: bool,
}
