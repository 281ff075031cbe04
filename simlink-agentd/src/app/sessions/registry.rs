use crate::config::AgentConfig;
use crate::domain::agents::{AgentId, AgentProfile, AgentSession, AgentSnapshot, SessionToken};
use crate::error::{CoreError, CoreResult};
use crate::ports::clock::Clock;
use crate::telemetry::BridgeMetrics;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Attempts at drawing an unused token before giving up.
const MAX_TOKEN_ATTEMPTS: usize = 8;

type TokenSource = Box<dyn Fn() -> SessionToken + Send + Sync>;

#[derive(Clone, Debug)]
pub struct SessionPolicy {
    pub max_active_agents: usize,
    pub heartbeat_timeout: Duration,
    pub session_timeout: Duration,
    pub enable_authentication: bool,
    pub allowed_types: Vec<String>,
}

impl From<&AgentConfig> for SessionPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            max_active_agents: config.max_active_agents,
            heartbeat_timeout: config.heartbeat_timeout(),
            session_timeout: config.session_timeout(),
            enable_authentication: config.enable_authentication,
            allowed_types: config.allowed_types.clone(),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::from(&AgentConfig::default())
    }
}

#[derive(Clone, Debug)]
pub struct Registration {
    pub token: SessionToken,
    pub registered_at: DateTime<Utc>,
}

struct SessionEntry {
    session: AgentSession,
    token: SessionToken,
}

/// Both maps live behind one lock so a token never exists without its
/// session or the other way round.
#[derive(Default)]
struct RegistryInner {
    sessions: HashMap<AgentId, SessionEntry>,
    tokens: HashMap<SessionToken, AgentId>,
}

impl RegistryInner {
    fn remove(&mut self, id: &AgentId) -> Option<SessionEntry> {
        let entry = self.sessions.remove(id)?;
        self.tokens.remove(&entry.token);
        Some(entry)
    }

    fn expired_ids(&self, now: DateTime<Utc>, policy: &SessionPolicy) -> Vec<AgentId> {
        self.sessions
            .values()
            .filter(|entry| {
                entry
                    .session
                    .is_expired(now, policy.heartbeat_timeout, policy.session_timeout)
            })
            .map(|entry| entry.session.id().clone())
            .collect()
    }
}

pub struct SessionRegistry {
    inner: Mutex<RegistryInner>,
    policy: SessionPolicy,
    clock: Arc<dyn Clock>,
    token_source: TokenSource,
    metrics: Option<Arc<BridgeMetrics>>,
}

impl SessionRegistry {
    pub fn new(
        policy: SessionPolicy,
        clock: Arc<dyn Clock>,
        metrics: Option<Arc<BridgeMetrics>>,
    ) -> Self {
        Self {
            inner: Mutex::new(RegistryInner::default()),
            policy,
            clock,
            token_source: Box::new(SessionToken::generate),
            metrics,
        }
    }

    /// Replaces the token generator.
    pub fn with_token_source<F>(mut self, source: F) -> Self
    where
        F: Fn() -> SessionToken + Send + Sync + 'static,
    {
        self.token_source = Box::new(source);
        self
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn register(&self, raw_id: &str, profile: AgentProfile) -> CoreResult<Registration> {
        let id = AgentId::new(raw_id).map_err(CoreError::InvalidArgument)?;
        let now = self.clock.now();

        let mut inner = self.inner.lock();
        self.sweep_locked(&mut inner, now);

        if inner.sessions.len() >= self.policy.max_active_agents {
            return Err(CoreError::ResourceExhausted(format!(
                "maximum number of active agents reached ({})",
                self.policy.max_active_agents
            )));
        }
        if inner.sessions.contains_key(&id) {
            return Err(CoreError::AlreadyExists(format!(
                "agent {id} is already registered"
            )));
        }
        if self.policy.enable_authentication && !profile.kind.is_allowed(&self.policy.allowed_types)
        {
            return Err(CoreError::PermissionDenied(format!(
                "agent type not allowed: {}",
                profile.kind
            )));
        }

        let token = self.fresh_token(&inner)?;
        let kind = profile.kind.clone();
        inner.tokens.insert(token.clone(), id.clone());
        inner.sessions.insert(
            id.clone(),
            SessionEntry {
                session: AgentSession::open(id.clone(), profile, now),
                token: token.clone(),
            },
        );
        drop(inner);

        info!(agent_id = %id, agent_type = %kind, "agent registered");
        Ok(Registration {
            token,
            registered_at: now,
        })
    }

    fn fresh_token(&self, inner: &RegistryInner) -> CoreResult<SessionToken> {
        for _ in 0..MAX_TOKEN_ATTEMPTS {
            let candidate = (self.token_source)();
            if !inner.tokens.contains_key(&candidate) {
                return Ok(candidate);
            }
            warn!("session token collision, regenerating");
        }
        Err(CoreError::internal("could not allocate a unique session token"))
    }

    pub fn unregister(&self, raw_id: &str, token: &str) -> CoreResult<()> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let id = self.verify_locked(&mut inner, raw_id, token, now)?;
        inner.remove(&id);
        drop(inner);
        info!(agent_id = %id, "agent unregistered");
        Ok(())
    }

    /// Records liveness and returns the server time it was recorded at.
    pub fn heartbeat(&self, raw_id: &str, token: &str) -> CoreResult<DateTime<Utc>> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        let id = self.verify_locked(&mut inner, raw_id, token, now)?;
        if let Some(entry) = inner.sessions.get_mut(&id) {
            entry.session.record_heartbeat(now);
        }
        debug!(agent_id = %id, "heartbeat");
        Ok(now)
    }

    /// Resolves credentials presented on a non-agent call.
    pub fn authenticate(&self, raw_id: &str, token: &str) -> CoreResult<AgentId> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.verify_locked(&mut inner, raw_id, token, now)
    }

    pub fn list_active(&self) -> Vec<AgentSnapshot> {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.sweep_locked(&mut inner, now);
        let mut snapshot: Vec<AgentSnapshot> = inner
            .sessions
            .values()
            .map(|entry| AgentSnapshot {
                is_active: entry.session.is_active(now, self.policy.heartbeat_timeout),
                session: entry.session.clone(),
            })
            .collect();
        drop(inner);
        snapshot.sort_by(|a, b| a.session.id().cmp(b.session.id()));
        snapshot
    }

    /// Evicts every expired session, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut inner = self.inner.lock();
        self.sweep_locked(&mut inner, now)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn sweep_locked(&self, inner: &mut RegistryInner, now: DateTime<Utc>) -> usize {
        let expired = inner.expired_ids(now, &self.policy);
        for id in &expired {
            inner.remove(id);
            info!(agent_id = %id, "agent session expired");
        }
        if !expired.is_empty() {
            if let Some(metrics) = &self.metrics {
                metrics.record_sessions_expired(expired.len() as u64);
            }
        }
        expired.len()
    }

    fn verify_locked(
        &self,
        inner: &mut RegistryInner,
        raw_id: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> CoreResult<AgentId> {
        if raw_id.trim().is_empty() || token.is_empty() {
            return Err(CoreError::invalid("agent_id and session_token are required"));
        }
        let id = AgentId::new(raw_id).map_err(CoreError::InvalidArgument)?;
        let bound = inner.tokens.get(&SessionToken::from_raw(token));
        if bound != Some(&id) {
            warn!(agent_id = %id, "authentication failed");
            return Err(CoreError::Unauthenticated("invalid session token".into()));
        }

        let expired = inner
            .sessions
            .get(&id)
            .map(|entry| {
                entry
                    .session
                    .is_expired(now, self.policy.heartbeat_timeout, self.policy.session_timeout)
            })
            .unwrap_or(true);
        if expired {
            inner.remove(&id);
            info!(agent_id = %id, "agent session expired");
            if let Some(metrics) = &self.metrics {
                metrics.record_sessions_expired(1);
            }
            return Err(CoreError::Unauthenticated("session expired".into()));
        }
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::agents::AgentKind;
    use crate::ports::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn profile(kind: &str) -> AgentProfile {
        AgentProfile::new("Test Agent", AgentKind::new(kind))
    }

    fn registry(max: usize) -> (SessionRegistry, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let policy = SessionPolicy {
            max_active_agents: max,
            ..SessionPolicy::default()
        };
        (SessionRegistry::new(policy, clock.clone(), None), clock)
    }

    #[test]
    fn register_validates_in_order() {
        let (registry, _) = registry(1);
        assert!(matches!(
            registry.register("  ", profile("scripted")),
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            registry.register("bot1", profile("chess_engine")),
            Err(CoreError::PermissionDenied(_))
        ));
        registry.register("bot1", profile("scripted")).unwrap();
        assert!(matches!(
            registry.register("bot2", profile("scripted")),
            Err(CoreError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn duplicate_id_is_rejected() {
        let (registry, _) = registry(5);
        registry.register("bot1", profile("scripted")).unwrap();
        assert!(matches!(
            registry.register("bot1", profile("scripted")),
            Err(CoreError::AlreadyExists(_))
        ));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn type_check_skipped_without_authentication() {
        let clock = Arc::new(ManualClock::default());
        let policy = SessionPolicy {
            enable_authentication: false,
            ..SessionPolicy::default()
        };
        let registry = SessionRegistry::new(policy, clock, None);
        registry.register("bot1", profile("anything")).unwrap();
    }

    #[test]
    fn concurrent_distinct_registrations_fill_capacity() {
        let max = 8;
        let (registry, _) = registry(max);
        let barrier = Barrier::new(max + 1);
        let successes = AtomicUsize::new(0);
        let exhausted = AtomicUsize::new(0);
        thread::scope(|scope| {
            for n in 0..=max {
                let registry = &registry;
                let barrier = &barrier;
                let successes = &successes;
                let exhausted = &exhausted;
                scope.spawn(move || {
                    barrier.wait();
                    match registry.register(&format!("bot{n}"), profile("scripted")) {
                        Ok(_) => successes.fetch_add(1, Ordering::SeqCst),
                        Err(CoreError::ResourceExhausted(_)) => exhausted.fetch_add(1, Ordering::SeqCst),
                        Err(other) => panic!("unexpected error: {other}"),
                    };
                });
            }
        });
        assert_eq!(successes.load(Ordering::SeqCst), max);
        assert_eq!(exhausted.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), max);
    }

    #[test]
    fn racing_same_id_admits_exactly_one() {
        let (registry, _) = registry(10);
        let barrier = Barrier::new(2);
        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let registry = &registry;
                    let barrier = &barrier;
                    scope.spawn(move || {
                        barrier.wait();
                        registry.register("same", profile("scripted"))
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        let ok = results.iter().filter(|r| r.is_ok()).count();
        let dup = results
            .iter()
            .filter(|r| matches!(r, Err(CoreError::AlreadyExists(_))))
            .count();
        assert_eq!((ok, dup), (1, 1));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn heartbeats_keep_session_until_silence_exceeds_timeout() {
        let (registry, clock) = registry(10);
        let profile = profile("scripted").with_heartbeat_interval_ms(5000);
        let token = registry.register("bot1", profile).unwrap().token;

        for _ in 0..20 {
            clock.advance(Duration::from_secs(4));
            registry.heartbeat("bot1", token.as_str()).unwrap();
            let active = registry.list_active();
            assert_eq!(active.len(), 1);
            assert!(active[0].is_active);
        }

        clock.advance(Duration::from_millis(30_001));
        assert!(registry.list_active().is_empty());
        assert!(matches!(
            registry.heartbeat("bot1", token.as_str()),
            Err(CoreError::Unauthenticated(_))
        ));
    }

    #[test]
    fn absolute_timeout_evicts_even_with_heartbeats() {
        let clock = Arc::new(ManualClock::default());
        let policy = SessionPolicy {
            session_timeout: Duration::from_secs(60),
            ..SessionPolicy::default()
        };
        let registry = SessionRegistry::new(policy, clock.clone(), None);
        let token = registry.register("bot1", profile("scripted")).unwrap().token;
        for _ in 0..6 {
            clock.advance(Duration::from_secs(10));
            registry.heartbeat("bot1", token.as_str()).unwrap();
        }
        clock.advance(Duration::from_secs(1));
        assert_eq!(registry.sweep_expired(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn unregister_requires_matching_token() {
        let (registry, _) = registry(10);
        let first = registry.register("bot1", profile("scripted")).unwrap().token;
        let second = registry.register("bot2", profile("scripted")).unwrap().token;

        assert!(matches!(
            registry.unregister("bot1", second.as_str()),
            Err(CoreError::Unauthenticated(_))
        ));
        assert!(matches!(
            registry.unregister("bot1", ""),
            Err(CoreError::InvalidArgument(_))
        ));
        registry.unregister("bot1", first.as_str()).unwrap();
        assert!(matches!(
            registry.authenticate("bot1", first.as_str()),
            Err(CoreError::Unauthenticated(_))
        ));
        assert_eq!(registry.authenticate("bot2", second.as_str()).unwrap().as_str(), "bot2");
    }

    #[test]
    fn authenticate_evicts_unswept_expired_session() {
        let (registry, clock) = registry(10);
        let token = registry.register("bot1", profile("scripted")).unwrap().token;
        clock.advance(Duration::from_secs(31));
        assert!(matches!(
            registry.authenticate("bot1", token.as_str()),
            Err(CoreError::Unauthenticated(_))
        ));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn token_collision_regenerates() {
        let clock = Arc::new(ManualClock::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let registry = SessionRegistry::new(SessionPolicy::default(), clock, None)
            .with_token_source(move || {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                // First two draws collide with the first session's token.
                SessionToken::from_raw(if n < 2 { "fixed" } else { "fresh" })
            });
        let first = registry.register("bot1", profile("scripted")).unwrap();
        assert_eq!(first.token.as_str(), "fixed");
        let second = registry.register("bot2", profile("scripted")).unwrap();
        assert_eq!(second.token.as_str(), "fresh");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausted_token_space_is_internal() {
        let clock = Arc::new(ManualClock::default());
        let registry = SessionRegistry::new(SessionPolicy::default(), clock, None)
            .with_token_source(|| SessionToken::from_raw("same"));
        registry.register("bot1", profile("scripted")).unwrap();
        assert!(matches!(
            registry.register("bot2", profile("scripted")),
            Err(CoreError::Internal(_))
        ));
        assert_eq!(registry.len(), 1);
    }
}
