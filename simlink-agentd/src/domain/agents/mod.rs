pub mod aggregate;
pub mod value_object;

pub use aggregate::{AgentProfile, AgentSession, AgentSnapshot, DEFAULT_HEARTBEAT_INTERVAL};
pub use value_object::{AgentId, AgentKind, SessionToken, SESSION_TOKEN_LENGTH};
