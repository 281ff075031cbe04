//! tonic front end for the four bridge services.

mod agent;
pub mod convert;
mod environment;
mod inventory;
mod player;

pub use agent::GrpcAgentService;
pub use environment::GrpcEnvironmentService;
pub use inventory::GrpcInventoryService;
pub use player::GrpcPlayerService;

pub mod proto {
    tonic::include_proto!("simlink.v1");
}

use crate::app::gatekeeper::Gatekeeper;
use crate::app::sessions::SessionRegistry;
use crate::domain::agents::AgentId;
use crate::error::CoreError;
use futures::Stream;
use prost::Message;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tonic::{Request, Status};

pub const AGENT_ID_HEADER: &str = "x-agent-id";
pub const SESSION_TOKEN_HEADER: &str = "x-session-token";

/// Frames buffered between a stream loop and its client.
pub(crate) const STREAM_BUFFER: usize = 16;

pub type ResponseStream<T> = Pin<Box<dyn Stream<Item = Result<T, Status>> + Send>>;

pub fn map_core_error(err: CoreError) -> Status {
    match err {
        CoreError::InvalidArgument(reason) => Status::invalid_argument(reason),
        CoreError::AlreadyExists(reason) => Status::already_exists(reason),
        CoreError::ResourceExhausted(reason) | CoreError::RateLimitExceeded(reason) => {
            Status::resource_exhausted(reason)
        }
        CoreError::PermissionDenied(reason) => Status::permission_denied(reason),
        CoreError::Unauthenticated(reason) => Status::unauthenticated(reason),
        CoreError::NotFound(reason) => Status::not_found(reason),
        CoreError::Unavailable(reason) => Status::unavailable(reason),
        CoreError::Unimplemented(reason) => Status::unimplemented(reason),
        CoreError::Internal(reason) => Status::internal(reason),
    }
}

/// Admission and credential checks shared by every service.
#[derive(Clone)]
pub struct CallGuard {
    gatekeeper: Arc<Gatekeeper>,
    registry: Arc<SessionRegistry>,
}

impl CallGuard {
    pub fn new(gatekeeper: Arc<Gatekeeper>, registry: Arc<SessionRegistry>) -> Self {
        Self {
            gatekeeper,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Size and rate checks only. Used by the agent lifecycle calls, which
    /// carry their credentials in the message body.
    #[allow(clippy::result_large_err)]
    pub fn admit<T: Message>(&self, request: &Request<T>) -> Result<(), Status> {
        self.gatekeeper
            .admit(&caller_key(request), request.get_ref().encoded_len())
            .map_err(map_core_error)
    }

    /// Admission followed by session authentication when it is enabled.
    #[allow(clippy::result_large_err)]
    pub fn authorize<T: Message>(&self, request: &Request<T>) -> Result<Option<AgentId>, Status> {
        self.admit(request)?;
        if !self.registry.policy().enable_authentication {
            return Ok(None);
        }
        let agent_id = metadata(request, AGENT_ID_HEADER);
        let token = metadata(request, SESSION_TOKEN_HEADER);
        match (agent_id, token) {
            (Some(agent_id), Some(token)) => self
                .registry
                .authenticate(agent_id, token)
                .map(Some)
                .map_err(|err| match err {
                    CoreError::InvalidArgument(reason) => Status::unauthenticated(reason),
                    other => map_core_error(other),
                }),
            _ => Err(Status::unauthenticated(format!(
                "{AGENT_ID_HEADER} and {SESSION_TOKEN_HEADER} metadata are required"
            ))),
        }
    }
}

fn metadata<'a, T>(request: &'a Request<T>, key: &str) -> Option<&'a str> {
    request
        .metadata()
        .get(key)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// Rate-limit key: declared agent id, then peer address, then a shared
/// anonymous bucket.
fn caller_key<T>(request: &Request<T>) -> String {
    if let Some(agent_id) = metadata(request, AGENT_ID_HEADER) {
        return agent_id.to_string();
    }
    match request.remote_addr() {
        Some(addr) => addr.to_string(),
        None => "anonymous".to_string(),
    }
}

/// Adapts a stream loop's sink into a tonic response stream.
pub(crate) fn response_stream<T, P, F>(
    rx: mpsc::Receiver<crate::error::CoreResult<T>>,
    to_proto: F,
) -> ResponseStream<P>
where
    T: Send + 'static,
    P: Send + 'static,
    F: Fn(&T) -> P + Send + 'static,
{
    Box::pin(ReceiverStream::new(rx).map(move |frame| match frame {
        Ok(value) => Ok(to_proto(&value)),
        Err(err) => Err(map_core_error(err)),
    }))
}
