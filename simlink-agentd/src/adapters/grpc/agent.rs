use super::proto::agent_service_server::{AgentService, AgentServiceServer};
use super::proto::{
    ActiveAgentsResponse, HeartbeatRequest, HeartbeatResponse, ListActiveAgentsRequest,
    RegisterAgentRequest, RegisterAgentResponse, UnregisterAgentRequest, UnregisterAgentResponse,
};
use super::{convert, map_core_error, CallGuard};
use crate::domain::agents::{AgentKind, AgentProfile};
use tonic::{async_trait, Request, Response, Status};

#[derive(Clone)]
pub struct GrpcAgentService {
    guard: CallGuard,
}

impl GrpcAgentService {
    pub fn new(guard: CallGuard) -> Self {
        Self { guard }
    }

    pub fn into_server(self) -> AgentServiceServer<Self> {
        AgentServiceServer::new(self)
    }
}

#[async_trait]
impl AgentService for GrpcAgentService {
    async fn register(
        &self,
        request: Request<RegisterAgentRequest>,
    ) -> Result<Response<RegisterAgentResponse>, Status> {
        self.guard.admit(&request)?;
        let payload = request.into_inner();

        let mut profile = AgentProfile::new(payload.agent_name, AgentKind::new(payload.agent_type))
            .with_heartbeat_interval_ms(payload.heartbeat_interval_ms as i64);
        profile.description = payload.description;
        profile.capabilities = payload.capabilities.into_iter().collect();

        let registration = self
            .guard
            .registry()
            .register(&payload.agent_id, profile)
            .map_err(map_core_error)?;

        Ok(Response::new(RegisterAgentResponse {
            success: true,
            session_token: registration.token.as_str().to_string(),
            registered_at: Some(convert::timestamp(registration.registered_at)),
        }))
    }

    async fn unregister(
        &self,
        request: Request<UnregisterAgentRequest>,
    ) -> Result<Response<UnregisterAgentResponse>, Status> {
        self.guard.admit(&request)?;
        let payload = request.into_inner();
        self.guard
            .registry()
            .unregister(&payload.agent_id, &payload.session_token)
            .map_err(map_core_error)?;
        Ok(Response::new(UnregisterAgentResponse { success: true }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        self.guard.admit(&request)?;
        let payload = request.into_inner();
        let server_time = self
            .guard
            .registry()
            .heartbeat(&payload.agent_id, &payload.session_token)
            .map_err(map_core_error)?;
        Ok(Response::new(HeartbeatResponse {
            success: true,
            server_time: Some(convert::timestamp(server_time)),
        }))
    }

    async fn list_active(
        &self,
        request: Request<ListActiveAgentsRequest>,
    ) -> Result<Response<ActiveAgentsResponse>, Status> {
        self.guard.admit(&request)?;
        let agents = self
            .guard
            .registry()
            .list_active()
            .iter()
            .map(convert::agent_info)
            .collect();
        Ok(Response::new(ActiveAgentsResponse {
            success: true,
            agents,
        }))
    }
}
