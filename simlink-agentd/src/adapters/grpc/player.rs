use super::proto::player_control_service_server::{
    PlayerControlService, PlayerControlServiceServer,
};
use super::proto::{
    self, ActionResult, ExecuteActionRequest, ExecuteActionResponse, ExecuteActionSequenceRequest,
    ExecuteActionSequenceResponse, GetStateRequest, GetStateResponse, MoveToPositionRequest,
    MoveToPositionResponse, StreamStateRequest,
};
use super::{convert, map_core_error, response_stream, CallGuard, ResponseStream, STREAM_BUFFER};
use crate::app::world::{ActionRequest, MoveRequest, PlayerService};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::{async_trait, Request, Response, Status};
use tracing::debug;

#[derive(Clone)]
pub struct GrpcPlayerService {
    guard: CallGuard,
    service: Arc<PlayerService>,
}

impl GrpcPlayerService {
    pub fn new(guard: CallGuard, service: Arc<PlayerService>) -> Self {
        Self { guard, service }
    }

    pub fn into_server(self) -> PlayerControlServiceServer<Self> {
        PlayerControlServiceServer::new(self)
    }
}

fn action_request(action: i32, parameters: HashMap<String, String>) -> ActionRequest {
    ActionRequest {
        action: convert::action_from(action),
        parameters,
    }
}

#[async_trait]
impl PlayerControlService for GrpcPlayerService {
    type StreamStateStream = ResponseStream<proto::PlayerState>;

    async fn execute_action(
        &self,
        request: Request<ExecuteActionRequest>,
    ) -> Result<Response<ExecuteActionResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let outcome = self
            .service
            .execute_action(&action_request(payload.action, payload.parameters))
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(ExecuteActionResponse {
            success: outcome.success,
            new_state: Some(convert::player_state(&outcome.state)),
        }))
    }

    async fn execute_action_sequence(
        &self,
        request: Request<ExecuteActionSequenceRequest>,
    ) -> Result<Response<ExecuteActionSequenceResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let steps: Vec<ActionRequest> = payload
            .steps
            .into_iter()
            .map(|step| action_request(step.action, step.parameters))
            .collect();
        let outcome = self
            .service
            .execute_sequence(&steps, convert::non_negative(payload.delay_between_actions_ms) as u64)
            .await
            .map_err(map_core_error)?;

        Ok(Response::new(ExecuteActionSequenceResponse {
            success: outcome.all_succeeded(),
            results: outcome
                .results
                .iter()
                .map(|result| ActionResult {
                    action: convert::action(result.action) as i32,
                    success: result.success,
                    error: result.error.clone().unwrap_or_default(),
                })
                .collect(),
            final_state: outcome.final_state.as_ref().map(convert::player_state),
        }))
    }

    async fn get_state(
        &self,
        request: Request<GetStateRequest>,
    ) -> Result<Response<GetStateResponse>, Status> {
        self.guard.authorize(&request)?;
        let state = self.service.state().await.map_err(map_core_error)?;
        Ok(Response::new(GetStateResponse {
            success: true,
            state: Some(convert::player_state(&state)),
        }))
    }

    async fn stream_state(
        &self,
        request: Request<StreamStateRequest>,
    ) -> Result<Response<Self::StreamStateStream>, Status> {
        let agent = self.guard.authorize(&request)?;
        let interval_ms = convert::non_negative(request.get_ref().update_interval_ms) as u64;
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let handle = self
            .service
            .stream_state(interval_ms, tx)
            .map_err(map_core_error)?;
        debug!(subscription = %handle.id(), agent_id = ?agent, "player state stream opened");
        Ok(Response::new(response_stream(rx, convert::player_state)))
    }

    async fn move_to_position(
        &self,
        request: Request<MoveToPositionRequest>,
    ) -> Result<Response<MoveToPositionResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let outcome = self
            .service
            .move_to(&MoveRequest {
                target: payload.target_position.as_ref().map(convert::position_from),
                speed: payload.speed,
                pathfind: payload.pathfind,
            })
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(MoveToPositionResponse {
            success: true,
            new_state: Some(convert::player_state(&outcome.state)),
            distance: outcome.distance,
        }))
    }
}
