use super::proto::environment_service_server::{EnvironmentService, EnvironmentServiceServer};
use super::proto::{
    self, BlockInfoRequest, BlockInfoResponse, EntityInfoRequest, EntityInfoResponse,
    ScanResponse, StreamUpdatesRequest,
};
use super::{convert, map_core_error, response_stream, CallGuard, ResponseStream, STREAM_BUFFER};
use crate::app::world::{self, ScanRequest};
use std::sync::Arc;
use tokio::sync::mpsc;
use tonic::{async_trait, Request, Response, Status};
use tracing::debug;

#[derive(Clone)]
pub struct GrpcEnvironmentService {
    guard: CallGuard,
    service: Arc<world::EnvironmentService>,
}

impl GrpcEnvironmentService {
    pub fn new(guard: CallGuard, service: Arc<world::EnvironmentService>) -> Self {
        Self { guard, service }
    }

    pub fn into_server(self) -> EnvironmentServiceServer<Self> {
        EnvironmentServiceServer::new(self)
    }
}

#[async_trait]
impl EnvironmentService for GrpcEnvironmentService {
    type StreamUpdatesStream = ResponseStream<proto::EnvironmentScan>;

    async fn scan(
        &self,
        request: Request<proto::ScanRequest>,
    ) -> Result<Response<ScanResponse>, Status> {
        self.guard.authorize(&request)?;
        let scan = self
            .service
            .scan(&convert::scan_request(request.get_ref()))
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(ScanResponse {
            success: true,
            scan: Some(convert::scan(&scan)),
        }))
    }

    async fn stream_updates(
        &self,
        request: Request<StreamUpdatesRequest>,
    ) -> Result<Response<Self::StreamUpdatesStream>, Status> {
        let agent = self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let scan = payload
            .scan
            .as_ref()
            .map(convert::scan_request)
            .unwrap_or_else(ScanRequest::default);

        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let handle = self
            .service
            .stream_updates(&scan, convert::non_negative(payload.update_interval_ms) as u64, tx)
            .map_err(map_core_error)?;
        debug!(subscription = %handle.id(), agent_id = ?agent, "environment stream opened");
        Ok(Response::new(response_stream(rx, convert::scan)))
    }

    async fn get_block_info(
        &self,
        request: Request<BlockInfoRequest>,
    ) -> Result<Response<BlockInfoResponse>, Status> {
        self.guard.authorize(&request)?;
        let position = request.get_ref().position.as_ref().map(convert::position_from);
        let block = self
            .service
            .block_info(position)
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(BlockInfoResponse {
            success: true,
            block: Some(convert::block(&block)),
        }))
    }

    async fn get_entity_info(
        &self,
        request: Request<EntityInfoRequest>,
    ) -> Result<Response<EntityInfoResponse>, Status> {
        self.guard.authorize(&request)?;
        let entity = self
            .service
            .entity_info(&request.get_ref().entity_id)
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(EntityInfoResponse {
            success: true,
            entity: Some(convert::entity(&entity)),
        }))
    }
}
