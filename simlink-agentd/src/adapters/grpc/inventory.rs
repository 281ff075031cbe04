use super::proto::inventory_service_server::{InventoryService, InventoryServiceServer};
use super::proto::{
    CraftItemRequest, CraftItemResponse, DropItemRequest, DropItemResponse, GetInventoryRequest,
    InventoryResponse, MoveItemRequest, MoveItemResponse, UseItemRequest, UseItemResponse,
};
use super::{convert, map_core_error, CallGuard};
use crate::app::world;
use std::sync::Arc;
use tonic::{async_trait, Request, Response, Status};

#[derive(Clone)]
pub struct GrpcInventoryService {
    guard: CallGuard,
    service: Arc<world::InventoryService>,
}

impl GrpcInventoryService {
    pub fn new(guard: CallGuard, service: Arc<world::InventoryService>) -> Self {
        Self { guard, service }
    }

    pub fn into_server(self) -> InventoryServiceServer<Self> {
        InventoryServiceServer::new(self)
    }
}

#[async_trait]
impl InventoryService for GrpcInventoryService {
    async fn get_inventory(
        &self,
        request: Request<GetInventoryRequest>,
    ) -> Result<Response<InventoryResponse>, Status> {
        self.guard.authorize(&request)?;
        let view = self.service.inventory().await.map_err(map_core_error)?;
        Ok(Response::new(InventoryResponse {
            success: true,
            items: convert::slots(&view.slots),
            selected_slot: view.selected_slot as i32,
        }))
    }

    async fn use_item(
        &self,
        request: Request<UseItemRequest>,
    ) -> Result<Response<UseItemResponse>, Status> {
        self.guard.authorize(&request)?;
        let slot = request.get_ref().slot;
        let remaining = self
            .service
            .use_item(slot as i64)
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(UseItemResponse {
            success: true,
            updated_item: Some(convert::item(slot as usize, remaining.as_ref())),
        }))
    }

    async fn drop_item(
        &self,
        request: Request<DropItemRequest>,
    ) -> Result<Response<DropItemResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let outcome = self
            .service
            .drop_item(payload.slot as i64, convert::non_negative(payload.count))
            .await
            .map_err(map_core_error)?;
        let slot = payload.slot as usize;
        Ok(Response::new(DropItemResponse {
            success: true,
            dropped_item: Some(convert::item(slot, Some(&outcome.dropped))),
            remaining_item: Some(convert::item(slot, outcome.remaining.as_ref())),
        }))
    }

    async fn move_item(
        &self,
        request: Request<MoveItemRequest>,
    ) -> Result<Response<MoveItemResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let moved = self
            .service
            .move_item(
                payload.from_slot as i64,
                payload.to_slot as i64,
                convert::non_negative(payload.count),
            )
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(MoveItemResponse {
            success: true,
            moved_item: Some(convert::item(payload.to_slot as usize, Some(&moved))),
        }))
    }

    async fn craft_item(
        &self,
        request: Request<CraftItemRequest>,
    ) -> Result<Response<CraftItemResponse>, Status> {
        self.guard.authorize(&request)?;
        let payload = request.into_inner();
        let crafted = self
            .service
            .craft(&payload.recipe_id, convert::non_negative(payload.count))
            .await
            .map_err(map_core_error)?;
        Ok(Response::new(CraftItemResponse {
            success: true,
            crafted_item: Some(convert::item(0, Some(&crafted))),
        }))
    }
}
