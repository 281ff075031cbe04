use crate::app::dispatch::CommandDispatcher;
use crate::domain::world::ItemStack;
use crate::error::{CoreError, CoreResult};
use std::sync::Arc;
use tracing::debug;

/// Inventory contents as seen by a caller; empty slots are `None`.
#[derive(Clone, Debug, PartialEq)]
pub struct InventoryView {
    pub slots: Vec<Option<ItemStack>>,
    pub selected_slot: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DropOutcome {
    pub dropped: ItemStack,
    pub remaining: Option<ItemStack>,
}

pub struct InventoryService {
    dispatcher: Arc<CommandDispatcher>,
}

impl InventoryService {
    pub fn new(dispatcher: Arc<CommandDispatcher>) -> Self {
        Self { dispatcher }
    }

    pub async fn inventory(&self) -> CoreResult<InventoryView> {
        self.dispatcher
            .execute(|engine| {
                let player = engine.ready_player()?;
                Ok(InventoryView {
                    slots: player.inventory.slots().to_vec(),
                    selected_slot: player.inventory.selected_slot(),
                })
            })
            .await
    }

    /// Returns what is left in the slot after use.
    pub async fn use_item(&self, slot: i64) -> CoreResult<Option<ItemStack>> {
        self.dispatcher
            .execute(move |engine| Ok(engine.ready_player_mut()?.use_item(slot)?))
            .await
    }

    /// A count of zero drops a single item.
    pub async fn drop_item(&self, slot: i64, count: u32) -> CoreResult<DropOutcome> {
        let count = count.max(1);
        self.dispatcher
            .execute(move |engine| {
                let player = engine.ready_player_mut()?;
                let (dropped, remaining) = player.inventory.drop_from(slot, count)?;
                debug!(slot, item = %dropped.id, count = dropped.count, "item dropped");
                Ok(DropOutcome { dropped, remaining })
            })
            .await
    }

    pub async fn move_item(&self, from: i64, to: i64, count: u32) -> CoreResult<ItemStack> {
        let count = count.max(1);
        self.dispatcher
            .execute(move |engine| {
                let player = engine.ready_player_mut()?;
                Ok(player.inventory.move_between(from, to, count)?)
            })
            .await
    }

    pub async fn craft(&self, recipe_id: &str, count: u32) -> CoreResult<ItemStack> {
        let recipe_id = recipe_id.trim().to_string();
        if recipe_id.is_empty() {
            return Err(CoreError::invalid("recipe_id is required"));
        }
        let times = count.max(1);
        self.dispatcher
            .execute(move |engine| {
                engine.ready_player()?;
                engine.craft(&recipe_id, times)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::engine::SandboxWorld;
    use crate::app::dispatch::DispatcherOptions;

    fn service() -> InventoryService {
        InventoryService::new(Arc::new(
            CommandDispatcher::start(
                Box::new(SandboxWorld::new()),
                DispatcherOptions::default(),
                None,
            )
            .unwrap(),
        ))
    }

    #[tokio::test]
    async fn lists_every_slot() {
        let view = service().inventory().await.unwrap();
        assert_eq!(view.slots.len(), 36);
        assert_eq!(view.selected_slot, 0);
        assert_eq!(view.slots[0].as_ref().unwrap().id, "oak_log");
        assert!(view.slots[3].is_none());
    }

    #[tokio::test]
    async fn slot_errors_map_to_codes() {
        let service = service();
        assert!(matches!(
            service.use_item(36).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.use_item(-1).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.drop_item(5, 1).await,
            Err(CoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn drop_defaults_to_one_item() {
        let service = service();
        let outcome = service.drop_item(2, 0).await.unwrap();
        assert_eq!(outcome.dropped.count, 1);
        assert_eq!(outcome.remaining.unwrap().count, 31);
    }

    #[tokio::test]
    async fn move_into_empty_slot_splits_stack() {
        let service = service();
        let moved = service.move_item(2, 20, 10).await.unwrap();
        assert_eq!(moved.count, 10);
        let view = service.inventory().await.unwrap();
        assert_eq!(view.slots[2].as_ref().unwrap().count, 22);
        assert_eq!(view.slots[20].as_ref().unwrap().count, 10);
    }

    #[tokio::test]
    async fn craft_consumes_ingredients() {
        let service = service();
        let planks = service.craft("oak_planks", 2).await.unwrap();
        assert_eq!(planks.id, "oak_planks");
        assert_eq!(planks.count, 8);
        let view = service.inventory().await.unwrap();
        assert_eq!(view.slots[0].as_ref().unwrap().count, 14);
    }

    #[tokio::test]
    async fn craft_errors() {
        let service = service();
        assert!(matches!(
            service.craft("  ", 1).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.craft("diamond_sword", 1).await,
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            service.craft("stick", 1).await,
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn huge_craft_count_is_invalid_argument() {
        let service = service();
        assert!(matches!(
            service.craft("crafting_table", 1 << 30).await,
            Err(CoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            service.craft("bread", i32::MAX as u32).await,
            Err(CoreError::InvalidArgument(_))
        ));
        let view = service.inventory().await.unwrap();
        assert_eq!(view.slots[9].as_ref().unwrap().count, 6);
        assert_eq!(service.dispatcher.stats().faulted, 0);
    }
}
