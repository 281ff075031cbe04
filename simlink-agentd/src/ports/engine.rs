use crate::domain::world::{Block, BlockPos, Entity, ItemStack, PlayerState, Position};
use crate::error::{CoreError, CoreResult};

/// The simulation being bridged. Implementations are single-threaded: only
/// the dispatcher worker ever holds one, so no method needs interior locking.
pub trait SimulationEngine: Send {
    fn is_ready(&self) -> bool;

    fn dimension(&self) -> String;

    fn block_at(&self, pos: BlockPos) -> Block;

    fn entities_near(&self, center: Position, radius: f64) -> Vec<Entity>;

    fn entity(&self, id: &str) -> Option<Entity>;

    fn player(&self) -> Option<&PlayerState>;

    fn player_mut(&mut self) -> Option<&mut PlayerState>;

    /// Crafts `recipe_id` `times` times from the player's inventory.
    fn craft(&mut self, recipe_id: &str, times: u32) -> CoreResult<ItemStack>;

    fn pathfinding_available(&self) -> bool {
        false
    }

    fn ensure_ready(&self) -> CoreResult<()> {
        if self.is_ready() {
            Ok(())
        } else {
            Err(CoreError::unavailable("world not loaded"))
        }
    }

    fn ready_player(&self) -> CoreResult<&PlayerState> {
        self.ensure_ready()?;
        self.player()
            .ok_or_else(|| CoreError::unavailable("player not available"))
    }

    fn ready_player_mut(&mut self) -> CoreResult<&mut PlayerState> {
        self.ensure_ready()?;
        self.player_mut()
            .ok_or_else(|| CoreError::unavailable("player not available"))
    }
}
