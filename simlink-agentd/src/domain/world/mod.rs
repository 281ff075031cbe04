pub mod action;
pub mod inventory;
pub mod player;
pub mod types;

pub use action::{ActionCommand, ActionHandler, ActionTable, PlayerAction};
pub use inventory::{
    Inventory, InventoryError, ItemStack, Recipe, HOTBAR_SIZE, INVENTORY_SIZE,
};
pub use player::PlayerState;
pub use types::{Block, BlockPos, Entity, Position, Rotation};
