use super::inventory::{Inventory, InventoryError, ItemStack};
use super::types::{Position, Rotation};

pub const MAX_FOOD_LEVEL: u32 = 20;

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerState {
    pub name: String,
    pub position: Position,
    pub rotation: Rotation,
    pub health: f32,
    pub max_health: f32,
    pub food_level: u32,
    pub saturation: f32,
    pub experience_level: u32,
    pub experience_progress: f32,
    pub is_sneaking: bool,
    pub is_sprinting: bool,
    pub is_on_ground: bool,
    pub is_flying: bool,
    pub inventory_open: bool,
    pub inventory: Inventory,
}

impl PlayerState {
    pub fn new(name: impl Into<String>, position: Position) -> Self {
        Self {
            name: name.into(),
            position,
            rotation: Rotation::default(),
            health: 20.0,
            max_health: 20.0,
            food_level: MAX_FOOD_LEVEL,
            saturation: 5.0,
            experience_level: 0,
            experience_progress: 0.0,
            is_sneaking: false,
            is_sprinting: false,
            is_on_ground: true,
            is_flying: false,
            inventory_open: false,
            inventory: Inventory::default(),
        }
    }

    /// Horizontal step relative to the current facing. Yaw 0 faces +z.
    pub fn step(&mut self, forward: f64, strafe_right: f64) {
        let yaw = (self.rotation.yaw() as f64).to_radians();
        let (sin, cos) = yaw.sin_cos();
        let dx = -sin * forward - cos * strafe_right;
        let dz = cos * forward - sin * strafe_right;
        self.position = self.position.offset(dx, 0.0, dz);
    }

    /// Uses the item in `slot`. Food is eaten while the player is hungry;
    /// other items are left untouched.
    pub fn use_item(&mut self, slot: i64) -> Result<Option<ItemStack>, InventoryError> {
        let slot = self.inventory.check_slot(slot)?;
        let mut stack = self
            .inventory
            .get(slot)
            .cloned()
            .ok_or(InventoryError::EmptySlot(slot))?;
        if let Some(nutrition) = stack.nutrition() {
            if self.food_level < MAX_FOOD_LEVEL {
                self.food_level = (self.food_level + nutrition).min(MAX_FOOD_LEVEL);
                self.saturation = (self.saturation + nutrition as f32 * 0.6)
                    .min(self.food_level as f32);
                stack.count -= 1;
                self.inventory.set(slot, Some(stack));
            }
        }
        Ok(self.inventory.get(slot).cloned())
    }
}
