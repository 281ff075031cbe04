use thiserror::Error;

pub const INVENTORY_SIZE: usize = 36;
pub const HOTBAR_SIZE: usize = 9;
pub const DEFAULT_MAX_STACK: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("invalid slot: {0}")]
    InvalidSlot(i64),
    #[error("slot {0} is empty")]
    EmptySlot(usize),
    #[error("source and target slot are the same")]
    SameSlot,
    #[error("target slot {0} is full")]
    TargetFull(usize),
    #[error("missing ingredient: {0}")]
    MissingIngredient(String),
    #[error("no room for crafted item {0}")]
    NoRoom(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemStack {
    pub id: String,
    pub count: u32,
    pub max_stack: u32,
}

impl ItemStack {
    pub fn new(id: impl Into<String>, count: u32) -> Self {
        Self {
            id: id.into(),
            count,
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack.max(1);
        self
    }

    pub fn is_same_item(&self, other: &ItemStack) -> bool {
        self.id == other.id
    }

    /// Food points restored by eating one of this item.
    pub fn nutrition(&self) -> Option<u32> {
        match self.id.as_str() {
            "apple" => Some(4),
            "bread" => Some(5),
            "cooked_beef" => Some(8),
            "baked_potato" => Some(5),
            _ => None,
        }
    }

    fn split_off(&mut self, count: u32) -> ItemStack {
        let taken = count.min(self.count);
        self.count -= taken;
        ItemStack {
            id: self.id.clone(),
            count: taken,
            max_stack: self.max_stack,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Inventory {
    slots: Vec<Option<ItemStack>>,
    selected: usize,
}

impl Default for Inventory {
    fn default() -> Self {
        Self {
            slots: vec![None; INVENTORY_SIZE],
            selected: 0,
        }
    }
}

impl Inventory {
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn slots(&self) -> &[Option<ItemStack>] {
        &self.slots
    }

    pub fn selected_slot(&self) -> usize {
        self.selected
    }

    pub fn select(&mut self, slot: usize) -> Result<(), InventoryError> {
        if slot >= HOTBAR_SIZE {
            return Err(InventoryError::InvalidSlot(slot as i64));
        }
        self.selected = slot;
        Ok(())
    }

    pub fn held(&self) -> Option<&ItemStack> {
        self.slots[self.selected].as_ref()
    }

    /// Validates a wire-level slot index against the container size.
    pub fn check_slot(&self, slot: i64) -> Result<usize, InventoryError> {
        if slot < 0 || slot as usize >= self.slots.len() {
            return Err(InventoryError::InvalidSlot(slot));
        }
        Ok(slot as usize)
    }

    pub fn get(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn set(&mut self, slot: usize, stack: Option<ItemStack>) {
        if let Some(entry) = self.slots.get_mut(slot) {
            *entry = stack.filter(|stack| stack.count > 0);
        }
    }

    fn occupied(&self, slot: i64) -> Result<usize, InventoryError> {
        let slot = self.check_slot(slot)?;
        if self.slots[slot].is_none() {
            return Err(InventoryError::EmptySlot(slot));
        }
        Ok(slot)
    }

    /// Removes up to `count` items from `slot`, returning the dropped stack
    /// and whatever remains in the slot.
    pub fn drop_from(
        &mut self,
        slot: i64,
        count: u32,
    ) -> Result<(ItemStack, Option<ItemStack>), InventoryError> {
        let slot = self.occupied(slot)?;
        let mut stack = self.slots[slot].take().ok_or(InventoryError::EmptySlot(slot))?;
        let dropped = stack.split_off(count.max(1));
        self.set(slot, Some(stack));
        Ok((dropped, self.slots[slot].clone()))
    }

    /// Moves items between slots. Same items merge up to the stack limit;
    /// different items swap places.
    pub fn move_between(
        &mut self,
        from: i64,
        to: i64,
        count: u32,
    ) -> Result<ItemStack, InventoryError> {
        let from = self.occupied(from)?;
        let to = self.check_slot(to)?;
        if from == to {
            return Err(InventoryError::SameSlot);
        }
        let count = count.max(1);
        let mut source = self.slots[from].take().ok_or(InventoryError::EmptySlot(from))?;

        match self.slots[to].take() {
            None => {
                let moved = source.split_off(count);
                self.slots[to] = Some(moved.clone());
                self.set(from, Some(source));
                Ok(moved)
            }
            Some(mut target) if target.is_same_item(&source) => {
                let room = target.max_stack.saturating_sub(target.count);
                if room == 0 {
                    self.slots[to] = Some(target);
                    self.slots[from] = Some(source);
                    return Err(InventoryError::TargetFull(to));
                }
                let moved = source.split_off(count.min(room));
                target.count += moved.count;
                self.slots[to] = Some(target);
                self.set(from, Some(source));
                Ok(moved)
            }
            Some(target) => {
                let moved = source.clone();
                self.slots[to] = Some(source);
                self.slots[from] = Some(target);
                Ok(moved)
            }
        }
    }

    pub fn count_of(&self, id: &str) -> u32 {
        self.slots
            .iter()
            .flatten()
            .filter(|stack| stack.id == id)
            .map(|stack| stack.count)
            .sum()
    }

    /// Removes `count` items of `id` across slots. Caller checks availability.
    fn remove(&mut self, id: &str, mut count: u32) {
        for entry in self.slots.iter_mut() {
            if count == 0 {
                break;
            }
            if let Some(stack) = entry {
                if stack.id == id {
                    let taken = stack.split_off(count);
                    count -= taken.count;
                    if stack.count == 0 {
                        *entry = None;
                    }
                }
            }
        }
    }

    /// How many of `stack` would fit without displacing anything.
    fn room_for(&self, stack: &ItemStack) -> u32 {
        self.slots
            .iter()
            .map(|entry| match entry {
                None => stack.max_stack,
                Some(existing) if existing.is_same_item(stack) => {
                    existing.max_stack.saturating_sub(existing.count)
                }
                Some(_) => 0,
            })
            .sum()
    }

    /// Inserts a stack, filling matching stacks first. Returns the leftover.
    pub fn insert(&mut self, mut stack: ItemStack) -> u32 {
        for entry in self.slots.iter_mut().flatten() {
            if stack.count == 0 {
                return 0;
            }
            if entry.is_same_item(&stack) {
                let room = entry.max_stack.saturating_sub(entry.count);
                let moved = stack.split_off(room);
                entry.count += moved.count;
            }
        }
        for entry in self.slots.iter_mut() {
            if stack.count == 0 {
                return 0;
            }
            if entry.is_none() {
                let chunk = stack.split_off(stack.max_stack);
                *entry = Some(chunk);
            }
        }
        stack.count
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Recipe {
    pub id: String,
    pub ingredients: Vec<(String, u32)>,
    pub output: ItemStack,
}

impl Recipe {
    pub fn new(id: impl Into<String>, ingredients: &[(&str, u32)], output: ItemStack) -> Self {
        Self {
            id: id.into(),
            ingredients: ingredients
                .iter()
                .map(|(item, count)| (item.to_string(), *count))
                .collect(),
            output,
        }
    }

    /// Consumes ingredients for `times` crafts and stores the output.
    /// Nothing changes unless every ingredient and the output space are present.
    pub fn craft(&self, inventory: &mut Inventory, times: u32) -> Result<ItemStack, InventoryError> {
        let times = times.max(1);
        let mut needed = Vec::with_capacity(self.ingredients.len());
        for (item, count) in &self.ingredients {
            match count.checked_mul(times) {
                Some(total) if inventory.count_of(item) >= total => needed.push((item, total)),
                _ => return Err(InventoryError::MissingIngredient(item.clone())),
            }
        }
        let mut produced = self.output.clone();
        produced.count = produced
            .count
            .checked_mul(times)
            .ok_or_else(|| InventoryError::NoRoom(produced.id.clone()))?;

        let mut trial = inventory.clone();
        for (item, total) in needed {
            trial.remove(item, total);
        }
        if trial.room_for(&produced) < produced.count {
            return Err(InventoryError::NoRoom(produced.id));
        }
        trial.insert(produced.clone());
        *inventory = trial;
        Ok(produced)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stocked() -> Inventory {
        let mut inventory = Inventory::default();
        inventory.set(0, Some(ItemStack::new("oak_log", 10)));
        inventory.set(1, Some(ItemStack::new("bread", 3)));
        inventory.set(2, Some(ItemStack::new("oak_log", 60)));
        inventory
    }

    #[test]
    fn check_slot_rejects_out_of_range() {
        let inventory = Inventory::default();
        assert_eq!(inventory.check_slot(-1), Err(InventoryError::InvalidSlot(-1)));
        assert_eq!(inventory.check_slot(36), Err(InventoryError::InvalidSlot(36)));
        assert_eq!(inventory.check_slot(35), Ok(35));
    }

    #[test]
    fn drop_splits_and_clears_exhausted_slot() {
        let mut inventory = stocked();
        let (dropped, remaining) = inventory.drop_from(1, 2).unwrap();
        assert_eq!(dropped.count, 2);
        assert_eq!(remaining.unwrap().count, 1);
        let (dropped, remaining) = inventory.drop_from(1, 5).unwrap();
        assert_eq!(dropped.count, 1);
        assert!(remaining.is_none());
        assert_eq!(inventory.drop_from(1, 1), Err(InventoryError::EmptySlot(1)));
    }

    #[test]
    fn move_merges_up_to_stack_limit() {
        let mut inventory = stocked();
        let moved = inventory.move_between(0, 2, 10).unwrap();
        assert_eq!(moved.count, 4);
        assert_eq!(inventory.get(2).unwrap().count, 64);
        assert_eq!(inventory.get(0).unwrap().count, 6);
        assert_eq!(
            inventory.move_between(0, 2, 1),
            Err(InventoryError::TargetFull(2))
        );
        assert_eq!(inventory.get(0).unwrap().count, 6);
    }

    #[test]
    fn move_swaps_different_items() {
        let mut inventory = stocked();
        let moved = inventory.move_between(0, 1, 1).unwrap();
        assert_eq!(moved.id, "oak_log");
        assert_eq!(inventory.get(0).unwrap().id, "bread");
        assert_eq!(inventory.get(1).unwrap().id, "oak_log");
    }

    #[test]
    fn move_into_empty_slot_splits() {
        let mut inventory = stocked();
        let moved = inventory.move_between(0, 9, 4).unwrap();
        assert_eq!(moved.count, 4);
        assert_eq!(inventory.get(9).unwrap().count, 4);
        assert_eq!(inventory.get(0).unwrap().count, 6);
        assert_eq!(inventory.move_between(3, 4, 1), Err(InventoryError::EmptySlot(3)));
        assert_eq!(inventory.move_between(0, 0, 1), Err(InventoryError::SameSlot));
    }

    #[test]
    fn craft_consumes_ingredients_atomically() {
        let mut inventory = stocked();
        let planks = Recipe::new(
            "oak_planks",
            &[("oak_log", 1)],
            ItemStack::new("oak_planks", 4),
        );
        let crafted = planks.craft(&mut inventory, 2).unwrap();
        assert_eq!(crafted.count, 8);
        assert_eq!(inventory.count_of("oak_log"), 68);
        assert_eq!(inventory.count_of("oak_planks"), 8);

        let sticks = Recipe::new("stick", &[("oak_planks", 2)], ItemStack::new("stick", 4));
        let err = sticks.craft(&mut inventory, 5).unwrap_err();
        assert_eq!(err, InventoryError::MissingIngredient("oak_planks".into()));
        assert_eq!(inventory.count_of("oak_planks"), 8);
    }

    #[test]
    fn huge_craft_counts_report_missing_ingredients() {
        let mut inventory = stocked();
        let table = Recipe::new(
            "crafting_table",
            &[("oak_log", 4)],
            ItemStack::new("crafting_table", 1),
        );
        assert_eq!(
            table.craft(&mut inventory, 1 << 30),
            Err(InventoryError::MissingIngredient("oak_log".into()))
        );
        assert_eq!(
            table.craft(&mut inventory, u32::MAX),
            Err(InventoryError::MissingIngredient("oak_log".into()))
        );
        assert_eq!(inventory.count_of("oak_log"), 70);
        assert_eq!(inventory.count_of("crafting_table"), 0);
    }

    #[test]
    fn oversized_output_is_no_room() {
        let mut inventory = stocked();
        let free = Recipe::new("air_dust", &[], ItemStack::new("air_dust", 8));
        assert_eq!(
            free.craft(&mut inventory, u32::MAX),
            Err(InventoryError::NoRoom("air_dust".into()))
        );
    }

    #[test]
    fn insert_fills_matching_stacks_first() {
        let mut inventory = stocked();
        let leftover = inventory.insert(ItemStack::new("oak_log", 6));
        assert_eq!(leftover, 0);
        assert_eq!(inventory.get(0).unwrap().count, 16);
        assert_eq!(inventory.get(2).unwrap().count, 60);
    }

    #[test]
    fn select_is_limited_to_hotbar() {
        let mut inventory = Inventory::default();
        inventory.select(8).unwrap();
        assert_eq!(inventory.selected_slot(), 8);
        assert!(inventory.select(9).is_err());
    }
}
