use crate::domain::world::{
    Block, BlockPos, Entity, ItemStack, PlayerState, Position, Recipe,
};
use crate::error::{CoreError, CoreResult};
use crate::ports::engine::SimulationEngine;
use std::collections::HashMap;

const BEDROCK_Y: i32 = 0;
const STONE_TOP: i32 = 59;
const DIRT_TOP: i32 = 62;
const SURFACE_Y: i32 = 63;

/// Deterministic in-memory world: layered flat terrain with a few placed
/// blocks, entities, one player and a small recipe book.
pub struct SandboxWorld {
    ready: bool,
    dimension: String,
    placed: HashMap<BlockPos, String>,
    entities: Vec<Entity>,
    player: Option<PlayerState>,
    recipes: HashMap<String, Recipe>,
    pathfinding: bool,
}

impl SandboxWorld {
    pub fn new() -> Self {
        let mut world = Self {
            ready: true,
            dimension: "minecraft:overworld".into(),
            placed: HashMap::new(),
            entities: Vec::new(),
            player: None,
            recipes: HashMap::new(),
            pathfinding: false,
        };

        for x in 4..7 {
            for z in 4..7 {
                world.place_block(BlockPos::new(x, SURFACE_Y, z), "water");
            }
        }
        world.place_block(BlockPos::new(-3, SURFACE_Y + 1, 2), "oak_log");
        world.place_block(BlockPos::new(-3, SURFACE_Y + 2, 2), "oak_log");
        world.place_block(BlockPos::new(2, SURFACE_Y + 1, -2), "torch");

        world.spawn_entity(Entity {
            id: "entity-1".into(),
            kind: "minecraft:cow".into(),
            name: "Cow".into(),
            position: Position::new(3.5, 64.0, 3.5),
            health: 10.0,
            is_hostile: false,
        });
        world.spawn_entity(Entity {
            id: "entity-2".into(),
            kind: "minecraft:zombie".into(),
            name: "Zombie".into(),
            position: Position::new(-8.5, 64.0, 2.5),
            health: 20.0,
            is_hostile: true,
        });
        world.spawn_entity(Entity {
            id: "entity-3".into(),
            kind: "minecraft:villager".into(),
            name: "Villager".into(),
            position: Position::new(40.5, 64.0, -12.5),
            health: 20.0,
            is_hostile: false,
        });

        let mut player = PlayerState::new("Steve", Position::new(0.5, 64.0, 0.5));
        player.inventory.set(0, Some(ItemStack::new("oak_log", 16)));
        player.inventory.set(1, Some(ItemStack::new("bread", 4)));
        player.inventory.set(2, Some(ItemStack::new("cobblestone", 32)));
        player.inventory.set(9, Some(ItemStack::new("wheat", 6)));
        player.inventory.set(
            8,
            Some(ItemStack::new("iron_pickaxe", 1).with_max_stack(1)),
        );
        world.player = Some(player);

        for recipe in [
            Recipe::new("oak_planks", &[("oak_log", 1)], ItemStack::new("oak_planks", 4)),
            Recipe::new("stick", &[("oak_planks", 2)], ItemStack::new("stick", 4)),
            Recipe::new(
                "crafting_table",
                &[("oak_planks", 4)],
                ItemStack::new("crafting_table", 1),
            ),
            Recipe::new("bread", &[("wheat", 3)], ItemStack::new("bread", 1)),
        ] {
            world.add_recipe(recipe);
        }
        world
    }

    pub fn set_ready(&mut self, ready: bool) {
        self.ready = ready;
    }

    pub fn set_pathfinding(&mut self, available: bool) {
        self.pathfinding = available;
    }

    pub fn place_block(&mut self, pos: BlockPos, id: &str) {
        self.placed.insert(pos, id.to_string());
    }

    pub fn spawn_entity(&mut self, entity: Entity) {
        self.entities.retain(|existing| existing.id != entity.id);
        self.entities.push(entity);
    }

    pub fn add_recipe(&mut self, recipe: Recipe) {
        self.recipes.insert(recipe.id.clone(), recipe);
    }

    pub fn remove_player(&mut self) -> Option<PlayerState> {
        self.player.take()
    }

    fn terrain(pos: BlockPos) -> &'static str {
        match pos.y {
            y if y < BEDROCK_Y => "void_air",
            BEDROCK_Y => "bedrock",
            y if y <= STONE_TOP => "stone",
            y if y <= DIRT_TOP => "dirt",
            SURFACE_Y => "grass_block",
            _ => "air",
        }
    }
}

impl Default for SandboxWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn describe(pos: BlockPos, id: &str) -> Block {
    let (is_air, is_solid, is_liquid, hardness, light_level) = match id {
        "air" | "void_air" => (true, false, false, 0.0, 15),
        "water" => (false, false, true, 100.0, 15),
        "lava" => (false, false, true, 100.0, 15),
        "bedrock" => (false, true, false, -1.0, 0),
        "stone" | "cobblestone" => (false, true, false, 1.5, 0),
        "dirt" | "grass_block" => (false, true, false, 0.5, 0),
        "oak_log" | "oak_planks" => (false, true, false, 2.0, 0),
        "torch" => (false, false, false, 0.0, 14),
        _ => (false, true, false, 1.0, 0),
    };
    if is_air {
        let mut block = Block::air(pos);
        block.id = id.to_string();
        return block;
    }
    Block {
        pos,
        id: id.to_string(),
        is_air,
        is_solid,
        is_liquid,
        hardness,
        light_level,
    }
}

impl SimulationEngine for SandboxWorld {
    fn is_ready(&self) -> bool {
        self.ready
    }

    fn dimension(&self) -> String {
        self.dimension.clone()
    }

    fn block_at(&self, pos: BlockPos) -> Block {
        match self.placed.get(&pos) {
            Some(id) => describe(pos, id),
            None => describe(pos, Self::terrain(pos)),
        }
    }

    fn entities_near(&self, center: Position, radius: f64) -> Vec<Entity> {
        self.entities
            .iter()
            .filter(|entity| entity.position.distance_to(&center) <= radius)
            .cloned()
            .collect()
    }

    fn entity(&self, id: &str) -> Option<Entity> {
        self.entities.iter().find(|entity| entity.id == id).cloned()
    }

    fn player(&self) -> Option<&PlayerState> {
        self.player.as_ref()
    }

    fn player_mut(&mut self) -> Option<&mut PlayerState> {
        self.player.as_mut()
    }

    fn craft(&mut self, recipe_id: &str, times: u32) -> CoreResult<ItemStack> {
        let recipe = self
            .recipes
            .get(recipe_id)
            .ok_or_else(|| CoreError::NotFound(format!("unknown recipe: {recipe_id}")))?;
        let player = self
            .player
            .as_mut()
            .ok_or_else(|| CoreError::unavailable("player not available"))?;
        Ok(recipe.craft(&mut player.inventory, times)?)
    }

    fn pathfinding_available(&self) -> bool {
        self.pathfinding
    }
}
