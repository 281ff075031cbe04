//! Player actions as a closed command set resolved through a handler table.

use super::inventory::HOTBAR_SIZE;
use super::player::PlayerState;
use std::collections::HashMap;
use std::fmt;

pub const DEFAULT_LOOK_DEGREES: f32 = 10.0;
pub const DEFAULT_STEP_BLOCKS: f64 = 1.0;
const MAX_STEP_BLOCKS: f64 = 16.0;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PlayerAction {
    MoveForward,
    MoveBackward,
    MoveLeft,
    MoveRight,
    Jump,
    Sneak,
    Sprint,
    LookUp,
    LookDown,
    LookLeft,
    LookRight,
    Attack,
    UseItem,
    DropItem,
    OpenInventory,
    CloseInventory,
    SelectSlot,
}

impl PlayerAction {
    pub const ALL: [PlayerAction; 17] = [
        PlayerAction::MoveForward,
        PlayerAction::MoveBackward,
        PlayerAction::MoveLeft,
        PlayerAction::MoveRight,
        PlayerAction::Jump,
        PlayerAction::Sneak,
        PlayerAction::Sprint,
        PlayerAction::LookUp,
        PlayerAction::LookDown,
        PlayerAction::LookLeft,
        PlayerAction::LookRight,
        PlayerAction::Attack,
        PlayerAction::UseItem,
        PlayerAction::DropItem,
        PlayerAction::OpenInventory,
        PlayerAction::CloseInventory,
        PlayerAction::SelectSlot,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlayerAction::MoveForward => "move_forward",
            PlayerAction::MoveBackward => "move_backward",
            PlayerAction::MoveLeft => "move_left",
            PlayerAction::MoveRight => "move_right",
            PlayerAction::Jump => "jump",
            PlayerAction::Sneak => "sneak",
            PlayerAction::Sprint => "sprint",
            PlayerAction::LookUp => "look_up",
            PlayerAction::LookDown => "look_down",
            PlayerAction::LookLeft => "look_left",
            PlayerAction::LookRight => "look_right",
            PlayerAction::Attack => "attack",
            PlayerAction::UseItem => "use_item",
            PlayerAction::DropItem => "drop_item",
            PlayerAction::OpenInventory => "open_inventory",
            PlayerAction::CloseInventory => "close_inventory",
            PlayerAction::SelectSlot => "select_slot",
        }
    }
}

impl fmt::Display for PlayerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Validated parameters for one action.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ActionCommand {
    Step { blocks: f64 },
    Look { degrees: f32 },
    Slot { slot: usize },
    Plain,
}

impl ActionCommand {
    /// Parses the free-form parameter map into the command the action
    /// expects. Unknown keys are ignored.
    pub fn parse(action: PlayerAction, params: &HashMap<String, String>) -> Result<Self, String> {
        use PlayerAction::*;
        match action {
            MoveForward | MoveBackward | MoveLeft | MoveRight => {
                let blocks = match params.get("distance") {
                    Some(raw) => parse_number::<f64>("distance", raw)?,
                    None => DEFAULT_STEP_BLOCKS,
                };
                if !(0.0..=MAX_STEP_BLOCKS).contains(&blocks) {
                    return Err(format!("distance must be within 0..={MAX_STEP_BLOCKS}"));
                }
                Ok(ActionCommand::Step { blocks })
            }
            LookUp | LookDown | LookLeft | LookRight => {
                let degrees = match params.get("amount") {
                    Some(raw) => parse_number::<f32>("amount", raw)?,
                    None => DEFAULT_LOOK_DEGREES,
                };
                if !(0.0..=360.0).contains(&degrees) {
                    return Err("amount must be within 0..=360".into());
                }
                Ok(ActionCommand::Look { degrees })
            }
            SelectSlot => {
                let raw = params
                    .get("slot")
                    .ok_or_else(|| "select_slot requires a slot parameter".to_string())?;
                let slot = raw
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("invalid slot: {raw}"))?;
                if slot >= HOTBAR_SIZE {
                    return Err(format!("slot must be within 0..{HOTBAR_SIZE}"));
                }
                Ok(ActionCommand::Slot { slot })
            }
            _ => Ok(ActionCommand::Plain),
        }
    }
}

fn parse_number<T>(name: &str, raw: &str) -> Result<T, String>
where
    T: std::str::FromStr + Into<f64> + Copy,
{
    let value: T = raw
        .trim()
        .parse()
        .map_err(|_| format!("invalid {name}: {raw}"))?;
    if !value.into().is_finite() {
        return Err(format!("invalid {name}: {raw}"));
    }
    Ok(value)
}

pub type ActionHandler = fn(&mut PlayerState, &ActionCommand) -> bool;

/// Lookup table from action to handler. Adding an action means adding an
/// entry; execution never branches on the action itself.
#[derive(Clone)]
pub struct ActionTable {
    handlers: HashMap<PlayerAction, ActionHandler>,
}

impl ActionTable {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn standard() -> Self {
        let mut table = Self::empty();
        table.register(PlayerAction::MoveForward, |p, c| step(p, c, 1.0, 0.0));
        table.register(PlayerAction::MoveBackward, |p, c| step(p, c, -1.0, 0.0));
        table.register(PlayerAction::MoveLeft, |p, c| step(p, c, 0.0, -1.0));
        table.register(PlayerAction::MoveRight, |p, c| step(p, c, 0.0, 1.0));
        table.register(PlayerAction::Jump, |p, _| p.is_on_ground || p.is_flying);
        table.register(PlayerAction::Sneak, |p, _| {
            p.is_sneaking = true;
            p.is_sprinting = false;
            true
        });
        table.register(PlayerAction::Sprint, |p, _| {
            p.is_sprinting = true;
            p.is_sneaking = false;
            true
        });
        table.register(PlayerAction::LookUp, |p, c| look(p, c, 0.0, -1.0));
        table.register(PlayerAction::LookDown, |p, c| look(p, c, 0.0, 1.0));
        table.register(PlayerAction::LookLeft, |p, c| look(p, c, -1.0, 0.0));
        table.register(PlayerAction::LookRight, |p, c| look(p, c, 1.0, 0.0));
        table.register(PlayerAction::Attack, |_, _| true);
        table.register(PlayerAction::UseItem, |p, _| {
            let slot = p.inventory.selected_slot() as i64;
            p.use_item(slot).is_ok()
        });
        table.register(PlayerAction::DropItem, |p, _| {
            let slot = p.inventory.selected_slot() as i64;
            p.inventory.drop_from(slot, 1).is_ok()
        });
        table.register(PlayerAction::OpenInventory, |p, _| {
            p.inventory_open = true;
            true
        });
        table.register(PlayerAction::CloseInventory, |p, _| {
            p.inventory_open = false;
            true
        });
        table.register(PlayerAction::SelectSlot, |p, c| match c {
            ActionCommand::Slot { slot } => p.inventory.select(*slot).is_ok(),
            _ => false,
        });
        table
    }

    pub fn register(&mut self, action: PlayerAction, handler: ActionHandler) {
        self.handlers.insert(action, handler);
    }

    pub fn handler(&self, action: PlayerAction) -> Option<ActionHandler> {
        self.handlers.get(&action).copied()
    }
}

impl Default for ActionTable {
    fn default() -> Self {
        Self::standard()
    }
}

fn step(player: &mut PlayerState, command: &ActionCommand, forward: f64, right: f64) -> bool {
    let ActionCommand::Step { blocks } = command else {
        return false;
    };
    if player.is_sneaking {
        // Sneaking halves stride.
        player.step(forward * blocks * 0.5, right * blocks * 0.5);
    } else {
        player.step(forward * blocks, right * blocks);
    }
    true
}

fn look(player: &mut PlayerState, command: &ActionCommand, yaw_sign: f32, pitch_sign: f32) -> bool {
    let ActionCommand::Look { degrees } = command else {
        return false;
    };
    player.rotation = player
        .rotation
        .turned(yaw_sign * degrees, pitch_sign * degrees);
    true
}
