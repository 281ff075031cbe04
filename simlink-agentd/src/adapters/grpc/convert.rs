//! Mapping between domain values and generated protobuf messages.

use super::proto;
use crate::app::world::{EnvironmentScan, ScanRequest};
use crate::domain::agents::AgentSnapshot;
use crate::domain::world::{Block, Entity, ItemStack, PlayerAction, PlayerState, Position};
use chrono::{DateTime, Utc};
use prost_types::Timestamp;

pub fn timestamp(at: DateTime<Utc>) -> Timestamp {
    Timestamp {
        seconds: at.timestamp(),
        nanos: at.timestamp_subsec_nanos() as i32,
    }
}

pub fn position_from(position: &proto::Position) -> Position {
    Position::new(position.x, position.y, position.z)
}

pub fn position(position: Position) -> proto::Position {
    proto::Position {
        x: position.x,
        y: position.y,
        z: position.z,
    }
}

/// Negative wire values mean "use the default", same as zero.
pub fn non_negative(value: i32) -> u32 {
    value.max(0) as u32
}

pub fn scan_request(request: &proto::ScanRequest) -> ScanRequest {
    ScanRequest {
        center: request.center.as_ref().map(position_from),
        radius: non_negative(request.radius),
        include_air_blocks: request.include_air_blocks,
        include_entities: request.include_entities,
        max_blocks: non_negative(request.max_blocks),
        max_entities: non_negative(request.max_entities),
    }
}

pub fn block(block: &Block) -> proto::BlockInfo {
    proto::BlockInfo {
        position: Some(proto::Position {
            x: block.pos.x as f64,
            y: block.pos.y as f64,
            z: block.pos.z as f64,
        }),
        block_id: block.id.clone(),
        is_air: block.is_air,
        is_solid: block.is_solid,
        is_liquid: block.is_liquid,
        hardness: block.hardness,
        light_level: block.light_level as i32,
    }
}

pub fn entity(entity: &Entity) -> proto::EntityInfo {
    proto::EntityInfo {
        entity_id: entity.id.clone(),
        entity_type: entity.kind.clone(),
        name: entity.name.clone(),
        position: Some(position(entity.position)),
        health: entity.health,
        is_hostile: entity.is_hostile,
    }
}

pub fn scan(scan: &EnvironmentScan) -> proto::EnvironmentScan {
    proto::EnvironmentScan {
        center: Some(position(scan.query.center)),
        radius: scan.query.radius as i32,
        blocks: scan.blocks.iter().map(block).collect(),
        entities: scan.entities.iter().map(entity).collect(),
        scan_time: Some(timestamp(scan.scan_time)),
        dimension: scan.dimension.clone(),
        include_air_blocks: scan.query.include_air_blocks,
        max_blocks: scan.query.max_blocks as i32,
        max_entities: scan.query.max_entities as i32,
    }
}

pub fn item(slot: usize, stack: Option<&ItemStack>) -> proto::ItemInfo {
    match stack {
        Some(stack) => proto::ItemInfo {
            slot: slot as i32,
            item_id: stack.id.clone(),
            count: stack.count as i32,
            max_stack_size: stack.max_stack as i32,
            is_empty: false,
        },
        None => proto::ItemInfo {
            slot: slot as i32,
            item_id: "minecraft:air".into(),
            count: 0,
            max_stack_size: 0,
            is_empty: true,
        },
    }
}

pub fn slots(slots: &[Option<ItemStack>]) -> Vec<proto::ItemInfo> {
    slots
        .iter()
        .enumerate()
        .map(|(slot, stack)| item(slot, stack.as_ref()))
        .collect()
}

pub fn player_state(state: &PlayerState) -> proto::PlayerState {
    let selected = state.inventory.selected_slot();
    proto::PlayerState {
        player_name: state.name.clone(),
        position: Some(position(state.position)),
        rotation: Some(proto::Rotation {
            yaw: state.rotation.yaw(),
            pitch: state.rotation.pitch(),
        }),
        health: state.health,
        max_health: state.max_health,
        food_level: state.food_level as i32,
        saturation: state.saturation,
        experience_level: state.experience_level as i32,
        experience_progress: state.experience_progress,
        is_sneaking: state.is_sneaking,
        is_sprinting: state.is_sprinting,
        is_on_ground: state.is_on_ground,
        is_flying: state.is_flying,
        selected_slot: selected as i32,
        inventory: slots(state.inventory.slots()),
        held_item: Some(item(selected, state.inventory.held())),
    }
}

pub fn agent_info(snapshot: &AgentSnapshot) -> proto::AgentInfo {
    let session = &snapshot.session;
    let profile = session.profile();
    proto::AgentInfo {
        agent_id: session.id().to_string(),
        agent_name: profile.name.clone(),
        agent_type: profile.kind.as_str().to_string(),
        description: profile.description.clone(),
        capabilities: profile
            .capabilities
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        heartbeat_interval_ms: profile.heartbeat_interval.as_millis() as i32,
        registered_at: Some(timestamp(session.registered_at())),
        last_heartbeat: Some(timestamp(session.last_heartbeat())),
        is_active: snapshot.is_active,
    }
}

/// `None` for `PLAYER_ACTION_UNSPECIFIED` and unknown wire values.
pub fn action_from(raw: i32) -> Option<PlayerAction> {
    use proto::PlayerAction as Wire;
    let action = match Wire::try_from(raw).ok()? {
        Wire::Unspecified => return None,
        Wire::MoveForward => PlayerAction::MoveForward,
        Wire::MoveBackward => PlayerAction::MoveBackward,
        Wire::MoveLeft => PlayerAction::MoveLeft,
        Wire::MoveRight => PlayerAction::MoveRight,
        Wire::Jump => PlayerAction::Jump,
        Wire::Sneak => PlayerAction::Sneak,
        Wire::Sprint => PlayerAction::Sprint,
        Wire::LookUp => PlayerAction::LookUp,
        Wire::LookDown => PlayerAction::LookDown,
        Wire::LookLeft => PlayerAction::LookLeft,
        Wire::LookRight => PlayerAction::LookRight,
        Wire::Attack => PlayerAction::Attack,
        Wire::UseItem => PlayerAction::UseItem,
        Wire::DropItem => PlayerAction::DropItem,
        Wire::OpenInventory => PlayerAction::OpenInventory,
        Wire::CloseInventory => PlayerAction::CloseInventory,
        Wire::SelectSlot => PlayerAction::SelectSlot,
    };
    Some(action)
}

pub fn action(action: PlayerAction) -> proto::PlayerAction {
    use proto::PlayerAction as Wire;
    match action {
        PlayerAction::MoveForward => Wire::MoveForward,
        PlayerAction::MoveBackward => Wire::MoveBackward,
        PlayerAction::MoveLeft => Wire::MoveLeft,
        PlayerAction::MoveRight => Wire::MoveRight,
        PlayerAction::Jump => Wire::Jump,
        PlayerAction::Sneak => Wire::Sneak,
        PlayerAction::Sprint => Wire::Sprint,
        PlayerAction::LookUp => Wire::LookUp,
        PlayerAction::LookDown => Wire::LookDown,
        PlayerAction::LookLeft => Wire::LookLeft,
        PlayerAction::LookRight => Wire::LookRight,
        PlayerAction::Attack => Wire::Attack,
        PlayerAction::UseItem => Wire::UseItem,
        PlayerAction::DropItem => Wire::DropItem,
        PlayerAction::OpenInventory => Wire::OpenInventory,
        PlayerAction::CloseInventory => Wire::CloseInventory,
        PlayerAction::SelectSlot => Wire::SelectSlot,
    }
}
