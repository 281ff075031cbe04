//! Engine-facing service operations: validate, then dispatch.

mod environment;
mod inventory;
mod player;

pub use environment::{EnvironmentScan, EnvironmentService, ScanQuery, ScanRequest};
pub use inventory::{DropOutcome, InventoryService, InventoryView};
pub use player::{
    ActionOutcome, ActionRequest, MoveOutcome, MoveRequest, PlayerService, SequenceOutcome,
    StepResult,
};
