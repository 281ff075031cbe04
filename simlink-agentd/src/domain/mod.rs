pub mod agents;
pub mod world;
