pub mod dispatch;
pub mod gatekeeper;
pub mod sessions;
pub mod stream;
pub mod world;
