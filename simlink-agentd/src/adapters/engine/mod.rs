mod sandbox;

pub use sandbox::SandboxWorld;
