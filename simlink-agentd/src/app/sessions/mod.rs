mod registry;

pub use registry::{Registration, SessionPolicy, SessionRegistry};
