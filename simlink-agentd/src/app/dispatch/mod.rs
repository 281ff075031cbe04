mod dispatcher;

pub use dispatcher::{
    CommandDispatcher, DispatchHandle, DispatchStats, DispatcherOptions, ShutdownReport,
};
