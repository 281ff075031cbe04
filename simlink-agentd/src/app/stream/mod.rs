mod manager;

pub use manager::{
    StreamManager, SubscriptionHandle, SubscriptionId, SubscriptionInfo, SubscriptionSpec,
    SubscriptionState, SubscriptionStats, MIN_STREAM_INTERVAL,
};
