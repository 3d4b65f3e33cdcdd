pub mod backoff;
pub mod manager;
pub mod state;

pub use backoff::{Backoff, ReconnectPolicy, DEFAULT_RECONNECT_DELAY_MS};
pub use manager::{ConnectionManager, FeedSettings, SubscriptionContext};
pub use state::{FeedEvent, FeedSnapshot, FeedState, CONNECTION_ERROR};
