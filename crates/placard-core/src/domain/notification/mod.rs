//! Notification intents, delivery sinks and the dispatcher that joins them

pub mod dispatcher;
pub mod intent;
pub mod sink;

pub use dispatcher::{DispatchReport, NotificationDispatcher};
pub use intent::{Audience, NotificationIntent, NotificationKind};
pub use sink::{
    Delivery, LogNotificationSink, MemoryNotificationSink, NotificationSink,
    SqliteNotificationSink, StoredNotification,
};
