// plantpulse-ingest-core/src/alerts/mod.rs
// Alert construction and multi-channel dispatch

pub mod dispatcher;
pub mod sinks;

pub use dispatcher::AlertDispatcher;
pub use sinks::{
    recommended_actions, AlertNotification, NotificationSink, SensorDetail, TopicNotificationSink,
    WebhookNotificationSink,
};
