//! # Data model
//!
//! Wire and domain types shared by the client core and the server:
//! message rows, change events, push subscriptions and notification
//! payloads.

pub mod change;
pub mod message;
pub mod push;
pub mod timestamp;

pub use change::{ChangeEvent, DeletedRow};
pub use message::{DeliveryStatus, Direction, MessageKind, MessageRow};
pub use push::{
    NotificationData, NotificationPayload, PushActionResponse, PushSubscription,
    SubscribeRequest, SubscriptionKeys, TestPushResponse, UnsubscribeRequest, VapidKeyResponse,
};
pub use timestamp::Timestamp;
