//! Subscription storage, contact lookup, and push delivery services.

pub mod contacts;
pub mod notifier;
pub mod push_gateway;
pub mod registry;

pub use notifier::Notifier;
