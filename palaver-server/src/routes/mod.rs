pub mod health;
pub mod messages;
pub mod openapi;
pub mod push;
