pub mod bidding;
pub mod config;
pub mod database;
pub mod handlers;
pub mod message_broker;
pub mod notification;
pub mod query;
pub mod scheduler;
pub mod session;
pub mod store;
