//! ATP gateway - Core Library
//! Broker adapter for the ATP equity and option venue (SSE, SZSE)

// Public modules
pub mod core;
pub mod atp_api;
pub mod engine;
pub mod events;
pub mod gateway;
pub mod paper;
pub mod runtime;
pub mod session;

// Re-exports
pub use core::{Config, Error, Result};
pub use events::{EventPayload, GatewayEvent};
pub use gateway::{AtpGateway, ConnectSetting};
