//! Error handling - Hierarchical errors for the adapter core

use thiserror::Error;

use crate::core::types::{LocalId, SessionState, Status, SystemId};
use rust_decimal::Decimal;

pub type Result<T> = std::result::Result<T, Error>;

/// ATP gateway error hierarchy
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration errors
    #[error("Config: {0}")]
    Config(String),

    /// Wire value could not be translated into (or from) the domain model
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// Operation attempted while the session is not logged in
    #[error("Session not ready (state: {state})")]
    NotReady { state: SessionState },

    /// Venue sent data that contradicts what it sent before
    #[error(transparent)]
    Anomaly(#[from] ProtocolAnomaly),

    /// Connection could not be established or was lost
    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    /// Lifecycle event that makes no sense in the current state
    #[error("Invalid transition: {event} in state {state}")]
    InvalidTransition { state: SessionState, event: String },

    /// A vendor call was refused synchronously
    #[error("Vendor: {0}")]
    Vendor(String),

    /// Request cannot be routed as given
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Serialization
    #[error("Serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Unknown or unrepresentable value at the wire boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot translate {field}: {raw:?}")]
pub struct TranslationError {
    pub field: &'static str,
    pub raw: String,
}

impl TranslationError {
    pub fn new(field: &'static str, raw: impl ToString) -> Self {
        Self {
            field,
            raw: raw.to_string(),
        }
    }
}

/// Venue behaviour that violates the order-id or fill invariants.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolAnomaly {
    #[error("local id {local_id} already bound to {existing}, venue sent {attempted}")]
    DuplicateBinding {
        local_id: LocalId,
        existing: SystemId,
        attempted: SystemId,
    },

    #[error("system id {system_id} already bound to local id {existing}, venue sent it for {attempted}")]
    SystemIdReused {
        system_id: SystemId,
        existing: LocalId,
        attempted: LocalId,
    },

    #[error("traded volume of {local_id} went from {previous} down to {reported}")]
    TradedVolumeRegression {
        local_id: LocalId,
        previous: Decimal,
        reported: Decimal,
    },

    #[error("status of {local_id} left terminal {previous} for {reported}")]
    StatusRegression {
        local_id: LocalId,
        previous: Status,
        reported: Status,
    },

    #[error("no order known for {0}")]
    UnknownOrder(String),
}
