//! Engine - Reconciliation state shared by the sessions

pub mod order;
pub mod poll;
pub mod registry;
pub mod snapshot;
pub mod state;

pub use order::{AckOutcome, OrderStore};
pub use poll::{PollScheduler, PollTask};
pub use registry::OrderIdRegistry;
pub use snapshot::SnapshotStore;
pub use state::{ConnectionStateMachine, SessionEvent, Transition};
