//! ATP wire surface - records and field translation

pub mod codec;
pub mod model;

pub use codec::TradingAccount;
