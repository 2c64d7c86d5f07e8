//! Vendor session surface - outbound calls (`*Api`) and callbacks (`*Spi`)
//!
//! Api calls are fire-and-forget: their outcome arrives later through the
//! matching Spi, on the vendor's own delivery thread.

use std::sync::Weak;

use crate::atp_api::model::*;
use crate::core::Result;

/// Trading session calls
pub trait TradingApi: Send + Sync {
    /// Callbacks are delivered to `spi` while it is alive.
    fn register_spi(&self, spi: Weak<dyn TradingSpi>);

    fn connect(&self, address: &str) -> Result<()>;

    fn login(&self, request: &CustLoginRequest) -> Result<()>;

    fn submit_order(&self, order: &NewOrder) -> Result<()>;

    fn cancel_order(&self, cancel: &CancelOrder) -> Result<()>;

    fn query_fund(&self, request: &QueryRequest) -> Result<()>;

    fn query_shares(&self, request: &QueryRequest) -> Result<()>;

    fn query_contracts(&self, request: &QueryRequest) -> Result<()>;

    fn query_orders(&self, request: &QueryRequest) -> Result<()>;

    fn query_trades(&self, request: &QueryRequest) -> Result<()>;

    fn close(&self);
}

/// Trading session callbacks. Every event has a no-op default.
pub trait TradingSpi: Send + Sync {
    // ─────────────────────────────────────────────────────────────
    // Connection lifecycle
    // ─────────────────────────────────────────────────────────────

    fn on_connected(&self, _reason: &str) {}

    fn on_closed(&self, _reason: &str) {}

    fn on_connect_failure(&self, _reason: &str) {}

    fn on_connect_timeout(&self, _reason: &str) {}

    fn on_heartbeat_timeout(&self, _reason: &str) {}

    fn on_end_of_connection(&self, _reason: &str) {}

    /// Transport-level login of the agent connection
    fn on_login(&self, _reason: &str) {}

    fn on_logout(&self, _reason: &str) {}

    fn on_error(&self, _reason: &str) {}

    fn on_log(&self, _level: i32, _msg: &str) {}

    // ─────────────────────────────────────────────────────────────
    // Customer session
    // ─────────────────────────────────────────────────────────────

    fn on_cust_login_response(&self, _response: &CustLoginResponse) {}

    fn on_cust_logout_response(&self, _reason: &str) {}

    fn on_password_modify_result(&self, _code: i32, _msg: &str) {}

    // ─────────────────────────────────────────────────────────────
    // Orders & fills
    // ─────────────────────────────────────────────────────────────

    fn on_order_status_internal_ack(&self, _ack: &OrderStatusAck) {}

    fn on_order_status_ack(&self, _ack: &OrderStatusAck) {}

    fn on_trade_report(&self, _report: &TradeReport) {}

    // ─────────────────────────────────────────────────────────────
    // Query results
    // ─────────────────────────────────────────────────────────────

    fn on_order_query_result(&self, _ack: &OrderStatusAck) {}

    fn on_trade_query_result(&self, _report: &TradeReport) {}

    fn on_fund_query_result(&self, _result: &FundQueryResult) {}

    fn on_share_query_result(&self, _result: &ShareQueryResult) {}

    fn on_contract_query_result(&self, _result: &ContractQueryResult) {}
}

/// Market-data session calls
pub trait MarketDataApi: Send + Sync {
    fn register_spi(&self, spi: Weak<dyn MarketDataSpi>);

    fn connect(&self, address: &str) -> Result<()>;

    fn login(&self, request: &CustLoginRequest) -> Result<()>;

    fn subscribe(&self, subscription: &Subscription) -> Result<()>;

    fn unsubscribe(&self, subscription: &Subscription) -> Result<()>;

    fn close(&self);
}

/// Market-data session callbacks. Every event has a no-op default.
pub trait MarketDataSpi: Send + Sync {
    fn on_connected(&self, _reason: &str) {}

    fn on_closed(&self, _reason: &str) {}

    fn on_connect_failure(&self, _reason: &str) {}

    fn on_connect_timeout(&self, _reason: &str) {}

    fn on_heartbeat_timeout(&self, _reason: &str) {}

    fn on_login(&self, _success: bool, _reason: &str) {}

    fn on_error(&self, _reason: &str) {}

    fn on_snapshot_batch(&self, _batch: &[MarketDataSnapshot]) {}
}
