//! Wire records exchanged with the ATP session.
//!
//! Prices and cash are integers scaled by 10000, quantities by 100.
//! Times are `yyyymmddHHMMSSsss` in China Standard Time.

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CustLoginRequest {
    pub user_id: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fund_account_id: Option<String>,
}

/// Trading account the customer holds on one market
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct AccountBinding {
    pub market_id: u16,
    pub account_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CustLoginResponse {
    pub cust_id: String,
    pub fund_account_id: String,
    /// Zero on success
    pub permission_error_code: i32,
    #[serde(default)]
    pub error_msg: String,
    #[serde(default)]
    pub accounts: Vec<AccountBinding>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NewOrder {
    /// Local id, echoed back in every ack as the correlation token
    pub cl_ord_no: u64,
    pub cust_id: String,
    pub fund_account_id: String,
    pub account_id: String,
    pub market_id: u16,
    pub security_id: String,
    pub side: char,
    pub position_effect: char,
    pub ord_type: char,
    pub price: i64,
    pub order_qty: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CancelOrder {
    pub orig_cl_ord_no: u64,
    pub orig_order_id: String,
    pub cust_id: String,
    pub fund_account_id: String,
    pub account_id: String,
    pub market_id: u16,
    pub security_id: String,
}

/// Order status acknowledgment (internal, external and order query results)
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct OrderStatusAck {
    pub cl_ord_no: u64,
    /// Empty until the exchange assigns one
    #[serde(default)]
    pub order_id: String,
    pub market_id: u16,
    pub security_id: String,
    pub side: char,
    pub position_effect: char,
    pub ord_type: char,
    pub price: i64,
    pub order_qty: i64,
    pub cum_qty: i64,
    pub ord_status: char,
    pub transact_time: i64,
    #[serde(default)]
    pub reject_reason: String,
}

/// Execution report for one fill
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct TradeReport {
    pub exec_id: String,
    pub order_id: String,
    #[serde(default)]
    pub cl_ord_no: Option<u64>,
    pub market_id: u16,
    pub security_id: String,
    pub side: char,
    pub position_effect: char,
    pub last_px: i64,
    pub last_qty: i64,
    pub transact_time: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct QueryRequest {
    pub cust_id: String,
    pub fund_account_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_id: Option<u16>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FundQueryResult {
    pub fund_account_id: String,
    pub balance: i64,
    pub frozen: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ShareQueryResult {
    pub market_id: u16,
    pub security_id: String,
    pub total_qty: i64,
    /// Held since the previous session
    pub init_qty: i64,
    pub frozen_qty: i64,
    pub cost_price: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ContractQueryResult {
    pub market_id: u16,
    pub security_id: String,
    pub security_name: String,
    pub security_type: char,
    pub price_tick: i64,
    pub buy_qty_unit: i64,
    pub contract_unit: i64,
    #[serde(default)]
    pub call_or_put: Option<char>,
    #[serde(default)]
    pub exercise_price: Option<i64>,
    #[serde(default)]
    pub underlying_security_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub market_id: u16,
    pub security_ids: Vec<String>,
}

/// One element of a market-data snapshot batch
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct MarketDataSnapshot {
    pub market_id: u16,
    pub security_id: String,
    pub orig_time: i64,
    pub last_px: i64,
    pub open_px: i64,
    pub high_px: i64,
    pub low_px: i64,
    pub pre_close_px: i64,
    pub total_volume_trade: i64,
    pub total_value_trade: i64,
    pub bid_px: Vec<i64>,
    pub bid_qty: Vec<i64>,
    pub offer_px: Vec<i64>,
    pub offer_qty: Vec<i64>,
}
