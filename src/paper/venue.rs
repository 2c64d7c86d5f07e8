//! Loopback matching and bookkeeping, run on the paper delivery thread

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::atp_api::codec::{self, ExchangeCodec, PRICE_SCALE, VOLUME_SCALE};
use crate::atp_api::model::*;
use crate::core::config::PaperConfig;
use crate::core::error::Result;
use crate::core::traits::{MarketDataSpi, TradingSpi};

const DEPTH: i64 = 5;
const MARKET: char = '1';
const BUY: char = '1';
const SELL: char = '2';

/// Requests queued by the paper apis
#[derive(Debug)]
pub(crate) enum Command {
    RegisterTrading(Weak<dyn TradingSpi>),
    RegisterMarketData(Weak<dyn MarketDataSpi>),
    TradingConnect(String),
    TradingLogin(CustLoginRequest),
    Submit(NewOrder),
    Cancel(CancelOrder),
    QueryFund,
    QueryShares,
    QueryContracts,
    QueryOrders,
    QueryTrades,
    TradingClose,
    MarketDataConnect(String),
    MarketDataLogin(CustLoginRequest),
    Subscribe(Subscription),
    Unsubscribe(Subscription),
    MarketDataClose,
}

/// Listed instrument in wire units
#[derive(Debug, Clone)]
pub(crate) struct Listing {
    pub market_id: u16,
    pub security_id: String,
    pub name: String,
    pub last_px: i64,
}

pub(crate) struct VenueState {
    trading: Option<Weak<dyn TradingSpi>>,
    market_data: Option<Weak<dyn MarketDataSpi>>,
    listings: Vec<Listing>,
    fund_account_id: String,
    cash: i64,
    positions: BTreeMap<(u16, String), i64>,
    orders: BTreeMap<u64, OrderStatusAck>,
    trades: Vec<TradeReport>,
    next_order_id: u64,
    next_exec_id: u64,
}

impl VenueState {
    pub fn new(config: &PaperConfig) -> Result<Self> {
        let listings = config
            .contracts
            .iter()
            .map(|c| -> Result<Listing> {
                Ok(Listing {
                    market_id: ExchangeCodec::encode(c.exchange),
                    security_id: c.symbol.trim().to_uppercase(),
                    name: c.name.clone(),
                    last_px: codec::encode_price(c.last_price)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            trading: None,
            market_data: None,
            listings,
            fund_account_id: String::new(),
            cash: codec::encode_price(config.cash)?,
            positions: BTreeMap::new(),
            orders: BTreeMap::new(),
            trades: Vec::new(),
            next_order_id: 0,
            next_exec_id: 0,
        })
    }

    fn td(&self) -> Option<Arc<dyn TradingSpi>> {
        self.trading.as_ref().and_then(Weak::upgrade)
    }

    fn md(&self) -> Option<Arc<dyn MarketDataSpi>> {
        self.market_data.as_ref().and_then(Weak::upgrade)
    }

    fn listing(&self, market_id: u16, security_id: &str) -> Option<&Listing> {
        self.listings
            .iter()
            .find(|l| l.market_id == market_id && l.security_id == security_id)
    }

    pub fn handle(&mut self, command: Command) {
        match command {
            Command::RegisterTrading(spi) => self.trading = Some(spi),
            Command::RegisterMarketData(spi) => self.market_data = Some(spi),
            Command::TradingConnect(address) => {
                if let Some(spi) = self.td() {
                    spi.on_connected(&format!("paper venue at {address}"));
                }
            }
            Command::TradingLogin(request) => self.login(request),
            Command::Submit(order) => self.submit(order),
            Command::Cancel(cancel) => self.cancel(cancel),
            Command::QueryFund => {
                if let Some(spi) = self.td() {
                    spi.on_fund_query_result(&FundQueryResult {
                        fund_account_id: self.fund_account_id.clone(),
                        balance: self.cash,
                        frozen: 0,
                    });
                }
            }
            Command::QueryShares => {
                if let Some(spi) = self.td() {
                    for ((market_id, security_id), qty) in &self.positions {
                        let cost_price = self
                            .listing(*market_id, security_id)
                            .map_or(0, |l| l.last_px);
                        spi.on_share_query_result(&ShareQueryResult {
                            market_id: *market_id,
                            security_id: security_id.clone(),
                            total_qty: *qty,
                            init_qty: 0,
                            frozen_qty: 0,
                            cost_price,
                        });
                    }
                }
            }
            Command::QueryContracts => {
                if let Some(spi) = self.td() {
                    for listing in &self.listings {
                        spi.on_contract_query_result(&ContractQueryResult {
                            market_id: listing.market_id,
                            security_id: listing.security_id.clone(),
                            security_name: listing.name.clone(),
                            security_type: '1',
                            price_tick: PRICE_SCALE / 100,
                            buy_qty_unit: 100 * VOLUME_SCALE,
                            contract_unit: VOLUME_SCALE,
                            call_or_put: None,
                            exercise_price: None,
                            underlying_security_id: None,
                        });
                    }
                }
            }
            Command::QueryOrders => {
                if let Some(spi) = self.td() {
                    for ack in self.orders.values() {
                        spi.on_order_query_result(ack);
                    }
                }
            }
            Command::QueryTrades => {
                if let Some(spi) = self.td() {
                    for report in &self.trades {
                        spi.on_trade_query_result(report);
                    }
                }
            }
            Command::TradingClose => {
                if let Some(spi) = self.td() {
                    spi.on_closed("closed by client");
                }
            }
            Command::MarketDataConnect(address) => {
                if let Some(spi) = self.md() {
                    spi.on_connected(&format!("paper venue at {address}"));
                }
            }
            Command::MarketDataLogin(request) => {
                if let Some(spi) = self.md() {
                    if request.password.is_empty() {
                        spi.on_login(false, "empty password");
                    } else {
                        spi.on_login(true, "paper market data login");
                    }
                }
            }
            Command::Subscribe(subscription) => self.publish(&subscription),
            Command::Unsubscribe(subscription) => {
                debug!(market_id = subscription.market_id, securities = ?subscription.security_ids, "unsubscribed");
            }
            Command::MarketDataClose => {
                if let Some(spi) = self.md() {
                    spi.on_closed("closed by client");
                }
            }
        }
    }

    fn login(&mut self, request: CustLoginRequest) {
        let Some(spi) = self.td() else { return };
        spi.on_login("paper agent login");

        if request.password.is_empty() {
            spi.on_cust_login_response(&CustLoginResponse {
                cust_id: String::new(),
                fund_account_id: String::new(),
                permission_error_code: 1,
                error_msg: "empty password".to_string(),
                accounts: Vec::new(),
            });
            return;
        }

        self.fund_account_id = request
            .fund_account_id
            .unwrap_or_else(|| format!("F{}", request.user_id));
        spi.on_cust_login_response(&CustLoginResponse {
            cust_id: format!("C{}", request.user_id),
            fund_account_id: self.fund_account_id.clone(),
            permission_error_code: 0,
            error_msg: String::new(),
            accounts: vec![
                AccountBinding {
                    market_id: 101,
                    account_id: format!("SH{}", request.user_id),
                },
                AccountBinding {
                    market_id: 102,
                    account_id: format!("SZ{}", request.user_id),
                },
            ],
        });
    }

    fn submit(&mut self, order: NewOrder) {
        let Some(spi) = self.td() else { return };

        let mut ack = OrderStatusAck {
            cl_ord_no: order.cl_ord_no,
            order_id: String::new(),
            market_id: order.market_id,
            security_id: order.security_id.clone(),
            side: order.side,
            position_effect: order.position_effect,
            ord_type: order.ord_type,
            price: order.price,
            order_qty: order.order_qty,
            cum_qty: 0,
            ord_status: 'P',
            transact_time: codec::encode_time(chrono::Utc::now()),
            reject_reason: String::new(),
        };
        spi.on_order_status_internal_ack(&ack);

        self.next_order_id += 1;
        ack.order_id = format!("P{:08}", self.next_order_id);

        let fill_px = match self.check(&order) {
            Ok(fill_px) => fill_px,
            Err(reason) => {
                warn!(cl_ord_no = order.cl_ord_no, reason, "paper order rejected");
                ack.ord_status = '8';
                ack.reject_reason = reason.to_string();
                self.orders.insert(ack.cl_ord_no, ack.clone());
                spi.on_order_status_ack(&ack);
                return;
            }
        };

        ack.ord_status = '0';
        self.orders.insert(ack.cl_ord_no, ack.clone());
        spi.on_order_status_ack(&ack);

        if let Some(px) = fill_px {
            let report = self.fill(&ack, px);
            spi.on_trade_report(&report);

            ack.cum_qty = ack.order_qty;
            ack.ord_status = '2';
            ack.transact_time = report.transact_time;
            self.orders.insert(ack.cl_ord_no, ack.clone());
            spi.on_order_status_ack(&ack);
        }
    }

    /// Fill price for a marketable order, `None` for a resting one.
    fn check(&self, order: &NewOrder) -> std::result::Result<Option<i64>, &'static str> {
        let listing = self
            .listing(order.market_id, &order.security_id)
            .ok_or("unknown security")?;
        if order.order_qty <= 0 {
            return Err("non-positive quantity");
        }

        let fill_px = match (order.ord_type, order.side) {
            (MARKET, _) => Some(listing.last_px),
            (_, BUY) if order.price >= listing.last_px => Some(order.price),
            (_, SELL) if order.price <= listing.last_px => Some(order.price),
            _ => None,
        };

        match order.side {
            BUY => {
                let px = fill_px.unwrap_or(order.price);
                if notional(px, order.order_qty) > i128::from(self.cash) {
                    return Err("insufficient cash");
                }
            }
            SELL => {
                let held = self
                    .positions
                    .get(&(order.market_id, order.security_id.clone()))
                    .copied()
                    .unwrap_or(0);
                if held < order.order_qty {
                    return Err("insufficient position");
                }
            }
            _ => return Err("unknown side"),
        }
        Ok(fill_px)
    }

    fn fill(&mut self, ack: &OrderStatusAck, px: i64) -> TradeReport {
        let qty = ack.order_qty - ack.cum_qty;
        let cash = i64::try_from(notional(px, qty)).unwrap_or(i64::MAX);
        let held = self
            .positions
            .entry((ack.market_id, ack.security_id.clone()))
            .or_insert(0);
        if ack.side == BUY {
            *held += qty;
            self.cash -= cash;
        } else {
            *held -= qty;
            self.cash += cash;
        }
        if *held == 0 {
            self.positions.remove(&(ack.market_id, ack.security_id.clone()));
        }

        self.next_exec_id += 1;
        let report = TradeReport {
            exec_id: format!("E{:08}", self.next_exec_id),
            order_id: ack.order_id.clone(),
            cl_ord_no: Some(ack.cl_ord_no),
            market_id: ack.market_id,
            security_id: ack.security_id.clone(),
            side: ack.side,
            position_effect: ack.position_effect,
            last_px: px,
            last_qty: qty,
            transact_time: codec::encode_time(chrono::Utc::now()),
        };
        self.trades.push(report.clone());
        report
    }

    fn cancel(&mut self, cancel: CancelOrder) {
        let Some(spi) = self.td() else { return };
        let Some(ack) = self.orders.get_mut(&cancel.orig_cl_ord_no) else {
            spi.on_error(&format!("cancel of unknown order {}", cancel.orig_cl_ord_no));
            return;
        };
        if ack.ord_status != '0' || ack.order_id != cancel.orig_order_id {
            spi.on_error(&format!("order {} is not cancellable", cancel.orig_order_id));
            return;
        }
        ack.ord_status = '4';
        ack.transact_time = codec::encode_time(chrono::Utc::now());
        spi.on_order_status_ack(ack);
    }

    fn publish(&self, subscription: &Subscription) {
        let Some(spi) = self.md() else { return };
        let tick = PRICE_SCALE / 100;
        let now = codec::encode_time(chrono::Utc::now());

        let batch: Vec<MarketDataSnapshot> = subscription
            .security_ids
            .iter()
            .filter_map(|id| self.listing(subscription.market_id, id))
            .map(|l| MarketDataSnapshot {
                market_id: l.market_id,
                security_id: l.security_id.clone(),
                orig_time: now,
                last_px: l.last_px,
                open_px: l.last_px,
                high_px: l.last_px,
                low_px: l.last_px,
                pre_close_px: l.last_px,
                total_volume_trade: 0,
                total_value_trade: 0,
                bid_px: (1..=DEPTH).map(|i| l.last_px - i * tick).collect(),
                bid_qty: (1..=DEPTH).map(|i| i * 100 * VOLUME_SCALE).collect(),
                offer_px: (1..=DEPTH).map(|i| l.last_px + i * tick).collect(),
                offer_qty: (1..=DEPTH).map(|i| i * 100 * VOLUME_SCALE).collect(),
            })
            .collect();

        if !batch.is_empty() {
            spi.on_snapshot_batch(&batch);
        }
    }
}

/// Cash in price-scale units for `qty` wire units at `px`
fn notional(px: i64, qty: i64) -> i128 {
    i128::from(px) * i128::from(qty) / i128::from(VOLUME_SCALE)
}
