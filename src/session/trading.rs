//! Trading session - login, order routing and order/fill reconciliation

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};
use tracing::{debug, info, warn};

use crate::atp_api::codec::{self, ExchangeCodec};
use crate::atp_api::model::*;
use crate::atp_api::TradingAccount;
use crate::core::error::{Error, ProtocolAnomaly, Result};
use crate::core::traits::{TradingApi, TradingSpi};
use crate::core::types::*;
use crate::engine::{ConnectionStateMachine, OrderIdRegistry, OrderStore, SessionEvent, SnapshotStore};
use crate::events::{EventPayload, EventSink, SessionKind};
use crate::session::CallbackContext;

/// Customer identity returned by a successful login
#[derive(Debug, Clone)]
struct LoginContext {
    cust_id: String,
    fund_account_id: String,
    accounts: HashMap<Exchange, String>,
}

/// Fill ids already emitted. Trade ids are unique per exchange and trading
/// day, so the set is cleared when a later trading day starts.
#[derive(Debug, Default)]
struct FillLedger {
    day: Option<NaiveDate>,
    seen: HashSet<(Exchange, String)>,
}

impl FillLedger {
    /// False for a fill that was already recorded.
    fn record(&mut self, trade: &TradeRecord) -> bool {
        let day = (trade.traded_at + chrono::Duration::hours(8)).date_naive();
        if self.day.map_or(true, |current| day > current) {
            if let Some(previous) = self.day {
                debug!(%previous, %day, dropped = self.len(), "new trading day");
            }
            self.day = Some(day);
            self.seen.clear();
        }
        self.seen.insert((trade.exchange, trade.trade_id.clone()))
    }

    fn len(&self) -> usize {
        self.seen.len()
    }
}

pub struct TradingSession {
    api: Arc<dyn TradingApi>,
    sink: EventSink,
    state: ConnectionStateMachine,
    registry: OrderIdRegistry,
    orders: OrderStore,
    snapshots: SnapshotStore,
    credentials: RwLock<Option<CustLoginRequest>>,
    login: RwLock<Option<LoginContext>>,
    fills: Mutex<FillLedger>,
}

impl TradingSession {
    /// Creates the session and registers it for the api's callbacks.
    pub fn new(api: Arc<dyn TradingApi>, sink: EventSink) -> Arc<Self> {
        let session = Arc::new(Self {
            api,
            sink,
            state: ConnectionStateMachine::new(),
            registry: OrderIdRegistry::new(),
            orders: OrderStore::new(),
            snapshots: SnapshotStore::new(),
            credentials: RwLock::new(None),
            login: RwLock::new(None),
            fills: Mutex::new(FillLedger::default()),
        });
        let spi: Weak<dyn TradingSpi> = Arc::downgrade(&session) as Weak<dyn TradingSpi>;
        session.api.register_spi(spi);
        session
    }

    fn ctx(&self) -> CallbackContext<'_> {
        CallbackContext {
            kind: SessionKind::Trading,
            state: &self.state,
            sink: &self.sink,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    pub fn registry(&self) -> &OrderIdRegistry {
        &self.registry
    }

    // ─────────────────────────────────────────────────────────────
    // Outbound operations
    // ─────────────────────────────────────────────────────────────

    /// Start connecting. Login follows automatically once connected.
    pub fn connect(&self, address: &str, credentials: CustLoginRequest) -> Result<()> {
        let ctx = self.ctx();
        ctx.transition(SessionEvent::Connect, address)?;
        *self.credentials.write() = Some(credentials);

        if let Err(e) = self.api.connect(address) {
            ctx.transition(SessionEvent::ConnectFailure, &e.to_string())?;
            return Err(Error::ConnectionFailure(e.to_string()));
        }
        Ok(())
    }

    /// Submit an order. The provisional `Submitting` record is emitted before
    /// the request leaves, so it always precedes the venue's acknowledgment.
    pub fn send_order(&self, req: &OrderRequest) -> Result<LocalId> {
        self.state.ensure_ready()?;
        let account = self.trading_account(req.exchange)?;

        let local_id = self.registry.allocate_local_id();
        let wire = codec::encode_order(local_id, req, &account)?;

        let record = OrderRecord::submitting(local_id, req);
        self.orders.insert(record.clone());
        self.sink.emit(EventPayload::Order(record));

        if let Err(e) = self.api.submit_order(&wire) {
            warn!(%local_id, error = %e, "order submission refused");
            if let Some(rejected) = self.orders.mark_rejected(local_id) {
                self.sink.emit(EventPayload::Order(rejected));
            }
            return Err(e);
        }

        debug!(%local_id, symbol = %req.symbol, price = %req.price, volume = %req.volume, "order sent");
        Ok(local_id)
    }

    /// Cancel a working order. Unknown, unacknowledged or finished orders are ignored.
    pub fn cancel_order(&self, req: &CancelRequest) -> Result<()> {
        self.state.ensure_ready()?;

        let Some(order) = self.orders.get(req.local_id) else {
            debug!(local_id = %req.local_id, "cancel ignored: unknown order");
            return Ok(());
        };
        if !order.is_active() {
            debug!(local_id = %req.local_id, status = %order.status, "cancel ignored: order finished");
            return Ok(());
        }
        let Some(system_id) = self.registry.lookup_system_id(req.local_id) else {
            debug!(local_id = %req.local_id, "cancel ignored: not acknowledged yet");
            return Ok(());
        };

        let account = self.trading_account(order.exchange)?;
        self.api
            .cancel_order(&codec::encode_cancel(&order, &system_id, &account))
    }

    pub fn query_account(&self) -> Result<()> {
        self.state.ensure_ready()?;
        self.api.query_fund(&self.query_request()?)
    }

    pub fn query_position(&self) -> Result<()> {
        self.state.ensure_ready()?;
        self.api.query_shares(&self.query_request()?)
    }

    pub fn close(&self) {
        if let Err(e) = self.ctx().transition(SessionEvent::Close, "closed by owner") {
            debug!(error = %e, "trading session already closed");
            return;
        }
        self.api.close();
    }

    fn trading_account(&self, exchange: Exchange) -> Result<TradingAccount> {
        let login = self.login.read();
        let login = login
            .as_ref()
            .ok_or(Error::NotReady { state: self.state.state() })?;
        let account_id = login
            .accounts
            .get(&exchange)
            .ok_or_else(|| Error::InvalidRequest(format!("no trading account bound for {exchange}")))?;
        Ok(TradingAccount {
            cust_id: login.cust_id.clone(),
            fund_account_id: login.fund_account_id.clone(),
            account_id: account_id.clone(),
        })
    }

    fn query_request(&self) -> Result<QueryRequest> {
        let login = self.login.read();
        let login = login
            .as_ref()
            .ok_or(Error::NotReady { state: self.state.state() })?;
        Ok(QueryRequest {
            cust_id: login.cust_id.clone(),
            fund_account_id: login.fund_account_id.clone(),
            market_id: None,
        })
    }

    // ─────────────────────────────────────────────────────────────
    // Callback handling
    // ─────────────────────────────────────────────────────────────

    fn request_login(&self, reason: &str) -> Result<()> {
        let ctx = self.ctx();
        ctx.transition(SessionEvent::Connected, reason)?;

        let credentials = self
            .credentials
            .read()
            .clone()
            .ok_or_else(|| Error::Config("no credentials for login".into()))?;
        ctx.transition(SessionEvent::LoginRequested, &credentials.user_id)?;

        if let Err(e) = self.api.login(&credentials) {
            ctx.transition(SessionEvent::LoginFailed, &e.to_string())?;
            return Err(e);
        }
        Ok(())
    }

    fn handle_login_response(&self, response: &CustLoginResponse) -> Result<()> {
        let ctx = self.ctx();
        if response.permission_error_code != 0 {
            let reason = format!("login rejected ({}): {}", response.permission_error_code, response.error_msg);
            ctx.transition(SessionEvent::LoginFailed, &reason)?;
            return Err(Error::ConnectionFailure(reason));
        }

        let mut accounts = HashMap::new();
        for binding in &response.accounts {
            match ExchangeCodec::decode(binding.market_id) {
                Ok(exchange) => {
                    accounts.insert(exchange, binding.account_id.clone());
                }
                Err(e) => warn!(error = %e, account = %binding.account_id, "skipping account on unsupported market"),
            }
        }
        info!(cust_id = %response.cust_id, markets = accounts.len(), "customer login accepted");
        *self.login.write() = Some(LoginContext {
            cust_id: response.cust_id.clone(),
            fund_account_id: response.fund_account_id.clone(),
            accounts,
        });

        let transition = ctx.transition(SessionEvent::LoginSucceeded, "customer login accepted")?;
        self.on_ready(transition.first_ready);
        Ok(())
    }

    /// Reference data once per session lifetime; orders and trades on every login.
    fn on_ready(&self, first_ready: bool) {
        let request = match self.query_request() {
            Ok(request) => request,
            Err(e) => return self.ctx().report("on_ready", &e),
        };
        let mut queries: Vec<(&str, Result<()>)> = Vec::new();
        if first_ready {
            queries.push(("query_contracts", self.api.query_contracts(&request)));
        }
        queries.push(("query_orders", self.api.query_orders(&request)));
        queries.push(("query_trades", self.api.query_trades(&request)));

        for (name, result) in queries {
            if let Err(e) = result {
                self.ctx().report(name, &e);
            }
        }
    }

    fn handle_ack(&self, ack: &OrderStatusAck) -> Result<()> {
        let mut update = codec::decode_ack(ack)?;
        let local_id = update.local_id;
        self.registry.observe(local_id);

        if update.status == Status::Rejected && !ack.reject_reason.is_empty() {
            warn!(%local_id, reason = %ack.reject_reason, "order rejected");
            self.sink
                .log(LogLevel::Warn, format!("order {local_id} rejected: {}", ack.reject_reason));
        }

        if let Some(system_id) = &update.system_id {
            if let Err(anomaly) = self.registry.bind(local_id, system_id.clone()) {
                self.report_anomaly(anomaly);
            }
        }
        // the record only ever carries the bound system id
        update.system_id = self.registry.lookup_system_id(local_id);

        let outcome = self.orders.apply_ack(update);
        if outcome.adopted {
            info!(%local_id, "order from another session adopted");
        }
        for anomaly in outcome.anomalies {
            self.report_anomaly(anomaly);
        }
        self.sink.emit(EventPayload::Order(outcome.record));
        Ok(())
    }

    fn handle_trade(&self, report: &TradeReport) -> Result<()> {
        let local_id = self.resolve_fill(report)?;
        let trade = codec::decode_trade(report, local_id)?;

        if !self.fills.lock().record(&trade) {
            debug!(trade_id = %trade.trade_id, "duplicate fill dropped");
            return Ok(());
        }

        debug!(trade_id = %trade.trade_id, %local_id, volume = %trade.volume, "fill");
        self.sink.emit(EventPayload::Trade(trade));
        Ok(())
    }

    /// System id first; the correlation token is the fallback for a fill that
    /// overtakes its acknowledgment.
    fn resolve_fill(&self, report: &TradeReport) -> Result<LocalId> {
        let system_id = SystemId::parse(&report.order_id);
        if let Some(local_id) = system_id
            .as_ref()
            .and_then(|id| self.registry.lookup_local_id(id))
        {
            return Ok(local_id);
        }

        let local_id = report
            .cl_ord_no
            .map(LocalId::new)
            .ok_or_else(|| ProtocolAnomaly::UnknownOrder(report.order_id.clone()))?;
        self.registry.observe(local_id);
        if let Some(system_id) = system_id {
            if let Err(anomaly) = self.registry.bind(local_id, system_id) {
                self.report_anomaly(anomaly);
            }
        }
        Ok(local_id)
    }

    fn report_anomaly(&self, anomaly: ProtocolAnomaly) {
        warn!(%anomaly, "protocol anomaly");
        self.sink.log(LogLevel::Warn, anomaly.to_string());
    }

    fn handle_fund(&self, result: &FundQueryResult) -> Result<()> {
        let account = codec::decode_account(result);
        self.snapshots.update_account(account.clone());
        self.sink.emit(EventPayload::Account(account));
        Ok(())
    }

    fn handle_shares(&self, result: &ShareQueryResult) -> Result<()> {
        let position = codec::decode_position(result)?;
        self.snapshots.update_position(position.clone());
        self.sink.emit(EventPayload::Position(position));
        Ok(())
    }

    fn handle_contract(&self, result: &ContractQueryResult) -> Result<()> {
        let contract = codec::decode_contract(result)?;
        self.snapshots.update_contract(contract.clone());
        self.sink.emit(EventPayload::Contract(contract));
        Ok(())
    }
}

impl TradingSpi for TradingSession {
    fn on_connected(&self, reason: &str) {
        self.ctx().guard("on_connected", || self.request_login(reason));
    }

    fn on_closed(&self, reason: &str) {
        self.ctx().guard("on_closed", || {
            self.ctx().transition(SessionEvent::Close, reason).map(drop)
        });
    }

    fn on_connect_failure(&self, reason: &str) {
        self.ctx().guard("on_connect_failure", || {
            self.ctx().transition(SessionEvent::ConnectFailure, reason).map(drop)
        });
    }

    fn on_connect_timeout(&self, reason: &str) {
        self.ctx().guard("on_connect_timeout", || {
            self.ctx().transition(SessionEvent::ConnectTimeout, reason).map(drop)
        });
    }

    fn on_heartbeat_timeout(&self, reason: &str) {
        self.ctx().guard("on_heartbeat_timeout", || {
            self.ctx().transition(SessionEvent::HeartbeatTimeout, reason).map(drop)
        });
    }

    fn on_end_of_connection(&self, reason: &str) {
        self.ctx().guard("on_end_of_connection", || {
            self.ctx().transition(SessionEvent::EndOfConnection, reason).map(drop)
        });
    }

    fn on_login(&self, reason: &str) {
        self.ctx().guard("on_login", || {
            info!(reason, "agent login");
            self.sink.log(LogLevel::Info, format!("agent login: {reason}"));
            Ok(())
        });
    }

    fn on_logout(&self, reason: &str) {
        self.ctx().guard("on_logout", || {
            self.ctx().transition(SessionEvent::Logout, reason).map(drop)
        });
    }

    fn on_error(&self, reason: &str) {
        self.ctx()
            .guard("on_error", || Err(Error::Vendor(reason.to_string())));
    }

    fn on_log(&self, level: i32, msg: &str) {
        self.ctx().guard("on_log", || {
            self.ctx().vendor_log(level, msg);
            Ok(())
        });
    }

    fn on_cust_login_response(&self, response: &CustLoginResponse) {
        self.ctx()
            .guard("on_cust_login_response", || self.handle_login_response(response));
    }

    fn on_cust_logout_response(&self, reason: &str) {
        self.ctx().guard("on_cust_logout_response", || {
            self.ctx().transition(SessionEvent::Logout, reason).map(drop)
        });
    }

    fn on_password_modify_result(&self, code: i32, msg: &str) {
        self.ctx().guard("on_password_modify_result", || {
            let level = if code == 0 { LogLevel::Info } else { LogLevel::Warn };
            info!(code, msg, "password modify result");
            self.sink.log(level, format!("password modify ({code}): {msg}"));
            Ok(())
        });
    }

    fn on_order_status_internal_ack(&self, ack: &OrderStatusAck) {
        self.ctx()
            .guard("on_order_status_internal_ack", || self.handle_ack(ack));
    }

    fn on_order_status_ack(&self, ack: &OrderStatusAck) {
        self.ctx().guard("on_order_status_ack", || self.handle_ack(ack));
    }

    fn on_trade_report(&self, report: &TradeReport) {
        self.ctx().guard("on_trade_report", || self.handle_trade(report));
    }

    fn on_order_query_result(&self, ack: &OrderStatusAck) {
        self.ctx().guard("on_order_query_result", || self.handle_ack(ack));
    }

    fn on_trade_query_result(&self, report: &TradeReport) {
        self.ctx()
            .guard("on_trade_query_result", || self.handle_trade(report));
    }

    fn on_fund_query_result(&self, result: &FundQueryResult) {
        self.ctx().guard("on_fund_query_result", || self.handle_fund(result));
    }

    fn on_share_query_result(&self, result: &ShareQueryResult) {
        self.ctx()
            .guard("on_share_query_result", || self.handle_shares(result));
    }

    fn on_contract_query_result(&self, result: &ContractQueryResult) {
        self.ctx()
            .guard("on_contract_query_result", || self.handle_contract(result));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::GatewayEvent;
    use rust_decimal_macros::dec;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Connect(String),
        Login(String),
        Submit(NewOrder),
        Cancel(CancelOrder),
        Query(&'static str),
        Close,
    }

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<Call>>,
        refuse_orders: bool,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().clone()
        }

        fn record(&self, call: Call) -> Result<()> {
            self.calls.lock().push(call);
            Ok(())
        }
    }

    impl TradingApi for RecordingApi {
        fn register_spi(&self, _spi: Weak<dyn TradingSpi>) {}

        fn connect(&self, address: &str) -> Result<()> {
            self.record(Call::Connect(address.to_string()))
        }

        fn login(&self, request: &CustLoginRequest) -> Result<()> {
            self.record(Call::Login(request.user_id.clone()))
        }

        fn submit_order(&self, order: &NewOrder) -> Result<()> {
            if self.refuse_orders {
                return Err(Error::Vendor("throttled".into()));
            }
            self.record(Call::Submit(order.clone()))
        }

        fn cancel_order(&self, cancel: &CancelOrder) -> Result<()> {
            self.record(Call::Cancel(cancel.clone()))
        }

        fn query_fund(&self, _request: &QueryRequest) -> Result<()> {
            self.record(Call::Query("fund"))
        }

        fn query_shares(&self, _request: &QueryRequest) -> Result<()> {
            self.record(Call::Query("shares"))
        }

        fn query_contracts(&self, _request: &QueryRequest) -> Result<()> {
            self.record(Call::Query("contracts"))
        }

        fn query_orders(&self, _request: &QueryRequest) -> Result<()> {
            self.record(Call::Query("orders"))
        }

        fn query_trades(&self, _request: &QueryRequest) -> Result<()> {
            self.record(Call::Query("trades"))
        }

        fn close(&self) {
            self.calls.lock().push(Call::Close);
        }
    }

    struct Harness {
        api: Arc<RecordingApi>,
        session: Arc<TradingSession>,
        rx: flume::Receiver<GatewayEvent>,
    }

    impl Harness {
        fn new(api: RecordingApi) -> Self {
            let api = Arc::new(api);
            let (tx, rx) = flume::unbounded();
            let session = TradingSession::new(api.clone(), EventSink::new("ATP", tx));
            Self { api, session, rx }
        }

        fn ready() -> Self {
            Self::ready_with(RecordingApi::default())
        }

        fn ready_with(api: RecordingApi) -> Self {
            let h = Self::new(api);
            h.session.connect("tcp://td", credentials()).unwrap();
            h.session.on_connected("up");
            h.session.on_cust_login_response(&login_ok());
            assert_eq!(h.session.state(), SessionState::Ready);
            h.drain();
            h
        }

        fn drain(&self) -> Vec<EventPayload> {
            self.rx.try_iter().map(|e| e.payload).collect()
        }

        fn orders(&self) -> Vec<OrderRecord> {
            self.drain()
                .into_iter()
                .filter_map(|p| match p {
                    EventPayload::Order(o) => Some(o),
                    _ => None,
                })
                .collect()
        }
    }

    fn credentials() -> CustLoginRequest {
        CustLoginRequest {
            user_id: "u1".into(),
            password: "pw".into(),
            fund_account_id: None,
        }
    }

    fn login_ok() -> CustLoginResponse {
        CustLoginResponse {
            cust_id: "C1".into(),
            fund_account_id: "F1".into(),
            permission_error_code: 0,
            error_msg: String::new(),
            accounts: vec![
                AccountBinding { market_id: 101, account_id: "A-SH".into() },
                AccountBinding { market_id: 102, account_id: "A-SZ".into() },
            ],
        }
    }

    fn order_request() -> OrderRequest {
        OrderRequest {
            symbol: Symbol::new("600000"),
            exchange: Exchange::Sse,
            direction: Direction::Long,
            offset: Offset::None,
            order_type: OrderType::Limit,
            price: dec!(12.34),
            volume: dec!(3.0),
        }
    }

    fn ack(local_id: LocalId, order_id: &str, cum_qty: i64, status: char) -> OrderStatusAck {
        OrderStatusAck {
            cl_ord_no: local_id.value(),
            order_id: order_id.into(),
            market_id: 101,
            security_id: "600000".into(),
            side: '1',
            position_effect: 'N',
            ord_type: '2',
            price: 123400,
            order_qty: 300,
            cum_qty,
            ord_status: status,
            transact_time: 20240115093000123,
            reject_reason: String::new(),
        }
    }

    fn fill(exec_id: &str, order_id: &str, cl_ord_no: Option<u64>) -> TradeReport {
        TradeReport {
            exec_id: exec_id.into(),
            order_id: order_id.into(),
            cl_ord_no,
            market_id: 101,
            security_id: "600000".into(),
            side: '1',
            position_effect: 'N',
            last_px: 123400,
            last_qty: 100,
            transact_time: 20240115093001000,
        }
    }

    #[test]
    fn test_login_flow_and_recovery_queries() {
        let h = Harness::new(RecordingApi::default());
        h.session.connect("tcp://td", credentials()).unwrap();
        assert_eq!(h.session.state(), SessionState::Connecting);

        h.session.on_connected("up");
        assert_eq!(h.session.state(), SessionState::Authenticating);

        h.session.on_cust_login_response(&login_ok());
        assert_eq!(h.session.state(), SessionState::Ready);
        assert_eq!(
            h.api.calls(),
            [
                Call::Connect("tcp://td".into()),
                Call::Login("u1".into()),
                Call::Query("contracts"),
                Call::Query("orders"),
                Call::Query("trades"),
            ]
        );

        // logout keeps the transport
        h.session.on_logout("kicked");
        assert_eq!(h.session.state(), SessionState::Connected);
    }

    #[test]
    fn test_login_rejected_fails_session() {
        let h = Harness::new(RecordingApi::default());
        h.session.connect("tcp://td", credentials()).unwrap();
        h.session.on_connected("up");
        h.session.on_cust_login_response(&CustLoginResponse {
            permission_error_code: 17,
            error_msg: "bad password".into(),
            ..login_ok()
        });
        assert_eq!(h.session.state(), SessionState::Failed);
    }

    #[test]
    fn test_operations_fail_fast_before_ready() {
        let h = Harness::new(RecordingApi::default());
        assert!(matches!(
            h.session.send_order(&order_request()),
            Err(Error::NotReady { state: SessionState::Disconnected })
        ));
        assert!(matches!(h.session.query_account(), Err(Error::NotReady { .. })));
        assert!(matches!(
            h.session.cancel_order(&CancelRequest { local_id: LocalId::new(1) }),
            Err(Error::NotReady { .. })
        ));
        assert!(h.api.calls().is_empty());
    }

    #[test]
    fn test_send_order_echoes_then_reconciles() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();

        let echoed = h.orders();
        assert_eq!(echoed.len(), 1);
        assert_eq!(echoed[0].status, Status::Submitting);
        assert_eq!(echoed[0].local_id, local_id);

        let submitted = h
            .api
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Submit(order) => Some(order),
                _ => None,
            })
            .unwrap();
        assert_eq!((submitted.price, submitted.order_qty), (123400, 300));
        assert_eq!(submitted.account_id, "A-SH");
        assert_eq!(submitted.cl_ord_no, local_id.value());

        h.session.on_order_status_ack(&ack(local_id, "S1", 100, '1'));
        let updated = h.orders();
        assert_eq!(updated.len(), 1);
        assert_eq!(updated[0].traded, dec!(1));
        assert_eq!(updated[0].status, Status::PartTraded);
        assert_eq!(h.session.orders().len(), 1);
        assert_eq!(
            h.session.registry().lookup_system_id(local_id),
            SystemId::parse("S1")
        );
    }

    #[test]
    fn test_refused_submission_marks_rejected() {
        let h = Harness::ready_with(RecordingApi {
            refuse_orders: true,
            ..Default::default()
        });
        assert!(matches!(h.session.send_order(&order_request()), Err(Error::Vendor(_))));
        let statuses: Vec<_> = h.orders().into_iter().map(|o| o.status).collect();
        assert_eq!(statuses, [Status::Submitting, Status::Rejected]);
    }

    #[test]
    fn test_cancel_without_system_id_is_noop() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        assert!(h.session.cancel_order(&CancelRequest { local_id }).is_ok());
        assert!(h
            .session
            .cancel_order(&CancelRequest { local_id: LocalId::new(999) })
            .is_ok());
        assert!(!h.api.calls().iter().any(|c| matches!(c, Call::Cancel(_))));
    }

    #[test]
    fn test_cancel_acknowledged_order() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        h.session.on_order_status_ack(&ack(local_id, "S1", 0, '0'));
        h.session.cancel_order(&CancelRequest { local_id }).unwrap();

        let cancel = h
            .api
            .calls()
            .into_iter()
            .find_map(|c| match c {
                Call::Cancel(cancel) => Some(cancel),
                _ => None,
            })
            .unwrap();
        assert_eq!(cancel.orig_order_id, "S1");
        assert_eq!(cancel.orig_cl_ord_no, local_id.value());

        // terminal orders are not cancelled again
        h.session.on_order_status_ack(&ack(local_id, "S1", 0, '4'));
        h.session.cancel_order(&CancelRequest { local_id }).unwrap();
        let cancels = h.api.calls().iter().filter(|c| matches!(c, Call::Cancel(_))).count();
        assert_eq!(cancels, 1);
    }

    #[test]
    fn test_reused_system_id_is_not_copied_to_record() {
        let h = Harness::ready();
        let first = h.session.send_order(&order_request()).unwrap();
        let second = h.session.send_order(&order_request()).unwrap();
        h.session.on_order_status_ack(&ack(first, "S1", 0, '0'));
        h.drain();

        h.session.on_order_status_ack(&ack(second, "S1", 0, '0'));
        let events = h.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            EventPayload::Log(LogRecord { level: LogLevel::Warn, .. })
        )));
        let order = events
            .into_iter()
            .find_map(|e| match e {
                EventPayload::Order(o) => Some(o),
                _ => None,
            })
            .unwrap();
        assert_eq!(order.local_id, second);
        assert_eq!(order.system_id, None);
        assert_eq!(h.session.registry().lookup_system_id(second), None);

        // no bound system id, so nothing to cancel
        h.session.cancel_order(&CancelRequest { local_id: second }).unwrap();
        assert!(!h.api.calls().iter().any(|c| matches!(c, Call::Cancel(_))));
    }

    #[test]
    fn test_traded_volume_regression_is_not_applied() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        h.session.on_order_status_ack(&ack(local_id, "S1", 200, '1'));
        h.drain();

        h.session.on_order_status_ack(&ack(local_id, "S1", 100, '1'));
        let events = h.drain();
        assert!(events.iter().any(|e| matches!(
            e,
            EventPayload::Log(LogRecord { level: LogLevel::Warn, .. })
        )));
        let order = events
            .into_iter()
            .find_map(|e| match e {
                EventPayload::Order(o) => Some(o),
                _ => None,
            })
            .unwrap();
        assert_eq!(order.traded, dec!(2));
    }

    #[test]
    fn test_bad_ack_is_dropped_not_fatal() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        h.drain();

        h.session.on_order_status_ack(&ack(local_id, "S1", 0, 'Z'));
        assert!(h.orders().is_empty());
        assert_eq!(h.session.orders().get(local_id).unwrap().status, Status::Submitting);

        h.session.on_order_status_ack(&ack(local_id, "S1", 0, '0'));
        assert_eq!(h.orders().len(), 1);
    }

    #[test]
    fn test_fill_resolution_and_dedup() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        h.session.on_order_status_ack(&ack(local_id, "S1", 0, '0'));
        h.drain();

        h.session.on_trade_report(&fill("T1", "S1", None));
        h.session.on_trade_report(&fill("T1", "S1", None));
        h.session.on_trade_query_result(&fill("T1", "S1", None));

        let trades: Vec<_> = h
            .drain()
            .into_iter()
            .filter_map(|e| match e {
                EventPayload::Trade(t) => Some(t),
                _ => None,
            })
            .collect();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].local_id, local_id);
        assert_eq!(trades[0].volume, dec!(1));

        // fills do not touch the order record
        assert_eq!(h.session.orders().get(local_id).unwrap().traded, dec!(0));
    }

    #[test]
    fn test_fill_ledger_resets_on_new_trading_day() {
        let trade = |exec_id: &str, transact_time: i64| {
            let mut report = fill(exec_id, "S1", None);
            report.transact_time = transact_time;
            codec::decode_trade(&report, LocalId::new(1)).unwrap()
        };
        let mut ledger = FillLedger::default();
        assert!(ledger.record(&trade("T1", 20240115093001000)));
        assert!(ledger.record(&trade("T2", 20240115145959000)));
        assert!(!ledger.record(&trade("T1", 20240115093001000)));
        assert_eq!(ledger.len(), 2);

        // 00:30 local on the 16th is still the 15th in UTC
        assert!(ledger.record(&trade("T1", 20240116003000000)));
        assert_eq!(ledger.len(), 1);
        assert!(!ledger.record(&trade("T1", 20240116093000000)));
    }

    #[test]
    fn test_fill_before_ack_binds_by_correlation_token() {
        let h = Harness::ready();
        let local_id = h.session.send_order(&order_request()).unwrap();
        h.session.on_trade_report(&fill("T9", "S7", Some(local_id.value())));
        assert_eq!(
            h.session.registry().lookup_local_id(&SystemId::parse("S7").unwrap()),
            Some(local_id)
        );

        h.session.on_trade_report(&fill("T10", "S404", None));
        let unknown = h.drain().into_iter().any(|e| matches!(
            e,
            EventPayload::Log(LogRecord { ref msg, .. }) if msg.contains("S404")
        ));
        assert!(unknown);
    }

    #[test]
    fn test_foreign_order_adopted_and_ids_not_reused() {
        let h = Harness::ready();
        h.session.on_order_query_result(&ack(LocalId::new(50), "S50", 0, '0'));
        assert!(h.session.orders().get(LocalId::new(50)).is_some());

        let next = h.session.send_order(&order_request()).unwrap();
        assert_eq!(next, LocalId::new(51));
    }

    #[test]
    fn test_query_results_replace_snapshots() {
        let h = Harness::ready();
        for total_qty in [50000, 20000] {
            h.session.on_share_query_result(&ShareQueryResult {
                market_id: 101,
                security_id: "600000".into(),
                total_qty,
                init_qty: total_qty,
                frozen_qty: 0,
                cost_price: 105000,
            });
        }
        let position = h
            .session
            .snapshots()
            .position(&Symbol::new("600000"), Exchange::Sse)
            .unwrap();
        assert_eq!(position.volume, dec!(200));

        h.session.on_fund_query_result(&FundQueryResult {
            fund_account_id: "F1".into(),
            balance: 1_000_000_0000,
            frozen: 0,
        });
        assert_eq!(h.session.snapshots().account("F1").unwrap().balance, dec!(1000000));

        h.session.query_account().unwrap();
        h.session.query_position().unwrap();
        let calls = h.api.calls();
        assert!(calls.ends_with(&[Call::Query("fund"), Call::Query("shares")]));
    }

    #[test]
    fn test_lifecycle_failures_and_close() {
        let h = Harness::ready();
        h.session.on_connect_failure("late");
        assert_eq!(h.session.state(), SessionState::Ready);

        h.session.on_heartbeat_timeout("silent");
        assert_eq!(h.session.state(), SessionState::Failed);

        h.session.close();
        assert_eq!(h.session.state(), SessionState::Closed);
        assert_eq!(h.api.calls().last(), Some(&Call::Close));

        h.drain();
        h.session.on_connected("zombie");
        h.session.on_order_status_ack(&ack(LocalId::new(1), "S1", 0, '0'));
        assert!(h.drain().is_empty());
    }
}
