//! Market-data session - subscriptions and snapshot decoding

use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::atp_api::codec;
use crate::atp_api::model::*;
use crate::core::error::{Error, Result};
use crate::core::traits::{MarketDataApi, MarketDataSpi};
use crate::core::types::*;
use crate::engine::{ConnectionStateMachine, SessionEvent};
use crate::events::{EventPayload, EventSink, SessionKind};
use crate::session::CallbackContext;

pub struct MarketDataSession {
    api: Arc<dyn MarketDataApi>,
    sink: EventSink,
    state: ConnectionStateMachine,
    credentials: RwLock<Option<CustLoginRequest>>,
    subscriptions: RwLock<HashSet<SubscribeRequest>>,
}

impl MarketDataSession {
    pub fn new(api: Arc<dyn MarketDataApi>, sink: EventSink) -> Arc<Self> {
        let session = Arc::new(Self {
            api,
            sink,
            state: ConnectionStateMachine::new(),
            credentials: RwLock::new(None),
            subscriptions: RwLock::new(HashSet::new()),
        });
        let spi: Weak<dyn MarketDataSpi> = Arc::downgrade(&session) as Weak<dyn MarketDataSpi>;
        session.api.register_spi(spi);
        session
    }

    fn ctx(&self) -> CallbackContext<'_> {
        CallbackContext {
            kind: SessionKind::MarketData,
            state: &self.state,
            sink: &self.sink,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.state()
    }

    pub fn subscriptions(&self) -> Vec<SubscribeRequest> {
        self.subscriptions.read().iter().cloned().collect()
    }

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

    /// Subscriptions made before login are sent once the session is ready.
    pub fn subscribe(&self, req: SubscribeRequest) -> Result<()> {
        if self.state.is_closed() {
            return Err(Error::NotReady { state: SessionState::Closed });
        }
        let fresh = self.subscriptions.write().insert(req.clone());
        if !fresh {
            debug!(symbol = %req.symbol, exchange = %req.exchange, "already subscribed");
            return Ok(());
        }
        if self.state.is_ready() {
            let sent = self.api.subscribe(&codec::encode_subscription(&req));
            if sent.is_err() {
                self.subscriptions.write().remove(&req);
            }
            sent
        } else {
            debug!(symbol = %req.symbol, state = %self.state.state(), "subscription deferred until login");
            Ok(())
        }
    }

    pub fn unsubscribe(&self, req: &SubscribeRequest) -> Result<()> {
        let removed = self.subscriptions.write().remove(req);
        if removed && self.state.is_ready() {
            self.api.unsubscribe(&codec::encode_subscription(req))?;
        }
        Ok(())
    }

    pub fn close(&self) {
        if let Err(e) = self.ctx().transition(SessionEvent::Close, "closed by owner") {
            debug!(error = %e, "market data session already closed");
            return;
        }
        self.api.close();
    }

    /// Decode a batch element by element. A bad element is logged and
    /// skipped; the rest of the batch still goes out.
    pub fn decode_batch(&self, batch: &[MarketDataSnapshot]) -> Vec<TickRecord> {
        let mut ticks = Vec::with_capacity(batch.len());
        for (index, snapshot) in batch.iter().enumerate() {
            match codec::decode_snapshot(snapshot) {
                Ok(tick) => ticks.push(tick),
                Err(e) => {
                    warn!(index, security = %snapshot.security_id, error = %e, "snapshot dropped");
                    self.sink.log(
                        LogLevel::Warn,
                        format!("snapshot {} dropped: {e}", snapshot.security_id),
                    );
                }
            }
        }
        ticks
    }

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

    fn handle_login(&self, success: bool, reason: &str) -> Result<()> {
        if !success {
            self.ctx().transition(SessionEvent::LoginFailed, reason)?;
            return Err(Error::ConnectionFailure(format!("market data login rejected: {reason}")));
        }
        self.ctx().transition(SessionEvent::LoginSucceeded, reason)?;

        for req in self.subscriptions() {
            if let Err(e) = self.api.subscribe(&codec::encode_subscription(&req)) {
                self.ctx().report("subscribe", &e);
            }
        }
        Ok(())
    }
}

impl MarketDataSpi for MarketDataSession {
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

    fn on_login(&self, success: bool, reason: &str) {
        self.ctx().guard("on_login", || self.handle_login(success, reason));
    }

    fn on_error(&self, reason: &str) {
        self.ctx()
            .guard("on_error", || Err(Error::Vendor(reason.to_string())));
    }

    fn on_snapshot_batch(&self, batch: &[MarketDataSnapshot]) {
        self.ctx().guard("on_snapshot_batch", || {
            for tick in self.decode_batch(batch) {
                self.sink.emit(EventPayload::Tick(tick));
            }
            Ok(())
        });
    }
}
