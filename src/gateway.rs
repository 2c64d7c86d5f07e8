//! ATP gateway - venue-agnostic operations over the two vendor sessions

use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, info};

use crate::atp_api::model::CustLoginRequest;
use crate::core::config::ConnectionConfig;
use crate::core::error::{Error, Result};
use crate::core::traits::{MarketDataApi, TradingApi};
use crate::core::types::*;
use crate::engine::{PollScheduler, PollTask};
use crate::events::{EventSink, GatewayEvent};
use crate::session::{MarketDataSession, TradingSession};

/// Connection settings: user id, password, trading and market-data servers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectSetting {
    pub user_id: String,
    pub password: String,
    pub td_address: String,
    pub md_address: String,
    pub fund_account_id: Option<String>,
}

impl ConnectSetting {
    pub fn from_config(config: &ConnectionConfig) -> Result<Self> {
        let user_id = config
            .user_id
            .clone()
            .ok_or_else(|| Error::Config("connection.user_id (or ATP_USER_ID) is required".into()))?;
        let password = config
            .password
            .clone()
            .ok_or_else(|| Error::Config("connection.password (or ATP_PASSWORD) is required".into()))?;
        Ok(Self {
            user_id,
            password,
            td_address: config.td_address.clone(),
            md_address: config.md_address.clone(),
            fund_account_id: config.fund_account_id.clone(),
        })
    }

    fn credentials(&self) -> CustLoginRequest {
        CustLoginRequest {
            user_id: self.user_id.clone(),
            password: self.password.clone(),
            fund_account_id: self.fund_account_id.clone(),
        }
    }
}

pub struct AtpGateway {
    name: String,
    trading: Arc<TradingSession>,
    market_data: Arc<MarketDataSession>,
    poll_interval: u32,
    scheduler: Mutex<Option<PollScheduler>>,
}

impl AtpGateway {
    pub const DEFAULT_NAME: &'static str = "ATP";

    pub fn new(
        name: impl Into<String>,
        td_api: Arc<dyn TradingApi>,
        md_api: Arc<dyn MarketDataApi>,
        poll_interval: u32,
        tx: flume::Sender<GatewayEvent>,
    ) -> Result<Self> {
        if poll_interval == 0 {
            return Err(Error::Config("poll interval must be at least 1 tick".into()));
        }
        let name = name.into();
        Ok(Self {
            trading: TradingSession::new(td_api, EventSink::new(name.clone(), tx.clone())),
            market_data: MarketDataSession::new(md_api, EventSink::new(name.clone(), tx)),
            name,
            poll_interval,
            scheduler: Mutex::new(None),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exchanges(&self) -> &'static [Exchange] {
        &[Exchange::Sse, Exchange::Szse]
    }

    pub fn trading(&self) -> &Arc<TradingSession> {
        &self.trading
    }

    pub fn market_data(&self) -> &Arc<MarketDataSession> {
        &self.market_data
    }

    /// Connect both sessions and start periodic queries. Login completes
    /// asynchronously; watch the session events for `ready`.
    ///
    /// Calling it again after a failure reconnects only the sessions that are
    /// disconnected or failed. Both sessions are tried and periodic queries are
    /// installed before the first session error is returned.
    pub fn connect(&self, setting: &ConnectSetting) -> Result<()> {
        info!(gateway = %self.name, td = %setting.td_address, md = %setting.md_address, "connecting");
        let trading = match self.trading.state() {
            state if in_progress(state) => {
                debug!(%state, "trading connect skipped");
                Ok(())
            }
            _ => self
                .trading
                .connect(&setting.td_address, setting.credentials()),
        };
        let market_data = match self.market_data.state() {
            state if in_progress(state) => {
                debug!(%state, "market data connect skipped");
                Ok(())
            }
            _ => self
                .market_data
                .connect(&setting.md_address, setting.credentials()),
        };

        if self.trading.state() != SessionState::Closed {
            self.init_query()?;
        }
        trading.and(market_data)
    }

    fn init_query(&self) -> Result<()> {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_some() {
            return Ok(());
        }

        let account = Arc::downgrade(&self.trading);
        let position = Arc::downgrade(&self.trading);
        *scheduler = Some(
            PollScheduler::new(self.poll_interval)?
                .with_task(PollTask::new("query_account", move || match account.upgrade() {
                    Some(session) => session.query_account(),
                    None => Ok(()),
                }))
                .with_task(PollTask::new("query_position", move || match position.upgrade() {
                    Some(session) => session.query_position(),
                    None => Ok(()),
                })),
        );
        Ok(())
    }

    pub fn subscribe(&self, req: SubscribeRequest) -> Result<()> {
        self.market_data.subscribe(req)
    }

    pub fn unsubscribe(&self, req: &SubscribeRequest) -> Result<()> {
        self.market_data.unsubscribe(req)
    }

    pub fn send_order(&self, req: &OrderRequest) -> Result<LocalId> {
        self.trading.send_order(req)
    }

    pub fn cancel_order(&self, req: &CancelRequest) -> Result<()> {
        self.trading.cancel_order(req)
    }

    pub fn query_account(&self) -> Result<()> {
        self.trading.query_account()
    }

    pub fn query_position(&self) -> Result<()> {
        self.trading.query_position()
    }

    /// One external timer tick. Returns the query issued on this tick, if any.
    pub fn process_timer_tick(&self) -> Option<&'static str> {
        match self.scheduler.lock().as_mut() {
            Some(scheduler) => scheduler.on_tick(),
            None => {
                debug!(gateway = %self.name, "timer tick before connect");
                None
            }
        }
    }

    pub fn close(&self) {
        info!(gateway = %self.name, "closing");
        self.scheduler.lock().take();
        self.trading.close();
        self.market_data.close();
    }
}

fn in_progress(state: SessionState) -> bool {
    matches!(
        state,
        SessionState::Connecting
            | SessionState::Connected
            | SessionState::Authenticating
            | SessionState::Ready
    )
}
