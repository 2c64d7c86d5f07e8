//! Paper venue - in-process loopback implementation of the vendor session
//!
//! Calls are queued onto one delivery thread, which answers through the
//! registered callbacks the way the real vendor library does. The thread
//! exits once every api handle is dropped.

mod venue;

use std::sync::Weak;
use std::thread::JoinHandle;
use tracing::{debug, info};

use crate::atp_api::model::*;
use crate::core::config::PaperConfig;
use crate::core::error::{Error, Result};
use crate::core::traits::{MarketDataApi, MarketDataSpi, TradingApi, TradingSpi};
use venue::{Command, VenueState};

#[derive(Debug, Clone)]
struct CommandQueue {
    tx: flume::Sender<Command>,
}

impl CommandQueue {
    fn send(&self, command: Command) -> Result<()> {
        self.tx
            .send(command)
            .map_err(|_| Error::Vendor("paper venue stopped".into()))
    }
}

/// Handle to a running loopback venue
pub struct PaperVenue {
    queue: CommandQueue,
    thread: Option<JoinHandle<()>>,
}

impl PaperVenue {
    pub fn start(config: &PaperConfig) -> Result<Self> {
        let mut state = VenueState::new(config)?;
        let (tx, rx) = flume::unbounded::<Command>();

        let thread = std::thread::Builder::new()
            .name("paper-venue".into())
            .spawn(move || {
                while let Ok(command) = rx.recv() {
                    state.handle(command);
                }
                debug!("paper venue delivery thread stopped");
            })
            .map_err(|e| Error::Vendor(format!("cannot start paper venue: {e}")))?;

        info!(contracts = config.contracts.len(), "paper venue started");
        Ok(Self {
            queue: CommandQueue { tx },
            thread: Some(thread),
        })
    }

    pub fn trading_api(&self) -> PaperTradingApi {
        PaperTradingApi {
            queue: self.queue.clone(),
        }
    }

    pub fn market_data_api(&self) -> PaperMarketDataApi {
        PaperMarketDataApi {
            queue: self.queue.clone(),
        }
    }

    /// Wait for the delivery thread after every api handle is gone.
    pub fn join(mut self) {
        let thread = self.thread.take();
        drop(self);
        if let Some(thread) = thread {
            if thread.join().is_err() {
                tracing::error!("paper venue delivery thread panicked");
            }
        }
    }
}

pub struct PaperTradingApi {
    queue: CommandQueue,
}

impl TradingApi for PaperTradingApi {
    fn register_spi(&self, spi: Weak<dyn TradingSpi>) {
        if self.queue.send(Command::RegisterTrading(spi)).is_err() {
            debug!("paper venue stopped before trading registration");
        }
    }

    fn connect(&self, address: &str) -> Result<()> {
        self.queue.send(Command::TradingConnect(address.to_string()))
    }

    fn login(&self, request: &CustLoginRequest) -> Result<()> {
        self.queue.send(Command::TradingLogin(request.clone()))
    }

    fn submit_order(&self, order: &NewOrder) -> Result<()> {
        self.queue.send(Command::Submit(order.clone()))
    }

    fn cancel_order(&self, cancel: &CancelOrder) -> Result<()> {
        self.queue.send(Command::Cancel(cancel.clone()))
    }

    fn query_fund(&self, _request: &QueryRequest) -> Result<()> {
        self.queue.send(Command::QueryFund)
    }

    fn query_shares(&self, _request: &QueryRequest) -> Result<()> {
        self.queue.send(Command::QueryShares)
    }

    fn query_contracts(&self, _request: &QueryRequest) -> Result<()> {
        self.queue.send(Command::QueryContracts)
    }

    fn query_orders(&self, _request: &QueryRequest) -> Result<()> {
        self.queue.send(Command::QueryOrders)
    }

    fn query_trades(&self, _request: &QueryRequest) -> Result<()> {
        self.queue.send(Command::QueryTrades)
    }

    fn close(&self) {
        if self.queue.send(Command::TradingClose).is_err() {
            debug!("paper venue already stopped");
        }
    }
}

pub struct PaperMarketDataApi {
    queue: CommandQueue,
}

impl MarketDataApi for PaperMarketDataApi {
    fn register_spi(&self, spi: Weak<dyn MarketDataSpi>) {
        if self.queue.send(Command::RegisterMarketData(spi)).is_err() {
            debug!("paper venue stopped before market data registration");
        }
    }

    fn connect(&self, address: &str) -> Result<()> {
        self.queue.send(Command::MarketDataConnect(address.to_string()))
    }

    fn login(&self, request: &CustLoginRequest) -> Result<()> {
        self.queue.send(Command::MarketDataLogin(request.clone()))
    }

    fn subscribe(&self, subscription: &Subscription) -> Result<()> {
        self.queue.send(Command::Subscribe(subscription.clone()))
    }

    fn unsubscribe(&self, subscription: &Subscription) -> Result<()> {
        self.queue.send(Command::Unsubscribe(subscription.clone()))
    }

    fn close(&self) {
        if self.queue.send(Command::MarketDataClose).is_err() {
            debug!("paper venue already stopped");
        }
    }
}
