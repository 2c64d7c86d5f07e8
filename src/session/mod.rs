//! Vendor sessions - callback handlers turning wire records into domain events
//!
//! Callbacks arrive on the vendor's delivery thread. Every handler runs inside
//! [`guard`], so neither an error nor a panic ever reaches that thread.

pub mod market_data;
pub mod trading;

pub use market_data::MarketDataSession;
pub use trading::TradingSession;

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use tracing::{debug, error, info, warn};

use crate::core::error::{Error, Result};
use crate::core::types::LogLevel;
use crate::engine::{ConnectionStateMachine, SessionEvent, Transition};
use crate::events::{EventSink, SessionKind};

/// Shared pieces every handler needs
pub(crate) struct CallbackContext<'a> {
    pub kind: SessionKind,
    pub state: &'a ConnectionStateMachine,
    pub sink: &'a EventSink,
}

impl CallbackContext<'_> {
    /// Run one callback handler. Closed sessions drop callbacks unseen.
    pub fn guard(&self, callback: &'static str, handler: impl FnOnce() -> Result<()>) {
        if self.state.is_closed() {
            debug!(kind = ?self.kind, callback, "session closed, callback dropped");
            return;
        }

        match catch_unwind(AssertUnwindSafe(handler)) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => self.report(callback, &e),
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(kind = ?self.kind, callback, panic = %msg, "callback handler panicked");
                self.sink
                    .log(LogLevel::Error, format!("{callback}: handler panicked: {msg}"));
            }
        }
    }

    pub fn report(&self, callback: &str, e: &Error) {
        let level = match e {
            Error::Translation(_) | Error::Anomaly(_) | Error::InvalidTransition { .. } => {
                warn!(kind = ?self.kind, callback, error = %e, "callback not applied");
                LogLevel::Warn
            }
            _ => {
                error!(kind = ?self.kind, callback, error = %e, "callback failed");
                LogLevel::Error
            }
        };
        self.sink.log(level, format!("{callback}: {e}"));
    }

    /// Apply a lifecycle event and publish the new state.
    pub fn transition(&self, event: SessionEvent, reason: &str) -> Result<Transition> {
        let t = self.state.apply(event)?;
        info!(kind = ?self.kind, from = %t.from, to = %t.to, %event, reason, "session state");
        self.sink.session(self.kind, t.to, reason);
        Ok(t)
    }

    /// Vendor log line, re-emitted at the matching level.
    pub fn vendor_log(&self, level: i32, msg: &str) {
        let level = match level {
            i32::MIN..=0 => LogLevel::Debug,
            1 => LogLevel::Info,
            2 => LogLevel::Warn,
            _ => LogLevel::Error,
        };
        match level {
            LogLevel::Debug => debug!(kind = ?self.kind, "{msg}"),
            LogLevel::Info => info!(kind = ?self.kind, "{msg}"),
            LogLevel::Warn => warn!(kind = ?self.kind, "{msg}"),
            LogLevel::Error => error!(kind = ?self.kind, "{msg}"),
        }
        self.sink.log(level, msg);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
