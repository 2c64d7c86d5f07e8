//! Outbound domain events

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::types::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Trading,
    MarketData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum EventPayload {
    Order(OrderRecord),
    Trade(TradeRecord),
    Position(PositionRecord),
    Account(AccountRecord),
    Contract(ContractRecord),
    Tick(TickRecord),
    Log(LogRecord),
    Session {
        kind: SessionKind,
        state: SessionState,
        reason: String,
    },
}

/// Event tagged with the gateway it came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayEvent {
    pub gateway_name: String,
    pub payload: EventPayload,
}

impl GatewayEvent {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Non-blocking emitter shared by both sessions.
#[derive(Debug, Clone)]
pub struct EventSink {
    gateway_name: String,
    tx: flume::Sender<GatewayEvent>,
}

impl EventSink {
    pub fn new(gateway_name: impl Into<String>, tx: flume::Sender<GatewayEvent>) -> Self {
        Self {
            gateway_name: gateway_name.into(),
            tx,
        }
    }

    pub fn gateway_name(&self) -> &str {
        &self.gateway_name
    }

    pub fn emit(&self, payload: EventPayload) {
        let event = GatewayEvent {
            gateway_name: self.gateway_name.clone(),
            payload,
        };
        if self.tx.send(event).is_err() {
            debug!(gateway = %self.gateway_name, "event receiver dropped");
        }
    }

    pub fn log(&self, level: LogLevel, msg: impl Into<String>) {
        self.emit(EventPayload::Log(LogRecord {
            level,
            msg: msg.into(),
        }));
    }

    pub fn session(&self, kind: SessionKind, state: SessionState, reason: impl Into<String>) {
        self.emit(EventPayload::Session {
            kind,
            state,
            reason: reason.into(),
        });
    }
}
