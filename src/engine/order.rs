//! Order store - one record per local id, reconciled in place as acks arrive

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

use crate::core::error::ProtocolAnomaly;
use crate::core::types::{LocalId, OrderRecord, Status};

/// Result of merging an acknowledgment into the store
#[derive(Debug, Clone)]
pub struct AckOutcome {
    /// Record after the merge, ready to emit
    pub record: OrderRecord,
    /// Parts of the ack that were not applied
    pub anomalies: Vec<ProtocolAnomaly>,
    /// The ack introduced an order this session never submitted
    pub adopted: bool,
}

fn progress(status: Status) -> u8 {
    match status {
        Status::Submitting => 0,
        Status::PartTraded => 1,
        Status::AllTraded | Status::Cancelled | Status::Rejected => 2,
    }
}

/// Order store - append-only source of truth for order state
#[derive(Debug, Default)]
pub struct OrderStore {
    orders: RwLock<HashMap<LocalId, OrderRecord>>,
}

impl OrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: OrderRecord) {
        self.orders.write().insert(record.local_id, record);
    }

    /// Get order by local id
    pub fn get(&self, local_id: LocalId) -> Option<OrderRecord> {
        self.orders.read().get(&local_id).cloned()
    }

    /// Get all orders
    pub fn get_all_orders(&self) -> Vec<OrderRecord> {
        let mut orders: Vec<_> = self.orders.read().values().cloned().collect();
        orders.sort_by_key(|o| o.local_id);
        orders
    }

    /// Get orders still working at the venue
    pub fn get_active_orders(&self) -> Vec<OrderRecord> {
        self.get_all_orders().into_iter().filter(|o| o.is_active()).collect()
    }

    /// Local outcome for an order the vendor refused to take.
    pub fn mark_rejected(&self, local_id: LocalId) -> Option<OrderRecord> {
        let mut orders = self.orders.write();
        let order = orders.get_mut(&local_id)?;
        if order.is_active() {
            order.status = Status::Rejected;
            order.updated_at = Utc::now();
        }
        Some(order.clone())
    }

    /// Merge a decoded acknowledgment. Traded volume never decreases and a
    /// terminal status is never left; violations are reported, not applied.
    pub fn apply_ack(&self, update: OrderRecord) -> AckOutcome {
        let mut orders = self.orders.write();

        let Some(current) = orders.get_mut(&update.local_id) else {
            debug!(local_id = %update.local_id, "adopting order from venue");
            orders.insert(update.local_id, update.clone());
            return AckOutcome {
                record: update,
                anomalies: Vec::new(),
                adopted: true,
            };
        };

        let mut anomalies = Vec::new();

        if update.traded < current.traded {
            anomalies.push(ProtocolAnomaly::TradedVolumeRegression {
                local_id: current.local_id,
                previous: current.traded,
                reported: update.traded,
            });
        } else {
            current.traded = update.traded;
        }

        let (old, new) = (progress(current.status), progress(update.status));
        if new >= old && !(old == 2 && update.status != current.status) {
            current.status = update.status;
        } else if old == 2 {
            anomalies.push(ProtocolAnomaly::StatusRegression {
                local_id: current.local_id,
                previous: current.status,
                reported: update.status,
            });
        }
        // part-traded -> pending-cancel keeps part-traded

        if current.system_id.is_none() {
            current.system_id = update.system_id;
        }
        if update.updated_at > current.updated_at {
            current.updated_at = update.updated_at;
        }

        AckOutcome {
            record: current.clone(),
            anomalies,
            adopted: false,
        }
    }

    pub fn len(&self) -> usize {
        self.orders.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
