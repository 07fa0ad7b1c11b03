//! Append-only audit record, never read back by control logic (spec.md §3, §4.7).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TraceKind {
    SignalGenerated,
    SignalRejected,
    RiskValidation,
    AuctionResult,
    OrderEvent,
    Reconciliation,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trace {
    pub timestamp: DateTime<Utc>,
    pub decision_id: Uuid,
    pub symbol: String,
    pub kind: TraceKind,
    pub payload: serde_json::Value,
}

impl Trace {
    pub fn new(
        timestamp: DateTime<Utc>,
        decision_id: Uuid,
        symbol: impl Into<String>,
        kind: TraceKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            timestamp,
            decision_id,
            symbol: symbol.into(),
            kind,
            payload,
        }
    }
}

/// Validation metrics every rejection trace should carry, per spec.md §7's replay seed.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub position_notional: Option<rust_decimal::Decimal>,
    pub leverage: Option<rust_decimal::Decimal>,
    pub stop_distance_pct: Option<rust_decimal::Decimal>,
    pub rr_distortion: Option<rust_decimal::Decimal>,
    pub liquidation_buffer_pct: Option<rust_decimal::Decimal>,
    pub basis_divergence_pct: Option<rust_decimal::Decimal>,
    pub strictness_tier: Option<u8>,
}
