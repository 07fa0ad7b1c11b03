//! ManagedPosition — the authoritative local record of a futures position, and the
//! follow-up actions the state machine emits (spec.md §3, §4.5.6).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::Side;
use crate::domain::signal::{Regime, SetupType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Pending,
    Open,
    Protected,
    Partial,
    Closed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FillRecord {
    pub order_id: String,
    pub price: Decimal,
    pub size: Decimal,
    pub at: DateTime<Utc>,
}

/// The authoritative local record keyed by futures symbol (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagedPosition {
    pub symbol: String,
    pub side: Side,
    pub initial_size: Decimal,
    pub initial_entry_price: Decimal,

    // Immutable once set (I1).
    pub initial_stop_price: Option<Decimal>,
    pub initial_tp1_price: Option<Decimal>,
    pub initial_tp2_price: Option<Decimal>,
    pub final_target_price: Option<Decimal>,

    // Snapshot quantities, frozen exactly once from the first entry fills (I3).
    pub entry_size_initial: Option<Decimal>,
    pub tp1_qty_target: Option<Decimal>,
    pub tp2_qty_target: Option<Decimal>,

    pub entry_fills: Vec<FillRecord>,
    pub exit_fills: Vec<FillRecord>,

    pub stop_order_id: Option<String>,
    pub tp_order_ids: Vec<String>,

    pub state: PositionState,

    pub entry_acknowledged: bool,
    pub tp1_filled: bool,
    pub tp2_filled: bool,
    pub trailing_active: bool,
    pub break_even_active: bool,

    pub cluster: String,
    pub regime: Option<Regime>,
    pub setup_type: Option<SetupType>,
    pub entry_score: Decimal,
    pub opened_at: DateTime<Utc>,
    pub is_protected: bool,
    pub protection_reason: Option<String>,

    /// Favorable-side price extreme seen since entry, used by the trailing stop
    /// (spec.md §4.5.6 "Mark-price tick"). Long tracks the peak, short the valley.
    pub favorable_extreme: Option<Decimal>,
}

impl ManagedPosition {
    pub fn pending(
        symbol: impl Into<String>,
        side: Side,
        size: Decimal,
        entry_price: Decimal,
        regime: Option<Regime>,
        setup_type: Option<SetupType>,
        entry_score: Decimal,
        opened_at: DateTime<Utc>,
    ) -> Self {
        let cluster = match (regime, setup_type) {
            (Some(r), Some(s)) => format!("{r:?}_{s:?}"),
            _ => "unclassified".to_string(),
        };
        Self {
            symbol: symbol.into(),
            side,
            initial_size: size,
            initial_entry_price: entry_price,
            initial_stop_price: None,
            initial_tp1_price: None,
            initial_tp2_price: None,
            final_target_price: None,
            entry_size_initial: None,
            tp1_qty_target: None,
            tp2_qty_target: None,
            entry_fills: Vec::new(),
            exit_fills: Vec::new(),
            stop_order_id: None,
            tp_order_ids: Vec::new(),
            state: PositionState::Pending,
            entry_acknowledged: false,
            tp1_filled: false,
            tp2_filled: false,
            trailing_active: false,
            break_even_active: false,
            cluster,
            regime,
            setup_type,
            entry_score,
            opened_at,
            is_protected: false,
            protection_reason: None,
            favorable_extreme: None,
        }
    }

    /// Updates the favorable-side extreme; returns `true` if it moved.
    pub fn update_favorable_extreme(&mut self, mark_price: Decimal) -> bool {
        let improved = match (self.favorable_extreme, self.side) {
            (None, _) => true,
            (Some(extreme), Side::Buy) => mark_price > extreme,
            (Some(extreme), Side::Sell) => mark_price < extreme,
        };
        if improved {
            self.favorable_extreme = Some(mark_price);
        }
        improved
    }

    /// Remaining open size: initial minus everything exited so far.
    pub fn remaining_size(&self) -> Decimal {
        let exited: Decimal = self.exit_fills.iter().map(|f| f.size).sum();
        (self.initial_size - exited).max(Decimal::ZERO)
    }

    /// I1: stop is strictly on the losing side of entry for this position's side.
    pub fn stop_is_on_losing_side(&self) -> bool {
        match (self.initial_stop_price, self.side) {
            (Some(stop), Side::Buy) => stop < self.initial_entry_price,
            (Some(stop), Side::Sell) => stop > self.initial_entry_price,
            (None, _) => false,
        }
    }

    /// I3: freeze snapshot targets exactly once, from the first entry fill(s).
    pub fn freeze_snapshot_targets_if_needed(
        &mut self,
        tp1_split_pct: Decimal,
        tp2_split_pct: Decimal,
    ) {
        if self.entry_size_initial.is_some() {
            return;
        }
        let total: Decimal = self.entry_fills.iter().map(|f| f.size).sum();
        if total <= Decimal::ZERO {
            return;
        }
        self.entry_size_initial = Some(total);
        self.tp1_qty_target = Some(total * tp1_split_pct);
        self.tp2_qty_target = Some(total * tp2_split_pct);
    }

    pub fn record_entry_fill(&mut self, fill: FillRecord) {
        self.entry_fills.push(fill);
        self.entry_acknowledged = true;
    }

    pub fn record_exit_fill(&mut self, fill: FillRecord) {
        self.exit_fills.push(fill);
    }

    pub fn mark_unprotected(&mut self, reason: impl Into<String>) {
        self.is_protected = false;
        self.protection_reason = Some(reason.into());
    }

    pub fn mark_protected(&mut self) {
        self.is_protected = true;
        self.protection_reason = None;
        if self.state == PositionState::Open {
            self.state = PositionState::Protected;
        }
    }

    /// I4: stops may only move monotonically toward profit.
    pub fn can_tighten_stop_to(&self, candidate: Decimal) -> bool {
        let Some(current) = self.initial_stop_price else {
            return true;
        };
        match self.side {
            Side::Buy => candidate > current,
            Side::Sell => candidate < current,
        }
    }
}

/// Actions the state machine asks the caller to execute, in emission order, within
/// the same cycle (spec.md §4.5.6 "Follow-up emission contract").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ManagementAction {
    PlaceStop { symbol: String, price: Decimal },
    PlaceTp1 { symbol: String, price: Decimal, qty: Decimal },
    PlaceTp2 { symbol: String, price: Decimal, qty: Decimal },
    PlaceTp3 { symbol: String, price: Decimal, qty: Decimal },
    UpdateStop { symbol: String, price: Decimal },
    ActivateTrailing { symbol: String },
    ClosePosition { symbol: String, reason: String },
    MarkUnprotected { symbol: String, reason: String },
}
