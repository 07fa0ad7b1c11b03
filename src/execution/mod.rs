pub mod instrument_registry;
pub mod legacy;
pub mod order_monitor;
pub mod order_placement;
pub mod price_converter;
pub mod protective_orders;
pub mod reconciliation;
pub mod simulated;
pub mod sizing_helpers;
pub mod state_machine;
