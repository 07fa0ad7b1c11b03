pub mod cost;
pub mod fibonacci;
pub mod indicators;
pub mod pipeline;
pub mod scorer;
pub mod smc;
