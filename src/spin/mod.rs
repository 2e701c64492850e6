//! Spin game: payout table and the paid spin operation

pub mod payout;
pub mod service;

pub use payout::PayoutTable;
pub use service::{SpinOutcome, SpinService};
