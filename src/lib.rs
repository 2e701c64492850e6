pub mod account;
pub mod commands;
pub mod configure;
pub mod errors;
pub mod id_gen;
pub mod ledger;
pub mod logger;
pub mod settlement;
pub mod spin;
pub mod store;

pub use account::{Account, AccountMap, UserId};
pub use errors::{LedgerError, LedgerResult};
