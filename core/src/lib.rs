//! recovery-core: statutory dues recovery ledger.
//!
//! Cases carry demand across sixteen sub-accounts in three statutory
//! sections. Recovery transactions are split over those sub-accounts and
//! every derived figure is rebuilt from the full live transaction set.

pub mod allocation;
pub mod command;
pub mod config;
pub mod desk;
pub mod error;
pub mod establishment;
pub mod event;
pub mod ledger;
pub mod reconciliation;
pub mod schema;
pub mod store;
pub mod types;

pub use desk::RecoveryDesk;
pub use error::{DeskError, DeskResult};
