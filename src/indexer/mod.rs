pub mod block;
pub mod contract;
pub mod decoder;
pub mod event;
pub mod ledger;
pub mod sync;
pub mod transaction;

pub use ledger::{Maintenance, TokenLedger};
pub use sync::{SyncOrchestrator, SyncState};
