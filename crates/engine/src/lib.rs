pub mod engine;
pub mod ledger;

pub use engine::PaperTradingEngine;
pub use ledger::{EntryBooking, ExitBooking, Ledger, LedgerError};
