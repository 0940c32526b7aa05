// ============================================================================
// Interfaces Module
// Traits the host ledger implements to observe and settle engine activity
// ============================================================================

pub mod event_handler;
pub mod ledger;

pub use event_handler::{
    CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, SwapEvent,
};
pub use ledger::{
    AccountLedger, InvariantChecker, MemoryLedger, NoOpChecker, NoOpLedger, SummingChecker,
};
