//! Recurring series: the next-slot clock, materialization of the next occurrence and group
//! lifecycle.

pub mod materializer;
pub mod next_slot;
pub mod service;

pub use materializer::{AdvanceOutcome, IdleReason, RecurrenceMaterializer};
pub use next_slot::{NextSlot, SlotMatch, next_slot};
pub use service::RecurrenceService;
