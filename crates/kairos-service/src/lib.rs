//! The occurrence engine: recurrence materialization, availability expansion, subscription
//! propagation and participation.

pub mod availability;
pub mod clock;
pub mod context;
pub mod error;
pub mod identity;
pub mod ledger;
pub mod notify;
pub mod occurrence;
pub mod participation;
pub mod pass;
pub mod propagation;
pub mod recurrence;
pub mod subscription;

#[cfg(test)]
mod testing;
