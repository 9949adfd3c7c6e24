//! Billing export for completed encounters.

mod billing;

pub use billing::*;
