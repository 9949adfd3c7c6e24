//! Domain models for the consultation engine.

mod billing;
mod catalog;
mod encounter;
mod orders;
mod patient;
mod stock;

pub use billing::*;
pub use catalog::*;
pub use encounter::*;
pub use orders::*;
pub use patient::*;
pub use stock::*;
