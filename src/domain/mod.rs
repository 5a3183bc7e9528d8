//! Domain layer types and invariants.

pub mod error;
pub mod events;
pub mod key;
pub mod parameters;
pub mod validity;
