//! Race several lookups of the same key and keep the first success.
//!
//! A [`Race`] spawns one task per registered [`Lookup`], waits for the first
//! successful record or the deadline, and then fires a shared
//! [`cancel::Signal`] so every outstanding lookup abandons its request.

pub mod cancel;
pub mod lookup;
pub mod race;
mod task;

pub use lookup::Lookup;
pub use race::{FailurePolicy, Race, Winner};
