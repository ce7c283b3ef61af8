//! History module for serverwatch.
//!
//! Keeps a bounded, in-memory player-count series per destination channel.

mod models;
mod store;

pub use models::*;
pub use store::*;
