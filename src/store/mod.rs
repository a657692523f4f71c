//! Store Module
//!
//! Vector clocks, chunk logs and the in-memory replicated database.

pub mod clock;
pub mod chunk;
pub mod record;
mod database;
mod remote;

pub use clock::{Causality, VectorClock};
pub use chunk::Chunk;
pub use record::Record;
pub use database::Database;
pub use remote::RemoteClocks;
