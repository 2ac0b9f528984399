//! ClientDesk core: lead pipeline, lead → client conversion and recurring
//! plan (SIP) scheduling, over a pluggable record store.

pub mod activity;
pub mod conversion;
pub mod error;
mod migrations;
pub mod obligation;
pub mod pipeline;
pub mod schedule;
pub mod services;
pub mod state;
pub mod store;
pub mod types;

pub use error::{DeskError, ErrorPayload, ErrorType};
pub use state::DeskState;
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
