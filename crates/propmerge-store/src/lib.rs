//! Collaborators around the consolidation engine: bulk read of the proposal
//! snapshot and persistence of the outcome.

mod error;
pub use error::StoreError;

pub mod layout;
pub use layout::{ChildTable, TableLayout, decode_row};

pub mod snapshot;
pub use snapshot::{read_outcome, read_snapshot, write_outcome};

#[cfg(feature = "duckdb")]
mod duck;
#[cfg(feature = "duckdb")]
pub use duck::{ApplySummary, DuckStore};
