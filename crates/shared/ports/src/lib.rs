//! Arka Ports
//!
//! Port definitions (traits) for the Arka pipeline.
//! These define the boundaries between domain logic and infrastructure.

mod contracts;
mod error;
mod snapshot;

pub use contracts::ContractRepository;
pub use error::{RepositoryError, StoreError};
pub use snapshot::SnapshotSource;
