//! CampusGraph Graph Store
//!
//! The keyframe graph is held twice:
//!
//! ```text
//! ┌──────────────────────┐   copy_dense_to_refined   ┌──────────────────────┐
//! │  Dense (original)    │ ────────────────────────► │  Refined (working)   │
//! │  nodes/edges/locs    │                           │  nodes/edges/locs    │
//! └──────────────────────┘                           └──────────┬───────────┘
//!                                                               │ apply(batch)
//!                                                               ▼
//!                                                     ┌──────────────────────┐
//!                                                     │  Mutation journal    │
//!                                                     │  (append-only)       │
//!                                                     └──────────────────────┘
//! ```
//!
//! ## Key Features
//!
//! - **Table-parameterized**: every call names a [`GraphTable`] instead of
//!   switching table names by string prefix
//! - **Atomic batches**: a [`MutationBatch`] is applied completely or not at all
//! - **Recoverable**: committed batches can be journaled and replayed on open

pub mod journal;
pub mod memory;
pub mod snapshot;
pub mod store;


pub use journal::{JournalEntry, MutationJournal, MAX_RECORD_LEN};
pub use memory::MemoryGraphStore;
pub use snapshot::GraphSnapshot;
pub use store::{GraphStore, GraphTable, Mutation, MutationBatch, Region, StoreResult};
