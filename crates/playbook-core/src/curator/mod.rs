//! Curation: turning reflection insights into delta updates.
//!
//! The flow for one insight is
//! 1. [`Curator::screen`] the insight,
//! 2. [`Curator::decide`] against its nearest bullets,
//! 3. [`Curator::build_delta`] once embeddings are available,
//! 4. [`apply_delta`] under the playbook write lock.

mod apply;
mod delta;
mod merge;
mod policy;

pub use apply::{ApplyOutcome, DeltaHistory, apply_delta};
pub use delta::{AppliedDeltaRecord, DeltaId, DeltaOperation, DeltaUpdate, RevisedContent};
pub use merge::merge_content;
pub use policy::{CurationDecision, Curator, RejectionReason};
