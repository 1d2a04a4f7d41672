//! Optimistic Mutation Module
//!
//! List mutations that show their effect immediately and revert if the
//! server rejects them.

mod list;
mod transaction;

pub use list::{Identified, OptimisticList};
pub use transaction::{MutationPhase, MutationTransaction};
