//! Table cleaning stages.
//!
//! This module provides functionality for:
//! - Coercing raw string columns to their declared roles
//! - Resolving duplicate records
//! - Applying the category-conditioned null policy
//! - Pruning low-information columns and normalizing column names

mod converters;

pub mod coercion;
pub mod dedupe;
pub mod partition;
pub mod pruner;

pub use coercion::{CoercedColumn, TypeCoercer};
pub use converters::TEXT_SENTINEL;
pub use dedupe::Deduplicator;
pub use partition::{PartitionDecision, PartitionNullPolicy, PartitionReport};
pub use pruner::{ColumnPruner, PruneReason, PrunedColumn, normalize_name};
