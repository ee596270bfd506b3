//! Run orchestration and finalization.
//!
//! This module drives every archive through the normalizer and accumulator,
//! then turns the running aggregates into the dashboard document consumed
//! by the report renderer.

pub mod aggregate;
pub mod analyzer;
pub mod types;
pub mod utility;
