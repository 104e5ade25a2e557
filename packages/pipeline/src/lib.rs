#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Filter and sort stages applied to the cached incident collection of
//! the active query.
//!
//! Both stages are pure: they borrow the cached incidents and return new
//! vectors of references, leaving the cache untouched. Filtering keeps the
//! fetch order; sorting is a separate, stable stage run afterwards.

pub mod filter;
pub mod sort;

pub use filter::{FilterCriteria, LengthBucket, filter};
pub use sort::{SortKey, sort, sort_by_name};

use crashlens_incident_models::Incident;

/// Runs filter then sort, producing the presentation-ready list.
#[must_use]
pub fn apply<'a>(
    incidents: &'a [Incident],
    criteria: &FilterCriteria,
    key: SortKey,
) -> Vec<&'a Incident> {
    sort(filter(incidents, criteria), key)
}
