//! Phase identity and plan slicing.
//!
//! Every phase in the global migration plan has a deterministic identity,
//! the [`PhaseIndex`]. The audit log records indexes, the planner emits
//! them in order, and resume points are expressed as [`PhaseSlice`] bounds
//! over their total order.
//!
//! ## Ordering
//!
//! Indexes sort by `(revision ascending, pre-deploy before post-deploy,
//! change ascending, phase ascending)`. The hashes identify the revision
//! contents but do not participate in the ordering; within one plan a
//! revision number always carries one hash pair.

use std::cmp::Ordering;
use std::fmt;

/// The deterministic identity of a phase within the global plan.
///
/// An index names one phase of one change of one revision, together with
/// the hashes of the revision that produced it. Audit rows store the full
/// index so that a resumed run can prove it is looking at the same plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseIndex {
    /// Revision number, 1-based.
    pub revision: i32,
    /// SHA-256 of the revision's migration file bytes.
    pub migration_hash: Vec<u8>,
    /// SHA-256 of the revision's schema file bytes.
    pub schema_hash: Vec<u8>,
    /// True for pre-deploy changes, false for post-deploy.
    pub pre_deploy: bool,
    /// Position of the change within its deploy list, 0-based.
    pub change: i32,
    /// Position of the phase within its change, 0-based.
    pub phase: i32,
}

impl PhaseIndex {
    /// The key realising the total order of §Ordering above.
    ///
    /// `!pre_deploy` makes pre-deploy sort before post-deploy.
    fn sort_key(&self) -> (i32, bool, i32, i32) {
        (self.revision, !self.pre_deploy, self.change, self.phase)
    }
}

impl Ord for PhaseIndex {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key()
            .cmp(&other.sort_key())
            .then_with(|| self.migration_hash.cmp(&other.migration_hash))
            .then_with(|| self.schema_hash.cmp(&other.schema_hash))
    }
}

impl PartialOrd for PhaseIndex {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PhaseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let deploy = if self.pre_deploy { "pre-deploy" } else { "post-deploy" };
        write!(f, "revision {} {} change {} phase {}", self.revision, deploy, self.change, self.phase)
    }
}

/// Half-open or closed interval over the phase order.
///
/// `None` bounds are unbounded. The driver derives slices from the audit
/// tail: "resume strictly after the last finished phase" is a slice with an
/// exclusive start at that phase's index.
#[derive(Debug, Clone, Default)]
pub struct PhaseSlice {
    pub start: Option<PhaseIndex>,
    pub start_inclusive: bool,
    pub end: Option<PhaseIndex>,
    pub end_inclusive: bool,
}

impl PhaseSlice {
    /// Whether `index` falls inside this slice.
    pub fn contains(&self, index: &PhaseIndex) -> bool {
        if let Some(start) = &self.start {
            match index.cmp(start) {
                Ordering::Less => return false,
                Ordering::Equal if !self.start_inclusive => return false,
                _ => {}
            }
        }
        if let Some(end) = &self.end {
            match index.cmp(end) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.end_inclusive => return false,
                _ => {}
            }
        }
        true
    }
}
