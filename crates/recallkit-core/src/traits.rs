//! Core trait definitions for transition measures.
//!
//! A measure compares the previous recall with one candidate item. The
//! engine in [`crate::engine`] is written once against these traits; lag,
//! category, distance, and pair analyses only differ in the comparison.

use std::fmt;

use crate::model::TrialRecord;

// ---------------------------------------------------------------------------
// Bucketed measures
// ---------------------------------------------------------------------------

/// Maps a (previous, candidate) pair to a discrete bucket.
pub trait BucketMeasure: Send + Sync {
    /// Bucket label, e.g. a lag or a distance bin index.
    type Bucket: Ord + Clone + Send + Sync + fmt::Debug;

    /// Bucket of the transition from `prev` to `candidate`, or `None` when
    /// the comparison is undefined (missing values, distance outside every
    /// bin).
    fn bucket(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<Self::Bucket>;

    /// Buckets reported in results, in order.
    fn domain(&self) -> Vec<Self::Bucket>;

    /// Whether possible buckets are counted once per transition.
    fn count_unique(&self, requested: bool) -> bool {
        requested
    }
}

// ---------------------------------------------------------------------------
// Rank measures
// ---------------------------------------------------------------------------

/// Maps a (previous, candidate) pair to a distance; smaller is closer.
pub trait DistanceMeasure: Send + Sync {
    fn distance(&self, prev: &TrialRecord, candidate: &TrialRecord) -> Option<f64>;
}
