//! Error types for curvenn.

use thiserror::Error;

/// Errors that can occur while building or querying a curve index.
///
/// Every failure here is a configuration or programming defect rather than a
/// transient condition, so nothing is retried: the error is surfaced to the
/// caller as-is.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KnnError {
    /// The dataset has no objects.
    #[error("dataset is empty")]
    EmptyDataset,

    /// A curve mask was requested on an index built without curves.
    #[error("index has no curves, but the mask selects {requested} curve(s)")]
    NoCurves { requested: usize },

    /// The number of configured scale factors does not match the curve count.
    #[error("{scales} scale factor(s) configured for {curves} curve(s)")]
    ScaleCountMismatch { curves: usize, scales: usize },

    /// Invalid index configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The cached position of an object disagrees with the curve order.
    ///
    /// This means the position cache and the curve order drifted apart.
    #[error(
        "stale position cache: object {id} cached at {cached} on curve {curve}, \
         but the curve records {recorded:?} there"
    )]
    InconsistentPosition {
        curve: usize,
        id: u32,
        cached: usize,
        recorded: Option<u32>,
    },

    /// An identifier that is not part of the dataset.
    #[error("object {0} is not in the dataset")]
    UnknownObject(u32),

    /// A mask bit references a curve the index does not have.
    #[error("curve {curve} out of range (index has {curves} curve(s))")]
    CurveOutOfRange { curve: usize, curves: usize },

    /// Vector dimension does not match the dataset.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// A caller-supplied curve order is not a permutation of the dataset ids.
    #[error("not a permutation: {0}")]
    NotAPermutation(String),

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
}

impl KnnError {
    /// Whether the error belongs to the configuration class (reported at build time).
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            KnnError::EmptyDataset
                | KnnError::NoCurves { .. }
                | KnnError::ScaleCountMismatch { .. }
                | KnnError::InvalidConfig(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KnnError>;
