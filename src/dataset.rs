//! Read-only vector storage for the index.
//!
//! Objects are identified by their dense row index (`0..len`). Vectors are
//! stored row-major in one flat buffer.

use crate::{KnnError, Result};

/// An ordered collection of fixed-dimension vectors.
///
/// Built once, then only read by the index.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    vectors: Vec<f32>,
    dimension: usize,
    len: usize,
}

impl Dataset {
    /// Create an empty dataset of the given dimension.
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(KnnError::InvalidParameter(
                "dimension must be greater than 0".to_string(),
            ));
        }
        Ok(Self {
            vectors: Vec::new(),
            dimension,
            len: 0,
        })
    }

    /// Create an empty dataset with room for `capacity` vectors.
    pub fn with_capacity(dimension: usize, capacity: usize) -> Result<Self> {
        let mut dataset = Self::new(dimension)?;
        dataset.vectors.reserve(capacity * dimension);
        Ok(dataset)
    }

    /// Build a dataset from rows. All rows must have the same, non-zero length.
    pub fn from_rows<R: AsRef<[f32]>>(rows: &[R]) -> Result<Self> {
        let first = rows.first().ok_or(KnnError::EmptyDataset)?;
        let mut dataset = Self::with_capacity(first.as_ref().len(), rows.len())?;
        for row in rows {
            dataset.add(row.as_ref())?;
        }
        Ok(dataset)
    }

    /// Append a vector, returning its identifier.
    pub fn add(&mut self, vector: &[f32]) -> Result<u32> {
        if vector.len() != self.dimension {
            return Err(KnnError::DimensionMismatch {
                expected: self.dimension,
                got: vector.len(),
            });
        }
        let id = u32::try_from(self.len).map_err(|_| {
            KnnError::InvalidParameter("dataset exceeds u32::MAX objects".to_string())
        })?;
        self.vectors.extend_from_slice(vector);
        self.len += 1;
        Ok(id)
    }

    /// Vector of object `id`, if present.
    #[inline]
    pub fn get(&self, id: u32) -> Option<&[f32]> {
        let idx = id as usize;
        if idx >= self.len {
            return None;
        }
        let start = idx * self.dimension;
        Some(&self.vectors[start..start + self.dimension])
    }

    /// Vector of object `id`; an unknown id is an error.
    #[inline]
    pub fn vector(&self, id: u32) -> Result<&[f32]> {
        self.get(id).ok_or(KnnError::UnknownObject(id))
    }

    /// Whether `id` names an object of this dataset.
    #[inline]
    pub fn contains(&self, id: u32) -> bool {
        (id as usize) < self.len
    }

    /// Iterate `(id, vector)` pairs in identifier order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (u32, &[f32])> + '_ {
        self.vectors
            .chunks_exact(self.dimension)
            .enumerate()
            .map(|(i, v)| (i as u32, v))
    }

    /// All identifiers, in order.
    pub fn ids(&self) -> std::ops::Range<u32> {
        0..self.len as u32
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}
