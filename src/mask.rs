//! Selection of curves contributing to a query.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

use crate::{KnnError, Result};

/// A set of curve indices, stored as a 64-bit mask.
///
/// Bit `c` set means curve `c` contributes its window to the candidate set.
/// The empty mask selects no curve and switches the index to random sampling.
///
/// ```rust
/// use curvenn::CurveMask;
///
/// let z = CurveMask::single(0);
/// let h = CurveMask::single(2);
/// let both = z | h;
/// assert_eq!(both.bits(), 0b101);
/// assert_eq!(both.iter().collect::<Vec<_>>(), vec![0, 2]);
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CurveMask(u64);

impl CurveMask {
    /// Largest number of curves a mask can address.
    pub const CAPACITY: usize = u64::BITS as usize;

    /// The empty mask (random-sampling mode).
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Mask from raw bits.
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Mask selecting exactly curve `curve`.
    ///
    /// # Panics
    ///
    /// If `curve >= CurveMask::CAPACITY`.
    pub const fn single(curve: usize) -> Self {
        assert!(curve < Self::CAPACITY, "curve index exceeds mask capacity");
        Self(1 << curve)
    }

    /// Mask selecting curves `0..count`.
    pub fn all(count: usize) -> Result<Self> {
        match count {
            c if c > Self::CAPACITY => Err(KnnError::InvalidParameter(format!(
                "a mask addresses at most {} curves, got {c}",
                Self::CAPACITY
            ))),
            Self::CAPACITY => Ok(Self(u64::MAX)),
            c => Ok(Self((1u64 << c) - 1)),
        }
    }

    /// Mask with curve `curve` added.
    pub fn with(self, curve: usize) -> Result<Self> {
        if curve >= Self::CAPACITY {
            return Err(KnnError::CurveOutOfRange {
                curve,
                curves: Self::CAPACITY,
            });
        }
        Ok(Self(self.0 | (1 << curve)))
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, curve: usize) -> bool {
        curve < Self::CAPACITY && self.0 & (1 << curve) != 0
    }

    /// Number of selected curves.
    pub const fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    /// Highest selected curve index, if any.
    pub fn max_curve(self) -> Option<usize> {
        (!self.is_empty()).then(|| (u64::BITS - 1 - self.0.leading_zeros()) as usize)
    }

    /// Whether every selected curve exists on an index with `curves` curves.
    pub fn fits(self, curves: usize) -> bool {
        self.max_curve().map_or(true, |c| c < curves)
    }

    /// Selected curve indices, ascending.
    pub fn iter(self) -> CurveIter {
        CurveIter(self.0)
    }
}

impl fmt::Debug for CurveMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl BitOr for CurveMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CurveMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for CurveMask {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl FromIterator<usize> for CurveMask {
    /// Collect curve indices into a mask. Indices past the capacity are dropped.
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        iter.into_iter()
            .filter(|&c| c < Self::CAPACITY)
            .fold(Self::empty(), |m, c| Self(m.0 | (1 << c)))
    }
}

impl IntoIterator for CurveMask {
    type Item = usize;
    type IntoIter = CurveIter;

    fn into_iter(self) -> CurveIter {
        self.iter()
    }
}

/// Iterator over the curve indices of a [`CurveMask`].
#[derive(Debug, Clone)]
pub struct CurveIter(u64);

impl Iterator for CurveIter {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.0 == 0 {
            return None;
        }
        let c = self.0.trailing_zeros() as usize;
        self.0 &= self.0 - 1;
        Some(c)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = self.0.count_ones() as usize;
        (n, Some(n))
    }
}

impl ExactSizeIterator for CurveIter {}
