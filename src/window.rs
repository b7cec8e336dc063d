//! Boundary-aware candidate windows on one curve.
//!
//! A window is the inclusive range of curve positions around the query whose
//! objects become candidates. Near either end of the curve the window is
//! shifted inward instead of truncated, so it always spans `2h + 1` positions:
//!
//! ```text
//! N = 10, h = 2
//!
//! p = 1   [0 1 2 3 4] 5 6 7 8 9      clamped at the start
//! p = 5    0 1 2 [3 4 5 6 7] 8 9     symmetric
//! p = 8    0 1 2 3 4 [5 6 7 8 9]     clamped at the end
//! ```
//!
//! When `2h + 1 >= N` the window is the whole curve, reported as
//! [`WindowKind::WholeCurve`] rather than silently truncated.
//!
//! ## Nesting
//!
//! For a fixed position, the window for `h + 1` contains the window for `h`,
//! including when the larger window starts being clamped: a clamped window
//! only appears once `p <= h + 1` (or `p + h + 1 >= N`), and then it covers
//! `[p - h, p + h]` anyway.

use std::ops::RangeInclusive;

use crate::{KnnError, Result};

/// How a window was placed relative to the curve bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WindowKind {
    /// `[p - h, p + h]`.
    Symmetric,
    /// `[0, 2h]`, the query is within `h` of the start.
    ClampedStart,
    /// `[N - 2h - 1, N - 1]`, the query is within `h` of the end.
    ClampedEnd,
    /// `[0, N - 1]`, since `2h + 1 >= N`.
    WholeCurve,
}

/// Inclusive position range `[start, end]` on one curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CandidateWindow {
    start: usize,
    end: usize,
    kind: WindowKind,
}

impl CandidateWindow {
    /// Window of half-width `half_width` around `position` on a curve of `len` objects.
    pub fn compute(len: usize, position: usize, half_width: usize) -> Result<Self> {
        if len == 0 {
            return Err(KnnError::InvalidParameter(
                "cannot place a window on an empty curve".to_string(),
            ));
        }
        if position >= len {
            return Err(KnnError::InvalidParameter(format!(
                "position {position} outside curve of length {len}"
            )));
        }

        // 2h + 1 >= len, without overflowing for huge h.
        let (start, end, kind) = if half_width >= len / 2 {
            (0, len - 1, WindowKind::WholeCurve)
        } else if position <= half_width {
            (0, 2 * half_width, WindowKind::ClampedStart)
        } else if position + half_width >= len {
            (len - 2 * half_width - 1, len - 1, WindowKind::ClampedEnd)
        } else {
            (
                position - half_width,
                position + half_width,
                WindowKind::Symmetric,
            )
        };

        Ok(Self { start, end, kind })
    }

    pub fn start(&self) -> usize {
        self.start
    }

    /// Last position, inclusive.
    pub fn end(&self) -> usize {
        self.end
    }

    pub fn kind(&self) -> WindowKind {
        self.kind
    }

    pub fn is_whole_curve(&self) -> bool {
        self.kind == WindowKind::WholeCurve
    }

    /// Number of positions covered.
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// Always false: a window covers at least the query position.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn range(&self) -> RangeInclusive<usize> {
        self.start..=self.end
    }

    pub fn contains(&self, position: usize) -> bool {
        self.range().contains(&position)
    }
}
