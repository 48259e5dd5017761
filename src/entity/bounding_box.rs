//! N-dimensional bounding boxes.
//!
//! A box is stored as `[low_0, extent_0, low_1, extent_1, ...]`. Two
//! sentinels exist: the empty box and the full-covering box. Both overlap
//! every other box.
//!
//! ## Encoding
//!
//! ```text
//! Empty:   (zero bytes)
//! Full:    [0xFF]
//! Bounded: [low_0: f64 BE][extent_0: f64 BE]...
//! ```

use crate::error::{Error, Result};
use bytes::{Buf, BufMut};
use std::cmp::Ordering;
use std::fmt;

const FULL_BOX_MARKER: u8 = 0xFF;

#[derive(Debug, Clone, PartialEq)]
enum Repr {
    Empty,
    Full,
    Bounded { values: Vec<f64>, valid: bool },
}

/// An immutable axis-aligned N-dimensional interval.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    repr: Repr,
}

impl BoundingBox {
    /// The empty box. Used by tuples without spatial extent; overlaps everything.
    pub const EMPTY: BoundingBox = BoundingBox { repr: Repr::Empty };

    /// The full-covering box; overlaps everything.
    pub const FULL: BoundingBox = BoundingBox { repr: Repr::Full };

    /// Creates a box from `[low_0, extent_0, low_1, extent_1, ...]`.
    ///
    /// An odd number of values or a negative extent produces an invalid box.
    /// No values produce [`BoundingBox::EMPTY`].
    pub fn new(values: Vec<f64>) -> Self {
        if values.is_empty() {
            return Self::EMPTY;
        }

        let valid = Self::check_valid(&values);
        if !valid {
            log::warn!("Found invalid bounding box: {:?}", values);
        }

        Self { repr: Repr::Bounded { values, valid } }
    }

    /// Creates a box from closed `(low, high)` intervals, one per dimension.
    ///
    /// ```
    /// use boxstore::BoundingBox;
    ///
    /// let unit = BoundingBox::from_intervals(&[(0.0, 1.0), (0.0, 1.0)]);
    /// assert_eq!(unit.dimension(), Some(2));
    /// assert_eq!(unit.high(1), 1.0);
    /// ```
    pub fn from_intervals(intervals: &[(f64, f64)]) -> Self {
        let values =
            intervals.iter().flat_map(|&(low, high)| [low, high - low]).collect::<Vec<_>>();
        Self::new(values)
    }

    fn check_valid(values: &[f64]) -> bool {
        if values.len() % 2 != 0 {
            return false;
        }

        values.chunks_exact(2).all(|pair| pair[0].is_finite() && pair[1] >= 0.0)
    }

    /// Returns `false` for boxes with an odd number of values or negative extents.
    pub fn is_valid(&self) -> bool {
        match &self.repr {
            Repr::Empty | Repr::Full => true,
            Repr::Bounded { valid, .. } => *valid,
        }
    }

    /// Is this the empty sentinel?
    pub fn is_empty(&self) -> bool {
        matches!(self.repr, Repr::Empty)
    }

    /// Is this the full-covering sentinel?
    pub fn is_full(&self) -> bool {
        matches!(self.repr, Repr::Full)
    }

    /// Number of dimensions; `Some(0)` for the sentinels, `None` for invalid boxes.
    pub fn dimension(&self) -> Option<usize> {
        match &self.repr {
            Repr::Empty | Repr::Full => Some(0),
            Repr::Bounded { values, valid: true } => Some(values.len() / 2),
            Repr::Bounded { valid: false, .. } => None,
        }
    }

    fn values(&self) -> &[f64] {
        match &self.repr {
            Repr::Bounded { values, .. } => values,
            _ => &[],
        }
    }

    /// Lowest coordinate in `dimension`.
    ///
    /// # Panics
    ///
    /// Panics if `dimension` is out of range.
    pub fn low(&self, dimension: usize) -> f64 {
        self.values()[2 * dimension]
    }

    /// Extent in `dimension`.
    pub fn extent(&self, dimension: usize) -> f64 {
        self.values()[2 * dimension + 1]
    }

    /// Highest coordinate in `dimension`.
    pub fn high(&self, dimension: usize) -> f64 {
        self.low(dimension) + self.extent(dimension)
    }

    /// Does the box cover `point` in `dimension`?
    pub fn is_covering_point(&self, point: f64, dimension: usize) -> bool {
        self.low(dimension) <= point && self.high(dimension) >= point
    }

    /// Tests whether two boxes share some space.
    ///
    /// The sentinels overlap everything. Invalid boxes and boxes of different
    /// dimensionality never overlap.
    pub fn overlaps(&self, other: &BoundingBox) -> bool {
        if self.is_wildcard() || other.is_wildcard() {
            return true;
        }

        let dimension = match (self.dimension(), other.dimension()) {
            (Some(a), Some(b)) if a == b => a,
            _ => return false,
        };

        (0..dimension).all(|d| self.low(d) <= other.high(d) && other.low(d) <= self.high(d))
    }

    fn is_wildcard(&self) -> bool {
        matches!(self.repr, Repr::Empty | Repr::Full)
    }

    /// The smallest box covering all given boxes.
    ///
    /// The empty box is ignored and the full box dominates. Returns `None` for
    /// no input, invalid input or mismatched dimensions.
    pub fn covering<'a, I>(boxes: I) -> Option<BoundingBox>
    where
        I: IntoIterator<Item = &'a BoundingBox>,
    {
        let mut result: Option<Vec<(f64, f64)>> = None;
        let mut saw_empty = false;

        for bbox in boxes {
            match &bbox.repr {
                Repr::Empty => saw_empty = true,
                Repr::Full => return Some(Self::FULL),
                Repr::Bounded { valid: false, .. } => return None,
                Repr::Bounded { values, valid: true } => {
                    let intervals: Vec<(f64, f64)> =
                        values.chunks_exact(2).map(|p| (p[0], p[0] + p[1])).collect();

                    result = match result {
                        None => Some(intervals),
                        Some(current) => {
                            if current.len() != intervals.len() {
                                log::warn!("Merging bounding boxes with different dimensions");
                                return None;
                            }
                            Some(
                                current
                                    .iter()
                                    .zip(intervals.iter())
                                    .map(|(a, b)| (a.0.min(b.0), a.1.max(b.1)))
                                    .collect(),
                            )
                        }
                    };
                }
            }
        }

        match result {
            Some(intervals) => Some(Self::from_intervals(&intervals)),
            None if saw_empty => Some(Self::EMPTY),
            None => None,
        }
    }

    /// Orders boxes by dimension, then by the low coordinate of each dimension.
    pub fn compare(&self, other: &BoundingBox) -> Ordering {
        let own = self.dimension().map_or(-1, |d| d as i64);
        let theirs = other.dimension().map_or(-1, |d| d as i64);

        own.cmp(&theirs).then_with(|| {
            let dimension = self.dimension().unwrap_or(0);
            (0..dimension)
                .map(|d| self.low(d).total_cmp(&other.low(d)))
                .find(|ordering| *ordering != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        })
    }

    /// Product of all extents; 0 for the sentinels and invalid boxes.
    pub fn volume(&self) -> f64 {
        match self.dimension() {
            Some(d) if d > 0 => (0..d).map(|i| self.extent(i)).product(),
            _ => 0.0,
        }
    }

    /// Serializes the box.
    pub fn to_bytes(&self) -> Vec<u8> {
        match &self.repr {
            Repr::Empty => Vec::new(),
            Repr::Full => vec![FULL_BOX_MARKER],
            Repr::Bounded { values, .. } => {
                let mut buf = Vec::with_capacity(values.len() * 8);
                for value in values {
                    buf.put_f64(*value);
                }
                buf
            }
        }
    }

    /// Number of bytes [`to_bytes`](Self::to_bytes) produces.
    pub fn encoded_len(&self) -> usize {
        match &self.repr {
            Repr::Empty => 0,
            Repr::Full => 1,
            Repr::Bounded { values, .. } => values.len() * 8,
        }
    }

    /// Deserializes a box written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(mut data: &[u8]) -> Result<Self> {
        if data.is_empty() {
            return Ok(Self::EMPTY);
        }

        if data == [FULL_BOX_MARKER] {
            return Ok(Self::FULL);
        }

        if data.len() % 8 != 0 {
            return Err(Error::corruption(format!(
                "Bounding box length {} is not a multiple of 8",
                data.len()
            )));
        }

        let mut values = Vec::with_capacity(data.len() / 8);
        while data.has_remaining() {
            values.push(data.get_f64());
        }

        Ok(Self::new(values))
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.repr {
            Repr::Empty => write!(f, "BoundingBox [empty]"),
            Repr::Full => write!(f, "BoundingBox [full]"),
            Repr::Bounded { values, valid: false } => write!(f, "BoundingBox [invalid {:?}]", values),
            Repr::Bounded { values, valid: true } => {
                write!(f, "BoundingBox [dimensions={}", values.len() / 2)?;
                for (d, pair) in values.chunks_exact(2).enumerate() {
                    write!(f, ", {}: [{}, {}]", d, pair[0], pair[0] + pair[1])?;
                }
                write!(f, "]")
            }
        }
    }
}
