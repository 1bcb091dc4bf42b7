//! Interval-set algebra for valid-range masking
//!
//! **[ISA-SET-010]** An `IntervalSet` is an ordered collection of disjoint
//! numeric intervals, each independently open or closed on each side and
//! allowing infinite bounds. `union_with` and `subtract` apply strictly in
//! call order, so "valid ranges minus invalid ranges" follows the order the
//! options were supplied in. Membership is a binary search.
//!
//! **[ISA-INT-020]** Before an interval set is tested against an integer
//! image, callers narrow it to the image's representable range; open bounds
//! are rounded to the nearest included integer and infinities clamp to the
//! range limits.

/// A single numeric interval with independently open/closed sides
///
/// Infinite sides are expressed with `f64::NEG_INFINITY` / `f64::INFINITY`;
/// an infinite side is always treated as open.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Interval {
    lo: f64,
    hi: f64,
    lo_closed: bool,
    hi_closed: bool,
}

impl Interval {
    /// General constructor; returns `None` for an empty interval
    /// (`lo > hi`, or `lo == hi` with either side open) or a NaN bound
    pub fn new(lo: f64, lo_closed: bool, hi: f64, hi_closed: bool) -> Option<Self> {
        if lo.is_nan() || hi.is_nan() {
            return None;
        }
        let lo_closed = lo_closed && lo.is_finite();
        let hi_closed = hi_closed && hi.is_finite();
        if lo > hi || (lo == hi && !(lo_closed && hi_closed)) {
            return None;
        }
        Some(Self {
            lo,
            hi,
            lo_closed,
            hi_closed,
        })
    }

    /// Closed interval `[lo, hi]`
    pub fn closed(lo: f64, hi: f64) -> Self {
        Self::new(lo, true, hi, true).expect("closed interval requires lo <= hi")
    }

    /// Open interval `(lo, hi)`
    pub fn open(lo: f64, hi: f64) -> Self {
        Self::new(lo, false, hi, false).expect("open interval requires lo < hi")
    }

    /// Degenerate singleton `[v, v]`
    pub fn singleton(v: f64) -> Self {
        Self::closed(v, v)
    }

    /// The whole real line
    pub fn all_reals() -> Self {
        Self {
            lo: f64::NEG_INFINITY,
            hi: f64::INFINITY,
            lo_closed: false,
            hi_closed: false,
        }
    }

    pub fn lo(&self) -> f64 {
        self.lo
    }

    pub fn hi(&self) -> f64 {
        self.hi
    }

    pub fn lo_closed(&self) -> bool {
        self.lo_closed
    }

    pub fn hi_closed(&self) -> bool {
        self.hi_closed
    }

    /// Membership respecting each side's own open/closed bound
    pub fn contains(&self, v: f64) -> bool {
        let above_lo = v > self.lo || (self.lo_closed && v == self.lo);
        let below_hi = v < self.hi || (self.hi_closed && v == self.hi);
        above_lo && below_hi
    }

    /// True if the union of `self` and `other` is one contiguous interval
    fn connects(&self, other: &Interval) -> bool {
        let (a, b) = if self.lo <= other.lo {
            (self, other)
        } else {
            (other, self)
        };
        // Disjoint with a gap, or abutting with both shared sides open
        !(a.hi < b.lo || (a.hi == b.lo && !a.hi_closed && !b.lo_closed))
    }

    /// Merge with a connectable interval
    fn merged(&self, other: &Interval) -> Interval {
        let (lo, lo_closed) = if self.lo < other.lo {
            (self.lo, self.lo_closed)
        } else if other.lo < self.lo {
            (other.lo, other.lo_closed)
        } else {
            (self.lo, self.lo_closed || other.lo_closed)
        };
        let (hi, hi_closed) = if self.hi > other.hi {
            (self.hi, self.hi_closed)
        } else if other.hi > self.hi {
            (other.hi, other.hi_closed)
        } else {
            (self.hi, self.hi_closed || other.hi_closed)
        };
        Interval {
            lo,
            hi,
            lo_closed,
            hi_closed,
        }
    }
}

/// Ordered set of disjoint intervals with call-order union/subtract
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    intervals: Vec<Interval>,
}

impl IntervalSet {
    /// The empty set (contains nothing)
    pub fn new() -> Self {
        Self::default()
    }

    /// The whole real line
    pub fn all_reals() -> Self {
        Self {
            intervals: vec![Interval::all_reals()],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// True if the set is exactly the whole real line
    ///
    /// Used by mask composition to skip per-pixel range tests when the
    /// effective set imposes no restriction.
    pub fn is_all_reals(&self) -> bool {
        self.intervals.len() == 1
            && self.intervals[0].lo == f64::NEG_INFINITY
            && self.intervals[0].hi == f64::INFINITY
    }

    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    /// Add an interval, merging any intervals it connects to
    pub fn union_with(&mut self, iv: Interval) {
        let mut merged = iv;
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);
        for existing in self.intervals.drain(..) {
            if existing.connects(&merged) {
                merged = existing.merged(&merged);
            } else {
                kept.push(existing);
            }
        }
        kept.push(merged);
        kept.sort_by(|a, b| a.lo.partial_cmp(&b.lo).expect("interval bounds are not NaN"));
        self.intervals = kept;
    }

    /// Remove an interval, splitting retained intervals where needed
    pub fn subtract(&mut self, iv: Interval) {
        let mut kept = Vec::with_capacity(self.intervals.len() + 1);
        for existing in self.intervals.drain(..) {
            let overlaps = !(existing.hi < iv.lo
                || existing.lo > iv.hi
                || (existing.hi == iv.lo && !(existing.hi_closed && iv.lo_closed))
                || (existing.lo == iv.hi && !(existing.lo_closed && iv.hi_closed)));
            if !overlaps {
                kept.push(existing);
                continue;
            }
            // Left remainder: existing.lo .. iv.lo, open where iv was closed
            let has_left = existing.lo < iv.lo
                || (existing.lo == iv.lo && existing.lo_closed && !iv.lo_closed);
            if has_left {
                if let Some(left) =
                    Interval::new(existing.lo, existing.lo_closed, iv.lo, !iv.lo_closed)
                {
                    kept.push(left);
                }
            }
            // Right remainder: iv.hi .. existing.hi
            let has_right = existing.hi > iv.hi
                || (existing.hi == iv.hi && existing.hi_closed && !iv.hi_closed);
            if has_right {
                if let Some(right) =
                    Interval::new(iv.hi, !iv.hi_closed, existing.hi, existing.hi_closed)
                {
                    kept.push(right);
                }
            }
        }
        kept.sort_by(|a, b| a.lo.partial_cmp(&b.lo).expect("interval bounds are not NaN"));
        self.intervals = kept;
    }

    /// O(log n) membership test
    pub fn contains(&self, v: f64) -> bool {
        if self.intervals.is_empty() || v.is_nan() {
            return false;
        }
        // First interval whose lower bound lies beyond v
        let idx = self.intervals.partition_point(|iv| iv.lo <= v);
        if idx > 0 && self.intervals[idx - 1].contains(v) {
            return true;
        }
        idx < self.intervals.len() && self.intervals[idx].contains(v)
    }

    /// Narrow to the representable range of an integer base type
    ///
    /// **[ISA-INT-020]** Open bounds round to the nearest included integer,
    /// infinities clamp to `min`/`max`, and every retained interval becomes
    /// closed. Intervals that contain no integer are dropped.
    pub fn narrowed_to_integer_range(&self, min: f64, max: f64) -> IntervalSet {
        let mut out = IntervalSet::new();
        for iv in &self.intervals {
            let lo = if iv.lo == f64::NEG_INFINITY {
                min
            } else if iv.lo_closed {
                iv.lo.ceil()
            } else if iv.lo.fract() == 0.0 {
                iv.lo + 1.0
            } else {
                iv.lo.ceil()
            };
            let hi = if iv.hi == f64::INFINITY {
                max
            } else if iv.hi_closed {
                iv.hi.floor()
            } else if iv.hi.fract() == 0.0 {
                iv.hi - 1.0
            } else {
                iv.hi.floor()
            };
            let lo = lo.max(min);
            let hi = hi.min(max);
            if lo <= hi {
                out.union_with(Interval::closed(lo, hi));
            }
        }
        out
    }
}
