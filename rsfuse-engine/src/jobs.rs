//! Job Decomposition Engine
//!
//! **[JOB-DEC-010]** Partitions the requested prediction dates into ordered
//! jobs anchored by one or two pair dates. A pair date is a date with images
//! declared under both resolution tags; pair dates are computed once per
//! task and never change during execution.
//!
//! Classification is a pure function of (pair dates, requested dates,
//! role presence), so the policy variants can be tested in isolation from
//! any image data.

use rsfuse_common::types::{Date, OutlierPolicy};
use rsfuse_common::{Error, Result};
use std::collections::BTreeSet;
use tracing::debug;

/// Six-way classification of a candidate date
///
/// **[JOB-CLS-020]**
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateCase {
    /// Not in the requested prediction set
    NotRequested,
    /// Strictly between two consecutive pair dates (double-anchor eligible);
    /// carries the index of the enclosing interval
    BetweenPair(usize),
    /// Before the first or after the last pair date (single-anchor only)
    Outlier,
    /// Neither role present; fatal for this date only
    NoInput,
    /// Both roles already present; prediction unnecessary
    BothPresent,
    /// High-resolution only; prediction impossible but unnecessary
    HighOnly,
}

/// The unit of scheduling
///
/// `date3` is `None` for single-anchor jobs; otherwise `date1 < date3`.
/// `dates` is sorted ascending and consumed in order by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub date1: Date,
    pub date3: Option<Date>,
    pub dates: Vec<Date>,
}

impl Job {
    pub fn is_single_anchor(&self) -> bool {
        self.date3.is_none()
    }

    /// Anchor dates of this job, deduplicated
    pub fn anchor_dates(&self) -> Vec<Date> {
        match self.date3 {
            Some(d3) if d3 != self.date1 => vec![self.date1, d3],
            _ => vec![self.date1],
        }
    }
}

/// Immutable inputs to the decomposition
#[derive(Debug, Clone)]
pub struct DecompositionInput {
    pub high_dates: BTreeSet<Date>,
    pub low_dates: BTreeSet<Date>,
    pub requested: BTreeSet<Date>,
    pub policy: OutlierPolicy,
    /// Structural constraint of the algorithm: 1 for single-anchor-capable,
    /// 2 for double-anchor-only
    pub min_anchors: usize,
}

/// Result of decomposition: ordered jobs plus the dates that bypass
/// prediction, with their classification
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub pair_dates: Vec<Date>,
    pub jobs: Vec<Job>,
    pub bypassed: Vec<(Date, DateCase)>,
}

/// Classify one date against the pair dates and role presence
///
/// Pure function; `pair_dates` must be sorted ascending.
pub fn classify(
    date: Date,
    pair_dates: &[Date],
    high_dates: &BTreeSet<Date>,
    low_dates: &BTreeSet<Date>,
    requested: &BTreeSet<Date>,
) -> DateCase {
    if !requested.contains(&date) {
        return DateCase::NotRequested;
    }
    let has_high = high_dates.contains(&date);
    let has_low = low_dates.contains(&date);
    match (has_high, has_low) {
        (true, true) => DateCase::BothPresent,
        (true, false) => DateCase::HighOnly,
        (false, false) => DateCase::NoInput,
        (false, true) => {
            let idx = pair_dates.partition_point(|p| *p < date);
            if idx == 0 || idx == pair_dates.len() {
                DateCase::Outlier
            } else {
                DateCase::BetweenPair(idx - 1)
            }
        }
    }
}

/// Compute the sorted pair dates: dates present under both tags
pub fn pair_dates(high_dates: &BTreeSet<Date>, low_dates: &BTreeSet<Date>) -> Vec<Date> {
    high_dates.intersection(low_dates).copied().collect()
}

/// Nearest pair date by absolute distance; ties go to the lower date
///
/// **[JOB-TIE-030]** The lower-date tie-break is a documented choice, not a
/// discovered invariant.
pub fn nearest_pair_date(date: Date, pair_dates: &[Date]) -> Option<Date> {
    pair_dates
        .iter()
        .copied()
        .min_by_key(|p| ((p - date).abs(), *p))
}

/// Decompose the requested dates into ordered jobs
///
/// **[JOB-DEC-040]** Jobs are returned sorted by anchor date (then first
/// prediction date); this order is the execution order and the eviction
/// analysis relies on it.
pub fn decompose(input: &DecompositionInput) -> Result<Decomposition> {
    let pairs = pair_dates(&input.high_dates, &input.low_dates);
    let mut bypassed = Vec::new();
    let mut between: Vec<Vec<Date>> = vec![Vec::new(); pairs.len().saturating_sub(1)];
    let mut outliers: Vec<Date> = Vec::new();

    for &date in &input.requested {
        match classify(
            date,
            &pairs,
            &input.high_dates,
            &input.low_dates,
            &input.requested,
        ) {
            DateCase::NotRequested => unreachable!("iterating the requested set"),
            DateCase::BetweenPair(i) => between[i].push(date),
            DateCase::Outlier => outliers.push(date),
            case => bypassed.push((date, case)),
        }
    }

    let mut jobs = match input.policy {
        OutlierPolicy::Ignore => {
            for &date in &outliers {
                debug!(date, "Outlier date ignored by policy");
                bypassed.push((date, DateCase::Outlier));
            }
            double_anchor_jobs(&pairs, &between)
        }
        OutlierPolicy::Mixed => {
            let mut jobs = double_anchor_jobs(&pairs, &between);
            jobs.extend(outlier_jobs(&pairs, &outliers)?);
            jobs
        }
        OutlierPolicy::All => {
            let mut all_dates = outliers.clone();
            for bucket in &between {
                all_dates.extend(bucket.iter().copied());
            }
            outlier_jobs(&pairs, &all_dates)?
        }
    };

    // Structural constraint check: only jobs that actually run need anchors
    if !jobs.is_empty() {
        if input.policy != OutlierPolicy::All && input.min_anchors == 2 {
            if let Some(job) = jobs.iter().find(|j| j.is_single_anchor()) {
                return Err(Error::Config(format!(
                    "algorithm requires two anchors but date(s) {:?} have only one pair date available",
                    job.dates
                )));
            }
        }
        if input.policy == OutlierPolicy::All && input.min_anchors == 2 {
            return Err(Error::Config(
                "policy 'all' produces single-anchor jobs, which the algorithm does not support"
                    .to_string(),
            ));
        }
    }

    jobs.sort_by_key(|j| (j.date1, j.dates.first().copied()));
    debug!(
        pair_dates = ?pairs,
        jobs = jobs.len(),
        bypassed = bypassed.len(),
        "Decomposition complete"
    );
    Ok(Decomposition {
        pair_dates: pairs,
        jobs,
        bypassed,
    })
}

/// One double-anchor job per interval with at least one addressable date
fn double_anchor_jobs(pairs: &[Date], between: &[Vec<Date>]) -> Vec<Job> {
    between
        .iter()
        .enumerate()
        .filter(|(_, dates)| !dates.is_empty())
        .map(|(i, dates)| Job {
            date1: pairs[i],
            date3: Some(pairs[i + 1]),
            dates: dates.clone(),
        })
        .collect()
}

/// Single-anchor jobs grouped by nearest pair date
fn outlier_jobs(pairs: &[Date], dates: &[Date]) -> Result<Vec<Job>> {
    if dates.is_empty() {
        return Ok(Vec::new());
    }
    if pairs.is_empty() {
        return Err(Error::Config(
            "no pair dates available: no date has images under both resolution tags".to_string(),
        ));
    }
    let mut by_anchor: std::collections::BTreeMap<Date, Vec<Date>> = Default::default();
    for &date in dates {
        let anchor = nearest_pair_date(date, pairs).expect("pair dates non-empty");
        by_anchor.entry(anchor).or_default().push(date);
    }
    Ok(by_anchor
        .into_iter()
        .map(|(anchor, mut dates)| {
            dates.sort_unstable();
            Job {
                date1: anchor,
                date3: None,
                dates,
            }
        })
        .collect())
}
