//! Decile milestone throttling for raw download progress.
//!
//! Download tools report progress far more often than a chat transport can
//! reasonably relay it. [`ProgressThrottle`] folds the raw event stream into at
//! most ten "percent milestone crossed" notifications per download.
//!
//! # Example
//!
//! ```
//! use mediafetch_core::progress::{ProgressEvent, ProgressThrottle};
//!
//! let mut throttle = ProgressThrottle::new();
//! assert!(throttle.observe(&ProgressEvent::new(50, Some(1000), None)).is_none());
//! let milestone = throttle.observe(&ProgressEvent::new(120, Some(1000), None)).unwrap();
//! assert_eq!(milestone.decile, 1);
//! ```

use tracing::trace;

/// Number of percentage points between two milestones.
const DECILE_WIDTH: f64 = 10.0;

/// Highest decile (100%).
const MAX_DECILE: u8 = 10;

/// A single raw progress report from the download capability.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressEvent {
    /// Bytes written so far.
    pub downloaded_bytes: u64,
    /// Total expected bytes, when the source reports it.
    pub total_bytes: Option<u64>,
    /// Instantaneous transfer rate in bytes per second.
    pub rate: Option<f64>,
}

impl ProgressEvent {
    /// Creates a progress event.
    #[must_use]
    pub fn new(downloaded_bytes: u64, total_bytes: Option<u64>, rate: Option<f64>) -> Self {
        Self {
            downloaded_bytes,
            total_bytes,
            rate,
        }
    }

    /// Percent complete, or `None` when the total is unknown or zero.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> Option<f64> {
        match self.total_bytes {
            Some(total) if total > 0 => Some(self.downloaded_bytes as f64 / total as f64 * 100.0),
            _ => None,
        }
    }
}

/// A throttled notification emitted when a new 10% boundary is crossed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Milestone {
    /// Decile crossed (1..=10).
    pub decile: u8,
    /// Exact percent of the event that crossed the boundary.
    pub percent: f64,
    /// Bytes written so far.
    pub downloaded_bytes: u64,
    /// Total expected bytes.
    pub total_bytes: u64,
    /// Transfer rate in bytes per second, if known.
    pub rate: Option<f64>,
}

/// Converts a stream of [`ProgressEvent`]s into deduplicated [`Milestone`]s.
///
/// One instance tracks exactly one in-flight download. The 0% decile never
/// emits, so the first milestone is the first crossing of 10%. A percent
/// regression (out-of-order events from the tool) never re-emits a decile that
/// was already reported.
#[derive(Debug, Default)]
pub struct ProgressThrottle {
    last_emitted: u8,
}

impl ProgressThrottle {
    /// Creates a throttle with no milestone emitted yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest decile reported so far (0 when nothing has been emitted).
    #[must_use]
    pub fn last_emitted_decile(&self) -> u8 {
        self.last_emitted
    }

    /// Feeds one raw event, returning a milestone if a new decile was crossed.
    pub fn observe(&mut self, event: &ProgressEvent) -> Option<Milestone> {
        let percent = event.percent()?;
        let decile = decile_of(percent);

        if decile <= self.last_emitted {
            return None;
        }

        trace!(decile, percent, "progress milestone crossed");
        self.last_emitted = decile;

        Some(Milestone {
            decile,
            percent: percent.min(100.0),
            downloaded_bytes: event.downloaded_bytes,
            total_bytes: event.total_bytes.unwrap_or(0),
            rate: event.rate,
        })
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn decile_of(percent: f64) -> u8 {
    if !percent.is_finite() || percent <= 0.0 {
        return 0;
    }
    let decile = (percent / DECILE_WIDTH).floor();
    if decile >= f64::from(MAX_DECILE) {
        MAX_DECILE
    } else {
        decile as u8
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn at_percent(percent: u64) -> ProgressEvent {
        ProgressEvent::new(percent * 10, Some(1000), Some(2048.0))
    }

    #[test]
    fn test_percent_unknown_total_is_none() {
        assert!(ProgressEvent::new(10, None, None).percent().is_none());
        assert!(ProgressEvent::new(10, Some(0), None).percent().is_none());
    }

    #[test]
    fn test_zero_decile_does_not_emit() {
        let mut throttle = ProgressThrottle::new();
        assert!(throttle.observe(&at_percent(0)).is_none());
        assert!(throttle.observe(&at_percent(5)).is_none());
        assert_eq!(throttle.last_emitted_decile(), 0);
    }

    #[test]
    fn test_out_of_order_events_emit_deciles_one_and_two_only() {
        let mut throttle = ProgressThrottle::new();
        let emitted: Vec<u8> = [5, 12, 12, 27, 9]
            .into_iter()
            .filter_map(|p| throttle.observe(&at_percent(p)))
            .map(|m| m.decile)
            .collect();
        assert_eq!(emitted, vec![1, 2]);
    }

    #[test]
    fn test_dense_stream_emits_at_most_ten_strictly_increasing() {
        let mut throttle = ProgressThrottle::new();
        let mut emitted = Vec::new();
        for downloaded in 0..=10_000u64 {
            if let Some(m) = throttle.observe(&ProgressEvent::new(downloaded, Some(10_000), None)) {
                emitted.push(m.decile);
            }
        }
        assert_eq!(emitted, (1..=10).collect::<Vec<u8>>());
    }

    #[test]
    fn test_jump_skips_intermediate_deciles() {
        let mut throttle = ProgressThrottle::new();
        let m = throttle.observe(&at_percent(73)).unwrap();
        assert_eq!(m.decile, 7);
        assert!(throttle.observe(&at_percent(75)).is_none());
        assert_eq!(throttle.observe(&at_percent(80)).unwrap().decile, 8);
    }

    #[test]
    fn test_overshoot_is_clamped_to_ten() {
        let mut throttle = ProgressThrottle::new();
        let m = throttle
            .observe(&ProgressEvent::new(1500, Some(1000), None))
            .unwrap();
        assert_eq!(m.decile, 10);
        assert!((m.percent - 100.0).abs() < f64::EPSILON);
        assert!(throttle.observe(&at_percent(100)).is_none());
    }

    #[test]
    fn test_milestone_carries_event_fields() {
        let mut throttle = ProgressThrottle::new();
        let m = throttle.observe(&at_percent(50)).unwrap();
        assert_eq!(m.downloaded_bytes, 500);
        assert_eq!(m.total_bytes, 1000);
        assert_eq!(m.rate, Some(2048.0));
    }

    #[test]
    fn test_unknown_total_never_emits() {
        let mut throttle = ProgressThrottle::new();
        for downloaded in [100, 1_000, 1_000_000] {
            assert!(throttle.observe(&ProgressEvent::new(downloaded, None, None)).is_none());
        }
    }
}
