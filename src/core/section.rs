// TfScope - core/section.rs
//
// Plan/apply phase tracking over the ordered entry stream.
//
// State machine: Other (initial) -> Plan / Apply on phase-begin markers.
// No end markers; a phase lasts until the next begin marker or end of input.
// A marker entry is stamped with the phase it announces.

use crate::core::model::{PhasePeriod, Section};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::sync::OnceLock;

/// Marker text that opens the plan phase.
const PLAN_MARKERS: &[&str] = &[
    "backend/local: starting Plan operation",
    "Terraform will perform the following actions",
];

/// Marker text that opens the apply phase.
const APPLY_MARKERS: &[&str] = &["backend/local: starting Apply operation", "Applying..."];

/// Detect a phase-begin marker in an entry message.
pub fn detect_marker(message: &str) -> Option<Section> {
    // Apply is checked first: apply runs print the plan summary too, but
    // an explicit apply marker always wins on the same line.
    if APPLY_MARKERS.iter().any(|m| message.contains(m)) {
        return Some(Section::Apply);
    }
    if PLAN_MARKERS.iter().any(|m| message.contains(m)) {
        return Some(Section::Plan);
    }

    let lower = message.to_lowercase();
    if lower.contains("terraform apply") {
        return Some(Section::Apply);
    }
    if lower.contains("terraform plan") {
        return Some(Section::Plan);
    }

    // `CLI args: []string{"terraform", "apply", "-auto-approve"}`
    static CLI_ARGS: OnceLock<Regex> = OnceLock::new();
    let cli_args = CLI_ARGS.get_or_init(|| {
        Regex::new(r#"CLI args: \[\]string\{"[^"]*",\s*"(?P<cmd>plan|apply)""#)
            .expect("CLI args regex")
    });
    cli_args
        .captures(message)
        .and_then(|caps| caps.name("cmd"))
        .map(|cmd| match cmd.as_str() {
            "apply" => Section::Apply,
            _ => Section::Plan,
        })
}

/// One period as recorded while entries stream past.
#[derive(Debug)]
struct OpenPeriod {
    section: Section,
    first_timestamp: Option<DateTime<Utc>>,
    /// Last timestamp seen before this period opened.
    opened_after: Option<DateTime<Utc>>,
    entry_count: usize,
}

/// Stateful phase tracker for a single parse invocation.
#[derive(Debug, Default)]
pub struct SectionTracker {
    current: Section,
    periods: Vec<OpenPeriod>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl SectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Section currently in effect.
    pub fn current(&self) -> Section {
        self.current
    }

    /// Observe the next entry and return the section to stamp it with.
    pub fn observe(&mut self, message: &str, timestamp: Option<DateTime<Utc>>) -> Section {
        if let Some(next) = detect_marker(message) {
            if next != self.current {
                tracing::debug!(from = %self.current, to = %next, "Phase transition");
            }
            self.current = next;
        }

        let needs_new_period = self
            .periods
            .last()
            .map_or(true, |p| p.section != self.current);
        if needs_new_period {
            self.periods.push(OpenPeriod {
                section: self.current,
                first_timestamp: None,
                opened_after: self.last_timestamp,
                entry_count: 0,
            });
        }

        if let Some(period) = self.periods.last_mut() {
            period.entry_count += 1;
            if period.first_timestamp.is_none() {
                period.first_timestamp = timestamp;
            }
        }
        if timestamp.is_some() {
            self.last_timestamp = timestamp;
        }

        self.current
    }

    /// Close all periods and return them in order.
    ///
    /// Each period starts at its first timestamp, or at the last timestamp
    /// seen before the transition when its marker and entries carry none,
    /// and ends where the next one starts; the last ends at the last
    /// observed timestamp. Leading periods without any timestamp are pinned
    /// to the first known one, so the spans cover the file's time range
    /// without gaps.
    pub fn finish(self) -> Vec<PhasePeriod> {
        let mut boundaries: Vec<Option<DateTime<Utc>>> = self
            .periods
            .iter()
            .map(|p| p.first_timestamp.or(p.opened_after))
            .collect();
        let first_known = boundaries.iter().flatten().next().copied();
        for boundary in boundaries.iter_mut() {
            if boundary.is_none() {
                *boundary = first_known;
            } else {
                break;
            }
        }

        let count = self.periods.len();
        self.periods
            .into_iter()
            .enumerate()
            .map(|(idx, period)| {
                let end_time = if idx + 1 < count {
                    boundaries[idx + 1]
                } else {
                    self.last_timestamp
                };
                PhasePeriod {
                    section: period.section,
                    start_time: boundaries[idx],
                    end_time,
                    entry_count: period.entry_count,
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, secs).unwrap())
    }

    #[test]
    fn test_markers() {
        assert_eq!(
            detect_marker("backend/local: starting Plan operation"),
            Some(Section::Plan)
        );
        assert_eq!(detect_marker("applying changes"), None);
        assert_eq!(detect_marker("running terraform apply"), Some(Section::Apply));
        assert_eq!(
            detect_marker(r#"CLI args: []string{"terraform", "apply", "-auto-approve"}"#),
            Some(Section::Apply)
        );
        assert_eq!(
            detect_marker(r#"CLI args: []string{"terraform", "plan"}"#),
            Some(Section::Plan)
        );
        assert_eq!(detect_marker("provider: configuring client"), None);
    }

    #[test]
    fn test_marker_entry_stamped_with_new_phase() {
        let mut tracker = SectionTracker::new();
        assert_eq!(tracker.observe("init", ts(0)), Section::Other);
        assert_eq!(
            tracker.observe("backend/local: starting Plan operation", ts(1)),
            Section::Plan
        );
        assert_eq!(tracker.observe("reading state", ts(2)), Section::Plan);
        assert_eq!(
            tracker.observe("backend/local: starting Apply operation", ts(3)),
            Section::Apply
        );
        assert_eq!(tracker.observe("done", ts(4)), Section::Apply);
    }

    #[test]
    fn test_periods_cover_range_without_gaps() {
        let mut tracker = SectionTracker::new();
        tracker.observe("init", ts(0));
        tracker.observe("terraform plan", ts(5));
        tracker.observe("no timestamp", None);
        tracker.observe("terraform apply", ts(9));
        tracker.observe("tail", ts(12));
        let periods = tracker.finish();

        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].section, Section::Other);
        assert_eq!(periods[0].start_time, ts(0));
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
        assert_eq!(periods[2].end_time, ts(12));
        assert_eq!(periods[1].entry_count, 2);
    }

    #[test]
    fn test_untimed_marker_starts_at_last_seen_timestamp() {
        let mut tracker = SectionTracker::new();
        tracker.observe("init", ts(0));
        tracker.observe("refreshing state", ts(8));
        tracker.observe("backend/local: starting Plan operation", None);
        tracker.observe("backend/local: starting Apply operation", ts(10));
        let periods = tracker.finish();

        assert_eq!(periods.len(), 3);
        assert_eq!(periods[0].section, Section::Other);
        assert_eq!(periods[0].start_time, ts(0));
        assert_eq!(periods[0].end_time, ts(8));
        assert_eq!(periods[0].entry_count, 2);
        assert_eq!(periods[1].section, Section::Plan);
        assert_eq!(periods[1].start_time, ts(8));
        assert_eq!(periods[1].end_time, ts(10));
        assert_eq!(periods[2].start_time, ts(10));
        assert_eq!(periods[2].end_time, ts(10));
    }

    #[test]
    fn test_untimed_period_between_timed_ones_has_no_gap() {
        let mut tracker = SectionTracker::new();
        tracker.observe("terraform plan", ts(2));
        tracker.observe("plan detail", ts(6));
        tracker.observe("terraform apply", None);
        tracker.observe("still untimed", None);
        tracker.observe("CLI args: []string{\"terraform\", \"plan\"}", ts(9));
        let periods = tracker.finish();

        let sections: Vec<Section> = periods.iter().map(|p| p.section).collect();
        assert_eq!(sections, vec![Section::Plan, Section::Apply, Section::Plan]);
        assert_eq!(periods[0].end_time, ts(6));
        assert_eq!(periods[1].start_time, ts(6));
        assert_eq!(periods[1].end_time, ts(9));
        assert_eq!(periods[1].entry_count, 2);
        for pair in periods.windows(2) {
            assert_eq!(pair[0].end_time, pair[1].start_time);
        }
    }

    #[test]
    fn test_adjacent_markers_emit_zero_length_period() {
        let mut tracker = SectionTracker::new();
        tracker.observe("terraform plan", ts(1));
        tracker.observe("terraform apply", ts(1));
        tracker.observe("work", ts(2));
        let periods = tracker.finish();
        assert_eq!(periods.len(), 2);
        assert_eq!(periods[0].section, Section::Plan);
        assert_eq!(periods[0].start_time, periods[0].end_time);
        assert_eq!(periods[1].section, Section::Apply);
    }

    #[test]
    fn test_repeated_marker_keeps_single_period() {
        let mut tracker = SectionTracker::new();
        tracker.observe("terraform plan", ts(1));
        tracker.observe("Terraform will perform the following actions:", ts(2));
        let periods = tracker.finish();
        assert_eq!(periods.len(), 1);
        assert_eq!(periods[0].entry_count, 2);
    }

    #[test]
    fn test_leading_untimed_period_pinned_to_first_timestamp() {
        let mut tracker = SectionTracker::new();
        tracker.observe("banner", None);
        tracker.observe("terraform plan", ts(3));
        let periods = tracker.finish();
        assert_eq!(periods[0].start_time, ts(3));
        assert_eq!(periods[0].end_time, ts(3));
    }

    #[test]
    fn test_no_timestamps_yield_open_periods() {
        let mut tracker = SectionTracker::new();
        tracker.observe("a", None);
        let periods = tracker.finish();
        assert_eq!(periods.len(), 1);
        assert!(periods[0].start_time.is_none());
        assert!(periods[0].end_time.is_none());
    }
}
