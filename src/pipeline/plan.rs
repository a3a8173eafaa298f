//! Notification planning.
//!
//! Compares the current records with the persisted state and decides what,
//! if anything, to announce. Planning is pure: persistence happens only
//! after a successful delivery, through `Planner::commit`.

use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, Utc};

use crate::models::{DisplayPolicy, ObservedRecord, PersistedState, UpdateRecord, WindowPolicy};

/// Why nothing is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The source yielded no records
    NoRecords,
    /// Every record was already announced in this window
    NothingNew,
}

/// Decision for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyPlan {
    Skip(SkipReason),

    /// The window rolled over; every current record is new.
    ResetAndNotify {
        records: Vec<UpdateRecord>,
        period_marker: String,
    },

    /// Same window with at least one unseen key.
    Notify {
        display: Vec<UpdateRecord>,
        delta_keys: Vec<String>,
        /// Every key in the current fetch; never evicted on commit
        current_keys: Vec<String>,
    },
}

impl NotifyPlan {
    /// Records the message should show.
    pub fn display(&self) -> &[UpdateRecord] {
        match self {
            Self::Skip(_) => &[],
            Self::ResetAndNotify { records, .. } => records,
            Self::Notify { display, .. } => display,
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}

/// Window and display rules for planning.
#[derive(Debug, Clone, Copy)]
pub struct Planner {
    window: WindowPolicy,
    display: DisplayPolicy,
    offset: FixedOffset,
    max_records: usize,
}

impl Planner {
    pub fn new(window: WindowPolicy, display: DisplayPolicy, offset: FixedOffset) -> Self {
        Self {
            window,
            display,
            offset,
            max_records: usize::MAX,
        }
    }

    /// Bound the committed state to `max` keys. Keys of the current fetch
    /// are always kept, so the bound may be exceeded by a large feed.
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = max;
        self
    }

    pub fn window(&self) -> WindowPolicy {
        self.window
    }

    /// Decide what to announce.
    ///
    /// A state without any marker (first run) counts as a rollover.
    pub fn plan(&self, records: &[UpdateRecord], state: &PersistedState, now: DateTime<Utc>) -> NotifyPlan {
        if records.is_empty() {
            return NotifyPlan::Skip(SkipReason::NoRecords);
        }

        let marker = self.window.period_marker(now, self.offset);
        if state.period_marker != marker {
            return NotifyPlan::ResetAndNotify {
                records: records.to_vec(),
                period_marker: marker,
            };
        }

        let observed = state.keys();
        let delta: Vec<&UpdateRecord> = records
            .iter()
            .filter(|r| !observed.contains(r.identity_key.as_str()))
            .collect();

        if delta.is_empty() {
            return NotifyPlan::Skip(SkipReason::NothingNew);
        }

        let display = match self.display {
            DisplayPolicy::Delta => delta.iter().map(|r| (*r).clone()).collect(),
            DisplayPolicy::Full => records.to_vec(),
        };
        NotifyPlan::Notify {
            display,
            delta_keys: delta.iter().map(|r| r.identity_key.clone()).collect(),
            current_keys: records.iter().map(|r| r.identity_key.clone()).collect(),
        }
    }

    /// State to persist once `plan` has been delivered.
    ///
    /// Returns `None` for `Skip`, which never touches state.
    pub fn commit(
        &self,
        plan: &NotifyPlan,
        state: &PersistedState,
        now: DateTime<Utc>,
    ) -> Option<PersistedState> {
        match plan {
            NotifyPlan::Skip(_) => None,
            NotifyPlan::ResetAndNotify {
                records,
                period_marker,
            } => {
                let mut next = PersistedState::new(period_marker.clone(), now);
                let mut seen = HashSet::new();
                next.records = records
                    .iter()
                    .filter(|r| seen.insert(r.identity_key.as_str()))
                    .map(|r| ObservedRecord {
                        identity_key: r.identity_key.clone(),
                        observed_at: now,
                    })
                    .collect();
                Some(next)
            }
            NotifyPlan::Notify {
                delta_keys,
                current_keys,
                ..
            } => {
                let mut next = state.clone();
                for key in delta_keys {
                    if !next.contains(key) {
                        next.records.push(ObservedRecord {
                            identity_key: key.clone(),
                            observed_at: now,
                        });
                    }
                }
                let keep: HashSet<&str> = current_keys.iter().map(String::as_str).collect();
                next.cap(self.max_records, &keep);
                Some(next)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::window::local_offset;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn record(title: &str, episode: &str) -> UpdateRecord {
        let fields = BTreeMap::from([
            ("title".to_string(), title.to_string()),
            ("episode".to_string(), episode.to_string()),
        ]);
        UpdateRecord::from_fields(fields, &["title".to_string(), "episode".to_string()]).unwrap()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 4, 0, 0).unwrap()
    }

    fn planner(display: DisplayPolicy) -> Planner {
        Planner::new(WindowPolicy::IsoWeek, display, local_offset(8).unwrap())
    }

    fn state(marker: &str, keys: &[&str]) -> PersistedState {
        let mut state = PersistedState::new(marker, now());
        for key in keys {
            state.records.push(ObservedRecord {
                identity_key: key.to_string(),
                observed_at: now(),
            });
        }
        state
    }

    #[test]
    fn test_delta_against_current_window() {
        let planner = planner(DisplayPolicy::Delta);
        let records = [record("A", "5"), record("B", "2")];
        let current = state("2026-W43", &["A||5"]);

        let plan = planner.plan(&records, &current, now());
        match &plan {
            NotifyPlan::Notify {
                display, delta_keys, ..
            } => {
                assert_eq!(delta_keys, &vec!["B||2".to_string()]);
                assert_eq!(display.len(), 1);
            }
            other => panic!("unexpected plan: {other:?}"),
        }

        let next = planner.commit(&plan, &current, now()).unwrap();
        assert_eq!(next.period_marker, "2026-W43");
        assert!(next.contains("A||5") && next.contains("B||2"));
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_commit_cap_keeps_current_keys() {
        let planner = planner(DisplayPolicy::Delta).with_max_records(2);
        let records = [record("A", "5"), record("B", "2"), record("C", "1")];
        let mut current = state("2026-W43", &["A||5", "B||2"]);
        current.records.push(ObservedRecord {
            identity_key: "OLD||1".into(),
            observed_at: now() - chrono::Duration::days(2),
        });

        let plan = planner.plan(&records, &current, now());
        let next = planner.commit(&plan, &current, now()).unwrap();

        assert_eq!(next.len(), 3);
        assert!(!next.contains("OLD||1"));
        assert_eq!(planner.plan(&records, &next, now()), NotifyPlan::Skip(SkipReason::NothingNew));
    }

    #[test]
    fn test_full_display_keeps_all_records() {
        let plan = planner(DisplayPolicy::Full).plan(
            &[record("A", "5"), record("B", "2")],
            &state("2026-W43", &["A||5"]),
            now(),
        );
        assert_eq!(plan.display().len(), 2);
    }

    #[test]
    fn test_unchanged_content_is_skipped() {
        let plan = planner(DisplayPolicy::Delta).plan(
            &[record("A", "5")],
            &state("2026-W43", &["A||5"]),
            now(),
        );
        assert_eq!(plan, NotifyPlan::Skip(SkipReason::NothingNew));
        assert!(planner(DisplayPolicy::Delta).commit(&plan, &state("2026-W43", &[]), now()).is_none());
    }

    #[test]
    fn test_no_records_is_skipped_even_on_rollover() {
        let plan = planner(DisplayPolicy::Delta).plan(&[], &state("2026-W01", &["A||5"]), now());
        assert_eq!(plan, NotifyPlan::Skip(SkipReason::NoRecords));
    }

    #[test]
    fn test_rollover_resets() {
        let planner = planner(DisplayPolicy::Delta);
        let old = state("2026-W42", &["A||5", "Z||1"]);
        let plan = planner.plan(&[record("A", "5")], &old, now());

        assert!(matches!(plan, NotifyPlan::ResetAndNotify { ref period_marker, .. } if period_marker == "2026-W43"));
        assert_eq!(plan.display().len(), 1);

        let next = planner.commit(&plan, &old, now()).unwrap();
        assert_eq!(next.period_marker, "2026-W43");
        assert!(next.contains("A||5"));
        assert!(!next.contains("Z||1"));
    }

    #[test]
    fn test_first_run_is_a_rollover() {
        let plan = planner(DisplayPolicy::Delta).plan(&[record("A", "5")], &PersistedState::empty(now()), now());
        assert!(matches!(plan, NotifyPlan::ResetAndNotify { .. }));
    }
}
