//! Deduplication windows.

use chrono::{DateTime, Datelike, Duration, FixedOffset, Utc};

use crate::error::{AppError, Result};
use crate::models::{PersistedState, WindowPolicy};

/// Marker written by rolling windows, which never roll over as a whole.
pub const ROLLING_MARKER: &str = "rolling";

/// Build the fixed offset used for every calendar decision.
pub fn local_offset(hours: i32) -> Result<FixedOffset> {
    FixedOffset::east_opt(hours * 3600)
        .ok_or_else(|| AppError::config(format!("invalid timezone offset: {hours}h")))
}

impl WindowPolicy {
    /// Marker identifying the window `now` falls in.
    pub fn period_marker(&self, now: DateTime<Utc>, offset: FixedOffset) -> String {
        let local = now.with_timezone(&offset);
        match self {
            Self::IsoWeek => {
                let week = local.iso_week();
                format!("{}-W{:02}", week.year(), week.week())
            }
            Self::Daily => local.format("%Y-%m-%d").to_string(),
            Self::Rolling { .. } => ROLLING_MARKER.to_string(),
        }
    }

    /// Drop keys that fell out of a rolling window. Returns how many.
    pub fn prune(&self, state: &mut PersistedState, now: DateTime<Utc>) -> usize {
        match self {
            Self::Rolling { days } => state.prune_before(now - Duration::days(i64::from(*days))),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ObservedRecord;
    use chrono::TimeZone;

    fn beijing() -> FixedOffset {
        local_offset(8).unwrap()
    }

    #[test]
    fn test_iso_week_marker() {
        let monday = Utc.with_ymd_and_hms(2026, 10, 19, 4, 0, 0).unwrap();
        assert_eq!(WindowPolicy::IsoWeek.period_marker(monday, beijing()), "2026-W43");

        // Sunday 23:30 UTC is already Monday in UTC+8.
        let sunday_night = Utc.with_ymd_and_hms(2026, 10, 18, 17, 30, 0).unwrap();
        assert_eq!(WindowPolicy::IsoWeek.period_marker(sunday_night, beijing()), "2026-W43");
        assert_eq!(
            WindowPolicy::IsoWeek.period_marker(sunday_night, local_offset(0).unwrap()),
            "2026-W42"
        );
    }

    #[test]
    fn test_iso_week_year_boundary() {
        let new_year = Utc.with_ymd_and_hms(2027, 1, 1, 4, 0, 0).unwrap();
        assert_eq!(WindowPolicy::IsoWeek.period_marker(new_year, beijing()), "2026-W53");
    }

    #[test]
    fn test_daily_and_rolling_markers() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 20, 0, 0).unwrap();
        assert_eq!(WindowPolicy::Daily.period_marker(now, beijing()), "2026-10-20");
        assert_eq!(WindowPolicy::Rolling { days: 7 }.period_marker(now, beijing()), "rolling");
    }

    #[test]
    fn test_prune_only_for_rolling() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 0, 0, 0).unwrap();
        let mut state = PersistedState::new(ROLLING_MARKER, now);
        state.records.push(ObservedRecord {
            identity_key: "old".into(),
            observed_at: now - Duration::days(8),
        });
        state.records.push(ObservedRecord {
            identity_key: "new".into(),
            observed_at: now - Duration::days(1),
        });

        assert_eq!(WindowPolicy::IsoWeek.prune(&mut state.clone(), now), 0);
        assert_eq!(WindowPolicy::Rolling { days: 7 }.prune(&mut state, now), 1);
        assert!(state.contains("new"));
    }

    #[test]
    fn test_invalid_offset() {
        assert!(local_offset(30).is_err());
    }
}
