//! Derived counts over an ordered collection.

use chrono::{DateTime, Duration, Local};
use serde::Serialize;
use unplug_api::OwnedRecord;

/// Entry counts for today / last 7 days / last 30 days, plus the total.
///
/// Always recomputed from scratch after a mutation: the scan is O(n) and
/// personal record sets are small, so incremental counters would buy nothing
/// and could drift.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ActivityCounts {
    pub today: usize,
    pub week: usize,
    pub month: usize,
    pub total: usize,
}

impl ActivityCounts {
    /// Single linear scan against local-midnight boundaries.
    pub fn compute<T: OwnedRecord>(records: &[T], now: DateTime<Local>) -> Self {
        let day_start = local_midnight(now);
        let week_start = day_start - Duration::days(7);
        let month_start = day_start - Duration::days(30);

        let mut counts = Self::default();
        for record in records {
            let created = record.created_at().with_timezone(&Local);
            if created >= day_start {
                counts.today += 1;
            }
            if created >= week_start {
                counts.week += 1;
            }
            if created >= month_start {
                counts.month += 1;
            }
            counts.total += 1;
        }
        counts
    }

    pub fn now<T: OwnedRecord>(records: &[T]) -> Self {
        Self::compute(records, Local::now())
    }
}

/// Start of the current local day. Falls back to `now` for the rare timezone
/// transition where local midnight does not exist.
fn local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| naive.and_local_timezone(Local).earliest())
        .unwrap_or(now)
}
