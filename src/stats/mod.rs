//! Per-day blocked-time counters.

mod clock;

#[cfg(test)]
pub(crate) use clock::testing;
pub use clock::{day_key, Clock, SystemClock};

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Days, Duration, Local, NaiveDate, TimeZone, Utc};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::storage::{KeyValueStore, PersistQueue, Persisted, STATS_KEY};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StatsState {
    /// `YYYY-MM-DD` (local) -> minutes.
    pub minutes_by_day: BTreeMap<String, u64>,
}

/// Clamp to a non-negative whole number of minutes.
fn whole_minutes(minutes: f64) -> u64 {
    if minutes.is_finite() && minutes > 0.0 {
        minutes.floor() as u64
    } else {
        0
    }
}

pub struct StatsLedger {
    cell: Persisted<StatsState>,
    clock: Arc<dyn Clock>,
}

impl StatsLedger {
    pub fn new(queue: PersistQueue, clock: Arc<dyn Clock>) -> Self {
        Self {
            cell: Persisted::new(STATS_KEY, queue),
            clock,
        }
    }

    pub async fn hydrate(&self, store: &dyn KeyValueStore) {
        self.cell.hydrate(store).await;
    }

    pub fn state(&self) -> StatsState {
        self.cell.snapshot()
    }

    pub fn today_key(&self) -> String {
        day_key(self.clock.today())
    }

    /// Add to today's counter.
    pub fn add_minutes(&self, minutes: f64) {
        self.add_minutes_on(minutes, self.clock.today());
    }

    /// Add to `day`'s counter. Zero, negative, and non-finite amounts are
    /// ignored and never create an entry.
    pub fn add_minutes_on(&self, minutes: f64, day: NaiveDate) {
        let minutes = whole_minutes(minutes);
        if minutes == 0 {
            return;
        }
        let key = day_key(day);
        self.cell.update(|s| {
            let entry = s.minutes_by_day.entry(key).or_insert(0);
            *entry = entry.saturating_add(minutes);
            true
        });
    }

    pub fn set_minutes_for_day(&self, key: &str, minutes: f64) {
        let minutes = whole_minutes(minutes);
        self.cell.update(|s| s.minutes_by_day.insert(key.to_string(), minutes) != Some(minutes));
    }

    pub fn get_minutes_for_day(&self, key: &str) -> u64 {
        self.cell
            .read(|s| s.minutes_by_day.get(key).copied().unwrap_or(0))
    }

    pub fn delete_day(&self, key: &str) {
        self.cell.update(|s| s.minutes_by_day.remove(key).is_some());
    }

    pub fn clear_all(&self) {
        self.cell.update(|s| {
            let had_entries = !s.minutes_by_day.is_empty();
            s.minutes_by_day.clear();
            had_entries
        });
    }

    pub fn today_minutes(&self) -> u64 {
        self.get_minutes_for_day(&self.today_key())
    }

    /// Mean over the days that have an entry; 0 when there are none.
    pub fn daily_average(&self) -> f64 {
        self.cell.read(|s| {
            if s.minutes_by_day.is_empty() {
                return 0.0;
            }
            let total: u64 = s.minutes_by_day.values().sum();
            total as f64 / s.minutes_by_day.len() as f64
        })
    }

    /// Up to `limit` recorded days, most recent first.
    pub fn recent_days(&self, limit: usize) -> Vec<(String, u64)> {
        self.cell.read(|s| {
            s.minutes_by_day
                .iter()
                .rev()
                .take(limit)
                .map(|(key, minutes)| (key.clone(), *minutes))
                .collect()
        })
    }

    /// Credit the time between `start` and `end`, split at local midnights.
    /// Returns the minutes credited.
    pub fn credit_interval(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
        let mut credited = 0;
        for (day, minutes) in split_by_day(&Local, start, end) {
            self.add_minutes_on(minutes as f64, day);
            credited += minutes;
        }

        debug!("Credited {credited} blocked minutes");
        credited
    }
}

/// Whole minutes of `[start, end)` per calendar day in `tz`.
fn split_by_day<Tz: TimeZone>(
    tz: &Tz,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<(NaiveDate, u64)> {
    let mut parts = Vec::new();
    if end <= start {
        return parts;
    }

    let end = end.with_timezone(tz);
    let mut cursor = start.with_timezone(tz);

    while cursor < end {
        let day = cursor.date_naive();
        let segment_end = day
            .checked_add_days(Days::new(1))
            .and_then(|next| start_of_day(tz, next))
            .filter(|next| *next > cursor)
            .map_or_else(|| end.clone(), |next| next.min(end.clone()));

        let seconds = segment_end.clone().signed_duration_since(&cursor).num_seconds();
        parts.push((day, whole_minutes(seconds as f64 / 60.0)));
        cursor = segment_end;
    }
    parts
}

/// First valid local instant of `day`. Midnight can fall inside a DST gap,
/// in which case the day starts where the gap ends.
fn start_of_day<Tz: TimeZone>(tz: &Tz, day: NaiveDate) -> Option<DateTime<Tz>> {
    let midnight = day.and_hms_opt(0, 0, 0)?;
    (0..24 * 4)
        .map(|quarter| midnight + Duration::minutes(quarter * 15))
        .find_map(|local| tz.from_local_datetime(&local).earliest())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKvStore;
    use chrono::{FixedOffset, LocalResult, NaiveDateTime};
    use testing::ManualClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ledger_at(now: DateTime<Local>) -> StatsLedger {
        StatsLedger::new(PersistQueue::disconnected(), Arc::new(ManualClock::new(now)))
    }

    fn june_first_morning() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 6, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn ignores_zero_and_negative_amounts() {
        let ledger = ledger_at(june_first_morning());
        ledger.add_minutes(0.0);
        ledger.add_minutes(-5.0);
        ledger.add_minutes(f64::NAN);
        ledger.add_minutes(0.9);
        assert!(ledger.state().minutes_by_day.is_empty());
    }

    #[test]
    fn accumulates_per_day() {
        let ledger = ledger_at(june_first_morning());
        ledger.add_minutes(45.0);
        assert_eq!(ledger.get_minutes_for_day("2024-06-01"), 45);
        ledger.add_minutes(15.7);
        assert_eq!(ledger.get_minutes_for_day("2024-06-01"), 60);
        assert_eq!(ledger.today_minutes(), 60);

        ledger.add_minutes_on(10.0, date(2024, 5, 31));
        assert_eq!(ledger.get_minutes_for_day("2024-05-31"), 10);
        assert_eq!(ledger.get_minutes_for_day("2024-05-30"), 0);
    }

    #[test]
    fn set_delete_and_clear() {
        let ledger = ledger_at(june_first_morning());
        ledger.set_minutes_for_day("2024-06-01", 30.5);
        ledger.set_minutes_for_day("2024-06-02", -3.0);
        assert_eq!(ledger.get_minutes_for_day("2024-06-01"), 30);
        assert_eq!(ledger.get_minutes_for_day("2024-06-02"), 0);
        assert_eq!(ledger.state().minutes_by_day.len(), 2);

        ledger.delete_day("2024-06-02");
        assert_eq!(ledger.state().minutes_by_day.len(), 1);
        ledger.clear_all();
        assert!(ledger.state().minutes_by_day.is_empty());
    }

    #[test]
    fn summaries() {
        let ledger = ledger_at(june_first_morning());
        assert_eq!(ledger.daily_average(), 0.0);

        ledger.set_minutes_for_day("2024-05-30", 20.0);
        ledger.set_minutes_for_day("2024-05-31", 40.0);
        ledger.set_minutes_for_day("2024-06-01", 90.0);

        assert_eq!(ledger.daily_average(), 50.0);
        assert_eq!(
            ledger.recent_days(2),
            vec![("2024-06-01".to_string(), 90), ("2024-05-31".to_string(), 40)]
        );
    }

    #[test]
    fn credits_intervals_across_midnight() {
        let ledger = ledger_at(june_first_morning());
        let start = Local.with_ymd_and_hms(2024, 6, 1, 23, 30, 0).unwrap();
        let end = Local.with_ymd_and_hms(2024, 6, 2, 0, 45, 30).unwrap();

        let credited =
            ledger.credit_interval(start.with_timezone(&Utc), end.with_timezone(&Utc));
        assert_eq!(credited, 75);
        assert_eq!(ledger.get_minutes_for_day("2024-06-01"), 30);
        assert_eq!(ledger.get_minutes_for_day("2024-06-02"), 45);

        assert_eq!(
            ledger.credit_interval(end.with_timezone(&Utc), start.with_timezone(&Utc)),
            0
        );
    }

    /// UTC-3 until 2024-10-20T03:00Z, then UTC-2: local midnight of the 20th
    /// is skipped.
    #[derive(Debug, Clone, Copy)]
    struct MidnightGap;

    impl MidnightGap {
        fn switch() -> NaiveDateTime {
            date(2024, 10, 20).and_hms_opt(3, 0, 0).unwrap()
        }

        fn before() -> FixedOffset {
            FixedOffset::west_opt(3 * 3600).unwrap()
        }

        fn after() -> FixedOffset {
            FixedOffset::west_opt(2 * 3600).unwrap()
        }
    }

    impl TimeZone for MidnightGap {
        type Offset = FixedOffset;

        fn from_offset(_: &FixedOffset) -> Self {
            MidnightGap
        }

        fn offset_from_local_date(&self, local: &NaiveDate) -> LocalResult<FixedOffset> {
            self.offset_from_local_datetime(&local.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_local_datetime(&self, local: &NaiveDateTime) -> LocalResult<FixedOffset> {
            let valid = |offset: FixedOffset| {
                let utc = *local - Duration::seconds(offset.local_minus_utc().into());
                (utc < Self::switch()) == (offset == Self::before())
            };
            match (valid(Self::before()), valid(Self::after())) {
                (true, true) => LocalResult::Ambiguous(Self::before(), Self::after()),
                (true, false) => LocalResult::Single(Self::before()),
                (false, true) => LocalResult::Single(Self::after()),
                (false, false) => LocalResult::None,
            }
        }

        fn offset_from_utc_date(&self, utc: &NaiveDate) -> FixedOffset {
            self.offset_from_utc_datetime(&utc.and_hms_opt(0, 0, 0).unwrap())
        }

        fn offset_from_utc_datetime(&self, utc: &NaiveDateTime) -> FixedOffset {
            if *utc < Self::switch() {
                Self::before()
            } else {
                Self::after()
            }
        }
    }

    #[test]
    fn skipped_midnight_still_splits_the_interval() {
        assert!(MidnightGap
            .from_local_datetime(&date(2024, 10, 20).and_hms_opt(0, 0, 0).unwrap())
            .earliest()
            .is_none());

        let start = date(2024, 10, 20).and_hms_opt(2, 0, 0).unwrap().and_utc();
        let end = date(2024, 10, 20).and_hms_opt(4, 0, 0).unwrap().and_utc();

        assert_eq!(
            split_by_day(&MidnightGap, start, end),
            vec![(date(2024, 10, 19), 60), (date(2024, 10, 20), 60)]
        );
    }

    #[tokio::test]
    async fn round_trips_through_storage() {
        let store = Arc::new(MemoryKvStore::new());
        let queue = PersistQueue::spawn(store.clone());
        let ledger = StatsLedger::new(queue.clone(), Arc::new(ManualClock::new(june_first_morning())));
        ledger.hydrate(store.as_ref()).await;
        ledger.add_minutes(45.0);
        ledger.set_minutes_for_day("2024-05-01", 12.0);
        queue.flush().await;

        let reloaded = StatsLedger::new(
            PersistQueue::disconnected(),
            Arc::new(ManualClock::new(june_first_morning())),
        );
        reloaded.hydrate(store.as_ref()).await;
        assert_eq!(reloaded.state(), ledger.state());
    }
}
