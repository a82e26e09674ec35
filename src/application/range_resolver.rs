// Range resolver - Turns a filter preset into a concrete time range
use crate::domain::time_range::{CustomSelection, FilterState, Preset, TimeRange};
use chrono::{
    DateTime, Datelike, LocalResult, Months, NaiveDate, NaiveTime, TimeDelta, TimeZone, Utc,
};

/// Days covered by the custom preset before the user picks a range
const DEFAULT_CUSTOM_DAYS: i64 = 7;

/// Resolve `preset` against `now`. Calendar boundaries (midnight, week and
/// month edges) are taken in `now`'s time zone.
///
/// Returns `None` only for a custom selection with a single endpoint, which
/// must not trigger a fetch until the second endpoint is picked.
pub fn resolve<Tz: TimeZone>(
    preset: Preset,
    now: &DateTime<Tz>,
    custom: Option<&CustomSelection>,
) -> Option<TimeRange> {
    let tz = now.timezone();
    let today = now.date_naive();

    match preset {
        Preset::Hour => Some(TimeRange::new(
            (now.clone() - TimeDelta::hours(1)).with_timezone(&Utc),
            now.with_timezone(&Utc),
        )),
        Preset::Day => Some(span(&tz, today, today)),
        Preset::Week => {
            let offset = today.weekday().num_days_from_sunday() as i64;
            let sunday = today - TimeDelta::days(offset);
            Some(span(&tz, sunday, sunday + TimeDelta::days(6)))
        }
        Preset::Month => {
            let first = today.with_day(1)?;
            // "day 0" of the next month
            let last = first.checked_add_months(Months::new(1))?.pred_opt()?;
            Some(span(&tz, first, last))
        }
        Preset::Custom => match custom {
            Some(selection) if !selection.is_empty() => selection
                .complete()
                .map(|(from, to)| span(&tz, from, to)),
            _ => Some(span(
                &tz,
                today - TimeDelta::days(DEFAULT_CUSTOM_DAYS),
                today,
            )),
        },
    }
}

/// Resolve the dashboard filter. A date picked for the day preset replaces
/// `now`'s calendar day.
pub fn resolve_filter<Tz: TimeZone>(filter: &FilterState, now: &DateTime<Tz>) -> Option<TimeRange> {
    match (filter.preset, filter.day) {
        (Preset::Day, Some(day)) => Some(span(&now.timezone(), day, day)),
        (preset, _) => resolve(preset, now, Some(&filter.custom)),
    }
}

/// From midnight of `first` to the last millisecond of `last`
fn span<Tz: TimeZone>(tz: &Tz, first: NaiveDate, last: NaiveDate) -> TimeRange {
    TimeRange::new(
        localize(tz, first, NaiveTime::MIN),
        localize(tz, last, end_of_day()),
    )
}

fn end_of_day() -> NaiveTime {
    // 23:59:59.999
    NaiveTime::MIN
        .overflowing_sub_signed(TimeDelta::milliseconds(1))
        .0
}

fn localize<Tz: TimeZone>(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        // Wall-clock time skipped by a DST jump: take the first instant after the gap
        LocalResult::None => (1..=96)
            .find_map(|step| {
                tz.from_local_datetime(&(naive + TimeDelta::minutes(15 * step)))
                    .earliest()
            })
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|| Utc.from_utc_datetime(&naive)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Weekday};
    use chrono_tz::America::Sao_Paulo;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
    }

    fn end_of(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        utc(y, m, d, 23, 59, 59) + TimeDelta::milliseconds(999)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_hour() {
        let now = utc(2024, 3, 24, 15, 0, 0);
        let range = resolve(Preset::Hour, &now, None).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 24, 14, 0, 0));
        assert_eq!(range.end(), now);
    }

    #[test]
    fn test_day() {
        let now = utc(2024, 3, 24, 15, 42, 7);
        let range = resolve(Preset::Day, &now, None).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 24, 0, 0, 0));
        assert_eq!(range.end(), end_of(2024, 3, 24));
    }

    #[test]
    fn test_week_starts_on_sunday() {
        // 2024-03-24 is a Sunday, 2024-03-30 a Saturday
        let now = utc(2024, 3, 27, 9, 30, 0);
        let range = resolve(Preset::Week, &now, None).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 24, 0, 0, 0));
        assert_eq!(range.end(), end_of(2024, 3, 30));
    }

    #[test]
    fn test_week_always_spans_seven_days() {
        let base = utc(2024, 2, 20, 13, 0, 0);
        for offset in 0..60 {
            let now = base + TimeDelta::days(offset);
            let range = resolve(Preset::Week, &now, None).unwrap();

            assert_eq!(range.start().weekday(), Weekday::Sun);
            assert_eq!(range.start().time(), NaiveTime::MIN);
            assert_eq!(range.end().weekday(), Weekday::Sat);
            assert_eq!(range.end().time(), end_of_day());
            assert_eq!(
                range.end() - range.start(),
                TimeDelta::days(7) - TimeDelta::milliseconds(1)
            );
            assert!(range.start() <= now && now <= range.end());
        }
    }

    #[test]
    fn test_month_leap_february() {
        let now = utc(2024, 2, 15, 0, 0, 0);
        let range = resolve(Preset::Month, &now, None).unwrap();
        assert_eq!(range.start(), utc(2024, 2, 1, 0, 0, 0));
        assert_eq!(range.end(), end_of(2024, 2, 29));
    }

    #[test]
    fn test_month_lengths() {
        let cases = [
            (2023, 2, 28),
            (2024, 2, 29),
            (2024, 4, 30),
            (2024, 1, 31),
            (2024, 12, 31),
        ];
        for (year, month, last) in cases {
            let now = utc(year, month, 10, 8, 0, 0);
            let range = resolve(Preset::Month, &now, None).unwrap();
            assert_eq!(range.start(), utc(year, month, 1, 0, 0, 0));
            assert_eq!(range.end(), end_of(year, month, last));
        }
    }

    #[test]
    fn test_pure_in_now() {
        let now = utc(2024, 7, 4, 18, 22, 1);
        for preset in [Preset::Hour, Preset::Day, Preset::Week, Preset::Month] {
            assert_eq!(resolve(preset, &now, None), resolve(preset, &now, None));
        }
    }

    #[test]
    fn test_custom_complete_selection() {
        let now = utc(2024, 3, 24, 15, 0, 0);
        let selection = CustomSelection::new(Some(date(2024, 3, 1)), Some(date(2024, 3, 9)));
        let range = resolve(Preset::Custom, &now, Some(&selection)).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 1, 0, 0, 0));
        assert_eq!(range.end(), end_of(2024, 3, 9));
    }

    #[test]
    fn test_custom_default_without_selection() {
        let now = utc(2024, 3, 24, 15, 0, 0);
        let expected = TimeRange::new(utc(2024, 3, 17, 0, 0, 0), end_of(2024, 3, 24));
        assert_eq!(resolve(Preset::Custom, &now, None), Some(expected));
        assert_eq!(
            resolve(Preset::Custom, &now, Some(&CustomSelection::default())),
            Some(expected)
        );
    }

    #[test]
    fn test_custom_partial_selection_is_pending() {
        let now = utc(2024, 3, 24, 15, 0, 0);
        let from_only = CustomSelection::new(Some(date(2024, 3, 1)), None);
        let to_only = CustomSelection::new(None, Some(date(2024, 3, 1)));
        assert_eq!(resolve(Preset::Custom, &now, Some(&from_only)), None);
        assert_eq!(resolve(Preset::Custom, &now, Some(&to_only)), None);
    }

    #[test]
    fn test_calendar_edges_follow_zone_of_now() {
        // 23:30 UTC on the 24th is already the 25th at UTC+02:00
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        let now = utc(2024, 3, 24, 23, 30, 0).with_timezone(&zone);
        let range = resolve(Preset::Day, &now, None).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 24, 22, 0, 0));
        assert_eq!(range.end(), end_of(2024, 3, 25) - TimeDelta::hours(2));
    }

    #[test]
    fn test_filter_day_uses_picked_date() {
        let now = utc(2024, 3, 24, 15, 0, 0);
        let mut filter = FilterState::new(Preset::Day);
        filter.day = Some(date(2024, 3, 2));
        let range = resolve_filter(&filter, &now).unwrap();
        assert_eq!(range.start(), utc(2024, 3, 2, 0, 0, 0));
        assert_eq!(range.end(), end_of(2024, 3, 2));

        // The picked day only applies to the day preset
        filter.preset = Preset::Hour;
        assert_eq!(
            resolve_filter(&filter, &now),
            resolve(Preset::Hour, &now, None)
        );
    }

    #[test]
    fn test_day_starting_in_dst_gap() {
        // Sao Paulo skipped 00:00-01:00 on 2018-11-04; the day starts at 01:00 -02:00
        let now = Sao_Paulo.with_ymd_and_hms(2018, 11, 4, 12, 0, 0).unwrap();
        let range = resolve(Preset::Day, &now, None).unwrap();
        assert_eq!(range.start(), utc(2018, 11, 4, 3, 0, 0));
        assert_eq!(range.end(), end_of(2018, 11, 4) + TimeDelta::hours(2));
    }

    #[test]
    fn test_day_ending_in_repeated_hour() {
        // 23:00-00:00 on 2019-02-16 happened twice in Sao Paulo; the earlier one (-02:00) wins
        let now = Sao_Paulo.with_ymd_and_hms(2019, 2, 16, 12, 0, 0).unwrap();
        let range = resolve(Preset::Day, &now, None).unwrap();
        assert_eq!(range.start(), utc(2019, 2, 16, 2, 0, 0));
        assert_eq!(
            range.end(),
            utc(2019, 2, 17, 1, 59, 59) + TimeDelta::milliseconds(999)
        );
    }
}
