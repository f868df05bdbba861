use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc, Weekday};

/// First instant strictly after `now` that falls on `weekday` at `hour:00` UTC.
pub fn next_weekly_boundary(now: DateTime<Utc>, weekday: Weekday, hour: u32) -> DateTime<Utc> {
    let hour = hour.min(23);
    let days_ahead = (weekday.num_days_from_monday() + 7
        - now.weekday().num_days_from_monday())
        % 7;
    let time = NaiveTime::from_hms_opt(hour, 0, 0).unwrap_or(NaiveTime::MIN);
    let candidate = (now.date_naive() + Duration::days(days_ahead as i64))
        .and_time(time)
        .and_utc();
    if candidate > now {
        candidate
    } else {
        candidate + Duration::days(7)
    }
}

/// Moves a past reset instant forward by whole periods until it lies after `now`.
pub fn roll_forward(
    resets_at: DateTime<Utc>,
    period: Duration,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    if resets_at > now || period <= Duration::zero() {
        return resets_at;
    }
    let behind = (now - resets_at).num_milliseconds();
    let step = period.num_milliseconds();
    let periods = behind / step + 1;
    resets_at + Duration::milliseconds(periods * step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn boundary_later_same_week() {
        // 2025-01-01 is a Wednesday.
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap();
        let boundary = next_weekly_boundary(now, Weekday::Fri, 9);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap());
    }

    #[test]
    fn boundary_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 1, 9, 0, 0).unwrap();
        let boundary = next_weekly_boundary(now, Weekday::Wed, 9);
        assert_eq!(boundary, Utc.with_ymd_and_hms(2025, 1, 8, 9, 0, 0).unwrap());

        let earlier_hour = next_weekly_boundary(now, Weekday::Wed, 10);
        assert_eq!(earlier_hour, Utc.with_ymd_and_hms(2025, 1, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn roll_forward_skips_whole_periods() {
        let now = Utc.with_ymd_and_hms(2025, 1, 20, 0, 0, 0).unwrap();
        let stale = Utc.with_ymd_and_hms(2025, 1, 3, 9, 0, 0).unwrap();
        let rolled = roll_forward(stale, Duration::days(7), now);
        assert_eq!(rolled, Utc.with_ymd_and_hms(2025, 1, 24, 9, 0, 0).unwrap());

        let future = Utc.with_ymd_and_hms(2025, 1, 21, 0, 0, 0).unwrap();
        assert_eq!(roll_forward(future, Duration::days(7), now), future);
    }

    #[test]
    fn roll_forward_moves_exact_match_past_now() {
        let now = Utc.with_ymd_and_hms(2025, 1, 10, 9, 0, 0).unwrap();
        let rolled = roll_forward(now, Duration::days(7), now);
        assert_eq!(rolled, Utc.with_ymd_and_hms(2025, 1, 17, 9, 0, 0).unwrap());
    }
}
