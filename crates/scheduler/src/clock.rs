//! Cron expression parsing and next-fire-time computation.

use std::str::FromStr;

use {
    chrono::{DateTime, Utc},
    chrono_tz::Tz,
    cron::Schedule,
};

use crate::{Error, Result};

/// Resolves cron expressions to absolute fire times in one process-wide
/// time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct CronClock {
    tz: Option<Tz>,
}

impl CronClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }

    pub fn utc() -> Self {
        Self { tz: None }
    }

    /// Build a clock from an IANA zone name such as `"Europe/Paris"`.
    pub fn from_timezone_name(name: &str) -> Result<Self> {
        let tz: Tz = name.parse().map_err(|_| Error::unknown_timezone(name))?;
        Ok(Self { tz: Some(tz) })
    }

    pub fn timezone_name(&self) -> &'static str {
        self.tz.map_or("UTC", |tz| tz.name())
    }

    /// Parse-only validation. Used to reject malformed schedules before any
    /// state is touched.
    pub fn is_valid(&self, expr: &str) -> bool {
        parse_schedule(expr).is_ok()
    }

    /// Next fire time strictly after `after_ms` (epoch millis).
    pub fn next_fire_time(&self, expr: &str, after_ms: u64) -> Result<u64> {
        self.upcoming(expr, after_ms, 1)?
            .into_iter()
            .next()
            .ok_or_else(|| Error::invalid_cron(expr, "no future occurrence"))
    }

    /// The next `count` fire times strictly after `after_ms`.
    pub fn upcoming(&self, expr: &str, after_ms: u64, count: usize) -> Result<Vec<u64>> {
        let schedule = parse_schedule(expr)?;
        let after = i64::try_from(after_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .ok_or_else(|| Error::invalid_cron(expr, format!("time {after_ms} out of range")))?;

        let times: Vec<u64> = match self.tz {
            Some(tz) => schedule
                .after(&after.with_timezone(&tz))
                .take(count)
                .map(|dt| dt.timestamp_millis().max(0) as u64)
                .collect(),
            None => schedule
                .after(&after)
                .take(count)
                .map(|dt| dt.timestamp_millis().max(0) as u64)
                .collect(),
        };

        if times.is_empty() && count > 0 {
            return Err(Error::invalid_cron(expr, "no future occurrence"));
        }
        Ok(times)
    }
}

/// Normalize and parse an expression.
///
/// The `cron` crate wants 6 or 7 fields (seconds first, optional year).
/// Standard 5-field expressions get a `0` seconds field prepended. Quartz's
/// `?` placeholder is treated as `*`.
fn parse_schedule(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    let fields: Vec<&str> = trimmed.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => format!("0 {}", fields.join(" ")),
        6 | 7 => fields.join(" "),
        n => {
            return Err(Error::invalid_cron(
                expr,
                format!("expected 5, 6 or 7 fields, got {n}"),
            ));
        },
    };
    let normalized = normalized.replace('?', "*");
    Schedule::from_str(&normalized).map_err(|e| Error::invalid_cron(expr, e))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    const FEB_1_2024: u64 = 1_706_745_600_000; // 2024-02-01T00:00:00Z

    fn fmt(ms: u64) -> String {
        DateTime::from_timestamp_millis(ms as i64)
            .unwrap()
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string()
    }

    #[test]
    fn test_midnight_next_day() {
        let clock = CronClock::utc();
        // 2024-02-01T13:45:00Z
        let after = FEB_1_2024 + (13 * 3600 + 45 * 60) * 1000;
        let next = clock.next_fire_time("0 0 * * *", after).unwrap();
        assert_eq!(fmt(next), "2024-02-02T00:00:00");
    }

    #[test]
    fn test_exactly_at_occurrence_moves_forward() {
        let clock = CronClock::utc();
        let next = clock.next_fire_time("0 0 * * *", FEB_1_2024).unwrap();
        assert!(next > FEB_1_2024);
        assert_eq!(fmt(next), "2024-02-02T00:00:00");
    }

    #[rstest]
    #[case("*/5 * * * *", "2024-02-01T00:05:00")]
    #[case("0 9 * * *", "2024-02-01T09:00:00")]
    #[case("30 0/15 * * * ?", "2024-02-01T00:00:30")]
    #[case("0 0 12 * * ? 2025", "2025-01-01T12:00:00")]
    fn test_field_variants(#[case] expr: &str, #[case] expected: &str) {
        let next = CronClock::utc().next_fire_time(expr, FEB_1_2024).unwrap();
        assert_eq!(fmt(next), expected);
    }

    #[test]
    fn test_with_timezone() {
        let clock = CronClock::from_timezone_name("Europe/Paris").unwrap();
        let next = clock.next_fire_time("0 9 * * *", FEB_1_2024).unwrap();
        // 9:00 Paris is 08:00 UTC in winter.
        assert_eq!(fmt(next), "2024-02-01T08:00:00");
        assert_eq!(clock.timezone_name(), "Europe/Paris");
    }

    #[test]
    fn test_unknown_timezone() {
        let err = CronClock::from_timezone_name("Mars/Olympus").unwrap_err();
        assert!(matches!(err, Error::UnknownTimezone { .. }));
    }

    #[rstest]
    #[case("invalid")]
    #[case("")]
    #[case("not a cron at all")]
    #[case("61 * * * *")]
    #[case("* * * * * * * *")]
    fn test_invalid(#[case] expr: &str) {
        let clock = CronClock::utc();
        assert!(!clock.is_valid(expr));
        let err = clock.next_fire_time(expr, FEB_1_2024).unwrap_err();
        assert!(matches!(err, Error::InvalidCronExpression { .. }));
    }

    #[test]
    fn test_no_future_occurrence() {
        let err = CronClock::utc()
            .next_fire_time("0 0 0 1 1 ? 2020", FEB_1_2024)
            .unwrap_err();
        assert!(err.to_string().contains("no future occurrence"));
    }

    #[test]
    fn test_upcoming_is_increasing() {
        let times = CronClock::utc()
            .upcoming("0 */6 * * *", FEB_1_2024, 4)
            .unwrap();
        assert_eq!(times.len(), 4);
        assert!(times.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(fmt(times[0]), "2024-02-01T06:00:00");
    }

    #[test]
    fn test_never_before_after() {
        let clock = CronClock::utc();
        let mut after = FEB_1_2024 + 123;
        for _ in 0..20 {
            let next = clock.next_fire_time("* * * * * *", after).unwrap();
            assert!(next > after);
            after = next;
        }
    }
}
