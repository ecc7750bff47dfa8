//! Browser-specific visit-time to Unix-seconds conversion (spec §4.5.1).
//! Pure integer arithmetic; each function substitutes `now` when the
//! source value converts to a non-positive timestamp.

const CHROMIUM_EPOCH_OFFSET_US: i64 = 11_644_473_600_000_000;
const SAFARI_EPOCH_OFFSET_S: i64 = 978_307_200;

/// `unix_us = visit_time − 11644473600·10⁶`; `unix_s = unix_us / 10⁶`.
pub fn chromium_to_unix_seconds(visit_time_us: i64, now: i64) -> i64 {
    let unix_us = visit_time_us - CHROMIUM_EPOCH_OFFSET_US;
    let unix_s = unix_us.div_euclid(1_000_000);
    if unix_s > 0 {
        unix_s
    } else {
        now
    }
}

/// Gecko `last_visit_date` is microseconds since 1970-01-01 UTC.
pub fn gecko_to_unix_seconds(last_visit_date_us: i64, now: i64) -> i64 {
    let unix_s = last_visit_date_us.div_euclid(1_000_000);
    if unix_s > 0 {
        unix_s
    } else {
        now
    }
}

/// Safari `visit_time` is seconds (fractional) since 2001-01-01 UTC.
pub fn safari_to_unix_seconds(visit_time_s: f64, now: i64) -> i64 {
    let unix_s = visit_time_s.floor() as i64 + SAFARI_EPOCH_OFFSET_S;
    if unix_s > 0 {
        unix_s
    } else {
        now
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chromium_epoch_matches_known_date() {
        // 2021-01-01T00:00:00Z in Chromium microseconds.
        let visit_time_us = (1_609_459_200 + 11_644_473_600) * 1_000_000;
        assert_eq!(chromium_to_unix_seconds(visit_time_us, 0), 1_609_459_200);
    }

    #[test]
    fn chromium_falls_back_to_now_on_non_positive() {
        assert_eq!(chromium_to_unix_seconds(0, 42), 42);
    }

    #[test]
    fn gecko_epoch_is_plain_microseconds() {
        assert_eq!(gecko_to_unix_seconds(1_609_459_200_000_000, 0), 1_609_459_200);
    }

    #[test]
    fn safari_epoch_offsets_from_2001() {
        assert_eq!(safari_to_unix_seconds(0.0, 0), SAFARI_EPOCH_OFFSET_S);
        assert_eq!(safari_to_unix_seconds(86400.5, 0), SAFARI_EPOCH_OFFSET_S + 86400);
    }

    #[test]
    fn safari_falls_back_to_now_on_negative() {
        assert_eq!(safari_to_unix_seconds(-1_000_000_000.0, 99), 99);
    }
}
