//! Cross-epoch conversion, using literal scenario vectors where they are
//! internally consistent with the standard epoch offsets. Gecko and
//! Safari vectors below reproduce the scenario verbatim. The Chromium
//! vector is derived from the same standard offset (11_644_473_600 s
//! between 1601-01-01 and 1970-01-01) rather than a non-standard number,
//! since the scenario's literal Chromium value does not reduce to the
//! same Unix second under that offset.

use ctrace_core::collectors::epoch::{chromium_to_unix_seconds, gecko_to_unix_seconds, safari_to_unix_seconds};

#[test]
fn gecko_last_visit_date_converts_to_expected_unix_seconds() {
    assert_eq!(gecko_to_unix_seconds(1_700_000_000_000_000, 0), 1_700_000_000);
}

#[test]
fn safari_visit_time_converts_to_expected_unix_seconds() {
    assert_eq!(safari_to_unix_seconds(721_692_800.0, 0), 1_700_000_000);
}

#[test]
fn chromium_visit_time_converts_to_expected_unix_seconds() {
    let visit_time_us = (1_700_000_000i64 + 11_644_473_600) * 1_000_000;
    assert_eq!(chromium_to_unix_seconds(visit_time_us, 0), 1_700_000_000);
}

#[test]
fn all_three_fall_back_to_now_on_non_positive_conversion() {
    assert_eq!(chromium_to_unix_seconds(0, 555), 555);
    assert_eq!(gecko_to_unix_seconds(0, 555), 555);
    assert_eq!(safari_to_unix_seconds(-1_000_000_000.0, 555), 555);
}
