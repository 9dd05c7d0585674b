//! Tests for the output path engine

use chrono::{DateTime, Utc};

use crate::rotate::OutputPattern;

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

#[test]
fn test_filename_substitutes_timestamp_components() {
    let pattern = OutputPattern::new("dns-%Y%m%d-%H%M%S.cdns".into(), 300);
    // 2021-01-02 03:04:05 UTC
    let ts = DateTime::parse_from_rfc3339("2021-01-02T03:04:05Z")
        .unwrap()
        .with_timezone(&Utc);
    assert_eq!(
        pattern.filename(ts).to_str().unwrap(),
        "dns-20210102-030405.cdns"
    );
}

#[test]
fn test_filename_without_specifiers_is_literal() {
    let pattern = OutputPattern::new("plain-output.cdns".into(), 0);
    assert_eq!(
        pattern.filename(at(1234)).to_str().unwrap(),
        "plain-output.cdns"
    );
}

#[test]
fn test_need_rotate_on_window_boundary() {
    let pattern = OutputPattern::new("out-%s".into(), 300);
    let opened = at(1000); // window [900, 1200)

    assert!(!pattern.need_rotate(at(1000), opened));
    assert!(!pattern.need_rotate(at(1199), opened));
    assert!(pattern.need_rotate(at(1200), opened));
    assert!(pattern.need_rotate(at(5000), opened));
}

#[test]
fn test_windows_align_from_epoch() {
    let pattern = OutputPattern::new("out".into(), 60);
    // Both instants sit inside the same epoch-aligned minute.
    assert!(!pattern.need_rotate(at(119), at(60)));
    assert!(pattern.need_rotate(at(120), at(60)));
}

#[test]
fn test_zero_period_never_rotates() {
    let pattern = OutputPattern::new("out".into(), 0);
    assert!(!pattern.need_rotate(at(1_000_000_000), at(0)));
}

#[test]
fn test_quiet_gap_rotates_only_on_next_timestamp() {
    // No traffic for longer than the period: nothing fires until a new
    // timestamp arrives, and then a single rotation is due.
    let pattern = OutputPattern::new("out".into(), 300);
    let opened = at(900);
    let next = at(2000); // several windows later
    assert!(pattern.need_rotate(next, opened));
    // Once reopened at the new timestamp, no further rotation is due.
    assert!(!pattern.need_rotate(next, next));
}
