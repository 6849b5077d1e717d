// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use chrono::TimeZone;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize)]
struct Stamped {
    #[serde(with = "iso_ms")]
    at: DateTime<Utc>,
    #[serde(default, with = "iso_ms_opt")]
    maybe: Option<DateTime<Utc>>,
}

#[test]
fn serializes_with_millisecond_precision() {
    let at = Utc.timestamp_millis_opt(1_722_500_000_123).single().unwrap();
    let s = Stamped { at, maybe: None };
    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["at"], "2024-08-01T08:13:20.123Z");
    assert!(json["maybe"].is_null());
}

#[test]
fn round_trips_option() {
    let at = Utc.timestamp_millis_opt(1_000).single().unwrap();
    let s = Stamped { at, maybe: Some(at) };
    let json = serde_json::to_string(&s).unwrap();
    let back: Stamped = serde_json::from_str(&json).unwrap();
    assert_eq!(back.maybe, Some(at));
}

#[test]
fn accepts_offset_timestamps_on_read() {
    let json = r#"{"at":"2024-08-01T10:13:20.123+02:00"}"#;
    let s: Stamped = serde_json::from_str(json).unwrap();
    assert_eq!(s.at.timestamp_millis(), 1_722_500_000_123);
}

#[test]
fn elapsed_stamp_pads_and_sorts() {
    let start = Utc.timestamp_millis_opt(0).single().unwrap();
    let a = elapsed_stamp(start, start + chrono::Duration::milliseconds(345));
    let b = elapsed_stamp(start, start + chrono::Duration::milliseconds(12_345));
    let c = elapsed_stamp(start, start + chrono::Duration::seconds(100_000));
    assert_eq!(a, "000000.345");
    assert_eq!(b, "000012.345");
    assert_eq!(c, "100000.000");
    assert!(a < b && b < c);
}

#[test]
fn elapsed_stamp_clamps_negative() {
    let start = Utc.timestamp_millis_opt(10_000).single().unwrap();
    let earlier = Utc.timestamp_millis_opt(5_000).single().unwrap();
    assert_eq!(elapsed_stamp(start, earlier), "000000.000");
}
