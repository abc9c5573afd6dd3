// Chainwatch Export - CSV export of monitored series
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Cell formatting shared by the exporters.

use chainwatch::Time;
use std::time::Duration;

/// Formats a timestamp as UTC wall-clock time with trimmed milliseconds.
///
/// `09:34:15.080` is written `09:34:15.08`, a whole second drops the dot.
pub fn format_clock(time: Time) -> String {
    let dt = time.to_datetime();
    let base = dt.format("%H:%M:%S").to_string();
    let millis = dt.timestamp_subsec_millis();
    if millis == 0 {
        return base;
    }
    let fraction = format!("{:03}", millis);
    format!("{}.{}", base, fraction.trim_end_matches('0'))
}

/// Durations are written as integer nanoseconds.
pub fn format_duration(duration: Duration) -> String {
    duration.as_nanos().to_string()
}
