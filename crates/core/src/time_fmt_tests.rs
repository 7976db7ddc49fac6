// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    seconds = { 42_000, "42s" },
    minutes = { 90_000, "1m30s" },
    hours = { 3_660_000, "1h1m" },
    days = { 90_000_000, "1d1h" },
    zero = { 0, "0s" },
)]
fn formats(ms: u64, expected: &str) {
    assert_eq!(format_elapsed_ms(ms), expected);
}
