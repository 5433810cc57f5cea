//! Cron schedule parsing and next-fire computation.
//!
//! Job schedules are standard 5-field cron expressions (minute, hour,
//! day-of-month, month, day-of-week) or one of the `@hourly` / `@daily` /
//! `@weekly` / `@monthly` / `@yearly` descriptors. The scheduler operates at
//! minute resolution, so firing times are always truncated to the minute.

use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::{Error, ErrorCode};

/// Parse a schedule expression into a [`cron::Schedule`].
///
/// The `cron` crate wants a seconds field, so 5-field expressions are widened
/// with a leading `0` and descriptors are rewritten to their 6-field form.
pub fn parse(expression: &str) -> Result<cron::Schedule, Error> {
    let expression = expression.trim();
    if expression.is_empty() {
        return Err(parse_error(expression, "expression is empty"));
    }

    let widened = match expression {
        "@hourly" => "0 0 * * * *".to_string(),
        "@daily" => "0 0 0 * * *".to_string(),
        "@weekly" => "0 0 0 * * SUN".to_string(),
        "@monthly" => "0 0 0 1 * *".to_string(),
        "@yearly" => "0 0 0 1 1 *".to_string(),
        expr if expr.starts_with('@') => {
            return Err(parse_error(expr, "unknown descriptor"));
        }
        expr => {
            let fields = expr.split_whitespace().count();
            if fields != 5 {
                return Err(parse_error(
                    expr,
                    format!("expected 5 fields, got {fields}"),
                ));
            }
            format!("0 {expr}")
        }
    };

    cron::Schedule::from_str(&widened).map_err(|e| parse_error(expression, e.to_string()))
}

/// The least firing time strictly greater than `basis`, truncated to the
/// minute in UTC.
pub fn next_run(basis: DateTime<Utc>, expression: &str) -> Result<DateTime<Utc>, Error> {
    let schedule = parse(expression)?;
    schedule
        .after(&basis)
        .next()
        .map(truncate_minute)
        .ok_or_else(|| parse_error(expression, "schedule has no future firing time"))
}

/// Drop seconds and sub-second precision.
pub fn truncate_minute(ts: DateTime<Utc>) -> DateTime<Utc> {
    let secs = ts.timestamp();
    Utc.timestamp_opt(secs - secs.rem_euclid(60), 0)
        .single()
        .unwrap_or(ts)
}

fn parse_error(expression: &str, reason: impl std::fmt::Display) -> Error {
    Error::new(
        ErrorCode::BadRequest,
        format!("schedule_expression is not a valid cron expression: '{expression}': {reason}"),
    )
}
