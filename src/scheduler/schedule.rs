//! Schedule expressions.
//!
//! Accepted forms:
//! - `@every <duration>` with `ms`, `s`, `m`, `h` units (`@every 1h30m`)
//! - 5-field cron (`*/5 * * * *`), seconds assumed to be zero
//! - 6/7-field cron with seconds (and year)
//! - `@hourly`, `@daily`, `@weekly`, `@monthly`, `@yearly`

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

use crate::scheduler::SchedulerError;

/// When a task fires.
#[derive(Debug, Clone)]
pub enum Schedule {
    /// Fixed interval, first firing one interval after scheduling.
    Every(Duration),
    /// Calendar-based cron expression.
    Cron(Box<cron::Schedule>),
}

impl Schedule {
    /// Parse a schedule expression.
    pub fn parse(expr: &str) -> Result<Self, SchedulerError> {
        let expr = expr.trim();
        let invalid = |reason: String| SchedulerError::InvalidSchedule {
            expr: expr.to_string(),
            reason,
        };

        if let Some(rest) = expr.strip_prefix("@every") {
            let interval = parse_duration(rest.trim()).map_err(invalid)?;
            return Ok(Schedule::Every(interval));
        }

        let fields: Vec<&str> = expr.split_whitespace().collect();
        let normalized = if !expr.starts_with('@') && fields.len() == 5 {
            let weekdays = translate_weekdays(fields[4]).map_err(invalid)?;
            format!("0 {} {}", fields[..4].join(" "), weekdays)
        } else {
            expr.to_string()
        };
        cron::Schedule::from_str(&normalized)
            .map(|s| Schedule::Cron(Box::new(s)))
            .map_err(|e| invalid(e.to_string()))
    }

    /// Time to wait from now until the next firing.
    ///
    /// `None` when a cron expression has no future occurrence.
    pub fn until_next(&self) -> Option<Duration> {
        match self {
            Schedule::Every(interval) => Some(*interval),
            Schedule::Cron(schedule) => {
                let next = schedule.upcoming(Utc).next()?;
                Some((next - Utc::now()).to_std().unwrap_or_default())
            }
        }
    }
}

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Rewrite a classic day-of-week field (0 or 7 = Sunday) with day names.
///
/// The cron parser numbers days from 1 = Sunday, so numeric days are
/// never passed through.
fn translate_weekdays(field: &str) -> Result<String, String> {
    let name = |part: &str| -> Result<String, String> {
        match part.parse::<usize>() {
            Ok(day) if day <= 7 => Ok(WEEKDAYS[day % 7].to_string()),
            Ok(day) => Err(format!("day of week {} out of range", day)),
            Err(_) => Ok(part.to_string()),
        }
    };

    let mut items = Vec::new();
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => (range, Some(step)),
            None => (item, None),
        };
        let suffix = step.map(|s| format!("/{}", s)).unwrap_or_default();

        match range.split_once('-') {
            Some((start, "7")) if start != "0" && start != "7" => {
                // Sunday closes the week here but opens it for the parser.
                items.push(format!("{}-Sat{}", name(start)?, suffix));
                let first: usize = start
                    .parse()
                    .map_err(|_| format!("bad day of week `{}`", start))?;
                let stride: usize = match step {
                    Some(s) => s.parse().map_err(|_| format!("bad step `{}`", s))?,
                    None => 1,
                };
                if stride > 0 && (7 - first) % stride == 0 {
                    items.push("Sun".to_string());
                }
            }
            Some((start, end)) => {
                items.push(format!("{}-{}{}", name(start)?, name(end)?, suffix));
            }
            None => items.push(format!("{}{}", name(range)?, suffix)),
        }
    }
    Ok(items.join(","))
}

/// Parse a compact duration such as `90s`, `1m30s` or `250ms`.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    if input.is_empty() {
        return Err("missing duration".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = input;
    while !rest.is_empty() {
        let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        if digits == 0 {
            return Err(format!("expected a number at `{}`", rest));
        }
        let value: u64 = rest[..digits]
            .parse()
            .map_err(|e| format!("bad number `{}`: {}", &rest[..digits], e))?;
        rest = &rest[digits..];

        let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
        let secs = |factor: u64| {
            value
                .checked_mul(factor)
                .map(Duration::from_secs)
                .ok_or_else(|| "interval too large".to_string())
        };
        let part = match &rest[..unit_len] {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => secs(60)?,
            "h" => secs(3600)?,
            "" => return Err(format!("missing unit after `{}`", value)),
            unit => return Err(format!("unknown unit `{}`", unit)),
        };
        total = total
            .checked_add(part)
            .ok_or_else(|| "interval too large".to_string())?;
        rest = &rest[unit_len..];
    }

    if total.is_zero() {
        return Err("interval must be positive".to_string());
    }
    Ok(total)
}
