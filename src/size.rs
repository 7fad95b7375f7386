//! Human-readable size and duration vocabulary shared by the server
//! operations and the config file.

use std::fmt;
use std::str::FromStr;

const KIB: u64 = 1 << 10;
const MIB: u64 = 1 << 20;
const GIB: u64 = 1 << 30;

/// Parse `<digits>[.<digits>][KMG][B]?` into bytes. Plain digits are bytes.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("size is empty".to_string());
    }
    let mut rest = trimmed;
    if let Some(stripped) = rest.strip_suffix(['B', 'b']) {
        rest = stripped;
    }
    let mut multiplier = 1u64;
    if let Some(last) = rest.chars().last() {
        if last.is_ascii_alphabetic() {
            multiplier = match last.to_ascii_uppercase() {
                'K' => KIB,
                'M' => MIB,
                'G' => GIB,
                _ => return Err(format!("size {:?} has unknown suffix {:?}", s, last)),
            };
            rest = &rest[..rest.len() - 1];
        }
    }
    if rest.is_empty() || !rest.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return Err(format!("size {:?} is not a number", s));
    }
    if rest.contains('.') {
        let value = rest
            .parse::<f64>()
            .map_err(|_| format!("size {:?} is not a number", s))?;
        Ok((value * multiplier as f64).round() as u64)
    } else {
        let value = rest
            .parse::<u64>()
            .map_err(|_| format!("size {:?} is out of range", s))?;
        value
            .checked_mul(multiplier)
            .ok_or_else(|| format!("size {:?} is out of range", s))
    }
}

pub fn is_size(s: &str) -> bool {
    parse_size(s).is_ok()
}

/// Render bytes the way the config and reports spell sizes: whole bytes and
/// kilobytes, one decimal for megabytes and up with a trailing `.0` dropped.
pub fn format_size(n: u64) -> String {
    if n < KIB {
        format!("{}B", n)
    } else if n < MIB {
        format!("{}K", n / KIB)
    } else if n < GIB {
        strip_zero(format!("{:.1}", n as f64 / MIB as f64)) + "M"
    } else {
        strip_zero(format!("{:.1}", n as f64 / GIB as f64)) + "G"
    }
}

fn strip_zero(s: String) -> String {
    match s.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => s,
    }
}

/// Break minutes into weeks/days/hours/minutes, omitting zero components.
pub fn format_minutes(minutes: u64) -> String {
    const MINUTES_PER_HOUR: u64 = 60;
    const MINUTES_PER_DAY: u64 = 24 * MINUTES_PER_HOUR;
    const MINUTES_PER_WEEK: u64 = 7 * MINUTES_PER_DAY;

    let weeks = minutes / MINUTES_PER_WEEK;
    let days = (minutes % MINUTES_PER_WEEK) / MINUTES_PER_DAY;
    let hours = (minutes % MINUTES_PER_DAY) / MINUTES_PER_HOUR;
    let mins = minutes % MINUTES_PER_HOUR;

    let mut parts = Vec::new();
    for (value, unit) in [
        (weeks, "week"),
        (days, "day"),
        (hours, "hour"),
        (mins, "minute"),
    ] {
        if value == 0 {
            continue;
        }
        if value == 1 {
            parts.push(format!("1 {}", unit));
        } else {
            parts.push(format!("{} {}s", value, unit));
        }
    }
    if parts.is_empty() {
        return "0 minutes".to_string();
    }
    parts.join(", ")
}

/// Byte count parsed from the human suffix form, for argument validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Size(u64);

impl Size {
    pub fn bytes(&self) -> u64 {
        self.0
    }
}

impl FromStr for Size {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_size(s).map(Size)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_size(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_and_suffixed() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("1K").unwrap(), 1024);
        assert_eq!(parse_size("1KB").unwrap(), 1024);
        assert_eq!(parse_size("2M").unwrap(), 2 * MIB);
        assert_eq!(parse_size("40G").unwrap(), 40 * GIB);
        assert_eq!(parse_size("40g").unwrap(), 40 * GIB);
        assert_eq!(parse_size("200MB").unwrap(), 200 * MIB);
    }

    #[test]
    fn parse_fractional() {
        assert_eq!(parse_size("1.5K").unwrap(), 1536);
        assert_eq!(parse_size("2.5G").unwrap(), 5 * GIB / 2);
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_size("").is_err());
        assert!(parse_size("G").is_err());
        assert!(parse_size("12T").is_err());
        assert!(parse_size("1.2.3K").is_err());
        assert!(parse_size("-5M").is_err());
        assert!(is_size("5M"));
        assert!(!is_size("five"));
    }

    #[test]
    fn format_banding() {
        assert_eq!(format_size(0), "0B");
        assert_eq!(format_size(1023), "1023B");
        assert_eq!(format_size(1024), "1K");
        assert_eq!(format_size(1536), "1K");
        assert_eq!(format_size(MIB - 1), "1023K");
        assert_eq!(format_size(MIB), "1M");
        assert_eq!(format_size(MIB + MIB / 2), "1.5M");
        assert_eq!(format_size(GIB), "1G");
        assert_eq!(format_size(42949672960), "40G");
        assert_eq!(format_size(5 * GIB / 2), "2.5G");
    }

    #[test]
    fn format_round_trips_within_unit() {
        for n in [500u64, 2048, 3 * MIB, 7 * GIB, 42949672960] {
            let parsed = parse_size(&format_size(n)).unwrap();
            let unit = if n < KIB {
                1
            } else if n < MIB {
                KIB
            } else if n < GIB {
                MIB / 10
            } else {
                GIB / 10
            };
            assert!(parsed.abs_diff(n) <= unit, "{} -> {}", n, parsed);
        }
    }

    #[test]
    fn minutes_composition() {
        assert_eq!(format_minutes(0), "0 minutes");
        assert_eq!(format_minutes(1), "1 minute");
        assert_eq!(format_minutes(61), "1 hour, 1 minute");
        assert_eq!(format_minutes(60 * 24), "1 day");
        assert_eq!(
            format_minutes(7 * 24 * 60 + 2 * 24 * 60 + 3 * 60 + 4),
            "1 week, 2 days, 3 hours, 4 minutes"
        );
        assert_eq!(format_minutes(2 * 7 * 24 * 60), "2 weeks");
    }
}
