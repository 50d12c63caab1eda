//! Units formatting and conversion utilities
//!
//! Human-readable rendering of durations, percent deltas and memory
//! figures for reports, plus timeout parsing for the command line.

use std::time::Duration;

/// Format a wall-clock duration
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use searchbench::util::units::format_duration;
///
/// assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
/// assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
/// ```
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs >= 3600 {
        format!(
            "{}h {}m {}s",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60
        )
    } else if total_secs >= 60 {
        format!("{}m {}s", total_secs / 60, total_secs % 60)
    } else if total_secs > 0 {
        if millis > 0 {
            format!("{}.{:02}s", total_secs, millis / 10)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        format!("{}ms", millis)
    }
}

/// Format an optional number of seconds, `-` when absent
pub fn format_seconds(seconds: Option<f64>) -> String {
    match seconds {
        Some(s) if s.is_finite() => format!("{:.2}s", s),
        _ => "-".to_string(),
    }
}

/// Format a signed percent change, `n/a` when it could not be computed
///
/// # Examples
/// ```
/// use searchbench::util::units::format_percent_delta;
///
/// assert_eq!(format_percent_delta(Some(4.0)), "+4.0%");
/// assert_eq!(format_percent_delta(Some(-20.0)), "-20.0%");
/// assert_eq!(format_percent_delta(None), "n/a");
/// ```
pub fn format_percent_delta(percent: Option<f64>) -> String {
    match percent {
        Some(p) if p.is_finite() => {
            if p > 0.0 {
                format!("+{:.1}%", p)
            } else {
                format!("{:.1}%", p)
            }
        }
        _ => "n/a".to_string(),
    }
}

/// Format a memory figure given in megabytes
pub fn format_memory_mb(megabytes: Option<f64>) -> String {
    match megabytes {
        Some(mb) if mb.is_finite() && mb >= 1024.0 => format!("{:.2} GB", mb / 1024.0),
        Some(mb) if mb.is_finite() => format!("{:.1} MB", mb),
        _ => "-".to_string(),
    }
}

/// Parse a timeout given either as plain seconds (`90`, `2.5`) or as a
/// humantime duration (`1m 30s`, `500ms`)
///
/// # Examples
/// ```
/// use searchbench::util::units::parse_timeout;
///
/// assert_eq!(parse_timeout("90").unwrap(), 90.0);
/// assert_eq!(parse_timeout("1m 30s").unwrap(), 90.0);
/// ```
pub fn parse_timeout(input: &str) -> Result<f64, String> {
    let input = input.trim();

    let seconds = match input.parse::<f64>() {
        Ok(seconds) => seconds,
        Err(_) => humantime::parse_duration(input)
            .map_err(|e| format!("Invalid timeout {:?}: {}", input, e))?
            .as_secs_f64(),
    };

    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("Timeout must be positive, got {:?}", input));
    }
    Ok(seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(30)), "30s");
        assert_eq!(format_duration(Duration::from_secs(3661)), "1h 1m 1s");
    }

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(Some(1.234)), "1.23s");
        assert_eq!(format_seconds(None), "-");
        assert_eq!(format_seconds(Some(f64::NAN)), "-");
    }

    #[test]
    fn test_format_percent_delta() {
        assert_eq!(format_percent_delta(Some(0.0)), "0.0%");
        assert_eq!(format_percent_delta(Some(f64::INFINITY)), "n/a");
    }

    #[test]
    fn test_format_memory_mb() {
        assert_eq!(format_memory_mb(Some(12.5)), "12.5 MB");
        assert_eq!(format_memory_mb(Some(2048.0)), "2.00 GB");
        assert_eq!(format_memory_mb(None), "-");
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("2.5").unwrap(), 2.5);
        assert_eq!(parse_timeout("500ms").unwrap(), 0.5);
        assert_eq!(parse_timeout(" 3m ").unwrap(), 180.0);
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-1").is_err());
        assert!(parse_timeout("soon").is_err());
    }
}
