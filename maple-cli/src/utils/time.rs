use std::time::Duration;

use crate::error::AppError;

/// Parse an age with an optional unit (s, m, h, d). A bare number is seconds.
pub fn parse_age(age_str: &str) -> Result<Duration, AppError> {
    let age_str = age_str.trim();
    if age_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    let split_index = age_str
        .find(|c: char| !c.is_ascii_digit() && c != '.')
        .unwrap_or(age_str.len());
    let (numeric_part, unit_part) = age_str.split_at(split_index);

    let value = numeric_part
        .parse::<f64>()
        .map_err(|_| AppError::ParseError(format!("Invalid number in '{age_str}'")))?;

    let multiplier = match unit_part.trim().to_lowercase().as_str() {
        "" | "s" => 1.0,
        "m" => 60.0,
        "h" => 3600.0,
        "d" => 86400.0,
        unit => return Err(AppError::ParseError(format!("Invalid unit '{unit}'"))),
    };

    Duration::try_from_secs_f64(value * multiplier)
        .map_err(|e| AppError::ParseError(format!("Invalid age '{age_str}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_age_units() {
        assert_eq!(parse_age("0").unwrap(), Duration::ZERO);
        assert_eq!(parse_age("90").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_age("90m").unwrap(), Duration::from_secs(90 * 60));
        assert_eq!(parse_age("1.5h").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_age("7d").unwrap(), Duration::from_secs(7 * 86400));
    }

    #[test]
    fn test_parse_age_rejects_garbage() {
        assert!(parse_age("").is_err());
        assert!(parse_age("abc").is_err());
        assert!(parse_age("5w").is_err());
    }
}
