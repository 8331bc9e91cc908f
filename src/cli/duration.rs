//! Parses the `<n>{m|h|d|w}` shorthand or an RFC3339 date accepted by the
//! admin CLI's `--older-than` flags (spec §6).

pub fn parse_older_than(raw: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    if let Ok(fixed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(fixed.with_timezone(&chrono::Utc));
    }

    let raw = raw.trim();
    if raw.len() < 2 {
        return Err(format!("invalid duration {raw}: expected <n>{{m|h|d|w}} or an RFC3339 date"));
    }
    let (digits, unit) = raw.split_at(raw.len() - 1);
    let amount: i64 = digits.parse().map_err(|_| format!("invalid duration {raw}: non-numeric amount"))?;

    let duration = match unit {
        "m" => chrono::Duration::minutes(amount),
        "h" => chrono::Duration::hours(amount),
        "d" => chrono::Duration::days(amount),
        "w" => chrono::Duration::weeks(amount),
        other => return Err(format!("invalid duration unit '{other}': expected m, h, d, or w")),
    };

    Ok(chrono::Utc::now() - duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_shorthand_units() {
        let now = chrono::Utc::now();
        let threshold = parse_older_than("7d").unwrap();
        assert!(threshold < now);
        assert!((now - threshold).num_days() >= 6);
    }

    #[test]
    fn parses_rfc3339_date() {
        let threshold = parse_older_than("2026-01-01T00:00:00Z").unwrap();
        assert_eq!(threshold.to_rfc3339(), "2026-01-01T00:00:00+00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_older_than("not-a-duration").is_err());
    }
}
