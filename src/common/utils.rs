//! Utility functions for coordkv

use std::borrow::Cow;

/// Range end meaning "every key greater than or equal to the start key"
pub const FROM_KEY_END: &[u8] = &[0];

/// Upper bound (exclusive) of the range holding every key that starts with
/// `prefix`.
///
/// The last byte below 0xff is incremented and everything after it dropped.
/// A prefix made only of 0xff bytes (or an empty prefix) has no finite upper
/// bound, so the from-key marker is returned instead.
pub fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    FROM_KEY_END.to_vec()
}

/// The smallest key strictly greater than `key`
pub fn key_successor(key: &[u8]) -> Vec<u8> {
    let mut next = Vec::with_capacity(key.len() + 1);
    next.extend_from_slice(key);
    next.push(0);
    next
}

/// Does `key` fall in `[start, end)` under etcd range conventions?
///
/// An empty `end` selects `start` only; `FROM_KEY_END` selects everything
/// from `start` onward.
pub fn key_in_range(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    if end.is_empty() {
        key == start
    } else if end == FROM_KEY_END {
        key >= start
    } else {
        key >= start && key < end
    }
}

/// Validate a key for single-key operations
pub fn validate_key(key: &[u8]) -> crate::Result<()> {
    if key.is_empty() {
        return Err(crate::Error::InvalidArgument("key is not provided".into()));
    }
    Ok(())
}

/// Render bytes for logs and terminal output
pub fn display_bytes(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h")
pub fn parse_duration(s: &str) -> crate::Result<std::time::Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let split = s
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| crate::Error::InvalidConfig(format!("missing duration unit: {}", s)))?;
    let (num_str, unit) = s.split_at(split);

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let secs_per_unit = |factor: u64| {
        num.checked_mul(factor)
            .map(std::time::Duration::from_secs)
            .ok_or_else(|| crate::Error::InvalidConfig(format!("duration too large: {}", s)))
    };
    let duration = match unit {
        "ms" => std::time::Duration::from_millis(num),
        "s" => std::time::Duration::from_secs(num),
        "m" => secs_per_unit(60)?,
        "h" => secs_per_unit(3600)?,
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_range_end() {
        assert_eq!(prefix_range_end(b"key"), b"kez".to_vec());
        assert_eq!(prefix_range_end(b"a\xff"), b"b".to_vec());
        assert_eq!(prefix_range_end(b"\xff\xff"), FROM_KEY_END.to_vec());
        assert_eq!(prefix_range_end(b""), FROM_KEY_END.to_vec());
    }

    #[test]
    fn test_key_in_range() {
        assert!(key_in_range(b"key", b"key", b""));
        assert!(!key_in_range(b"key_01", b"key", b""));
        assert!(key_in_range(b"key_01", b"key", &prefix_range_end(b"key")));
        assert!(!key_in_range(b"kez", b"key", &prefix_range_end(b"key")));
        assert!(key_in_range(b"zzz", b"key", FROM_KEY_END));
        assert!(!key_in_range(b"aaa", b"key", FROM_KEY_END));
    }

    #[test]
    fn test_key_successor() {
        let next = key_successor(b"key_09");
        assert!(next.as_slice() > b"key_09".as_slice());
        assert!(next.as_slice() < b"key_09\x01".as_slice());
    }

    #[test]
    fn test_validate_key() {
        assert!(validate_key(b"key").is_ok());
        assert!(validate_key(b"").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(
            parse_duration("500ms").unwrap(),
            std::time::Duration::from_millis(500)
        );
        assert_eq!(
            parse_duration("3s").unwrap(),
            std::time::Duration::from_secs(3)
        );
        assert_eq!(
            parse_duration("5m").unwrap(),
            std::time::Duration::from_secs(300)
        );
        assert_eq!(
            parse_duration("1h").unwrap(),
            std::time::Duration::from_secs(3600)
        );
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("10").is_err());
    }

    #[test]
    fn test_parse_duration_overflow() {
        let huge = format!("{}h", u64::MAX / 60);
        assert!(matches!(
            parse_duration(&huge),
            Err(crate::Error::InvalidConfig(_))
        ));
        assert!(parse_duration(&format!("{}m", u64::MAX)).is_err());
        assert!(parse_duration(&format!("{}s", u64::MAX)).is_ok());
    }
}
