//! Stateless string validators attached to schema attributes.
//!
//! Each validator looks at one configured string and either accepts it or
//! returns an error [`Diagnostic`] pointing at the attribute. Values that are
//! not strings, null or unknown are never passed in; the type check in
//! [`crate::validation`] reports those.
//!
//! ```
//! use hemmer_provider_atlas::validators::{valid_cidr, valid_ip};
//!
//! assert!(valid_cidr("cidr_block", "10.0.0.0/24").is_none());
//! assert!(valid_cidr("cidr_block", "10.0.0.1/24").is_some());
//! assert!(valid_ip("ip_address", "2001:db8::1").is_none());
//! ```

use std::fmt::Write as _;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use thiserror::Error;

use crate::schema::Diagnostic;

const INVALID_VALUE: &str = "Invalid Attribute Value";

/// A check that can be attached to a string attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validator {
    /// CIDR notation whose canonical form equals the input.
    Cidr,
    /// IPv4 or IPv6 literal.
    Ip,
    /// Any JSON document.
    Json,
    /// Duration string within an inclusive range.
    DurationBetween {
        /// Lower bound.
        min: Duration,
        /// Upper bound.
        max: Duration,
    },
    /// Character count within an inclusive range.
    LengthBetween {
        /// Lower bound.
        min: usize,
        /// Upper bound.
        max: usize,
    },
    /// Membership in a fixed set of values.
    OneOf(&'static [&'static str]),
}

impl Validator {
    /// Run the check against `value`, reporting problems at `path`.
    pub fn check(&self, path: &str, value: &str) -> Option<Diagnostic> {
        match self {
            Self::Cidr => valid_cidr(path, value),
            Self::Ip => valid_ip(path, value),
            Self::Json => string_is_json(path, value),
            Self::DurationBetween { min, max } => duration_between(path, value, *min, *max),
            Self::LengthBetween { min, max } => length_between(path, value, *min, *max),
            Self::OneOf(allowed) => one_of(path, value, allowed),
        }
    }
}

/// Accepts `value` only if it is CIDR notation already in canonical form.
///
/// `10.0.0.1/24` parses, but its canonical form is `10.0.0.0/24`, so it is
/// rejected: the host bits must be zero and the address must be written the
/// way the platform echoes it back.
pub fn valid_cidr(path: &str, value: &str) -> Option<Diagnostic> {
    match canonical_cidr(value) {
        Some(canonical) if canonical == value => None,
        Some(canonical) => Some(
            Diagnostic::error(INVALID_VALUE)
                .with_detail(format!(
                    "Attribute {} value must be a CIDR block in canonical form ({}), got: {}",
                    path, canonical, value
                ))
                .with_attribute(path),
        ),
        None => Some(
            Diagnostic::error(INVALID_VALUE)
                .with_detail(format!(
                    "Attribute {} value must be a valid CIDR block, got: {}",
                    path, value
                ))
                .with_attribute(path),
        ),
    }
}

/// Parse `addr/prefix` and return the network written canonically.
pub fn canonical_cidr(value: &str) -> Option<String> {
    let (addr, prefix) = value.split_once('/')?;
    if prefix.is_empty() || !prefix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let prefix: u32 = prefix.parse().ok()?;
    let network = match addr.parse::<IpAddr>().ok()? {
        IpAddr::V4(ip) => {
            if prefix > 32 {
                return None;
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(u32::from(ip) & mask))
        }
        IpAddr::V6(ip) => {
            if prefix > 128 {
                return None;
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            let network = Ipv6Addr::from(u128::from(ip) & mask);
            // IPv4-mapped networks are written as plain IPv4.
            match network.to_ipv4_mapped() {
                Some(v4) if prefix >= 96 => return Some(format!("{}/{}", v4, prefix - 96)),
                _ => IpAddr::V6(network),
            }
        }
    };
    Some(format!("{}/{}", network, prefix))
}

/// Accepts IPv4 and IPv6 literals.
pub fn valid_ip(path: &str, value: &str) -> Option<Diagnostic> {
    if value.parse::<IpAddr>().is_ok() {
        return None;
    }
    Some(
        Diagnostic::error(INVALID_VALUE)
            .with_detail(format!(
                "Attribute {} value must be a valid IP address, got: {}",
                path, value
            ))
            .with_attribute(path),
    )
}

/// Accepts any string that parses as JSON.
pub fn string_is_json(path: &str, value: &str) -> Option<Diagnostic> {
    match serde_json::from_str::<serde_json::Value>(value) {
        Ok(_) => None,
        Err(err) => Some(
            Diagnostic::error(INVALID_VALUE)
                .with_detail(format!("{:?} contains an invalid JSON: {}", value, err))
                .with_attribute(path),
        ),
    }
}

/// Accepts a duration string with `min <= d <= max`.
pub fn duration_between(
    path: &str,
    value: &str,
    min: Duration,
    max: Duration,
) -> Option<Diagnostic> {
    let out_of_range = || {
        Diagnostic::error(INVALID_VALUE)
            .with_detail(format!(
                "duration {:?} must be between {} and {}, inclusive",
                value,
                format_duration(min),
                format_duration(max)
            ))
            .with_attribute(path)
    };

    match parse_duration(value) {
        Ok(d) if d >= min && d <= max => None,
        Ok(_) | Err(DurationParseError::Negative) => Some(out_of_range()),
        Err(err) => Some(
            Diagnostic::error(INVALID_VALUE)
                .with_detail(format!("{:?} cannot be parsed as a duration: {}", value, err))
                .with_attribute(path),
        ),
    }
}

/// Accepts strings whose character count is within `min..=max`.
pub fn length_between(path: &str, value: &str, min: usize, max: usize) -> Option<Diagnostic> {
    let len = value.chars().count();
    if (min..=max).contains(&len) {
        return None;
    }
    Some(
        Diagnostic::error(INVALID_VALUE)
            .with_detail(format!(
                "Attribute {} string length must be between {} and {}, got: {}",
                path, min, max, len
            ))
            .with_attribute(path),
    )
}

/// Accepts one of `allowed`, compared exactly.
pub fn one_of(path: &str, value: &str, allowed: &[&str]) -> Option<Diagnostic> {
    if allowed.contains(&value) {
        return None;
    }
    let quoted: Vec<String> = allowed.iter().map(|a| format!("{:?}", a)).collect();
    Some(
        Diagnostic::error(INVALID_VALUE)
            .with_detail(format!(
                "Attribute {} value must be one of: [{}], got: {:?}",
                path,
                quoted.join(" "),
                value
            ))
            .with_attribute(path),
    )
}

/// Why a duration string was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    /// Empty input, stray characters or overflow.
    #[error("invalid duration")]
    Invalid,
    /// A number without a unit, e.g. `"15"`.
    #[error("missing unit in duration")]
    MissingUnit,
    /// A unit outside `ns us µs ms s m h`.
    #[error("unknown unit {0:?} in duration")]
    UnknownUnit(String),
    /// A well-formed duration below zero.
    #[error("negative durations are not allowed")]
    Negative,
}

fn unit_nanos(unit: &str) -> Option<u128> {
    let nanos = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(nanos)
}

/// Parse a duration such as `"15m"`, `"1h30m"`, `"1.5h"` or `"300ms"`.
///
/// The grammar is a sequence of decimal numbers, each followed by a unit,
/// with an optional leading sign. A lone `"0"` is zero.
pub fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(DurationParseError::Invalid);
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let int_part = &rest[..int_len];
        rest = &rest[int_len..];

        let mut frac_part = "";
        if let Some(after_dot) = rest.strip_prefix('.') {
            let frac_len = after_dot.bytes().take_while(u8::is_ascii_digit).count();
            frac_part = &after_dot[..frac_len];
            rest = &after_dot[frac_len..];
        }
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(DurationParseError::Invalid);
        }

        let unit_len = rest
            .char_indices()
            .find(|(_, c)| *c == '.' || c.is_ascii_digit())
            .map_or(rest.len(), |(i, _)| i);
        if unit_len == 0 {
            return Err(DurationParseError::MissingUnit);
        }
        let unit = &rest[..unit_len];
        rest = &rest[unit_len..];
        let scale = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit(unit.into()))?;

        let whole: u128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| DurationParseError::Invalid)?
        };
        let mut nanos = whole
            .checked_mul(scale)
            .ok_or(DurationParseError::Invalid)?;

        // Fractional digits beyond nanosecond precision are dropped.
        let mut place = scale;
        for digit in frac_part.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos = nanos
                .checked_add(u128::from(digit - b'0') * place)
                .ok_or(DurationParseError::Invalid)?;
        }

        total = total.checked_add(nanos).ok_or(DurationParseError::Invalid)?;
    }

    if total > u128::from(u64::MAX) * 1_000_000_000 {
        return Err(DurationParseError::Invalid);
    }
    if negative && total > 0 {
        return Err(DurationParseError::Negative);
    }
    let secs = (total / 1_000_000_000) as u64;
    let subsec = (total % 1_000_000_000) as u32;
    Ok(Duration::new(secs, subsec))
}

/// Render a duration compactly: `12h`, `15m`, `1h30m`, `90s`, `300ms`.
pub fn format_duration(d: Duration) -> String {
    if d.is_zero() {
        return "0s".to_string();
    }
    let total = d.as_secs();
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    let mut out = String::new();
    if h > 0 {
        let _ = write!(out, "{}h", h);
    }
    if m > 0 {
        let _ = write!(out, "{}m", m);
    }
    if s > 0 {
        let _ = write!(out, "{}s", s);
    }
    let ms = d.subsec_millis();
    if ms > 0 {
        let _ = write!(out, "{}ms", ms);
    }
    if out.is_empty() {
        let _ = write!(out, "{}ns", d.subsec_nanos());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_secs(15 * 60);
    const MAX: Duration = Duration::from_secs(12 * 3600);

    #[test]
    fn test_valid_cidr_canonical_only() {
        assert!(valid_cidr("cidr_block", "10.0.0.0/24").is_none());
        assert!(valid_cidr("cidr_block", "0.0.0.0/0").is_none());
        assert!(valid_cidr("cidr_block", "192.168.1.7/32").is_none());
        assert!(valid_cidr("cidr_block", "2001:db8::/32").is_none());

        let diag = valid_cidr("cidr_block", "10.0.0.1/24").unwrap();
        assert_eq!(diag.attribute.as_deref(), Some("cidr_block"));
        assert!(diag.detail.unwrap().contains("10.0.0.0/24"));

        // Canonical IPv6 is lowercase and compressed.
        assert!(valid_cidr("cidr_block", "2001:DB8::/32").is_some());
        assert!(valid_cidr("cidr_block", "2001:db8:0:0::/32").is_some());

        // IPv4-mapped networks canonicalize to plain IPv4.
        let diag = valid_cidr("cidr_block", "::ffff:10.0.0.0/104").unwrap();
        assert!(diag.detail.unwrap().contains("(10.0.0.0/8)"));
    }

    #[test]
    fn test_valid_cidr_rejects_malformed() {
        for bad in [
            "",
            "10.0.0.0",
            "10.0.0.0/",
            "10.0.0.0/33",
            "10.0.0.0/-1",
            "10.0.0.0/+8",
            "10.0.0/8",
            "not-a-cidr",
            "2001:db8::/129",
        ] {
            assert!(valid_cidr("cidr_block", bad).is_some(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_canonical_cidr() {
        assert_eq!(canonical_cidr("10.1.2.3/8").as_deref(), Some("10.0.0.0/8"));
        assert_eq!(canonical_cidr("10.1.2.3/0").as_deref(), Some("0.0.0.0/0"));
        assert_eq!(canonical_cidr("10.0.0.0/08").as_deref(), Some("10.0.0.0/8"));
        assert_eq!(
            canonical_cidr("2001:db8::1/64").as_deref(),
            Some("2001:db8::/64")
        );
        assert_eq!(
            canonical_cidr("::ffff:10.1.2.3/104").as_deref(),
            Some("10.0.0.0/8")
        );
        assert_eq!(
            canonical_cidr("::ffff:10.0.0.0/128").as_deref(),
            Some("10.0.0.0/32")
        );
        assert_eq!(canonical_cidr("::ffff:10.0.0.0/64").as_deref(), Some("::/64"));
    }

    #[test]
    fn test_valid_ip() {
        assert!(valid_ip("ip_address", "10.0.0.1").is_none());
        assert!(valid_ip("ip_address", "::1").is_none());
        assert!(valid_ip("ip_address", "2001:db8::8a2e:370:7334").is_none());

        assert!(valid_ip("ip_address", "").is_some());
        assert!(valid_ip("ip_address", "10.0.0.256").is_some());
        assert!(valid_ip("ip_address", "10.0.0.0/24").is_some());
        assert!(valid_ip("ip_address", "localhost").is_some());
    }

    #[test]
    fn test_string_is_json() {
        assert!(string_is_json("policy", r#"{"Version":"2012-10-17"}"#).is_none());
        assert!(string_is_json("policy", "[1, 2]").is_none());
        assert!(string_is_json("policy", "\"text\"").is_none());

        let diag = string_is_json("policy", "{not json").unwrap();
        assert!(diag.detail.unwrap().contains("contains an invalid JSON"));
        assert!(string_is_json("policy", "").is_some());
    }

    #[test]
    fn test_parse_duration_grammar() {
        assert_eq!(parse_duration("15m"), Ok(Duration::from_secs(900)));
        assert_eq!(parse_duration("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("1.5h"), Ok(Duration::from_secs(5400)));
        assert_eq!(parse_duration("300ms"), Ok(Duration::from_millis(300)));
        assert_eq!(parse_duration("2us"), Ok(Duration::from_micros(2)));
        assert_eq!(parse_duration("2µs"), Ok(Duration::from_micros(2)));
        assert_eq!(parse_duration(".5s"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("+1s"), Ok(Duration::from_secs(1)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("-0s"), Ok(Duration::ZERO));

        assert_eq!(parse_duration(""), Err(DurationParseError::Invalid));
        assert_eq!(parse_duration("."), Err(DurationParseError::Invalid));
        assert_eq!(parse_duration("15"), Err(DurationParseError::MissingUnit));
        assert_eq!(
            parse_duration("1d"),
            Err(DurationParseError::UnknownUnit("d".to_string()))
        );
        assert_eq!(parse_duration("-1h"), Err(DurationParseError::Negative));
    }

    #[test]
    fn test_duration_between_inclusive_bounds() {
        assert!(duration_between("duration", "15m", MIN, MAX).is_none());
        assert!(duration_between("duration", "12h", MIN, MAX).is_none());
        assert!(duration_between("duration", "1h", MIN, MAX).is_none());
        assert!(duration_between("duration", "11h59m59s", MIN, MAX).is_none());

        let diag = duration_between("duration", "14m59s", MIN, MAX).unwrap();
        assert_eq!(
            diag.detail.as_deref(),
            Some("duration \"14m59s\" must be between 15m and 12h, inclusive")
        );
        assert!(duration_between("duration", "12h0m1s", MIN, MAX).is_some());
        assert!(duration_between("duration", "-1h", MIN, MAX)
            .unwrap()
            .detail
            .unwrap()
            .contains("must be between"));
    }

    #[test]
    fn test_parse_duration_overflow_is_an_error() {
        assert_eq!(
            parse_duration("94522879700260684295381835.9h"),
            Err(DurationParseError::Invalid)
        );
        assert!(duration_between("duration", "94522879700260684295381835.9h", MIN, MAX)
            .unwrap()
            .detail
            .unwrap()
            .contains("cannot be parsed as a duration"));
    }

    #[test]
    fn test_duration_between_unparsable() {
        let diag = duration_between("duration", "an hour", MIN, MAX).unwrap();
        assert!(diag
            .detail
            .unwrap()
            .starts_with("\"an hour\" cannot be parsed as a duration"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(MIN), "15m");
        assert_eq!(format_duration(MAX), "12h");
        assert_eq!(format_duration(Duration::from_secs(5400)), "1h30m");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1s500ms");
    }

    #[test]
    fn test_length_between_and_one_of() {
        assert!(length_between("session_name", "ab", 2, 64).is_none());
        assert!(length_between("session_name", "a", 2, 64).is_some());

        let allowed = &["AWS", "GCP", "AZURE"];
        assert!(one_of("provider_name", "GCP", allowed).is_none());
        let diag = one_of("provider_name", "aws", allowed).unwrap();
        assert!(diag.detail.unwrap().contains("[\"AWS\" \"GCP\" \"AZURE\"]"));
    }

    #[test]
    fn test_validator_dispatch() {
        assert!(Validator::Cidr.check("c", "10.0.0.0/16").is_none());
        assert!(Validator::Ip.check("i", "10.0.0.0/16").is_some());
        assert!(Validator::Json.check("j", "{}").is_none());
        assert!(Validator::DurationBetween { min: MIN, max: MAX }
            .check("d", "5m")
            .is_some());
        assert!(Validator::LengthBetween { min: 2, max: 4 }
            .check("l", "abcde")
            .is_some());
        assert!(Validator::OneOf(&["A"]).check("o", "A").is_none());
    }
}
