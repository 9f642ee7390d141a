//! Catalog identifier normalization
//!
//! Sources spell the same catalog object differently:
//! - GCAT tables use a lettered, zero-padded code (`S00900`)
//! - Celestrak / N2YO use the bare NORAD number (`900`, sometimes `900.0`)
//! - TLE lines use a 5-character field that may be Alpha-5 (`A0001`)
//!
//! Every form is reduced to a [`NoradId`] so records can be joined.

use satcat_common::NoradId;
use serde::{Deserialize, Serialize};

use crate::error::NormalizeError;

/// Which textual convention a source column follows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdConvention {
    /// Accept any form (prefix stripping + leading digit run)
    #[default]
    Auto,
    /// Letter-prefixed padded code, e.g. "S00900"
    Jcat,
    /// Plain numeric NORAD id, e.g. "900" or "00900"
    Norad,
}

impl IdConvention {
    pub fn normalize(&self, raw: &str) -> Result<NoradId, NormalizeError> {
        match self {
            IdConvention::Auto => normalize_identifier(raw),
            IdConvention::Jcat => normalize_jcat(raw),
            IdConvention::Norad => normalize_norad(raw),
        }
    }
}

/// Normalize an identifier of unknown form.
///
/// Skips everything before the first digit, takes that digit run, drops
/// leading zeros and parses the rest. Trailing non-digits (e.g. the
/// classification letter in "25544U") are ignored.
pub fn normalize_identifier(raw: &str) -> Result<NoradId, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let unprefixed = trimmed.trim_start_matches(|c: char| !c.is_ascii_digit());
    let digit_end = unprefixed
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(unprefixed.len());
    let digits = &unprefixed[..digit_end];

    if digits.is_empty() {
        return Err(NormalizeError::NoDigits(trimmed.to_string()));
    }

    parse_digits(digits, trimmed)
}

/// GCAT convention: one or more letters followed only by digits
pub fn normalize_jcat(raw: &str) -> Result<NoradId, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let digits = trimmed.trim_start_matches(|c: char| c.is_ascii_alphabetic());
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NormalizeError::NoDigits(trimmed.to_string()));
    }

    parse_digits(digits, trimmed)
}

/// NORAD convention: digits, optionally exported as a float with a zero
/// fraction ("25544.0").
pub fn normalize_norad(raw: &str) -> Result<NoradId, NormalizeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(NormalizeError::Empty);
    }

    let digits = match trimmed.split_once('.') {
        Some((whole, fraction)) if fraction.chars().all(|c| c == '0') => whole,
        Some(_) => return Err(NormalizeError::NoDigits(trimmed.to_string())),
        None => trimmed,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(NormalizeError::NoDigits(trimmed.to_string()));
    }

    parse_digits(digits, trimmed)
}

/// Decode the 5-character TLE catalog field, including the Alpha-5 scheme
/// where a leading letter replaces the two high digits (A=10 .. Z=33, with
/// I and O skipped).
pub fn decode_alpha5(field: &str) -> Result<NoradId, NormalizeError> {
    let field = field.trim();
    let mut chars = field.chars();

    if let Some(first) = chars.next() {
        let rest = chars.as_str();
        let is_alpha5 = first.is_ascii_uppercase()
            && rest.len() == 4
            && rest.chars().all(|c| c.is_ascii_digit());
        if is_alpha5 {
            let high = alpha5_letter_value(first)
                .ok_or_else(|| NormalizeError::NoDigits(field.to_string()))?;
            let low: NoradId = rest
                .parse()
                .map_err(|_| NormalizeError::OutOfRange(field.to_string()))?;
            return Ok(high * 10_000 + low);
        }
    }

    normalize_identifier(field)
}

fn alpha5_letter_value(c: char) -> Option<NoradId> {
    if !c.is_ascii_uppercase() || c == 'I' || c == 'O' {
        return None;
    }
    let mut value = (c as NoradId - 'A' as NoradId) + 10;
    if c > 'I' {
        value -= 1;
    }
    if c > 'O' {
        value -= 1;
    }
    Some(value)
}

fn parse_digits(digits: &str, original: &str) -> Result<NoradId, NormalizeError> {
    let significant = digits.trim_start_matches('0');
    if significant.is_empty() {
        return Ok(0);
    }
    significant
        .parse::<NoradId>()
        .map_err(|_| NormalizeError::OutOfRange(original.to_string()))
}
