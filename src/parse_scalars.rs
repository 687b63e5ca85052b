use crate::error::Error;

/// Parse a YAML 1.1 boolean from a &str (handles the "Norway problem").
///
/// Accepted TRUE literals (case-insensitive): "y", "yes", "true", "on"
/// Accepted FALSE literals (case-insensitive): "n", "no", "false", "off"
///
/// With `strict` only "true" and "false" are accepted.
pub(crate) fn parse_yaml11_bool(s: &str, strict: bool) -> Result<bool, Error> {
    let t = s.trim();
    if t.eq_ignore_ascii_case("true") {
        return Ok(true);
    }
    if t.eq_ignore_ascii_case("false") {
        return Ok(false);
    }
    if !strict {
        if ["yes", "y", "on"].iter().any(|w| t.eq_ignore_ascii_case(w)) {
            return Ok(true);
        }
        if ["no", "n", "off"].iter().any(|w| t.eq_ignore_ascii_case(w)) {
            return Ok(false);
        }
    }
    Err(Error::invalid_value(format!("`{s}` is not a boolean")))
}

fn parse_digits_u128(digits: &str, radix: u32) -> Option<u128> {
    let mut val: u128 = 0;
    let mut saw = false;
    for b in digits.as_bytes() {
        let d = match *b {
            b'_' => continue,
            b'0'..=b'9' => (b - b'0') as u32,
            b'a'..=b'f' => 10 + (b - b'a') as u32,
            b'A'..=b'F' => 10 + (b - b'A') as u32,
            _ => return None,
        };
        if d >= radix {
            return None;
        }
        val = val.checked_mul(radix as u128)?;
        val = val.checked_add(d as u128)?;
        saw = true;
    }
    if saw { Some(val) } else { None }
}

/// Split off the radix prefix. Returns the radix and the remaining digits.
fn split_radix(rest: &str, zero_octal: bool) -> (u32, &str) {
    if let Some(r) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
        (16, r)
    } else if let Some(r) = rest.strip_prefix("0o").or_else(|| rest.strip_prefix("0O")) {
        (8, r)
    } else if let Some(r) = rest.strip_prefix("0b").or_else(|| rest.strip_prefix("0B")) {
        (2, r)
    } else if zero_octal && rest.len() > 1 && rest.starts_with('0') {
        // 0755, as strtol(s, _, 0) reads it
        (8, &rest[1..])
    } else {
        (10, rest)
    }
}

fn malformed(s: &str, ty: &str) -> Error {
    Error::invalid_value(format!("`{s}` is not a valid {ty}"))
}

/// Parse a signed integer literal. The whole (trimmed) text must be consumed.
///
/// The result is wide; callers check it against the destination width.
pub(crate) fn parse_int_signed(s: &str, zero_octal: bool) -> Result<i128, Error> {
    let t = s.trim();
    let (neg, rest) = match t.strip_prefix('+') {
        Some(r) => (false, r),
        None => match t.strip_prefix('-') {
            Some(r) => (true, r),
            None => (false, t),
        },
    };
    let (radix, digits) = split_radix(rest, zero_octal);
    let mag = parse_digits_u128(digits, radix).ok_or_else(|| malformed(s, "integer"))?;
    if neg {
        // Allows i128::MIN without overflowing the positive side.
        if mag == 1u128 << 127 {
            return Ok(i128::MIN);
        }
        let mag: i128 = mag.try_into().map_err(|_| malformed(s, "integer"))?;
        Ok(-mag)
    } else {
        mag.try_into().map_err(|_| malformed(s, "integer"))
    }
}

/// Parse an unsigned integer literal. A leading `-` is rejected.
pub(crate) fn parse_int_unsigned(s: &str, zero_octal: bool) -> Result<u128, Error> {
    let t = s.trim();
    if t.starts_with('-') {
        return Err(Error::invalid_value(format!("`{s}` is negative")));
    }
    let rest = t.strip_prefix('+').unwrap_or(t);
    let (radix, digits) = split_radix(rest, zero_octal);
    parse_digits_u128(digits, radix).ok_or_else(|| malformed(s, "unsigned integer"))
}

pub(crate) fn parse_yaml12_f64(s: &str) -> Result<f64, Error> {
    let t = s.trim();
    let lower = t.to_ascii_lowercase();
    match lower.as_str() {
        ".nan" | "+.nan" | "-.nan" => Ok(f64::NAN),
        ".inf" | "+.inf" => Ok(f64::INFINITY),
        "-.inf" => Ok(f64::NEG_INFINITY),
        _ => t.parse::<f64>().map_err(|_| malformed(s, "floating point value")),
    }
}

/// Like [`parse_yaml12_f64`], but finite values too large for `f32` are rejected
/// rather than silently becoming infinity.
pub(crate) fn parse_yaml12_f32(s: &str) -> Result<f32, Error> {
    let v = parse_yaml12_f64(s)?;
    let narrowed = v as f32;
    if v.is_finite() && !narrowed.is_finite() {
        return Err(Error::invalid_value(format!("`{s}` overflows a 4-byte float")));
    }
    Ok(narrowed)
}
