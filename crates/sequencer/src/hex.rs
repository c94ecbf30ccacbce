//! Hexadecimal number parsing for command-line tokens
//!
//! Two flavours are provided. [`scan_hex`] follows the lenient conventions of
//! C's `scanf("%x")`: it skips leading whitespace, accepts a sign and a `0x`
//! prefix, and stops at the first character that is not a hex digit.
//! [`parse_hex_strict`] only accepts a token made entirely of hex digits.

/// Scan a hexadecimal number from the start of `input`
///
/// Returns the value and the unconsumed remainder, or `None` when no digit
/// could be read. Digits accumulate in 64 bits, saturating at `u64::MAX`,
/// and a leading `-` negates modulo 2^64; the result keeps the low 32 bits.
pub fn scan_hex(input: &str) -> Option<(u32, &str)> {
    let s = input.trim_start();
    let (negative, s) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let digits = match s.get(..2) {
        Some("0x") | Some("0X") if s[2..].starts_with(|c: char| c.is_ascii_hexdigit()) => &s[2..],
        _ => s,
    };

    let end = digits
        .find(|c: char| !c.is_ascii_hexdigit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }

    let value = digits[..end]
        .bytes()
        .map(hex_digit)
        .fold(0u64, |acc, d| {
            acc.checked_mul(16)
                .and_then(|v| v.checked_add(u64::from(d)))
                .unwrap_or(u64::MAX)
        });

    let value = if negative { value.wrapping_neg() } else { value };
    Some((value as u32, &digits[end..]))
}

/// Parse a token that must consist solely of hex digits (optionally `0x`
/// prefixed) and fit in 32 bits
pub fn parse_hex_strict(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    u32::from_str_radix(digits, 16).ok()
}

fn hex_digit(b: u8) -> u32 {
    match b {
        b'0'..=b'9' => u32::from(b - b'0'),
        b'a'..=b'f' => u32::from(b - b'a' + 10),
        b'A'..=b'F' => u32::from(b - b'A' + 10),
        _ => 0,
    }
}
