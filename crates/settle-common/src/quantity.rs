//! Kubernetes resource quantity comparison
//!
//! Quantities are compared by value, not by spelling: "1Gi" equals "1024Mi"
//! and "0.5" CPU equals "500m". Values are normalized to nano-units so every
//! suffix Kubernetes accepts is represented exactly.

use std::fmt;
use std::str::FromStr;

use crate::Error;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// A parsed quantity, stored in nano-units
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quantity {
    nanos: i128,
}

impl Quantity {
    /// Value in nano-units
    pub fn nanos(&self) -> i128 {
        self.nanos
    }
}

impl FromStr for Quantity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_quantity(s)
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos % NANOS_PER_UNIT == 0 {
            write!(f, "{}", self.nanos / NANOS_PER_UNIT)
        } else {
            write!(f, "{}n", self.nanos)
        }
    }
}

/// Returns true if two quantity strings denote the same amount
///
/// Unparseable strings only compare equal when they are spelled identically.
pub fn quantities_equal(a: &str, b: &str) -> bool {
    match (parse_quantity(a), parse_quantity(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a.trim() == b.trim(),
    }
}

/// Multiplier for a suffix, as (numerator, power of ten) so decimal and
/// binary suffixes share one code path
fn suffix_multiplier(suffix: &str) -> Option<(i128, i32)> {
    let m = match suffix {
        "" => (1, 0),
        "n" => (1, -9),
        "u" => (1, -6),
        "m" => (1, -3),
        "k" => (1, 3),
        "M" => (1, 6),
        "G" => (1, 9),
        "T" => (1, 12),
        "P" => (1, 15),
        "E" => (1, 18),
        "Ki" => (1 << 10, 0),
        "Mi" => (1 << 20, 0),
        "Gi" => (1 << 30, 0),
        "Ti" => (1 << 40, 0),
        "Pi" => (1 << 50, 0),
        "Ei" => (1 << 60, 0),
        _ => return None,
    };
    Some(m)
}

/// Parse a Kubernetes quantity ("200m", "1Gi", "1.5", "1e3")
pub fn parse_quantity(input: &str) -> Result<Quantity, Error> {
    let invalid =
        |why: &str| Error::configuration(format!("invalid quantity '{}': {}", input, why));

    let s = input.trim();
    if s.is_empty() {
        return Err(invalid("empty"));
    }

    let (negative, unsigned) = match s.as_bytes()[0] {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    let number_end = unsigned
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(unsigned.len());
    let (number, rest) = unsigned.split_at(number_end);
    if number.is_empty() || number == "." {
        return Err(invalid("missing number"));
    }

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if frac_part.contains('.') {
        return Err(invalid("more than one decimal point"));
    }

    // Digits as an integer plus the power of ten they are scaled by
    let digits = format!("{}{}", int_part, frac_part);
    let mantissa: i128 = digits.parse().map_err(|_| invalid("number out of range"))?;
    let exponent = -(frac_part.len() as i32);

    // A bare "E" is the exa suffix; "E3" is an exponent
    let (multiplier, suffix_exponent) = if let Some(m) = suffix_multiplier(rest) {
        m
    } else if let Some(exp) = rest.strip_prefix(['e', 'E']) {
        let exp: i32 = exp.parse().map_err(|_| invalid("bad exponent"))?;
        (1, exp)
    } else {
        return Err(invalid("unknown suffix"));
    };
    let exponent = exponent
        .checked_add(suffix_exponent)
        .and_then(|e| e.checked_add(9))
        .ok_or_else(|| invalid("bad exponent"))?;

    let scaled = mantissa
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("number out of range"))?;
    let nanos = if exponent >= 0 {
        10i128
            .checked_pow(exponent as u32)
            .and_then(|p| scaled.checked_mul(p))
            .ok_or_else(|| invalid("number out of range"))?
    } else {
        let divisor = 10i128
            .checked_pow(exponent.unsigned_abs())
            .ok_or_else(|| invalid("precision below nano-units"))?;
        if scaled % divisor != 0 {
            return Err(invalid("precision below nano-units"));
        }
        scaled / divisor
    };

    Ok(Quantity {
        nanos: if negative { -nanos } else { nanos },
    })
}
