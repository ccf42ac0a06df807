//! Kubernetes resource quantity arithmetic
//!
//! Quantities are held as an exact count of nano-units so that CPU values in
//! nanocores and memory values in bytes can be summed without rounding.
//! Rendering follows the canonical Kubernetes form: the largest suffix that
//! keeps an integer mantissa.

use crate::error::QuantityError;
use std::fmt;
use std::ops::AddAssign;
use std::str::FromStr;

const NANOS_PER_UNIT: i128 = 1_000_000_000;

/// Longest mantissa accepted before the value could overflow `i128`
const MAX_MANTISSA_DIGITS: usize = 24;

const BINARY_SUFFIXES: [&str; 7] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei"];

/// Suffix family a quantity was written in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityFormat {
    /// `n u m k M G T P E`
    DecimalSi,
    /// `Ki Mi Gi Ti Pi Ei`
    BinarySi,
    /// `1e3`, `5E-3`
    DecimalExponent,
}

/// An exact resource quantity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quantity {
    nanos: i128,
    format: QuantityFormat,
}

impl Quantity {
    /// Zero in the given format
    pub const fn zero(format: QuantityFormat) -> Self {
        Self { nanos: 0, format }
    }

    /// Parse a quantity string such as `250m`, `1.5Gi` or `1e3`
    pub fn parse(raw: &str) -> Result<Self, QuantityError> {
        let s = raw.trim();
        if s.is_empty() {
            return Err(QuantityError::Empty);
        }

        let (negative, unsigned) = match s.as_bytes()[0] {
            b'-' => (true, &s[1..]),
            b'+' => (false, &s[1..]),
            _ => (false, s),
        };

        let split = unsigned
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(unsigned.len());
        let (number, suffix) = unsigned.split_at(split);

        let (mantissa, fraction_digits) = parse_mantissa(number, raw)?;
        let (format, scale) = parse_suffix(suffix, raw)?;

        let magnitude = match scale {
            Scale::Decimal(exp10) => {
                let exp = 9 + exp10 - fraction_digits as i32;
                if exp >= 0 {
                    pow10(exp as u32)
                        .and_then(|p| mantissa.checked_mul(p))
                        .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))?
                } else {
                    let divisor = pow10(exp.unsigned_abs())
                        .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))?;
                    mantissa / divisor
                }
            }
            Scale::Binary(power) => {
                let multiplier = 1024i128
                    .checked_pow(power)
                    .and_then(|m| m.checked_mul(NANOS_PER_UNIT))
                    .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))?;
                let scaled = mantissa
                    .checked_mul(multiplier)
                    .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))?;
                let divisor = pow10(fraction_digits as u32)
                    .ok_or_else(|| QuantityError::OutOfRange(raw.to_string()))?;
                scaled / divisor
            }
        };

        Ok(Self {
            nanos: if negative { -magnitude } else { magnitude },
            format,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.nanos == 0
    }

    pub fn format(&self) -> QuantityFormat {
        self.format
    }

    /// Value in nano-units (nanocores for CPU, nanobytes for memory)
    pub fn nanos(&self) -> i128 {
        self.nanos
    }

    fn fmt_binary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut value = self.nanos / NANOS_PER_UNIT;
        let mut power = 0;
        while power < BINARY_SUFFIXES.len() - 1 && value % 1024 == 0 {
            value /= 1024;
            power += 1;
        }
        write!(f, "{}{}", value, BINARY_SUFFIXES[power])
    }

    fn fmt_decimal(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut mantissa = self.nanos;
        let mut exp10 = -9;
        while exp10 < 18 && mantissa % 1000 == 0 {
            mantissa /= 1000;
            exp10 += 3;
        }

        if self.format == QuantityFormat::DecimalExponent {
            return if exp10 == 0 {
                write!(f, "{}", mantissa)
            } else {
                write!(f, "{}e{}", mantissa, exp10)
            };
        }

        let suffix = match exp10 {
            -9 => "n",
            -6 => "u",
            -3 => "m",
            0 => "",
            3 => "k",
            6 => "M",
            9 => "G",
            12 => "T",
            15 => "P",
            _ => "E",
        };
        write!(f, "{}{}", mantissa, suffix)
    }
}

/// Adds `rhs` in place. A zero accumulator adopts the format of the value
/// added to it, so a sum renders in the family of its first non-zero term.
impl AddAssign for Quantity {
    fn add_assign(&mut self, rhs: Self) {
        if self.nanos == 0 {
            self.format = rhs.format;
        }
        self.nanos = self.nanos.saturating_add(rhs.nanos);
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.nanos == 0 {
            return f.write_str("0");
        }

        let whole = self.nanos % NANOS_PER_UNIT == 0;
        if self.format == QuantityFormat::BinarySi
            && whole
            && self.nanos.abs() >= 1024 * NANOS_PER_UNIT
        {
            self.fmt_binary(f)
        } else {
            self.fmt_decimal(f)
        }
    }
}

impl FromStr for Quantity {
    type Err = QuantityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Sum a set of quantity strings, starting from zero in `format`
pub fn sum<'a, I>(format: QuantityFormat, values: I) -> Result<Quantity, QuantityError>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = Quantity::zero(format);
    for value in values {
        total += Quantity::parse(value)?;
    }
    Ok(total)
}

/// Canonical rendering of a quantity string, or the input unchanged when it
/// does not parse.
pub fn canonical(raw: &str) -> String {
    Quantity::parse(raw)
        .map(|q| q.to_string())
        .unwrap_or_else(|_| raw.to_string())
}

enum Scale {
    Decimal(i32),
    Binary(u32),
}

fn parse_mantissa(number: &str, raw: &str) -> Result<(i128, usize), QuantityError> {
    let invalid = || QuantityError::InvalidNumber(raw.to_string());

    let (int_part, frac_part) = match number.split_once('.') {
        Some((i, f)) => (i, f),
        None => (number, ""),
    };
    if frac_part.contains('.') || (int_part.is_empty() && frac_part.is_empty()) {
        return Err(invalid());
    }

    let digits = format!("{}{}", int_part, frac_part);
    let significant = digits.trim_start_matches('0');
    if significant.len() > MAX_MANTISSA_DIGITS {
        return Err(QuantityError::OutOfRange(raw.to_string()));
    }
    let mantissa = if significant.is_empty() {
        0
    } else {
        significant.parse::<i128>().map_err(|_| invalid())?
    };

    Ok((mantissa, frac_part.len()))
}

fn parse_suffix(suffix: &str, raw: &str) -> Result<(QuantityFormat, Scale), QuantityError> {
    let decimal = |exp| Ok((QuantityFormat::DecimalSi, Scale::Decimal(exp)));
    let binary = |power| Ok((QuantityFormat::BinarySi, Scale::Binary(power)));

    match suffix {
        "" => decimal(0),
        "n" => decimal(-9),
        "u" => decimal(-6),
        "m" => decimal(-3),
        "k" => decimal(3),
        "M" => decimal(6),
        "G" => decimal(9),
        "T" => decimal(12),
        "P" => decimal(15),
        "E" => decimal(18),
        "Ki" => binary(1),
        "Mi" => binary(2),
        "Gi" => binary(3),
        "Ti" => binary(4),
        "Pi" => binary(5),
        "Ei" => binary(6),
        s if s.starts_with('e') || s.starts_with('E') => {
            let exp = s[1..]
                .parse::<i32>()
                .map_err(|_| QuantityError::UnknownSuffix(raw.to_string()))?;
            if !(-30..=30).contains(&exp) {
                return Err(QuantityError::OutOfRange(raw.to_string()));
            }
            Ok((QuantityFormat::DecimalExponent, Scale::Decimal(exp)))
        }
        _ => Err(QuantityError::UnknownSuffix(raw.to_string())),
    }
}

fn pow10(exp: u32) -> Option<i128> {
    10i128.checked_pow(exp)
}
