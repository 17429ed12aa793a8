//! Rendering of floating-point numbers in the C "general" notation
//!
//! Grid files are consumed by solvers that read them back with `scanf`-like
//! routines, and historically written with `printf("%g")`. Rust's formatting
//! machinery has no equivalent of `%g`, so this module provides one.

use crate::Precision;
use std::fmt::{self, Display};

/// Number of significant digits used by `%g` when no precision is specified
pub const DEFAULT_SIGNIFICANT_DIGITS: usize = 6;

/// `Display` adapter that renders a number like C's `%.<digits>g`
///
/// Width and alignment flags of the formatter are honored, so
/// `format!("{:>7}", General::new(x))` matches `printf("%7g", x)`.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct General {
    /// Number to be displayed
    value: Precision,

    /// Number of significant digits, at least 1
    digits: usize,
}
//
impl General {
    /// Display a number with 6 significant digits, like `%g`
    pub fn new(value: Precision) -> Self {
        Self::with_digits(value, DEFAULT_SIGNIFICANT_DIGITS)
    }

    /// Display a number with a custom number of significant digits
    ///
    /// As in C, a precision of 0 is treated as 1.
    pub fn with_digits(value: Precision, digits: usize) -> Self {
        Self {
            value,
            digits: digits.max(1),
        }
    }

    /// Render into a string without padding
    fn render(&self) -> String {
        let value = self.value;
        if value.is_nan() {
            return if value.is_sign_negative() { "-nan" } else { "nan" }.to_owned();
        }
        if value.is_infinite() {
            return if value < 0.0 { "-inf" } else { "inf" }.to_owned();
        }

        // Round to the requested number of significant digits first, the
        // decimal exponent must be taken after rounding (9.999995 -> 10)
        let digits = self.digits;
        let scientific = format!("{:.*e}", digits - 1, value);
        let (mantissa, exponent) = scientific
            .split_once('e')
            .expect("LowerExp output always contains an exponent");
        let exponent: i32 = exponent
            .parse()
            .expect("LowerExp exponent is always a valid integer");

        if exponent < -4 || exponent >= digits as i32 {
            let mantissa = strip_fraction_zeros(mantissa);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        } else {
            let decimals = (digits as i32 - 1 - exponent) as usize;
            strip_fraction_zeros(&format!("{value:.decimals$}")).to_owned()
        }
    }
}
//
impl Display for General {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(&self.render())
    }
}

/// Remove trailing zeros of the fractional part, and the point if it is left
/// alone. Integers are left untouched.
fn strip_fraction_zeros(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}
