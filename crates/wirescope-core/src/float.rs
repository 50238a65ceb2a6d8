//! IEEE-754 rendering and hex-float parsing.
//!
//! The disassembler wants fixed-width fields printed as decimal floats
//! whenever they plausibly are floats, but only if the text re-parses to
//! the exact bit pattern. The formatter here guarantees that: shortest
//! round-trip decimal first, a `0x…p…` hex literal if the decimal ever
//! fails to round-trip, and `None` for bit patterns whose exponents say
//! "this probably isn't a float at all".

/// Formats a 64-bit pattern as a float literal, or `None` when the caller
/// should print it as an integer instead.
///
/// Infinities and NaNs are the caller's responsibility. `known_float`
/// disables the doesn't-look-like-a-float exponent heuristic, for fields a
/// schema declares as floating point.
pub(crate) fn format_f64(bits: u64, known_float: bool) -> Option<String> {
    if bits == 0 {
        return Some("0.0".to_string());
    }
    if bits == 1 << 63 {
        return Some("-0.0".to_string());
    }

    let biased = ((bits >> 52) & 0x7ff) as i64;
    let exp = biased - 1023;
    // Extreme exponents (including subnormals) indicate the field probably
    // holds an integer that merely landed on wire type I64.
    if !known_float && exp.unsigned_abs() >= 1023 {
        return None;
    }

    let value = f64::from_bits(bits);
    if !value.is_finite() {
        return None;
    }

    let decimal = shortest_decimal(format!("{value:e}"));
    match decimal.parse::<f64>() {
        Ok(parsed) if parsed.to_bits() == bits => Some(decimal),
        _ => Some(hex_literal(
            bits >> 63 == 1,
            exp,
            bits & ((1 << 52) - 1),
            52,
            biased == 0,
            -1022,
        )),
    }
}

/// The 32-bit counterpart of [`format_f64`].
pub(crate) fn format_f32(bits: u32, known_float: bool) -> Option<String> {
    if bits == 0 {
        return Some("0.0".to_string());
    }
    if bits == 1 << 31 {
        return Some("-0.0".to_string());
    }

    let biased = i64::from((bits >> 23) & 0xff);
    let exp = biased - 127;
    if !known_float && exp.unsigned_abs() >= 127 {
        return None;
    }

    let value = f32::from_bits(bits);
    if !value.is_finite() {
        return None;
    }

    let decimal = shortest_decimal(format!("{value:e}"));
    match decimal.parse::<f32>() {
        Ok(parsed) if parsed.to_bits() == bits => Some(decimal),
        _ => Some(hex_literal(
            bits >> 31 == 1,
            exp,
            u64::from(bits & ((1 << 23) - 1)),
            23,
            biased == 0,
            -126,
        )),
    }
}

/// Reshapes Rust's exponent formatting (`1.5e3`) into the language's float
/// syntax: positional for decimal exponents in -4..21, exponent form
/// otherwise, always with a decimal point and never a `+`.
fn shortest_decimal(exp_form: String) -> String {
    let (mant, exp) = exp_form.split_once('e').expect("LowerExp always has an exponent");
    let exp: i32 = exp.parse().expect("exponent is an integer");

    let mut out = if (-4..21).contains(&exp) {
        positional(mant, exp)
    } else {
        format!("{mant}e{exp}")
    };

    if !out.contains('.') {
        match out.find('e') {
            Some(e) => out.replace_range(e..=e, ".0e"),
            None => out.push_str(".0"),
        }
    }
    out
}

/// Expands a `d.dddd` mantissa and decimal exponent into positional form.
fn positional(mant: &str, exp: i32) -> String {
    let (sign, unsigned) = match mant.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", mant),
    };
    let digits: String = unsigned.chars().filter(|&c| c != '.').collect();
    let point = exp + 1;

    let mut out = String::from(sign);
    if point <= 0 {
        out.push_str("0.");
        for _ in 0..-point {
            out.push('0');
        }
        out.push_str(&digits);
    } else if point as usize >= digits.len() {
        out.push_str(&digits);
        for _ in 0..(point as usize - digits.len()) {
            out.push('0');
        }
    } else {
        out.push_str(&digits[..point as usize]);
        out.push('.');
        out.push_str(&digits[point as usize..]);
    }
    out
}

/// Renders a bit pattern as a `0x1.<frac>p<exp>` literal.
fn hex_literal(
    negative: bool,
    exp: i64,
    mantissa: u64,
    mant_bits: u32,
    subnormal: bool,
    min_exp: i64,
) -> String {
    let nibbles = mant_bits.div_ceil(4);
    let frac = mantissa << (nibbles * 4 - mant_bits);
    let mut hex = format!("{frac:0width$x}", width = nibbles as usize);
    while hex.len() > 1 && hex.ends_with('0') {
        hex.pop();
    }
    let (lead, exp) = if subnormal { ("0", min_exp) } else { ("1", exp) };
    format!("{}0x{lead}.{hex}p{exp}", if negative { "-" } else { "" })
}

/// Parses a `0x<int>.<frac>[p<exp>]` literal. A missing exponent means
/// `p0`. Returns `None` for out-of-range exponents or absurdly long
/// mantissas.
pub(crate) fn parse_hex_f64(literal: &str) -> Option<f64> {
    let (negative, rest) = match literal.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, literal),
    };
    let rest = rest.strip_prefix("0x")?;

    let (mant, exp) = match rest.split_once(['p', 'P']) {
        Some((mant, exp)) => (mant, exp.parse::<i32>().ok()?),
        None => (rest, 0),
    };
    let (int_part, frac_part) = mant.split_once('.')?;

    let digits = format!("{int_part}{frac_part}");
    let digits = digits.trim_start_matches('0');
    if digits.len() > 32 {
        return None;
    }
    let mantissa = if digits.is_empty() {
        0
    } else {
        u128::from_str_radix(digits, 16).ok()?
    };

    let frac_nibbles = i32::try_from(frac_part.len()).ok()?;
    let scale = exp.checked_sub(frac_nibbles.checked_mul(4)?)?;

    // Power-of-two scaling is exact wherever the result is representable,
    // so the only rounding step is the u128-to-f64 conversion.
    let value = mantissa as f64 * 2f64.powi(scale);
    Some(if negative { -value } else { value })
}

/// The 32-bit counterpart of [`parse_hex_f64`].
pub(crate) fn parse_hex_f32(literal: &str) -> Option<f32> {
    parse_hex_f64(literal).map(|value| value as f32)
}
