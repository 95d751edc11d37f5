//! SCPI value formatting and reply parsing helpers.
//!
//! Instruments in this crate expect numbers in C `printf` notation
//! (`%e` renders `1.210000e+09`, `%.2e` renders `1.00e+00`), and answer
//! with plain text, optionally comma separated.

use crate::error::{ScpiError, ScpiResult};
use num_complex::Complex64;

/// Format `value` like C's `%.{precision}e`.
///
/// Rust's `{:e}` omits the exponent sign and padding (`1.21e9`); this keeps
/// the two-digit signed exponent the instruments document.
pub fn format_exponential(value: f64, precision: usize) -> String {
    let rendered = format!("{:.*e}", precision, value);
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        // inf / NaN have no exponent part
        return rendered;
    };
    match exponent.parse::<i32>() {
        Ok(exp) => {
            let sign = if exp < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exp.abs())
        }
        Err(_) => rendered,
    }
}

/// Parse a floating-point reply.
///
/// Handles the SCPI forms seen in practice: `+5.000000E+07`, `.75E-9`, `30000`.
pub fn parse_f64(command: &str, reply: &str) -> ScpiResult<f64> {
    reply
        .trim()
        .parse::<f64>()
        .map_err(|_| ScpiError::parse(command, reply, "a floating-point number"))
}

/// Parse an integer reply that the instrument may send in scientific notation
/// (`2.010000E+02` for 201). The fractional part is truncated.
pub fn parse_int_via_float(command: &str, reply: &str) -> ScpiResult<i64> {
    let value = parse_f64(command, reply)?;
    if !value.is_finite() {
        return Err(ScpiError::parse(command, reply, "an integer"));
    }
    Ok(value.trunc() as i64)
}

/// Parse a `real,imag` pair into a complex number. Extra fields are ignored.
pub fn parse_complex_pair(command: &str, reply: &str) -> ScpiResult<Complex64> {
    let mut fields = reply.trim().split(',').map(str::trim);
    let (Some(re), Some(im)) = (fields.next(), fields.next()) else {
        return Err(ScpiError::parse(command, reply, "a 'real,imag' pair"));
    };
    let re = re
        .parse::<f64>()
        .map_err(|_| ScpiError::parse(command, reply, "a 'real,imag' pair"))?;
    let im = im
        .parse::<f64>()
        .map_err(|_| ScpiError::parse(command, reply, "a 'real,imag' pair"))?;
    Ok(Complex64::new(re, im))
}

/// Split a comma separated reply into exactly `expected` trimmed fields.
pub fn split_fields(reply: &str, expected: usize) -> Option<Vec<String>> {
    let fields: Vec<String> = reply
        .trim()
        .split(',')
        .map(|field| field.trim().to_string())
        .collect();
    (fields.len() == expected).then_some(fields)
}

/// `count` evenly spaced values from `start` to `stop` inclusive.
pub fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count)
                .map(|i| if i == count - 1 { stop } else { start + step * i as f64 })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_exponential_matches_printf() {
        assert_eq!(format_exponential(1.21e9, 6), "1.210000e+09");
        assert_eq!(format_exponential(30e3, 6), "3.000000e+04");
        assert_eq!(format_exponential(1.0, 2), "1.00e+00");
        assert_eq!(format_exponential(-70.0, 3), "-7.000e+01");
        assert_eq!(format_exponential(0.005, 2), "5.00e-03");
        assert_eq!(format_exponential(0.0, 6), "0.000000e+00");
    }

    #[test]
    fn test_parse_f64_forms() {
        assert_eq!(parse_f64("STAR?", "+5.000000E+07\n").unwrap(), 5e7);
        assert_eq!(parse_f64("D?", ".75E-9").unwrap(), 0.75e-9);
        assert_eq!(parse_f64("STAR?", " 30000 ").unwrap(), 30000.0);
        assert!(matches!(
            parse_f64("STAR?", "ERR"),
            Err(ScpiError::Parse { .. })
        ));
    }

    #[test]
    fn test_parse_int_via_float() {
        assert_eq!(parse_int_via_float("POIN?", "2.010000E+02").unwrap(), 201);
        assert_eq!(parse_int_via_float("AVERFACT?", "16").unwrap(), 16);
        assert!(parse_int_via_float("POIN?", "").is_err());
    }

    #[test]
    fn test_parse_complex_pair() {
        let value = parse_complex_pair("CALC1:MARK1:Y?", "-1.5E-01, 2.25E-02").unwrap();
        assert_eq!(value, Complex64::new(-0.15, 0.0225));
        assert!(parse_complex_pair("CALC1:MARK1:Y?", "1.0").is_err());
        assert!(parse_complex_pair("CALC1:MARK1:Y?", "a,b").is_err());
    }

    #[test]
    fn test_split_fields() {
        assert_eq!(
            split_fields("HEWLETT PACKARD,8753E,0,7.10\n", 4).unwrap(),
            vec!["HEWLETT PACKARD", "8753E", "0", "7.10"]
        );
        assert!(split_fields("garbage", 4).is_none());
    }

    #[test]
    fn test_linspace() {
        assert_eq!(linspace(1.0, 3.0, 3), vec![1.0, 2.0, 3.0]);
        assert_eq!(linspace(5.0, 5.0, 3), vec![5.0, 5.0, 5.0]);
        assert_eq!(linspace(2.0, 9.0, 1), vec![2.0]);
        assert!(linspace(0.0, 1.0, 0).is_empty());
        let points = linspace(30e3, 6e9, 201);
        assert_eq!(points.len(), 201);
        assert_eq!(points[200], 6e9);
    }
}
