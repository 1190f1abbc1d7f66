// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Color values as they arrive in style properties.

use serde_json::Value;

use tether_core::error::{Result, TetherError};

/// 8-bit RGBA.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Packed as Android's `0xAARRGGBB` color int.
    pub fn to_argb(self) -> i32 {
        i32::from_be_bytes([self.a, self.r, self.g, self.b])
    }

    /// Components scaled to `0.0..=1.0`, as UIKit wants them.
    pub fn to_unit(self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a].map(|c| f64::from(c) / 255.0)
    }
}

/// Parse `#rgb`, `#rrggbb`, `#rrggbbaa`, `"transparent"`, or a packed
/// `0xAARRGGBB` integer.
pub fn parse_color(value: &Value) -> Result<Rgba> {
    match value {
        Value::String(s) if s == "transparent" => Ok(Rgba { r: 0, g: 0, b: 0, a: 0 }),
        Value::String(s) => parse_hex(s),
        Value::Number(n) => {
            let packed = n
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| invalid(value))?;
            let [a, r, g, b] = packed.to_be_bytes();
            Ok(Rgba { r, g, b, a })
        }
        _ => Err(invalid(value)),
    }
}

fn parse_hex(s: &str) -> Result<Rgba> {
    let digits = s
        .strip_prefix('#')
        .filter(|d| d.chars().all(|c| c.is_ascii_hexdigit()))
        .ok_or_else(|| invalid(&Value::from(s)))?;

    let channel = |i: usize, width: usize| -> Result<u8> {
        let raw = u8::from_str_radix(&digits[i * width..(i + 1) * width], 16)
            .map_err(|_| invalid(&Value::from(s)))?;
        // #rgb doubles each digit: f -> ff.
        Ok(if width == 1 { raw * 17 } else { raw })
    };

    match digits.len() {
        3 => Ok(Rgba {
            r: channel(0, 1)?,
            g: channel(1, 1)?,
            b: channel(2, 1)?,
            a: 255,
        }),
        6 | 8 => Ok(Rgba {
            r: channel(0, 2)?,
            g: channel(1, 2)?,
            b: channel(2, 2)?,
            a: if digits.len() == 8 { channel(3, 2)? } else { 255 },
        }),
        _ => Err(invalid(&Value::from(s))),
    }
}

fn invalid(value: &Value) -> TetherError {
    TetherError::InvalidArguments(format!("not a color: {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_and_long_hex() {
        assert_eq!(
            parse_color(&json!("#f00")).expect("color"),
            Rgba { r: 255, g: 0, b: 0, a: 255 }
        );
        assert_eq!(
            parse_color(&json!("#10203040")).expect("color"),
            Rgba { r: 0x10, g: 0x20, b: 0x30, a: 0x40 }
        );
    }

    #[test]
    fn packed_integer_and_transparent() {
        let c = parse_color(&json!(0x80FF0000_u32)).expect("color");
        assert_eq!(c, Rgba { r: 255, g: 0, b: 0, a: 0x80 });
        assert_eq!(c.to_argb(), 0x80FF0000_u32 as i32);
        assert_eq!(parse_color(&json!("transparent")).expect("color").a, 0);
    }

    #[test]
    fn garbage_is_invalid() {
        for bad in [json!("red"), json!("#12"), json!("#gggggg"), json!(true), json!(-1)] {
            assert!(matches!(
                parse_color(&bad),
                Err(TetherError::InvalidArguments(_))
            ));
        }
    }

    #[test]
    fn unit_components() {
        let [r, _, _, a] = parse_color(&json!("#ff000000")).expect("color").to_unit();
        assert_eq!(r, 1.0);
        assert_eq!(a, 0.0);
    }
}
