//! Typed attribute values to little-endian wire bytes.

use crate::{ConfigError, ConfigNode, Result};

/// How an attribute's text is interpreted before it is written to a frame.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttrKind {
    /// `true`/`false`, one byte.
    Bool,
    /// Signed 32-bit decimal.
    Int,
    /// Unsigned 32-bit, decimal or `0x` hex.
    Uint,
    /// 32-bit IEEE float.
    Float,
    /// ASCII bytes, unterminated.
    String,
}

/// Serialize attribute `attr` of `node` into exactly `width` bytes.
///
/// Whitespace inside numeric values is ignored. Values shorter than `width` are
/// zero-extended on the right; integers may be narrowed when the value still fits the
/// declared width, anything else that does not fit is a [`ConfigError::WidthOverflow`].
pub fn serialize(node: &ConfigNode, attr: &str, kind: AttrKind, width: usize) -> Result<Vec<u8>> {
    let raw = node
        .attr(attr)
        .ok_or_else(|| ConfigError::missing(node, attr))?;
    serialize_str(node, attr, raw, kind, width)
}

/// Like [`serialize`] for a value that did not come straight from an attribute.
pub fn serialize_str(
    node: &ConfigNode,
    field: &str,
    raw: &str,
    kind: AttrKind,
    width: usize,
) -> Result<Vec<u8>> {
    let malformed = || ConfigError::malformed(node, field, raw);
    let mut bytes = match kind {
        AttrKind::Bool => vec![u8::from(parse_bool(raw).ok_or_else(malformed)?)],
        AttrKind::Int => {
            let v = parse_int(raw).ok_or_else(malformed)?;
            let fits = width >= 4 || fits_width(i64::from(v), width);
            if !fits {
                return Err(overflow(node, field, 4, width));
            }
            v.to_le_bytes().to_vec()
        }
        AttrKind::Uint => {
            let v = parse_uint(raw).ok_or_else(malformed)?;
            let fits = width >= 4 || fits_width(i64::from(v), width);
            if !fits {
                return Err(overflow(node, field, 4, width));
            }
            v.to_le_bytes().to_vec()
        }
        AttrKind::Float => parse_float(raw)
            .ok_or_else(malformed)?
            .to_le_bytes()
            .to_vec(),
        AttrKind::String => {
            if !raw.is_ascii() {
                return Err(malformed());
            }
            raw.as_bytes().to_vec()
        }
    };
    let narrowable = matches!(kind, AttrKind::Int | AttrKind::Uint);
    if bytes.len() > width && !narrowable {
        return Err(overflow(node, field, bytes.len(), width));
    }
    bytes.resize(width, 0);
    Ok(bytes)
}

/// Parse attribute `attr` as a float, multiply by `scale`, round to nearest and write the
/// result as a `width`-byte little-endian integer.
pub fn serialize_scaled_float(
    node: &ConfigNode,
    attr: &str,
    scale: u32,
    width: usize,
) -> Result<Vec<u8>> {
    let raw = node
        .attr(attr)
        .ok_or_else(|| ConfigError::missing(node, attr))?;
    let value: f64 = strip_ws(raw)
        .parse()
        .map_err(|_| ConfigError::malformed(node, attr, raw))?;
    let scaled = (value * f64::from(scale)).round();
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return Err(ConfigError::malformed(node, attr, raw));
    }
    let n = scaled as i64;
    if width < 8 && !fits_width(n, width) {
        return Err(overflow(node, attr, 8, width));
    }
    let mut bytes = n.to_le_bytes().to_vec();
    bytes.resize(width, 0);
    Ok(bytes)
}

/// `true`/`false` in any letter case.
pub fn parse_bool(raw: &str) -> Option<bool> {
    let s = strip_ws(raw);
    if s.eq_ignore_ascii_case("true") {
        Some(true)
    } else if s.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

pub fn parse_int(raw: &str) -> Option<i32> {
    strip_ws(raw).parse().ok()
}

pub fn parse_float(raw: &str) -> Option<f32> {
    strip_ws(raw).parse().ok()
}

/// Decimal or `0x`-prefixed hex.
pub fn parse_uint(raw: &str) -> Option<u32> {
    parse_hexable(raw).and_then(|v| u32::try_from(v).ok())
}

pub fn parse_u16(raw: &str) -> Option<u16> {
    parse_hexable(raw).and_then(|v| u16::try_from(v).ok())
}

pub fn parse_u64(raw: &str) -> Option<u64> {
    parse_hexable(raw)
}

fn parse_hexable(raw: &str) -> Option<u64> {
    let s = strip_ws(raw);
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// Required hexable `u16` attribute.
pub(crate) fn attr_u16(node: &ConfigNode, attr: &str) -> Result<u16> {
    let raw = node
        .attr(attr)
        .ok_or_else(|| ConfigError::missing(node, attr))?;
    parse_u16(raw).ok_or_else(|| ConfigError::malformed(node, attr, raw))
}

/// Optional hexable `u16` attribute; present but unparsable is still an error.
pub(crate) fn opt_attr_u16(node: &ConfigNode, attr: &str) -> Result<Option<u16>> {
    node.attr(attr)
        .map(|raw| parse_u16(raw).ok_or_else(|| ConfigError::malformed(node, attr, raw)))
        .transpose()
}

fn strip_ws(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Whether `v` is representable in `width` bytes as either a signed or an unsigned value.
fn fits_width(v: i64, width: usize) -> bool {
    if width == 0 {
        return false;
    }
    let bits = (width * 8) as u32;
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << bits) - 1;
    (min..=max).contains(&v)
}

fn overflow(node: &ConfigNode, field: &str, needed: usize, width: usize) -> ConfigError {
    ConfigError::WidthOverflow {
        node: node.location(),
        field: field.to_string(),
        needed,
        width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(value: &str) -> ConfigNode {
        ConfigNode::new("X").with_attr("value", value)
    }

    #[test]
    fn scaled_float_counts_per_unit() {
        let bytes = serialize_scaled_float(&v("1.5"), "value", 100_000, 4).unwrap();
        assert_eq!(bytes, 150_000u32.to_le_bytes());
    }

    #[test]
    fn scaled_float_rounds_to_nearest() {
        let bytes = serialize_scaled_float(&v("0.0000051"), "value", 100_000, 4).unwrap();
        assert_eq!(bytes, 1u32.to_le_bytes());
        let neg = serialize_scaled_float(&v("-2"), "value", 10, 2).unwrap();
        assert_eq!(neg, (-20i16).to_le_bytes());
    }

    #[test]
    fn whitespace_is_stripped_from_numbers() {
        let bytes = serialize(&v(" 1 000 "), "value", AttrKind::Int, 4).unwrap();
        assert_eq!(bytes, 1000i32.to_le_bytes());
    }

    #[test]
    fn zero_extends_on_the_right() {
        let bytes = serialize(&v("-1"), "value", AttrKind::Int, 6).unwrap();
        assert_eq!(bytes, vec![0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
        let b = serialize(&v("TRUE"), "value", AttrKind::Bool, 2).unwrap();
        assert_eq!(b, vec![1, 0]);
    }

    #[test]
    fn integers_narrow_when_they_fit() {
        assert_eq!(serialize(&v("200"), "value", AttrKind::Uint, 1).unwrap(), vec![200]);
        assert_eq!(serialize(&v("-3"), "value", AttrKind::Int, 2).unwrap(), vec![0xFD, 0xFF]);
        assert_eq!(serialize(&v("0x1234"), "value", AttrKind::Uint, 2).unwrap(), vec![0x34, 0x12]);
        let err = serialize(&v("300"), "value", AttrKind::Uint, 1).unwrap_err();
        assert!(matches!(err, ConfigError::WidthOverflow { needed: 4, width: 1, .. }));
    }

    #[test]
    fn float_and_string_never_truncate() {
        let err = serialize(&v("1.0"), "value", AttrKind::Float, 2).unwrap_err();
        assert!(matches!(err, ConfigError::WidthOverflow { .. }));
        let err = serialize(&v("AXIS-12"), "value", AttrKind::String, 4).unwrap_err();
        assert!(matches!(err, ConfigError::WidthOverflow { needed: 7, width: 4, .. }));
        let ok = serialize(&v("AB"), "value", AttrKind::String, 4).unwrap();
        assert_eq!(ok, b"AB\0\0");
    }

    #[test]
    fn missing_and_malformed_carry_the_node_path() {
        let node = ConfigNode::new("Drive");
        let err = serialize(&node, "value", AttrKind::Int, 4).unwrap_err();
        assert_eq!(err.to_string(), "/Drive: missing value");
        let err = serialize(&v("yes"), "value", AttrKind::Bool, 1).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedValue { .. }));
    }

    #[test]
    fn hexable_parsing() {
        assert_eq!(parse_u16("0xFFFF"), Some(0xFFFF));
        assert_eq!(parse_u16("65536"), None);
        assert_eq!(parse_u64("0xFFFF000000000000"), Some(0xFFFF_0000_0000_0000));
        assert_eq!(parse_uint("12"), Some(12));
        assert_eq!(parse_uint("-1"), None);
    }
}
