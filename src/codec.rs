//! Scalar codecs: event text to fixed-width binary, with range checks.

use crate::error::Error;
use crate::options::Options;
use crate::parse_scalars::{
    parse_int_signed, parse_int_unsigned, parse_yaml11_bool, parse_yaml12_f32, parse_yaml12_f64,
};
use crate::schema::{EnumSchema, FlagsSchema, SchemaKind, SchemaNode, StringSchema};
use crate::tags::can_parse_into_string;
use crate::tree::{Addr, DestinationTree};

/// Two's-complement range of a `width`-byte signed integer.
pub(crate) fn int_range(width: usize) -> (i128, i128) {
    let bits = (8 * width.clamp(1, 8)) as u32;
    let max = (1i128 << (bits - 1)) - 1;
    (-max - 1, max)
}

/// Largest value of a `width`-byte unsigned integer.
pub(crate) fn uint_max(width: usize) -> u64 {
    u64::MAX >> (64 - 8 * width.clamp(1, 8) as u32)
}

fn out_of_range(text: &str, node: &SchemaNode) -> Error {
    Error::invalid_value(format!(
        "`{text}` out of range for {}-byte {}",
        node.size,
        node.kind_name()
    ))
}

/// Parse `text` according to the scalar `node` and store it at `addr`.
///
/// For strings `addr` is the start of the inline buffer or of the block that was
/// allocated for the text.
pub(crate) fn read_scalar(
    options: &Options,
    node: &SchemaNode,
    text: &str,
    tag: Option<&str>,
    tree: &mut DestinationTree,
    addr: Addr,
) -> Result<(), Error> {
    let width = node.size;
    match &node.kind {
        SchemaKind::Int => {
            let v = read_int(options, node, text)?;
            tree.write_uint(addr, v as u64, width)
        }
        SchemaKind::Uint => {
            let v = parse_int_unsigned(text, options.leading_zero_octal)?;
            if v > uint_max(width) as u128 {
                return Err(out_of_range(text, node));
            }
            tree.write_uint(addr, v as u64, width)
        }
        SchemaKind::Bool => {
            let v = parse_yaml11_bool(text, options.strict_booleans)?;
            tree.write_uint(addr, u64::from(v), width)
        }
        SchemaKind::Float => {
            if width == 4 {
                tree.write_bytes(addr, &parse_yaml12_f32(text)?.to_ne_bytes())
            } else {
                tree.write_bytes(addr, &parse_yaml12_f64(text)?.to_ne_bytes())
            }
        }
        SchemaKind::Enum(e) => {
            let v = read_enum(options, node, e, text)?;
            tree.write_uint(addr, v as u64, width)
        }
        SchemaKind::Flags(f) => {
            let v = read_flags(options, node, f, text)?;
            tree.write_uint(addr, v, width)
        }
        SchemaKind::String(s) => read_string(node, s, text, tag, tree, addr),
        _ => Err(Error::internal("scalar codec for a non-scalar node")),
    }
}

fn read_int(options: &Options, node: &SchemaNode, text: &str) -> Result<i64, Error> {
    let v = parse_int_signed(text, options.leading_zero_octal)?;
    let (min, max) = int_range(node.size);
    if v < min || v > max {
        return Err(out_of_range(text, node));
    }
    Ok(v as i64)
}

fn read_enum(
    options: &Options,
    node: &SchemaNode,
    e: &EnumSchema,
    text: &str,
) -> Result<i64, Error> {
    if let Some((_, v)) = e.values.iter().find(|(name, _)| name == text) {
        return Ok(*v);
    }
    if e.allow_numeric {
        return read_int(options, node, text);
    }
    Err(Error::invalid_value(format!("`{text}` is not a known enum value")))
}

fn read_flags(
    options: &Options,
    node: &SchemaNode,
    f: &FlagsSchema,
    text: &str,
) -> Result<u64, Error> {
    if text.trim().is_empty() {
        return Ok(0);
    }
    let mut bits = 0u64;
    for token in text.split('|').map(str::trim) {
        if let Some((_, v)) = f.bits.iter().find(|(name, _)| name == token) {
            bits |= v;
            continue;
        }
        if f.allow_numeric && !token.is_empty() {
            let v = parse_int_unsigned(token, options.leading_zero_octal)?;
            if v > uint_max(node.size) as u128 {
                return Err(out_of_range(token, node));
            }
            bits |= v as u64;
            continue;
        }
        return Err(Error::invalid_value(format!("`{token}` is not a known flag")));
    }
    Ok(bits)
}

fn read_string(
    node: &SchemaNode,
    limits: &StringSchema,
    text: &str,
    tag: Option<&str>,
    tree: &mut DestinationTree,
    addr: Addr,
) -> Result<(), Error> {
    if !can_parse_into_string(tag) {
        return Err(Error::invalid_value(format!(
            "scalar tagged {} cannot be loaded as a string",
            tag.unwrap_or_default()
        )));
    }
    if text.as_bytes().contains(&0) {
        return Err(Error::invalid_value("string contains a NUL byte"));
    }
    let len = text.len();
    if len < limits.min || len > limits.max {
        return Err(Error::invalid_value(format!(
            "string length {len} not in {}..={}",
            limits.min, limits.max
        )));
    }
    if !node.indirect && len >= node.size {
        return Err(Error::invalid_value(format!(
            "string of {len} bytes does not fit a {}-byte buffer",
            node.size
        )));
    }
    // Block or buffer is zeroed, so the terminator is already in place.
    tree.write_bytes(addr, text.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ROOT;

    fn load_one(
        node: &SchemaNode,
        text: &str,
        options: &Options,
    ) -> Result<DestinationTree, Error> {
        let mut tree = DestinationTree::with_root(16)?;
        read_scalar(options, node, text, None, &mut tree, Addr::block_start(ROOT))?;
        Ok(tree)
    }

    fn at0(tree: &DestinationTree, width: usize) -> i64 {
        tree.read_int(Addr::block_start(ROOT), width).unwrap()
    }

    #[test]
    fn ranges_follow_width() {
        assert_eq!(int_range(1), (-128, 127));
        assert_eq!(int_range(8), (i64::MIN as i128, i64::MAX as i128));
        assert_eq!(uint_max(2), 0xFFFF);
        assert_eq!(uint_max(8), u64::MAX);
    }

    #[test]
    fn int_bounds_per_width() {
        let opts = Options::default();
        for width in 1..=8usize {
            let node = SchemaNode::int(width);
            let (min, max) = int_range(width);
            assert_eq!(at0(&load_one(&node, &min.to_string(), &opts).unwrap(), width), min as i64);
            assert_eq!(at0(&load_one(&node, &max.to_string(), &opts).unwrap(), width), max as i64);
            assert!(load_one(&node, &(max + 1).to_string(), &opts).is_err());
            assert!(load_one(&node, &(min - 1).to_string(), &opts).is_err());
        }
    }

    #[test]
    fn uint_rejects_negative_and_overflow() {
        let opts = Options::default();
        let node = SchemaNode::uint(1);
        let tree = load_one(&node, "255", &opts).unwrap();
        assert_eq!(tree.read_uint(Addr::block_start(ROOT), 1).unwrap(), 255);
        assert!(load_one(&node, "256", &opts).is_err());
        assert!(load_one(&node, "-1", &opts).is_err());
    }

    #[test]
    fn enum_by_name_and_number() {
        let opts = Options::default();
        let node = SchemaNode::enumeration(1, [("red", 1), ("green", 2)]);
        assert_eq!(at0(&load_one(&node, "green", &opts).unwrap(), 1), 2);
        assert!(load_one(&node, "Green", &opts).is_err());
        assert!(load_one(&node, "7", &opts).is_err());
        let node = node.allow_numeric();
        assert_eq!(at0(&load_one(&node, "7", &opts).unwrap(), 1), 7);
        assert!(load_one(&node, "300", &opts).is_err());
    }

    #[test]
    fn flags_combine_with_pipe() {
        let opts = Options::default();
        let node = SchemaNode::flags(2, [("read", 1), ("write", 2), ("exec", 4)]);
        let tree = load_one(&node, "read | exec", &opts).unwrap();
        assert_eq!(tree.read_uint(Addr::block_start(ROOT), 2).unwrap(), 5);
        let tree = load_one(&node, "", &opts).unwrap();
        assert_eq!(tree.read_uint(Addr::block_start(ROOT), 2).unwrap(), 0);
        assert!(load_one(&node, "read||exec", &opts).is_err());
        assert!(load_one(&node, "read|0x10", &opts).is_err());
        let node = node.allow_numeric();
        let tree = load_one(&node, "read|0x10", &opts).unwrap();
        assert_eq!(tree.read_uint(Addr::block_start(ROOT), 2).unwrap(), 0x11);
    }

    #[test]
    fn inline_string_needs_room_for_terminator() {
        let opts = Options::default();
        let node = SchemaNode::string_inline(4);
        let tree = load_one(&node, "abc", &opts).unwrap();
        assert_eq!(&tree.root_bytes()[..4], b"abc\0");
        assert!(load_one(&node, "abcd", &opts).is_err());
    }

    #[test]
    fn string_rejects_non_string_tags() {
        let mut tree = DestinationTree::with_root(8).unwrap();
        let node = SchemaNode::string_inline(8);
        let err = read_scalar(
            &Options::default(),
            &node,
            "12",
            Some("tag:yaml.org,2002:int"),
            &mut tree,
            Addr::block_start(ROOT),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidValue { .. }));
    }

    #[test]
    fn floats_store_native_bits() {
        let opts = Options::default();
        let tree = load_one(&SchemaNode::float(4), "1.5", &opts).unwrap();
        assert_eq!(&tree.root_bytes()[..4], &1.5f32.to_ne_bytes());
        let tree = load_one(&SchemaNode::float(8), "-2.25", &opts).unwrap();
        assert_eq!(&tree.root_bytes()[..8], &(-2.25f64).to_ne_bytes());
    }
}
