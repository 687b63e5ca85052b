//! Schema description: where every value of the document goes and how it is stored.
//!
//! A schema is a tree of [`SchemaNode`]s supplied by the caller. The root must be a
//! mapping; its `size` is the size of the root block of the [`crate::DestinationTree`].
//! Every node either lives inline at the offset its parent declares, or (when
//! `indirect`) in a separately allocated block whose handle occupies a
//! [`POINTER_SIZE`]-byte slot at that offset.

use std::collections::HashSet;

use crate::error::Error;

/// Width of the slot that holds a block handle for an indirect value.
pub const POINTER_SIZE: usize = std::mem::size_of::<u64>();

/// One expected value: its type, its byte size and whether it is stored indirectly.
#[derive(Clone, Debug, PartialEq)]
pub struct SchemaNode {
    /// What the value is.
    pub kind: SchemaKind,
    /// Byte size of one instance of the value (struct size for mappings, stride times
    /// length for fixed sequences, element stride for growable sequences).
    pub size: usize,
    /// The value is stored in its own block; the inline slot holds the block handle.
    pub indirect: bool,
}

/// Schema node variants.
#[derive(Clone, Debug, PartialEq)]
pub enum SchemaKind {
    /// Signed integer, `size` bytes wide.
    Int,
    /// Unsigned integer, `size` bytes wide.
    Uint,
    /// Boolean stored as 1 or 0 in `size` bytes.
    Bool,
    /// IEEE float, `size` is 4 or 8.
    Float,
    /// Named signed values.
    Enum(EnumSchema),
    /// Named bits combined with `|`.
    Flags(FlagsSchema),
    /// Text, NUL terminated.
    String(StringSchema),
    /// The value is consumed and discarded, whatever its shape.
    Ignore,
    /// Keyed structure; fields in declaration order.
    Mapping(Vec<Field>),
    /// Growable sequence whose element count lives in the enclosing mapping.
    Sequence {
        element: Box<SchemaNode>,
        count: CountField,
        min: usize,
        max: usize,
    },
    /// Sequence of at most `len` elements laid out back to back; no counter.
    FixedSequence { element: Box<SchemaNode>, len: usize },
}

/// A mapping entry: document key, placement and expected value.
#[derive(Clone, Debug, PartialEq)]
pub struct Field {
    /// Case-sensitive key, unique within its mapping.
    pub key: String,
    /// Byte offset of the value's slot within the mapping.
    pub offset: usize,
    /// Expected value.
    pub value: SchemaNode,
}

impl Field {
    pub fn new(key: impl Into<String>, offset: usize, value: SchemaNode) -> Self {
        Self {
            key: key.into(),
            offset,
            value,
        }
    }
}

/// Location of a sequence's element counter, relative to the enclosing mapping.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CountField {
    pub offset: usize,
    pub width: usize,
}

impl CountField {
    pub fn new(offset: usize, width: usize) -> Self {
        Self { offset, width }
    }
}

/// Named values for [`SchemaKind::Enum`].
#[derive(Clone, Debug, PartialEq)]
pub struct EnumSchema {
    pub values: Vec<(String, i64)>,
    /// Accept integer literals that do not match any name.
    pub allow_numeric: bool,
}

/// Named bits for [`SchemaKind::Flags`].
#[derive(Clone, Debug, PartialEq)]
pub struct FlagsSchema {
    pub bits: Vec<(String, u64)>,
    /// Accept integer literals among the names.
    pub allow_numeric: bool,
}

/// Length limits (in bytes, terminator excluded) for [`SchemaKind::String`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StringSchema {
    pub min: usize,
    pub max: usize,
}

impl SchemaNode {
    const fn new(kind: SchemaKind, size: usize) -> Self {
        Self {
            kind,
            size,
            indirect: false,
        }
    }

    pub fn int(width: usize) -> Self {
        Self::new(SchemaKind::Int, width)
    }

    pub fn uint(width: usize) -> Self {
        Self::new(SchemaKind::Uint, width)
    }

    pub fn boolean(width: usize) -> Self {
        Self::new(SchemaKind::Bool, width)
    }

    pub fn float(width: usize) -> Self {
        Self::new(SchemaKind::Float, width)
    }

    pub fn enumeration<'a>(
        width: usize,
        values: impl IntoIterator<Item = (&'a str, i64)>,
    ) -> Self {
        let values = values.into_iter().map(|(n, v)| (n.to_owned(), v)).collect();
        Self::new(
            SchemaKind::Enum(EnumSchema {
                values,
                allow_numeric: false,
            }),
            width,
        )
    }

    pub fn flags<'a>(width: usize, bits: impl IntoIterator<Item = (&'a str, u64)>) -> Self {
        let bits = bits.into_iter().map(|(n, v)| (n.to_owned(), v)).collect();
        Self::new(
            SchemaKind::Flags(FlagsSchema {
                bits,
                allow_numeric: false,
            }),
            width,
        )
    }

    /// Text in its own block, sized to the scalar plus a NUL terminator.
    pub fn string() -> Self {
        Self::new(
            SchemaKind::String(StringSchema {
                min: 0,
                max: usize::MAX,
            }),
            0,
        )
        .indirect()
    }

    /// Text stored inline in a `capacity`-byte buffer (terminator included).
    pub fn string_inline(capacity: usize) -> Self {
        Self::new(
            SchemaKind::String(StringSchema {
                min: 0,
                max: capacity.saturating_sub(1),
            }),
            capacity,
        )
    }

    pub const fn ignore() -> Self {
        Self::new(SchemaKind::Ignore, 0)
    }

    pub fn mapping(size: usize, fields: Vec<Field>) -> Self {
        Self::new(SchemaKind::Mapping(fields), size)
    }

    /// Growable sequence; its backing block grows one element at a time.
    pub fn sequence(element: SchemaNode, count: CountField) -> Self {
        let stride = element.slot_size();
        Self::new(
            SchemaKind::Sequence {
                element: Box::new(element),
                count,
                min: 0,
                max: usize::MAX,
            },
            stride,
        )
        .indirect()
    }

    /// Inline sequence of at most `len` elements.
    pub fn fixed_sequence(element: SchemaNode, len: usize) -> Self {
        let size = element.slot_size().saturating_mul(len);
        Self::new(
            SchemaKind::FixedSequence {
                element: Box::new(element),
                len,
            },
            size,
        )
    }

    /// Store this value in its own block.
    pub fn indirect(mut self) -> Self {
        self.indirect = true;
        self
    }

    /// Bound a string's length or a growable sequence's element count.
    pub fn with_limits(mut self, new_min: usize, new_max: usize) -> Self {
        match &mut self.kind {
            SchemaKind::String(s) => {
                s.min = new_min;
                s.max = new_max;
            }
            SchemaKind::Sequence { min, max, .. } => {
                *min = new_min;
                *max = new_max;
            }
            _ => {}
        }
        self
    }

    /// Accept integer literals for enum and flags values.
    pub fn allow_numeric(mut self) -> Self {
        match &mut self.kind {
            SchemaKind::Enum(e) => e.allow_numeric = true,
            SchemaKind::Flags(f) => f.allow_numeric = true,
            _ => {}
        }
        self
    }

    /// Bytes this value occupies inside its parent.
    pub fn slot_size(&self) -> usize {
        if self.indirect { POINTER_SIZE } else { self.size }
    }

    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            SchemaKind::Int => "int",
            SchemaKind::Uint => "uint",
            SchemaKind::Bool => "bool",
            SchemaKind::Float => "float",
            SchemaKind::Enum(_) => "enum",
            SchemaKind::Flags(_) => "flags",
            SchemaKind::String(_) => "string",
            SchemaKind::Ignore => "ignore",
            SchemaKind::Mapping(_) => "mapping",
            SchemaKind::Sequence { .. } => "sequence",
            SchemaKind::FixedSequence { .. } => "fixed sequence",
        }
    }

    pub(crate) fn is_growable_sequence(&self) -> bool {
        matches!(self.kind, SchemaKind::Sequence { .. })
    }

    /// Check the whole schema for authoring mistakes.
    ///
    /// Walks the tree with an explicit stack, so arbitrarily deep schemas are fine.
    pub fn validate(&self) -> Result<(), Error> {
        let mut pending: Vec<(&SchemaNode, &str)> = vec![(self, "<root>")];
        while let Some((node, path)) = pending.pop() {
            validate_node(node, path)?;
            match &node.kind {
                SchemaKind::Mapping(fields) => {
                    for field in fields {
                        pending.push((&field.value, field.key.as_str()));
                    }
                }
                SchemaKind::Sequence { element, .. }
                | SchemaKind::FixedSequence { element, .. } => {
                    pending.push((element.as_ref(), path));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn validate_node(node: &SchemaNode, path: &str) -> Result<(), Error> {
    let kind = node.kind_name();
    match &node.kind {
        SchemaKind::Int | SchemaKind::Uint | SchemaKind::Bool => check_width(node, path)?,
        SchemaKind::Float => {
            if node.size != 4 && node.size != 8 {
                return Err(Error::bad_schema(format!(
                    "{path}: float width {} must be 4 or 8",
                    node.size
                )));
            }
        }
        SchemaKind::Enum(e) => {
            check_width(node, path)?;
            let (lo, hi) = crate::codec::int_range(node.size);
            let out_of_range = |v: i64| (v as i128) < lo || (v as i128) > hi;
            if let Some((name, v)) = e.values.iter().find(|(_, v)| out_of_range(*v)) {
                return Err(Error::bad_schema(format!(
                    "{path}: enum value {name} = {v} does not fit {} bytes",
                    node.size
                )));
            }
        }
        SchemaKind::Flags(f) => {
            check_width(node, path)?;
            let max = crate::codec::uint_max(node.size);
            if let Some((name, v)) = f.bits.iter().find(|(_, v)| *v > max) {
                return Err(Error::bad_schema(format!(
                    "{path}: flag {name} = {v:#x} does not fit {} bytes",
                    node.size
                )));
            }
        }
        SchemaKind::String(s) => {
            if s.min > s.max {
                return Err(Error::bad_schema(format!(
                    "{path}: string min {} > max {}",
                    s.min, s.max
                )));
            }
            if !node.indirect && node.size == 0 {
                return Err(Error::bad_schema(format!(
                    "{path}: inline string needs room for its terminator"
                )));
            }
        }
        SchemaKind::Ignore => {
            if node.indirect {
                return Err(Error::bad_schema(format!("{path}: ignore cannot be indirect")));
            }
        }
        SchemaKind::Mapping(fields) => validate_mapping(node, fields, path)?,
        SchemaKind::Sequence { element, min, max, .. } => {
            if !node.indirect {
                return Err(Error::bad_schema(format!(
                    "{path}: growable sequence must be indirect"
                )));
            }
            if min > max {
                return Err(Error::bad_schema(format!("{path}: sequence min {min} > max {max}")));
            }
            check_element(element, path, kind)?;
            if node.size != element.slot_size() {
                return Err(Error::bad_schema(format!(
                    "{path}: sequence stride {} differs from element slot size {}",
                    node.size,
                    element.slot_size()
                )));
            }
        }
        SchemaKind::FixedSequence { element, len } => {
            if *len == 0 {
                return Err(Error::bad_schema(format!("{path}: fixed sequence length is 0")));
            }
            check_element(element, path, kind)?;
            if Some(node.size) != element.slot_size().checked_mul(*len) {
                return Err(Error::bad_schema(format!(
                    "{path}: fixed sequence size {} is not {len} elements of {} bytes",
                    node.size,
                    element.slot_size()
                )));
            }
        }
    }
    Ok(())
}

fn validate_mapping(node: &SchemaNode, fields: &[Field], path: &str) -> Result<(), Error> {
    if fields.is_empty() {
        return Err(Error::bad_schema(format!("{path}: mapping has no fields")));
    }
    let mut keys = HashSet::with_capacity(fields.len());
    for field in fields {
        if !keys.insert(field.key.as_str()) {
            return Err(Error::bad_schema(format!("{path}: duplicate field key {}", field.key)));
        }
        check_extent(field.offset, field.value.slot_size(), node.size, &field.key)?;
        if let SchemaKind::Sequence { count, .. } = &field.value.kind {
            if count.width == 0 || count.width > 8 {
                return Err(Error::bad_schema(format!(
                    "{}: count width {} not in 1..=8",
                    field.key, count.width
                )));
            }
            check_extent(count.offset, count.width, node.size, &field.key)?;
        }
    }
    Ok(())
}

fn check_element(element: &SchemaNode, path: &str, kind: &str) -> Result<(), Error> {
    match element.kind {
        SchemaKind::Sequence { .. } => Err(Error::bad_schema(format!(
            "{path}: {kind} element cannot be a growable sequence (no place for its count)"
        ))),
        SchemaKind::Ignore => Err(Error::bad_schema(format!(
            "{path}: {kind} element cannot be ignore"
        ))),
        _ => Ok(()),
    }
}

fn check_width(node: &SchemaNode, path: &str) -> Result<(), Error> {
    if node.size == 0 || node.size > 8 {
        return Err(Error::bad_schema(format!(
            "{path}: {} width {} not in 1..=8",
            node.kind_name(),
            node.size
        )));
    }
    Ok(())
}

fn check_extent(offset: usize, len: usize, size: usize, key: &str) -> Result<(), Error> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(()),
        _ => Err(Error::bad_schema(format!(
            "{key}: {len} bytes at offset {offset} exceed mapping size {size}"
        ))),
    }
}

/// Find the field for a document key (exact, case-sensitive match).
pub(crate) fn resolve_key(fields: &[Field], key: &str) -> Option<usize> {
    fields.iter().position(|f| f.key == key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_schema() -> SchemaNode {
        SchemaNode::mapping(
            24,
            vec![
                Field::new("id", 0, SchemaNode::int(4)),
                Field::new(
                    "tags",
                    16,
                    SchemaNode::sequence(SchemaNode::string(), CountField::new(8, 4)),
                ),
            ],
        )
    }

    #[test]
    fn valid_schema_passes() {
        tags_schema().validate().unwrap();
    }

    #[test]
    fn resolve_is_exact_and_case_sensitive() {
        let schema = tags_schema();
        let SchemaKind::Mapping(fields) = &schema.kind else {
            unreachable!()
        };
        assert_eq!(resolve_key(fields, "tags"), Some(1));
        assert_eq!(resolve_key(fields, "Tags"), None);
        assert_eq!(resolve_key(fields, "tag"), None);
    }

    #[test]
    fn sequence_stride_follows_element_storage() {
        let seq = SchemaNode::sequence(SchemaNode::string(), CountField::new(0, 4));
        assert_eq!(seq.size, POINTER_SIZE);
        let seq = SchemaNode::sequence(SchemaNode::int(2), CountField::new(0, 4));
        assert_eq!(seq.size, 2);
        assert_eq!(seq.slot_size(), POINTER_SIZE);
        let fixed = SchemaNode::fixed_sequence(SchemaNode::int(2), 3);
        assert_eq!(fixed.size, 6);
        assert_eq!(fixed.slot_size(), 6);
    }

    #[test]
    fn bad_widths_are_rejected() {
        for node in [SchemaNode::int(0), SchemaNode::uint(9), SchemaNode::float(2)] {
            let schema = SchemaNode::mapping(16, vec![Field::new("x", 0, node)]);
            assert!(matches!(schema.validate(), Err(Error::BadTypeInSchema { .. })));
        }
    }

    #[test]
    fn field_past_mapping_end_is_rejected() {
        let schema = SchemaNode::mapping(4, vec![Field::new("x", 2, SchemaNode::int(4))]);
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("exceed mapping size 4"), "{err}");
    }

    #[test]
    fn count_past_mapping_end_is_rejected() {
        let schema = SchemaNode::mapping(
            8,
            vec![Field::new(
                "s",
                0,
                SchemaNode::sequence(SchemaNode::int(1), CountField::new(8, 4)),
            )],
        );
        assert!(matches!(schema.validate(), Err(Error::BadTypeInSchema { .. })));
    }

    #[test]
    fn nested_growable_sequence_is_rejected() {
        let inner = SchemaNode::sequence(SchemaNode::int(1), CountField::new(0, 1));
        let schema = SchemaNode::mapping(
            16,
            vec![Field::new("s", 8, SchemaNode::sequence(inner, CountField::new(0, 4)))],
        );
        assert!(matches!(schema.validate(), Err(Error::BadTypeInSchema { .. })));
    }

    #[test]
    fn empty_mapping_and_duplicate_keys_are_rejected() {
        assert!(SchemaNode::mapping(4, vec![]).validate().is_err());
        let dup = SchemaNode::mapping(
            8,
            vec![Field::new("a", 0, SchemaNode::int(4)), Field::new("a", 4, SchemaNode::int(4))],
        );
        assert!(dup.validate().is_err());
    }

    #[test]
    fn enum_values_must_fit_width() {
        let node = SchemaNode::enumeration(1, [("small", 1), ("huge", 1000)]);
        let schema = SchemaNode::mapping(1, vec![Field::new("e", 0, node)]);
        let err = schema.validate().unwrap_err();
        assert!(err.to_string().contains("huge"), "{err}");
    }
}
