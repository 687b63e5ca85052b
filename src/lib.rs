//! Schema-directed YAML loader over saphyr-parser events (no Node AST).
//!
//! The caller describes a byte layout with a [`SchemaNode`] tree: for every key
//! and sequence position, what type is expected, at which offset it lives, and
//! whether it is stored inline or in a block of its own. Loading pulls parser
//! events one at a time and writes each value straight into a [`DestinationTree`].
//!
//! Supported:
//! - Scalars: signed and unsigned integers of 1 to 8 bytes, booleans (YAML 1.1
//!   forms unless strict), floats, enumerations, `|`-separated flags, strings
//!   (inline buffers or separately allocated).
//! - Mappings, growable sequences with an external element counter, fixed
//!   sequences, and ignored subtrees, nested to any depth.
//!
//! Guarantees:
//! - No recursion: nesting is tracked on a heap-allocated frame stack.
//! - All or nothing: on error every partial allocation is released and only the
//!   error is returned.
//! - Anchors are accepted, aliases are rejected. One document per load.
//!
//! ```rust
//! use schema_saphyr::{CountField, Field, Options, SchemaNode};
//!
//! // struct { int32 id; uint32 tag_count; char **tags; }
//! let schema = SchemaNode::mapping(
//!     24,
//!     vec![
//!         Field::new("id", 0, SchemaNode::int(4)),
//!         Field::new(
//!             "tags",
//!             16,
//!             SchemaNode::sequence(SchemaNode::string(), CountField::new(8, 4)),
//!         ),
//!     ],
//! );
//!
//! let yaml = "{id: 42, tags: [a, bb]}";
//! let tree = schema_saphyr::load_from_str(yaml, &Options::default(), &schema).unwrap();
//! let root = tree.view(&schema);
//! assert_eq!(root.field("id").and_then(|v| v.as_i64()), Some(42));
//! let tags: Vec<&str> = root.field("tags").unwrap().iter().filter_map(|v| v.as_str()).collect();
//! assert_eq!(tags, ["a", "bb"]);
//! ```

#[macro_use]
mod macros;

mod alloc;
pub mod budget;
mod codec;
mod engine;
pub mod error;
mod events;
pub mod free;
pub mod location;
pub mod options;
mod parse_scalars;
pub mod schema;
mod stack;
mod tags;
pub mod tree;
pub mod view;

#[cfg(feature = "reader")]
mod buffered_input;

pub use budget::{check_yaml_budget, Budget, BudgetBreach, BudgetReport};
pub use error::Error;
pub use free::free_tree;
pub use location::Location;
pub use options::{DuplicateKeyPolicy, Options};
pub use schema::{
    CountField, EnumSchema, Field, FlagsSchema, SchemaKind, SchemaNode, StringSchema, POINTER_SIZE,
};
pub use tree::{Addr, DestinationTree, ROOT};
pub use view::Value;

use events::EventSource;

/// Load a single YAML document from a string.
///
/// The root of the document must be a mapping matching the root of `schema`.
/// A stream with no document yields a zeroed root block.
pub fn load_from_str(
    input: &str,
    options: &Options,
    schema: &SchemaNode,
) -> Result<DestinationTree, Error> {
    engine::load(options, schema, EventSource::for_str(input, options))
}

/// Load a single YAML document from UTF-8 bytes.
///
/// The schema is checked before the bytes are decoded.
pub fn load_from_slice(
    bytes: &[u8],
    options: &Options,
    schema: &SchemaNode,
) -> Result<DestinationTree, Error> {
    engine::check_schema(options, schema)?;
    let input = std::str::from_utf8(bytes).map_err(|err| Error::SourceInit {
        msg: format!("input is not valid UTF-8: {err}"),
    })?;
    load_from_str(input, options, schema)
}

/// Load a single YAML document from a reader, decoding it incrementally.
///
/// UTF-8 and BOM-marked UTF-16 are accepted. `Options::input_limit` caps the
/// number of decoded bytes; reading past it fails with [`Error::Io`].
#[cfg(feature = "reader")]
pub fn load_from_reader<R: std::io::Read>(
    reader: R,
    options: &Options,
    schema: &SchemaNode,
) -> Result<DestinationTree, Error> {
    engine::load(options, schema, EventSource::for_reader(reader, options))
}

/// Load a single YAML document from a file.
///
/// The schema is checked before the file is opened.
#[cfg(feature = "reader")]
pub fn load_from_file<P: AsRef<std::path::Path>>(
    path: P,
    options: &Options,
    schema: &SchemaNode,
) -> Result<DestinationTree, Error> {
    engine::check_schema(options, schema)?;
    let path = path.as_ref();
    let file = std::fs::File::open(path).map_err(|cause| {
        diag!(options, log::Level::Error, "Load: cannot open {}: {cause}", path.display());
        Error::FileOpen {
            path: path.to_path_buf(),
            cause,
        }
    })?;
    load_from_reader(file, options, schema)
}
