//! Schema-guided read access to a loaded tree.

use crate::schema::{resolve_key, SchemaKind, SchemaNode};
use crate::tree::{Addr, DestinationTree, ROOT};

/// One value inside a [`DestinationTree`], typed by its schema node.
///
/// Accessors return `None` when the value is of another kind, or is an indirect
/// value that was never populated.
#[derive(Clone, Copy, Debug)]
pub struct Value<'t> {
    tree: &'t DestinationTree,
    node: &'t SchemaNode,
    slot: Addr,
    container: Addr,
    /// The value's storage starts at `slot` even if the node is indirect.
    in_place: bool,
}

impl DestinationTree {
    /// View the root mapping through `schema`, which must be the schema used to load.
    pub fn view<'t>(&'t self, schema: &'t SchemaNode) -> Value<'t> {
        Value {
            tree: self,
            node: schema,
            slot: Addr::block_start(ROOT),
            container: Addr::block_start(ROOT),
            in_place: true,
        }
    }
}

impl<'t> Value<'t> {
    pub fn schema(&self) -> &'t SchemaNode {
        self.node
    }

    /// Where the value's bytes start (following the block handle of an indirect
    /// value). `None` for a null indirect value. The root mapping always lives
    /// in block 0.
    pub fn addr(&self) -> Option<Addr> {
        if self.node.indirect && !self.in_place {
            let handle = self.tree.read_pointer(self.slot).ok()??;
            Some(Addr::block_start(handle))
        } else {
            Some(self.slot)
        }
    }

    /// True for an indirect value whose slot was never filled.
    pub fn is_null(&self) -> bool {
        self.addr().is_none()
    }

    /// Mapping field by key.
    pub fn field(&self, key: &str) -> Option<Value<'t>> {
        let SchemaKind::Mapping(fields) = &self.node.kind else {
            return None;
        };
        let field = &fields[resolve_key(fields, key)?];
        let base = self.addr()?;
        Some(Value {
            tree: self.tree,
            node: &field.value,
            slot: base.add(field.offset).ok()?,
            container: base,
            in_place: false,
        })
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self.node.kind {
            SchemaKind::Int | SchemaKind::Enum(_) => {
                self.tree.read_int(self.addr()?, self.node.size).ok()
            }
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self.node.kind {
            SchemaKind::Uint | SchemaKind::Flags(_) => {
                self.tree.read_uint(self.addr()?, self.node.size).ok()
            }
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.node.kind {
            SchemaKind::Bool => Some(self.tree.read_uint(self.addr()?, self.node.size).ok()? != 0),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        let SchemaKind::Float = self.node.kind else {
            return None;
        };
        let at = self.addr()?;
        if self.node.size == 4 {
            let bits = self.tree.read_uint(at, 4).ok()? as u32;
            Some(f64::from(f32::from_bits(bits)))
        } else {
            Some(f64::from_bits(self.tree.read_uint(at, 8).ok()?))
        }
    }

    /// Text up to the terminator.
    pub fn as_str(&self) -> Option<&'t str> {
        let SchemaKind::String(_) = self.node.kind else {
            return None;
        };
        let at = self.addr()?;
        let block = self.tree.block(at.block)?;
        let end = if self.node.indirect {
            block.len()
        } else {
            at.offset.checked_add(self.node.size)?.min(block.len())
        };
        let bytes = block.get(at.offset..end)?;
        let len = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
        std::str::from_utf8(&bytes[..len]).ok()
    }

    /// Number of elements: the stored counter for a growable sequence, the
    /// declared length for a fixed one.
    pub fn len(&self) -> Option<usize> {
        match &self.node.kind {
            SchemaKind::Sequence { count, .. } => {
                let at = self.container.add(count.offset).ok()?;
                usize::try_from(self.tree.read_uint(at, count.width).ok()?).ok()
            }
            SchemaKind::FixedSequence { len, .. } => Some(*len),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len().is_none_or(|n| n == 0)
    }

    /// Sequence element by index.
    pub fn get(&self, index: usize) -> Option<Value<'t>> {
        let element = match &self.node.kind {
            SchemaKind::Sequence { element, .. } | SchemaKind::FixedSequence { element, .. } => {
                element.as_ref()
            }
            _ => return None,
        };
        if index >= self.len()? {
            return None;
        }
        let at = self.addr()?.add(index.checked_mul(element.slot_size())?).ok()?;
        Some(Value {
            tree: self.tree,
            node: element,
            slot: at,
            container: at,
            in_place: false,
        })
    }

    /// Sequence elements in order; empty for anything else.
    pub fn iter(&self) -> impl Iterator<Item = Value<'t>> + use<'t> {
        let this = *self;
        (0..self.len().unwrap_or(0)).map_while(move |i| this.get(i))
    }
}
