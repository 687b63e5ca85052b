//! Schema-driven release of destination blocks.
//!
//! Safe on partially populated trees: a null slot is skipped, and a sequence
//! counter is never trusted beyond the storage that actually exists.

use log::Level;

use crate::error::Error;
use crate::options::Options;
use crate::schema::{SchemaKind, SchemaNode};
use crate::tree::{Addr, DestinationTree, ROOT};

fn may_own_blocks(node: &SchemaNode) -> bool {
    node.indirect
        || matches!(
            node.kind,
            SchemaKind::Mapping(_) | SchemaKind::FixedSequence { .. } | SchemaKind::Sequence { .. }
        )
}

/// Elements that fit in the storage from `data` to the end of its block.
fn capacity(tree: &DestinationTree, data: Addr, stride: usize) -> usize {
    if stride == 0 {
        return 0;
    }
    tree.block(data.block)
        .map_or(0, |b| b.len().saturating_sub(data.offset) / stride)
}

type Pending<'s> = Vec<(&'s SchemaNode, Addr, Addr)>;

/// Collect the handle of every block owned by the value of `node` stored at `slot`.
///
/// The walk only reads; blocks are released by the caller afterwards, so no slot
/// is read from a block that is already gone.
fn collect_blocks(
    tree: &DestinationTree,
    node: &SchemaNode,
    slot: Addr,
    container: Addr,
    out: &mut Vec<usize>,
) {
    drain(tree, vec![(node, slot, container)], out);
}

/// Like [`collect_blocks`] for the root mapping. Block 0 is the root's own
/// storage, also when the root schema is flagged indirect.
fn collect_root(tree: &DestinationTree, schema: &SchemaNode, out: &mut Vec<usize>) {
    let root = Addr::block_start(ROOT);
    let mut pending = Vec::new();
    push_owned(tree, schema, root, root, &mut pending);
    drain(tree, pending, out);
}

fn drain<'s>(tree: &DestinationTree, mut pending: Pending<'s>, out: &mut Vec<usize>) {
    while let Some((node, slot, container)) = pending.pop() {
        let target = if node.indirect {
            match tree.read_pointer(slot) {
                Ok(Some(handle)) if handle != ROOT && tree.block(handle).is_some() => {
                    out.push(handle);
                    Addr::block_start(handle)
                }
                _ => continue,
            }
        } else {
            slot
        };
        push_owned(tree, node, target, container, &mut pending);
    }
}

/// Queue the children of the value whose storage starts at `target`.
fn push_owned<'s>(
    tree: &DestinationTree,
    node: &'s SchemaNode,
    target: Addr,
    container: Addr,
    pending: &mut Pending<'s>,
) {
    let (element, count) = match &node.kind {
        SchemaKind::Mapping(fields) => {
            for field in fields.iter().filter(|f| may_own_blocks(&f.value)) {
                if let Ok(at) = target.add(field.offset) {
                    pending.push((&field.value, at, target));
                }
            }
            return;
        }
        SchemaKind::Sequence { element, count, .. } => {
            let stored = container
                .add(count.offset)
                .and_then(|at| tree.read_uint(at, count.width))
                .unwrap_or(0);
            let stored = usize::try_from(stored).unwrap_or(usize::MAX);
            (element.as_ref(), stored)
        }
        SchemaKind::FixedSequence { element, len } => (element.as_ref(), *len),
        _ => return,
    };
    if !may_own_blocks(element) {
        return;
    }
    let stride = element.slot_size();
    let count = count.min(capacity(tree, target, stride));
    for i in 0..count {
        if let Ok(at) = target.add(i * stride) {
            pending.push((element, at, target));
        }
    }
}

/// Release every block reachable through `schema` from the root, then the root.
///
/// Returns the number of blocks released. Afterwards the tree is empty.
pub fn free_tree(options: &Options, schema: &SchemaNode, tree: &mut DestinationTree) -> usize {
    let mut handles = Vec::new();
    if tree.block(ROOT).is_some() {
        collect_root(tree, schema, &mut handles);
        handles.push(ROOT);
    }
    let released = handles.into_iter().filter(|h| tree.release(*h)).count();
    diag!(options, Level::Debug, "FREE: released {released} blocks");
    released
}

/// Release whatever the value at `slot` owns and zero the slot, so the value can
/// be loaded again. For a growable sequence the counter in `container` is reset too.
pub(crate) fn release_value(
    options: &Options,
    tree: &mut DestinationTree,
    node: &SchemaNode,
    slot: Addr,
    container: Addr,
) -> Result<(), Error> {
    let mut handles = Vec::new();
    collect_blocks(tree, node, slot, container, &mut handles);
    let released = handles.into_iter().filter(|h| tree.release(*h)).count();
    tree.clear(slot, node.slot_size())?;
    if let SchemaKind::Sequence { count, .. } = &node.kind {
        tree.clear(container.add(count.offset)?, count.width)?;
    }
    diag!(options, Level::Debug, "FREE: replaced value released {released} blocks");
    Ok(())
}
