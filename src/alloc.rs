//! Allocation manager: blocks for indirect values and growth of sequence storage.

use crate::error::Error;
use crate::schema::{SchemaKind, SchemaNode};
use crate::stack::SequenceState;
use crate::tree::{Addr, DestinationTree};

/// Allocate a zeroed block of `size` bytes, link it from `slot` and return its start.
///
/// The handle reaches the slot only once the block exists.
pub(crate) fn alloc_indirect(
    tree: &mut DestinationTree,
    slot: Addr,
    size: usize,
) -> Result<Addr, Error> {
    let handle = tree.alloc(size)?;
    if let Err(err) = tree.write_pointer(slot, Some(handle)) {
        tree.release(handle);
        return Err(err);
    }
    Ok(Addr::block_start(handle))
}

/// Bytes the block of an indirect `node` needs for a scalar of `text`.
pub(crate) fn indirect_size(node: &SchemaNode, text: &str) -> Result<usize, Error> {
    match node.kind {
        SchemaKind::String(_) => text
            .len()
            .checked_add(1)
            .ok_or_else(|| Error::out_of_memory(usize::MAX)),
        _ => Ok(node.size),
    }
}

/// Reserve storage for the next element of `seq` and return its address.
///
/// A growable sequence allocates its backing block on the first element and
/// extends it afterwards; elements already written stay where they are. A fixed
/// sequence has all of its storage from the start.
pub(crate) fn reserve_element(
    tree: &mut DestinationTree,
    seq: &mut SequenceState<'_>,
) -> Result<Addr, Error> {
    let offset = seq
        .stride
        .checked_mul(seq.count)
        .ok_or_else(|| Error::out_of_memory(usize::MAX))?;
    let data = match seq.data {
        Some(data) => {
            if seq.count_field.is_some() {
                let needed = offset
                    .checked_add(seq.stride)
                    .ok_or_else(|| Error::out_of_memory(usize::MAX))?;
                tree.grow(data.block, needed)?;
            }
            data
        }
        None => {
            let data = alloc_indirect(tree, seq.slot, seq.stride)?;
            seq.data = Some(data);
            data
        }
    };
    data.add(offset)
}
