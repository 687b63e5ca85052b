//! The destination tree: an arena of zero-initialized byte blocks.
//!
//! Block 0 is the root, sized to the root mapping. Every other block is owned by
//! exactly one indirect slot, which stores the block's handle (its index in the
//! arena, native-endian, [`POINTER_SIZE`] bytes). The root is never referenced by a
//! slot, so a zero slot always means "not populated". Handles are never reused,
//! which keeps a stale handle from aliasing a newer block.

use crate::error::Error;
use crate::schema::POINTER_SIZE;

/// Handle of the root block.
pub const ROOT: usize = 0;

/// A byte position inside one block of a [`DestinationTree`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Addr {
    pub block: usize,
    pub offset: usize,
}

impl Addr {
    pub const fn new(block: usize, offset: usize) -> Self {
        Self { block, offset }
    }

    /// Start of `block`.
    pub const fn block_start(block: usize) -> Self {
        Self { block, offset: 0 }
    }

    /// The address `delta` bytes further into the same block.
    pub(crate) fn add(self, delta: usize) -> Result<Self, Error> {
        let offset = self
            .offset
            .checked_add(delta)
            .ok_or_else(|| Error::internal("address overflow"))?;
        Ok(Self { offset, ..self })
    }
}

/// Loaded data: the root block plus every indirect block reachable from it.
///
/// Returned by the `load_*` functions only when the whole document loaded. Read it
/// back through [`DestinationTree::view`], or at the byte level with the `read_*`
/// accessors and the offsets the schema declares.
#[derive(Clone, Debug, Default)]
pub struct DestinationTree {
    blocks: Vec<Option<Vec<u8>>>,
    live: usize,
}

fn zeroed(size: usize) -> Result<Vec<u8>, Error> {
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(size)
        .map_err(|_| Error::out_of_memory(size))?;
    bytes.resize(size, 0);
    Ok(bytes)
}

impl DestinationTree {
    /// A tree holding only a zeroed root block of `size` bytes.
    pub(crate) fn with_root(size: usize) -> Result<Self, Error> {
        let mut tree = Self::default();
        let root = tree.alloc(size)?;
        debug_assert_eq!(root, ROOT);
        Ok(tree)
    }

    /// Bytes of the root block (empty once the tree has been released).
    pub fn root_bytes(&self) -> &[u8] {
        self.block(ROOT).unwrap_or_default()
    }

    /// Bytes of a live block.
    pub fn block(&self, handle: usize) -> Option<&[u8]> {
        self.blocks.get(handle)?.as_deref()
    }

    /// Number of blocks currently allocated, root included.
    pub fn live_blocks(&self) -> usize {
        self.live
    }

    /// Allocate a zeroed block and return its handle.
    pub(crate) fn alloc(&mut self, size: usize) -> Result<usize, Error> {
        let bytes = zeroed(size)?;
        self.blocks
            .try_reserve(1)
            .map_err(|_| Error::out_of_memory(std::mem::size_of::<Vec<u8>>()))?;
        self.blocks.push(Some(bytes));
        self.live += 1;
        Ok(self.blocks.len() - 1)
    }

    /// Extend a block to `new_size` bytes. Existing bytes are kept, new ones are zero.
    pub(crate) fn grow(&mut self, handle: usize, new_size: usize) -> Result<(), Error> {
        let block = self
            .blocks
            .get_mut(handle)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::internal("grow of a released block"))?;
        if new_size > block.len() {
            let extra = new_size - block.len();
            block
                .try_reserve(extra)
                .map_err(|_| Error::out_of_memory(new_size))?;
            block.resize(new_size, 0);
        }
        Ok(())
    }

    /// Release a block. Returns false when it was already gone.
    pub(crate) fn release(&mut self, handle: usize) -> bool {
        match self.blocks.get_mut(handle).and_then(Option::take) {
            Some(_) => {
                self.live -= 1;
                true
            }
            None => false,
        }
    }

    fn bytes(&self, addr: Addr, len: usize) -> Result<&[u8], Error> {
        let block = self
            .block(addr.block)
            .ok_or_else(|| Error::internal("read from a released block"))?;
        addr.offset
            .checked_add(len)
            .and_then(|end| block.get(addr.offset..end))
            .ok_or_else(|| Error::internal("read past the end of a block"))
    }

    fn bytes_mut(&mut self, addr: Addr, len: usize) -> Result<&mut [u8], Error> {
        let block = self
            .blocks
            .get_mut(addr.block)
            .and_then(Option::as_mut)
            .ok_or_else(|| Error::internal("write to a released block"))?;
        addr.offset
            .checked_add(len)
            .and_then(|end| block.get_mut(addr.offset..end))
            .ok_or_else(|| Error::internal("write past the end of a block"))
    }

    /// Write the low `width` bytes of `value` at `addr` in native byte order.
    pub fn write_uint(&mut self, addr: Addr, value: u64, width: usize) -> Result<(), Error> {
        if width == 0 || width > 8 {
            return Err(Error::internal("scalar width not in 1..=8"));
        }
        let bytes = value.to_ne_bytes();
        let src = if cfg!(target_endian = "little") {
            &bytes[..width]
        } else {
            &bytes[8 - width..]
        };
        self.bytes_mut(addr, width)?.copy_from_slice(src);
        Ok(())
    }

    /// Copy raw bytes to `addr`.
    pub(crate) fn write_bytes(&mut self, addr: Addr, src: &[u8]) -> Result<(), Error> {
        self.bytes_mut(addr, src.len())?.copy_from_slice(src);
        Ok(())
    }

    /// Zero `len` bytes at `addr`.
    pub(crate) fn clear(&mut self, addr: Addr, len: usize) -> Result<(), Error> {
        self.bytes_mut(addr, len)?.fill(0);
        Ok(())
    }

    /// Read `width` bytes at `addr` as an unsigned integer, native byte order.
    pub fn read_uint(&self, addr: Addr, width: usize) -> Result<u64, Error> {
        if width == 0 || width > 8 {
            return Err(Error::internal("scalar width not in 1..=8"));
        }
        let src = self.bytes(addr, width)?;
        let mut bytes = [0u8; 8];
        if cfg!(target_endian = "little") {
            bytes[..width].copy_from_slice(src);
        } else {
            bytes[8 - width..].copy_from_slice(src);
        }
        Ok(u64::from_ne_bytes(bytes))
    }

    /// Read `width` bytes at `addr` as a sign-extended integer.
    pub fn read_int(&self, addr: Addr, width: usize) -> Result<i64, Error> {
        let raw = self.read_uint(addr, width)?;
        let shift = 64 - 8 * width as u32;
        Ok(((raw << shift) as i64) >> shift)
    }

    /// Read the block handle stored in an indirect slot; `None` for a null slot.
    pub fn read_pointer(&self, addr: Addr) -> Result<Option<usize>, Error> {
        let raw = self.read_uint(addr, POINTER_SIZE)?;
        if raw == 0 {
            return Ok(None);
        }
        usize::try_from(raw)
            .map(Some)
            .map_err(|_| Error::internal("block handle out of range"))
    }

    pub(crate) fn write_pointer(&mut self, addr: Addr, handle: Option<usize>) -> Result<(), Error> {
        self.write_uint(addr, handle.unwrap_or(0) as u64, POINTER_SIZE)
    }
}
