//! # Snapshot Memory
//!
//! Random-access reads over a frozen process image.
//!
//! The engine only ever talks to memory through [`MemoryAccessor`]. A read
//! either returns exactly the requested bytes or fails immediately; there is
//! nothing to retry because the snapshot cannot change underneath us.
//!
//! Two kinds of failure are kept apart:
//!
//! - [`AccessError::Fault`]: the range is not backed by the snapshot. This is
//!   local to one region and is recorded as corruption on that region.
//! - [`AccessError::Unavailable`]: the accessor cannot serve anything. This is
//!   fatal to the whole operation.

use std::fs;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::error::{WalkError, WalkResult};
use crate::types::layout::read_uint;
use crate::types::{Address, ByteOrder, PointerWidth};

/// Error returned by a [`MemoryAccessor`] read
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError
{
    /// The requested range is not (fully) backed by the snapshot
    #[error("Memory fault reading {length} bytes at {address}")]
    Fault
    {
        /// First address of the failed read
        address: Address,
        /// Requested length
        length: u64,
    },

    /// The accessor cannot serve reads at all
    #[error("Memory unavailable: {0}")]
    Unavailable(String),
}

impl AccessError
{
    /// Convenience constructor for a fault
    pub fn fault(address: Address, length: u64) -> Self
    {
        AccessError::Fault { address, length }
    }

    /// Whether this error is local to the requested range
    pub fn is_fault(&self) -> bool
    {
        matches!(self, AccessError::Fault { .. })
    }
}

/// Result of a single memory read
pub type AccessResult<T> = std::result::Result<T, AccessError>;

/// Byte-level access to a frozen image
///
/// Implementations must be shareable across threads so independent images
/// can be walked in parallel; reads never mutate the snapshot.
pub trait MemoryAccessor: Send + Sync
{
    /// Read exactly `length` bytes starting at `address`
    fn read_bytes(&self, address: Address, length: u64) -> AccessResult<Vec<u8>>;

    /// Check that `[address, address + length)` is readable without
    /// materializing it
    ///
    /// The default implementation performs the read and discards the bytes.
    fn probe(&self, address: Address, length: u64) -> AccessResult<()>
    {
        self.read_bytes(address, length).map(|_| ())
    }

    /// Check that the accessor can serve reads at all
    ///
    /// Called once before any tree work so an unusable snapshot fails fast.
    fn check_available(&self) -> AccessResult<()>
    {
        Ok(())
    }
}

impl<M: MemoryAccessor + ?Sized> MemoryAccessor for &M
{
    fn read_bytes(&self, address: Address, length: u64) -> AccessResult<Vec<u8>>
    {
        (**self).read_bytes(address, length)
    }

    fn probe(&self, address: Address, length: u64) -> AccessResult<()>
    {
        (**self).probe(address, length)
    }

    fn check_available(&self) -> AccessResult<()>
    {
        (**self).check_available()
    }
}

/// Typed reads layered over any [`MemoryAccessor`]
///
/// Every method takes the byte order explicitly; nothing here guesses it.
pub trait MemoryReadExt: MemoryAccessor
{
    fn read_uint(&self, address: Address, width: u8, order: ByteOrder) -> AccessResult<u64>
    {
        let bytes = self.read_bytes(address, u64::from(width))?;
        Ok(read_uint(&bytes, order))
    }

    fn read_u8(&self, address: Address) -> AccessResult<u8>
    {
        let bytes = self.read_bytes(address, 1)?;
        Ok(bytes[0])
    }

    fn read_u16(&self, address: Address, order: ByteOrder) -> AccessResult<u16>
    {
        self.read_uint(address, 2, order).map(|v| v as u16)
    }

    fn read_u32(&self, address: Address, order: ByteOrder) -> AccessResult<u32>
    {
        self.read_uint(address, 4, order).map(|v| v as u32)
    }

    fn read_i32(&self, address: Address, order: ByteOrder) -> AccessResult<i32>
    {
        self.read_u32(address, order).map(|v| v as i32)
    }

    fn read_u64(&self, address: Address, order: ByteOrder) -> AccessResult<u64>
    {
        self.read_uint(address, 8, order)
    }

    /// Read a target pointer of the given width
    fn read_pointer(&self, address: Address, width: PointerWidth, order: ByteOrder) -> AccessResult<Address>
    {
        self.read_uint(address, width.bytes() as u8, order).map(Address::from)
    }

    /// Resolve a 32-bit self-relative pointer stored at `slot`
    ///
    /// A zero displacement is the null SRP and resolves to `None`.
    fn read_srp(&self, slot: Address, order: ByteOrder) -> AccessResult<Option<Address>>
    {
        let displacement = self.read_i32(slot, order)?;
        if displacement == 0 {
            return Ok(None);
        }
        slot.checked_offset(i64::from(displacement))
            .map(Some)
            .ok_or_else(|| AccessError::fault(slot, 4))
    }
}

impl<M: MemoryAccessor + ?Sized> MemoryReadExt for M {}

/// One contiguous range of captured memory
#[derive(Debug, Clone)]
struct Segment
{
    base: Address,
    bytes: Vec<u8>,
}

impl Segment
{
    fn end(&self) -> u64
    {
        self.base.value().saturating_add(self.bytes.len() as u64)
    }

    fn contains(&self, address: u64) -> bool
    {
        address >= self.base.value() && address < self.end()
    }
}

/// In-memory snapshot made of non-overlapping captured segments
///
/// Reads may span adjacent segments. Any byte not covered by a segment
/// faults the whole read, and the fault reports the requested range.
///
/// ## Example
///
/// ```rust
/// use classwalk_core::memory::{MemoryAccessor, SnapshotMemory};
/// use classwalk_core::types::Address;
///
/// let mut memory = SnapshotMemory::new();
/// memory.add_segment(Address::from(0x1000), vec![1, 2, 3, 4])?;
///
/// assert_eq!(memory.read_bytes(Address::from(0x1001), 2).unwrap(), vec![2, 3]);
/// assert!(memory.read_bytes(Address::from(0x1003), 2).is_err());
/// # Ok::<(), classwalk_core::error::WalkError>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct SnapshotMemory
{
    segments: Vec<Segment>,
}

impl SnapshotMemory
{
    /// Create an empty snapshot; every read faults until segments are added
    pub fn new() -> Self
    {
        Self::default()
    }

    /// Create a snapshot holding one segment
    pub fn with_segment(base: Address, bytes: Vec<u8>) -> WalkResult<Self>
    {
        let mut memory = Self::new();
        memory.add_segment(base, bytes)?;
        Ok(memory)
    }

    /// Load a raw memory dump file and map it at `base`
    ///
    /// ## Errors
    ///
    /// - `Io`: the file cannot be read
    /// - `InvalidArgument`: the file is empty or overlaps an existing segment
    pub fn load_file(&mut self, path: &Path, base: Address) -> WalkResult<()>
    {
        let bytes = fs::read(path)?;
        debug!(path = %path.display(), %base, size = bytes.len(), "loaded snapshot segment");
        self.add_segment(base, bytes)
    }

    /// Map `bytes` at `base`
    ///
    /// ## Errors
    ///
    /// `InvalidArgument` if the segment is empty, wraps the address space, or
    /// overlaps an existing segment.
    pub fn add_segment(&mut self, base: Address, bytes: Vec<u8>) -> WalkResult<()>
    {
        if bytes.is_empty() {
            return Err(WalkError::InvalidArgument(format!("empty segment at {base}")));
        }
        let end = base
            .checked_add(bytes.len() as u64)
            .ok_or_else(|| WalkError::InvalidArgument(format!("segment at {base} wraps the address space")))?;

        let overlaps = self
            .segments
            .iter()
            .any(|s| base.value() < s.end() && s.base.value() < end.value());
        if overlaps {
            return Err(WalkError::InvalidArgument(format!("segment at {base} overlaps an existing segment")));
        }

        let position = self.segments.partition_point(|s| s.base < base);
        self.segments.insert(position, Segment { base, bytes });
        Ok(())
    }

    /// Lowest mapped address and total mapped span, if any segment exists
    pub fn extent(&self) -> Option<(Address, u64)>
    {
        let first = self.segments.first()?;
        let last = self.segments.last()?;
        Some((first.base, last.end() - first.base.value()))
    }

    fn segment_for(&self, address: u64) -> Option<&Segment>
    {
        let index = self.segments.partition_point(|s| s.base.value() <= address);
        let candidate = self.segments.get(index.checked_sub(1)?)?;
        candidate.contains(address).then_some(candidate)
    }
}

impl MemoryAccessor for SnapshotMemory
{
    fn probe(&self, address: Address, length: u64) -> AccessResult<()>
    {
        let fault = || AccessError::fault(address, length);
        let end = address.value().checked_add(length).ok_or_else(fault)?;
        let mut cursor = address.value();
        while cursor < end {
            let segment = self.segment_for(cursor).ok_or_else(fault)?;
            cursor = end.min(segment.end());
        }
        Ok(())
    }

    fn read_bytes(&self, address: Address, length: u64) -> AccessResult<Vec<u8>>
    {
        // Validate coverage first so a corrupt length never drives a huge allocation
        self.probe(address, length)?;
        let fault = || AccessError::fault(address, length);
        let end = address.value() + length;
        let capacity = usize::try_from(length).map_err(|_| fault())?;

        let mut output = Vec::with_capacity(capacity);
        let mut cursor = address.value();
        while cursor < end {
            let segment = self.segment_for(cursor).ok_or_else(fault)?;
            let start = (cursor - segment.base.value()) as usize;
            let chunk_end = end.min(segment.end());
            let stop = (chunk_end - segment.base.value()) as usize;
            output.extend_from_slice(&segment.bytes[start..stop]);
            cursor = chunk_end;
        }

        Ok(output)
    }
}

/// Accessor for a target that has gone away
///
/// Every call reports [`AccessError::Unavailable`].
#[derive(Debug, Clone)]
pub struct UnavailableMemory
{
    reason: String,
}

impl UnavailableMemory
{
    pub fn new(reason: impl Into<String>) -> Self
    {
        Self { reason: reason.into() }
    }
}

impl MemoryAccessor for UnavailableMemory
{
    fn read_bytes(&self, _address: Address, _length: u64) -> AccessResult<Vec<u8>>
    {
        Err(AccessError::Unavailable(self.reason.clone()))
    }

    fn probe(&self, _address: Address, _length: u64) -> AccessResult<()>
    {
        Err(AccessError::Unavailable(self.reason.clone()))
    }

    fn check_available(&self) -> AccessResult<()>
    {
        Err(AccessError::Unavailable(self.reason.clone()))
    }
}
