//! Enumeration of stored class images packed back to back.
//!
//! Stored images in a shared class cache segment follow each other
//! directly: each one records its own size in its first word, and the next
//! image starts at the following 8-byte boundary.

use tracing::debug;

use crate::builder::ImageLocation;
use crate::memory::{MemoryAccessor, MemoryReadExt, SnapshotMemory};
use crate::types::{Address, ByteOrder};
use crate::walker::stored::HEADER_SIZE;

const IMAGE_ALIGNMENT: u64 = 8;

/// Iterator over stored images between two addresses
///
/// Stops at the first position that cannot hold an image: the end of the
/// range, an unreadable or undersized size word, or an image running past
/// the end.
///
/// ## Example
///
/// ```rust
/// use classwalk_core::images::StoredImages;
/// use classwalk_core::memory::SnapshotMemory;
/// use classwalk_core::types::{Address, ByteOrder};
///
/// let mut bytes = vec![0u8; 136];
/// bytes[0..4].copy_from_slice(&68u32.to_le_bytes());
/// bytes[72..76].copy_from_slice(&64u32.to_le_bytes());
/// let memory = SnapshotMemory::with_segment(Address::from(0x1000), bytes)?;
///
/// let bases: Vec<u64> = StoredImages::over(&memory, ByteOrder::Little).map(|i| i.base.value()).collect();
/// assert_eq!(bases, vec![0x1000, 0x1048]);
/// # Ok::<(), classwalk_core::error::WalkError>(())
/// ```
pub struct StoredImages<'a>
{
    memory: &'a dyn MemoryAccessor,
    order: ByteOrder,
    cursor: Address,
    end: Address,
}

impl<'a> StoredImages<'a>
{
    pub fn new(memory: &'a dyn MemoryAccessor, order: ByteOrder, start: Address, end: Address) -> Self
    {
        Self {
            memory,
            order,
            cursor: start,
            end,
        }
    }

    /// Enumerate images across the whole mapped extent of a snapshot
    pub fn over(memory: &'a SnapshotMemory, order: ByteOrder) -> Self
    {
        let (start, length) = memory.extent().unwrap_or((Address::ZERO, 0));
        Self::new(memory, order, start, start.saturating_add(length))
    }
}

impl Iterator for StoredImages<'_>
{
    type Item = ImageLocation;

    fn next(&mut self) -> Option<ImageLocation>
    {
        if self.cursor.saturating_add(HEADER_SIZE) > self.end {
            return None;
        }

        let size = match self.memory.read_u32(self.cursor, self.order) {
            Ok(size) => u64::from(size),
            Err(error) => {
                debug!(address = %self.cursor, %error, "image enumeration stopped");
                self.cursor = self.end;
                return None;
            }
        };
        if size < HEADER_SIZE || self.cursor.saturating_add(size) > self.end {
            debug!(address = %self.cursor, size, "no further image");
            self.cursor = self.end;
            return None;
        }

        let image = ImageLocation::new(self.cursor).with_length_hint(size);
        self.cursor = self.cursor.saturating_add(size).align_up(IMAGE_ALIGNMENT);
        Some(image)
    }
}
