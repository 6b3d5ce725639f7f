//! Loaded class image walker.
//!
//! A loaded class is the runtime structure built from a stored image. Its
//! slots are target pointers, and the sizes of its arrays are not recorded in
//! the structure itself: method, static, and constant pool counts come from
//! the stored image the header points back to.
//!
//! The sections are separate allocations, so their order in memory does not
//! follow the header. They are reported in address order.

use super::stored::StoredHeader;
use super::{Descriptor, Entries, FaultedEntry, SectionWalker, WalkEntry};
use crate::memory::{AccessResult, MemoryAccessor};
use crate::types::layout::read_uint;
use crate::types::{Address, ByteOrder, PointerWidth, ScalarType};

const HEADER_SLOTS: [&str; 12] = [
    "eyecatcher",
    "romClass",
    "superclasses",
    "classDepthAndFlags",
    "classLoader",
    "classObject",
    "initializeStatus",
    "ramMethods",
    "ramStatics",
    "ramConstantPool",
    "totalInstanceSize",
    "instanceDescription",
];

const SLOT_ROM_CLASS: usize = 1;
const SLOT_SUPERCLASSES: usize = 2;
const SLOT_DEPTH_AND_FLAGS: usize = 3;
const SLOT_METHODS: usize = 7;
const SLOT_STATICS: usize = 8;
const SLOT_CONSTANT_POOL: usize = 9;

const METHOD_SLOTS: [&str; 4] = ["bytecodes", "constantPool", "methodRunAddress", "extra"];
const CP_ENTRY_SLOTS: [&str; 2] = ["value", "info"];

const CLASS_DEPTH_MASK: u64 = 0xffff;

/// Preferred report order for loaded images
pub const LOADED_SECTION_ORDER: &[&str] = &[
    "ramClass",
    "ramHeader",
    "superclasses",
    "ramMethods",
    "method",
    "ramStatics",
    "ramConstantPool",
    "ramCpEntry",
    "ramClass/Other",
];

/// Layout tags for loaded-image compounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedLayout
{
    Header,
    Superclasses
    {
        depth: u64,
    },
    Methods
    {
        count: u32,
    },
    Method,
    Statics
    {
        count: u32,
    },
    ConstantPool
    {
        count: u32,
    },
    CpEntry,
}

/// Walker for loaded (RAM) class structures
#[derive(Debug, Clone)]
pub struct LoadedClassWalker
{
    order: ByteOrder,
    width: PointerWidth,
}

impl LoadedClassWalker
{
    pub fn new(order: ByteOrder, width: PointerWidth) -> Self
    {
        Self { order, width }
    }

    fn pointer_size(&self) -> u64
    {
        self.width.bytes() as u64
    }

    fn pointer(&self) -> ScalarType
    {
        ScalarType::pointer(self.width)
    }

    fn read_header(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<u64>>
    {
        let size = self.pointer_size();
        let bytes = memory.read_bytes(base, HEADER_SLOTS.len() as u64 * size)?;
        Ok(bytes
            .chunks_exact(self.width.bytes())
            .map(|slot| read_uint(slot, self.order))
            .collect())
    }

    fn array(&self, name: &str, start: u64, count: u64, unit: u64, layout: LoadedLayout) -> Option<WalkEntry<LoadedLayout>>
    {
        if start == 0 {
            return None;
        }
        let mut entries = Entries::at(Address::from(start));
        entries.compound(name, count.saturating_mul(unit), layout);
        entries.finish().pop()
    }
}

fn entry_address<L>(entry: &WalkEntry<L>) -> Address
{
    match entry {
        Ok(descriptor) => descriptor.address,
        Err(fault) => fault.address,
    }
}

impl SectionWalker for LoadedClassWalker
{
    type Layout = LoadedLayout;

    fn root_name(&self) -> &'static str
    {
        "ramClass"
    }

    fn preferred_order(&self) -> &'static [&'static str]
    {
        LOADED_SECTION_ORDER
    }

    fn image_extent(&self, _memory: &dyn MemoryAccessor, _base: Address) -> AccessResult<Option<u64>>
    {
        Ok(None)
    }

    fn top_level_sections(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<WalkEntry<LoadedLayout>>>
    {
        let slots = self.read_header(memory, base)?;
        let size = self.pointer_size();

        let mut sections = Vec::new();
        let mut header = Entries::at(base);
        header.compound("ramHeader", HEADER_SLOTS.len() as u64 * size, LoadedLayout::Header);
        sections.extend(header.finish());

        let depth = slots[SLOT_DEPTH_AND_FLAGS] & CLASS_DEPTH_MASK;
        sections.extend(self.array(
            "superclasses",
            slots[SLOT_SUPERCLASSES],
            depth,
            size,
            LoadedLayout::Superclasses { depth },
        ));

        match StoredHeader::read(memory, Address::from(slots[SLOT_ROM_CLASS]), self.order) {
            Ok(rom) => {
                sections.extend(self.array(
                    "ramMethods",
                    slots[SLOT_METHODS],
                    u64::from(rom.method_count),
                    METHOD_SLOTS.len() as u64 * size,
                    LoadedLayout::Methods {
                        count: rom.method_count,
                    },
                ));
                sections.extend(self.array(
                    "ramStatics",
                    slots[SLOT_STATICS],
                    u64::from(rom.single_scalar_static_count),
                    size,
                    LoadedLayout::Statics {
                        count: rom.single_scalar_static_count,
                    },
                ));
                sections.extend(self.array(
                    "ramConstantPool",
                    slots[SLOT_CONSTANT_POOL],
                    u64::from(rom.cp_count),
                    CP_ENTRY_SLOTS.len() as u64 * size,
                    LoadedLayout::ConstantPool { count: rom.cp_count },
                ));
            }
            Err(error) if error.is_fault() => {
                // Counts are unknown, but the sections still exist
                for (name, slot) in [
                    ("ramMethods", SLOT_METHODS),
                    ("ramStatics", SLOT_STATICS),
                    ("ramConstantPool", SLOT_CONSTANT_POOL),
                ] {
                    if slots[slot] != 0 {
                        sections.push(Err(FaultedEntry {
                            name: name.to_string(),
                            address: Address::from(slots[slot]),
                            error: error.clone(),
                        }));
                    }
                }
            }
            Err(error) => return Err(error),
        }

        sections.sort_by_key(entry_address);
        Ok(sections)
    }

    fn children_of(
        &self,
        memory: &dyn MemoryAccessor,
        parent: &Descriptor<LoadedLayout>,
    ) -> AccessResult<Vec<WalkEntry<LoadedLayout>>>
    {
        let Some(layout) = &parent.layout else {
            return Ok(Vec::new());
        };

        let size = self.pointer_size();
        let mut entries = Entries::at(parent.address);
        match layout {
            LoadedLayout::Header => {
                for name in HEADER_SLOTS {
                    entries.scalar(name, self.pointer());
                }
            }
            LoadedLayout::Superclasses { depth } => {
                memory.probe(parent.address, parent.length)?;
                for _ in 0..*depth {
                    entries.scalar("superclass", self.pointer());
                }
            }
            LoadedLayout::Methods { count } => {
                memory.probe(parent.address, parent.length)?;
                for _ in 0..*count {
                    entries.compound("method", METHOD_SLOTS.len() as u64 * size, LoadedLayout::Method);
                }
            }
            LoadedLayout::Method => {
                for name in METHOD_SLOTS {
                    entries.scalar(name, self.pointer());
                }
            }
            LoadedLayout::Statics { count } => {
                memory.probe(parent.address, parent.length)?;
                for _ in 0..*count {
                    entries.scalar("staticSlot", self.pointer());
                }
            }
            LoadedLayout::ConstantPool { count } => {
                memory.probe(parent.address, parent.length)?;
                for _ in 0..*count {
                    entries.compound("ramCpEntry", CP_ENTRY_SLOTS.len() as u64 * size, LoadedLayout::CpEntry);
                }
            }
            LoadedLayout::CpEntry => {
                for name in CP_ENTRY_SLOTS {
                    entries.scalar(name, self.pointer());
                }
            }
        }
        Ok(entries.finish())
    }
}
