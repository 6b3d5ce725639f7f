//! Shared fixtures for integration tests
#![allow(dead_code)]

use classwalk_core::memory::{AccessError, AccessResult, MemoryAccessor, SnapshotMemory};
use classwalk_core::region::RegionKind;
use classwalk_core::types::{Address, ByteOrder, ScalarType};
use classwalk_core::walker::{Descriptor, FaultedEntry, SectionWalker, WalkEntry};

pub const ROM_BASE: u64 = 0x10000;
pub const ROM_SIZE: u64 = 232;
pub const RAM_BASE: u64 = 0x20000;

/// Byte assembler for hand-built images
pub struct ImageBytes
{
    bytes: Vec<u8>,
    order: ByteOrder,
}

impl ImageBytes
{
    pub fn new(length: usize, order: ByteOrder) -> Self
    {
        Self {
            bytes: vec![0; length],
            order,
        }
    }

    fn put(&mut self, offset: usize, value: u64, width: usize) -> &mut Self
    {
        let le = value.to_le_bytes();
        let slot = &mut self.bytes[offset..offset + width];
        match self.order {
            ByteOrder::Little => slot.copy_from_slice(&le[..width]),
            ByteOrder::Big => {
                for (i, byte) in slot.iter_mut().enumerate() {
                    *byte = le[width - 1 - i];
                }
            }
        }
        self
    }

    pub fn u8(&mut self, offset: usize, value: u8) -> &mut Self
    {
        self.bytes[offset] = value;
        self
    }

    pub fn u16(&mut self, offset: usize, value: u16) -> &mut Self
    {
        self.put(offset, u64::from(value), 2)
    }

    pub fn u32(&mut self, offset: usize, value: u32) -> &mut Self
    {
        self.put(offset, u64::from(value), 4)
    }

    pub fn u64(&mut self, offset: usize, value: u64) -> &mut Self
    {
        self.put(offset, value, 8)
    }

    /// Self-relative pointer stored at `slot` pointing at `target`
    pub fn srp(&mut self, slot: usize, target: usize) -> &mut Self
    {
        let displacement = target as i64 - slot as i64;
        self.put(slot, u64::from(displacement as i32 as u32), 4)
    }

    pub fn raw(&mut self, offset: usize, data: &[u8]) -> &mut Self
    {
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        self
    }

    pub fn finish(&mut self) -> Vec<u8>
    {
        std::mem::take(&mut self.bytes)
    }
}

/// A small stored class image
///
/// ```text
///   0  romHeader           64
///  64  constantPool        3 x 8   (unused, int, long)
///  88  interfacesSRPs      1 x 4
///  92  methods             28 + 48 (second method has an exception table)
/// 168  fields              16 + 20 (constant, annotated)
/// 204  cpShapeDescription  4
/// 208  optionalInfo        2 x 4   (sourceFileName, simpleName)
/// 216  UTF8 data           16
/// ```
pub fn stored_class(order: ByteOrder) -> Vec<u8>
{
    let mut image = ImageBytes::new(ROM_SIZE as usize, order);

    // header
    image
        .u32(0, ROM_SIZE as u32)
        .u32(4, 1)
        .srp(8, 216)
        .u32(16, 0x21)
        .u32(20, 1)
        .srp(24, 88)
        .u32(28, 2)
        .srp(32, 92)
        .u32(36, 2)
        .srp(40, 168)
        .u32(44, 3)
        .srp(48, 204)
        .u32(52, 0x81)
        .srp(56, 208)
        .u16(60, 52)
        .u16(62, 0);

    // constant pool: int 7, long -2
    image.u32(72, 7).u64(80, (-2i64) as u64);
    image.srp(88, 216);

    // method 0: five bytes of bytecode, padded to eight
    image.srp(92, 216).srp(96, 220).u32(100, 0x1).u16(104, 2).u16(106, 5).u8(108, 0).u8(109, 1).u16(110, 1);
    image.raw(112, &[0x2a, 0xb7, 0x00, 0x01, 0xb1]);

    // method 1: four bytes of bytecode, one catch, one throw
    image.srp(120, 216).srp(124, 220).u32(128, 0x2_0000).u16(132, 1).u16(134, 4);
    image.raw(140, &[0x03, 0xac, 0x00, 0x00]);
    image.u16(144, 1).u16(146, 1);
    image.u32(148, 0).u32(152, 2).u32(156, 3).u32(160, 4);
    image.srp(164, 224);

    // field 0: constant with a 32-bit initial value
    image.srp(168, 216).srp(172, 220).u32(176, 0x40_0000).u32(180, 99);

    // field 1: three bytes of annotation data
    image.srp(184, 216).srp(188, 220).u32(192, 0x2000_0000).u32(196, 3);
    image.raw(200, &[0xaa, 0xbb, 0xcc]);

    // shape: entry 1 is an int, entry 2 a long
    image.u32(204, 0x530);

    image.srp(208, 216).srp(212, 224);
    image.raw(216, b"Foo\0()V\0Bar\0Baz\0");

    image.finish()
}

pub fn stored_memory(order: ByteOrder) -> SnapshotMemory
{
    SnapshotMemory::with_segment(Address::from(ROM_BASE), stored_class(order)).unwrap()
}

/// A loaded class for [`stored_class`], 64-bit little endian
///
/// Superclasses at +0x100 (depth 2), methods at +0x200, statics at +0x300,
/// constant pool at +0x400.
pub fn loaded_class() -> Vec<u8>
{
    let mut image = ImageBytes::new(0x500, ByteOrder::Little);
    image
        .u64(0, 0x99669966)
        .u64(8, ROM_BASE)
        .u64(16, RAM_BASE + 0x100)
        .u64(24, 0x0002_0002)
        .u64(56, RAM_BASE + 0x200)
        .u64(64, RAM_BASE + 0x300)
        .u64(72, RAM_BASE + 0x400)
        .u64(80, 24);
    image.u64(0x100, 0x30000).u64(0x108, 0x31000);
    image.finish()
}

pub fn loaded_memory() -> SnapshotMemory
{
    let mut memory = stored_memory(ByteOrder::Little);
    memory.add_segment(Address::from(RAM_BASE), loaded_class()).unwrap();
    memory
}

/// Zero-filled memory covering `[base, base + length)`
pub fn zeroed(base: u64, length: usize) -> SnapshotMemory
{
    SnapshotMemory::with_segment(Address::from(base), vec![0; length]).unwrap()
}

#[derive(Debug, Clone)]
enum Behavior
{
    Normal,
    /// Reported as an in-line fault
    Faulted,
    /// Listing its children faults
    BrokenListing,
}

#[derive(Debug, Clone)]
struct ScriptedNode
{
    name: String,
    address: u64,
    length: u64,
    kind: RegionKind,
    children: Vec<usize>,
    behavior: Behavior,
}

/// Walker whose layout is given up front as a table of nodes
///
/// Addresses are absolute. The layout tag of a compound is its index in the
/// table.
#[derive(Debug, Clone, Default)]
pub struct ScriptedWalker
{
    nodes: Vec<ScriptedNode>,
    top: Vec<usize>,
    extent: Option<u64>,
}

impl ScriptedWalker
{
    pub fn new() -> Self
    {
        Self::default()
    }

    fn push(&mut self, name: &str, address: u64, length: u64, kind: RegionKind, children: Vec<usize>, behavior: Behavior) -> usize
    {
        self.nodes.push(ScriptedNode {
            name: name.to_string(),
            address,
            length,
            kind,
            children,
            behavior,
        });
        self.nodes.len() - 1
    }

    pub fn blob(&mut self, name: &str, address: u64, length: u64) -> usize
    {
        self.push(name, address, length, RegionKind::Blob, Vec::new(), Behavior::Normal)
    }

    pub fn scalar(&mut self, name: &str, address: u64, ty: ScalarType) -> usize
    {
        self.push(name, address, u64::from(ty.width), RegionKind::Scalar(ty), Vec::new(), Behavior::Normal)
    }

    pub fn group(&mut self, name: &str, address: u64, length: u64, children: Vec<usize>) -> usize
    {
        self.push(name, address, length, RegionKind::Compound, children, Behavior::Normal)
    }

    pub fn faulted(&mut self, name: &str, address: u64) -> usize
    {
        self.push(name, address, 0, RegionKind::Blob, Vec::new(), Behavior::Faulted)
    }

    pub fn broken_group(&mut self, name: &str, address: u64, length: u64) -> usize
    {
        self.push(name, address, length, RegionKind::Compound, Vec::new(), Behavior::BrokenListing)
    }

    pub fn top(&mut self, sections: Vec<usize>) -> &mut Self
    {
        self.top = sections;
        self
    }

    pub fn extent(&mut self, extent: u64) -> &mut Self
    {
        self.extent = Some(extent);
        self
    }

    fn entries(&self, ids: &[usize]) -> Vec<WalkEntry<usize>>
    {
        ids.iter()
            .map(|&id| {
                let node = &self.nodes[id];
                let address = Address::from(node.address);
                match node.behavior {
                    Behavior::Faulted => Err(FaultedEntry {
                        name: node.name.clone(),
                        address,
                        error: AccessError::fault(address, 4),
                    }),
                    _ => Ok(Descriptor {
                        name: node.name.clone(),
                        address,
                        length: node.length,
                        kind: node.kind,
                        raw_slot: address,
                        layout: node.kind.is_compound().then_some(id),
                    }),
                }
            })
            .collect()
    }
}

impl SectionWalker for ScriptedWalker
{
    type Layout = usize;

    fn root_name(&self) -> &'static str
    {
        "image"
    }

    fn preferred_order(&self) -> &'static [&'static str]
    {
        &["image", "header"]
    }

    fn image_extent(&self, _memory: &dyn MemoryAccessor, _base: Address) -> AccessResult<Option<u64>>
    {
        Ok(self.extent)
    }

    fn top_level_sections(&self, _memory: &dyn MemoryAccessor, _base: Address) -> AccessResult<Vec<WalkEntry<usize>>>
    {
        Ok(self.entries(&self.top))
    }

    fn children_of(&self, _memory: &dyn MemoryAccessor, parent: &Descriptor<usize>) -> AccessResult<Vec<WalkEntry<usize>>>
    {
        let Some(id) = parent.layout else {
            return Ok(Vec::new());
        };
        let node = &self.nodes[id];
        match node.behavior {
            Behavior::BrokenListing => Err(AccessError::fault(parent.address, parent.length)),
            _ => Ok(self.entries(&node.children)),
        }
    }
}

/// `[header(16), methods(40; 2 x 20), pool(8)]` at `base`
pub fn three_sections(base: u64) -> ScriptedWalker
{
    let mut walker = ScriptedWalker::new();
    let header = walker.blob("header", base, 16);
    let first = walker.blob("method", base + 16, 20);
    let second = walker.blob("method", base + 36, 20);
    let methods = walker.group("methods", base + 16, 40, vec![first, second]);
    let pool = walker.blob("pool", base + 56, 8);
    walker.top(vec![header, methods, pool]);
    walker
}
