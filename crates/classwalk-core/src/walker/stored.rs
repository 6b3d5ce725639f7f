//! Stored class image walker.
//!
//! A stored image is position independent: every reference is a 32-bit
//! self-relative pointer (SRP) and every slot is at most 32 bits wide, except
//! 64-bit constants. The header records the total image size, so the extent
//! is known up front.
//!
//! ```text
//! +-----------+ base
//! | romHeader |  64 bytes
//! +-----------+
//! | constantPool        romConstantPoolCount x 8 bytes
//! | interfacesSRPs      interfaceCount x SRP
//! | methods             romMethodCount x variable-length method
//! | fields              romFieldCount x variable-length field
//! | cpShapeDescription  4 bits per constant pool entry
//! | optionalInfo        one SRP per slot-bearing optional flag
//! | (UTF8 data)         not described; shows up as unaccounted bytes
//! +-----------+ base + romSize
//! ```

use tracing::warn;

use super::{Descriptor, Entries, SectionWalker, WalkEntry};
use crate::memory::{AccessError, AccessResult, MemoryAccessor, MemoryReadExt};
use crate::types::layout::read_uint;
use crate::types::{Address, ByteOrder, ScalarType};

pub const HEADER_SIZE: u64 = 64;
const CP_ENTRY_SIZE: u64 = 8;
const SRP_SIZE: u64 = 4;
const METHOD_FIXED_SIZE: u64 = 20;
const FIELD_FIXED_SIZE: u64 = 12;
const EXCEPTION_HANDLER_SIZE: u64 = 16;

const OFF_ROM_SIZE: usize = 0;
const OFF_SINGLE_SCALAR_STATIC_COUNT: usize = 4;
const OFF_INTERFACE_COUNT: usize = 20;
const OFF_INTERFACES: usize = 24;
const OFF_METHOD_COUNT: usize = 28;
const OFF_METHODS: usize = 32;
const OFF_FIELD_COUNT: usize = 36;
const OFF_FIELDS: usize = 40;
const OFF_CP_COUNT: usize = 44;
const OFF_CP_SHAPE: usize = 48;
const OFF_OPTIONAL_FLAGS: usize = 52;
const OFF_OPTIONAL_INFO: usize = 56;

/// Method modifier: an exception table follows the bytecodes
pub const METHOD_HAS_EXCEPTION_INFO: u32 = 0x0002_0000;
/// Field modifier: the field carries a constant initial value
pub const FIELD_CONSTANT: u32 = 0x0040_0000;
/// Field modifier: the constant initial value is 64 bits
pub const FIELD_SIZE_DOUBLE: u32 = 0x0004_0000;
/// Field modifier: a generic signature SRP follows
pub const FIELD_HAS_GENERIC_SIGNATURE: u32 = 0x4000_0000;
/// Field modifier: an annotation blob follows
pub const FIELD_HAS_ANNOTATIONS: u32 = 0x2000_0000;

const U8: ScalarType = ScalarType::unsigned(1);
const U16: ScalarType = ScalarType::unsigned(2);
const U32: ScalarType = ScalarType::unsigned(4);
const SRP: ScalarType = ScalarType::signed(4);

const HEADER_FIELDS: [(&str, ScalarType); 17] = [
    ("romSize", U32),
    ("singleScalarStaticCount", U32),
    ("className", SRP),
    ("superclassName", SRP),
    ("modifiers", U32),
    ("interfaceCount", U32),
    ("interfaces", SRP),
    ("romMethodCount", U32),
    ("romMethods", SRP),
    ("romFieldCount", U32),
    ("romFields", SRP),
    ("romConstantPoolCount", U32),
    ("cpShapeDescription", SRP),
    ("optionalFlags", U32),
    ("optionalInfo", SRP),
    ("majorVersion", U16),
    ("minorVersion", U16),
];

/// Optional-info flags that own an SRP slot, in slot order
const OPTIONAL_SLOTS: [(u32, &str); 10] = [
    (0x0000_0001, "sourceFileName"),
    (0x0000_0002, "genericSignature"),
    (0x0000_0004, "sourceDebugExtension"),
    (0x0000_0020, "typeTable"),
    (0x0000_0040, "enclosingMethod"),
    (0x0000_0080, "simpleName"),
    (0x0000_8000, "classAnnotations"),
    (0x0040_0000, "typeAnnotations"),
    (0x0080_0000, "record"),
    (0x0100_0000, "permittedSubclasses"),
];

/// Preferred report order for stored images
pub const STORED_SECTION_ORDER: &[&str] = &[
    "romClass",
    "romHeader",
    "constantPool",
    "interfacesSRPs",
    "methods",
    "method",
    "bytecodes",
    "exceptionInfo",
    "fields",
    "field",
    "cpShapeDescription",
    "optionalInfo",
    "romClass/Other",
];

/// Constant pool entry types, from the 4-bit shape description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpType
{
    Unused,
    Class,
    String,
    Int,
    Float,
    Long,
    Double,
    FieldRef,
    InstanceMethodRef,
    StaticMethodRef,
    Other(u8),
}

impl CpType
{
    pub fn from_nibble(nibble: u8) -> Self
    {
        match nibble {
            0 => CpType::Unused,
            1 => CpType::Class,
            2 => CpType::String,
            3 => CpType::Int,
            4 => CpType::Float,
            5 => CpType::Long,
            6 => CpType::Double,
            7 => CpType::FieldRef,
            9 => CpType::InstanceMethodRef,
            10 => CpType::StaticMethodRef,
            other => CpType::Other(other),
        }
    }

    pub fn region_name(self) -> &'static str
    {
        match self {
            CpType::Unused => "cpUnused",
            CpType::Class => "cpClass",
            CpType::String => "cpString",
            CpType::Int => "cpInt",
            CpType::Float => "cpFloat",
            CpType::Long => "cpLong",
            CpType::Double => "cpDouble",
            CpType::FieldRef => "cpFieldRef",
            CpType::InstanceMethodRef => "cpInstanceMethodRef",
            CpType::StaticMethodRef => "cpStaticMethodRef",
            CpType::Other(_) => "cpEntry",
        }
    }
}

/// Decoded size-determining fields of one method
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodShape
{
    pub modifiers: u32,
    pub bytecode_size: u64,
    pub catch_count: u16,
    pub throw_count: u16,
}

impl MethodShape
{
    fn exception_info_size(self) -> u64
    {
        4 + u64::from(self.catch_count) * EXCEPTION_HANDLER_SIZE + u64::from(self.throw_count) * SRP_SIZE
    }

    fn has_exception_info(self) -> bool
    {
        self.modifiers & METHOD_HAS_EXCEPTION_INFO != 0
    }

    /// Total size including bytecode padding and the exception table
    pub fn size(self) -> u64
    {
        let mut size = METHOD_FIXED_SIZE + align4(self.bytecode_size);
        if self.has_exception_info() {
            size += self.exception_info_size();
        }
        size
    }
}

/// Decoded size-determining fields of one field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldShape
{
    pub modifiers: u32,
    pub annotation_length: Option<u32>,
}

impl FieldShape
{
    fn initial_value_width(self) -> Option<u8>
    {
        if self.modifiers & FIELD_CONSTANT == 0 {
            None
        } else if self.modifiers & FIELD_SIZE_DOUBLE != 0 {
            Some(8)
        } else {
            Some(4)
        }
    }

    fn annotation_size(self) -> Option<u64>
    {
        self.annotation_length.map(|len| 4 + align4(u64::from(len)))
    }

    fn size(self) -> u64
    {
        let mut size = FIELD_FIXED_SIZE;
        size += self.initial_value_width().map_or(0, u64::from);
        if self.modifiers & FIELD_HAS_GENERIC_SIGNATURE != 0 {
            size += SRP_SIZE;
        }
        size + self.annotation_size().unwrap_or(0)
    }
}

/// Layout tags for stored-image compounds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredLayout
{
    Header,
    ConstantPool
    {
        count: u32,
        shape: Option<Address>,
    },
    CpEntry(CpType),
    Interfaces
    {
        count: u32,
    },
    Methods
    {
        count: u32,
        limit: Address,
    },
    Method(MethodShape),
    ExceptionInfo(MethodShape),
    ExceptionHandler,
    Fields
    {
        count: u32,
        limit: Address,
    },
    Field(FieldShape),
    FieldAnnotation
    {
        length: u32,
    },
    OptionalInfo
    {
        flags: u32,
    },
}

/// Header fields the walkers need, with SRPs already resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StoredHeader
{
    pub rom_size: u32,
    pub single_scalar_static_count: u32,
    pub interface_count: u32,
    pub interfaces: Option<Address>,
    pub method_count: u32,
    pub methods: Option<Address>,
    pub field_count: u32,
    pub fields: Option<Address>,
    pub cp_count: u32,
    pub cp_shape: Option<Address>,
    pub optional_flags: u32,
    pub optional_info: Option<Address>,
}

impl StoredHeader
{
    pub(crate) fn read(memory: &dyn MemoryAccessor, base: Address, order: ByteOrder) -> AccessResult<Self>
    {
        let bytes = memory.read_bytes(base, HEADER_SIZE)?;
        let u32_at = |offset: usize| read_uint(&bytes[offset..offset + 4], order) as u32;
        let srp_at = |offset: usize| {
            let displacement = i64::from(u32_at(offset) as i32);
            if displacement == 0 {
                None
            } else {
                (base + offset as u64).checked_offset(displacement)
            }
        };

        Ok(Self {
            rom_size: u32_at(OFF_ROM_SIZE),
            single_scalar_static_count: u32_at(OFF_SINGLE_SCALAR_STATIC_COUNT),
            interface_count: u32_at(OFF_INTERFACE_COUNT),
            interfaces: srp_at(OFF_INTERFACES),
            method_count: u32_at(OFF_METHOD_COUNT),
            methods: srp_at(OFF_METHODS),
            field_count: u32_at(OFF_FIELD_COUNT),
            fields: srp_at(OFF_FIELDS),
            cp_count: u32_at(OFF_CP_COUNT),
            cp_shape: srp_at(OFF_CP_SHAPE),
            optional_flags: u32_at(OFF_OPTIONAL_FLAGS),
            optional_info: srp_at(OFF_OPTIONAL_INFO),
        })
    }
}

fn align4(value: u64) -> u64
{
    value.saturating_add(3) & !3
}

fn shape_words(cp_count: u32) -> u64
{
    u64::from(cp_count).div_ceil(8)
}

/// Walker for stored (ROM) class images
#[derive(Debug, Clone)]
pub struct StoredClassWalker
{
    order: ByteOrder,
}

impl StoredClassWalker
{
    pub fn new(order: ByteOrder) -> Self
    {
        Self { order }
    }

    pub fn byte_order(&self) -> ByteOrder
    {
        self.order
    }

    fn read_method_shape(&self, memory: &dyn MemoryAccessor, method: Address) -> AccessResult<MethodShape>
    {
        let fixed = memory.read_bytes(method, METHOD_FIXED_SIZE)?;
        let modifiers = read_uint(&fixed[8..12], self.order) as u32;
        let low = read_uint(&fixed[14..16], self.order);
        let high = u64::from(fixed[16]);
        let bytecode_size = (high << 16) | low;

        let mut shape = MethodShape {
            modifiers,
            bytecode_size,
            catch_count: 0,
            throw_count: 0,
        };
        if shape.has_exception_info() {
            let table = method + METHOD_FIXED_SIZE + align4(bytecode_size);
            shape.catch_count = memory.read_u16(table, self.order)?;
            shape.throw_count = memory.read_u16(table + 2, self.order)?;
        }
        Ok(shape)
    }

    fn read_field_shape(&self, memory: &dyn MemoryAccessor, field: Address) -> AccessResult<FieldShape>
    {
        let modifiers = memory.read_u32(field + 8, self.order)?;
        let mut shape = FieldShape {
            modifiers,
            annotation_length: None,
        };
        if modifiers & FIELD_HAS_ANNOTATIONS != 0 {
            // Annotation sits after every other optional slot
            let offset = shape.size();
            shape.annotation_length = Some(memory.read_u32(field + offset, self.order)?);
        }
        Ok(shape)
    }

    /// Walk a run of variable-length members, measuring each one
    ///
    /// Stops at the first member that faults or would cross `limit`; the
    /// fault is reported in-line so earlier members survive.
    fn list_variable<L, F>(&self, start: Address, count: u32, limit: Address, name: &str, mut measure: F) -> Entries<L>
    where
        F: FnMut(Address) -> AccessResult<(u64, L)>,
    {
        let mut entries = Entries::at(start);
        for _ in 0..count {
            let cursor = entries.cursor();
            match measure(cursor) {
                Ok((size, _)) if cursor.saturating_add(size) > limit => {
                    entries.fault(name, AccessError::fault(cursor, size));
                    break;
                }
                Ok((size, layout)) => {
                    entries.compound(name, size, layout);
                }
                Err(error) => {
                    entries.fault(name, error);
                    break;
                }
            }
        }
        entries
    }

    fn method_entries(&self, memory: &dyn MemoryAccessor, start: Address, count: u32, limit: Address) -> Entries<StoredLayout>
    {
        self.list_variable(start, count, limit, "method", |cursor| {
            let shape = self.read_method_shape(memory, cursor)?;
            Ok((shape.size(), StoredLayout::Method(shape)))
        })
    }

    fn field_entries(&self, memory: &dyn MemoryAccessor, start: Address, count: u32, limit: Address) -> Entries<StoredLayout>
    {
        self.list_variable(start, count, limit, "field", |cursor| {
            let shape = self.read_field_shape(memory, cursor)?;
            Ok((shape.size(), StoredLayout::Field(shape)))
        })
    }

    /// Bytes covered by the successfully measured members of a run
    fn measured_length(entries: &Entries<StoredLayout>, start: Address) -> u64
    {
        entries.cursor().distance_from(start).unwrap_or(0)
    }

    fn cp_types(&self, memory: &dyn MemoryAccessor, count: u32, shape: Option<Address>) -> Vec<CpType>
    {
        let words = shape.map(|address| memory.read_bytes(address, shape_words(count) * 4));
        match words {
            Some(Ok(bytes)) => (0..count as usize)
                .map(|index| {
                    let word = read_uint(&bytes[(index / 8) * 4..(index / 8) * 4 + 4], self.order);
                    let nibble = ((word >> ((index % 8) * 4)) & 0xf) as u8;
                    CpType::from_nibble(nibble)
                })
                .collect(),
            Some(Err(error)) => {
                warn!(%error, "constant pool shape unreadable, entries left untyped");
                vec![CpType::Other(0xf); count as usize]
            }
            None => vec![CpType::Other(0xf); count as usize],
        }
    }

    fn cp_entry_children(&self, entries: &mut Entries<StoredLayout>, ty: CpType)
    {
        match ty {
            CpType::Int => {
                entries.scalar("value", ScalarType::signed(4)).scalar("slot2", U32);
            }
            CpType::Float => {
                entries.scalar("value", ScalarType::float(4)).scalar("slot2", U32);
            }
            CpType::Long => {
                entries.scalar("value", ScalarType::signed(8));
            }
            CpType::Double => {
                entries.scalar("value", ScalarType::float(8));
            }
            CpType::Class | CpType::String => {
                entries.scalar("utf8", SRP).scalar("slot2", U32);
            }
            CpType::FieldRef | CpType::InstanceMethodRef | CpType::StaticMethodRef => {
                entries.scalar("classRefCPIndex", U32).scalar("nameAndSignature", SRP);
            }
            CpType::Unused | CpType::Other(_) => {
                entries.scalar("slot1", U32).scalar("slot2", U32);
            }
        }
    }

    fn method_children(&self, entries: &mut Entries<StoredLayout>, shape: MethodShape)
    {
        entries
            .scalar("name", SRP)
            .scalar("signature", SRP)
            .scalar("modifiers", U32)
            .scalar("maxStack", U16)
            .scalar("bytecodeSizeLow", U16)
            .scalar("bytecodeSizeHigh", U8)
            .scalar("argCount", U8)
            .scalar("tempCount", U16)
            .blob("bytecodes", shape.bytecode_size);
        let padded = entries.cursor().align_up(4);
        entries.seek(padded);
        if shape.has_exception_info() {
            entries.compound("exceptionInfo", shape.exception_info_size(), StoredLayout::ExceptionInfo(shape));
        }
    }

    fn field_children(&self, entries: &mut Entries<StoredLayout>, shape: FieldShape)
    {
        entries.scalar("name", SRP).scalar("signature", SRP).scalar("modifiers", U32);
        if let Some(width) = shape.initial_value_width() {
            entries.scalar("initialValue", ScalarType::unsigned(width));
        }
        if shape.modifiers & FIELD_HAS_GENERIC_SIGNATURE != 0 {
            entries.scalar("genericSignature", SRP);
        }
        if let (Some(length), Some(size)) = (shape.annotation_length, shape.annotation_size()) {
            entries.compound("fieldAnnotation", size, StoredLayout::FieldAnnotation { length });
        }
    }
}

impl SectionWalker for StoredClassWalker
{
    type Layout = StoredLayout;

    fn root_name(&self) -> &'static str
    {
        "romClass"
    }

    fn preferred_order(&self) -> &'static [&'static str]
    {
        STORED_SECTION_ORDER
    }

    fn image_extent(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Option<u64>>
    {
        memory.read_u32(base, self.order).map(|size| Some(u64::from(size)))
    }

    fn top_level_sections(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<WalkEntry<StoredLayout>>>
    {
        let header = StoredHeader::read(memory, base, self.order)?;
        let rom_size = u64::from(header.rom_size);
        let limit = base.saturating_add(rom_size);
        let fits = |count: u32, unit: u64| u64::from(count).saturating_mul(unit) <= rom_size;

        let mut sections = Entries::at(base);
        sections.compound("romHeader", HEADER_SIZE, StoredLayout::Header);

        if fits(header.cp_count, CP_ENTRY_SIZE) {
            sections.compound(
                "constantPool",
                u64::from(header.cp_count) * CP_ENTRY_SIZE,
                StoredLayout::ConstantPool {
                    count: header.cp_count,
                    shape: header.cp_shape,
                },
            );
        } else {
            sections.fault(
                "constantPool",
                AccessError::fault(sections.cursor(), u64::from(header.cp_count) * CP_ENTRY_SIZE),
            );
        }

        if let Some(interfaces) = header.interfaces {
            sections.seek(interfaces);
            let length = u64::from(header.interface_count) * SRP_SIZE;
            if fits(header.interface_count, SRP_SIZE) {
                sections.compound("interfacesSRPs", length, StoredLayout::Interfaces {
                    count: header.interface_count,
                });
            } else {
                sections.fault("interfacesSRPs", AccessError::fault(interfaces, length));
            }
        }

        if let Some(methods) = header.methods {
            sections.seek(methods);
            let run = self.method_entries(memory, methods, header.method_count, limit);
            let length = Self::measured_length(&run, methods);
            sections.compound("methods", length, StoredLayout::Methods {
                count: header.method_count,
                limit,
            });
        }

        if let Some(fields) = header.fields {
            sections.seek(fields);
            let run = self.field_entries(memory, fields, header.field_count, limit);
            let length = Self::measured_length(&run, fields);
            sections.compound("fields", length, StoredLayout::Fields {
                count: header.field_count,
                limit,
            });
        }

        if let Some(shape) = header.cp_shape {
            sections.seek(shape);
            sections.blob("cpShapeDescription", shape_words(header.cp_count) * 4);
        }

        if let Some(info) = header.optional_info.filter(|_| header.optional_flags != 0) {
            let slots = OPTIONAL_SLOTS
                .iter()
                .filter(|(flag, _)| header.optional_flags & flag != 0)
                .count() as u64;
            sections.seek(info);
            sections.compound("optionalInfo", slots * SRP_SIZE, StoredLayout::OptionalInfo {
                flags: header.optional_flags,
            });
        }

        Ok(sections.finish())
    }

    fn children_of(
        &self,
        memory: &dyn MemoryAccessor,
        parent: &Descriptor<StoredLayout>,
    ) -> AccessResult<Vec<WalkEntry<StoredLayout>>>
    {
        let Some(layout) = &parent.layout else {
            return Ok(Vec::new());
        };

        let mut entries = Entries::at(parent.address);
        match layout {
            StoredLayout::Header => {
                for (name, ty) in HEADER_FIELDS {
                    entries.scalar(name, ty);
                }
            }
            StoredLayout::ConstantPool { count, shape } => {
                memory.probe(parent.address, parent.length)?;
                for ty in self.cp_types(memory, *count, *shape) {
                    entries.compound(ty.region_name(), CP_ENTRY_SIZE, StoredLayout::CpEntry(ty));
                }
            }
            StoredLayout::CpEntry(ty) => self.cp_entry_children(&mut entries, *ty),
            StoredLayout::Interfaces { count } => {
                memory.probe(parent.address, parent.length)?;
                for _ in 0..*count {
                    entries.scalar("interfaceUTF8", SRP);
                }
            }
            StoredLayout::Methods { count, limit } => {
                entries = self.method_entries(memory, parent.address, *count, *limit);
            }
            StoredLayout::Method(shape) => self.method_children(&mut entries, *shape),
            StoredLayout::ExceptionInfo(shape) => {
                entries.scalar("catchCount", U16).scalar("throwCount", U16);
                for _ in 0..shape.catch_count {
                    entries.compound("exceptionHandler", EXCEPTION_HANDLER_SIZE, StoredLayout::ExceptionHandler);
                }
                for _ in 0..shape.throw_count {
                    entries.scalar("throwNameUTF8", SRP);
                }
            }
            StoredLayout::ExceptionHandler => {
                entries
                    .scalar("startPC", U32)
                    .scalar("endPC", U32)
                    .scalar("handlerPC", U32)
                    .scalar("exceptionClassIndex", U32);
            }
            StoredLayout::Fields { count, limit } => {
                entries = self.field_entries(memory, parent.address, *count, *limit);
            }
            StoredLayout::Field(shape) => self.field_children(&mut entries, *shape),
            StoredLayout::FieldAnnotation { length } => {
                entries
                    .scalar("annotationLength", U32)
                    .blob("annotationData", u64::from(*length));
            }
            StoredLayout::OptionalInfo { flags } => {
                for (_, name) in OPTIONAL_SLOTS.iter().filter(|(flag, _)| flags & flag != 0) {
                    entries.scalar(name, SRP);
                }
            }
        }
        Ok(entries.finish())
    }
}
