//! # Section Walkers
//!
//! A section walker knows the layout of one kind of class image. It turns an
//! image base address into an ordered list of section [`Descriptor`]s, and any
//! compound descriptor into the ordered list of its members.
//!
//! Walkers only describe; they never build regions. The
//! [`builder`](crate::builder) copies and validates what they report, decides
//! how deep to go, and checks address ordering.
//!
//! Each walker carries a statically typed layout tag in its compound
//! descriptors ([`SectionWalker::Layout`]) so `children_of` can dispatch on it
//! without inspecting the image again.
//!
//! Two image kinds are supported:
//!
//! - **Stored** ([`stored::StoredClassWalker`]): the immutable, position
//!   independent class image (self-relative pointers, 32-bit slots).
//! - **Loaded** ([`loaded::LoadedClassWalker`]): the runtime class structure,
//!   pointer-sized slots, with counts taken from its stored image.

pub mod loaded;
pub mod stored;

use std::fmt;
use std::str::FromStr;

use crate::memory::{AccessError, AccessResult, MemoryAccessor};
use crate::region::RegionKind;
use crate::types::{Address, ByteOrder, PointerWidth, ScalarType};

pub use loaded::{LoadedClassWalker, LoadedLayout};
pub use stored::{StoredClassWalker, StoredLayout};

/// One section or member as reported by a walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Descriptor<L>
{
    pub name: String,
    pub address: Address,
    pub length: u64,
    pub kind: RegionKind,
    /// Where the value can be re-read from
    pub raw_slot: Address,
    /// Walker-private tag; present on compound descriptors
    pub layout: Option<L>,
}

/// A member the walker could not decode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultedEntry
{
    pub name: String,
    pub address: Address,
    pub error: AccessError,
}

/// One slot in a walker's output: a descriptor, or the fault that prevented it
pub type WalkEntry<L> = Result<Descriptor<L>, FaultedEntry>;

/// Layout knowledge for one image kind
///
/// An `Err` from `top_level_sections` or `children_of` means the listing as a
/// whole could not be produced (for example, a count field faulted). Faults
/// confined to one member are reported in-line as `Err` entries instead, so
/// the remaining members survive.
pub trait SectionWalker
{
    /// Tag attached to compound descriptors
    type Layout: Clone + fmt::Debug;

    /// Name given to the synthetic root region
    fn root_name(&self) -> &'static str;

    /// Section names in the order summary reports should list them
    fn preferred_order(&self) -> &'static [&'static str]
    {
        &[]
    }

    /// Size of the image starting at `base`, when the layout records it
    fn image_extent(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Option<u64>>;

    /// Sections of the image at `base`, in declaration order
    fn top_level_sections(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<WalkEntry<Self::Layout>>>;

    /// Members of a compound descriptor, in declaration order
    fn children_of(
        &self,
        memory: &dyn MemoryAccessor,
        parent: &Descriptor<Self::Layout>,
    ) -> AccessResult<Vec<WalkEntry<Self::Layout>>>;
}

/// Image kinds understood by [`ClassWalker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind
{
    Stored,
    Loaded,
}

impl FromStr for ImageKind
{
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err>
    {
        match s.to_lowercase().as_str() {
            "stored" | "rom" => Ok(ImageKind::Stored),
            "loaded" | "ram" => Ok(ImageKind::Loaded),
            _ => Err(format!("Unknown image kind: {s}. Use 'stored' or 'loaded'")),
        }
    }
}

impl fmt::Display for ImageKind
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result
    {
        match self {
            ImageKind::Stored => write!(f, "stored"),
            ImageKind::Loaded => write!(f, "loaded"),
        }
    }
}

/// Layout tag of [`ClassWalker`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassLayout
{
    Stored(StoredLayout),
    Loaded(LoadedLayout),
}

/// Closed set of image-kind walkers behind one type
///
/// ## Example
///
/// ```rust
/// use classwalk_core::types::{ByteOrder, PointerWidth};
/// use classwalk_core::walker::{ClassWalker, ImageKind, SectionWalker};
///
/// let walker = ClassWalker::new(ImageKind::Stored, ByteOrder::Little, PointerWidth::Bits64);
/// assert_eq!(walker.root_name(), "romClass");
/// ```
#[derive(Debug, Clone)]
pub enum ClassWalker
{
    Stored(StoredClassWalker),
    Loaded(LoadedClassWalker),
}

impl ClassWalker
{
    pub fn new(kind: ImageKind, order: ByteOrder, width: PointerWidth) -> Self
    {
        match kind {
            ImageKind::Stored => ClassWalker::Stored(StoredClassWalker::new(order)),
            ImageKind::Loaded => ClassWalker::Loaded(LoadedClassWalker::new(order, width)),
        }
    }

    pub fn kind(&self) -> ImageKind
    {
        match self {
            ClassWalker::Stored(_) => ImageKind::Stored,
            ClassWalker::Loaded(_) => ImageKind::Loaded,
        }
    }
}

fn wrap_entries<L, F>(entries: Vec<WalkEntry<L>>, wrap: F) -> Vec<WalkEntry<ClassLayout>>
where
    F: Fn(L) -> ClassLayout,
{
    entries
        .into_iter()
        .map(|entry| {
            entry.map(|d| Descriptor {
                name: d.name,
                address: d.address,
                length: d.length,
                kind: d.kind,
                raw_slot: d.raw_slot,
                layout: d.layout.map(&wrap),
            })
        })
        .collect()
}

fn unwrap_descriptor<L: Clone>(parent: &Descriptor<ClassLayout>, layout: Option<L>) -> Descriptor<L>
{
    Descriptor {
        name: parent.name.clone(),
        address: parent.address,
        length: parent.length,
        kind: parent.kind,
        raw_slot: parent.raw_slot,
        layout,
    }
}

impl SectionWalker for ClassWalker
{
    type Layout = ClassLayout;

    fn root_name(&self) -> &'static str
    {
        match self {
            ClassWalker::Stored(w) => w.root_name(),
            ClassWalker::Loaded(w) => w.root_name(),
        }
    }

    fn preferred_order(&self) -> &'static [&'static str]
    {
        match self {
            ClassWalker::Stored(w) => w.preferred_order(),
            ClassWalker::Loaded(w) => w.preferred_order(),
        }
    }

    fn image_extent(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Option<u64>>
    {
        match self {
            ClassWalker::Stored(w) => w.image_extent(memory, base),
            ClassWalker::Loaded(w) => w.image_extent(memory, base),
        }
    }

    fn top_level_sections(&self, memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<WalkEntry<ClassLayout>>>
    {
        match self {
            ClassWalker::Stored(w) => Ok(wrap_entries(w.top_level_sections(memory, base)?, ClassLayout::Stored)),
            ClassWalker::Loaded(w) => Ok(wrap_entries(w.top_level_sections(memory, base)?, ClassLayout::Loaded)),
        }
    }

    fn children_of(
        &self,
        memory: &dyn MemoryAccessor,
        parent: &Descriptor<ClassLayout>,
    ) -> AccessResult<Vec<WalkEntry<ClassLayout>>>
    {
        match (self, &parent.layout) {
            (ClassWalker::Stored(w), Some(ClassLayout::Stored(layout))) => {
                let inner = unwrap_descriptor(parent, Some(layout.clone()));
                Ok(wrap_entries(w.children_of(memory, &inner)?, ClassLayout::Stored))
            }
            (ClassWalker::Loaded(w), Some(ClassLayout::Loaded(layout))) => {
                let inner = unwrap_descriptor(parent, Some(layout.clone()));
                Ok(wrap_entries(w.children_of(memory, &inner)?, ClassLayout::Loaded))
            }
            // A descriptor from another walker, or a compound without a layout: nothing to list
            _ => Ok(Vec::new()),
        }
    }
}

/// Sequential collector used by walkers to describe consecutive slots
///
/// Keeps a cursor so fixed layouts read as a list of fields instead of a
/// table of offsets.
pub(crate) struct Entries<L>
{
    entries: Vec<WalkEntry<L>>,
    cursor: Address,
}

impl<L> Entries<L>
{
    pub(crate) fn at(start: Address) -> Self
    {
        Self {
            entries: Vec::new(),
            cursor: start,
        }
    }

    pub(crate) fn cursor(&self) -> Address
    {
        self.cursor
    }

    /// Move the cursor without describing the skipped bytes
    pub(crate) fn seek(&mut self, address: Address)
    {
        self.cursor = address;
    }

    pub(crate) fn scalar(&mut self, name: &str, ty: ScalarType) -> &mut Self
    {
        let length = u64::from(ty.width);
        self.push(name, length, RegionKind::Scalar(ty), None)
    }

    pub(crate) fn blob(&mut self, name: &str, length: u64) -> &mut Self
    {
        self.push(name, length, RegionKind::Blob, None)
    }

    pub(crate) fn compound(&mut self, name: &str, length: u64, layout: L) -> &mut Self
    {
        self.push(name, length, RegionKind::Compound, Some(layout))
    }

    /// Describe a member that could not be decoded; the cursor is left in place
    pub(crate) fn fault(&mut self, name: &str, error: AccessError) -> &mut Self
    {
        self.entries.push(Err(FaultedEntry {
            name: name.to_string(),
            address: self.cursor,
            error,
        }));
        self
    }

    fn push(&mut self, name: &str, length: u64, kind: RegionKind, layout: Option<L>) -> &mut Self
    {
        self.entries.push(Ok(Descriptor {
            name: name.to_string(),
            address: self.cursor,
            length,
            kind,
            raw_slot: self.cursor,
            layout,
        }));
        self.cursor = self.cursor.saturating_add(length);
        self
    }

    pub(crate) fn finish(self) -> Vec<WalkEntry<L>>
    {
        self.entries
    }
}
