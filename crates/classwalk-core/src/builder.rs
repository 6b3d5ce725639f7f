//! # Region Tree Builder
//!
//! Drives a [`SectionWalker`] to materialize a [`RegionTree`] for one image.
//!
//! Depth counts from the synthetic root at depth 0; the walker's top-level
//! sections sit at depth 1. The root is always expanded. A compound at depth
//! `d >= 1` is expanded when `d <= nesting_threshold`, so a threshold of 0
//! lists the top-level sections without descending into any of them.
//!
//! Faults never abort the build:
//!
//! - a member the walker could not decode becomes an empty, corrupt blob;
//! - a leaf whose bytes cannot be read becomes an empty, corrupt blob;
//! - a compound whose member listing faults is kept, corrupt, with no children;
//! - a member starting before its predecessor ends marks the parent corrupt,
//!   and members from that point on are dropped.
//!
//! Only an unavailable accessor or an out-of-range threshold is fatal.

use tracing::{debug, debug_span, trace, warn};

use crate::config::MAX_NESTING_THRESHOLD;
use crate::error::{WalkError, WalkResult};
use crate::memory::{AccessError, MemoryAccessor};
use crate::region::{Region, RegionKind};
use crate::types::Address;
use crate::walker::{Descriptor, SectionWalker, WalkEntry};

/// Where an image starts, and roughly how long the caller thinks it is
///
/// The hint is only used when the walker cannot determine the extent and
/// no sections were found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageLocation
{
    pub base: Address,
    pub length_hint: Option<u64>,
}

impl ImageLocation
{
    pub fn new(base: Address) -> Self
    {
        Self { base, length_hint: None }
    }

    #[must_use]
    pub fn with_length_hint(mut self, length: u64) -> Self
    {
        self.length_hint = Some(length);
        self
    }
}

impl From<Address> for ImageLocation
{
    fn from(base: Address) -> Self
    {
        Self::new(base)
    }
}

/// One built image: the region tree plus what went wrong while building it
#[derive(Debug, Clone, PartialEq)]
pub struct RegionTree
{
    /// Synthetic root; its children are the walker's top-level sections
    pub root: Region,
    /// Root name reported by the walker, e.g. `romClass`
    pub kind_name: &'static str,
    pub nesting_threshold: usize,
    /// Nodes that became corrupt because a read faulted
    pub faults: usize,
    /// Parents that became corrupt because of out-of-order members
    pub violations: usize,
}

impl RegionTree
{
    /// Whether the build saw neither faults nor structural violations
    pub fn is_clean(&self) -> bool
    {
        self.faults == 0 && self.violations == 0 && !self.root.corrupt
    }

    /// Top-level sections in declaration order
    pub fn sections(&self) -> &[Region]
    {
        self.root.children()
    }

    /// Number of nodes in the tree, root included
    pub fn node_count(&self) -> usize
    {
        self.root.node_count()
    }
}

struct TreeBuilder<'a, W>
{
    memory: &'a dyn MemoryAccessor,
    walker: &'a W,
    threshold: usize,
    faults: usize,
    violations: usize,
}

/// Outcome of materializing one sibling list
struct Members
{
    regions: Vec<Region>,
    violated: bool,
}

impl<W: SectionWalker> TreeBuilder<'_, W>
{
    /// Record a fault, or promote it when the accessor is gone
    fn contain(&mut self, error: AccessError, name: &str, address: Address) -> WalkResult<()>
    {
        let error = WalkError::escalate(error)?;
        self.faults += 1;
        warn!(name, %address, %error, "region faulted");
        Ok(())
    }

    fn members(&mut self, entries: Vec<WalkEntry<W::Layout>>, depth: usize, parent: &str) -> WalkResult<Members>
    {
        let mut regions: Vec<Region> = Vec::with_capacity(entries.len());
        let mut violated = false;

        for entry in entries {
            let (name, address) = match &entry {
                Ok(descriptor) => (descriptor.name.as_str(), descriptor.address),
                Err(faulted) => (faulted.name.as_str(), faulted.address),
            };

            // Dropped members are never walked
            if let Some(previous) = regions.last() {
                if address < previous.end() {
                    self.violations += 1;
                    warn!(
                        parent,
                        member = name,
                        %address,
                        previous_end = %previous.end(),
                        "member overlaps its predecessor, dropping the rest"
                    );
                    violated = true;
                    break;
                }
            }

            let region = match entry {
                Ok(descriptor) => self.node(descriptor, depth)?,
                Err(faulted) => {
                    self.contain(faulted.error, &faulted.name, faulted.address)?;
                    Region::faulted(faulted.name, faulted.address)
                }
            };
            regions.push(region);
        }

        Ok(Members { regions, violated })
    }

    fn node(&mut self, descriptor: Descriptor<W::Layout>, depth: usize) -> WalkResult<Region>
    {
        if !descriptor.kind.is_compound() {
            if let Err(error) = self.memory.probe(descriptor.raw_slot, descriptor.length) {
                self.contain(error, &descriptor.name, descriptor.address)?;
                return Ok(Region::faulted(descriptor.name, descriptor.address));
            }
        }

        let mut region = Region::new(descriptor.name.clone(), descriptor.address, descriptor.length, descriptor.kind);
        region.raw_slot = descriptor.raw_slot;

        if !descriptor.kind.is_compound() || depth > self.threshold {
            return Ok(region);
        }

        match self.walker.children_of(self.memory, &descriptor) {
            Ok(entries) => {
                let members = self.members(entries, depth + 1, &descriptor.name)?;
                trace!(name = %descriptor.name, depth, children = members.regions.len(), "expanded");
                region.corrupt = members.violated;
                region.children = Some(members.regions);
            }
            Err(error) => {
                self.contain(error, &descriptor.name, descriptor.address)?;
                region.corrupt = true;
            }
        }
        Ok(region)
    }
}

/// Length of the root when the walker cannot size the image
fn sections_span(base: Address, sections: &[Region]) -> Option<u64>
{
    sections
        .iter()
        .filter_map(|section| section.end().distance_from(base))
        .max()
}

/// Build the region tree for the image at `image`
///
/// ## Errors
///
/// - `InvalidArgument`: `nesting_threshold` exceeds [`MAX_NESTING_THRESHOLD`]
/// - `AccessorUnavailable`: the accessor cannot serve reads
///
/// ## Example
///
/// ```rust
/// use classwalk_core::builder::{build, ImageLocation};
/// use classwalk_core::memory::SnapshotMemory;
/// use classwalk_core::types::{Address, ByteOrder};
/// use classwalk_core::walker::StoredClassWalker;
///
/// let memory = SnapshotMemory::new();
/// let walker = StoredClassWalker::new(ByteOrder::Little);
///
/// // Nothing is mapped: the root is corrupt, but the build itself succeeds
/// let tree = build(&memory, ImageLocation::new(Address::from(0x1000)), &walker, 2)?;
/// assert!(tree.root.corrupt);
/// assert!(!tree.is_clean());
/// # Ok::<(), classwalk_core::error::WalkError>(())
/// ```
pub fn build<W: SectionWalker>(
    memory: &dyn MemoryAccessor,
    image: ImageLocation,
    walker: &W,
    nesting_threshold: usize,
) -> WalkResult<RegionTree>
{
    if nesting_threshold > MAX_NESTING_THRESHOLD {
        return Err(WalkError::InvalidArgument(format!(
            "nesting threshold {nesting_threshold} exceeds maximum {MAX_NESTING_THRESHOLD}"
        )));
    }
    if let Err(error) = memory.check_available() {
        WalkError::escalate(error)?;
    }

    let root_name = walker.root_name();
    let span = debug_span!("build", base = %image.base, kind = root_name);
    let _enter = span.enter();

    let mut builder = TreeBuilder {
        memory,
        walker,
        threshold: nesting_threshold,
        faults: 0,
        violations: 0,
    };

    let mut corrupt = false;
    let extent = match walker.image_extent(memory, image.base) {
        Ok(extent) => extent,
        Err(error) => {
            builder.contain(error, root_name, image.base)?;
            corrupt = true;
            None
        }
    };

    let children = match walker.top_level_sections(memory, image.base) {
        Ok(entries) => {
            let members = builder.members(entries, 1, root_name)?;
            corrupt |= members.violated;
            Some(members.regions)
        }
        Err(error) => {
            builder.contain(error, root_name, image.base)?;
            corrupt = true;
            None
        }
    };

    let length = extent
        .or_else(|| children.as_deref().and_then(|sections| sections_span(image.base, sections)))
        .or(image.length_hint)
        .unwrap_or(0);

    let mut root = Region::new(root_name, image.base, length, RegionKind::Compound);
    root.children = children;
    root.corrupt = corrupt;

    let tree = RegionTree {
        root,
        kind_name: root_name,
        nesting_threshold,
        faults: builder.faults,
        violations: builder.violations,
    };
    debug!(
        nodes = tree.node_count(),
        faults = tree.faults,
        violations = tree.violations,
        length = tree.root.length,
        "built region tree"
    );
    Ok(tree)
}

#[cfg(test)]
mod tests
{
    use super::*;
    use crate::memory::{AccessResult, SnapshotMemory, UnavailableMemory};
    use crate::types::ScalarType;
    use crate::walker::FaultedEntry;

    /// Two-level fixed layout: a compound of two u32 fields, then a blob
    struct PairWalker
    {
        overlap: bool,
    }

    impl SectionWalker for PairWalker
    {
        type Layout = ();

        fn root_name(&self) -> &'static str
        {
            "pair"
        }

        fn image_extent(&self, _memory: &dyn MemoryAccessor, _base: Address) -> AccessResult<Option<u64>>
        {
            Ok(None)
        }

        fn top_level_sections(&self, _memory: &dyn MemoryAccessor, base: Address) -> AccessResult<Vec<WalkEntry<()>>>
        {
            Ok(vec![
                Ok(descriptor("fields", base, 8, RegionKind::Compound, Some(()))),
                Ok(descriptor("tail", base + 8, 4, RegionKind::Blob, None)),
                Err(FaultedEntry {
                    name: "missing".to_string(),
                    address: base + 12,
                    error: AccessError::fault(base + 12, 4),
                }),
            ])
        }

        fn children_of(&self, _memory: &dyn MemoryAccessor, parent: &Descriptor<()>) -> AccessResult<Vec<WalkEntry<()>>>
        {
            let second = if self.overlap { parent.address + 2 } else { parent.address + 4 };
            let u32 = RegionKind::Scalar(ScalarType::unsigned(4));
            Ok(vec![
                Ok(descriptor("a", parent.address, 4, u32, None)),
                Ok(descriptor("b", second, 4, u32, None)),
            ])
        }
    }

    fn descriptor(name: &str, address: Address, length: u64, kind: RegionKind, layout: Option<()>) -> Descriptor<()>
    {
        Descriptor {
            name: name.to_string(),
            address,
            length,
            kind,
            raw_slot: address,
            layout,
        }
    }

    fn memory() -> SnapshotMemory
    {
        SnapshotMemory::with_segment(Address::from(0x100), vec![0; 12]).unwrap()
    }

    #[test]
    fn test_threshold_zero_lists_sections_unexpanded()
    {
        let tree = build(&memory(), Address::from(0x100).into(), &PairWalker { overlap: false }, 0).unwrap();
        assert_eq!(tree.sections().len(), 3);
        assert!(tree.sections().iter().all(|s| !s.is_expanded()));
        assert!(tree.sections()[0].is_capped());
    }

    #[test]
    fn test_faulted_entry_keeps_siblings()
    {
        let tree = build(&memory(), Address::from(0x100).into(), &PairWalker { overlap: false }, 1).unwrap();
        let names: Vec<&str> = tree.sections().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["fields", "tail", "missing"]);
        assert_eq!(tree.sections()[0].children().len(), 2);

        let missing = &tree.sections()[2];
        assert!(missing.corrupt);
        assert_eq!(missing.length, 0);
        assert_eq!(tree.faults, 1);
        assert_eq!(tree.violations, 0);
        assert_eq!(tree.root.length, 12);
        assert!(!tree.root.corrupt);
    }

    #[test]
    fn test_overlap_marks_parent_corrupt()
    {
        let tree = build(&memory(), Address::from(0x100).into(), &PairWalker { overlap: true }, 1).unwrap();
        let fields = &tree.sections()[0];
        assert!(fields.corrupt);
        assert_eq!(fields.children().len(), 1);
        assert_eq!(tree.violations, 1);
        assert!(!tree.is_clean());
    }

    #[test]
    fn test_threshold_above_maximum_rejected()
    {
        let result = build(
            &memory(),
            Address::from(0x100).into(),
            &PairWalker { overlap: false },
            MAX_NESTING_THRESHOLD + 1,
        );
        assert!(matches!(result, Err(WalkError::InvalidArgument(_))));
    }

    #[test]
    fn test_unavailable_memory_is_fatal()
    {
        let memory = UnavailableMemory::new("detached");
        let result = build(&memory, Address::from(0x100).into(), &PairWalker { overlap: false }, 1);
        assert!(matches!(result, Err(WalkError::AccessorUnavailable(_))));
    }
}
