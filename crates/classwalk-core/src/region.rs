//! # Regions
//!
//! A [`Region`] is one named, addressed span inside a class image. Trees of
//! regions are produced by [`crate::builder`] and consumed by the renderer,
//! the query resolver, and the summary aggregator.

use crate::types::{Address, ScalarType};

/// What a region holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionKind
{
    /// A single fixed-width value
    Scalar(ScalarType),
    /// Opaque bytes (bytecodes, bitmaps, padding)
    Blob,
    /// A structure made of child regions
    Compound,
}

impl RegionKind
{
    pub fn is_compound(self) -> bool
    {
        matches!(self, RegionKind::Compound)
    }
}

/// A named, addressed, sized span inside one class image
///
/// `children` is `None` until the builder expands the node. A compound node
/// cut off by the nesting threshold keeps `None` and reports only its own
/// length; an expanded compound with no members has `Some(vec![])`.
///
/// Sibling order is declaration order. Addresses are non-decreasing across
/// siblings of any node whose `corrupt` flag is clear.
#[derive(Debug, Clone, PartialEq)]
pub struct Region
{
    pub name: String,
    pub address: Address,
    pub length: u64,
    pub kind: RegionKind,
    /// Where to re-read the value from; values are never retained
    pub raw_slot: Address,
    pub children: Option<Vec<Region>>,
    /// A fault hit this node, or its children broke address ordering
    pub corrupt: bool,
}

impl Region
{
    /// Create an unexpanded, clean region whose value lives at `address`
    pub fn new(name: impl Into<String>, address: Address, length: u64, kind: RegionKind) -> Self
    {
        Self {
            name: name.into(),
            address,
            length,
            kind,
            raw_slot: address,
            children: None,
            corrupt: false,
        }
    }

    /// Placeholder for a node whose decoding faulted
    ///
    /// Faulted nodes become empty blobs: zero length, no children.
    pub fn faulted(name: impl Into<String>, address: Address) -> Self
    {
        Self {
            corrupt: true,
            ..Self::new(name, address, 0, RegionKind::Blob)
        }
    }

    /// Attach children, marking this node as expanded
    #[must_use]
    pub fn with_children(mut self, children: Vec<Region>) -> Self
    {
        self.children = Some(children);
        self
    }

    /// Whether the builder descended into this node
    pub fn is_expanded(&self) -> bool
    {
        self.children.is_some()
    }

    /// A compound that was cut off by the nesting threshold
    pub fn is_capped(&self) -> bool
    {
        self.kind.is_compound() && self.children.is_none() && !self.corrupt
    }

    /// Children in declaration order; empty when not expanded
    pub fn children(&self) -> &[Region]
    {
        self.children.as_deref().unwrap_or(&[])
    }

    /// One past the last byte of this region
    pub fn end(&self) -> Address
    {
        self.address.saturating_add(self.length)
    }

    /// Sum of the direct children's lengths
    pub fn children_length(&self) -> u64
    {
        self.children().iter().map(|c| c.length).sum()
    }

    /// Depth-first, pre-order walk yielding `(depth, region)`
    ///
    /// `self` is yielded at depth 0.
    pub fn iter(&self) -> RegionIter<'_>
    {
        RegionIter { stack: vec![(0, self)] }
    }

    /// Number of nodes in this subtree, including `self`
    pub fn node_count(&self) -> usize
    {
        self.iter().count()
    }
}

/// Pre-order iterator returned by [`Region::iter`]
pub struct RegionIter<'a>
{
    stack: Vec<(usize, &'a Region)>,
}

impl<'a> Iterator for RegionIter<'a>
{
    type Item = (usize, &'a Region);

    fn next(&mut self) -> Option<Self::Item>
    {
        let (depth, region) = self.stack.pop()?;
        self.stack
            .extend(region.children().iter().rev().map(|child| (depth + 1, child)));
        Some((depth, region))
    }
}
