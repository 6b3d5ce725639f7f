//! # Summary Aggregation
//!
//! Folds many region trees into per-name statistics.
//!
//! Every visited node counts under its own name. When an expanded node's
//! children cover less than its length, the difference is counted under a
//! synthetic `<name>/Other` entry, so the totals of an image add up to its
//! size even where the layout leaves bytes undescribed.
//!
//! Accumulation is order independent: [`SummaryStats::merge`] is associative
//! and commutative, and equality ignores the order names were first seen in.
//! That order is kept only to lay out reports.

use std::collections::BTreeMap;
use std::io::Write;

use rayon::prelude::*;
use tracing::debug;

use crate::builder::{build, ImageLocation, RegionTree};
use crate::error::WalkResult;
use crate::memory::MemoryAccessor;
use crate::walker::SectionWalker;

/// Statistics for one region name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegionStats
{
    pub count: u64,
    pub total_bytes: u64,
    pub min_bytes: u64,
    pub max_bytes: u64,
    /// Occurrences flagged corrupt
    pub corrupt: u64,
}

impl RegionStats
{
    fn record(&mut self, length: u64, corrupt: bool)
    {
        if self.count == 0 {
            self.min_bytes = length;
            self.max_bytes = length;
        } else {
            self.min_bytes = self.min_bytes.min(length);
            self.max_bytes = self.max_bytes.max(length);
        }
        self.count += 1;
        self.total_bytes = self.total_bytes.saturating_add(length);
        if corrupt {
            self.corrupt += 1;
        }
    }

    fn merge(&mut self, other: &RegionStats)
    {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.count += other.count;
        self.total_bytes = self.total_bytes.saturating_add(other.total_bytes);
        self.min_bytes = self.min_bytes.min(other.min_bytes);
        self.max_bytes = self.max_bytes.max(other.max_bytes);
        self.corrupt += other.corrupt;
    }
}

/// Accumulated statistics over any number of images
#[derive(Debug, Clone, Default)]
pub struct SummaryStats
{
    stats: BTreeMap<String, RegionStats>,
    /// Names in the order they were first seen
    discovery: Vec<String>,
    pub images_visited: u64,
    /// Images with at least one fault or structural violation
    pub corrupt_images: u64,
    pub corrupt_nodes: u64,
    pub structural_violations: u64,
    pub faults: u64,
}

impl PartialEq for SummaryStats
{
    fn eq(&self, other: &Self) -> bool
    {
        self.stats == other.stats
            && self.images_visited == other.images_visited
            && self.corrupt_images == other.corrupt_images
            && self.corrupt_nodes == other.corrupt_nodes
            && self.structural_violations == other.structural_violations
            && self.faults == other.faults
    }
}

/// One line of a summary report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryRow
{
    pub name: String,
    pub stats: RegionStats,
}

impl SummaryStats
{
    pub fn new() -> Self
    {
        Self::default()
    }

    fn entry(&mut self, name: &str) -> &mut RegionStats
    {
        if !self.stats.contains_key(name) {
            self.discovery.push(name.to_string());
        }
        self.stats.entry(name.to_string()).or_default()
    }

    /// Fold one image's tree into the statistics
    pub fn accumulate(&mut self, tree: &RegionTree)
    {
        for (_, region) in tree.root.iter() {
            self.entry(&region.name).record(region.length, region.corrupt);
            if region.corrupt {
                self.corrupt_nodes += 1;
            }

            let covered = region.children_length();
            if region.is_expanded() && covered < region.length {
                let other = format!("{}/Other", region.name);
                self.entry(&other).record(region.length - covered, false);
            }
        }

        self.images_visited += 1;
        if !tree.is_clean() {
            self.corrupt_images += 1;
        }
        self.structural_violations += tree.violations as u64;
        self.faults += tree.faults as u64;
    }

    /// Combine another accumulator into this one
    pub fn merge(&mut self, other: SummaryStats)
    {
        for name in other.discovery {
            if let Some(stats) = other.stats.get(&name) {
                self.entry(&name).merge(stats);
            }
        }
        self.images_visited += other.images_visited;
        self.corrupt_images += other.corrupt_images;
        self.corrupt_nodes += other.corrupt_nodes;
        self.structural_violations += other.structural_violations;
        self.faults += other.faults;
    }

    pub fn get(&self, name: &str) -> Option<&RegionStats>
    {
        self.stats.get(name)
    }

    pub fn is_empty(&self) -> bool
    {
        self.stats.is_empty()
    }

    /// Report rows: observed names from `preferred` in that order, then every
    /// other name in discovery order
    pub fn report(&self, preferred: &[&str]) -> Vec<SummaryRow>
    {
        let row = |name: &str| {
            self.stats.get(name).map(|stats| SummaryRow {
                name: name.to_string(),
                stats: *stats,
            })
        };

        let mut rows: Vec<SummaryRow> = Vec::with_capacity(self.stats.len());
        for name in preferred {
            if rows.iter().all(|r| r.name != *name) {
                rows.extend(row(*name));
            }
        }
        for name in &self.discovery {
            if !preferred.contains(&name.as_str()) {
                rows.extend(row(name.as_str()));
            }
        }
        rows
    }
}

/// Write a tabular report followed by image and corruption totals
///
/// ## Errors
///
/// `Io` if the sink fails.
pub fn write_report<W: Write>(stats: &SummaryStats, preferred: &[&str], show_min_max: bool, out: &mut W) -> WalkResult<()>
{
    if show_min_max {
        writeln!(
            out,
            "{:<32} {:>10} {:>14} {:>10} {:>10} {:>8}",
            "name", "count", "bytes", "min", "max", "corrupt"
        )?;
    } else {
        writeln!(out, "{:<32} {:>10} {:>14} {:>8}", "name", "count", "bytes", "corrupt")?;
    }

    for row in stats.report(preferred) {
        let s = row.stats;
        if show_min_max {
            writeln!(
                out,
                "{:<32} {:>10} {:>14} {:>10} {:>10} {:>8}",
                row.name, s.count, s.total_bytes, s.min_bytes, s.max_bytes, s.corrupt
            )?;
        } else {
            writeln!(out, "{:<32} {:>10} {:>14} {:>8}", row.name, s.count, s.total_bytes, s.corrupt)?;
        }
    }

    writeln!(out)?;
    writeln!(out, "images visited:        {}", stats.images_visited)?;
    writeln!(out, "corrupt images:        {}", stats.corrupt_images)?;
    writeln!(out, "corrupt nodes:         {}", stats.corrupt_nodes)?;
    writeln!(out, "structural violations: {}", stats.structural_violations)?;
    writeln!(out, "faults:                {}", stats.faults)?;
    out.flush()?;
    Ok(())
}

/// Build and fold every image in order
///
/// ## Errors
///
/// Stops at the first fatal build error (unavailable accessor or invalid
/// threshold). Faults inside an image only show up in the statistics.
pub fn aggregate<W: SectionWalker>(
    memory: &dyn MemoryAccessor,
    images: &[ImageLocation],
    walker: &W,
    nesting_threshold: usize,
) -> WalkResult<SummaryStats>
{
    let mut stats = SummaryStats::new();
    for image in images {
        let tree = build(memory, *image, walker, nesting_threshold)?;
        stats.accumulate(&tree);
    }
    debug!(images = stats.images_visited, corrupt = stats.corrupt_images, "aggregated images");
    Ok(stats)
}

/// Like [`aggregate`], with images spread across the rayon thread pool
///
/// Each worker folds into its own [`SummaryStats`]; the partial results are
/// merged at the end, so the result equals the sequential one.
pub fn aggregate_parallel<W: SectionWalker + Sync>(
    memory: &dyn MemoryAccessor,
    images: &[ImageLocation],
    walker: &W,
    nesting_threshold: usize,
) -> WalkResult<SummaryStats>
{
    let stats = images
        .par_iter()
        .map(|image| build(memory, *image, walker, nesting_threshold))
        .try_fold(SummaryStats::new, |mut stats, tree| -> WalkResult<SummaryStats> {
            stats.accumulate(&tree?);
            Ok(stats)
        })
        .try_reduce(SummaryStats::new, |mut left, right| {
            left.merge(right);
            Ok(left)
        })?;
    debug!(
        images = stats.images_visited,
        corrupt = stats.corrupt_images,
        threads = rayon::current_num_threads(),
        "aggregated images in parallel"
    );
    Ok(stats)
}
