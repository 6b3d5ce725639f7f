//! # Linear Renderer
//!
//! Writes a region tree as text, one node per line, in declaration order:
//!
//! ```text
//! 0x0000000000001000 [      64] romHeader
//! 0x0000000000001000 [       4]   romSize = 256 (0x100)
//! 0x0000000000001040 [      16] constantPool <corrupt>
//! 0x0000000000001080 [      68] methods
//! 0x0000000000001080 [      28]   method
//! 0x0000000000001094 [       5]     bytecodes = 2a b7 00 01 b1
//! ```
//!
//! The columns are the address padded to the target pointer width, the
//! length, then the name indented by [`INDENT`] per level below the top-level
//! sections. The root itself is not printed.
//!
//! Values are re-read from the snapshot at render time; the tree holds none.
//! A value that cannot be re-read prints `<fault>` and rendering goes on.

use std::io::Write;

use crate::builder::RegionTree;
use crate::config::WalkConfig;
use crate::error::{WalkError, WalkResult};
use crate::memory::MemoryAccessor;
use crate::region::{Region, RegionKind};
use crate::types::{ByteOrder, PointerWidth};

/// One indentation level
pub const INDENT: &str = "  ";

/// Output knobs for [`render`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions
{
    pub byte_order: ByteOrder,
    pub pointer_width: PointerWidth,
    /// Same scale as the nesting threshold: top-level sections are always
    /// printed, and a node at depth `d` is printed when `d <= max_depth + 1`
    pub max_depth: usize,
    pub max_dump_bytes: usize,
}

impl From<&WalkConfig> for RenderOptions
{
    fn from(config: &WalkConfig) -> Self
    {
        Self {
            byte_order: config.byte_order,
            pointer_width: config.pointer_width,
            max_depth: config.nesting_threshold,
            max_dump_bytes: config.max_dump_bytes,
        }
    }
}

/// Render `tree` to `out`, returning the number of lines written
///
/// ## Errors
///
/// - `Io`: the sink failed
/// - `AccessorUnavailable`: the accessor went away while re-reading values
pub fn render<W: Write>(
    memory: &dyn MemoryAccessor,
    tree: &RegionTree,
    options: &RenderOptions,
    out: &mut W,
) -> WalkResult<usize>
{
    let mut lines = 0;
    for (depth, region) in tree.root.iter().skip(1) {
        // Top-level sections are depth 1, printed at max_depth 0
        if depth - 1 > options.max_depth {
            continue;
        }
        let value = value_column(memory, region, options)?;
        let marker = if region.corrupt { " <corrupt>" } else { "" };
        writeln!(
            out,
            "{} [{:>8}] {}{}{}{}",
            region.address.display(options.pointer_width),
            region.length,
            INDENT.repeat(depth - 1),
            region.name,
            value,
            marker
        )?;
        lines += 1;
    }
    out.flush()?;
    Ok(lines)
}

/// Render into a `String`
pub fn render_to_string(memory: &dyn MemoryAccessor, tree: &RegionTree, options: &RenderOptions) -> WalkResult<String>
{
    let mut buffer = Vec::new();
    render(memory, tree, options, &mut buffer)?;
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

fn value_column(memory: &dyn MemoryAccessor, region: &Region, options: &RenderOptions) -> WalkResult<String>
{
    match region.kind {
        RegionKind::Compound => Ok(String::new()),
        RegionKind::Scalar(ty) => match memory.read_bytes(region.raw_slot, u64::from(ty.width)) {
            Ok(bytes) => Ok(match ty.decode(&bytes, options.byte_order) {
                Some(value) => format!(" = {value}"),
                None => " = <undecodable>".to_string(),
            }),
            Err(error) => WalkError::escalate(error).map(|_| " = <fault>".to_string()),
        },
        RegionKind::Blob if region.is_expanded() => Ok(" see children".to_string()),
        RegionKind::Blob if region.corrupt => Ok(String::new()),
        RegionKind::Blob if region.length == 0 => Ok(" <empty>".to_string()),
        RegionKind::Blob => {
            let shown = region.length.min(options.max_dump_bytes as u64);
            match memory.read_bytes(region.raw_slot, shown) {
                Ok(bytes) => {
                    let hex: Vec<String> = bytes.iter().map(|byte| format!("{byte:02x}")).collect();
                    let mut dump = format!(" = {}", hex.join(" "));
                    if shown < region.length {
                        dump.push_str(" ...");
                    }
                    Ok(dump)
                }
                Err(error) => WalkError::escalate(error).map(|_| " <fault>".to_string()),
            }
        }
    }
}

/// Recover a node's depth from one rendered line
///
/// Top-level sections are depth 1. Returns `None` for lines that were not
/// produced by [`render`].
pub fn parse_depth(line: &str) -> Option<usize>
{
    let (_, rest) = line.split_once("] ")?;
    let mut depth = 1;
    let mut remaining = rest;
    while let Some(stripped) = remaining.strip_prefix(INDENT) {
        depth += 1;
        remaining = stripped;
    }
    if remaining.is_empty() || remaining.starts_with(' ') {
        return None;
    }
    Some(depth)
}
