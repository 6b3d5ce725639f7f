use std::io::{self, Write};
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use classwalk_core::builder::{build, ImageLocation, RegionTree};
use classwalk_core::config::{WalkConfig, DEFAULT_MAX_DUMP_BYTES, MAX_NESTING_THRESHOLD};
use classwalk_core::error::{WalkError, WalkResult};
use classwalk_core::images::StoredImages;
use classwalk_core::memory::{MemoryAccessor, SnapshotMemory};
use classwalk_core::query::{resolve_parsed, PathQuery, QueryOutcome};
use classwalk_core::render::{render, RenderOptions};
use classwalk_core::summary::{aggregate, aggregate_parallel, write_report};
use classwalk_core::types::{Address, ByteOrder, PointerWidth};
use classwalk_core::walker::{ClassWalker, ImageKind, SectionWalker};
use classwalk_utils::{debug, info, init_logging};

/// Inspect class images inside a frozen process snapshot.
#[derive(Parser, Debug)]
#[command(name = "classwalk")]
#[command(version)]
#[command(about = "Dump, query, and summarize class image layouts from process snapshots", long_about = None)]
struct Cli
{
    #[command(flatten)]
    target: TargetArgs,

    #[command(subcommand)]
    command: Commands,
}

/// Where the snapshot comes from and what produced it
#[derive(Args, Debug)]
struct TargetArgs
{
    /// Raw memory dump to load
    #[arg(long, short = 's', global = true)]
    snapshot: Option<PathBuf>,
    /// Address the snapshot file is mapped at (hex format: 0x1000 or decimal)
    #[arg(long, short = 'b', global = true, default_value = "0", value_parser = parse_address)]
    base: Address,
    /// Extra segments as FILE@ADDRESS, for images that point outside the main dump
    #[arg(long = "segment", global = true, value_parser = parse_segment)]
    segments: Vec<(PathBuf, Address)>,
    /// Image kind to walk
    #[arg(long, short = 'k', global = true, default_value = "stored")]
    kind: ImageKind,
    /// Byte order of the target that produced the snapshot
    #[arg(long, global = true, env = "CLASSWALK_BYTE_ORDER", default_value = "little")]
    byte_order: ByteOrder,
    /// Pointer width of the target in bits
    #[arg(long, global = true, env = "CLASSWALK_POINTER_WIDTH", default_value = "64")]
    pointer_width: PointerWidth,
    /// Nesting threshold: compound regions at this depth or shallower are expanded
    #[arg(long, short = 'd', global = true, env = "CLASSWALK_DEPTH", default_value_t = 2)]
    depth: usize,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// Print the region tree of one image, one region per line
    Dump
    {
        /// Image address (defaults to the snapshot base)
        #[arg(value_parser = parse_address)]
        address: Option<Address>,
        /// Blob bytes shown before the hex dump is cut off
        #[arg(long, default_value_t = DEFAULT_MAX_DUMP_BYTES)]
        dump_bytes: usize,
    },
    /// Resolve slash-separated paths such as /methods/method[1]/bytecodes
    ///
    /// The image is walked to full depth; --depth does not apply.
    Query
    {
        /// Image address
        #[arg(long, short = 'a', value_parser = parse_address)]
        address: Option<Address>,
        /// Paths to resolve against the same tree
        #[arg(required = true)]
        paths: Vec<String>,
    },
    /// Aggregate per-region statistics over many images
    Summary
    {
        /// Image addresses; stored images in the snapshot are enumerated when omitted
        #[arg(value_parser = parse_address)]
        addresses: Vec<Address>,
        /// Build images on the rayon thread pool
        #[arg(long, short = 'p', default_value_t = false)]
        parallel: bool,
        /// Also print minimum and maximum region sizes
        #[arg(long, default_value_t = false)]
        min_max: bool,
    },
}

fn main()
{
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let cli = Cli::parse();

    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run_command(cli: Cli) -> WalkResult<()>
{
    let target = cli.target;
    let mut config = WalkConfig {
        byte_order: target.byte_order,
        pointer_width: target.pointer_width,
        nesting_threshold: target.depth,
        ..WalkConfig::default()
    };
    if let Commands::Dump { dump_bytes, .. } = &cli.command {
        config.max_dump_bytes = *dump_bytes;
    }
    if let Commands::Summary { min_max, .. } = &cli.command {
        config.show_min_max = *min_max;
    }
    config.validate()?;

    let memory = load_snapshot(&target)?;
    let walker = ClassWalker::new(target.kind, config.byte_order, config.pointer_width);
    info!(kind = %target.kind, order = %config.byte_order, width = %config.pointer_width, "walking snapshot");

    match cli.command {
        Commands::Dump { address, .. } => {
            let tree = build_one(&memory, address.unwrap_or(target.base), &walker, &config)?;
            let mut out = io::stdout().lock();
            render(&memory, &tree, &RenderOptions::from(&config), &mut out)?;
            print_tree_status(&tree, &mut out)?;
            Ok(())
        }
        Commands::Query { address, paths } => {
            let image = ImageLocation::new(address.unwrap_or(target.base));
            let mut out = io::stdout().lock();
            query_image(&memory, image, &walker, &paths, config.pointer_width, &mut out)?;
            Ok(())
        }
        Commands::Summary {
            addresses, parallel, ..
        } => {
            let images = image_list(&memory, &addresses, target.kind, config.byte_order)?;
            debug!(count = images.len(), parallel, "summarizing images");
            let stats = if parallel {
                aggregate_parallel(&memory, &images, &walker, config.nesting_threshold)?
            } else {
                aggregate(&memory, &images, &walker, config.nesting_threshold)?
            };
            let mut out = io::stdout().lock();
            write_report(&stats, walker.preferred_order(), config.show_min_max, &mut out)
        }
    }
}

fn load_snapshot(target: &TargetArgs) -> WalkResult<SnapshotMemory>
{
    let path = target
        .snapshot
        .as_ref()
        .ok_or_else(|| WalkError::InvalidArgument("no snapshot given, use --snapshot <FILE>".to_string()))?;

    let mut memory = SnapshotMemory::new();
    memory.load_file(path, target.base)?;
    for (extra, base) in &target.segments {
        memory.load_file(extra, *base)?;
    }
    Ok(memory)
}

fn build_one(memory: &SnapshotMemory, address: Address, walker: &ClassWalker, config: &WalkConfig) -> WalkResult<RegionTree>
{
    build(memory, ImageLocation::new(address), walker, config.nesting_threshold)
}

/// Parse every path, then resolve them all against one fully expanded tree
///
/// A malformed path fails the whole command before the image is touched.
/// Returns how many paths were found.
fn query_image<W: Write>(
    memory: &dyn MemoryAccessor,
    image: ImageLocation,
    walker: &ClassWalker,
    paths: &[String],
    width: PointerWidth,
    out: &mut W,
) -> WalkResult<usize>
{
    let queries = paths
        .iter()
        .map(|path| PathQuery::parse(path))
        .collect::<WalkResult<Vec<_>>>()?;

    let tree = build(memory, image, walker, MAX_NESTING_THRESHOLD)?;
    let mut found = 0;
    for query in &queries {
        match resolve_parsed(&tree, query) {
            QueryOutcome::Found { region, depth } => {
                found += 1;
                writeln!(
                    out,
                    "{query}: {} [{}] depth {depth}{}",
                    region.address.display(width),
                    region.length,
                    if region.corrupt { " <corrupt>" } else { "" }
                )?;
            }
            QueryOutcome::NotFound { segment } => writeln!(out, "{query}: not found at '{segment}'")?,
        }
    }
    Ok(found)
}

fn image_list(
    memory: &SnapshotMemory,
    addresses: &[Address],
    kind: ImageKind,
    order: ByteOrder,
) -> WalkResult<Vec<ImageLocation>>
{
    if !addresses.is_empty() {
        return Ok(addresses.iter().copied().map(ImageLocation::from).collect());
    }
    match kind {
        ImageKind::Stored => Ok(StoredImages::over(memory, order).collect()),
        ImageKind::Loaded => Err(WalkError::InvalidArgument(
            "loaded images cannot be enumerated, pass their addresses".to_string(),
        )),
    }
}

fn print_tree_status<W: Write>(tree: &RegionTree, out: &mut W) -> WalkResult<()>
{
    if tree.is_clean() {
        return Ok(());
    }
    writeln!(
        out,
        "\n{} is corrupt: {} faults, {} structural violations",
        tree.kind_name, tree.faults, tree.violations
    )?;
    Ok(())
}

fn parse_address(s: &str) -> Result<Address, String>
{
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed
        .map(Address::from)
        .map_err(|e| format!("Invalid address '{s}': {e}"))
}

fn parse_segment(s: &str) -> Result<(PathBuf, Address), String>
{
    let (path, address) = s
        .rsplit_once('@')
        .ok_or_else(|| format!("Invalid segment '{s}', expected FILE@ADDRESS"))?;
    if path.is_empty() {
        return Err(format!("Invalid segment '{s}', missing file"));
    }
    Ok((PathBuf::from(path), parse_address(address)?))
}
