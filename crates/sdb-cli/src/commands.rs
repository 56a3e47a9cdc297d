use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;

use sdb_db::DatabaseConfig;
use sdb_index::IndexRoot;
use sdb_region::{
    decode, BlockKind, BlockRef, ContainerKind, Region, RegionConfig, RegionStats,
};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = region_config(cli.config.as_deref())?;
    match cli.command {
        Command::Init(args) => cmd_init(args, config, cli.format),
        Command::Info(args) => cmd_info(&args.path, config, cli.format),
        Command::Check(args) => cmd_check(&args.path, config, cli.format),
        Command::Grow(args) => cmd_grow(args, config, cli.format),
    }
}

fn region_config(path: Option<&Path>) -> anyhow::Result<RegionConfig> {
    match path {
        Some(path) => Ok(DatabaseConfig::from_file(path)?.region),
        None => Ok(RegionConfig::default()),
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub(crate) struct RegionInfo {
    pub path: PathBuf,
    pub format_version: u32,
    pub revision: u64,
    pub dirty: bool,
    pub stats: RegionStats,
    pub types: Vec<TypeInfo>,
}

#[derive(Debug, Serialize)]
pub(crate) struct TypeInfo {
    pub type_id: u16,
    pub name: String,
    pub next_id: u64,
    pub root_offset: Option<u64>,
    /// Objects listed in the root, if it could be read.
    pub objects: Option<usize>,
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct CheckReport {
    pub blocks: usize,
    pub objects: usize,
    pub roots: usize,
    /// Container blocks by kind.
    pub values: BTreeMap<String, usize>,
    pub free_blocks: usize,
    /// Object blocks no index root lists.
    pub orphans: usize,
    /// Share of interior free space outside the largest free extent.
    pub fragmentation: f64,
    pub problems: Vec<String>,
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

pub(crate) fn init(
    path: &Path,
    size: Option<u64>,
    max_size: Option<u64>,
    mut config: RegionConfig,
) -> anyhow::Result<RegionStats> {
    if path.exists() && std::fs::metadata(path)?.len() > 0 {
        bail!("{} already exists", path.display());
    }
    if let Some(size) = size {
        config.initial_size = size;
    }
    if let Some(max_size) = max_size {
        config.max_size = max_size;
    }
    config.read_only = false;

    let region = Region::open(Some(path), config)
        .with_context(|| format!("cannot create region {}", path.display()))?;
    let stats = region.stats();
    region.close()?;
    Ok(stats)
}

pub(crate) fn inspect(path: &Path, config: RegionConfig) -> anyhow::Result<RegionInfo> {
    let region = open_read_only(path, config)?;
    let header = region.header();
    let types = region
        .types()
        .iter()
        .map(|slot| TypeInfo {
            type_id: slot.type_id,
            name: slot.name.clone(),
            next_id: slot.next_id,
            root_offset: slot.root_offset,
            objects: slot
                .root_offset
                .and_then(|offset| read_root(&region, offset).ok())
                .map(|root| root.len()),
        })
        .collect();

    Ok(RegionInfo {
        path: path.to_path_buf(),
        format_version: header.format_version,
        revision: header.revision,
        dirty: region.is_dirty(),
        stats: region.stats(),
        types,
    })
}

/// Walk every block, verify payload checksums, and cross-check each
/// index root against the type table and the object blocks it lists.
/// A block chain that cannot be walked is an error; everything else is
/// collected into the report.
pub(crate) fn check(path: &Path, config: RegionConfig) -> anyhow::Result<CheckReport> {
    let region = open_read_only(path, config)?;
    let blocks = region.walk().context("block chain is broken")?;
    let mut report = CheckReport {
        blocks: blocks.len(),
        ..CheckReport::default()
    };

    let mut objects: BTreeMap<u64, u16> = BTreeMap::new();
    for (block, header) in &blocks {
        match header.kind {
            BlockKind::Free => {
                report.free_blocks += 1;
                continue;
            }
            BlockKind::Object => {
                objects.insert(block.offset(), header.type_id);
            }
            BlockKind::Root => report.roots += 1,
            BlockKind::Value => {
                let kind = ContainerKind::from_type_id(header.type_id)
                    .map_or("unknown", ContainerKind::name);
                *report.values.entry(kind.to_string()).or_default() += 1;
            }
        }
        if let Err(e) = region.read_checked(*block) {
            report.problems.push(e.to_string());
        }
    }
    report.objects = objects.len();

    let mut listed = BTreeSet::new();
    for slot in region.types() {
        let Some(offset) = slot.root_offset else {
            continue;
        };
        let label = format!("type {} ({})", slot.type_id, slot.name);
        match region.block_header(BlockRef::from_offset(offset)) {
            Ok(header) if header.kind == BlockKind::Root && header.type_id == slot.type_id => {}
            Ok(header) => {
                report.problems.push(format!(
                    "{label}: root at {offset} is a {:?} block of type {}",
                    header.kind, header.type_id
                ));
                continue;
            }
            Err(e) => {
                report.problems.push(format!("{label}: {e}"));
                continue;
            }
        }
        let root = match read_root(&region, offset) {
            Ok(root) => root,
            Err(e) => {
                report
                    .problems
                    .push(format!("{label}: unreadable root at {offset}: {e}"));
                continue;
            }
        };
        if root.type_name != slot.name {
            report
                .problems
                .push(format!("{label}: root names type {:?}", root.type_name));
        }
        if root.next_id != slot.next_id {
            report.problems.push(format!(
                "{label}: root next id {} disagrees with type table {}",
                root.next_id, slot.next_id
            ));
        }
        for &(id, object) in &root.objects {
            if id >= slot.next_id {
                report.problems.push(format!(
                    "{label}: id {id} is not below next id {}",
                    slot.next_id
                ));
            }
            match objects.get(&object) {
                Some(&type_id) if type_id == slot.type_id => {
                    listed.insert(object);
                }
                Some(&type_id) => report.problems.push(format!(
                    "{label}: id {id} points at {object}, an object of type {type_id}"
                )),
                None => report.problems.push(format!(
                    "{label}: id {id} points at {object}, which is not an object block"
                )),
            }
        }
    }

    report.orphans = objects.keys().filter(|offset| !listed.contains(offset)).count();
    report.fragmentation = fragmentation(&region.stats());
    debug!(
        blocks = report.blocks,
        problems = report.problems.len(),
        "region checked"
    );
    Ok(report)
}

pub(crate) fn grow(path: &Path, by: u64, config: RegionConfig) -> anyhow::Result<(u64, RegionStats)> {
    if !path.exists() {
        bail!("{} does not exist", path.display());
    }
    let config = RegionConfig {
        read_only: false,
        ..config
    };
    let mut region = Region::open(Some(path), config)
        .with_context(|| format!("cannot open region {}", path.display()))?;
    let before = region.len();
    region.grow(by)?;
    let stats = region.stats();
    region.close()?;
    Ok((before, stats))
}

fn open_read_only(path: &Path, config: RegionConfig) -> anyhow::Result<Region> {
    let config = RegionConfig {
        read_only: true,
        ..config
    };
    Region::open(Some(path), config).with_context(|| format!("cannot open region {}", path.display()))
}

fn read_root(region: &Region, offset: u64) -> anyhow::Result<IndexRoot> {
    let payload = region.read_checked(BlockRef::from_offset(offset))?;
    Ok(decode(payload)?)
}

fn fragmentation(stats: &RegionStats) -> f64 {
    let tail = stats.size - stats.high_water;
    let interior = stats.free.saturating_sub(tail);
    if interior == 0 {
        0.0
    } else {
        1.0 - stats.largest_free as f64 / interior as f64
    }
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn cmd_init(args: InitArgs, config: RegionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let stats = init(&args.path, args.size, args.max_size, config)?;
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            println!(
                "{} Initialized region {}",
                "✓".green().bold(),
                args.path.display().to_string().bold()
            );
            println!("  Size: {} (max {})", bytes(stats.size), bytes(stats.max_size));
            Ok(())
        }
    }
}

fn cmd_info(path: &Path, config: RegionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let info = inspect(path, config)?;
    if let OutputFormat::Json = format {
        return print_json(&info);
    }

    let stats = &info.stats;
    println!("Region {}", info.path.display().to_string().bold());
    println!("  Format: v{}", info.format_version);
    println!("  Revision: {}", info.revision.to_string().yellow());
    if info.dirty {
        println!("  {}", "dirty: not flushed since its last change".red());
    }
    println!(
        "  Size: {} of {} max, high-water {}",
        bytes(stats.size),
        bytes(stats.max_size),
        bytes(stats.high_water)
    );
    println!(
        "  Used: {} in {} blocks, free {} in {} extents",
        bytes(stats.used),
        stats.live_blocks,
        bytes(stats.free),
        stats.free_blocks
    );
    if info.types.is_empty() {
        println!("\nNo types registered.");
        return Ok(());
    }
    println!("\n{}", "Types".bold());
    for ty in &info.types {
        let objects = ty
            .objects
            .map_or_else(|| "unpersisted".dimmed().to_string(), |n| n.to_string());
        println!(
            "  {:>5}  {:<24} next id {:<8} objects {}",
            ty.type_id,
            ty.name.cyan(),
            ty.next_id,
            objects
        );
    }
    Ok(())
}

fn cmd_check(path: &Path, config: RegionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let report = check(path, config)?;
    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            println!(
                "Blocks: {} ({} objects, {} roots, {} free)",
                report.blocks, report.objects, report.roots, report.free_blocks
            );
            for (kind, count) in &report.values {
                println!("  {kind}: {count}");
            }
            println!("Fragmentation: {:.1}%", report.fragmentation * 100.0);
            if report.orphans > 0 {
                println!(
                    "{} {} object blocks are not listed by any index root",
                    "!".yellow().bold(),
                    report.orphans
                );
            }
            for problem in &report.problems {
                println!("{} {problem}", "✗".red().bold());
            }
            if report.problems.is_empty() {
                println!("{} No issues.", "✓".green().bold());
            }
        }
    }
    if !report.problems.is_empty() {
        bail!("{} problem(s) found", report.problems.len());
    }
    Ok(())
}

fn cmd_grow(args: GrowArgs, config: RegionConfig, format: OutputFormat) -> anyhow::Result<()> {
    let (before, stats) = grow(&args.path, args.by, config)?;
    match format {
        OutputFormat::Json => print_json(&stats),
        OutputFormat::Text => {
            println!(
                "{} Grew {} from {} to {}",
                "✓".green().bold(),
                args.path.display().to_string().bold(),
                bytes(before),
                bytes(stats.size)
            );
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
