//! Offline inspection of tablespace files and buffer pool parameters.
#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::error::Error;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use bufcore::primitives::io::{FileIo, FilePageIo, PageIo, StdFileIo};
use bufcore::primitives::pager::{BuddySizeClasses, PageHash};
use bufcore::types::checksum::validate_on_read;
use bufcore::{CacheOptions, ChecksumAlgorithm, PageId, StoredChecksum, Verdict};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "bufcore-inspect",
    version,
    about = "Inspect tablespace pages and buffer pool parameters",
    disable_help_subcommand = true
)]
struct Cli {
    #[arg(
        long,
        global = true,
        env = "BUFCORE_CONFIG",
        help = "Load cache options from a TOML file"
    )]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug, Default)]
struct LayoutArgs {
    #[arg(long, help = "Override log2 of the page size")]
    page_size_shift: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Validate every page of a tablespace file.
    Verify {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long, default_value_t = 0, help = "Tablespace id of the file")]
        space: u32,
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long, help = "Checksum algorithm to validate against")]
        checksum: Option<ChecksumAlgorithm>,
    },
    /// Print the buddy size classes for a page size.
    Sizes {
        #[command(flatten)]
        layout: LayoutArgs,
        #[arg(long, help = "Override log2 of the smallest class")]
        low_shift: Option<u32>,
    },
    /// Show how a page identifier is packed and hashed.
    PageId {
        #[arg(value_name = "SPACE")]
        space: u32,
        #[arg(value_name = "PAGE")]
        page: u32,
    },
}

fn main() {
    install_tracing_subscriber();
    match run() {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(err) => {
            eprintln!("error: {err}");
            process::exit(2);
        }
    }
}

fn install_tracing_subscriber() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run() -> Result<bool, Box<dyn Error>> {
    let cli = Cli::parse();
    let base = match &cli.config {
        Some(path) => CacheOptions::load(path)?,
        None => CacheOptions::default(),
    };

    match cli.command {
        Command::Verify {
            file,
            space,
            layout,
            checksum,
        } => {
            let mut options = apply_layout(base, &layout);
            if let Some(algo) = checksum {
                options.checksum_algorithm = algo;
            }
            options.validate()?;
            cmd_verify(&file, space, &options)
        }
        Command::Sizes { layout, low_shift } => {
            let mut options = apply_layout(base, &layout);
            if let Some(shift) = low_shift {
                options.buddy_low_shift = shift;
            }
            let sizes =
                BuddySizeClasses::with_low_shift(options.page_size_shift, options.buddy_low_shift)?;
            print_sizes(&sizes);
            Ok(true)
        }
        Command::PageId { space, page } => {
            base.validate()?;
            print_page_id(PageId::make(u64::from(space), page), &base);
            Ok(true)
        }
    }
}

fn apply_layout(mut options: CacheOptions, layout: &LayoutArgs) -> CacheOptions {
    if let Some(shift) = layout.page_size_shift {
        options.page_size_shift = shift;
        if options.buddy_low_shift >= shift {
            options.buddy_low_shift = CacheOptions::default()
                .buddy_low_shift
                .min(shift.saturating_sub(1));
        }
    }
    options
}

fn cmd_verify(file: &Path, space: u32, options: &CacheOptions) -> Result<bool, Box<dyn Error>> {
    let page_size = options.page_size();
    let io = StdFileIo::new(File::open(file)?);
    let len = io.len()?;
    if len % page_size as u64 != 0 {
        warn!(len, page_size, "ignoring trailing partial page");
    }
    let pages = FilePageIo::new(page_size);
    pages.register(space, Arc::new(io));
    let count = len / page_size as u64;

    let mut formats: BTreeMap<&'static str, u64> = BTreeMap::new();
    let mut rejected = 0u64;
    let mut buf = vec![0u8; page_size];
    for page_no in 0..count {
        let Ok(page_no) = u32::try_from(page_no) else {
            return Err("file holds more pages than a tablespace can address".into());
        };
        let id = PageId::make(u64::from(space), page_no);
        pages.submit_read(id, &mut buf)?;
        match validate_on_read(&buf, options.checksum_algorithm) {
            Verdict::Accept(format) => *formats.entry(format_name(format)).or_default() += 1,
            Verdict::Reject(reason) => {
                rejected += 1;
                println!("page {id}: {reason}");
            }
        }
    }

    println!(
        "checked {count} pages of {page_size} bytes under {}: {} accepted, {rejected} rejected",
        options.checksum_algorithm,
        count - rejected
    );
    for (name, n) in &formats {
        println!("  {name:<12} {n}");
    }
    Ok(rejected == 0)
}

fn format_name(format: StoredChecksum) -> &'static str {
    match format {
        StoredChecksum::Empty => "empty",
        StoredChecksum::FullCrc32 => "full_crc32",
        StoredChecksum::Crc32 => "crc32",
        StoredChecksum::Innodb => "innodb",
        StoredChecksum::None => "none",
    }
}

fn print_sizes(sizes: &BuddySizeClasses) {
    println!(
        "page size {} bytes, {} classes (at most {} for this low shift)",
        sizes.high(),
        sizes.size_count(),
        sizes.size_count_max()
    );
    for (class, size) in sizes.iter().enumerate() {
        println!("  class {class}: {size} bytes");
    }
}

fn print_page_id(id: PageId, options: &CacheOptions) {
    let hash = PageHash::new(options.hash_buckets, options.page_size());
    println!("page     {id}");
    println!("raw      {:#018x} ({})", id.raw(), id.raw());
    println!("fold     {}", id.fold());
    println!("bucket   {} of {}", hash.bucket_of(id), hash.bucket_count());
}
