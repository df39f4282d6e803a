use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Dispatch;
use tracing_subscriber::EnvFilter;
use txr::scanner::DEFAULT_PATTERN;
use txr::{Archiver, Extractor, HashAlgo, HashCheck, Index};

#[derive(Parser)]
#[command(name = "txr")]
#[command(about = "Merge files into an indexed data blob and split them back")]
struct Cli {
    /// More log output (repeat for debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create archive from directory
    Create {
        /// Archive root directory
        root: PathBuf,
        /// Glob pattern, relative to the root
        #[arg(long, default_value = DEFAULT_PATTERN)]
        pattern: String,
        /// Index file [default: <ROOT>.txr]
        #[arg(long)]
        index: Option<PathBuf>,
        /// Data file [default: <ROOT>.txd]
        #[arg(long)]
        data: Option<PathBuf>,
        /// Hash algorithm (sha256, sha512, blake3)
        #[arg(long, default_value = "sha256")]
        hash: HashAlgo,
        /// Compute the index without writing anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Extract archive to directory
    Extract {
        /// Index file
        index: PathBuf,
        /// Data file [default: <INDEX> with .txd extension]
        #[arg(long)]
        data: Option<PathBuf>,
        /// Output directory [default: <INDEX> without extension]
        #[arg(long)]
        target: Option<PathBuf>,
        /// Log hash mismatches instead of failing
        #[arg(long, conflicts_with = "no_verify")]
        lenient: bool,
        /// Skip hash verification
        #[arg(long)]
        no_verify: bool,
        /// Do not require the sentinel after each file
        #[arg(long)]
        no_sentinel_check: bool,
    },
    /// Check every entry against the data file without writing
    Verify {
        /// Index file
        index: PathBuf,
        /// Data file [default: <INDEX> with .txd extension]
        #[arg(long)]
        data: Option<PathBuf>,
    },
    /// List archive entries
    List {
        /// Index file
        index: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let dispatch = log_dispatch(cli.verbose, cli.quiet);

    match run(cli.command, dispatch) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("txr: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn log_dispatch(verbose: u8, quiet: bool) -> Dispatch {
    let level = match (quiet, verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, _) => "debug",
    };
    let filter = if quiet || verbose > 0 {
        EnvFilter::new(level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
    };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    Dispatch::new(subscriber)
}

fn run(command: Commands, dispatch: Dispatch) -> txr::Result<()> {
    match command {
        Commands::Create {
            root,
            pattern,
            index,
            data,
            hash,
            dry_run,
        } => {
            let archived = Archiver::new()
                .hash(hash)
                .write_index(!dry_run)
                .write_data(!dry_run)
                .dispatch(dispatch)
                .archive_dir(&root, &pattern, index.as_deref(), data.as_deref())?;
            let header = &archived.index.header;
            if dry_run {
                println!("Dry run, nothing written");
            } else {
                println!("Created index: {}", archived.index_path.display());
                println!("  Data: {}", archived.data_path.display());
            }
            println!("  Files: {}", header.file_count);
            println!("  Total bytes: {}", header.total_bytes);
            println!("  Hash: {}", header.hash);
        }
        Commands::Extract {
            index,
            data,
            target,
            lenient,
            no_verify,
            no_sentinel_check,
        } => {
            let check = if no_verify {
                HashCheck::Skip
            } else if lenient {
                HashCheck::Lenient
            } else {
                HashCheck::Strict
            };
            let entries = Extractor::new()
                .verify(check)
                .verify_sentinel(!no_sentinel_check)
                .dispatch(dispatch)
                .extract(&index, data.as_deref(), target.as_deref())?;
            println!("Extracted {} files", entries.len());
        }
        Commands::Verify { index, data } => {
            let entries = Extractor::new()
                .write_files(false)
                .dispatch(dispatch)
                .extract(&index, data.as_deref(), None)?;
            println!("OK: {} files verified", entries.len());
        }
        Commands::List { index } => {
            let index = Index::open(&index)?;
            for entry in &index.entries {
                println!(
                    "{:>5} {:>12} {} {}",
                    entry.idx, entry.filesize, entry.hash, entry.filename
                );
            }
        }
    }

    Ok(())
}
