use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use clap::Parser;
use rfxvote::{calculator::VoteCalculator, config::RfxConfigStore, dump_parser::DumpWiki};
use tracing_subscriber::EnvFilter;

/// Count in which sections a user voted on the RfX pages of a MediaWiki XML export.
#[derive(Debug, clap::Parser)]
struct CommandLine {
    /// XML export containing the RfX pages (`.zst` compressed exports are supported)
    input_file: PathBuf,
    /// Domain of the exported wiki, e.g. en.wikipedia.org
    #[arg(long)]
    project: String,
    /// User whose votes are counted
    #[arg(long)]
    user: String,
    /// YAML file with RfX configurations, replaces the built-in one
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

fn open_export(path: &Path) -> Result<Box<dyn BufRead>> {
    let file = File::open(path).with_context(|| format!("file not found: {}", path.display()))?;
    let reader = BufReader::new(file);

    if path.extension().is_some_and(|ext| ext == "zst") {
        let decoder = zstd::stream::Decoder::with_buffer(reader)
            .with_context(|| format!("failed to open zstd stream: {}", path.display()))?;
        Ok(Box::new(BufReader::new(decoder)))
    } else {
        Ok(Box::new(reader))
    }
}

fn main() -> Result<()> {
    let args = CommandLine::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let loaded_store;
    let store = match &args.config {
        Some(path) => {
            loaded_store = RfxConfigStore::from_path(path)
                .with_context(|| format!("failed to load configuration: {}", path.display()))?;
            &loaded_store
        }
        None => RfxConfigStore::builtin(),
    };

    let wiki = DumpWiki::from_reader(open_export(&args.input_file)?)
        .with_context(|| format!("failed to read export: {}", args.input_file.display()))?;
    let project = wiki.project(&args.project);

    let Some(config) = store.config_for(&project) else {
        bail!("the RfX vote calculator is not available for {}", project.domain);
    };

    let report = VoteCalculator::new(&wiki, &wiki).compute_totals(&project, &args.user, &config)?;
    if report.is_partial() {
        tracing::warn!(
            message = "Some votes could not be counted",
            skipped_pages = report.skipped_pages.len(),
            unavailable_prefixes = report.unavailable_prefixes.len()
        );
    }

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
