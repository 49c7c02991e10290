use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::models::{Element, Model};
use crate::processors::{ConflictPolicy, NaturalKey};
use crate::utils::constants::{
    DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_MAX_WORKERS, DEFAULT_OUTPUT_DIR,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};

#[derive(Parser)]
#[command(name = "model-archiver")]
#[command(about = "Extract weather model forecasts at station locations into Parquet archives")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract station values from remote model files and merge them into the archive
    Extract {
        #[arg(short, long, help = "Model name (nbm, nbmqmd, nbmqmd_exp, hrrr, ...)")]
        model: Model,

        #[arg(short, long, help = "Element name (wind, gust, precip24hr, maxt, mint)")]
        element: Element,

        #[arg(long, help = "First cycle, YYYYMMDDHH or RFC 3339")]
        start: Option<String>,

        #[arg(long, help = "Last cycle, YYYYMMDDHH or RFC 3339 [default: start]")]
        end: Option<String>,

        #[arg(
            long,
            conflicts_with = "start",
            help = "File with one model file URL per line instead of listing cycles"
        )]
        urls: Option<PathBuf>,

        #[arg(short, long, help = "Station roster CSV (stid,latitude,longitude,...)")]
        stations: PathBuf,

        #[arg(short, long, help = "Registry TOML file [default: built-in tables]")]
        registry: Option<PathBuf>,

        #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        #[arg(short, long, default_value = "snappy")]
        compression: String,

        #[arg(long, default_value_t = DEFAULT_MAX_WORKERS)]
        max_workers: usize,

        #[arg(long, default_value_t = num_cpus::get(), help = "Threads for decoding and station assembly")]
        decode_threads: usize,

        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
        timeout_secs: u64,

        #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS)]
        connect_timeout_secs: u64,

        #[arg(long, default_value_t = ConflictPolicy::KeepExisting, help = "keep-existing or prefer-new")]
        conflict_policy: ConflictPolicy,

        #[arg(long, default_value = "full", help = "full or without-init")]
        natural_key: NaturalKey,

        #[arg(long, help = "Write the run report as JSON")]
        report_json: Option<PathBuf>,

        #[arg(long, default_value = "false", help = "List files without fetching")]
        dry_run: bool,
    },

    /// Fetch a sidecar index and show the byte ranges a registry rule selects
    InspectIndex {
        #[arg(short, long, help = "Model file URL (the index is URL + .idx)")]
        url: String,

        #[arg(short, long)]
        model: Model,

        #[arg(short, long)]
        element: Element,

        #[arg(short, long)]
        registry: Option<PathBuf>,

        #[arg(long, default_value_t = DEFAULT_REQUEST_TIMEOUT_SECS)]
        timeout_secs: u64,
    },

    /// Display information about an archive partition
    Info {
        #[arg(short, long)]
        file: PathBuf,

        #[arg(short, long, default_value = "10")]
        sample: usize,
    },
}
