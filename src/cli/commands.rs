use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use crate::cli::args::{Cli, Commands};
use crate::decoders::GribDecoder;
use crate::error::{ArchiverError, Result};
use crate::models::{Element, Model, RemoteFileDescriptor};
use crate::processors::{
    ConflictPolicy, DedupMergeStore, ExtractionWorker, NaturalKey, ParallelScheduler,
};
use crate::readers::{IndexCatalog, StationReader};
use crate::registry::ModelRegistry;
use crate::remote::{descriptor_from_url, FileLister, HttpSource, RemoteSource};
use crate::utils::constants::DEFAULT_CONNECT_TIMEOUT_SECS;
use crate::utils::progress::ProgressReporter;
use crate::writers::ParquetWriter;

pub async fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose, cli.log_file.as_deref())?;

    match cli.command {
        Commands::Extract {
            model,
            element,
            start,
            end,
            urls,
            stations,
            registry,
            output_dir,
            compression,
            max_workers,
            decode_threads,
            timeout_secs,
            connect_timeout_secs,
            conflict_policy,
            natural_key,
            report_json,
            dry_run,
        } => {
            let registry = Arc::new(load_registry(registry.as_deref())?);
            // Fail before listing or fetching anything
            registry.spec(model, element)?;

            let descriptors = match urls {
                Some(path) => read_url_list(&path, model, element)?,
                None => {
                    let start = start.ok_or_else(|| {
                        ArchiverError::Config("Either --start or --urls is required".to_string())
                    })?;
                    let start = parse_cycle(&start)?;
                    let end = match end {
                        Some(end) => parse_cycle(&end)?,
                        None => start,
                    };
                    FileLister::new(Arc::clone(&registry)).list(model, element, start, end)?
                }
            };

            println!("Extracting {} {} from {} files", model, element, descriptors.len());
            println!("Output directory: {}", output_dir.display());
            println!("Workers: {}, decode threads: {}", max_workers, decode_threads);

            if dry_run {
                for descriptor in &descriptors {
                    println!("  {}", descriptor.url);
                }
                return Ok(());
            }

            let stations = StationReader::new().read_stations(&stations)?;
            if stations.is_empty() {
                return Err(ArchiverError::Config(
                    "Station roster contains no usable stations".to_string(),
                ));
            }
            println!("Loaded {} stations", stations.len());

            if let Err(e) = rayon::ThreadPoolBuilder::new()
                .num_threads(decode_threads.max(1))
                .build_global()
            {
                warn!("Decode thread pool already initialised: {}", e);
            }

            let source = HttpSource::new(
                Duration::from_secs(timeout_secs),
                Duration::from_secs(connect_timeout_secs),
            )?;
            let worker = Arc::new(ExtractionWorker::new(
                Arc::new(source),
                Arc::new(GribDecoder::new()),
                Arc::new(stations),
            ));

            let progress = ProgressReporter::new(
                descriptors.len() as u64,
                "Extracting station values...",
                false,
            );
            let scheduler = ParallelScheduler::new(max_workers);
            let mut output = scheduler
                .run(worker, &registry, descriptors, Some(&progress))
                .await?;

            let writer = ParquetWriter::new().with_compression(&compression)?;
            let store = build_store(output_dir, writer, conflict_policy, natural_key);
            let summaries = store.merge_partitioned(model, element, output.records)?;
            output.report.add_partitions(summaries);

            println!("\n{}", output.report.generate_summary());

            if let Some(path) = report_json {
                output.report.write_json(&path)?;
                info!(path = %path.display(), "Wrote run report");
            }

            if output.report.is_complete() {
                println!("Extraction complete!");
            } else {
                println!(
                    "⚠️  {} of {} files skipped",
                    output.report.files_skipped, output.report.files_submitted
                );
            }
        }

        Commands::InspectIndex {
            url,
            model,
            element,
            registry,
            timeout_secs,
        } => {
            let registry = load_registry(registry.as_deref())?;
            let spec = registry.spec(model, element)?;

            let source = HttpSource::new(
                Duration::from_secs(timeout_secs),
                Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            )?;
            let descriptor = RemoteFileDescriptor::new(url.as_str(), model, element, Utc::now(), 0);
            let index_url = descriptor.index_url();

            println!("Fetching index: {}", index_url);
            let text = source.get_text(&index_url).await?;
            let mut catalog = IndexCatalog::parse(&text)?;
            if let Some(length) = source.content_length(&url).await? {
                catalog = catalog.with_content_length(length);
            }
            println!("Index entries: {}", catalog.len());

            match catalog.select(&spec.rule, &url) {
                Ok(selection) => {
                    println!("\nMatched {} fields:", selection.len());
                    for m in &selection.matches {
                        println!(
                            "  {:>4}  {:<8} bytes {:<24} {}",
                            m.entry_index + 1,
                            m.parameter.as_deref().unwrap_or("?"),
                            m.range.to_string(),
                            m.tokens.join(", ")
                        );
                    }
                    println!("\nRequest ranges:");
                    for range in selection.ranges() {
                        println!("  {}", range.header_value());
                    }
                }
                Err(e) => println!("\n⚠️  {} (stage: {})", e, e.stage()),
            }
        }

        Commands::Info { file, sample } => {
            println!("Analyzing partition: {}", file.display());

            let writer = ParquetWriter::new();
            let file_info = writer.get_file_info(&file)?;
            println!("\n{}", file_info.summary());

            if sample > 0 {
                println!("\nSample Records (showing {} records):", sample);
                match writer.read_sample_records(&file, sample) {
                    Ok(records) => {
                        for (i, record) in records.iter().enumerate() {
                            let values: Vec<String> = record
                                .values
                                .iter()
                                .map(|(name, value)| format!("{}={}", name, value))
                                .collect();
                            println!(
                                "{}. {} init {} f{:03} valid {}: {}",
                                i + 1,
                                record.station_id,
                                record.init_time.format("%Y-%m-%d %HZ"),
                                record.forecast_hour,
                                record.valid_time.format("%Y-%m-%d %HZ"),
                                values.join(", ")
                            );
                        }
                    }
                    Err(e) => println!("Error reading sample data: {}", e),
                }
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let builder = FmtSubscriber::builder().with_max_level(level).with_target(false);

    let result = match log_file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing::subscriber::set_global_default(
                builder.with_ansi(false).with_writer(Mutex::new(file)).finish(),
            )
        }
        None => tracing::subscriber::set_global_default(builder.finish()),
    };

    result.map_err(|e| ArchiverError::Config(format!("Failed to initialise logging: {}", e)))
}

fn load_registry(path: Option<&Path>) -> Result<ModelRegistry> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading registry");
            ModelRegistry::from_file(path)
        }
        None => ModelRegistry::builtin(),
    }
}

fn build_store(
    root: PathBuf,
    writer: ParquetWriter,
    policy: ConflictPolicy,
    natural_key: NaturalKey,
) -> DedupMergeStore {
    DedupMergeStore::new(root)
        .with_writer(writer)
        .with_policy(policy)
        .with_natural_key(natural_key)
}

/// One URL per line; blank lines and `#` comments are ignored.
pub fn read_url_list(path: &Path, model: Model, element: Element) -> Result<Vec<RemoteFileDescriptor>> {
    fs::read_to_string(path)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|url| descriptor_from_url(url, model, element))
        .collect()
}

/// Accepts `YYYYMMDDHH` or an RFC 3339 timestamp.
pub fn parse_cycle(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
        let naive = NaiveDateTime::parse_from_str(&format!("{}00", value), "%Y%m%d%H%M")?;
        return Ok(naive.and_utc());
    }
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
