use chrono::{TimeZone, Utc};
use model_archiver::decoders::GridDecoder;
use model_archiver::error::Result;
use model_archiver::models::{Element, GridField, GridGeometry, Model, RemoteFileDescriptor};
use model_archiver::processors::{
    ConflictPolicy, DedupMergeStore, ExtractionWorker, ParallelScheduler,
};
use model_archiver::readers::StationReader;
use model_archiver::registry::ModelRegistry;
use model_archiver::remote::{FileLister, MemorySource};
use model_archiver::utils::filename::PartitionKey;
use model_archiver::writers::ParquetWriter;
use model_archiver::SkipStage;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// Decodes a buffer of newline-separated field names into constant fields on
/// a 2x2 grid around Anchorage.
struct ConstantFieldDecoder;

impl GridDecoder for ConstantFieldDecoder {
    fn decode(&self, buffer: &[u8]) -> Result<Vec<GridField>> {
        let geometry = Arc::new(GridGeometry::regular(&[61.0, 62.0], &[-150.0, -149.0])?);
        String::from_utf8_lossy(buffer)
            .lines()
            .filter(|l| !l.is_empty())
            .map(|name| {
                let value = match name {
                    "WIND" => 5.0,
                    "WDIR" => 180.0,
                    _ => 10.0,
                };
                GridField::new(name, vec![value; 4], Arc::clone(&geometry))
            })
            .collect()
    }
}

const ROSTER: &str = "\
stid,name,latitude,longitude,elevation
PANC,Anchorage,61.17,-150.02,40
PAMR,Merrill Field,61.21,-149.85,42
PAXX,Nowhere,,,
";

fn registry() -> Result<ModelRegistry> {
    ModelRegistry::from_file(&Path::new(env!("CARGO_MANIFEST_DIR")).join("config/registry.toml"))
}

fn remote_files(descriptors: &[RemoteFileDescriptor], missing: &str) -> MemorySource {
    let mut source = MemorySource::new();
    for d in descriptors {
        if d.url == missing {
            continue;
        }
        let index = "\
1:0:d=2025013118:WIND:10 m above ground:5 hour fcst:
2:5:d=2025013118:WDIR:10 m above ground:5 hour fcst:
3:10:d=2025013118:WIND:10 m above ground:5 hour fcst:ens std dev
4:15:d=2025013118:GUST:10 m above ground:5 hour fcst:
";
        source = source
            .with_file(d.url.clone(), "WIND\nWDIR\nXXXX\nGUST\n")
            .with_file(d.index_url(), index);
    }
    source
}

#[tokio::test]
async fn test_extract_merge_and_reread() -> Result<()> {
    let registry = Arc::new(registry()?);
    let start = Utc.with_ymd_and_hms(2025, 1, 31, 18, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

    let descriptors = FileLister::new(Arc::clone(&registry)).list(Model::Nbm, Element::Wind, start, end)?;
    assert_eq!(descriptors.len(), 16);

    let missing = descriptors[3].url.clone();
    let source = remote_files(&descriptors, &missing);
    let stations = StationReader::new().read_from(ROSTER.as_bytes())?;
    assert_eq!(stations.len(), 2);

    let worker = Arc::new(ExtractionWorker::new(
        Arc::new(source),
        Arc::new(ConstantFieldDecoder),
        Arc::new(stations),
    ));
    let output = ParallelScheduler::new(4)
        .run(Arc::clone(&worker), &registry, descriptors, None)
        .await?;

    assert_eq!(output.report.files_submitted, 16);
    assert_eq!(output.report.files_succeeded, 15);
    assert_eq!(output.report.skips_by_stage[&SkipStage::Index], 1);
    assert_eq!(output.report.skipped_files[0].url, missing);
    assert_eq!(output.records.len(), 30);
    // Both stations share one grid, located once
    assert_eq!(worker.cell_index().grid_count(), 1);

    let archive = TempDir::new()?;
    let store = DedupMergeStore::new(archive.path());
    let summaries = store.merge_partitioned(Model::Nbm, Element::Wind, output.records.clone())?;
    assert_eq!(summaries.len(), 2);
    assert_eq!(summaries.iter().map(|s| s.rows_added).sum::<usize>(), 30);

    let january = PartitionKey::for_time(Model::Nbm, Element::Wind, start).path_under(archive.path());
    assert!(january.ends_with("nbm/wind/2025_01_nbm_wind_archive.parquet"));

    let data = ParquetWriter::new().read_partition(&january)?;
    assert_eq!(data.records.len(), 14);
    assert_eq!(
        data.variables,
        vec!["wind_dir_deg".to_string(), "wind_gust_kt".to_string(), "wind_speed_kt".to_string()]
    );
    let first = &data.records[0];
    assert_eq!(first.station_id, "PAMR");
    assert_eq!(first.init_time, start);
    assert_eq!(first.value("wind_speed_kt"), Some(9.72));
    assert_eq!(first.value("wind_dir_deg"), Some(180.0));
    assert_eq!(first.value("wind_gust_kt"), Some(19.44));

    // Re-running the same batch leaves both partitions untouched
    let rerun = DedupMergeStore::new(archive.path())
        .with_policy(ConflictPolicy::PreferNew)
        .merge_partitioned(Model::Nbm, Element::Wind, output.records)?;
    assert!(rerun.iter().all(|s| s.rows_added == 0 && s.rows_replaced == 0 && !s.rewritten));
    assert_eq!(rerun.iter().map(|s| s.rows_after).sum::<usize>(), 30);

    Ok(())
}

#[tokio::test]
async fn test_unregistered_pair_fails_before_fetching() -> Result<()> {
    let registry = registry()?;
    let descriptor = RemoteFileDescriptor::new(
        "https://example.com/blend.20250101/12/qmd/blend.t12z.qmd.f024.ak.grib2",
        Model::NbmqmdExp,
        Element::Mint,
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap(),
        24,
    );
    let source = Arc::new(MemorySource::new());
    let worker = Arc::new(ExtractionWorker::new(
        Arc::clone(&source) as Arc<dyn model_archiver::remote::RemoteSource>,
        Arc::new(ConstantFieldDecoder),
        Arc::new(Vec::new()),
    ));

    let result = ParallelScheduler::new(2)
        .run(worker, &registry, vec![descriptor], None)
        .await;
    assert!(result.is_err());
    assert_eq!(source.range_requests(), 0);
    Ok(())
}
