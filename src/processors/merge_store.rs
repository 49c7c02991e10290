use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::error::{ArchiverError, Result};
use crate::models::{Element, ExtractionRecord, Model};
use crate::utils::filename::PartitionKey;
use crate::writers::ParquetWriter;

/// Which row survives when an incoming record's key already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum ConflictPolicy {
    /// The persisted row is kept; the incoming duplicate is dropped.
    #[default]
    KeepExisting,
    /// The incoming row replaces the persisted one.
    PreferNew,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictPolicy::KeepExisting => f.write_str("keep-existing"),
            ConflictPolicy::PreferNew => f.write_str("prefer-new"),
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "keep-existing" => Ok(ConflictPolicy::KeepExisting),
            "prefer-new" => Ok(ConflictPolicy::PreferNew),
            other => Err(ArchiverError::Config(format!(
                "Unknown conflict policy: '{}'",
                other
            ))),
        }
    }
}

/// Columns that identify a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum NaturalKey {
    /// station_id, init_time, forecast_hour, valid_time
    #[default]
    Full,
    /// station_id, valid_time, forecast_hour; for archives whose init time
    /// was reconstructed rather than observed
    WithoutInit,
}

impl FromStr for NaturalKey {
    type Err = ArchiverError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "full" => Ok(NaturalKey::Full),
            "without-init" => Ok(NaturalKey::WithoutInit),
            other => Err(ArchiverError::Config(format!("Unknown natural key: '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowKey {
    station_id: String,
    init_time: Option<DateTime<Utc>>,
    forecast_hour: u32,
    valid_time: DateTime<Utc>,
}

impl NaturalKey {
    fn key_of(&self, record: &ExtractionRecord) -> RowKey {
        RowKey {
            station_id: record.station_id.clone(),
            init_time: match self {
                NaturalKey::Full => Some(record.init_time),
                NaturalKey::WithoutInit => None,
            },
            forecast_hour: record.forecast_hour,
            valid_time: record.valid_time,
        }
    }
}

/// Rows of one merge, before persisting.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedRows {
    pub records: Vec<ExtractionRecord>,
    pub added: usize,
    pub replaced: usize,
}

/// Union existing and incoming rows with one row per key. Duplicates within
/// either side keep their first occurrence; conflicts across sides follow
/// `policy`. Output is sorted by key so equal inputs persist identically.
pub fn dedup_merge(
    existing: Vec<ExtractionRecord>,
    incoming: Vec<ExtractionRecord>,
    policy: ConflictPolicy,
    natural_key: NaturalKey,
) -> MergedRows {
    let mut records: Vec<ExtractionRecord> = Vec::with_capacity(existing.len() + incoming.len());
    let mut positions: HashMap<RowKey, usize> = HashMap::new();

    for record in existing {
        let key = natural_key.key_of(&record);
        if !positions.contains_key(&key) {
            positions.insert(key, records.len());
            records.push(record);
        }
    }

    let mut added = 0;
    let mut replaced = 0;
    let mut seen_incoming = HashSet::new();
    for record in incoming {
        let key = natural_key.key_of(&record);
        if !seen_incoming.insert(key.clone()) {
            continue;
        }

        match positions.get(&key) {
            None => {
                positions.insert(key, records.len());
                records.push(record);
                added += 1;
            }
            Some(&i) => {
                if policy == ConflictPolicy::PreferNew && records[i] != record {
                    records[i] = record;
                    replaced += 1;
                }
            }
        }
    }

    records.sort_by(|a, b| {
        a.station_id
            .cmp(&b.station_id)
            .then_with(|| a.init_time.cmp(&b.init_time))
            .then_with(|| a.forecast_hour.cmp(&b.forecast_hour))
            .then_with(|| a.valid_time.cmp(&b.valid_time))
    });

    MergedRows {
        records,
        added,
        replaced,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeSummary {
    pub partition: PathBuf,
    pub rows_before: usize,
    pub rows_incoming: usize,
    pub rows_added: usize,
    pub rows_replaced: usize,
    pub rows_after: usize,
    pub rewritten: bool,
}

/// Persists extraction records into monthly Parquet partitions with
/// key-based deduplication. Each merge reads, merges and atomically replaces
/// one partition file; there is no cross-process locking, so merges into the
/// same partition must not run concurrently.
pub struct DedupMergeStore {
    root: PathBuf,
    writer: ParquetWriter,
    policy: ConflictPolicy,
    natural_key: NaturalKey,
}

impl DedupMergeStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            writer: ParquetWriter::new(),
            policy: ConflictPolicy::default(),
            natural_key: NaturalKey::default(),
        }
    }

    pub fn with_writer(mut self, writer: ParquetWriter) -> Self {
        self.writer = writer;
        self
    }

    pub fn with_policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_natural_key(mut self, natural_key: NaturalKey) -> Self {
        self.natural_key = natural_key;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        key.path_under(&self.root)
    }

    /// Split records by init-time month and merge each partition in turn.
    pub fn merge_partitioned(
        &self,
        model: Model,
        element: Element,
        records: Vec<ExtractionRecord>,
    ) -> Result<Vec<MergeSummary>> {
        let mut partitions: BTreeMap<PartitionKey, Vec<ExtractionRecord>> = BTreeMap::new();
        for record in records {
            partitions
                .entry(PartitionKey::for_time(model, element, record.init_time))
                .or_default()
                .push(record);
        }

        partitions
            .into_iter()
            .map(|(key, records)| self.merge(&key, records))
            .collect()
    }

    pub fn merge(&self, key: &PartitionKey, incoming: Vec<ExtractionRecord>) -> Result<MergeSummary> {
        let path = self.partition_path(key);
        let rows_incoming = incoming.len();

        let existing = if path.exists() {
            self.writer.read_partition(&path)?
        } else {
            Default::default()
        };
        let rows_before = existing.records.len();

        let mut variables = existing.variables.clone();
        let known: BTreeSet<String> = variables.iter().cloned().collect();
        let new_names: BTreeSet<String> = incoming
            .iter()
            .flat_map(|r| r.values.keys().cloned())
            .filter(|name| !known.contains(name))
            .collect();
        let schema_grew = !new_names.is_empty();
        variables.extend(new_names);

        let merged = dedup_merge(existing.records, incoming, self.policy, self.natural_key);
        let rows_after = merged.records.len();
        // Duplicate keys already on disk collapse in memory and must be written back
        let collapsed = rows_after != rows_before + merged.added;
        let changed = merged.added > 0 || merged.replaced > 0 || schema_grew || collapsed;

        let rewritten = if changed && rows_after > 0 {
            self.write_atomic(&path, &merged.records, &variables)?;
            true
        } else {
            false
        };

        info!(
            partition = %path.display(),
            before = rows_before,
            added = merged.added,
            replaced = merged.replaced,
            after = rows_after,
            "Merged partition"
        );

        Ok(MergeSummary {
            partition: path,
            rows_before,
            rows_incoming,
            rows_added: merged.added,
            rows_replaced: merged.replaced,
            rows_after,
            rewritten,
        })
    }

    fn write_atomic(&self, path: &Path, records: &[ExtractionRecord], variables: &[String]) -> Result<()> {
        let dir = path.parent().ok_or_else(|| {
            ArchiverError::DataMerge(format!("Partition path has no parent: {}", path.display()))
        })?;
        std::fs::create_dir_all(dir)?;

        let mut temp = NamedTempFile::new_in(dir)?;
        self.writer.write_to(records, variables, temp.as_file_mut())?;
        temp.persist(path).map_err(|e| ArchiverError::Io(e.error))?;

        debug!(partition = %path.display(), rows = records.len(), "Replaced partition file");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn init() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
    }

    fn speed(station: &str, init_time: DateTime<Utc>, hour: u32, value: f64) -> ExtractionRecord {
        ExtractionRecord::builder()
            .station_id(station)
            .init_time(init_time)
            .forecast_hour(hour)
            .value("wind_speed_kt", value)
            .build()
            .unwrap()
    }

    fn key() -> PartitionKey {
        PartitionKey::for_time(Model::Nbm, Element::Wind, init())
    }

    #[test]
    fn test_first_merge_creates_partition() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());

        let summary = store.merge(&key(), vec![speed("X", init(), 24, 10.5)])?;
        assert_eq!(summary.rows_before, 0);
        assert_eq!(summary.rows_after, 1);
        assert!(summary.rewritten);
        assert!(summary.partition.ends_with("nbm/wind/2025_01_nbm_wind_archive.parquet"));

        let data = ParquetWriter::new().read_partition(&summary.partition)?;
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].value("wind_speed_kt"), Some(10.5));
        Ok(())
    }

    #[test]
    fn test_existing_row_wins_by_default() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());

        store.merge(&key(), vec![speed("X", init(), 24, 10.5)])?;
        let summary = store.merge(&key(), vec![speed("X", init(), 24, 99.0)])?;

        assert_eq!(summary.rows_added, 0);
        assert_eq!(summary.rows_replaced, 0);
        assert!(!summary.rewritten);

        let data = ParquetWriter::new().read_partition(&summary.partition)?;
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].value("wind_speed_kt"), Some(10.5));
        Ok(())
    }

    #[test]
    fn test_prefer_new_replaces_row() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path()).with_policy(ConflictPolicy::PreferNew);

        store.merge(&key(), vec![speed("X", init(), 24, 10.5)])?;
        let summary = store.merge(&key(), vec![speed("X", init(), 24, 99.0)])?;

        assert_eq!(summary.rows_replaced, 1);
        let data = ParquetWriter::new().read_partition(&summary.partition)?;
        assert_eq!(data.records.len(), 1);
        assert_eq!(data.records[0].value("wind_speed_kt"), Some(99.0));
        Ok(())
    }

    #[test]
    fn test_merge_is_idempotent() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());
        let batch = vec![
            speed("B", init(), 24, 3.0),
            speed("A", init(), 24, 1.0),
            speed("A", init(), 30, 2.0),
        ];

        let first = store.merge(&key(), batch.clone())?;
        let once = ParquetWriter::new().read_partition(&first.partition)?;

        store.merge(&key(), batch)?;
        let twice = ParquetWriter::new().read_partition(&first.partition)?;

        assert_eq!(once, twice);
        assert_eq!(twice.records.len(), 3);
        assert_eq!(twice.records[0].station_id, "A");
        Ok(())
    }

    #[test]
    fn test_new_variable_column_added() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());

        store.merge(&key(), vec![speed("X", init(), 24, 10.5)])?;
        let gust = ExtractionRecord::builder()
            .station_id("Y")
            .init_time(init())
            .forecast_hour(24)
            .value("wind_gust_kt", 20.0)
            .build()
            .unwrap();
        let summary = store.merge(&key(), vec![gust])?;

        let data = ParquetWriter::new().read_partition(&summary.partition)?;
        assert_eq!(data.variables, vec!["wind_speed_kt", "wind_gust_kt"]);
        assert_eq!(data.records[0].value("wind_gust_kt"), None);
        assert_eq!(data.records[1].value("wind_gust_kt"), Some(20.0));
        Ok(())
    }

    #[test]
    fn test_batch_split_by_init_month() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());
        let late_jan = Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap();
        let feb = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();

        let summaries = store.merge_partitioned(
            Model::Nbm,
            Element::Wind,
            vec![speed("X", late_jan, 24, 1.0), speed("X", feb, 24, 2.0)],
        )?;

        // Partitioned by init month even though the January run is valid in February
        assert_eq!(summaries.len(), 2);
        assert!(summaries[0].partition.ends_with("2025_01_nbm_wind_archive.parquet"));
        assert!(summaries[1].partition.ends_with("2025_02_nbm_wind_archive.parquet"));
        Ok(())
    }

    #[test]
    fn test_dedup_without_init_key() {
        let shifted = Utc.with_ymd_and_hms(2025, 1, 1, 6, 0, 0).unwrap();
        let a = speed("X", init(), 24, 1.0);
        let mut b = speed("X", shifted, 30, 2.0);
        b.valid_time = a.valid_time;
        b.forecast_hour = 24;

        let full = dedup_merge(vec![a.clone()], vec![b.clone()], ConflictPolicy::KeepExisting, NaturalKey::Full);
        assert_eq!(full.records.len(), 2);

        let partial = dedup_merge(vec![a], vec![b], ConflictPolicy::KeepExisting, NaturalKey::WithoutInit);
        assert_eq!(partial.records.len(), 1);
        assert_eq!(partial.records[0].value("wind_speed_kt"), Some(1.0));
    }

    #[test]
    fn test_duplicates_within_incoming_keep_first() {
        let merged = dedup_merge(
            Vec::new(),
            vec![speed("X", init(), 24, 1.0), speed("X", init(), 24, 2.0)],
            ConflictPolicy::PreferNew,
            NaturalKey::Full,
        );
        assert_eq!(merged.records.len(), 1);
        assert_eq!(merged.added, 1);
        assert_eq!(merged.records[0].value("wind_speed_kt"), Some(1.0));
    }

    #[test]
    fn test_duplicate_rows_on_disk_are_rewritten() -> Result<()> {
        let dir = TempDir::new()?;
        let store = DedupMergeStore::new(dir.path());
        let path = store.partition_path(&key());
        std::fs::create_dir_all(path.parent().unwrap())?;

        let variables = vec!["wind_speed_kt".to_string()];
        let stored = vec![
            speed("X", init(), 24, 10.5),
            speed("X", init(), 24, 10.5),
            speed("Y", init(), 24, 3.0),
        ];
        ParquetWriter::new().write_records(&stored, &variables, &path)?;

        let summary = store.merge(&key(), vec![speed("Y", init(), 24, 3.0)])?;
        assert_eq!(summary.rows_before, 3);
        assert_eq!(summary.rows_added, 0);
        assert_eq!(summary.rows_after, 2);
        assert!(summary.rewritten);

        let on_disk = ParquetWriter::new().read_partition(&path)?;
        assert_eq!(on_disk.records.len(), summary.rows_after);
        Ok(())
    }

    #[test]
    fn test_parse_policy_and_key() {
        assert_eq!("keep-existing".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::KeepExisting);
        assert_eq!("PREFER_NEW".parse::<ConflictPolicy>().unwrap(), ConflictPolicy::PreferNew);
        assert_eq!("without-init".parse::<NaturalKey>().unwrap(), NaturalKey::WithoutInit);
        assert!("newest".parse::<ConflictPolicy>().is_err());
    }
}
