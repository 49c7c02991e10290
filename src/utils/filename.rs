use chrono::{DateTime, Datelike, Utc};
use std::path::{Path, PathBuf};

use crate::models::{Element, Model};

/// Monthly partition a record belongs to, keyed by its forecast cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    pub model: Model,
    pub element: Element,
    pub year: i32,
    pub month: u32,
}

impl PartitionKey {
    pub fn for_time(model: Model, element: Element, time: DateTime<Utc>) -> Self {
        Self {
            model,
            element,
            year: time.year(),
            month: time.month(),
        }
    }

    /// Partition file name with format: {YYYY}_{MM}_{model}_{element}_archive.parquet
    pub fn file_name(&self) -> String {
        format!(
            "{}_{:02}_{}_{}_archive.parquet",
            self.year, self.month, self.model, self.element
        )
    }

    /// Full path under an archive root: {root}/{model}/{element}/{file_name}
    pub fn path_under(&self, root: &Path) -> PathBuf {
        root.join(self.model.as_str())
            .join(self.element.as_str())
            .join(self.file_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_partition_path() {
        let time = Utc.with_ymd_and_hms(2024, 3, 31, 23, 0, 0).unwrap();
        let key = PartitionKey::for_time(Model::NbmqmdExp, Element::Gust, time);

        assert_eq!(key.file_name(), "2024_03_nbmqmd_exp_gust_archive.parquet");

        let path = key.path_under(Path::new("archive"));
        let path_str = path.to_string_lossy();
        let parts: Vec<&str> = path_str.split('/').collect();
        assert_eq!(parts, vec!["archive", "nbmqmd_exp", "gust", "2024_03_nbmqmd_exp_gust_archive.parquet"]);
    }

    #[test]
    fn test_partition_key_ordering_by_month() {
        let jan = PartitionKey::for_time(
            Model::Nbm,
            Element::Wind,
            Utc.with_ymd_and_hms(2024, 1, 15, 0, 0, 0).unwrap(),
        );
        let feb = PartitionKey::for_time(
            Model::Nbm,
            Element::Wind,
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap(),
        );
        assert!(jan < feb);
        assert_ne!(jan.file_name(), feb.file_name());
    }
}
