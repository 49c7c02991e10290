use std::collections::BTreeSet;
use std::fmt;

use crate::error::{ArchiverError, ExtractionError, Result};
use crate::registry::FieldMatchRule;

/// One line of a sidecar index: `sequence:byte_offset:date:parameter:level:...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub sequence: String,
    pub byte_offset: u64,
    pub line: String,
}

impl IndexEntry {
    /// Parameter column (e.g. `WIND`), when present.
    pub fn parameter(&self) -> Option<&str> {
        self.line.split(':').nth(3).filter(|p| !p.is_empty())
    }
}

/// Inclusive byte range. An open end reads to the end of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl ByteRange {
    pub fn new(start: u64, end: Option<u64>) -> Self {
        Self { start, end }
    }

    /// Value for an HTTP `Range` header.
    pub fn header_value(&self) -> String {
        format!("bytes={}", self)
    }

    pub fn len(&self) -> Option<u64> {
        self.end.map(|end| end + 1 - self.start)
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{}", self.start, end),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// A selected index line and the bytes that hold its record.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    pub entry_index: usize,
    pub parameter: Option<String>,
    pub tokens: Vec<String>,
    pub range: ByteRange,
}

/// Result of applying a [`FieldMatchRule`] to a catalog. Matches are in
/// ascending offset order.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelection {
    pub matches: Vec<FieldMatch>,
    pub matched_tokens: BTreeSet<String>,
}

impl FieldSelection {
    pub fn ranges(&self) -> Vec<ByteRange> {
        self.matches.iter().map(|m| m.range).collect()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct IndexCatalog {
    entries: Vec<IndexEntry>,
    content_length: Option<u64>,
}

impl IndexCatalog {
    /// Parse sidecar index text. Blank lines are ignored; a line without an
    /// integer offset in its second field, or an offset lower than the line
    /// before it, makes the whole index malformed.
    pub fn parse(text: &str) -> Result<Self> {
        let mut entries: Vec<IndexEntry> = Vec::new();

        for (line_no, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split(':');
            let sequence = fields.next().unwrap_or_default().trim().to_string();
            let offset_field = fields.next().ok_or_else(|| {
                ArchiverError::InvalidFormat(format!(
                    "Index line {} has no byte offset: '{}'",
                    line_no + 1,
                    line
                ))
            })?;
            let byte_offset = offset_field.trim().parse::<u64>().map_err(|_| {
                ArchiverError::InvalidFormat(format!(
                    "Index line {} has invalid byte offset '{}'",
                    line_no + 1,
                    offset_field
                ))
            })?;

            if let Some(previous) = entries.last() {
                if byte_offset < previous.byte_offset {
                    return Err(ArchiverError::InvalidFormat(format!(
                        "Index line {} offset {} precedes previous offset {}",
                        line_no + 1,
                        byte_offset,
                        previous.byte_offset
                    )));
                }
            }

            entries.push(IndexEntry {
                sequence,
                byte_offset,
                line: line.to_string(),
            });
        }

        Ok(Self {
            entries,
            content_length: None,
        })
    }

    /// Close the final range at `content_length - 1` instead of leaving it open.
    pub fn with_content_length(mut self, content_length: u64) -> Self {
        self.content_length = Some(content_length);
        self
    }

    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Byte range of the record starting at entry `index`. It ends just
    /// before the next strictly greater offset so sub-messages sharing an
    /// offset resolve to the same record.
    pub fn range_of(&self, index: usize) -> Option<ByteRange> {
        let entry = self.entries.get(index)?;
        let next = self.entries[index + 1..]
            .iter()
            .map(|e| e.byte_offset)
            .find(|&offset| offset > entry.byte_offset);

        let end = match next {
            Some(offset) => Some(offset - 1),
            None => self
                .content_length
                .filter(|&len| len > entry.byte_offset)
                .map(|len| len - 1),
        };

        Some(ByteRange::new(entry.byte_offset, end))
    }

    /// Apply a match rule. Excluded phrases are checked first, then required
    /// phrases, then field tokens; a line matching several tokens is still
    /// one range.
    pub fn select(
        &self,
        rule: &FieldMatchRule,
        url: &str,
    ) -> std::result::Result<FieldSelection, ExtractionError> {
        let mut matches = Vec::new();
        let mut matched_tokens = BTreeSet::new();

        for (index, entry) in self.entries.iter().enumerate() {
            let line = entry.line.as_str();

            if rule.must_not_contain.iter().any(|p| line.contains(p.as_str())) {
                continue;
            }
            if !rule.must_contain.iter().all(|p| line.contains(p.as_str())) {
                continue;
            }

            let tokens: Vec<String> = rule
                .field_tokens
                .iter()
                .filter(|t| line.contains(t.as_str()))
                .cloned()
                .collect();
            if tokens.is_empty() {
                continue;
            }

            // range_of cannot miss for an index taken from this enumeration
            if let Some(range) = self.range_of(index) {
                matched_tokens.extend(tokens.iter().cloned());
                matches.push(FieldMatch {
                    entry_index: index,
                    parameter: entry.parameter().map(str::to_string),
                    tokens,
                    range,
                });
            }
        }

        let requested: BTreeSet<&String> = rule.field_tokens.iter().collect();
        if rule.require_all_matches && matched_tokens.len() < requested.len() {
            return Err(ExtractionError::IncompleteFieldMatch {
                url: url.to_string(),
                matched: matched_tokens.into_iter().collect(),
                requested: rule.field_tokens.clone(),
            });
        }
        if matches.is_empty() {
            return Err(ExtractionError::NoFieldsMatched {
                url: url.to_string(),
                requested: rule.field_tokens.clone(),
            });
        }

        Ok(FieldSelection {
            matches,
            matched_tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const URL: &str = "https://example.com/blend.t12z.core.f036.ak.grib2";

    const FIVE_LINES: &str = "\
1:0:d=2025010112:WIND:10 m above ground:36 hour fcst:
2:1000:d=2025010112:TMP:2 m above ground:36 hour fcst:
3:2500:d=2025010112:WDIR:10 m above ground:36 hour fcst:
4:4000:d=2025010112:WIND:10 m above ground:36 hour fcst:ens std dev
5:5200:d=2025010112:GUST:10 m above ground:36 hour fcst:
";

    fn wind_rule() -> FieldMatchRule {
        FieldMatchRule::new(&[":WIND:10 m above", ":WDIR:10 m above", ":GUST:10 m above"])
            .with_must_contain(&["10 m above ground"])
            .with_must_not_contain(&["ens std dev"])
    }

    #[test]
    fn test_five_line_scenario() {
        let catalog = IndexCatalog::parse(FIVE_LINES).unwrap();
        assert_eq!(catalog.len(), 5);

        let selection = catalog.select(&wind_rule(), URL).unwrap();
        assert_eq!(
            selection.ranges(),
            vec![
                ByteRange::new(0, Some(999)),
                ByteRange::new(2500, Some(3999)),
                ByteRange::new(5200, None),
            ]
        );
        assert_eq!(selection.matched_tokens.len(), 3);

        let parameters: Vec<_> = selection
            .matches
            .iter()
            .map(|m| m.parameter.clone().unwrap())
            .collect();
        assert_eq!(parameters, vec!["WIND", "WDIR", "GUST"]);
    }

    #[test]
    fn test_final_range_uses_eof_not_last_match() {
        let catalog = IndexCatalog::parse(FIVE_LINES).unwrap();
        let rule = FieldMatchRule::new(&[":WIND:10 m above"]).with_must_not_contain(&["ens std dev"]);

        let selection = catalog.select(&rule, URL).unwrap();
        // The match is followed by unselected lines, so it still ends at the next offset
        assert_eq!(selection.ranges(), vec![ByteRange::new(0, Some(999))]);
    }

    #[test]
    fn test_content_length_closes_final_range() {
        let catalog = IndexCatalog::parse(FIVE_LINES)
            .unwrap()
            .with_content_length(6000);
        let selection = catalog.select(&wind_rule(), URL).unwrap();
        assert_eq!(selection.ranges()[2], ByteRange::new(5200, Some(5999)));
    }

    #[test]
    fn test_ranges_are_ascending_and_disjoint() {
        let catalog = IndexCatalog::parse(FIVE_LINES).unwrap();
        let ranges: Vec<_> = (0..catalog.len()).filter_map(|i| catalog.range_of(i)).collect();

        for pair in ranges.windows(2) {
            let end = pair[0].end.unwrap();
            assert_eq!(end + 1, pair[1].start);
        }
        assert!(ranges.last().unwrap().is_open());
    }

    #[test]
    fn test_require_all_matches() {
        let index = "\
1:0:d=2025010112:WIND:10 m above ground:36 hour fcst:
2:1000:d=2025010112:WDIR:10 m above ground:36 hour fcst:
";
        let catalog = IndexCatalog::parse(index).unwrap();

        let err = catalog.select(&wind_rule(), URL).unwrap_err();
        match err {
            ExtractionError::IncompleteFieldMatch { matched, requested, .. } => {
                assert_eq!(matched.len(), 2);
                assert_eq!(requested.len(), 3);
            }
            other => panic!("unexpected error: {:?}", other),
        }

        let partial = wind_rule().with_require_all_matches(false);
        let selection = catalog.select(&partial, URL).unwrap();
        assert_eq!(selection.len(), 2);
        assert_eq!(selection.ranges()[1], ByteRange::new(1000, None));
    }

    #[test]
    fn test_no_matches_without_require_all() {
        let catalog = IndexCatalog::parse(FIVE_LINES).unwrap();
        let rule = FieldMatchRule::new(&[":APCP:surface:"]).with_require_all_matches(false);

        let err = catalog.select(&rule, URL).unwrap_err();
        assert!(matches!(err, ExtractionError::NoFieldsMatched { .. }));
    }

    #[test]
    fn test_excluded_phrase_wins_over_token() {
        let index = "1:0:d=2025010112:WIND:10 m above ground:36 hour fcst:ens std dev\n";
        let catalog = IndexCatalog::parse(index).unwrap();
        let rule = FieldMatchRule::new(&[":WIND:10 m above"]).with_must_not_contain(&["ens std dev"]);

        assert!(matches!(
            catalog.select(&rule, URL),
            Err(ExtractionError::IncompleteFieldMatch { .. })
        ));
    }

    #[test]
    fn test_line_matching_two_tokens_is_one_range() {
        let index = "1:0:d=2025010112:WIND:10 m above ground:36 hour fcst:\n2:800:d=2025010112:TMP:surface:\n";
        let catalog = IndexCatalog::parse(index).unwrap();
        let rule = FieldMatchRule::new(&[":WIND:", "10 m above ground"]);

        let selection = catalog.select(&rule, URL).unwrap();
        assert_eq!(selection.len(), 1);
        assert_eq!(selection.matched_tokens.len(), 2);
    }

    #[test]
    fn test_shared_offsets_resolve_to_same_record() {
        let index = "\
1:0:d=2025010112:TMP:2 m above ground:
2.1:900:d=2025010112:UGRD:10 m above ground:
2.2:900:d=2025010112:VGRD:10 m above ground:
3:2000:d=2025010112:GUST:surface:
";
        let catalog = IndexCatalog::parse(index).unwrap();
        assert_eq!(catalog.range_of(1), Some(ByteRange::new(900, Some(1999))));
        assert_eq!(catalog.range_of(2), Some(ByteRange::new(900, Some(1999))));
    }

    #[test]
    fn test_malformed_indexes() {
        assert!(IndexCatalog::parse("1:abc:d=2025010112:WIND:\n").is_err());
        assert!(IndexCatalog::parse("no offset here\n").is_err());
        assert!(IndexCatalog::parse("1:500:a:WIND:\n2:100:a:GUST:\n").is_err());

        let blank = IndexCatalog::parse("\n\n1:0:a:WIND:\n\n").unwrap();
        assert_eq!(blank.len(), 1);
    }

    #[test]
    fn test_header_value() {
        assert_eq!(ByteRange::new(10, Some(20)).header_value(), "bytes=10-20");
        assert_eq!(ByteRange::new(10, None).header_value(), "bytes=10-");
        assert_eq!(ByteRange::new(10, Some(20)).len(), Some(11));
    }
}
