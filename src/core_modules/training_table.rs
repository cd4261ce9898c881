// THEORY:
// The training table is the only tabular ingress of the engine: a CSV of reference
// lights with the columns `R,G,B,H,S,V,K,ClassName`. Columns are located by exact,
// case-sensitive header name, so the file may carry extra columns in any order.
//
// A missing required column fails the whole load, since no row could be interpreted.
// A single bad row is skipped with a warning and counted, and the rest of the table
// still loads. Bad means an unparsable or non-finite number, an empty class name, or
// bytes that are not UTF-8. Only an I/O failure of the underlying reader is fatal.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, StringRecord, Trim};
use tracing::{info, warn};

use crate::core_modules::classifier::{FEATURE_DIMENSIONS, FEATURE_NAMES, TrainingDataPoint};
use crate::error::{ProbeError, Result};

pub const CLASS_COLUMN: &str = "ClassName";

/// A skipped row and why it was rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedRow {
    pub line: u64,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingTable {
    pub points: Vec<TrainingDataPoint>,
    pub skipped: Vec<SkippedRow>,
}

impl TrainingTable {
    pub fn from_path(path: &Path) -> Result<Self> {
        let table = Self::from_reader(File::open(path)?)?;
        info!(
            path = %path.display(),
            rows = table.points.len(),
            skipped = table.skipped.len(),
            "training table loaded"
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let columns = ColumnMap::locate(&headers)?;

        let mut table = TrainingTable::default();
        for record in reader.records() {
            let parsed = match record {
                Ok(record) => {
                    let line = record.position().map_or(0, |p| p.line());
                    (line, columns.parse(&record))
                }
                Err(err) if err.is_io_error() => return Err(err.into()),
                Err(err) => {
                    let line = err.position().map_or(0, |p| p.line());
                    (line, Err(format!("unreadable row: {}", err)))
                }
            };
            match parsed {
                (_, Ok(point)) => table.points.push(point),
                (line, Err(reason)) => {
                    warn!(line, reason = %reason, "skipping training row");
                    table.skipped.push(SkippedRow { line, reason });
                }
            }
        }
        Ok(table)
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn into_points(self) -> Vec<TrainingDataPoint> {
        self.points
    }
}

struct ColumnMap {
    features: [usize; FEATURE_DIMENSIONS],
    class_name: usize,
}

impl ColumnMap {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| {
            headers
                .iter()
                .position(|header| header == name)
                .ok_or_else(|| ProbeError::MissingColumn {
                    column: name.to_string(),
                })
        };

        let mut features = [0usize; FEATURE_DIMENSIONS];
        for (slot, name) in features.iter_mut().zip(FEATURE_NAMES) {
            *slot = find(name)?;
        }
        Ok(Self {
            features,
            class_name: find(CLASS_COLUMN)?,
        })
    }

    fn parse(&self, record: &StringRecord) -> std::result::Result<TrainingDataPoint, String> {
        let mut features = Vec::with_capacity(FEATURE_DIMENSIONS);
        for (index, name) in self.features.iter().zip(FEATURE_NAMES) {
            let raw = record.get(*index).unwrap_or("");
            let value: f64 = raw
                .parse()
                .map_err(|_| format!("column {} is not a number: '{}'", name, raw))?;
            if !value.is_finite() {
                return Err(format!("column {} is not finite: '{}'", name, raw));
            }
            features.push(value);
        }

        let class_name = record.get(self.class_name).unwrap_or("");
        if class_name.is_empty() {
            return Err("empty class name".to_string());
        }
        Ok(TrainingDataPoint::new(features, class_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TABLE: &str = "\
R,G,B,H,S,V,K,ClassName
255,147,41,30.6,83.9,100.0,2200,candle
201,226,255,212.7,21.2,100.0,7500,overcast
";

    #[test]
    fn loads_well_formed_rows() {
        let table = TrainingTable::from_reader(TABLE.as_bytes()).unwrap();
        assert_eq!(table.points.len(), 2);
        assert!(table.skipped.is_empty());
        assert_eq!(table.points[0].class_name, "candle");
        assert_eq!(table.points[1].features, vec![201.0, 226.0, 255.0, 212.7, 21.2, 100.0, 7500.0]);
    }

    #[test]
    fn columns_are_located_by_name() {
        let csv = "ClassName,K,V,S,H,B,G,R,Notes\nlamp,3000,90,50,40,10,20,30,bench\n";
        let table = TrainingTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.points[0].features, vec![30.0, 20.0, 10.0, 40.0, 50.0, 90.0, 3000.0]);
    }

    #[test]
    fn header_match_is_case_sensitive() {
        let csv = "r,G,B,H,S,V,K,ClassName\n1,2,3,4,5,6,7,x\n";
        let err = TrainingTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(matches!(err, ProbeError::MissingColumn { ref column } if column == "R"));
    }

    #[test]
    fn bad_rows_are_skipped_not_fatal() {
        let csv = "\
R,G,B,H,S,V,K,ClassName
1,2,3,4,5,6,7,good
abc,2,3,4,5,6,7,bad_number
1,2,3,4,5,6,7,
1,2,3,4,5,6,NaN,not_finite
9,9,9,9,9,9,9,also_good
";
        let table = TrainingTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(table.points.len(), 2);
        assert_eq!(table.skipped.len(), 3);
        assert_eq!(table.skipped[0].line, 3);
        assert!(table.skipped[0].reason.contains("column R"));
        assert_eq!(table.skipped[1].reason, "empty class name");
    }

    #[test]
    fn invalid_utf8_row_is_skipped() {
        let mut csv = b"R,G,B,H,S,V,K,ClassName\n1,2,3,4,5,6,7,first\n".to_vec();
        csv.extend_from_slice(b"1,2,3,4,5,6,7,bad\xff\xfe\n");
        csv.extend_from_slice(b"9,9,9,9,9,9,9,last\n");

        let table = TrainingTable::from_reader(csv.as_slice()).unwrap();
        let names: Vec<&str> = table.points.iter().map(|p| p.class_name.as_str()).collect();
        assert_eq!(names, vec!["first", "last"]);
        assert_eq!(table.skipped.len(), 1);
        assert_eq!(table.skipped[0].line, 3);
    }

    #[test]
    fn loads_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TABLE.as_bytes()).unwrap();
        let table = TrainingTable::from_path(file.path()).unwrap();
        assert_eq!(table.into_points().len(), 2);
    }
}
