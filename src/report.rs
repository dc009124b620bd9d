use std::collections::BTreeMap;
use std::fs;
use chrono::{DateTime, Utc};
use log::warn;
use crate::errors::PipelineError;
use crate::extraction::TimeSeriesPoint;
use crate::targets::TargetLocation;

/// The pivoted report: rows keyed by timestamp, one column per target name.
/// Column order always equals the configured target order, regardless of
/// the order extraction produced the points in.
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>>,
}

/// Pivots the flat point collection into a ReportTable.
///
/// Cell value is the mean of all points for that (timestamp, location) pair.
/// The expected cardinality is 1; anything higher points at an upstream
/// data-quality issue and is logged before being collapsed. Targets with no
/// points still get their column, filled with empty cells.
///
/// # Arguments
///
/// * 'points' - extracted points, any order
/// * 'targets' - the configured target locations defining column order
pub fn build_table(points: &[TimeSeriesPoint], targets: &[TargetLocation]) -> ReportTable {
    let columns: Vec<String> = targets.iter().map(|t| t.name.clone()).collect();

    let mut sums: BTreeMap<DateTime<Utc>, Vec<(f64, u32)>> = BTreeMap::new();
    for point in points {
        let Some(col) = columns.iter().position(|c| *c == point.location) else {
            continue;
        };
        let cells = sums
            .entry(point.timestamp)
            .or_insert_with(|| vec![(0.0, 0); columns.len()]);
        cells[col].0 += point.value;
        cells[col].1 += 1;
    }

    let mut rows: BTreeMap<DateTime<Utc>, Vec<Option<f64>>> = BTreeMap::new();
    for (timestamp, cells) in sums {
        let mut row: Vec<Option<f64>> = Vec::with_capacity(columns.len());
        for (col, (sum, count)) in cells.into_iter().enumerate() {
            if count > 1 {
                warn!(
                    "{} values for {} at {}, averaging (upstream data-quality issue)",
                    count, columns[col], timestamp
                );
            }
            row.push(if count == 0 { None } else { Some(sum / count as f64) });
        }
        rows.insert(timestamp, row);
    }

    ReportTable { columns, rows }
}

/// Serializes the table to a csv file, atomically.
///
/// The file is written next to the destination with a .tmp suffix and
/// renamed into place, so a partially written report is never visible.
///
/// # Arguments
///
/// * 'table' - the table to write
/// * 'output_file' - destination path
pub fn write_report(table: &ReportTable, output_file: &str) -> Result<(), PipelineError> {
    let tmp_path = format!("{}.tmp", output_file);

    let mut writer = csv::Writer::from_path(&tmp_path)?;

    let mut header: Vec<String> = vec!["time".to_string()];
    header.extend(table.columns.iter().cloned());
    writer.write_record(&header)?;

    for (timestamp, cells) in &table.rows {
        let mut record: Vec<String> = Vec::with_capacity(cells.len() + 1);
        record.push(timestamp.format("%Y-%m-%d %H:%M:%S").to_string());
        for cell in cells {
            record.push(cell.map(|v| v.to_string()).unwrap_or_default());
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    drop(writer);

    fs::rename(&tmp_path, output_file)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn target(name: &str) -> TargetLocation {
        TargetLocation { name: name.to_string(), lat: 0.0, lon: 0.0 }
    }

    fn point(location: &str, day: i64, value: f64) -> TimeSeriesPoint {
        TimeSeriesPoint {
            location: location.to_string(),
            timestamp: DateTime::UNIX_EPOCH + TimeDelta::days(day),
            value,
        }
    }

    #[test]
    fn pivots_full_grid() {
        let targets = vec![target("A"), target("B")];
        let points = vec![
            point("A", 0, 1.0),
            point("A", 1, 2.0),
            point("B", 0, 3.0),
            point("B", 1, 4.0),
        ];

        let table = build_table(&points, &targets);
        assert_eq!(table.columns, ["A", "B"]);
        assert_eq!(table.rows.len(), 2);

        let rows: Vec<&Vec<Option<f64>>> = table.rows.values().collect();
        assert_eq!(rows[0], &vec![Some(1.0), Some(3.0)]);
        assert_eq!(rows[1], &vec![Some(2.0), Some(4.0)]);
    }

    #[test]
    fn column_order_follows_targets_not_arrival() {
        let targets = vec![target("A"), target("B"), target("C")];
        // Points arrive in reverse target order
        let points = vec![point("C", 0, 3.0), point("B", 0, 2.0), point("A", 0, 1.0)];

        let table = build_table(&points, &targets);
        assert_eq!(table.columns, ["A", "B", "C"]);
        let row = table.rows.values().next().unwrap();
        assert_eq!(row, &vec![Some(1.0), Some(2.0), Some(3.0)]);
    }

    #[test]
    fn duplicates_collapse_to_mean() {
        let targets = vec![target("A")];
        let points = vec![point("A", 0, 1.0), point("A", 0, 3.0)];

        let table = build_table(&points, &targets);
        let row = table.rows.values().next().unwrap();
        assert_eq!(row, &vec![Some(2.0)]);
    }

    #[test]
    fn location_without_data_keeps_its_column() {
        let targets = vec![target("A"), target("Dry"), target("B")];
        let points = vec![point("A", 0, 1.0), point("B", 0, 2.0), point("A", 1, 3.0)];

        let table = build_table(&points, &targets);
        assert_eq!(table.columns, ["A", "Dry", "B"]);
        for row in table.rows.values() {
            assert_eq!(row[1], None);
        }
        // the other columns are unaffected
        assert_eq!(table.rows.values().next().unwrap()[0], Some(1.0));
    }

    #[test]
    fn writes_csv_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("report.csv");
        let output = output.to_str().unwrap();

        let targets = vec![target("A"), target("B")];
        let points = vec![point("A", 0, 1.5), point("B", 1, 2.5)];
        let table = build_table(&points, &targets);

        write_report(&table, output).unwrap();

        assert!(!fs::exists(format!("{}.tmp", output)).unwrap());
        let content = fs::read_to_string(output).unwrap();
        let mut lines = content.lines();
        assert_eq!(lines.next(), Some("time,A,B"));
        assert_eq!(lines.next(), Some("1970-01-01 00:00:00,1.5,"));
        assert_eq!(lines.next(), Some("1970-01-02 00:00:00,,2.5"));
    }
}
