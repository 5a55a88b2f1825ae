use crate::error::PipelineResult;
use serde::Serialize;
use std::path::Path;
use tabled::{settings::Style, Table, Tabled};

pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> PipelineResult<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for r in rows {
        wtr.serialize(r)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> PipelineResult<()> {
    let s = serde_json::to_string_pretty(value)?;
    std::fs::write(path, s)?;
    Ok(())
}

/// Markdown table of the first `max_rows` rows, or `(no rows)`.
pub fn render_table_rows<T>(rows: &[T], max_rows: usize) -> String
where
    T: Tabled + Clone,
{
    let slice: Vec<T> = rows.iter().take(max_rows).cloned().collect();
    if slice.is_empty() {
        return "(no rows)".to_string();
    }
    Table::new(slice).with(Style::markdown()).to_string()
}

pub fn preview_table_rows<T>(rows: &[T], max_rows: usize)
where
    T: Tabled + Clone,
{
    println!("{}\n", render_table_rows(rows, max_rows));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MonthlyCountRow;
    use tempfile::tempdir;

    fn rows() -> Vec<MonthlyCountRow> {
        vec![
            MonthlyCountRow {
                month: "2024-01".into(),
                group: "Google".into(),
                clients: 3,
            },
            MonthlyCountRow {
                month: "2024-02".into(),
                group: "(Unknown)".into(),
                clients: 1,
            },
        ]
    }

    #[test]
    fn test_write_csv_headers() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_csv(&path, &rows()).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("Month,Group,Clients"));
        assert_eq!(lines.next(), Some("2024-01,Google,3"));
    }

    #[test]
    fn test_write_json() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &rows()).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value[0]["Clients"], 3);
    }

    #[test]
    fn test_render_table_rows() {
        let table = render_table_rows(&rows(), 1);
        assert!(table.contains("Google"));
        assert!(!table.contains("(Unknown)"));
        assert_eq!(render_table_rows::<MonthlyCountRow>(&[], 5), "(no rows)");
    }
}
