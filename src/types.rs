use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::collections::HashMap;
use tabled::Tabled;

static EMPTY_CELL: CellValue = CellValue::Empty;

/// One cell of the uploaded file, as it was encoded.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Empty,
    Text(String),
    Number(f64),
    /// Structured date-time, from ISO date cells or from library callers
    /// that already hold parsed values.
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// Render the cell as trimmed text, `None` when it is blank.
    ///
    /// Integral numbers drop their trailing `.0` so numeric ids such as
    /// `1001.0` read back as `1001`.
    pub fn as_text(&self) -> Option<String> {
        let s = match self {
            CellValue::Empty => return None,
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            CellValue::DateTime(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// One row of the uploaded file keyed by physical column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRecord {
    cells: HashMap<String, CellValue>,
}

impl RawRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: CellValue) {
        self.cells.insert(column.into(), value);
    }

    /// The cell under `column`, or `CellValue::Empty` if the row has none.
    pub fn cell(&self, column: &str) -> &CellValue {
        self.cells.get(column).unwrap_or(&EMPTY_CELL)
    }

    pub fn is_blank(&self) -> bool {
        self.cells.values().all(|v| v.as_text().is_none())
    }
}

impl<K: Into<String>> FromIterator<(K, CellValue)> for RawRecord {
    fn from_iter<I: IntoIterator<Item = (K, CellValue)>>(iter: I) -> Self {
        let mut record = RawRecord::new();
        for (k, v) in iter {
            record.insert(k, v);
        }
        record
    }
}

/// A whole upload: header row plus records, before any cleaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawDataset {
    pub columns: Vec<String>,
    pub records: Vec<RawRecord>,
}

/// Which anchor event a date column describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateField {
    Ftd,
    Kyc,
}

impl DateField {
    /// Only KYC dates keep their time of day.
    pub fn keeps_time(self) -> bool {
        matches!(self, DateField::Kyc)
    }
}

/// Why a cell resolved the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DateClass {
    Valid,
    NullInput,
    PlaceholderSentinel,
    OutOfRange,
    Unparseable,
}

/// Result of resolving one date cell. A date is present iff the
/// classification is `Valid`; the constructors keep that true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedDate {
    date: Option<NaiveDate>,
    time: Option<NaiveTime>,
    class: DateClass,
}

impl ResolvedDate {
    pub fn valid(date: NaiveDate, time: Option<NaiveTime>) -> Self {
        Self {
            date: Some(date),
            time,
            class: DateClass::Valid,
        }
    }

    pub fn rejected(class: DateClass) -> Self {
        debug_assert!(class != DateClass::Valid);
        Self {
            date: None,
            time: None,
            class,
        }
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    pub fn time(&self) -> Option<NaiveTime> {
        self.time
    }

    pub fn classification(&self) -> DateClass {
        self.class
    }

    pub fn is_valid(&self) -> bool {
        self.class == DateClass::Valid
    }
}

/// One normalized client record. Built once per upload and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CleanRecord {
    pub record_id: String,
    pub ftd_date: Option<NaiveDate>,
    pub kyc_date: Option<NaiveDate>,
    pub kyc_time: Option<NaiveTime>,
    pub ftd_month: Option<NaiveDate>,
    pub kyc_month: Option<NaiveDate>,
    pub source: String,
    pub country: Option<String>,
}

/// Physical column names matched to each logical field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ColumnMapping {
    pub ftd: String,
    pub kyc: String,
    pub source: String,
    pub country: Option<String>,
    pub record_id: Option<String>,
    pub deposit_flag: Option<String>,
}

/// Per-axis outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AxisCounts {
    pub valid: usize,
    pub null_input: usize,
    pub placeholder: usize,
    pub unparseable: usize,
    pub before_window: usize,
    pub after_window: usize,
}

impl AxisCounts {
    pub fn out_of_range(&self) -> usize {
        self.before_window + self.after_window
    }

    /// Every record lands in exactly one bucket, so this equals the row count.
    pub fn total(&self) -> usize {
        self.valid + self.null_input + self.placeholder + self.unparseable + self.out_of_range()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DatasetDiagnostics {
    pub original_count: usize,
    pub final_count: usize,
    pub ftd: AxisCounts,
    pub kyc: AxisCounts,
    pub deposit_flag_yes: Option<usize>,
    pub columns: ColumnMapping,
    pub has_country: bool,
}

impl DatasetDiagnostics {
    /// Records whose FTD cell was the "no deposit yet" placeholder.
    pub fn placeholder_count(&self) -> usize {
        self.ftd.placeholder
    }
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct MonthlyCountRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "Group")]
    #[tabled(rename = "Group")]
    pub group: String,
    #[serde(rename = "Clients")]
    #[tabled(rename = "Clients")]
    pub clients: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct SourceTotalRow {
    #[serde(rename = "Source")]
    #[tabled(rename = "Source")]
    pub source: String,
    #[serde(rename = "Clients")]
    #[tabled(rename = "Clients")]
    pub clients: usize,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct ComparisonRow {
    #[serde(rename = "Month")]
    #[tabled(rename = "Month")]
    pub month: String,
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "FtdClients")]
    #[tabled(rename = "FtdClients")]
    pub ftd_clients: usize,
    #[serde(rename = "KycClients")]
    #[tabled(rename = "KycClients")]
    pub kyc_clients: usize,
    /// FTD over KYC clients in percent, 0 when there were no KYC clients.
    #[serde(rename = "ConversionRate")]
    #[tabled(rename = "ConversionRate")]
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize, Tabled, Clone, PartialEq)]
pub struct CategoryConversionRow {
    #[serde(rename = "Category")]
    #[tabled(rename = "Category")]
    pub category: String,
    #[serde(rename = "KycClients")]
    #[tabled(rename = "KycClients")]
    pub kyc_clients: usize,
    #[serde(rename = "FtdClients")]
    #[tabled(rename = "FtdClients")]
    pub ftd_clients: usize,
    #[serde(rename = "ConversionRate")]
    #[tabled(rename = "ConversionRate")]
    pub conversion_rate: f64,
}

#[derive(Debug, Serialize)]
pub struct SummaryStats {
    pub total_records: usize,
    pub ftd_clients: usize,
    pub kyc_clients: usize,
    pub placeholder_ftd: usize,
    pub ftd_out_of_range: usize,
    pub kyc_out_of_range: usize,
    pub unknown_sources: usize,
    pub distinct_sources: usize,
    pub distinct_countries: Option<usize>,
    pub columns: ColumnMapping,
}
