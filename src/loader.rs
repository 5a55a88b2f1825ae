use crate::error::{PipelineError, PipelineResult};
use crate::normalizer::{normalize, NormalizePolicy};
use crate::schema::ColumnSchema;
use crate::types::{CellValue, CleanRecord, DatasetDiagnostics, RawDataset, RawRecord};
use calamine::{Data, Range, Reader, Xls, Xlsx};
use chrono::{NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::Path;
use tracing::{debug, info};

/// Everything the report side needs from one upload.
#[derive(Debug, Clone)]
pub struct LoadedDataset {
    pub records: Vec<CleanRecord>,
    pub diagnostics: DatasetDiagnostics,
    /// SHA-256 of the file bytes, hex encoded.
    pub fingerprint: String,
}

/// A file read from disk but not yet normalized.
#[derive(Debug, Clone)]
pub struct RawUpload {
    pub raw: RawDataset,
    pub fingerprint: String,
}

/// Result of reloading a file against the dataset already in memory.
#[derive(Debug)]
pub enum Reload {
    /// Same bytes as the cached dataset; normalization was skipped.
    Unchanged,
    Loaded(LoadedDataset),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Csv,
    Xlsx,
    Xls,
}

impl FileKind {
    pub fn from_path(path: &Path) -> PipelineResult<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        match ext.as_str() {
            "csv" => Ok(FileKind::Csv),
            "xlsx" => Ok(FileKind::Xlsx),
            "xls" => Ok(FileKind::Xls),
            _ => Err(PipelineError::UnsupportedFormat(ext)),
        }
    }
}

pub fn fingerprint(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Read a file from disk into a raw dataset without cleaning anything.
pub fn read_dataset(path: &Path) -> PipelineResult<RawDataset> {
    Ok(read_upload(path)?.raw)
}

pub fn read_upload(path: &Path) -> PipelineResult<RawUpload> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound(path.display().to_string()));
    }
    let kind = FileKind::from_path(path)?;
    let bytes = std::fs::read(path)?;
    let fingerprint = fingerprint(&bytes);
    let raw = parse_bytes(bytes, kind)?;
    info!(
        path = %path.display(),
        rows = raw.records.len(),
        columns = raw.columns.len(),
        "loaded file"
    );
    Ok(RawUpload { raw, fingerprint })
}

pub fn parse_bytes(bytes: Vec<u8>, kind: FileKind) -> PipelineResult<RawDataset> {
    match kind {
        FileKind::Csv => parse_csv(&bytes),
        FileKind::Xlsx => {
            let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
            let range = first_sheet(&mut workbook)?;
            range_to_dataset(&range)
        }
        FileKind::Xls => {
            let mut workbook: Xls<_> = Xls::new(Cursor::new(bytes))?;
            let range = first_sheet(&mut workbook)?;
            range_to_dataset(&range)
        }
    }
}

/// CSV cells are all text; the resolver decides what each one means.
pub fn parse_csv(bytes: &[u8]) -> PipelineResult<RawDataset> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let columns: Vec<String> = rdr
        .headers()?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').trim().to_string())
        .collect();

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result?;
        let record: RawRecord = columns
            .iter()
            .zip(row.iter())
            .map(|(col, value)| {
                let cell = if value.trim().is_empty() {
                    CellValue::Empty
                } else {
                    CellValue::Text(value.to_string())
                };
                (col.clone(), cell)
            })
            .collect();
        if record.is_blank() {
            continue;
        }
        records.push(record);
    }
    Ok(RawDataset { columns, records })
}

fn first_sheet<RS, R>(workbook: &mut R) -> PipelineResult<Range<Data>>
where
    RS: std::io::Read + std::io::Seek,
    R: Reader<RS>,
    PipelineError: From<R::Error>,
{
    let name = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or(PipelineError::EmptyWorkbook)?;
    debug!(sheet = %name, "reading first worksheet");
    Ok(workbook.worksheet_range(&name)?)
}

fn range_to_dataset(range: &Range<Data>) -> PipelineResult<RawDataset> {
    let mut rows = range.rows();
    let header = rows.next().ok_or(PipelineError::EmptyWorkbook)?;
    let columns: Vec<String> = header.iter().map(|c| c.to_string().trim().to_string()).collect();

    let records = rows
        .map(|row| {
            columns
                .iter()
                .zip(row.iter())
                .map(|(col, data)| (col.clone(), cell_from_data(data)))
                .collect::<RawRecord>()
        })
        .filter(|r| !r.is_blank())
        .collect();
    Ok(RawDataset { columns, records })
}

/// Date cells keep their serial so the resolver applies the serial rules.
/// ISO date cells (OpenDocument style) become structured date-times.
pub fn cell_from_data(data: &Data) -> CellValue {
    match data {
        Data::Empty => CellValue::Empty,
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::DateTime(dt) => CellValue::Number(dt.as_f64()),
        Data::DateTimeIso(s) => parse_iso_datetime(s)
            .map(CellValue::DateTime)
            .unwrap_or_else(|| CellValue::Text(s.clone())),
        Data::String(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Text(if *b { "TRUE" } else { "FALSE" }.to_string()),
        Data::Error(e) => CellValue::Text(e.to_string()),
    }
}

fn parse_iso_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

pub fn normalize_upload(
    upload: RawUpload,
    schema: &ColumnSchema,
    policy: &NormalizePolicy,
) -> PipelineResult<LoadedDataset> {
    let (records, diagnostics) = normalize(&upload.raw, schema, policy)?;
    Ok(LoadedDataset {
        records,
        diagnostics,
        fingerprint: upload.fingerprint,
    })
}

/// Read and normalize a file in one go.
pub fn load_and_clean(
    path: &Path,
    schema: &ColumnSchema,
    policy: &NormalizePolicy,
) -> PipelineResult<LoadedDataset> {
    normalize_upload(read_upload(path)?, schema, policy)
}

/// Read the file and normalize it only when its bytes differ from `cached`.
pub fn reload_if_changed(
    path: &Path,
    schema: &ColumnSchema,
    policy: &NormalizePolicy,
    cached: Option<&LoadedDataset>,
) -> PipelineResult<Reload> {
    let upload = read_upload(path)?;
    if cached.is_some_and(|c| c.fingerprint == upload.fingerprint) {
        debug!(fingerprint = %upload.fingerprint, "file unchanged, skipping normalization");
        return Ok(Reload::Unchanged);
    }
    Ok(Reload::Loaded(normalize_upload(upload, schema, policy)?))
}
