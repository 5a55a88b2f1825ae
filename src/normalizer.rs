// Dataset Normalizer.
//
// Runs the date resolver over the FTD and KYC columns of every record,
// reconciles FTD dates against the deposit flag, applies the valid date
// window, fills blank categories and buckets dates by month. Bad cells are
// counted in the diagnostics; only a missing required column fails the run.
use crate::error::PipelineResult;
use crate::resolver::resolve;
use crate::schema::ColumnSchema;
use crate::types::{
    AxisCounts, CellValue, CleanRecord, DateClass, DateField, DatasetDiagnostics, RawDataset,
    RawRecord, ResolvedDate,
};
use crate::util::first_of_month;
use chrono::NaiveDate;
use tracing::{info, warn};

/// Parsed FTD count and deposit-flag count may differ by this much before
/// the flag takes over.
pub const RECONCILE_THRESHOLD: usize = 50;

pub const UNKNOWN_LABEL: &str = "(Unknown)";

/// Deployment-level knobs of the normalization run.
#[derive(Debug, Clone)]
pub struct NormalizePolicy {
    pub window_start: NaiveDate,
    pub window_end: NaiveDate,
    pub reconcile_threshold: usize,
    pub unknown_label: String,
    pub deposit_yes: String,
}

impl Default for NormalizePolicy {
    fn default() -> Self {
        Self {
            window_start: NaiveDate::from_ymd_opt(2023, 1, 1).unwrap_or_default(),
            window_end: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap_or_default(),
            reconcile_threshold: RECONCILE_THRESHOLD,
            unknown_label: UNKNOWN_LABEL.to_string(),
            deposit_yes: "Yes".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowCheck {
    Inside,
    Before,
    After,
}

impl NormalizePolicy {
    fn check_window(&self, date: NaiveDate) -> WindowCheck {
        if date < self.window_start {
            WindowCheck::Before
        } else if date > self.window_end {
            WindowCheck::After
        } else {
            WindowCheck::Inside
        }
    }
}

/// Normalize a raw upload into immutable clean records plus diagnostics.
pub fn normalize(
    raw: &RawDataset,
    schema: &ColumnSchema,
    policy: &NormalizePolicy,
) -> PipelineResult<(Vec<CleanRecord>, DatasetDiagnostics)> {
    let columns = schema.resolve(&raw.columns)?;

    let mut ftd = resolve_column(&raw.records, &columns.ftd, DateField::Ftd);
    let mut kyc = resolve_column(&raw.records, &columns.kyc, DateField::Kyc);
    let mut kyc_counts = tally(&kyc);

    let deposit_flag_yes = columns.deposit_flag.as_deref().map(|flag_col| {
        let flags: Vec<bool> = raw
            .records
            .iter()
            .map(|r| is_flag_yes(r.cell(flag_col), &policy.deposit_yes))
            .collect();
        reconcile_with_deposit_flag(&mut ftd, &flags, policy.reconcile_threshold);
        flags.iter().filter(|f| **f).count()
    });
    // After reconciliation, so cleared dates land in `null_input`.
    let mut ftd_counts = tally(&ftd);

    apply_window(&mut ftd, policy, &mut ftd_counts);
    apply_window(&mut kyc, policy, &mut kyc_counts);
    ftd_counts.valid = ftd.iter().filter(|r| r.is_valid()).count();
    kyc_counts.valid = kyc.iter().filter(|r| r.is_valid()).count();

    let has_country = columns.country.is_some();
    if columns.record_id.is_none() {
        warn!("no `Record ID` column, falling back to row numbers");
    }

    let records: Vec<CleanRecord> = raw
        .records
        .iter()
        .zip(ftd.iter().zip(kyc.iter()))
        .enumerate()
        .map(|(idx, (row, (ftd, kyc)))| {
            let record_id = columns
                .record_id
                .as_deref()
                .and_then(|c| row.cell(c).as_text())
                .unwrap_or_else(|| (idx + 1).to_string());
            let source = row
                .cell(&columns.source)
                .as_text()
                .unwrap_or_else(|| policy.unknown_label.clone());
            let country = columns.country.as_deref().map(|c| {
                row.cell(c)
                    .as_text()
                    .unwrap_or_else(|| policy.unknown_label.clone())
            });
            CleanRecord {
                record_id,
                ftd_date: ftd.date(),
                kyc_date: kyc.date(),
                kyc_time: kyc.time(),
                ftd_month: ftd.date().map(first_of_month),
                kyc_month: kyc.date().map(first_of_month),
                source,
                country,
            }
        })
        .collect();

    let diagnostics = DatasetDiagnostics {
        original_count: raw.records.len(),
        final_count: records.len(),
        ftd: ftd_counts,
        kyc: kyc_counts,
        deposit_flag_yes,
        columns,
        has_country,
    };
    info!(
        records = diagnostics.final_count,
        ftd_valid = diagnostics.ftd.valid,
        ftd_placeholder = diagnostics.ftd.placeholder,
        ftd_before_window = diagnostics.ftd.before_window,
        ftd_after_window = diagnostics.ftd.after_window,
        kyc_valid = diagnostics.kyc.valid,
        kyc_before_window = diagnostics.kyc.before_window,
        kyc_after_window = diagnostics.kyc.after_window,
        "normalized dataset"
    );
    Ok((records, diagnostics))
}

fn resolve_column(records: &[RawRecord], column: &str, field: DateField) -> Vec<ResolvedDate> {
    records.iter().map(|r| resolve(r.cell(column), field)).collect()
}

fn tally(resolved: &[ResolvedDate]) -> AxisCounts {
    let mut counts = AxisCounts::default();
    for r in resolved {
        match r.classification() {
            DateClass::NullInput => counts.null_input += 1,
            DateClass::PlaceholderSentinel => counts.placeholder += 1,
            DateClass::Unparseable => counts.unparseable += 1,
            DateClass::Valid | DateClass::OutOfRange => {}
        }
    }
    counts
}

fn is_flag_yes(cell: &CellValue, yes: &str) -> bool {
    cell.as_text().is_some_and(|v| v == yes)
}

/// When the number of flagged depositors and the number of parsed FTD dates
/// differ by more than `threshold`, keep FTD dates only on flagged rows.
///
/// Kept dates are the ones already resolved; nothing is synthesized for a
/// flagged row without a date. Returns whether the flag took over.
pub fn reconcile_with_deposit_flag(
    ftd: &mut [ResolvedDate],
    flags: &[bool],
    threshold: usize,
) -> bool {
    let flagged = flags.iter().filter(|f| **f).count();
    let parsed = ftd.iter().filter(|r| r.is_valid()).count();
    if flagged.abs_diff(parsed) <= threshold {
        return false;
    }

    warn!(
        flagged,
        parsed, "deposit flag disagrees with parsed FTD dates, keeping dates on flagged rows only"
    );
    for (resolved, flag) in ftd.iter_mut().zip(flags) {
        if !flag && resolved.is_valid() {
            *resolved = ResolvedDate::rejected(DateClass::NullInput);
        }
    }
    true
}

fn apply_window(resolved: &mut [ResolvedDate], policy: &NormalizePolicy, counts: &mut AxisCounts) {
    for r in resolved.iter_mut() {
        let Some(date) = r.date() else { continue };
        match policy.check_window(date) {
            WindowCheck::Inside => {}
            WindowCheck::Before => {
                counts.before_window += 1;
                *r = ResolvedDate::rejected(DateClass::OutOfRange);
            }
            WindowCheck::After => {
                counts.after_window += 1;
                *r = ResolvedDate::rejected(DateClass::OutOfRange);
            }
        }
    }
}

/// Turn clean records back into a raw upload with canonical headers, so a
/// cleaned set can be fed through `normalize` again.
pub fn to_raw_dataset(records: &[CleanRecord], has_country: bool) -> RawDataset {
    let schema = ColumnSchema::default();
    let ftd_col = schema.ftd[0].clone();
    let kyc_col = schema.kyc[0].clone();
    let source_col = schema.source[0].clone();
    let country_col = schema.country[0].clone();

    let mut columns = vec![
        schema.record_id.clone(),
        ftd_col.clone(),
        kyc_col.clone(),
        source_col.clone(),
    ];
    if has_country {
        columns.push(country_col.clone());
    }

    let rows = records
        .iter()
        .map(|r| {
            let mut row = RawRecord::new();
            row.insert(schema.record_id.clone(), CellValue::Text(r.record_id.clone()));
            let ftd = r.ftd_date.map(|d| d.format("%Y-%m-%d").to_string());
            row.insert(ftd_col.clone(), date_cell(ftd));
            let kyc = r.kyc_date.map(|d| match r.kyc_time {
                Some(t) => format!("{} {}", d.format("%Y-%m-%d"), t.format("%H:%M:%S")),
                None => d.format("%Y-%m-%d").to_string(),
            });
            row.insert(kyc_col.clone(), date_cell(kyc));
            row.insert(source_col.clone(), CellValue::Text(r.source.clone()));
            if has_country {
                let country = r.country.clone().map(CellValue::Text).unwrap_or(CellValue::Empty);
                row.insert(country_col.clone(), country);
            }
            row
        })
        .collect();

    RawDataset {
        columns,
        records: rows,
    }
}

fn date_cell(text: Option<String>) -> CellValue {
    text.map(CellValue::Text).unwrap_or(CellValue::Empty)
}
