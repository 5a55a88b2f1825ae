use crate::normalizer::UNKNOWN_LABEL;
use crate::types::{
    CategoryConversionRow, CleanRecord, ComparisonRow, DatasetDiagnostics, MonthlyCountRow,
    SourceTotalRow, SummaryStats,
};
use crate::util::{month_label, percent};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Group label of the per-month sum rows.
pub const TOTAL_LABEL: &str = "TOTAL";

/// Which anchor event the month buckets come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Ftd,
    Kyc,
}

impl Axis {
    pub fn month(self, record: &CleanRecord) -> Option<NaiveDate> {
        match self {
            Axis::Ftd => record.ftd_month,
            Axis::Kyc => record.kyc_month,
        }
    }
}

/// Explicit selection passed to every report. `None` means no restriction,
/// an empty set means nothing passes.
#[derive(Debug, Clone)]
pub struct ReportFilter {
    pub axis: Axis,
    pub months: Option<BTreeSet<NaiveDate>>,
    pub sources: Option<BTreeSet<String>>,
    pub countries: Option<BTreeSet<String>>,
}

impl ReportFilter {
    pub fn new(axis: Axis) -> Self {
        Self {
            axis,
            months: None,
            sources: None,
            countries: None,
        }
    }

    pub fn with_months(mut self, months: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.months = Some(months.into_iter().collect());
        self
    }

    pub fn with_sources<S: Into<String>>(mut self, sources: impl IntoIterator<Item = S>) -> Self {
        self.sources = Some(sources.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_countries<S: Into<String>>(
        mut self,
        countries: impl IntoIterator<Item = S>,
    ) -> Self {
        self.countries = Some(countries.into_iter().map(Into::into).collect());
        self
    }

    fn on_axis(&self, axis: Axis) -> Self {
        Self {
            axis,
            ..self.clone()
        }
    }

    /// Month bucket of `record` if it passes the filter.
    pub fn matches(&self, record: &CleanRecord) -> Option<NaiveDate> {
        let month = self.axis.month(record)?;
        if let Some(months) = &self.months {
            if !months.contains(&month) {
                return None;
            }
        }
        if let Some(sources) = &self.sources {
            if !sources.contains(&record.source) {
                return None;
            }
        }
        // Records from a file without a country column ignore the country selection.
        if let (Some(countries), Some(country)) = (&self.countries, &record.country) {
            if !countries.contains(country) {
                return None;
            }
        }
        Some(month)
    }
}

/// Coarse grouping of marketing sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceCategory {
    Ib,
    Organic,
    Marketing,
}

impl SourceCategory {
    pub fn label(self) -> &'static str {
        match self {
            SourceCategory::Ib => "IB",
            SourceCategory::Organic => "Organic",
            SourceCategory::Marketing => "Marketing",
        }
    }
}

pub fn categorize_source(source: &str) -> SourceCategory {
    let lower = source.to_lowercase();
    if lower.contains("ib") {
        SourceCategory::Ib
    } else if lower == UNKNOWN_LABEL.to_lowercase() || lower == "unknown" {
        SourceCategory::Organic
    } else {
        SourceCategory::Marketing
    }
}

/// Filtered view over the records; the records themselves are untouched.
pub fn filter_records<'a>(
    records: &'a [CleanRecord],
    filter: &ReportFilter,
) -> Vec<&'a CleanRecord> {
    records.iter().filter(|r| filter.matches(r).is_some()).collect()
}

fn monthly_counts<F>(
    records: &[CleanRecord],
    filter: &ReportFilter,
    group_of: F,
) -> Vec<MonthlyCountRow>
where
    F: Fn(&CleanRecord) -> Option<String>,
{
    let mut counts: BTreeMap<(NaiveDate, String), usize> = BTreeMap::new();
    for r in records {
        let Some(month) = filter.matches(r) else { continue };
        let Some(group) = group_of(r) else { continue };
        *counts.entry((month, group)).or_default() += 1;
    }

    let mut rows: Vec<(NaiveDate, MonthlyCountRow)> = counts
        .into_iter()
        .map(|((month, group), clients)| {
            (
                month,
                MonthlyCountRow {
                    month: month_label(month),
                    group,
                    clients,
                },
            )
        })
        .collect();
    rows.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| b.1.clients.cmp(&a.1.clients))
            .then_with(|| a.1.group.cmp(&b.1.group))
    });
    rows.into_iter().map(|(_, row)| row).collect()
}

pub fn monthly_by_source(records: &[CleanRecord], filter: &ReportFilter) -> Vec<MonthlyCountRow> {
    monthly_counts(records, filter, |r| Some(r.source.clone()))
}

/// Empty when the upload had no country column.
pub fn monthly_by_country(records: &[CleanRecord], filter: &ReportFilter) -> Vec<MonthlyCountRow> {
    monthly_counts(records, filter, |r| r.country.clone())
}

pub fn monthly_by_category(records: &[CleanRecord], filter: &ReportFilter) -> Vec<MonthlyCountRow> {
    monthly_counts(records, filter, |r| {
        Some(categorize_source(&r.source).label().to_string())
    })
}

/// One `TOTAL` row per month summing every group of that month.
pub fn monthly_totals(rows: &[MonthlyCountRow]) -> Vec<MonthlyCountRow> {
    let mut sums: BTreeMap<&str, usize> = BTreeMap::new();
    for row in rows {
        *sums.entry(row.month.as_str()).or_default() += row.clients;
    }
    sums.into_iter()
        .map(|(month, clients)| MonthlyCountRow {
            month: month.to_string(),
            group: TOTAL_LABEL.to_string(),
            clients,
        })
        .collect()
}

/// Rows of a monthly report with each month's `TOTAL` row placed after the
/// month's groups. A report with a single group is returned as is.
pub fn with_monthly_totals(rows: Vec<MonthlyCountRow>) -> Vec<MonthlyCountRow> {
    let groups = rows.iter().map(|r| r.group.as_str()).collect::<BTreeSet<_>>().len();
    if groups <= 1 {
        return rows;
    }
    let mut totals = monthly_totals(&rows).into_iter().peekable();
    let mut out = Vec::with_capacity(rows.len() + groups);
    for row in rows {
        while let Some(total) = totals.next_if(|t| t.month < row.month) {
            out.push(total);
        }
        out.push(row);
    }
    out.extend(totals);
    out
}

fn conversion_rate(ftd: usize, kyc: usize) -> f64 {
    (percent(ftd, kyc) * 100.0).round() / 100.0
}

/// Client count per source over the whole set, largest first.
pub fn source_totals(records: &[CleanRecord]) -> Vec<SourceTotalRow> {
    let mut map: HashMap<&str, usize> = HashMap::new();
    for r in records {
        *map.entry(r.source.as_str()).or_default() += 1;
    }
    let mut rows: Vec<SourceTotalRow> = map
        .into_iter()
        .map(|(source, clients)| SourceTotalRow {
            source: source.to_string(),
            clients,
        })
        .collect();
    rows.sort_by(|a, b| match b.clients.cmp(&a.clients) {
        Ordering::Equal => a.source.cmp(&b.source),
        other => other,
    });
    rows
}

/// FTD and KYC counts side by side per month and source category,
/// zero-filled over every month and category that shows up on either axis.
pub fn ftd_kyc_comparison(records: &[CleanRecord], filter: &ReportFilter) -> Vec<ComparisonRow> {
    let ftd_filter = filter.on_axis(Axis::Ftd);
    let kyc_filter = filter.on_axis(Axis::Kyc);

    let mut counts: BTreeMap<(NaiveDate, SourceCategory), (usize, usize)> = BTreeMap::new();
    let mut months = BTreeSet::new();
    let mut categories = BTreeSet::new();
    for r in records {
        let category = categorize_source(&r.source);
        if let Some(month) = ftd_filter.matches(r) {
            counts.entry((month, category)).or_default().0 += 1;
            months.insert(month);
            categories.insert(category);
        }
        if let Some(month) = kyc_filter.matches(r) {
            counts.entry((month, category)).or_default().1 += 1;
            months.insert(month);
            categories.insert(category);
        }
    }

    let mut rows = Vec::with_capacity(months.len() * categories.len());
    for month in &months {
        for category in &categories {
            let (ftd, kyc) = counts.get(&(*month, *category)).copied().unwrap_or((0, 0));
            rows.push(ComparisonRow {
                month: month_label(*month),
                category: category.label().to_string(),
                ftd_clients: ftd,
                kyc_clients: kyc,
                conversion_rate: conversion_rate(ftd, kyc),
            });
        }
    }
    rows
}

/// FTD/KYC conversion per source category over a comparison report, followed
/// by an overall `TOTAL` row. Empty when the comparison is empty.
pub fn conversion_by_category(comparison: &[ComparisonRow]) -> Vec<CategoryConversionRow> {
    if comparison.is_empty() {
        return Vec::new();
    }
    let mut sums: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for row in comparison {
        let entry = sums.entry(row.category.as_str()).or_default();
        entry.0 += row.ftd_clients;
        entry.1 += row.kyc_clients;
    }
    let (all_ftd, all_kyc) = sums
        .values()
        .fold((0, 0), |(f, k), (ftd, kyc)| (f + ftd, k + kyc));

    let row = |category: &str, ftd: usize, kyc: usize| CategoryConversionRow {
        category: category.to_string(),
        kyc_clients: kyc,
        ftd_clients: ftd,
        conversion_rate: conversion_rate(ftd, kyc),
    };
    let mut rows: Vec<CategoryConversionRow> = sums
        .iter()
        .map(|(category, (ftd, kyc))| row(*category, *ftd, *kyc))
        .collect();
    rows.push(row(TOTAL_LABEL, all_ftd, all_kyc));
    rows
}

pub fn available_months(records: &[CleanRecord], axis: Axis) -> Vec<NaiveDate> {
    records
        .iter()
        .filter_map(|r| axis.month(r))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn available_sources(records: &[CleanRecord]) -> Vec<String> {
    records
        .iter()
        .map(|r| r.source.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn available_countries(records: &[CleanRecord]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.country.clone())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

pub fn generate_summary(records: &[CleanRecord], diagnostics: &DatasetDiagnostics) -> SummaryStats {
    SummaryStats {
        total_records: records.len(),
        ftd_clients: records.iter().filter(|r| r.ftd_date.is_some()).count(),
        kyc_clients: records.iter().filter(|r| r.kyc_date.is_some()).count(),
        placeholder_ftd: diagnostics.placeholder_count(),
        ftd_out_of_range: diagnostics.ftd.out_of_range(),
        kyc_out_of_range: diagnostics.kyc.out_of_range(),
        unknown_sources: records.iter().filter(|r| r.source == UNKNOWN_LABEL).count(),
        distinct_sources: available_sources(records).len(),
        distinct_countries: diagnostics
            .has_country
            .then(|| available_countries(records).len()),
        columns: diagnostics.columns.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::first_of_month;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn rec(
        id: &str,
        ftd: Option<NaiveDate>,
        kyc: Option<NaiveDate>,
        source: &str,
        country: Option<&str>,
    ) -> CleanRecord {
        CleanRecord {
            record_id: id.to_string(),
            ftd_date: ftd,
            kyc_date: kyc,
            kyc_time: None,
            ftd_month: ftd.map(first_of_month),
            kyc_month: kyc.map(first_of_month),
            source: source.to_string(),
            country: country.map(|c| c.to_string()),
        }
    }

    fn sample() -> Vec<CleanRecord> {
        vec![
            rec("1", Some(ymd(2024, 1, 5)), Some(ymd(2024, 1, 2)), "Google", Some("Cyprus")),
            rec("2", Some(ymd(2024, 1, 20)), Some(ymd(2023, 12, 30)), "Google", Some("Greece")),
            rec("3", None, Some(ymd(2024, 1, 9)), "IB-Partner", Some("Cyprus")),
            rec("4", Some(ymd(2024, 2, 1)), Some(ymd(2024, 2, 1)), "(Unknown)", Some("(Unknown)")),
            rec("5", Some(ymd(2024, 2, 14)), None, "IB-Partner", Some("Greece")),
        ]
    }

    #[test]
    fn test_categorize_source() {
        assert_eq!(categorize_source("IB-Partner"), SourceCategory::Ib);
        assert_eq!(categorize_source("my_ib_campaign"), SourceCategory::Ib);
        assert_eq!(categorize_source("(Unknown)"), SourceCategory::Organic);
        assert_eq!(categorize_source("unknown"), SourceCategory::Organic);
        assert_eq!(categorize_source("Google"), SourceCategory::Marketing);
    }

    #[test]
    fn test_monthly_by_source_ftd() {
        let rows = monthly_by_source(&sample(), &ReportFilter::new(Axis::Ftd));
        assert_eq!(
            rows,
            vec![
                MonthlyCountRow { month: "2024-01".into(), group: "Google".into(), clients: 2 },
                MonthlyCountRow { month: "2024-02".into(), group: "(Unknown)".into(), clients: 1 },
                MonthlyCountRow { month: "2024-02".into(), group: "IB-Partner".into(), clients: 1 },
            ]
        );
    }

    #[test]
    fn test_filter_months_and_sources() {
        let filter = ReportFilter::new(Axis::Kyc)
            .with_months([ymd(2024, 1, 1)])
            .with_sources(["IB-Partner"]);
        let rows = monthly_by_source(&sample(), &filter);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group, "IB-Partner");
        assert_eq!(rows[0].clients, 1);

        let nothing = ReportFilter::new(Axis::Kyc).with_months(Vec::new());
        assert!(filter_records(&sample(), &nothing).is_empty());
    }

    #[test]
    fn test_country_filter_and_missing_country_column() {
        let filter = ReportFilter::new(Axis::Ftd).with_countries(["Greece"]);
        let rows = monthly_by_country(&sample(), &filter);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.group == "Greece"));

        let no_country: Vec<CleanRecord> = sample()
            .into_iter()
            .map(|mut r| {
                r.country = None;
                r
            })
            .collect();
        assert_eq!(filter_records(&no_country, &filter).len(), 4);
        assert!(monthly_by_country(&no_country, &ReportFilter::new(Axis::Ftd)).is_empty());
    }

    #[test]
    fn test_filter_does_not_mutate_records() {
        let records = sample();
        let before = records.clone();
        let _ = monthly_by_category(&records, &ReportFilter::new(Axis::Ftd));
        let _ = ftd_kyc_comparison(&records, &ReportFilter::new(Axis::Ftd));
        assert_eq!(records, before);
    }

    #[test]
    fn test_comparison_zero_fills() {
        let rows = ftd_kyc_comparison(&sample(), &ReportFilter::new(Axis::Ftd));
        // months: 2023-12, 2024-01, 2024-02; categories: IB, Organic, Marketing
        assert_eq!(rows.len(), 9);
        let jan_marketing = rows
            .iter()
            .find(|r| r.month == "2024-01" && r.category == "Marketing")
            .unwrap();
        assert_eq!(jan_marketing.ftd_clients, 2);
        assert_eq!(jan_marketing.kyc_clients, 1);
        let dec_ib = rows
            .iter()
            .find(|r| r.month == "2023-12" && r.category == "IB")
            .unwrap();
        assert_eq!((dec_ib.ftd_clients, dec_ib.kyc_clients), (0, 0));
        assert_eq!(dec_ib.conversion_rate, 0.0);
        assert_eq!(jan_marketing.conversion_rate, 200.0);
    }

    #[test]
    fn test_conversion_by_category() {
        let comparison = ftd_kyc_comparison(&sample(), &ReportFilter::new(Axis::Ftd));
        let rows = conversion_by_category(&comparison);
        let labels: Vec<&str> = rows.iter().map(|r| r.category.as_str()).collect();
        assert_eq!(labels, vec!["IB", "Marketing", "Organic", TOTAL_LABEL]);

        // IB: one FTD (Feb), one KYC (Jan).
        assert_eq!((rows[0].ftd_clients, rows[0].kyc_clients), (1, 1));
        assert_eq!(rows[0].conversion_rate, 100.0);
        // Marketing: two FTD, two KYC (Dec and Jan).
        assert_eq!((rows[1].ftd_clients, rows[1].kyc_clients), (2, 2));
        let total = &rows[3];
        assert_eq!((total.ftd_clients, total.kyc_clients), (4, 4));
        assert_eq!(total.conversion_rate, 100.0);

        assert!(conversion_by_category(&[]).is_empty());
    }

    #[test]
    fn test_conversion_rate_rounds_and_guards_zero_kyc() {
        assert_eq!(conversion_rate(1, 3), 33.33);
        assert_eq!(conversion_rate(5, 0), 0.0);
    }

    #[test]
    fn test_monthly_totals_follow_each_month() {
        let rows = with_monthly_totals(monthly_by_source(&sample(), &ReportFilter::new(Axis::Ftd)));
        let flat: Vec<(&str, &str, usize)> = rows
            .iter()
            .map(|r| (r.month.as_str(), r.group.as_str(), r.clients))
            .collect();
        assert_eq!(
            flat,
            vec![
                ("2024-01", "Google", 2),
                ("2024-01", TOTAL_LABEL, 2),
                ("2024-02", "(Unknown)", 1),
                ("2024-02", "IB-Partner", 1),
                ("2024-02", TOTAL_LABEL, 2),
            ]
        );
    }

    #[test]
    fn test_single_group_gets_no_totals() {
        let filter = ReportFilter::new(Axis::Ftd).with_sources(["Google"]);
        let rows = monthly_by_source(&sample(), &filter);
        assert_eq!(with_monthly_totals(rows.clone()), rows);
        assert_eq!(monthly_totals(&rows).len(), 1);
    }

    #[test]
    fn test_source_totals_and_available() {
        let totals = source_totals(&sample());
        assert_eq!(totals[0].clients, 2);
        assert_eq!(totals[0].source, "Google");
        assert_eq!(totals[1].source, "IB-Partner");
        assert_eq!(totals.len(), 3);

        assert_eq!(
            available_months(&sample(), Axis::Kyc),
            vec![ymd(2023, 12, 1), ymd(2024, 1, 1), ymd(2024, 2, 1)]
        );
        assert_eq!(available_countries(&sample()), vec!["(Unknown)", "Cyprus", "Greece"]);
    }

    #[test]
    fn test_generate_summary() {
        let diagnostics = DatasetDiagnostics {
            has_country: true,
            ..DatasetDiagnostics::default()
        };
        let summary = generate_summary(&sample(), &diagnostics);
        assert_eq!(summary.total_records, 5);
        assert_eq!(summary.ftd_clients, 4);
        assert_eq!(summary.kyc_clients, 4);
        assert_eq!(summary.unknown_sources, 1);
        assert_eq!(summary.distinct_sources, 3);
        assert_eq!(summary.distinct_countries, Some(3));
    }
}
