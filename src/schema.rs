// Declarative column schema: each logical field lists the physical header
// names it accepts, in priority order. Matching is case-insensitive and
// exact after trimming; the record id column is matched exactly.
use crate::error::{PipelineError, PipelineResult};
use crate::types::ColumnMapping;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ColumnSchema {
    pub ftd: Vec<String>,
    pub kyc: Vec<String>,
    pub source: Vec<String>,
    pub country: Vec<String>,
    pub record_id: String,
    /// Any header containing this text (case-insensitive) is the deposit flag.
    pub deposit_flag_marker: String,
}

fn owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

impl Default for ColumnSchema {
    fn default() -> Self {
        Self {
            ftd: owned(&[
                "portal - ftd_time",
                "portal-ftd_time",
                "portal – ftd_time",
                "ftd_time",
            ]),
            kyc: owned(&["DATE_CREATED", "date_created", "Create Date"]),
            source: owned(&[
                "portal - source_marketing_campaign",
                "Marketing campaign",
                "source",
            ]),
            country: owned(&["portal - country", "portal-country", "country"]),
            record_id: "Record ID".to_string(),
            deposit_flag_marker: "made_a_deposit".to_string(),
        }
    }
}

impl ColumnSchema {
    /// Match every logical field against the header row.
    ///
    /// Fails with `MissingColumns` naming the canonical (first) alias of each
    /// required field that matched nothing, plus the headers actually found.
    pub fn resolve(&self, columns: &[String]) -> PipelineResult<ColumnMapping> {
        let ftd = find_column(columns, &self.ftd);
        let kyc = find_column(columns, &self.kyc);
        let source = find_column(columns, &self.source);

        let mut missing = Vec::new();
        for (found, aliases) in [(&ftd, &self.ftd), (&kyc, &self.kyc), (&source, &self.source)] {
            if found.is_none() {
                missing.push(aliases.first().cloned().unwrap_or_default());
            }
        }

        let (Some(ftd), Some(kyc), Some(source)) = (ftd, kyc, source) else {
            return Err(PipelineError::MissingColumns {
                missing,
                found: columns.to_vec(),
            });
        };

        let mapping = ColumnMapping {
            ftd,
            kyc,
            source,
            country: find_column(columns, &self.country),
            record_id: columns
                .iter()
                .find(|c| c.trim() == self.record_id)
                .cloned(),
            deposit_flag: self.find_deposit_flag(columns),
        };
        debug!(?mapping, "resolved columns");
        Ok(mapping)
    }

    fn find_deposit_flag(&self, columns: &[String]) -> Option<String> {
        let marker = self.deposit_flag_marker.to_lowercase();
        columns
            .iter()
            .find(|c| c.to_lowercase().contains(&marker))
            .cloned()
    }
}

/// First header matching any alias, trying aliases in order.
fn find_column(columns: &[String], aliases: &[String]) -> Option<String> {
    aliases.iter().find_map(|alias| {
        let alias = alias.to_lowercase();
        columns
            .iter()
            .find(|c| c.trim().to_lowercase() == alias)
            .cloned()
    })
}
