use thiserror::Error;

/// Errors that abort a load. Per-cell date problems never show up here;
/// they are folded into `ResolvedDate` and the dataset diagnostics.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("file is missing required columns: {missing:?}. Found columns: {found:?}")]
    MissingColumns {
        missing: Vec<String>,
        found: Vec<String>,
    },

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("unsupported file format: {0} (expected .csv, .xlsx or .xls)")]
    UnsupportedFormat(String),

    #[error("workbook has no sheets or no header row")]
    EmptyWorkbook,

    #[error("excel parse failed: {0}")]
    Excel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<calamine::XlsxError> for PipelineError {
    fn from(err: calamine::XlsxError) -> Self {
        PipelineError::Excel(err.to_string())
    }
}

impl From<calamine::XlsError> for PipelineError {
    fn from(err: calamine::XlsError) -> Self {
        PipelineError::Excel(err.to_string())
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_both_sides() {
        let err = PipelineError::MissingColumns {
            missing: vec!["DATE_CREATED".to_string()],
            found: vec!["Record ID".to_string(), "source".to_string()],
        };
        let msg = err.to_string();
        assert!(msg.contains("DATE_CREATED"));
        assert!(msg.contains("Record ID"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err: PipelineError = io.into();
        assert!(matches!(err, PipelineError::Io(_)));
    }
}
