use std::env;
use std::path::PathBuf;

pub const INPUT_ENV: &str = "FTD_REPORT_INPUT";
pub const OUTPUT_DIR_ENV: &str = "FTD_REPORT_OUTPUT_DIR";
pub const DEFAULT_INPUT: &str = "clients.xlsx";

/// Where to read the upload from and where to write reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub input_path: PathBuf,
    pub output_dir: PathBuf,
}

impl AppConfig {
    /// First CLI argument, then `FTD_REPORT_INPUT`, then `clients.xlsx`.
    pub fn from_env_and_args() -> Self {
        Self::resolve(
            env::args().nth(1),
            env::var(INPUT_ENV).ok(),
            env::var(OUTPUT_DIR_ENV).ok(),
        )
    }

    pub fn resolve(
        arg: Option<String>,
        input_env: Option<String>,
        output_env: Option<String>,
    ) -> Self {
        let non_blank = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        let input = non_blank(arg)
            .or_else(|| non_blank(input_env))
            .unwrap_or_else(|| DEFAULT_INPUT.to_string());
        let output = non_blank(output_env).unwrap_or_else(|| ".".to_string());
        Self {
            input_path: PathBuf::from(input),
            output_dir: PathBuf::from(output),
        }
    }

    pub fn output_path(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }
}
