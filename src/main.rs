// Entry point and high-level CLI flow.
//
// - Option [1] loads and normalizes the client file, printing diagnostics.
// - Option [2] writes the monthly reports and a JSON summary.
// - After generating reports, the user can go back to the menu or exit.
use ftd_report::config::AppConfig;
use ftd_report::error::PipelineError;
use ftd_report::loader::{self, LoadedDataset, Reload};
use ftd_report::normalizer::NormalizePolicy;
use ftd_report::reports::{self, Axis, ReportFilter};
use ftd_report::schema::ColumnSchema;
use ftd_report::types::DatasetDiagnostics;
use ftd_report::{logging, output, util};
use once_cell::sync::Lazy;
use std::io::{self, Write};
use std::sync::Mutex;
use tracing::{error, info};

// Loaded dataset for this run. Reloading an unchanged file reuses it.
static APP_STATE: Lazy<Mutex<AppState>> = Lazy::new(|| Mutex::new(AppState { data: None }));

struct AppState {
    data: Option<LoadedDataset>,
}

/// Read a single line of input after printing the common "Enter choice:" prompt.
///
/// Returns `None` once stdin is closed.
fn read_choice() -> Option<String> {
    print!("Enter choice: ");
    let _ = io::stdout().flush();
    let mut buf = String::new();
    match io::stdin().read_line(&mut buf) {
        Ok(0) | Err(_) => None,
        Ok(_) => Some(buf.trim().to_string()),
    }
}

/// Returns `true` if the user chose `Y`, `false` if they chose `N`.
fn prompt_back_to_menu() -> bool {
    loop {
        print!("Back to Report Selection (Y/N): ");
        let _ = io::stdout().flush();
        let mut buf = String::new();
        if io::stdin().read_line(&mut buf).unwrap_or(0) == 0 {
            return false;
        }
        match buf.trim().to_uppercase().as_str() {
            "Y" => return true,
            "N" => return false,
            _ => println!("Invalid choice. Please enter Y or N."),
        }
    }
}

fn print_diagnostics(diag: &DatasetDiagnostics) {
    println!(
        "Processing dataset... ({} records loaded, {} kept)",
        util::format_int(diag.original_count),
        util::format_int(diag.final_count)
    );
    print!(
        "FTD: {} valid, {} placeholder (no deposit yet), {} empty, ",
        util::format_int(diag.ftd.valid),
        util::format_int(diag.ftd.placeholder),
        util::format_int(diag.ftd.null_input)
    );
    println!(
        "{} unparseable, {} before window, {} after window",
        util::format_int(diag.ftd.unparseable),
        util::format_int(diag.ftd.before_window),
        util::format_int(diag.ftd.after_window)
    );
    println!(
        "KYC: {} valid, {} empty, {} unparseable, {} before window, {} after window",
        util::format_int(diag.kyc.valid),
        util::format_int(diag.kyc.null_input),
        util::format_int(diag.kyc.unparseable),
        util::format_int(diag.kyc.before_window),
        util::format_int(diag.kyc.after_window)
    );
    if diag.original_count > 0 {
        println!(
            "Placeholder share: {}%",
            util::format_number(util::percent(diag.placeholder_count(), diag.original_count), 1)
        );
    }
    if let Some(yes) = diag.deposit_flag_yes {
        println!("Deposit flag = Yes: {}", util::format_int(yes));
    }
    println!(
        "Columns: FTD '{}', KYC '{}', source '{}', country {}",
        diag.columns.ftd,
        diag.columns.kyc,
        diag.columns.source,
        diag.columns
            .country
            .as_deref()
            .map(|c| format!("'{}'", c))
            .unwrap_or_else(|| "(none)".to_string())
    );
    println!();
}

/// Handle option [1]: load and normalize the file.
fn handle_load(config: &AppConfig) {
    let mut state = match APP_STATE.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    let result = loader::reload_if_changed(
        &config.input_path,
        &ColumnSchema::default(),
        &NormalizePolicy::default(),
        state.data.as_ref(),
    );
    match result {
        Ok(reload) => {
            match reload {
                Reload::Unchanged => {
                    info!("file unchanged since last load, keeping normalized data");
                    println!("File unchanged since last load.");
                }
                Reload::Loaded(loaded) => state.data = Some(loaded),
            }
            if let Some(data) = state.data.as_ref() {
                print_diagnostics(&data.diagnostics);
            }
        }
        Err(PipelineError::MissingColumns { missing, found }) => {
            error!(?missing, "missing required columns");
            println!("The file is missing required columns:");
            for m in &missing {
                println!("  - {}", m);
            }
            println!("Columns found: {}\n", found.join(", "));
        }
        Err(e) => {
            error!(error = %e, "load failed");
            eprintln!("Failed to load file: {}\n", e);
        }
    }
}

fn write_report<T: serde::Serialize>(config: &AppConfig, file: &str, rows: &[T]) {
    let path = config.output_path(file);
    if let Err(e) = output::write_csv(&path, rows) {
        eprintln!("Write error: {}", e);
    }
}

/// Handle option [2]: generate all reports and the JSON summary.
fn handle_generate_reports(config: &AppConfig) {
    let data = {
        let state = match APP_STATE.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.data.clone()
    };
    let Some(data) = data else {
        println!("Error: No data loaded. Please load the file first (option 1).\n");
        return;
    };
    let records = &data.records;

    println!("Generating reports...\n");

    let ftd_by_source = reports::with_monthly_totals(reports::monthly_by_source(
        records,
        &ReportFilter::new(Axis::Ftd),
    ));
    write_report(config, "ftd_by_source.csv", &ftd_by_source);
    println!("Report 1: Monthly FTD Clients by Source\n");
    output::preview_table_rows(&ftd_by_source, 5);

    let kyc_by_source = reports::with_monthly_totals(reports::monthly_by_source(
        records,
        &ReportFilter::new(Axis::Kyc),
    ));
    write_report(config, "kyc_by_source.csv", &kyc_by_source);
    println!("Report 2: Monthly KYC Clients by Source\n");
    output::preview_table_rows(&kyc_by_source, 5);

    if data.diagnostics.has_country {
        let ftd_by_country = reports::with_monthly_totals(reports::monthly_by_country(
            records,
            &ReportFilter::new(Axis::Ftd),
        ));
        write_report(config, "ftd_by_country.csv", &ftd_by_country);
        println!("Report 3: Monthly FTD Clients by Country\n");
        output::preview_table_rows(&ftd_by_country, 5);
    } else {
        println!("Report 3: skipped (no country column in this file)\n");
    }

    let ftd_by_category = reports::with_monthly_totals(reports::monthly_by_category(
        records,
        &ReportFilter::new(Axis::Ftd),
    ));
    write_report(config, "ftd_by_category.csv", &ftd_by_category);
    println!("Report 4: Monthly FTD Clients by Source Category\n");
    output::preview_table_rows(&ftd_by_category, 6);

    let comparison = reports::ftd_kyc_comparison(records, &ReportFilter::new(Axis::Ftd));
    write_report(config, "ftd_kyc_comparison.csv", &comparison);
    println!("Report 5: KYC vs FTD by Source Category\n");
    output::preview_table_rows(&comparison, 6);

    let conversion = reports::conversion_by_category(&comparison);
    write_report(config, "conversion_by_category.csv", &conversion);
    println!("Report 6: Conversion Rates by Source Category\n");
    output::preview_table_rows(&conversion, 4);

    let totals = reports::source_totals(records);
    println!("Top sources (all records):\n");
    output::preview_table_rows(&totals, 10);

    let summary = reports::generate_summary(records, &data.diagnostics);
    if let Err(e) = output::write_json(&config.output_path("summary.json"), &summary) {
        eprintln!("Write error: {}", e);
    }
    println!(
        "Summary Stats (summary.json): {} records, {} FTD clients, {} KYC clients\n",
        util::format_int(summary.total_records),
        util::format_int(summary.ftd_clients),
        util::format_int(summary.kyc_clients)
    );
}

fn main() {
    logging::init();
    let config = AppConfig::from_env_and_args();
    info!(input = %config.input_path.display(), output = %config.output_dir.display(), "starting");

    loop {
        println!("Client Acquisition Reports ({})", config.input_path.display());
        println!("[1] Load the file");
        println!("[2] Generate Reports\n");
        let Some(choice) = read_choice() else { break };
        match choice.as_str() {
            "1" => handle_load(&config),
            "2" => {
                println!();
                handle_generate_reports(&config);
                if !prompt_back_to_menu() {
                    println!("Exiting the program.");
                    break;
                }
            }
            _ => println!("Invalid choice. Please enter 1 or 2.\n"),
        }
    }
}
