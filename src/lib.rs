//! Client acquisition report core: resolves messy FTD / KYC date cells,
//! normalizes an uploaded client list and builds monthly counts by source
//! and country.
pub mod config;
pub mod error;
pub mod loader;
pub mod logging;
pub mod normalizer;
pub mod output;
pub mod reports;
pub mod resolver;
pub mod schema;
pub mod types;
pub mod util;
