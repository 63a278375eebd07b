//! Site Workbook Library
//!
//! Loads the uploaded two-sheet `.xlsx` workbook ("Companies" and
//! "Projects") into typed records. Parsing is all-or-nothing: the whole
//! workbook must validate before anything is handed to session state, so a
//! rejected upload never disturbs what the user already has on screen.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod loader;

pub use loader::load_workbook_bytes;

/// Sheet holding one row per company location.
pub const COMPANIES_SHEET: &str = "Companies";

/// Sheet holding one row per project site.
pub const PROJECTS_SHEET: &str = "Projects";

/// Required columns for the Companies sheet, exact header text.
pub const COMPANY_COLUMNS: [&str; 4] =
    ["Company Location", "Latitude", "Longitude", "Company Name"];

/// Required columns for the Projects sheet, exact header text.
pub const PROJECT_COLUMNS: [&str; 3] = ["Project Name", "Latitude", "Longitude"];

#[derive(Error, Debug)]
pub enum WorkbookError {
    #[error("workbook could not be read: {0}")]
    Xlsx(#[from] calamine::XlsxError),
    #[error("workbook has no '{0}' sheet")]
    SheetMissing(&'static str),
    #[error("'{sheet}' sheet must include columns: {required}")]
    MissingColumns {
        sheet: &'static str,
        required: String,
    },
    #[error("'{sheet}' sheet row {row}: column '{column}' has no usable value")]
    BadCell {
        sheet: &'static str,
        row: usize,
        column: &'static str,
    },
    #[error("'{sheet}' sheet row {row}: {column} {value} is outside the valid range")]
    CoordinateOutOfRange {
        sheet: &'static str,
        row: usize,
        column: &'static str,
        value: f64,
    },
}

pub type Result<T> = std::result::Result<T, WorkbookError>;

/// One row of the Companies sheet. `location` is the unique label shown on
/// the map; `company` is the group key that drives coloring and the
/// group-level bulk toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanyRecord {
    pub company: String,
    pub location: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// One row of the Projects sheet. Visibility is session state, not workbook
/// data, so it lives with the dashboard state rather than here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectRow {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

/// Fully-parsed workbook, ready to apply to session state.
#[derive(Debug, Clone, Default)]
pub struct WorkbookData {
    pub companies: Vec<CompanyRecord>,
    pub projects: Vec<ProjectRow>,
}

/// Validate latitude is in valid range
pub fn is_valid_latitude(lat: f64) -> bool {
    (-90.0..=90.0).contains(&lat) && lat.is_finite()
}

/// Validate longitude is in valid range
pub fn is_valid_longitude(lon: f64) -> bool {
    (-180.0..=180.0).contains(&lon) && lon.is_finite()
}
