//! Radius Filter Library
//!
//! The one stateful piece of the dashboard: per-location and per-project
//! visibility flags, the two filtering modes, and the radius recompute that
//! overwrites those flags from a reference project. Everything mutates
//! through [`StateEvent`] so the session owner stays a dumb event pump.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod state;

pub use state::DashboardState;

use site_workbook::WorkbookData;

/// Earth radius in miles for the haversine distance.
pub const EARTH_RADIUS_MI: f64 = 3958.8;

/// Radius bounds enforced on every radius request, matching the numeric
/// input on the dashboard (the slider covers 1-60 of the same range).
pub const MIN_RADIUS_MI: f64 = 1.0;
pub const MAX_RADIUS_MI: f64 = 500.0;

#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("unknown company location: {0}")]
    UnknownLocation(String),
    #[error("unknown project: {0}")]
    UnknownProject(String),
    #[error("no loaded company group named: {0}")]
    UnknownGroup(String),
    #[error("project name must not be empty")]
    EmptyProjectName,
    #[error("latitude {0} is outside [-90, 90]")]
    InvalidLatitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    InvalidLongitude(f64),
}

pub type Result<T> = std::result::Result<T, StateError>;

/// The two mutually exclusive filtering strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MapMode {
    /// Draw a radius circle around every visible company.
    AllCompanies,
    /// Filter everything against the radius around the reference project.
    WithinProjectRadius,
}

/// A project site with its embedded visibility flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectSite {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visible: bool,
}

/// Every way the UI can mutate session state.
#[derive(Debug, Clone)]
pub enum StateEvent {
    /// A workbook parsed cleanly and replaces the company dataset.
    WorkbookLoaded(WorkbookData),
    ModeSelected(MapMode),
    RadiusRequested(f64),
    CompanyToggled { location: String, visible: bool },
    ProjectToggled { name: String, visible: bool },
    /// Select/deselect every known location, direction from the aggregate.
    GlobalToggled,
    /// Select/deselect one company group, direction from the aggregate.
    GroupToggled { company: String },
    ProjectAdded { name: String, latitude: f64, longitude: f64 },
    ProjectRemoved { name: String },
}

/// Great-circle distance in miles between two points given in degrees.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();

    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlon / 2.0).sin().powi(2);

    EARTH_RADIUS_MI * 2.0 * a.sqrt().asin()
}
