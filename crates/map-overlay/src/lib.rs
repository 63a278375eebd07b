//! Map Overlay Library
//!
//! Turns the session state into the drawing payload the browser map
//! consumes: GeoJSON point features with resolved colors and circle radii,
//! a legend, and the map center. This layer never filters; it draws
//! whatever the visibility state already decided is visible.

use chrono::Utc;
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value as GeoValue};
use radius_filter::{haversine_miles, DashboardState, MapMode, ProjectSite};
use serde::Serialize;
use serde_json::json;
use site_workbook::CompanyRecord;

/// Fixed 20-color categorical palette, assigned to company groups by
/// first-seen order and cycled past twenty groups.
pub const CATEGORY_PALETTE: [&str; 20] = [
    "#1f77b4", "#aec7e8", "#ff7f0e", "#ffbb78", "#2ca02c", "#98df8a", "#d62728", "#ff9896",
    "#9467bd", "#c5b0d5", "#8c564b", "#c49c94", "#e377c2", "#f7b6d2", "#7f7f7f", "#c7c7c7",
    "#bcbd22", "#dbdb8d", "#17becf", "#9edae5",
];

/// Groups outside the current dataset fall back to black, like markers
/// whose group was never assigned a palette slot.
pub const DEFAULT_COLOR: &str = "#000000";

pub const MILES_TO_METERS: f64 = 1609.34;

/// Cosmetic marker-halo radius used around companies in project mode;
/// the filter circle is drawn around the reference project instead.
pub const COSMETIC_CIRCLE_M: f64 = 200.0;

/// Continental-US centroid, the fallback when nothing is visible.
pub const FALLBACK_CENTER: [f64; 2] = [39.8283, -98.5795];

/// One legend row.
#[derive(Debug, Clone, Serialize)]
pub struct LegendEntry {
    pub company: String,
    pub color: String,
}

/// The full drawing payload for one render.
#[derive(Debug, Serialize)]
pub struct MapView {
    pub mode: MapMode,
    pub radius_miles: f64,
    pub reference_project: Option<String>,
    /// `[latitude, longitude]`.
    pub center: [f64; 2],
    pub companies: FeatureCollection,
    pub projects: FeatureCollection,
    pub legend: Vec<LegendEntry>,
    pub generated_at: String,
}

/// Assign palette colors to company groups by first-seen row order.
pub fn group_colors(companies: &[CompanyRecord]) -> Vec<(String, &'static str)> {
    let mut assigned: Vec<(String, &'static str)> = Vec::new();
    for record in companies {
        if !assigned.iter().any(|(name, _)| name == &record.company) {
            let color = CATEGORY_PALETTE[assigned.len() % CATEGORY_PALETTE.len()];
            assigned.push((record.company.clone(), color));
        }
    }
    assigned
}

pub fn color_for<'a>(colors: &'a [(String, &'static str)], company: &str) -> &'a str {
    colors
        .iter()
        .find(|(name, _)| name == company)
        .map(|(_, color)| *color)
        .unwrap_or(DEFAULT_COLOR)
}

/// Legend rows, sorted by group name for a stable sidebar.
pub fn legend(colors: &[(String, &'static str)]) -> Vec<LegendEntry> {
    let mut entries: Vec<LegendEntry> = colors
        .iter()
        .map(|(company, color)| LegendEntry {
            company: company.clone(),
            color: (*color).to_string(),
        })
        .collect();
    entries.sort_by(|a, b| a.company.cmp(&b.company));
    entries
}

/// Build the complete drawing payload from the current state.
pub fn build_map_view(state: &DashboardState) -> MapView {
    let colors = group_colors(state.companies());
    let mode = state.mode();
    let radius_miles = state.radius_miles();

    // The reference point only means something in project-radius mode.
    let reference: Option<ProjectSite> = match mode {
        MapMode::WithinProjectRadius => state.reference_project().cloned(),
        MapMode::AllCompanies => None,
    };

    let company_circle_m = match mode {
        MapMode::AllCompanies => radius_miles * MILES_TO_METERS,
        MapMode::WithinProjectRadius => COSMETIC_CIRCLE_M,
    };

    let company_features: Vec<Feature> = state
        .visible_companies()
        .map(|record| {
            let mut properties = props(json!({
                "label": record.location,
                "company": record.company,
                "color": color_for(&colors, &record.company),
                "circle_radius_m": company_circle_m,
            }));
            if let Some(reference) = &reference {
                let distance = haversine_miles(
                    reference.latitude,
                    reference.longitude,
                    record.latitude,
                    record.longitude,
                );
                properties.insert(
                    "distance_miles".to_string(),
                    json!((distance * 100.0).round() / 100.0),
                );
            }
            point_feature(record.latitude, record.longitude, properties)
        })
        .collect();

    let project_features: Vec<Feature> = state
        .projects()
        .iter()
        .filter(|p| p.visible)
        .map(|project| {
            let is_reference = reference
                .as_ref()
                .map(|r| r.name == project.name)
                .unwrap_or(false);
            let mut properties = props(json!({
                "name": project.name,
                "is_reference": is_reference,
            }));
            if is_reference {
                properties.insert(
                    "filter_radius_m".to_string(),
                    json!(radius_miles * MILES_TO_METERS),
                );
            }
            point_feature(project.latitude, project.longitude, properties)
        })
        .collect();

    MapView {
        mode,
        radius_miles,
        reference_project: reference.map(|r| r.name),
        center: center(state),
        companies: collection(company_features),
        projects: collection(project_features),
        legend: legend(&colors),
        generated_at: Utc::now().to_rfc3339(),
    }
}

/// Mean position of visible companies, then visible projects, then the
/// continental-US fallback so an all-hidden map still has a usable center.
fn center(state: &DashboardState) -> [f64; 2] {
    let companies: Vec<[f64; 2]> = state
        .visible_companies()
        .map(|r| [r.latitude, r.longitude])
        .collect();
    if let Some(mean) = mean_position(&companies) {
        return mean;
    }

    let projects: Vec<[f64; 2]> = state
        .projects()
        .iter()
        .filter(|p| p.visible)
        .map(|p| [p.latitude, p.longitude])
        .collect();
    mean_position(&projects).unwrap_or(FALLBACK_CENTER)
}

fn mean_position(points: &[[f64; 2]]) -> Option<[f64; 2]> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (lat_sum, lon_sum) = points
        .iter()
        .fold((0.0, 0.0), |(lat, lon), p| (lat + p[0], lon + p[1]));
    Some([lat_sum / n, lon_sum / n])
}

fn point_feature(lat: f64, lon: f64, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(GeoValue::Point(vec![lon, lat]))),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

fn collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn props(value: serde_json::Value) -> JsonObject {
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}
