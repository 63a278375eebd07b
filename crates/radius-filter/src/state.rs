//! Dashboard session state
//!
//! One `DashboardState` per session, owned by the gateway and mutated only
//! through [`StateEvent`]. A radius change is authoritative: the recompute
//! overwrites every visibility flag, discarding manual toggles made since
//! the last one. The `last_applied_radius` guard is what keeps those
//! toggles alive while the radius stays put.

use crate::{
    haversine_miles, MapMode, ProjectSite, Result, StateError, StateEvent, MAX_RADIUS_MI,
    MIN_RADIUS_MI,
};
use chrono::{DateTime, Utc};
use site_workbook::{is_valid_latitude, is_valid_longitude, CompanyRecord, WorkbookData};
use std::collections::HashMap;
use tracing::{debug, info};

/// Default radius matches the slider's initial position.
const DEFAULT_RADIUS_MI: f64 = 10.0;

pub struct DashboardState {
    /// Rows of the most recent upload, row order preserved. Row order
    /// drives palette assignment and group iteration downstream.
    companies: Vec<CompanyRecord>,
    /// Location label -> visible. Every label ever seen has an entry;
    /// entries are never removed.
    company_visibility: HashMap<String, bool>,
    /// Insertion-ordered set of every label ever seen. This is the domain
    /// of the global bulk toggle and survives re-uploads.
    known_locations: Vec<String>,
    /// Insertion-ordered project sites; the first visible one is the
    /// reference point in project-radius mode.
    projects: Vec<ProjectSite>,
    mode: MapMode,
    radius_miles: f64,
    last_applied_radius: Option<f64>,
    loaded_at: Option<DateTime<Utc>>,
}

impl DashboardState {
    pub fn new() -> Self {
        Self {
            companies: Vec::new(),
            company_visibility: HashMap::new(),
            known_locations: Vec::new(),
            projects: Vec::new(),
            mode: MapMode::AllCompanies,
            radius_miles: DEFAULT_RADIUS_MI,
            last_applied_radius: None,
            loaded_at: None,
        }
    }

    /// Apply one UI event. Errors leave the state untouched.
    pub fn apply(&mut self, event: StateEvent) -> Result<()> {
        match event {
            StateEvent::WorkbookLoaded(data) => {
                self.load_workbook(data);
                Ok(())
            }
            StateEvent::ModeSelected(mode) => {
                self.mode = mode;
                self.sync_radius_filter();
                Ok(())
            }
            StateEvent::RadiusRequested(radius) => {
                self.radius_miles = radius.clamp(MIN_RADIUS_MI, MAX_RADIUS_MI);
                self.sync_radius_filter();
                Ok(())
            }
            StateEvent::CompanyToggled { location, visible } => {
                match self.company_visibility.get_mut(&location) {
                    Some(flag) => {
                        *flag = visible;
                        Ok(())
                    }
                    None => Err(StateError::UnknownLocation(location)),
                }
            }
            StateEvent::ProjectToggled { name, visible } => {
                match self.projects.iter_mut().find(|p| p.name == name) {
                    Some(project) => {
                        project.visible = visible;
                        Ok(())
                    }
                    None => Err(StateError::UnknownProject(name)),
                }
            }
            StateEvent::GlobalToggled => {
                let target = !self.all_locations_visible();
                for location in &self.known_locations {
                    self.company_visibility.insert(location.clone(), target);
                }
                Ok(())
            }
            StateEvent::GroupToggled { company } => {
                let labels: Vec<String> = self
                    .companies
                    .iter()
                    .filter(|r| r.company == company)
                    .map(|r| r.location.clone())
                    .collect();
                if labels.is_empty() {
                    return Err(StateError::UnknownGroup(company));
                }
                let all_on = labels
                    .iter()
                    .all(|label| self.is_location_visible(label));
                for label in labels {
                    self.company_visibility.insert(label, !all_on);
                }
                Ok(())
            }
            StateEvent::ProjectAdded {
                name,
                latitude,
                longitude,
            } => {
                let name = name.trim().to_string();
                if name.is_empty() {
                    return Err(StateError::EmptyProjectName);
                }
                if !is_valid_latitude(latitude) {
                    return Err(StateError::InvalidLatitude(latitude));
                }
                if !is_valid_longitude(longitude) {
                    return Err(StateError::InvalidLongitude(longitude));
                }
                self.upsert_project(name, latitude, longitude);
                Ok(())
            }
            StateEvent::ProjectRemoved { name } => {
                match self.projects.iter().position(|p| p.name == name) {
                    Some(idx) => {
                        self.projects.remove(idx);
                        Ok(())
                    }
                    None => Err(StateError::UnknownProject(name)),
                }
            }
        }
    }

    fn load_workbook(&mut self, data: WorkbookData) {
        for record in &data.companies {
            if !self.company_visibility.contains_key(&record.location) {
                self.company_visibility.insert(record.location.clone(), true);
                self.known_locations.push(record.location.clone());
            }
        }

        // Project sites are seeded from the sheet on first load only;
        // once the user manages the list, uploads leave it alone.
        if self.projects.is_empty() {
            for row in &data.projects {
                self.upsert_project(row.name.clone(), row.latitude, row.longitude);
            }
        }

        self.companies = data.companies;
        self.loaded_at = Some(Utc::now());

        info!(
            "Session dataset replaced: {} rows, {} known locations, {} projects",
            self.companies.len(),
            self.known_locations.len(),
            self.projects.len()
        );
    }

    fn upsert_project(&mut self, name: String, latitude: f64, longitude: f64) {
        match self.projects.iter_mut().find(|p| p.name == name) {
            Some(project) => {
                project.latitude = latitude;
                project.longitude = longitude;
                project.visible = true;
            }
            None => self.projects.push(ProjectSite {
                name,
                latitude,
                longitude,
                visible: true,
            }),
        }
    }

    /// Overwrite every visibility flag from the reference project, but only
    /// in project-radius mode and only when the radius actually changed.
    /// With no visible project there is no reference point and the pass is
    /// silently skipped.
    fn sync_radius_filter(&mut self) {
        if self.mode != MapMode::WithinProjectRadius {
            return;
        }
        if self.last_applied_radius == Some(self.radius_miles) {
            return;
        }
        let Some((name, ref_lat, ref_lon)) = self
            .reference_project()
            .map(|p| (p.name.clone(), p.latitude, p.longitude))
        else {
            return;
        };

        let radius = self.radius_miles;
        for record in &self.companies {
            let dist = haversine_miles(ref_lat, ref_lon, record.latitude, record.longitude);
            self.company_visibility
                .insert(record.location.clone(), dist <= radius);
        }
        for project in &mut self.projects {
            let dist = haversine_miles(ref_lat, ref_lon, project.latitude, project.longitude);
            project.visible = dist <= radius;
        }
        self.last_applied_radius = Some(radius);

        debug!("Applied {radius:.2} mi radius around '{name}'");
    }

    // ========== Read accessors ==========

    pub fn mode(&self) -> MapMode {
        self.mode
    }

    pub fn radius_miles(&self) -> f64 {
        self.radius_miles
    }

    pub fn last_applied_radius(&self) -> Option<f64> {
        self.last_applied_radius
    }

    pub fn has_data(&self) -> bool {
        self.loaded_at.is_some()
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn companies(&self) -> &[CompanyRecord] {
        &self.companies
    }

    pub fn projects(&self) -> &[ProjectSite] {
        &self.projects
    }

    pub fn known_locations(&self) -> &[String] {
        &self.known_locations
    }

    /// First visible project in insertion order, so the pick is stable
    /// across toggles and re-renders. Callers decide whether the current
    /// mode makes it meaningful.
    pub fn reference_project(&self) -> Option<&ProjectSite> {
        self.projects.iter().find(|p| p.visible)
    }

    pub fn is_location_visible(&self, label: &str) -> bool {
        self.company_visibility.get(label).copied().unwrap_or(true)
    }

    pub fn all_locations_visible(&self) -> bool {
        self.known_locations
            .iter()
            .all(|label| self.is_location_visible(label))
    }

    pub fn group_all_visible(&self, company: &str) -> bool {
        self.companies
            .iter()
            .filter(|r| r.company == company)
            .all(|r| self.is_location_visible(&r.location))
    }

    pub fn visible_companies(&self) -> impl Iterator<Item = &CompanyRecord> {
        self.companies
            .iter()
            .filter(|r| self.is_location_visible(&r.location))
    }
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use site_workbook::ProjectRow;

    fn record(company: &str, location: &str, lat: f64, lon: f64) -> CompanyRecord {
        CompanyRecord {
            company: company.to_string(),
            location: location.to_string(),
            latitude: lat,
            longitude: lon,
        }
    }

    /// The worked example: project P at the origin, A on top of it,
    /// B ~6.9 mi east, C ~69.1 mi north.
    fn example_workbook() -> WorkbookData {
        WorkbookData {
            companies: vec![
                record("Acme", "A", 0.0, 0.0),
                record("Acme", "B", 0.0, 0.1),
                record("Granite", "C", 1.0, 0.0),
            ],
            projects: vec![ProjectRow {
                name: "P".to_string(),
                latitude: 0.0,
                longitude: 0.0,
            }],
        }
    }

    fn loaded_state() -> DashboardState {
        let mut state = DashboardState::new();
        state
            .apply(StateEvent::WorkbookLoaded(example_workbook()))
            .unwrap();
        state
    }

    #[test]
    fn load_defaults_everything_visible() {
        let state = loaded_state();
        assert!(state.has_data());
        assert_eq!(state.known_locations(), ["A", "B", "C"]);
        assert!(state.is_location_visible("A"));
        assert!(state.is_location_visible("C"));
        assert_eq!(state.projects().len(), 1);
        assert!(state.projects()[0].visible);
        assert!(state.last_applied_radius().is_none());
    }

    #[test]
    fn radius_recompute_filters_by_distance() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();

        assert!(state.is_location_visible("A"));
        assert!(state.is_location_visible("B"));
        assert!(!state.is_location_visible("C"));
        // The reference project is at distance zero from itself.
        assert!(state.projects()[0].visible);
        assert_eq!(state.last_applied_radius(), Some(10.0));
    }

    #[test]
    fn recompute_boundary_is_inclusive() {
        let mut state = loaded_state();
        let exactly_c = haversine_miles(0.0, 0.0, 1.0, 0.0);

        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(exactly_c)).unwrap();

        assert!(state.is_location_visible("C"));
    }

    #[test]
    fn unchanged_radius_preserves_manual_toggles() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();

        state
            .apply(StateEvent::CompanyToggled {
                location: "B".to_string(),
                visible: false,
            })
            .unwrap();

        // Same radius again, and a mode re-select: neither may recompute.
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();
        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();

        assert!(!state.is_location_visible("B"));
    }

    #[test]
    fn changed_radius_discards_manual_toggles() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();
        state
            .apply(StateEvent::CompanyToggled {
                location: "A".to_string(),
                visible: false,
            })
            .unwrap();

        // Radius change is authoritative: the overwrite wins.
        state.apply(StateEvent::RadiusRequested(100.0)).unwrap();

        assert!(state.is_location_visible("A"));
        assert!(state.is_location_visible("C"));
    }

    #[test]
    fn no_visible_project_skips_recompute() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ProjectToggled {
                name: "P".to_string(),
                visible: false,
            })
            .unwrap();
        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();

        // Nothing was overwritten and no radius was recorded as applied.
        assert!(state.is_location_visible("C"));
        assert!(state.last_applied_radius().is_none());
    }

    #[test]
    fn radius_outside_project_mode_never_recomputes() {
        let mut state = loaded_state();
        state.apply(StateEvent::RadiusRequested(5.0)).unwrap();

        assert!(state.is_location_visible("C"));
        assert!(state.last_applied_radius().is_none());
    }

    #[test]
    fn radius_is_clamped_to_bounds() {
        let mut state = loaded_state();
        state.apply(StateEvent::RadiusRequested(0.25)).unwrap();
        assert_eq!(state.radius_miles(), MIN_RADIUS_MI);
        state.apply(StateEvent::RadiusRequested(9000.0)).unwrap();
        assert_eq!(state.radius_miles(), MAX_RADIUS_MI);
    }

    #[test]
    fn global_toggle_follows_aggregate() {
        let mut state = loaded_state();

        // All visible -> all hidden.
        state.apply(StateEvent::GlobalToggled).unwrap();
        assert!(!state.is_location_visible("A"));
        assert!(!state.is_location_visible("C"));

        // Mixed -> all visible.
        state
            .apply(StateEvent::CompanyToggled {
                location: "A".to_string(),
                visible: true,
            })
            .unwrap();
        state.apply(StateEvent::GlobalToggled).unwrap();
        assert!(state.all_locations_visible());
    }

    #[test]
    fn group_toggle_only_touches_its_group() {
        let mut state = loaded_state();

        state
            .apply(StateEvent::GroupToggled {
                company: "Acme".to_string(),
            })
            .unwrap();

        assert!(!state.is_location_visible("A"));
        assert!(!state.is_location_visible("B"));
        assert!(state.is_location_visible("C"));

        // Mixed group -> everything back on.
        state
            .apply(StateEvent::CompanyToggled {
                location: "A".to_string(),
                visible: true,
            })
            .unwrap();
        state
            .apply(StateEvent::GroupToggled {
                company: "Acme".to_string(),
            })
            .unwrap();
        assert!(state.group_all_visible("Acme"));
    }

    #[test]
    fn unknown_targets_are_errors() {
        let mut state = loaded_state();

        assert_eq!(
            state.apply(StateEvent::CompanyToggled {
                location: "nowhere".to_string(),
                visible: false,
            }),
            Err(StateError::UnknownLocation("nowhere".to_string()))
        );
        assert_eq!(
            state.apply(StateEvent::ProjectRemoved {
                name: "ghost".to_string(),
            }),
            Err(StateError::UnknownProject("ghost".to_string()))
        );
        assert_eq!(
            state.apply(StateEvent::GroupToggled {
                company: "Nonesuch".to_string(),
            }),
            Err(StateError::UnknownGroup("Nonesuch".to_string()))
        );
    }

    #[test]
    fn manual_project_add_and_upsert() {
        let mut state = DashboardState::new();
        state
            .apply(StateEvent::ProjectAdded {
                name: "X".to_string(),
                latitude: 40.0,
                longitude: -75.0,
            })
            .unwrap();

        let project = state.projects().iter().find(|p| p.name == "X").unwrap();
        assert_eq!(project.latitude, 40.0);
        assert_eq!(project.longitude, -75.0);
        assert!(project.visible);

        // Re-adding the same name replaces coordinates and re-shows it.
        state
            .apply(StateEvent::ProjectToggled {
                name: "X".to_string(),
                visible: false,
            })
            .unwrap();
        state
            .apply(StateEvent::ProjectAdded {
                name: "X".to_string(),
                latitude: 41.0,
                longitude: -76.0,
            })
            .unwrap();
        assert_eq!(state.projects().len(), 1);
        let project = &state.projects()[0];
        assert_eq!(project.latitude, 41.0);
        assert!(project.visible);
    }

    #[test]
    fn manual_project_add_validates_inputs() {
        let mut state = DashboardState::new();

        assert_eq!(
            state.apply(StateEvent::ProjectAdded {
                name: "  ".to_string(),
                latitude: 40.0,
                longitude: -75.0,
            }),
            Err(StateError::EmptyProjectName)
        );
        assert_eq!(
            state.apply(StateEvent::ProjectAdded {
                name: "X".to_string(),
                latitude: 95.0,
                longitude: -75.0,
            }),
            Err(StateError::InvalidLatitude(95.0))
        );
        assert_eq!(
            state.apply(StateEvent::ProjectAdded {
                name: "X".to_string(),
                latitude: 40.0,
                longitude: -200.0,
            }),
            Err(StateError::InvalidLongitude(-200.0))
        );
        assert!(state.projects().is_empty());
    }

    #[test]
    fn reupload_preserves_flags_and_projects() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::CompanyToggled {
                location: "A".to_string(),
                visible: false,
            })
            .unwrap();
        state
            .apply(StateEvent::ProjectRemoved {
                name: "P".to_string(),
            })
            .unwrap();
        state
            .apply(StateEvent::ProjectAdded {
                name: "Q".to_string(),
                latitude: 10.0,
                longitude: 10.0,
            })
            .unwrap();

        let mut second = example_workbook();
        second.companies.push(record("Granite", "D", 2.0, 0.0));
        state.apply(StateEvent::WorkbookLoaded(second)).unwrap();

        // Known labels keep their flags, new labels default to visible,
        // and the managed (non-empty) project list is not re-seeded.
        assert!(!state.is_location_visible("A"));
        assert!(state.is_location_visible("D"));
        assert_eq!(state.known_locations(), ["A", "B", "C", "D"]);
        assert_eq!(state.projects().len(), 1);
        assert_eq!(state.projects()[0].name, "Q");
    }

    #[test]
    fn reupload_reseeds_when_projects_emptied() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ProjectRemoved {
                name: "P".to_string(),
            })
            .unwrap();

        state
            .apply(StateEvent::WorkbookLoaded(example_workbook()))
            .unwrap();

        assert_eq!(state.projects().len(), 1);
        assert_eq!(state.projects()[0].name, "P");
    }

    #[test]
    fn recompute_leaves_stale_labels_alone() {
        let mut state = loaded_state();

        // Replace the dataset with a subset; "C" becomes a stale label.
        let smaller = WorkbookData {
            companies: vec![record("Acme", "A", 0.0, 0.0)],
            projects: vec![],
        };
        state.apply(StateEvent::WorkbookLoaded(smaller)).unwrap();

        state
            .apply(StateEvent::ModeSelected(MapMode::WithinProjectRadius))
            .unwrap();
        state.apply(StateEvent::RadiusRequested(10.0)).unwrap();

        // Only current rows are rewritten; the stale flag keeps its value.
        assert!(state.is_location_visible("C"));
    }

    #[test]
    fn reference_is_first_visible_in_insertion_order() {
        let mut state = loaded_state();
        state
            .apply(StateEvent::ProjectAdded {
                name: "Q".to_string(),
                latitude: 5.0,
                longitude: 5.0,
            })
            .unwrap();

        assert_eq!(state.reference_project().unwrap().name, "P");

        state
            .apply(StateEvent::ProjectToggled {
                name: "P".to_string(),
                visible: false,
            })
            .unwrap();
        assert_eq!(state.reference_project().unwrap().name, "Q");
    }
}
