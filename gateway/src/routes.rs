//! Session API Routes
//!
//! One in-memory dashboard session behind the gateway:
//! - POST workbook upload (multipart xlsx)
//! - GET session snapshot / map overlay payload
//! - PUT mode, radius, and per-entity visibility
//! - POST bulk toggles and manual project management
//!
//! Every mutation returns the refreshed snapshot so the UI re-renders from
//! one response.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use map_overlay::{build_map_view, color_for, group_colors, MapView};
use radius_filter::{DashboardState, MapMode, StateError, StateEvent};
use site_workbook::load_workbook_bytes;

/// Shared session state
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<RwLock<DashboardState>>,
    pub session_id: Uuid,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            session: Arc::new(RwLock::new(DashboardState::new())),
            session_id: Uuid::new_v4(),
            started_at: Utc::now(),
        }
    }
}

// ========== Request/Response Types ==========

#[derive(Serialize)]
pub struct UploadResponse {
    pub companies: usize,
    pub known_locations: usize,
    pub projects: usize,
    pub loaded_at: Option<String>,
}

#[derive(Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub has_data: bool,
    pub mode: MapMode,
    pub radius_miles: f64,
    pub last_applied_radius: Option<f64>,
    pub reference_project: Option<String>,
    pub all_visible: bool,
    pub projects: Vec<ProjectView>,
    pub groups: Vec<GroupView>,
    pub loaded_at: Option<String>,
}

#[derive(Serialize)]
pub struct ProjectView {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visible: bool,
    pub is_reference: bool,
}

#[derive(Serialize)]
pub struct GroupView {
    pub company: String,
    pub color: String,
    pub all_visible: bool,
    pub locations: Vec<LocationView>,
}

#[derive(Serialize)]
pub struct LocationView {
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
    pub visible: bool,
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: MapMode,
}

#[derive(Deserialize)]
pub struct RadiusRequest {
    pub radius_miles: f64,
}

#[derive(Deserialize)]
pub struct AddProjectRequest {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Deserialize)]
pub struct VisibilityRequest {
    pub visible: bool,
}

// ========== Snapshot Building ==========

fn snapshot(app: &AppState, state: &DashboardState) -> SessionSnapshot {
    let colors = group_colors(state.companies());

    let reference = match state.mode() {
        MapMode::WithinProjectRadius => state.reference_project().map(|p| p.name.clone()),
        MapMode::AllCompanies => None,
    };

    let projects = state
        .projects()
        .iter()
        .map(|p| ProjectView {
            name: p.name.clone(),
            latitude: p.latitude,
            longitude: p.longitude,
            visible: p.visible,
            is_reference: reference.as_deref() == Some(p.name.as_str()),
        })
        .collect();

    // Groups in first-seen row order, one entry per company.
    let mut groups: Vec<GroupView> = Vec::new();
    for record in state.companies() {
        let location = LocationView {
            label: record.location.clone(),
            latitude: record.latitude,
            longitude: record.longitude,
            visible: state.is_location_visible(&record.location),
        };
        match groups.iter_mut().find(|g| g.company == record.company) {
            Some(group) => group.locations.push(location),
            None => groups.push(GroupView {
                company: record.company.clone(),
                color: color_for(&colors, &record.company).to_string(),
                all_visible: true,
                locations: vec![location],
            }),
        }
    }
    for group in &mut groups {
        group.all_visible = group.locations.iter().all(|l| l.visible);
    }

    SessionSnapshot {
        session_id: app.session_id,
        has_data: state.has_data(),
        mode: state.mode(),
        radius_miles: state.radius_miles(),
        last_applied_radius: state.last_applied_radius(),
        reference_project: reference,
        all_visible: state.all_locations_visible(),
        projects,
        groups,
        loaded_at: state.loaded_at().map(|t| t.to_rfc3339()),
    }
}

fn state_error_response(err: StateError) -> (StatusCode, String) {
    let status = match err {
        StateError::UnknownLocation(_)
        | StateError::UnknownProject(_)
        | StateError::UnknownGroup(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    };
    (status, err.to_string())
}

/// Apply one event and answer with the refreshed snapshot.
async fn apply_event(
    app: &AppState,
    event: StateEvent,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    let mut state = app.session.write().await;
    state.apply(event).map_err(state_error_response)?;
    Ok(Json(snapshot(app, &state)))
}

// ========== Route Handlers ==========

/// Upload the two-sheet workbook. A rejected file leaves the session as it
/// was; the error text carries the underlying cause for the UI banner.
pub async fn upload_workbook(
    State(app): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                format!("Error reading upload: {e}"),
            )
        })?
        .ok_or((
            StatusCode::UNPROCESSABLE_ENTITY,
            "No file in the upload".to_string(),
        ))?;

    let bytes = field.bytes().await.map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Error reading upload: {e}"),
        )
    })?;

    // Parse fully before touching session state.
    let data = load_workbook_bytes(&bytes).map_err(|e| {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            format!("Error loading file: {e}"),
        )
    })?;

    let mut state = app.session.write().await;
    state
        .apply(StateEvent::WorkbookLoaded(data))
        .map_err(state_error_response)?;

    Ok(Json(UploadResponse {
        companies: state.companies().len(),
        known_locations: state.known_locations().len(),
        projects: state.projects().len(),
        loaded_at: state.loaded_at().map(|t| t.to_rfc3339()),
    }))
}

pub async fn get_session(State(app): State<AppState>) -> Json<SessionSnapshot> {
    let state = app.session.read().await;
    Json(snapshot(&app, &state))
}

pub async fn set_mode(
    State(app): State<AppState>,
    Json(req): Json<ModeRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(&app, StateEvent::ModeSelected(req.mode)).await
}

pub async fn set_radius(
    State(app): State<AppState>,
    Json(req): Json<RadiusRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(&app, StateEvent::RadiusRequested(req.radius_miles)).await
}

pub async fn add_project(
    State(app): State<AppState>,
    Json(req): Json<AddProjectRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(
        &app,
        StateEvent::ProjectAdded {
            name: req.name,
            latitude: req.latitude,
            longitude: req.longitude,
        },
    )
    .await
}

pub async fn remove_project(
    State(app): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(&app, StateEvent::ProjectRemoved { name }).await
}

pub async fn set_project_visibility(
    State(app): State<AppState>,
    Path(name): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(
        &app,
        StateEvent::ProjectToggled {
            name,
            visible: req.visible,
        },
    )
    .await
}

pub async fn set_company_visibility(
    State(app): State<AppState>,
    Path(label): Path<String>,
    Json(req): Json<VisibilityRequest>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(
        &app,
        StateEvent::CompanyToggled {
            location: label,
            visible: req.visible,
        },
    )
    .await
}

pub async fn toggle_global(
    State(app): State<AppState>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(&app, StateEvent::GlobalToggled).await
}

pub async fn toggle_group(
    State(app): State<AppState>,
    Path(company): Path<String>,
) -> Result<Json<SessionSnapshot>, (StatusCode, String)> {
    apply_event(&app, StateEvent::GroupToggled { company }).await
}

/// The drawing payload. Refuses until a workbook has been loaded so the UI
/// can show its "upload to get started" banner instead of an empty map.
pub async fn get_map(
    State(app): State<AppState>,
) -> Result<Json<MapView>, (StatusCode, String)> {
    let state = app.session.read().await;
    if !state.has_data() {
        return Err((
            StatusCode::CONFLICT,
            "Upload a workbook with 'Companies' and 'Projects' sheets to get started".to_string(),
        ));
    }
    Ok(Json(build_map_view(&state)))
}

/// Health check for the session subsystem
pub async fn session_health(State(app): State<AppState>) -> Json<serde_json::Value> {
    let state = app.session.read().await;
    Json(serde_json::json!({
        "status": "healthy",
        "subsystem": "session",
        "session_id": app.session_id,
        "started_at": app.started_at.to_rfc3339(),
        "has_data": state.has_data(),
        "known_locations": state.known_locations().len(),
        "projects": state.projects().len()
    }))
}

// ========== Router ==========

pub fn session_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(session_health))
        .route("/workbook", post(upload_workbook))
        .route("/session", get(get_session))
        .route("/mode", put(set_mode))
        .route("/radius", put(set_radius))
        .route("/projects", post(add_project))
        .route("/projects/:name", delete(remove_project))
        .route("/projects/:name/visibility", put(set_project_visibility))
        .route("/companies/:label/visibility", put(set_company_visibility))
        .route("/toggles/global", post(toggle_global))
        .route("/toggles/groups/:company", post(toggle_group))
        .route("/map", get(get_map))
        .with_state(state)
}
