#![cfg(feature = "web")]

use axum::{
    Json, Router,
    extract::{Multipart, Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use log::{error, info, warn};
use serde::Deserialize;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::aggregate;
use crate::auth::EmployeeRoster;
use crate::billing::{self, PreviewError};
use crate::charts;
use crate::config::ServerConfig;
use crate::ingest::{self, IngestError};
use crate::report::{self, REPORT_FILENAME, XLSX_CONTENT_TYPE};
use crate::store::{DataStore, NewReading, StoreError};
use crate::value::Record;

pub struct AppState {
    store: Mutex<DataStore>,
    roster: EmployeeRoster,
}

impl AppState {
    pub fn new(store: DataStore, roster: EmployeeRoster) -> Self {
        AppState {
            store: Mutex::new(store),
            roster,
        }
    }

    /// Locks the store, recovering the guard if a handler panicked holding it
    fn store(&self) -> MutexGuard<'_, DataStore> {
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Deserialize)]
struct PreviewRequest {
    project_name: String,
    current_export: f64,
    current_import: f64,
}

#[derive(Deserialize)]
struct UpdateRowRequest {
    project_name: String,
    month_date: String,
    updated_data: Record,
}

/// A failed request, rendered as `{"error": ...}`
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError {
            status,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            error!("{}", self.message);
        } else {
            warn!("{}", self.message);
        }
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::UnknownProject(_) | StoreError::UnknownRow { .. } => StatusCode::NOT_FOUND,
            StoreError::MissingColumn(_) => StatusCode::BAD_REQUEST,
            StoreError::Preview(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StoreError::Io(_) | StoreError::Format(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::new(status, e.to_string())
    }
}

impl From<IngestError> for ApiError {
    fn from(e: IngestError) -> Self {
        ApiError::new(StatusCode::BAD_REQUEST, e.to_string())
    }
}

impl From<PreviewError> for ApiError {
    fn from(e: PreviewError) -> Self {
        ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    }
}

/// Every route of the service, with permissive CORS
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/projects", get(get_projects))
        .route("/columns", get(get_columns))
        .route("/stats", get(get_stats))
        .route("/summary", get(get_summary))
        .route("/history/:name", get(get_history))
        .route("/preview-reading", post(preview_reading))
        .route("/add-reading", post(add_reading))
        .route("/update-row", put(update_row))
        .route("/generate-report", post(generate_report))
        .route("/verify-employee/:id", get(verify_employee))
        .route("/upload-master", post(upload_master))
        .route("/append-data", post(append_data))
        .route("/charts/generation.png", get(generation_chart))
        .route("/charts/categories.png", get(category_chart))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = DataStore::open(&config.data)?;
    let roster = match EmployeeRoster::load(&config.roster) {
        Ok(roster) => {
            info!("{} employees on the roster", roster.len());
            roster
        }
        Err(e) => {
            warn!("{}; every employee check will be refused", e);
            EmployeeRoster::default()
        }
    };

    let app = router(Arc::new(AppState::new(store, roster)));

    let listener = TcpListener::bind(config.bind).await?;
    info!("Listening on http://{}", config.bind);
    match local_ip_address::local_ip() {
        Ok(ip) => info!("On the office network: http://{}:{}", ip, config.bind.port()),
        Err(e) => warn!("could not determine LAN address: {}", e),
    }
    axum::serve(listener, app).await?;

    Ok(())
}

async fn get_projects(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let store = state.store();
    Json(json!({ "data": store.projects() }))
}

async fn get_columns(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let columns = state.store().columns();
    Json(json!({ "columns": columns }))
}

async fn get_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.store().stats();
    Json(stats)
}

async fn get_summary(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let summary = aggregate::aggregate(state.store().projects());
    Json(summary)
}

async fn get_history(
    Path(name): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store();
    let sheet = store
        .history(&name)
        .ok_or_else(|| StoreError::UnknownProject(name.clone()))?;
    Ok(Json(json!({ "data": sheet.rows, "headers": sheet.headers })))
}

async fn preview_reading(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<PreviewRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state.store();
    let sheet = store
        .history(&payload.project_name)
        .ok_or_else(|| StoreError::UnknownProject(payload.project_name.clone()))?;
    let breakdown = billing::preview(
        &sheet.rows,
        &sheet.headers,
        payload.current_export,
        payload.current_import,
    )?;
    Ok(Json(breakdown))
}

/// Run store writes and workbook parsing off the async workers
async fn blocking<T, F>(job: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?
}

async fn add_reading(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewReading>,
) -> Result<impl IntoResponse, ApiError> {
    let row = blocking(move || {
        let row = state.store().add_reading(payload)?;
        Ok(row)
    })
    .await?;
    Ok(Json(row))
}

async fn update_row(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<UpdateRowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        state.store().update_row(
            &payload.project_name,
            &payload.month_date,
            &payload.updated_data,
        )?;
        Ok(())
    })
    .await?;
    Ok(Json(json!({ "status": "Row updated" })))
}

async fn generate_report(
    State(state): State<Arc<AppState>>,
    Json(selected): Json<Vec<String>>,
) -> Result<Response, ApiError> {
    let sheet = state.store().report_sheet(&selected);
    let bytes = report::to_xlsx(&sheet)
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    info!(
        "report generated: {} columns, {} rows",
        sheet.headers.len(),
        sheet.rows.len()
    );
    let disposition = format!("attachment; filename=\"{}\"", REPORT_FILENAME);
    Ok((
        [
            (header::CONTENT_TYPE, XLSX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

async fn verify_employee(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    Json(state.roster.verify(&id))
}

/// Bytes of the multipart field named `file`
async fn read_upload(mut multipart: Multipart) -> Result<Vec<u8>, ApiError> {
    let mut file_data = Vec::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
    {
        if field.name() == Some("file") {
            file_data = field
                .bytes()
                .await
                .map_err(|e| ApiError::new(StatusCode::BAD_REQUEST, e.to_string()))?
                .to_vec();
        }
    }
    if file_data.is_empty() {
        return Err(ApiError::new(
            StatusCode::BAD_REQUEST,
            "No file data received",
        ));
    }
    Ok(file_data)
}

async fn upload_master(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_upload(multipart).await?;
    let rows = blocking(move || {
        let sheet = ingest::read_master(&bytes)?;
        let rows = sheet.rows.len();
        state.store().replace_master(sheet)?;
        Ok(rows)
    })
    .await?;
    Ok(Json(json!({ "status": "Master data replaced", "rows": rows })))
}

async fn append_data(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_upload(multipart).await?;
    blocking(move || {
        let sheet = ingest::read_monthly(&bytes)?;
        state.store().append_monthly(sheet)?;
        Ok(())
    })
    .await?;
    Ok(Json(json!({ "status": "Monthly data updated" })))
}

fn png(result: Result<Vec<u8>, Box<dyn std::error::Error>>) -> Result<Response, ApiError> {
    let bytes =
        result.map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes).into_response())
}

async fn generation_chart(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let summary = aggregate::aggregate(state.store().projects());
    png(charts::render_monthly_generation(&summary.monthly))
}

async fn category_chart(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let summary = aggregate::aggregate(state.store().projects());
    png(charts::render_category_capacity(&summary.categories))
}
