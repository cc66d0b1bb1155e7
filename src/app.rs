use crate::config::Config;
use crate::error::ChartError;
use crate::graph::{ChartData, extract_3d_series, extract_series, validate_axes};
use crate::login::{self, CurrentUser, Sessions};
use crate::mailer::Mailer;
use crate::store::{
    Chart, ChartKind, ChartUpdate, ExcelFile, NewChart, NewExcelFile, PublicUser, Store, StoreError, User,
};
use crate::summary::{SummaryOutcome, summarize};
use crate::workbook::{ParsedWorkbook, Workbook};
use axum::{
    Extension, Json, Router,
    extract::{DefaultBodyLimit, Multipart, Path, State, multipart::MultipartError},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

const UPLOAD_FIELD: &str = "excelFile";
const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";
const XLS_MIME: &str = "application/vnd.ms-excel";

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const RECENT_ITEMS: usize = 5;

lazy_static! {
    static ref EXCEL_NAME: Regex = Regex::new(r"(?i)\.(xlsx|xls)$").unwrap();
}

/// Everything the handlers share.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub sessions: Sessions,
    pub mailer: Option<Mailer>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    /// Opens the record store and prepares the upload directory.
    ///
    /// # Errors
    /// * If either directory cannot be created, a table cannot be read,
    ///   or the mail relay settings are unusable
    pub fn new(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        std::fs::create_dir_all(&config.upload_dir)?;
        let store = Store::open(&config.database_dir)?;
        let mailer = match &config.smtp {
            Some(smtp) => Some(Mailer::new(smtp)?),
            None => {
                log::warn!("SMTP is not configured; password reset tokens will be logged");
                None
            }
        };

        Ok(AppState {
            sessions: Sessions::new(config.session_ttl),
            config,
            store,
            mailer,
        })
    }
}

/// Error returned by every API handler, rendered as `{"error": message}`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PayloadTooLarge(String),

    #[error(transparent)]
    Chart(#[from] ChartError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) | ApiError::Store(StoreError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Chart(ChartError::SheetNotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Chart(_) => StatusCode::BAD_REQUEST,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            log::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn access_denied() -> ApiError {
    ApiError::Forbidden("Access denied".to_string())
}

/// Owners see their own records, admins see everything.
fn ensure_access(user: &User, owner_id: u64) -> Result<(), ApiError> {
    if user.id == owner_id || user.is_admin() {
        Ok(())
    } else {
        Err(access_denied())
    }
}

/// Runs blocking workbook work off the async executor.
async fn blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {}", e)))?
}

fn owned_file(state: &AppState, user: &User, file_id: u64) -> Result<ExcelFile, ApiError> {
    let file = state
        .store
        .get_file(file_id)
        .ok_or_else(|| ApiError::NotFound("File not found".to_string()))?;
    ensure_access(user, file.user_id)?;
    Ok(file)
}

fn owned_chart(state: &AppState, user: &User, chart_id: u64) -> Result<Chart, ApiError> {
    let chart = state
        .store
        .get_chart(chart_id)
        .ok_or_else(|| ApiError::NotFound("Chart not found".to_string()))?;
    ensure_access(user, chart.user_id)?;
    Ok(chart)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn api_not_found() -> ApiError {
    ApiError::NotFound("API endpoint not found".to_string())
}

// Uploads

/// Whether an upload looks like a workbook, by file name or declared type.
pub fn is_excel_upload(file_name: &str, content_type: Option<&str>) -> bool {
    EXCEL_NAME.is_match(file_name) || matches!(content_type, Some(XLSX_MIME) | Some(XLS_MIME))
}

fn upload_extension(file_name: &str, content_type: Option<&str>) -> &'static str {
    match EXCEL_NAME.captures(file_name) {
        Some(caps) if caps[1].eq_ignore_ascii_case("xls") => "xls",
        Some(_) => "xlsx",
        None if content_type == Some(XLS_MIME) => "xls",
        None => "xlsx",
    }
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge("File too large".to_string())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadSummary {
    total_sheets: usize,
    total_rows: usize,
    sheet_names: Vec<String>,
}

#[derive(Serialize)]
struct UploadResponse {
    file: ExcelFile,
    sheets: IndexMap<String, crate::workbook::SheetData>,
    summary: UploadSummary,
}

/// Handle a workbook upload
///
/// Stores the `excelFile` part under a fresh name in the upload directory,
/// parses it and records it for the current user. The stored copy is
/// removed again when parsing fails.
///
/// # Errors
/// * 400 if no file was sent, it is not a workbook, or it cannot be parsed
/// * 413 if it is larger than the configured limit
async fn upload_file(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        upload = Some((original_name, content_type, bytes));
    }

    let (original_name, content_type, bytes) =
        upload.ok_or_else(|| ApiError::BadRequest("No file uploaded".to_string()))?;

    if !is_excel_upload(&original_name, content_type.as_deref()) {
        return Err(ApiError::BadRequest(
            "Only Excel files (.xlsx, .xls) are allowed".to_string(),
        ));
    }
    let max = state.config.max_upload_bytes;
    if bytes.len() > max {
        return Err(ApiError::PayloadTooLarge(format!(
            "File too large. Maximum size is {} bytes",
            max
        )));
    }

    let filename = format!(
        "{}.{}",
        Uuid::new_v4(),
        upload_extension(&original_name, content_type.as_deref())
    );
    let path = state.config.upload_dir.join(&filename);
    tokio::fs::write(&path, &bytes)
        .await
        .map_err(|e| ApiError::Internal(format!("failed to store upload: {}", e)))?;

    let parse_path = path.clone();
    let parsed: ParsedWorkbook =
        match blocking(move || Ok(Workbook::open(&parse_path)?.parse())).await {
            Ok(parsed) => parsed,
            Err(e) => {
                discard_upload(&path).await;
                return Err(e);
            }
        };

    let record = state.store.create_file(NewExcelFile {
        user_id: user.id,
        filename,
        original_name,
        file_path: path.to_string_lossy().into_owned(),
        file_size: bytes.len() as u64,
        sheets: parsed.sheet_names.clone(),
        columns: parsed.columns.clone(),
        row_count: parsed.total_row_count,
    });
    let file = match record {
        Ok(file) => file,
        Err(e) => {
            discard_upload(&path).await;
            return Err(e.into());
        }
    };
    log::info!(
        "user {} uploaded {} ({} sheets, {} rows)",
        user.id,
        file.original_name,
        parsed.sheet_names.len(),
        parsed.total_row_count
    );

    Ok(Json(UploadResponse {
        file,
        summary: UploadSummary {
            total_sheets: parsed.sheet_names.len(),
            total_rows: parsed.total_row_count,
            sheet_names: parsed.sheet_names,
        },
        sheets: parsed.sheets,
    }))
}

async fn discard_upload(path: &std::path::Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("failed to remove {}: {}", path.display(), e);
    }
}

// Files

async fn list_files(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<Vec<ExcelFile>> {
    Json(state.store.user_files(user.id))
}

#[derive(Serialize)]
struct FileDetails {
    file: ExcelFile,
    sheets: IndexMap<String, crate::workbook::SheetData>,
    analysis: IndexMap<String, SummaryOutcome>,
}

/// Re-reads a stored workbook and summarizes each of its sheets.
async fn get_file_details(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(file_id): Path<u64>,
) -> Result<Json<FileDetails>, ApiError> {
    let file = owned_file(&state, &user, file_id)?;
    let path = PathBuf::from(&file.file_path);

    let (sheets, analysis) = blocking(move || {
        let workbook = Workbook::open(&path)?;
        let analysis: IndexMap<String, SummaryOutcome> = workbook
            .sheets()
            .iter()
            .map(|sheet| (sheet.name().to_string(), summarize(sheet)))
            .collect();
        Ok((workbook.parse().sheets, analysis))
    })
    .await?;

    Ok(Json(FileDetails {
        file,
        sheets,
        analysis,
    }))
}

async fn delete_file(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(file_id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    owned_file(&state, &user, file_id)?;
    let file = state.store.delete_file(file_id)?;
    discard_upload(std::path::Path::new(&file.file_path)).await;
    log::info!("user {} deleted file {}", user.id, file_id);
    Ok(Json(json!({ "message": "File deleted successfully" })))
}

// Charts

/// Body of a chart create or preview request.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub file_id: u64,
    #[serde(default)]
    pub title: String,
    pub chart_type: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    pub sheet_name: String,
    #[serde(default, rename = "is3D")]
    pub is_3d: bool,
    #[serde(default)]
    pub z_axis: Option<String>,

    /// Data rows to read; the configured row limit when absent
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChartRequest {
    pub title: Option<String>,
    pub chart_options: Option<Value>,
}

/// Options stored with a new chart.
pub fn default_chart_options(title: &str) -> Value {
    json!({
        "responsive": true,
        "plugins": {
            "title": { "display": true, "text": title },
            "legend": { "display": true }
        }
    })
}

/// Reads the series a chart request asks for from a stored workbook.
fn chart_payload(path: PathBuf, request: &ChartRequest, limit: usize) -> Result<ChartData, ChartError> {
    let workbook = Workbook::open(&path)?;
    let sheet = workbook.sheet(&request.sheet_name)?;
    let sheet_data = (sheet.total_rows() > 0).then(|| sheet.to_sheet_data());
    validate_axes(sheet_data.as_ref(), &request.x_axis, &request.y_axis)?;

    if request.is_3d {
        let z_axis = request.z_axis.as_deref().filter(|z| !z.is_empty());
        let points = extract_3d_series(sheet, &request.x_axis, &request.y_axis, z_axis, Some(limit))?;
        Ok(ChartData::Spatial(points))
    } else {
        let data = extract_series(sheet, &request.x_axis, &request.y_axis, Some(limit))?;
        Ok(ChartData::Flat(data))
    }
}

async fn build_chart(state: &SharedState, user: &User, request: ChartRequest) -> Result<NewChart, ApiError> {
    let file = owned_file(state, user, request.file_id)?;
    if request.is_3d && !request.chart_type.supports_3d() {
        return Err(ApiError::BadRequest(format!(
            "3D charts are only available for bar and scatter charts, not {}",
            request.chart_type.as_str()
        )));
    }

    let limit = request.limit.unwrap_or(state.config.row_limit);
    let path = PathBuf::from(&file.file_path);
    let job = request.clone();
    let chart_data = blocking(move || Ok(chart_payload(path, &job, limit)?)).await?;

    let z_axis = if request.is_3d {
        request.z_axis.filter(|z| !z.is_empty())
    } else {
        None
    };

    Ok(NewChart {
        user_id: user.id,
        file_id: file.id,
        chart_options: default_chart_options(&request.title),
        title: request.title,
        chart_type: request.chart_type,
        x_axis: request.x_axis,
        y_axis: request.y_axis,
        z_axis,
        sheet_name: request.sheet_name,
        chart_data,
        is_3d: request.is_3d,
    })
}

/// Handle chart creation
///
/// # Errors
/// * 400 if the title is empty, an axis is unknown, or 3D is asked of a
///   chart type without 3D support
/// * 403 if the file belongs to someone else
/// * 404 if the file or sheet does not exist
async fn create_chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(request): Json<ChartRequest>,
) -> Result<(StatusCode, Json<Chart>), ApiError> {
    if request.title.trim().is_empty() {
        return Err(ApiError::BadRequest("Chart title is required".to_string()));
    }
    let new_chart = build_chart(&state, &user, request).await?;
    let chart = state.store.create_chart(new_chart)?;
    log::info!("user {} created chart {} ({})", user.id, chart.id, chart.chart_type.as_str());
    Ok((StatusCode::CREATED, Json(chart)))
}

/// Same as [`create_chart`] but nothing is stored.
async fn preview_chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(mut request): Json<ChartRequest>,
) -> Result<Json<NewChart>, ApiError> {
    if request.title.trim().is_empty() {
        request.title = "Preview".to_string();
    }
    Ok(Json(build_chart(&state, &user, request).await?))
}

async fn list_charts(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<Vec<Chart>> {
    Json(state.store.user_charts(user.id))
}

async fn get_chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(chart_id): Path<u64>,
) -> Result<Json<Chart>, ApiError> {
    Ok(Json(owned_chart(&state, &user, chart_id)?))
}

async fn update_chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(chart_id): Path<u64>,
    Json(request): Json<UpdateChartRequest>,
) -> Result<Json<Chart>, ApiError> {
    owned_chart(&state, &user, chart_id)?;
    let chart = state.store.update_chart(
        chart_id,
        ChartUpdate {
            title: request.title,
            chart_options: request.chart_options,
        },
    )?;
    Ok(Json(chart))
}

async fn delete_chart(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(chart_id): Path<u64>,
) -> Result<Json<Value>, ApiError> {
    owned_chart(&state, &user, chart_id)?;
    state.store.delete_chart(chart_id)?;
    Ok(Json(json!({ "message": "Chart deleted successfully" })))
}

// Admin

async fn admin_users(State(state): State<SharedState>) -> Json<Vec<PublicUser>> {
    Json(state.store.all_users().iter().map(PublicUser::from).collect())
}

async fn admin_files(State(state): State<SharedState>) -> Json<Vec<ExcelFile>> {
    Json(state.store.all_files())
}

async fn admin_charts(State(state): State<SharedState>) -> Json<Vec<Chart>> {
    Json(state.store.all_charts())
}

/// Deactivates an account and ends its sessions.
async fn deactivate_user(
    State(state): State<SharedState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(user_id): Path<u64>,
) -> Result<Json<PublicUser>, ApiError> {
    if state.store.get_user(user_id).is_none() {
        return Err(ApiError::NotFound("User not found".to_string()));
    }
    let user = state.store.deactivate_user(user_id)?;
    state.sessions.remove_user(user_id);
    log::info!("admin {} deactivated user {}", admin.id, user_id);
    Ok(Json(PublicUser::from(&user)))
}

// Dashboard

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminStats {
    pub total_users: usize,
    pub active_users: usize,
    pub total_system_files: usize,
    pub total_system_charts: usize,
    pub total_system_rows: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_files: usize,
    pub total_charts: usize,
    pub total_rows: usize,
    pub recent_files: Vec<ExcelFile>,
    pub recent_charts: Vec<Chart>,
    pub chart_types: IndexMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin_stats: Option<AdminStats>,
}

/// Counts over the user's records; admins also get system-wide totals.
pub fn dashboard_for(store: &Store, user: &User) -> DashboardStats {
    let files = store.user_files(user.id);
    let charts = store.user_charts(user.id);

    let mut chart_types = IndexMap::new();
    for chart in &charts {
        *chart_types.entry(chart.chart_type.as_str()).or_insert(0) += 1;
    }

    let admin_stats = user.is_admin().then(|| {
        let users = store.all_users();
        let all_files = store.all_files();
        AdminStats {
            total_users: users.len(),
            active_users: users.iter().filter(|u| u.is_active).count(),
            total_system_files: all_files.len(),
            total_system_charts: store.all_charts().len(),
            total_system_rows: all_files.iter().map(|f| f.row_count).sum(),
        }
    });

    DashboardStats {
        total_files: files.len(),
        total_charts: charts.len(),
        total_rows: files.iter().map(|f| f.row_count).sum(),
        recent_files: files.into_iter().take(RECENT_ITEMS).collect(),
        recent_charts: charts.into_iter().take(RECENT_ITEMS).collect(),
        chart_types,
        admin_stats,
    }
}

async fn dashboard_stats(
    State(state): State<SharedState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> Json<DashboardStats> {
    Json(dashboard_for(&state.store, &user))
}

/// Builds the full API router.
pub fn router(state: SharedState) -> Router {
    let auth = middleware::from_fn_with_state(state.clone(), login::require_auth);
    let admin = middleware::from_fn_with_state(state.clone(), login::require_admin);

    let public = Router::new()
        .route("/health", get(health))
        .route("/api/register", post(login::handle_register))
        .route("/api/login", post(login::handle_login))
        .route("/api/logout", post(login::handle_logout))
        .route("/api/forgot-password", post(login::handle_forgot_password))
        .route("/api/reset-password", post(login::handle_reset_password));

    let uploads = Router::new()
        .route("/api/upload", post(upload_file))
        .route_layer(auth.clone())
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(
            state.config.max_upload_bytes + MULTIPART_OVERHEAD,
        ));

    let protected = Router::new()
        .route("/api/user", get(login::current_user))
        .route("/api/files", get(list_files))
        .route("/api/files/:id", get(get_file_details).delete(delete_file))
        .route("/api/charts", get(list_charts).post(create_chart))
        .route("/api/charts/preview", post(preview_chart))
        .route(
            "/api/charts/:id",
            get(get_chart).put(update_chart).delete(delete_chart),
        )
        .route("/api/dashboard/stats", get(dashboard_stats))
        .route_layer(auth);

    let admin_routes = Router::new()
        .route("/api/admin/users", get(admin_users))
        .route("/api/admin/files", get(admin_files))
        .route("/api/admin/charts", get(admin_charts))
        .route("/api/admin/users/:id/deactivate", put(deactivate_user))
        .route_layer(admin);

    public
        .merge(uploads)
        .merge(protected)
        .merge(admin_routes)
        .fallback(api_not_found)
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Serves the API until the process is stopped.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState::new(config)?);
    let app = router(state);

    let listener = TcpListener::bind(&bind_addr).await?;
    log::info!("Listening on http://{}", bind_addr);
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{NewUser, Role};
    use chrono::Utc;
    use tempfile::tempdir;

    #[test]
    fn upload_names_and_types() {
        assert!(is_excel_upload("Report.XLSX", None));
        assert!(is_excel_upload("legacy.xls", None));
        assert!(is_excel_upload("blob", Some(XLSX_MIME)));
        assert!(!is_excel_upload("notes.csv", Some("text/csv")));
        assert!(!is_excel_upload("sheet.xlsx.exe", None));

        assert_eq!(upload_extension("a.XLS", None), "xls");
        assert_eq!(upload_extension("a.xlsx", Some(XLS_MIME)), "xlsx");
        assert_eq!(upload_extension("blob", Some(XLS_MIME)), "xls");
        assert_eq!(upload_extension("blob", Some(XLSX_MIME)), "xlsx");
    }

    #[test]
    fn error_statuses() {
        assert_eq!(ApiError::Unauthorized(String::new()).status(), StatusCode::UNAUTHORIZED);
        assert_eq!(access_denied().status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ApiError::from(ChartError::SheetNotFound("S".into())).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(ChartError::ColumnNotFound("X".into())).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ApiError::from(StoreError::NotFound("chart 1".into())).status(),
            StatusCode::NOT_FOUND
        );
        let conflict = ApiError::from(StoreError::Conflict("Username already exists".into()));
        assert_eq!(conflict.status(), StatusCode::BAD_REQUEST);
        assert_eq!(conflict.to_string(), "Username already exists");
        assert_eq!(
            ApiError::PayloadTooLarge(String::new()).status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }

    #[test]
    fn default_options_carry_the_title() {
        let options = default_chart_options("Sales");
        assert_eq!(options["plugins"]["title"]["text"], "Sales");
        assert_eq!(options["responsive"], true);
        assert_eq!(options["plugins"]["legend"]["display"], true);
    }

    fn user(store: &Store, name: &str, role: Role) -> User {
        store
            .create_user(NewUser {
                username: name.to_string(),
                email: format!("{}@example.com", name),
                password_hash: "x".to_string(),
                full_name: String::new(),
                role,
            })
            .unwrap()
    }

    fn file(store: &Store, owner: &User, rows: usize) -> ExcelFile {
        store
            .create_file(NewExcelFile {
                user_id: owner.id,
                filename: "f.xlsx".to_string(),
                original_name: "f.xlsx".to_string(),
                file_path: "uploads/f.xlsx".to_string(),
                file_size: 1,
                sheets: vec!["S".to_string()],
                columns: IndexMap::new(),
                row_count: rows,
            })
            .unwrap()
    }

    fn chart(store: &Store, owner: &User, file: &ExcelFile, kind: ChartKind) -> Chart {
        store
            .create_chart(NewChart {
                user_id: owner.id,
                file_id: file.id,
                title: "c".to_string(),
                chart_type: kind,
                x_axis: "x".to_string(),
                y_axis: "y".to_string(),
                z_axis: None,
                sheet_name: "S".to_string(),
                chart_data: ChartData::Spatial(Vec::new()),
                chart_options: default_chart_options("c"),
                is_3d: false,
            })
            .unwrap()
    }

    #[test]
    fn dashboard_counts() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let ann = user(&store, "ann", Role::User);
        let root = user(&store, "root", Role::Admin);

        let f1 = file(&store, &ann, 10);
        file(&store, &ann, 5);
        file(&store, &root, 100);
        chart(&store, &ann, &f1, ChartKind::Bar);
        chart(&store, &ann, &f1, ChartKind::Bar);
        chart(&store, &ann, &f1, ChartKind::Pie);
        store.deactivate_user(root.id).unwrap();

        let stats = dashboard_for(&store, &ann);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_charts, 3);
        assert_eq!(stats.total_rows, 15);
        assert_eq!(stats.chart_types.get("bar"), Some(&2));
        assert_eq!(stats.chart_types.get("pie"), Some(&1));
        assert!(stats.admin_stats.is_none());

        let admin = dashboard_for(&store, &root).admin_stats.unwrap();
        assert_eq!(admin.total_users, 2);
        assert_eq!(admin.active_users, 1);
        assert_eq!(admin.total_system_files, 3);
        assert_eq!(admin.total_system_charts, 3);
        assert_eq!(admin.total_system_rows, 115);
    }

    #[test]
    fn recent_lists_are_capped() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let ann = user(&store, "ann", Role::User);
        for _ in 0..7 {
            file(&store, &ann, 1);
        }
        let stats = dashboard_for(&store, &ann);
        assert_eq!(stats.total_files, 7);
        assert_eq!(stats.recent_files.len(), RECENT_ITEMS);
        assert!(stats.recent_files[0].uploaded_at <= Utc::now());
    }

    #[test]
    fn access_is_owner_or_admin() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let ann = user(&store, "ann", Role::User);
        let bob = user(&store, "bob", Role::User);
        let root = user(&store, "root", Role::Admin);

        assert!(ensure_access(&ann, ann.id).is_ok());
        assert!(ensure_access(&root, ann.id).is_ok());
        assert_eq!(ensure_access(&bob, ann.id).unwrap_err().status(), StatusCode::FORBIDDEN);
    }
}
