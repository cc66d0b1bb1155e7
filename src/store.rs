use crate::graph::ChartData;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use thiserror::Error;

const USERS_FILE: &str = "users.json";
const FILES_FILE: &str = "files.json";
const CHARTS_FILE: &str = "charts.json";
const RESETS_FILE: &str = "password_resets.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database file is corrupt: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// A registered account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub username: String,
    pub email: String,

    /// Argon2 hash; never leaves the server, see [`PublicUser`]
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A user as shown to clients, without the password hash.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        PublicUser {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            full_name: user.full_name.clone(),
            role: user.role,
            is_active: user.is_active,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub role: Role,
}

/// An uploaded workbook.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExcelFile {
    pub id: u64,
    pub user_id: u64,

    /// Name of the stored copy inside the upload directory
    pub filename: String,

    /// Name the file had on the uploader's machine
    pub original_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub sheets: Vec<String>,
    pub columns: IndexMap<String, Vec<String>>,
    pub row_count: usize,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub struct NewExcelFile {
    pub user_id: u64,
    pub filename: String,
    pub original_name: String,
    pub file_path: String,
    pub file_size: u64,
    pub sheets: Vec<String>,
    pub columns: IndexMap<String, Vec<String>>,
    pub row_count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    Bar,
    Line,
    Pie,
    Scatter,
    Doughnut,
}

impl ChartKind {
    /// Bar and scatter charts have a 3D rendition.
    pub fn supports_3d(self) -> bool {
        matches!(self, ChartKind::Bar | ChartKind::Scatter)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ChartKind::Bar => "bar",
            ChartKind::Line => "line",
            ChartKind::Pie => "pie",
            ChartKind::Scatter => "scatter",
            ChartKind::Doughnut => "doughnut",
        }
    }
}

/// Chart definition owned by a user and derived from one of their files.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub id: u64,
    pub user_id: u64,
    pub file_id: u64,
    pub title: String,
    pub chart_type: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub z_axis: Option<String>,
    pub sheet_name: String,
    pub chart_data: ChartData,
    pub chart_options: serde_json::Value,
    #[serde(rename = "is3D")]
    pub is_3d: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything needed to build a chart record; also what a preview returns.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChart {
    pub user_id: u64,
    pub file_id: u64,
    pub title: String,
    pub chart_type: ChartKind,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_axis: Option<String>,
    pub sheet_name: String,
    pub chart_data: ChartData,
    pub chart_options: serde_json::Value,
    #[serde(rename = "is3D")]
    pub is_3d: bool,
}

/// Fields a chart owner may change after creation.
#[derive(Clone, Debug, Default)]
pub struct ChartUpdate {
    pub title: Option<String>,
    pub chart_options: Option<serde_json::Value>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordReset {
    pub id: u64,
    pub user_id: u64,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

struct Tables {
    users: Vec<User>,
    files: Vec<ExcelFile>,
    charts: Vec<Chart>,
    resets: Vec<PasswordReset>,
}

/// File-backed record store.
///
/// Every table lives in memory and is written back to its own JSON file in
/// the database directory after each change. Writes go through a temporary
/// file that is renamed over the old one, so a crash never leaves a
/// half-written table behind.
pub struct Store {
    dir: PathBuf,
    tables: RwLock<Tables>,
}

fn next_id<T>(rows: &[T], id: impl Fn(&T) -> u64) -> u64 {
    rows.iter().map(id).max().unwrap_or(0) + 1
}

fn newest_first<T>(
    rows: impl Iterator<Item = T>,
    key: impl Fn(&T) -> (DateTime<Utc>, u64),
) -> Vec<T> {
    let mut rows: Vec<T> = rows.collect();
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

fn load_table<T: DeserializeOwned>(path: &Path) -> StoreResult<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let data = fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(&data)?)
}

impl Store {
    /// Opens the store in `dir`, creating the directory when missing.
    ///
    /// # Errors
    /// * `StoreError::Io` if the directory cannot be created or read
    /// * `StoreError::Json` if an existing table file does not parse
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        create_dir_all(&dir)?;

        let tables = Tables {
            users: load_table(&dir.join(USERS_FILE))?,
            files: load_table(&dir.join(FILES_FILE))?,
            charts: load_table(&dir.join(CHARTS_FILE))?,
            resets: load_table(&dir.join(RESETS_FILE))?,
        };
        log::info!(
            "opened database {} ({} users, {} files, {} charts)",
            dir.display(),
            tables.users.len(),
            tables.files.len(),
            tables.charts.len()
        );

        Ok(Store {
            dir,
            tables: RwLock::new(tables),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().unwrap_or_else(|e| e.into_inner())
    }

    fn save<T: Serialize>(&self, name: &str, rows: &[T]) -> StoreResult<()> {
        let json = serde_json::to_string_pretty(rows)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(self.dir.join(name)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Applies `change` to a copy of `table`, writes the copy to `name` and
    /// only then installs it in memory.
    ///
    /// # Errors
    /// * Whatever `change` returns, or the error from [`Store::save`]. In both
    ///   cases `table` is left exactly as it was.
    fn commit<T, R>(
        &self,
        name: &str,
        table: &mut Vec<T>,
        change: impl FnOnce(&mut Vec<T>) -> StoreResult<R>,
    ) -> StoreResult<R>
    where
        T: Serialize + Clone,
    {
        let mut next = table.clone();
        let out = change(&mut next)?;
        self.save(name, &next)?;
        *table = next;
        Ok(out)
    }

    // Users

    pub fn get_user(&self, id: u64) -> Option<User> {
        self.read().users.iter().find(|u| u.id == id).cloned()
    }

    pub fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.read().users.iter().find(|u| u.username == username).cloned()
    }

    pub fn get_user_by_email(&self, email: &str) -> Option<User> {
        self.read().users.iter().find(|u| u.email == email).cloned()
    }

    /// Adds an account.
    ///
    /// # Errors
    /// * `StoreError::Conflict` if the username or the email is taken
    /// * `StoreError::Io` / `StoreError::Json` if the table cannot be written
    pub fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let mut tables = self.write();
        self.commit(USERS_FILE, &mut tables.users, |users| {
            if users.iter().any(|u| u.username == new.username) {
                return Err(StoreError::Conflict("Username already exists".into()));
            }
            if users.iter().any(|u| u.email == new.email) {
                return Err(StoreError::Conflict("Email already exists".into()));
            }
            let now = Utc::now();
            let user = User {
                id: next_id(users, |u| u.id),
                username: new.username,
                email: new.email,
                password_hash: new.password_hash,
                full_name: new.full_name,
                role: new.role,
                is_active: true,
                created_at: now,
                updated_at: now,
            };
            users.push(user.clone());
            Ok(user)
        })
    }

    pub fn update_password(&self, id: u64, password_hash: String) -> StoreResult<User> {
        self.update_user(id, |user| user.password_hash = password_hash)
    }

    pub fn deactivate_user(&self, id: u64) -> StoreResult<User> {
        self.update_user(id, |user| user.is_active = false)
    }

    fn update_user(&self, id: u64, change: impl FnOnce(&mut User)) -> StoreResult<User> {
        let mut tables = self.write();
        self.commit(USERS_FILE, &mut tables.users, |users| {
            let user = users
                .iter_mut()
                .find(|u| u.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("user {}", id)))?;
            change(user);
            user.updated_at = Utc::now();
            Ok(user.clone())
        })
    }

    pub fn all_users(&self) -> Vec<User> {
        newest_first(self.read().users.iter().cloned(), |u| (u.created_at, u.id))
    }

    // Files

    pub fn create_file(&self, new: NewExcelFile) -> StoreResult<ExcelFile> {
        let mut tables = self.write();
        self.commit(FILES_FILE, &mut tables.files, |files| {
            let file = ExcelFile {
                id: next_id(files, |f| f.id),
                user_id: new.user_id,
                filename: new.filename,
                original_name: new.original_name,
                file_path: new.file_path,
                file_size: new.file_size,
                sheets: new.sheets,
                columns: new.columns,
                row_count: new.row_count,
                uploaded_at: Utc::now(),
            };
            files.push(file.clone());
            Ok(file)
        })
    }

    pub fn get_file(&self, id: u64) -> Option<ExcelFile> {
        self.read().files.iter().find(|f| f.id == id).cloned()
    }

    pub fn user_files(&self, user_id: u64) -> Vec<ExcelFile> {
        newest_first(
            self.read().files.iter().filter(|f| f.user_id == user_id).cloned(),
            |f| (f.uploaded_at, f.id),
        )
    }

    pub fn all_files(&self) -> Vec<ExcelFile> {
        newest_first(self.read().files.iter().cloned(), |f| (f.uploaded_at, f.id))
    }

    /// Removes a file record together with every chart built from it.
    ///
    /// The charts go first. If writing the file table then fails, the file
    /// is still listed but has no charts, which is a state the API can serve.
    ///
    /// # Returns
    /// * The removed record
    pub fn delete_file(&self, id: u64) -> StoreResult<ExcelFile> {
        let mut tables = self.write();
        if !tables.files.iter().any(|f| f.id == id) {
            return Err(StoreError::NotFound(format!("file {}", id)));
        }

        if tables.charts.iter().any(|c| c.file_id == id) {
            self.commit(CHARTS_FILE, &mut tables.charts, |charts| {
                charts.retain(|c| c.file_id != id);
                Ok(())
            })?;
        }
        self.commit(FILES_FILE, &mut tables.files, |files| {
            let index = files
                .iter()
                .position(|f| f.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("file {}", id)))?;
            Ok(files.remove(index))
        })
    }

    // Charts

    pub fn create_chart(&self, new: NewChart) -> StoreResult<Chart> {
        let mut tables = self.write();
        self.commit(CHARTS_FILE, &mut tables.charts, |charts| {
            let chart = Chart {
                id: next_id(charts, |c| c.id),
                user_id: new.user_id,
                file_id: new.file_id,
                title: new.title,
                chart_type: new.chart_type,
                x_axis: new.x_axis,
                y_axis: new.y_axis,
                z_axis: new.z_axis,
                sheet_name: new.sheet_name,
                chart_data: new.chart_data,
                chart_options: new.chart_options,
                is_3d: new.is_3d,
                created_at: Utc::now(),
            };
            charts.push(chart.clone());
            Ok(chart)
        })
    }

    pub fn get_chart(&self, id: u64) -> Option<Chart> {
        self.read().charts.iter().find(|c| c.id == id).cloned()
    }

    pub fn user_charts(&self, user_id: u64) -> Vec<Chart> {
        newest_first(
            self.read().charts.iter().filter(|c| c.user_id == user_id).cloned(),
            |c| (c.created_at, c.id),
        )
    }

    pub fn file_charts(&self, file_id: u64) -> Vec<Chart> {
        newest_first(
            self.read().charts.iter().filter(|c| c.file_id == file_id).cloned(),
            |c| (c.created_at, c.id),
        )
    }

    pub fn all_charts(&self) -> Vec<Chart> {
        newest_first(self.read().charts.iter().cloned(), |c| (c.created_at, c.id))
    }

    pub fn update_chart(&self, id: u64, update: ChartUpdate) -> StoreResult<Chart> {
        let mut tables = self.write();
        self.commit(CHARTS_FILE, &mut tables.charts, |charts| {
            let chart = charts
                .iter_mut()
                .find(|c| c.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("chart {}", id)))?;
            if let Some(title) = update.title {
                chart.title = title;
            }
            if let Some(options) = update.chart_options {
                chart.chart_options = options;
            }
            Ok(chart.clone())
        })
    }

    pub fn delete_chart(&self, id: u64) -> StoreResult<()> {
        let mut tables = self.write();
        self.commit(CHARTS_FILE, &mut tables.charts, |charts| {
            let before = charts.len();
            charts.retain(|c| c.id != id);
            if charts.len() == before {
                return Err(StoreError::NotFound(format!("chart {}", id)));
            }
            Ok(())
        })
    }

    // Password resets

    pub fn create_password_reset(
        &self,
        user_id: u64,
        token: String,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<PasswordReset> {
        let mut tables = self.write();
        self.commit(RESETS_FILE, &mut tables.resets, |resets| {
            let reset = PasswordReset {
                id: next_id(resets, |r| r.id),
                user_id,
                token,
                expires_at,
                used: false,
                created_at: Utc::now(),
            };
            resets.push(reset.clone());
            Ok(reset)
        })
    }

    /// Marks the reset request for `token` as used and returns it.
    ///
    /// The lookup and the mark happen under one write lock, so two requests
    /// racing on the same token cannot both get it.
    ///
    /// # Returns
    /// * `None` if no unused request has this token or it expired by `now`
    pub fn claim_password_reset(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<PasswordReset>> {
        let mut tables = self.write();
        let Some(index) = tables
            .resets
            .iter()
            .position(|r| r.token == token && !r.used && r.expires_at > now)
        else {
            return Ok(None);
        };
        self.commit(RESETS_FILE, &mut tables.resets, |resets| {
            resets[index].used = true;
            Ok(Some(resets[index].clone()))
        })
    }
}
