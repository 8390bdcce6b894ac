use chrono::{NaiveDate, NaiveDateTime};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::*;

pub const ROLE_ADMIN: &str = "admin";
pub const ROLE_VIEWER: &str = "viewer";

// Row structs are also Insertable (all columns) so a full-database backup
// can be restored verbatim, timestamps included.

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = users)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub client_id: Option<i64>,
    pub last_login: Option<NaiveDateTime>,
    pub session_expiry: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub role: String,
    pub client_id: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = clients)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub drive_folder_id: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<NaiveDateTime>,
    pub warning_days: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = clients)]
pub struct NewClient {
    pub id: i64,
    pub name: String,
    pub drive_folder_id: Option<String>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Associations, Serialize, Deserialize)]
#[diesel(table_name = documents)]
#[diesel(belongs_to(Client, foreign_key = client_id))]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub hierarchical_path: String,
    pub revision: i32,
    pub source_url: String,
    pub file_type: String,
    pub alert_status: Option<String>,
    // Set when a glyph override forced the status; such rows are exempt
    // from the date-based re-check.
    pub alert_forced: bool,
    pub expiry_date: Option<NaiveDate>,
    pub is_obsolete: bool,
    pub parent_id: Option<i64>,
    pub integrity_hash: Option<String>,
    pub encrypted_cache_path: Option<String>,
    pub client_id: Option<i64>,
    pub owner_id: i64,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Document {
    /// Display form of the revision, e.g. "Rev.3".
    pub fn revision_label(&self) -> String {
        format!("Rev.{}", self.revision)
    }
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = documents)]
pub struct NewDocument {
    pub id: i64,
    pub title: String,
    pub hierarchical_path: String,
    pub revision: i32,
    pub source_url: String,
    pub file_type: String,
    pub alert_status: Option<String>,
    pub alert_forced: bool,
    pub expiry_date: Option<NaiveDate>,
    pub integrity_hash: Option<String>,
    pub encrypted_cache_path: Option<String>,
    pub client_id: Option<i64>,
    pub owner_id: i64,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = company_codes)]
pub struct CompanyCode {
    pub id: i64,
    pub code: String,
    pub role: String,
    pub usage_limit: i32,
    pub usage_count: i32,
    pub expires_at: Option<NaiveDateTime>,
    pub is_active: bool,
    pub created_by: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl CompanyCode {
    pub fn is_valid(&self, now: NaiveDateTime) -> bool {
        self.is_active
            && self.usage_count < self.usage_limit
            && self.expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = company_codes)]
pub struct NewCompanyCode {
    pub id: i64,
    pub code: String,
    pub role: String,
    pub usage_limit: i32,
    pub expires_at: Option<NaiveDateTime>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Queryable, Identifiable, Insertable, Serialize, Deserialize)]
#[diesel(table_name = logs)]
pub struct LogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub document_id: Option<i64>,
    pub details: serde_json::Value,
    pub logged_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = logs)]
pub struct NewLogEntry {
    pub id: i64,
    pub user_id: Option<i64>,
    pub action: String,
    pub document_id: Option<i64>,
    pub details: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn code(usage_count: i32, usage_limit: i32, active: bool) -> CompanyCode {
        CompanyCode {
            id: 1,
            code: "WELCOME".into(),
            role: ROLE_VIEWER.into(),
            usage_limit,
            usage_count,
            expires_at: None,
            is_active: active,
            created_by: None,
            created_at: Utc::now().naive_utc(),
        }
    }

    #[test]
    fn code_valid_when_active_and_under_limit() {
        assert!(code(0, 5, true).is_valid(Utc::now().naive_utc()));
    }

    #[test]
    fn code_invalid_when_exhausted_or_inactive() {
        let now = Utc::now().naive_utc();
        assert!(!code(5, 5, true).is_valid(now));
        assert!(!code(0, 5, false).is_valid(now));
    }

    #[test]
    fn code_invalid_after_expiry() {
        let now = Utc::now().naive_utc();
        let mut expired = code(0, 5, true);
        expired.expires_at = Some(now - Duration::hours(1));
        assert!(!expired.is_valid(now));
    }
}
