use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const PAGE_SIZE: u32 = 1000;

/// Per-tenant OAuth credential bundle as stored on the client record.
#[derive(Debug, Clone)]
pub struct DriveCredentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expiry: Option<NaiveDateTime>,
}

impl DriveCredentials {
    pub fn is_expired(&self) -> bool {
        match self.token_expiry {
            Some(expiry) => expiry <= Utc::now().naive_utc(),
            None => false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub view_url: Option<String>,
}

impl RemoteFile {
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME
    }
}

/// A single remote folder listing plus file download. Recursion into
/// subfolders is the sync orchestrator's responsibility.
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Lists the direct children of `folder_id`, concatenating remote pages
    /// so the caller sees one flat list.
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>>;

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<()>;
}

/// Mints an authenticated [`RemoteFileStore`] from a credential bundle,
/// refreshing the access token first when it has expired. The possibly
/// updated bundle is handed back so the caller can persist it.
#[async_trait]
pub trait DriveConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: DriveCredentials,
    ) -> Result<(Arc<dyn RemoteFileStore>, DriveCredentials)>;
}

pub struct GoogleDriveConnector {
    http: Client,
    client_id: String,
    client_secret: String,
}

impl GoogleDriveConnector {
    pub fn new(client_id: String, client_secret: String, request_timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(request_timeout)
            .build()
            .context("failed to build drive HTTP client")?;
        Ok(Self {
            http,
            client_id,
            client_secret,
        })
    }

    async fn refresh_access_token(&self, refresh_token: &str) -> Result<(String, NaiveDateTime)> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
            expires_in: i64,
        }

        let response = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .context("token refresh request failed")?;

        if !response.status().is_success() {
            return Err(anyhow!("token refresh failed: {}", response.status()));
        }

        let token: TokenResponse = response
            .json()
            .await
            .context("failed to parse token refresh response")?;
        let expiry = (Utc::now() + chrono::Duration::seconds(token.expires_in)).naive_utc();
        Ok((token.access_token, expiry))
    }
}

#[async_trait]
impl DriveConnector for GoogleDriveConnector {
    async fn connect(
        &self,
        mut credentials: DriveCredentials,
    ) -> Result<(Arc<dyn RemoteFileStore>, DriveCredentials)> {
        if credentials.is_expired() {
            let refresh_token = credentials
                .refresh_token
                .as_deref()
                .ok_or_else(|| anyhow!("access token expired and no refresh token stored"))?;
            let (access_token, expiry) = self.refresh_access_token(refresh_token).await?;
            credentials.access_token = access_token;
            credentials.token_expiry = Some(expiry);
        }

        let store = GoogleDrive {
            http: self.http.clone(),
            access_token: credentials.access_token.clone(),
        };
        Ok((Arc::new(store), credentials))
    }
}

struct GoogleDrive {
    http: Client,
    access_token: String,
}

#[derive(Deserialize)]
struct DriveFileEntry {
    id: String,
    name: String,
    #[serde(rename = "mimeType")]
    mime_type: String,
    #[serde(rename = "webViewLink")]
    web_view_link: Option<String>,
}

#[derive(Deserialize)]
struct DriveListResponse {
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFileEntry>,
}

#[async_trait]
impl RemoteFileStore for GoogleDrive {
    async fn list_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>> {
        let query = format!("'{folder_id}' in parents and trashed = false");
        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .http
                .get(DRIVE_FILES_URL)
                .bearer_auth(&self.access_token)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", "nextPageToken,files(id,name,mimeType,webViewLink)"),
                ])
                .query(&[("pageSize", PAGE_SIZE)]);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }

            let response = request.send().await.context("drive list request failed")?;
            if !response.status().is_success() {
                return Err(anyhow!("drive listing failed: {}", response.status()));
            }

            let page: DriveListResponse = response
                .json()
                .await
                .context("failed to parse drive listing")?;

            files.extend(page.files.into_iter().map(|entry| RemoteFile {
                id: entry.id,
                name: entry.name,
                mime_type: entry.mime_type,
                view_url: entry.web_view_link,
            }));

            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        Ok(files)
    }

    async fn download_file(&self, file: &RemoteFile, dest: &Path) -> Result<()> {
        // Google-native documents cannot be fetched verbatim; export them to
        // a standard format instead.
        let request = match export_mime(&file.mime_type) {
            Some(export) => self
                .http
                .get(format!("{DRIVE_FILES_URL}/{}/export", file.id))
                .query(&[("mimeType", export)]),
            None => self
                .http
                .get(format!("{DRIVE_FILES_URL}/{}", file.id))
                .query(&[("alt", "media")]),
        };

        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .with_context(|| format!("download request failed for {}", file.name))?;
        if !response.status().is_success() {
            return Err(anyhow!(
                "download of {} failed: {}",
                file.name,
                response.status()
            ));
        }

        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body of {}", file.name))?;
        tokio::fs::write(dest, &bytes)
            .await
            .with_context(|| format!("failed to write scratch file {}", dest.display()))?;
        Ok(())
    }
}

fn export_mime(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "application/vnd.google-apps.spreadsheet" => {
            Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet")
        }
        "application/vnd.google-apps.document" => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        _ => None,
    }
}

static FOLDER_URL_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"/folders/([A-Za-z0-9_-]+)").unwrap(),
        Regex::new(r"/my-drive/([A-Za-z0-9_-]+)").unwrap(),
        Regex::new(r"[?&]id=([A-Za-z0-9_-]+)").unwrap(),
    ]
});

static BARE_FOLDER_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Accepts either a bare folder identifier or one of the known Drive URL
/// shapes; anything else is rejected.
pub fn extract_folder_id(input: &str) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }

    for pattern in FOLDER_URL_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(trimmed) {
            return Some(captures[1].to_string());
        }
    }

    if BARE_FOLDER_ID.is_match(trimmed) {
        return Some(trimmed.to_string());
    }

    None
}

#[cfg(test)]
mod tests {
    use super::extract_folder_id;

    #[test]
    fn extracts_from_folders_url() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/folders/ABC123").as_deref(),
            Some("ABC123")
        );
    }

    #[test]
    fn extracts_from_open_url() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/open?id=XYZ").as_deref(),
            Some("XYZ")
        );
    }

    #[test]
    fn extracts_from_my_drive_url() {
        assert_eq!(
            extract_folder_id("https://drive.google.com/drive/my-drive/Fold_01").as_deref(),
            Some("Fold_01")
        );
    }

    #[test]
    fn accepts_bare_identifier() {
        assert_eq!(
            extract_folder_id("1aB2c-D3_e").as_deref(),
            Some("1aB2c-D3_e")
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(extract_folder_id("not a url or id!"), None);
        assert_eq!(extract_folder_id(""), None);
    }
}
