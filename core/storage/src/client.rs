//! Google Drive API client.

use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use drivekit_auth::AuthorizedTransport;
use drivekit_common::{Error, Result};

use crate::types::{
    DriveFile, FileListResponse, Permission, PermissionGrant, PermissionListResponse,
    FILE_FIELDS, FOLDER_MIME_TYPE,
};

/// Google Drive API base URL.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Page size for list calls.
const PAGE_SIZE: &str = "1000";

/// Google Drive API client.
///
/// Every call goes through the [`AuthorizedTransport`], which keeps the
/// access token fresh.
#[derive(Clone)]
pub struct DriveClient {
    transport: AuthorizedTransport,
    base_url: String,
}

impl DriveClient {
    /// Create a new Drive client.
    pub fn new(transport: AuthorizedTransport) -> Self {
        Self::with_base_url(transport, DRIVE_API_BASE)
    }

    /// Create a client talking to a different API root.
    pub fn with_base_url(transport: AuthorizedTransport, base_url: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// The transport this client sends through.
    pub fn transport(&self) -> &AuthorizedTransport {
        &self.transport
    }

    /// Create a folder under `parent_id` (`"root"` for My Drive).
    pub async fn create_folder(&self, name: &str, parent_id: &str) -> Result<DriveFile> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME_TYPE,
            "parents": [parent_id]
        });

        let request = self
            .request(Method::POST, "files")
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);

        let folder: DriveFile = self.send(request).await?;
        info!(id = %folder.id, "Created folder {}", folder.name);
        Ok(folder)
    }

    /// Rename a folder.
    pub async fn rename_folder(&self, folder_id: &str, new_name: &str) -> Result<DriveFile> {
        let metadata = serde_json::json!({
            "name": new_name,
            "mimeType": FOLDER_MIME_TYPE
        });

        let request = self
            .request(Method::PATCH, &format!("files/{}", folder_id))
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);

        let folder: DriveFile = self.send(request).await?;
        info!(id = %folder.id, "Renamed folder to {}", folder.name);
        Ok(folder)
    }

    /// Create an empty file of `mime_type` under `parent_id`.
    pub async fn create_file(
        &self,
        name: &str,
        mime_type: &str,
        parent_id: &str,
    ) -> Result<DriveFile> {
        let metadata = serde_json::json!({
            "name": name,
            "mimeType": mime_type,
            "parents": [parent_id]
        });

        let request = self
            .request(Method::POST, "files")
            .query(&[("fields", FILE_FIELDS)])
            .json(&metadata);

        let file: DriveFile = self.send(request).await?;
        info!(id = %file.id, "Created {} file {}", file.mime_type, file.name);
        Ok(file)
    }

    /// Get file metadata by ID.
    pub async fn get_file(&self, file_id: &str) -> Result<DriveFile> {
        let request = self
            .request(Method::GET, &format!("files/{}", file_id))
            .query(&[("fields", FILE_FIELDS)]);

        self.send(request).await
    }

    /// Browser link for a folder.
    pub async fn folder_link(&self, folder_id: &str) -> Result<String> {
        let file = self.get_file(folder_id).await?;
        file.web_view_link
            .ok_or_else(|| Error::NotFound(format!("No web link for {}", folder_id)))
    }

    /// List files directly under `parent_id`, skipping trashed ones.
    pub async fn list_files(&self, parent_id: &str) -> Result<Vec<DriveFile>> {
        let query = children_query(parent_id);
        let fields = format!("files({}),nextPageToken", FILE_FIELDS);

        let mut all_files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.request(Method::GET, "files").query(&[
                ("q", query.as_str()),
                ("fields", fields.as_str()),
                ("pageSize", PAGE_SIZE),
            ]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: FileListResponse = self.send(request).await?;
            all_files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!("Listed {} files under {}", all_files.len(), parent_id);
        Ok(all_files)
    }

    /// Grant a permission on a file or folder. Ownership is never transferred.
    pub async fn grant_permission(
        &self,
        file_id: &str,
        grant: &PermissionGrant,
    ) -> Result<Permission> {
        let request = self
            .request(Method::POST, &format!("files/{}/permissions", file_id))
            .query(&[
                ("transferOwnership", "false"),
                ("fields", "id,type,role,emailAddress,displayName"),
            ])
            .json(grant);

        let permission: Permission = self.send(request).await?;
        info!(file = %file_id, role = %permission.role, "Granted permission");
        Ok(permission)
    }

    /// List permissions on a file or folder.
    pub async fn list_permissions(&self, file_id: &str) -> Result<Vec<Permission>> {
        let path = format!("files/{}/permissions", file_id);
        let mut all = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self.request(Method::GET, &path).query(&[(
                "fields",
                "permissions(id,type,role,emailAddress,displayName),nextPageToken",
            )]);

            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let page: PermissionListResponse = self.send(request).await?;
            all.extend(page.permissions);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(all)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.transport.http().request(method, url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        let request = request
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to build request: {}", e)))?;
        let response = self.transport.execute(request).await?;
        handle_response(response).await
    }
}

/// Handle API response with error checking.
async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();

    if status.is_success() {
        return response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse response: {}", e)));
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => Err(Error::NotFound(body)),
        StatusCode::UNAUTHORIZED => Err(Error::AuthExpired(format!(
            "Access token rejected by the API: {}",
            body
        ))),
        StatusCode::FORBIDDEN => Err(Error::PermissionDenied(body)),
        _ => Err(Error::Api {
            status: status.as_u16(),
            message: body,
        }),
    }
}

/// Drive search query for the non-trashed children of `parent_id`.
fn children_query(parent_id: &str) -> String {
    let escaped = parent_id.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}' in parents and trashed = false", escaped)
}

/// Extract the folder ID from a folder's web link (its last path segment).
pub fn folder_id_from_link(link: &str) -> Option<&str> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty() && !id.contains(':'))
}
