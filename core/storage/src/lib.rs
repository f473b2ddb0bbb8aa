//! Google Drive operations for drivekit.
//!
//! [`DriveClient`] wraps the Drive v3 REST API calls drivekit needs:
//! folder creation and rename, empty file creation, listing, and
//! permission grants. Authentication is delegated to an
//! [`AuthorizedTransport`](drivekit_auth::AuthorizedTransport) passed in at
//! construction; the client holds no global state.

pub mod client;
pub mod types;

pub use client::{folder_id_from_link, DriveClient, DRIVE_API_BASE};
pub use types::{
    DriveFile, GranteeType, Permission, PermissionGrant, Role, DOCUMENT_MIME_TYPE,
    FOLDER_MIME_TYPE, SPREADSHEET_MIME_TYPE,
};
