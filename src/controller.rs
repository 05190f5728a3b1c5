//! Varnish Controller client.
//!
//! The controller is reached over its REST API (v1): a Basic-auth login is
//! exchanged for a bearer token, the file list is filtered to deployed files,
//! and each file body is fetched individually. File sources arrive base64
//! encoded; an empty `source` means the file only exists as a draft.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{BackupConfig, CredentialProvider};
use crate::error::{BackupError, Result};
use crate::snapshot::{Snapshot, VclFile};

/// Source of the current set of deployed VCL files.
///
/// The orchestrator only ever talks to the controller through this trait.
pub trait ControllerClient {
    /// Fetch every deployed VCL file with its content.
    fn fetch_snapshot(&self) -> Result<Snapshot>;
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(rename = "accessToken")]
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct FileSummary {
    id: u64,
    name: String,
    #[serde(default)]
    deployed: bool,
}

#[derive(Debug, Deserialize)]
struct FileDetail {
    id: u64,
    name: String,
    #[serde(default)]
    sha: Option<String>,
    #[serde(default)]
    source: String,
    #[serde(default)]
    draft: String,
}

impl FileDetail {
    /// Decode the stored source, falling back to the draft.
    fn into_vcl_file(self) -> Result<VclFile> {
        let encoded = if self.source.is_empty() {
            &self.draft
        } else {
            &self.source
        };
        let bytes = BASE64.decode(encoded.trim()).map_err(|e| {
            BackupError::protocol(format!("file {} ({}) is not valid base64: {}", self.id, self.name, e))
        })?;
        let content = String::from_utf8(bytes).map_err(|e| {
            BackupError::protocol(format!("file {} ({}) is not valid UTF-8: {}", self.id, self.name, e))
        })?;

        let file = VclFile {
            name: self.name,
            content,
        };
        if let Some(sha) = self.sha.filter(|sha| !sha.is_empty()) {
            let local = file.digest();
            if !sha.eq_ignore_ascii_case(&local) {
                debug!(file = %file.name, controller_sha = %sha, local_sha = %local, "Controller digest differs from decoded content");
            }
        }
        Ok(file)
    }
}

/// HTTP client for the Varnish Controller API
pub struct HttpController {
    client: Client,
    base_url: String,
    organization: Option<String>,
    credentials: Box<dyn CredentialProvider>,
}

impl HttpController {
    /// Create a client for `api_url` (the controller root, without `/api/v1`).
    pub fn new(
        api_url: &str,
        organization: Option<String>,
        credentials: Box<dyn CredentialProvider>,
        timeout: Duration,
        accept_invalid_certs: bool,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .danger_accept_invalid_certs(accept_invalid_certs)
            .user_agent(concat!("gitvcl/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackupError::connection(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: format!("{}/api/v1", api_url.trim_end_matches('/')),
            organization,
            credentials,
        })
    }

    /// Create a client from the loaded configuration.
    pub fn from_config(config: &BackupConfig) -> Result<Self> {
        Self::new(
            &config.api_url,
            config.controller.organization.clone(),
            config.credential_provider(),
            Duration::from_secs(config.controller.timeout_secs),
            config.controller.accept_invalid_certs,
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Exchange the configured credentials for a bearer token.
    fn login(&self) -> Result<String> {
        let credentials = self.credentials.credentials()?;
        let mut request = self
            .client
            .post(self.url("/auth/login"))
            .basic_auth(&credentials.username, Some(&credentials.password));
        if let Some(org) = &self.organization {
            request = request.json(&serde_json::json!({ "Org": org }));
        }

        let login: LoginResponse = send_json(request, "login")?;
        if login.access_token.is_empty() {
            return Err(BackupError::protocol("login response carried an empty accessToken"));
        }
        debug!(user = %credentials.username, "Authenticated to controller");
        Ok(login.access_token)
    }

    fn list_files(&self, token: &str) -> Result<Vec<FileSummary>> {
        send_json(
            self.client.get(self.url("/files")).bearer_auth(token),
            "file listing",
        )
    }

    fn fetch_file(&self, token: &str, id: u64) -> Result<VclFile> {
        let detail: FileDetail = send_json(
            self.client
                .get(self.url(&format!("/files/{}", id)))
                .bearer_auth(token),
            &format!("file {}", id),
        )?;
        if detail.id != id {
            return Err(BackupError::protocol(format!(
                "requested file {} but controller returned file {}",
                id, detail.id
            )));
        }
        detail.into_vcl_file()
    }
}

impl ControllerClient for HttpController {
    fn fetch_snapshot(&self) -> Result<Snapshot> {
        let token = self.login()?;
        let files = self.list_files(&token)?;
        let total = files.len();

        let mut snapshot = Snapshot::new();
        for summary in files.into_iter().filter(|f| f.deployed) {
            debug!(id = summary.id, name = %summary.name, "Fetching deployed file");
            let file = self.fetch_file(&token, summary.id)?;
            if file.name != summary.name {
                return Err(BackupError::protocol(format!(
                    "file {} is listed as {:?} but fetched as {:?}",
                    summary.id, summary.name, file.name
                )));
            }
            snapshot.insert(file)?;
        }

        info!(
            deployed = snapshot.len(),
            listed = total,
            "Fetched VCL snapshot from controller"
        );
        Ok(snapshot)
    }
}

/// Send a request and decode a JSON body, classifying every failure.
///
/// The body is read in full before decoding: reqwest reports a stalled or
/// dropped body through the same error kind as bad JSON, and only the latter
/// is a protocol failure.
fn send_json<T: DeserializeOwned>(request: RequestBuilder, what: &str) -> Result<T> {
    let response = request.send().map_err(|e| classify_transport(e, what))?;
    let response = check_status(response, what)?;
    let body = response.bytes().map_err(|e| classify_transport(e, what))?;
    serde_json::from_slice(&body)
        .map_err(|e| BackupError::protocol(format!("{} response could not be decoded: {}", what, e)))
}

/// Failures while sending or reading are network failures.
fn classify_transport(err: reqwest::Error, what: &str) -> BackupError {
    if err.is_timeout() {
        BackupError::connection(format!("{} timed out: {}", what, err))
    } else {
        BackupError::connection(format!("{} request failed: {}", what, err))
    }
}

fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED
        || status == StatusCode::FORBIDDEN
        || status.is_server_error()
    {
        Err(BackupError::connection(format!(
            "{} was refused by the controller: HTTP {}",
            what, status
        )))
    } else {
        Err(BackupError::protocol(format!(
            "{} returned unexpected HTTP {}",
            what, status
        )))
    }
}
