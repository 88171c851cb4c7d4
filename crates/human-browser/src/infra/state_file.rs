//! `daemon.json`: how the CLI finds a running daemon and its token.

use std::path::Path;

use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use url::Url;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DaemonStateFile {
    pub pid: u32,
    pub http_url: String,
    pub bridge_url: String,
    pub listen: String,
    #[serde(default)]
    pub token: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl DaemonStateFile {
    /// Bridge URL with the token appended, ready to paste into the agent.
    pub fn bridge_url_with_token(&self) -> String {
        let Some(token) = self.token.as_deref() else {
            return self.bridge_url.clone();
        };
        match Url::parse(&self.bridge_url) {
            Ok(mut url) => {
                url.query_pairs_mut().append_pair("token", token);
                url.to_string()
            }
            Err(_) => format!("{}?token={}", self.bridge_url, token),
        }
    }
}

/// Writes via a temp file and rename so readers never see a partial file.
pub fn write_state_file(path: &Path, state: &DaemonStateFile) -> std::io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_vec_pretty(state).map_err(std::io::Error::other)?;
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, body)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&tmp_path, std::fs::Permissions::from_mode(0o600));
    }
    std::fs::rename(&tmp_path, path)
}

pub fn read_state_file(path: &Path) -> std::io::Result<DaemonStateFile> {
    let body = std::fs::read(path)?;
    serde_json::from_slice(&body)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

pub fn remove_state_file(path: &Path) {
    if !path.as_os_str().is_empty() {
        let _ = std::fs::remove_file(path);
    }
}
