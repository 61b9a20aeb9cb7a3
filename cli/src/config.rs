use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::debug;

use fitlog_core::reconciler::{ReconcilePolicy, SaveMode};

const DEFAULT_TIMEOUT_SECS: u64 = 10;

pub struct Config {
    pub data_dir: PathBuf,
    pub cache_path: PathBuf,
    pub backend_path: PathBuf,
    pub session_path: PathBuf,
    pub policy: ReconcilePolicy,
    pub save_mode: SaveMode,
    pub timeout: Duration,
    env_session: Option<Session>,
    env_api_key: Option<String>,
}

/// The signed-in account. Absent means signed out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub server: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build from a variable lookup so tests never touch the process environment.
    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let data_dir = match var("FITLOG_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            Some(dir) => PathBuf::from(dir),
            None => ProjectDirs::from("", "", "fitlog")
                .context("Could not determine home directory")?
                .data_dir()
                .to_path_buf(),
        };
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        let clear_remote_on_empty = var("FITLOG_CLEAR_REMOTE_ON_EMPTY")
            .map(|v| parse_flag("FITLOG_CLEAR_REMOTE_ON_EMPTY", &v))
            .transpose()?
            .unwrap_or(false);
        let save_mode = var("FITLOG_SAVE_MODE")
            .map(|v| parse_save_mode(&v))
            .transpose()?
            .unwrap_or_default();
        let timeout_secs = var("FITLOG_TIMEOUT_SECS")
            .map(|v| parse_timeout(&v))
            .transpose()?
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let env_api_key = var("FITLOG_API_KEY").filter(|k| !k.trim().is_empty());
        let env_session = match (var("FITLOG_SERVER"), var("FITLOG_USER_ID")) {
            (Some(server), Some(user_id)) if !server.is_empty() && !user_id.is_empty() => {
                Some(Session {
                    server,
                    user_id,
                    api_key: env_api_key.clone(),
                })
            }
            _ => None,
        };

        Ok(Config {
            cache_path: data_dir.join("fitness_logs.json"),
            backend_path: data_dir.join("backend.db"),
            session_path: data_dir.join("session.json"),
            data_dir,
            policy: ReconcilePolicy {
                clear_remote_on_empty,
            },
            save_mode,
            timeout: Duration::from_secs(timeout_secs),
            env_session,
            env_api_key,
        })
    }

    /// The active session: environment first, then `session.json`.
    pub fn session(&self) -> Result<Option<Session>> {
        if let Some(session) = &self.env_session {
            return Ok(Some(session.clone()));
        }
        if !self.session_path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read(&self.session_path).with_context(|| {
            format!("Failed to read session file: {}", self.session_path.display())
        })?;
        let mut session: Session = serde_json::from_slice(&raw).with_context(|| {
            format!("Session file is malformed: {}", self.session_path.display())
        })?;
        if let Some(key) = &self.env_api_key {
            session.api_key = Some(key.clone());
        }
        debug!(user_id = %session.user_id, server = %session.server, "loaded session");
        Ok(Some(session))
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let payload = serde_json::to_vec_pretty(session)?;
        std::fs::write(&self.session_path, payload).with_context(|| {
            format!("Failed to write session file: {}", self.session_path.display())
        })?;
        restrict_permissions(&self.session_path)
    }

    /// Returns whether a stored session existed.
    pub fn clear_session(&self) -> Result<bool> {
        match std::fs::remove_file(&self.session_path) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err).with_context(|| {
                format!("Failed to remove session file: {}", self.session_path.display())
            }),
        }
    }

    pub fn tls_dir(&self) -> PathBuf {
        self.data_dir.join("tls")
    }

    /// Load the server API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)`.
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        restrict_permissions(&path)?;
        eprintln!("Generated new API key: {key}");
        eprintln!("Clients sign in with: fitlog login <server> <user-id> --api-key {key}");
        Ok((key, true))
    }
}

fn restrict_permissions(path: &std::path::Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("Failed to set permissions on {}", path.display()))?;
    }
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("Invalid value '{other}' for {name}. Use true or false"),
    }
}

fn parse_save_mode(value: &str) -> Result<SaveMode> {
    match value.trim().to_lowercase().as_str() {
        "immediate" => Ok(SaveMode::Immediate),
        "batched" => Ok(SaveMode::Batched),
        other => bail!("Invalid save mode '{other}'. Use immediate or batched"),
    }
}

fn parse_timeout(value: &str) -> Result<u64> {
    let secs: u64 = value
        .trim()
        .parse()
        .with_context(|| format!("Invalid FITLOG_TIMEOUT_SECS '{value}'"))?;
    if secs == 0 {
        bail!("FITLOG_TIMEOUT_SECS must be greater than 0");
    }
    Ok(secs)
}
