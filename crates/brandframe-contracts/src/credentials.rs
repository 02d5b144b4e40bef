//! Stored API keys for the two upstream providers.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{Map, Value};
use thiserror::Error;

pub const CREDENTIALS_PATH_ENV: &str = "BRANDFRAME_CREDENTIALS";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialKind {
    Upriver,
    Gemini,
}

impl CredentialKind {
    pub const ALL: [CredentialKind; 2] = [CredentialKind::Upriver, CredentialKind::Gemini];

    /// Key under which the credential is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            CredentialKind::Upriver => "upriver_api_key",
            CredentialKind::Gemini => "gemini_api_key",
        }
    }

    /// Environment variables consulted when the store has no value, in order.
    pub fn env_vars(self) -> &'static [&'static str] {
        match self {
            CredentialKind::Upriver => &["UPRIVER_API_KEY"],
            CredentialKind::Gemini => &["GEMINI_API_KEY", "GOOGLE_API_KEY"],
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CredentialKind::Upriver => "Upriver API key",
            CredentialKind::Gemini => "Gemini API key",
        }
    }
}

impl fmt::Display for CredentialKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to access credential file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("credential file {path} is not a JSON object: {message}")]
    Parse { path: PathBuf, message: String },
}

pub trait CredentialStore: Send + Sync {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, CredentialError>;
    fn set(&self, kind: CredentialKind, value: &str) -> Result<(), CredentialError>;
    /// Removes every stored credential.
    fn clear(&self) -> Result<(), CredentialError>;
}

/// JSON object on disk: `{"upriver_api_key": "...", "gemini_api_key": "..."}`.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `$BRANDFRAME_CREDENTIALS`, else `<config dir>/brandframe/credentials.json`.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CREDENTIALS_PATH_ENV).filter(|path| !path.is_empty()) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("brandframe").join("credentials.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Map<String, Value>, CredentialError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Map::new()),
            Err(source) => {
                return Err(CredentialError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(CredentialError::Parse {
                path: self.path.clone(),
                message: format!("found {other}"),
            }),
            Err(err) => Err(CredentialError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            }),
        }
    }

    fn write(&self, payload: &Map<String, Value>) -> Result<(), CredentialError> {
        let io_error = |source: std::io::Error| CredentialError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(io_error)?;
        }
        let body = serde_json::to_string_pretty(&Value::Object(payload.clone())).map_err(|err| {
            CredentialError::Parse {
                path: self.path.clone(),
                message: err.to_string(),
            }
        })?;
        write_private(&self.path, body.as_bytes()).map_err(io_error)
    }
}

/// Writes `body` readable by the owner only.
#[cfg(unix)]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // `mode` only applies when the file is created.
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(body)
}

#[cfg(not(unix))]
fn write_private(path: &Path, body: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, body)
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, CredentialError> {
        Ok(self
            .read()?
            .get(kind.storage_key())
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string))
    }

    fn set(&self, kind: CredentialKind, value: &str) -> Result<(), CredentialError> {
        let mut payload = self.read()?;
        payload.insert(
            kind.storage_key().to_string(),
            Value::String(value.trim().to_string()),
        );
        self.write(&payload)
    }

    fn clear(&self) -> Result<(), CredentialError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CredentialError::Io {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: Mutex<HashMap<CredentialKind, String>>,
}

impl MemoryCredentialStore {
    pub fn with(entries: &[(CredentialKind, &str)]) -> Self {
        Self {
            values: Mutex::new(
                entries
                    .iter()
                    .map(|(kind, value)| (*kind, (*value).to_string()))
                    .collect(),
            ),
        }
    }

    fn values(&self) -> std::sync::MutexGuard<'_, HashMap<CredentialKind, String>> {
        self.values
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, kind: CredentialKind) -> Result<Option<String>, CredentialError> {
        Ok(self.values().get(&kind).cloned())
    }

    fn set(&self, kind: CredentialKind, value: &str) -> Result<(), CredentialError> {
        self.values().insert(kind, value.trim().to_string());
        Ok(())
    }

    fn clear(&self) -> Result<(), CredentialError> {
        self.values().clear();
        Ok(())
    }
}

/// Keys read once at the start of a run and held for its duration.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    upriver: Option<String>,
    gemini: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("upriver", &self.upriver.as_ref().map(|_| "<set>"))
            .field("gemini", &self.gemini.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl Credentials {
    pub fn new(upriver: Option<String>, gemini: Option<String>) -> Self {
        Self {
            upriver: clean(upriver),
            gemini: clean(gemini),
        }
    }

    /// Reads both keys from `store`, filling gaps from the environment.
    pub fn snapshot(store: &dyn CredentialStore) -> Result<Self, CredentialError> {
        Self::snapshot_with(store, |name| std::env::var(name).ok())
    }

    /// Environment-only credentials, for when the store cannot be read.
    pub fn from_env() -> Self {
        let lookup = |kind: CredentialKind| {
            kind.env_vars()
                .iter()
                .find_map(|name| clean(std::env::var(name).ok()))
        };
        Self {
            upriver: lookup(CredentialKind::Upriver),
            gemini: lookup(CredentialKind::Gemini),
        }
    }

    pub fn snapshot_with(
        store: &dyn CredentialStore,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CredentialError> {
        let resolve = |kind: CredentialKind| -> Result<Option<String>, CredentialError> {
            if let Some(value) = clean(store.get(kind)?) {
                return Ok(Some(value));
            }
            Ok(kind.env_vars().iter().find_map(|name| clean(env(name))))
        };
        Ok(Self {
            upriver: resolve(CredentialKind::Upriver)?,
            gemini: resolve(CredentialKind::Gemini)?,
        })
    }

    pub fn get(&self, kind: CredentialKind) -> Option<&str> {
        match kind {
            CredentialKind::Upriver => self.upriver.as_deref(),
            CredentialKind::Gemini => self.gemini.as_deref(),
        }
    }
}

fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// `abcd…wxyz` style preview for display; short keys are fully masked.
pub fn mask_secret(value: &str) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}…{tail}")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn file_store_round_trip_and_clear() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = FileCredentialStore::new(temp.path().join("nested/credentials.json"));
        assert_eq!(store.get(CredentialKind::Upriver)?, None);

        store.set(CredentialKind::Upriver, " up-key ")?;
        store.set(CredentialKind::Gemini, "gm-key")?;
        assert_eq!(store.get(CredentialKind::Upriver)?.as_deref(), Some("up-key"));

        let raw: Value = serde_json::from_str(&fs::read_to_string(store.path())?)?;
        assert_eq!(raw["upriver_api_key"], "up-key");
        assert_eq!(raw["gemini_api_key"], "gm-key");

        store.clear()?;
        assert_eq!(store.get(CredentialKind::Gemini)?, None);
        store.clear()?;
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn file_store_keeps_keys_owner_only() -> anyhow::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir()?;
        let path = temp.path().join("credentials.json");
        fs::write(&path, "{}")?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o644))?;

        let store = FileCredentialStore::new(&path);
        store.set(CredentialKind::Gemini, "gm-key")?;
        assert_eq!(fs::metadata(&path)?.permissions().mode() & 0o777, 0o600);

        let fresh = FileCredentialStore::new(temp.path().join("fresh.json"));
        fresh.set(CredentialKind::Upriver, "up-key")?;
        assert_eq!(fs::metadata(fresh.path())?.permissions().mode() & 0o777, 0o600);
        Ok(())
    }

    #[test]
    fn file_store_rejects_non_object_json() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("credentials.json");
        fs::write(&path, "[1, 2]")?;
        let store = FileCredentialStore::new(&path);
        assert!(matches!(
            store.get(CredentialKind::Upriver),
            Err(CredentialError::Parse { .. })
        ));
        Ok(())
    }

    #[test]
    fn snapshot_prefers_store_then_env() -> anyhow::Result<()> {
        let store = MemoryCredentialStore::with(&[(CredentialKind::Upriver, "stored")]);
        let env = |name: &str| match name {
            "UPRIVER_API_KEY" => Some("from-env".to_string()),
            "GOOGLE_API_KEY" => Some("google".to_string()),
            _ => None,
        };
        let credentials = Credentials::snapshot_with(&store, env)?;
        assert_eq!(credentials.get(CredentialKind::Upriver), Some("stored"));
        assert_eq!(credentials.get(CredentialKind::Gemini), Some("google"));
        Ok(())
    }

    #[test]
    fn snapshot_is_unaffected_by_later_store_writes() -> anyhow::Result<()> {
        let store = MemoryCredentialStore::with(&[(CredentialKind::Gemini, "first")]);
        let credentials = Credentials::snapshot_with(&store, |_| None)?;
        store.set(CredentialKind::Gemini, "second")?;
        store.clear()?;
        assert_eq!(credentials.get(CredentialKind::Gemini), Some("first"));
        assert_eq!(credentials.get(CredentialKind::Upriver), None);
        Ok(())
    }

    #[test]
    fn debug_output_hides_values() {
        let credentials = Credentials::new(Some("secret-value".into()), None);
        let rendered = format!("{credentials:?}");
        assert!(!rendered.contains("secret-value"));
        assert!(rendered.contains("<set>"));
    }

    #[test]
    fn mask_secret_keeps_edges() {
        assert_eq!(mask_secret("abcd1234wxyz"), "abcd…wxyz");
        assert_eq!(mask_secret("short"), "*****");
    }
}
