use crate::core::{DocError, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// When the memory store writes its snapshot to disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// Checkpoint after every write.
    Sync,
    /// Checkpoint every `checkpoint_threshold` writes.
    #[default]
    Async,
    /// Memory only.
    None,
}

/// Document store configuration
///
/// Mirrors a database connection string; the memory store only uses
/// `database`, `data_dir` and the durability settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Database host
    pub host: String,

    /// Database port
    pub port: u16,

    /// Database name
    pub database: String,

    /// Login for authentication
    pub login: Option<String>,

    /// Password for authentication
    pub password: Option<String>,

    /// Directory holding snapshot files
    pub data_dir: Option<PathBuf>,

    pub durability: DurabilityMode,

    /// Writes between snapshots in `Async` mode
    pub checkpoint_threshold: usize,
}

const DEFAULT_PORT: u16 = 27017;
const URL_SCHEME: &str = "memodoc://";

impl StoreConfig {
    pub fn new(database: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: DEFAULT_PORT,
            database: database.to_string(),
            login: None,
            password: None,
            data_dir: None,
            durability: DurabilityMode::default(),
            checkpoint_threshold: 100,
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, login: &str, password: &str) -> Self {
        self.login = Some(login.to_string());
        self.password = Some(password.to_string());
        self
    }

    pub fn data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    pub fn checkpoint_threshold(mut self, threshold: usize) -> Self {
        self.checkpoint_threshold = threshold;
        self
    }

    /// Parse from connection string
    ///
    /// Format: "memodoc://[login:password@]host[:port]/database"
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix(URL_SCHEME)
            .ok_or_else(|| DocError::Config(format!("URL must start with '{}'", URL_SCHEME)))?;

        let (auth, location) = match rest.rsplit_once('@') {
            Some((auth, location)) => (Some(auth), location),
            None => (None, rest),
        };

        let (host_port, database) = location
            .split_once('/')
            .ok_or_else(|| DocError::Config("Invalid host/database format".to_string()))?;

        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse()
                    .map_err(|_| DocError::Config(format!("Invalid port '{}'", port)))?;
                (host, port)
            }
            None => (host_port, DEFAULT_PORT),
        };

        let mut config = Self::new(database).host(host).port(port);
        if let Some(auth) = auth {
            let (login, password) = auth
                .split_once(':')
                .ok_or_else(|| DocError::Config("Invalid credentials format".to_string()))?;
            config = config.credentials(login, password);
        }
        config.validate()?;
        Ok(config)
    }

    /// Load from a JSON settings file with a `mongo` section:
    /// `{"mongo": {"host": "..", "login": "..", "password": "..", "db": ".."}}`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| DocError::Config(format!("Failed to read '{}': {}", path.display(), e)))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let settings: SettingsFile = serde_json::from_str(text)?;
        let section = settings
            .mongo
            .ok_or_else(|| DocError::Config("Missing 'mongo' section".to_string()))?;

        let mut config = Self::new(&section.db);
        if let Some(host) = section.host {
            config = config.host(&host);
        }
        if let Some(port) = section.port {
            config = config.port(port);
        }
        // Empty credentials mean an unauthenticated connection.
        config.login = section.login.filter(|login| !login.is_empty());
        config.password = section.password.filter(|password| !password.is_empty());
        if let Some(dir) = section.data_dir {
            config = config.data_dir(dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        let auth = match &self.login {
            Some(login) => format!("{}:***@", login), // Don't expose password
            None => String::new(),
        };
        format!(
            "{}{}{}:{}/{}",
            URL_SCHEME, auth, self.host, self.port, self.database
        )
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.is_empty() {
            return Err(DocError::Config("Database name cannot be empty".to_string()));
        }

        if self.login.is_some() && self.password.is_none() {
            return Err(DocError::Config("Login given without password".to_string()));
        }

        if self.checkpoint_threshold == 0 {
            return Err(DocError::Config("checkpoint_threshold must be > 0".to_string()));
        }

        Ok(())
    }

    /// Snapshot file for this database, if persistence is configured.
    pub fn snapshot_path(&self) -> Option<PathBuf> {
        self.data_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.snapshot", self.database)))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("memodoc")
    }
}

#[derive(Deserialize)]
struct SettingsFile {
    mongo: Option<SettingsSection>,
}

#[derive(Deserialize)]
struct SettingsSection {
    #[serde(default = "default_db")]
    db: String,
    host: Option<String>,
    port: Option<u16>,
    login: Option<String>,
    password: Option<String>,
    data_dir: Option<PathBuf>,
}

fn default_db() -> String {
    "memodoc".to_string()
}
