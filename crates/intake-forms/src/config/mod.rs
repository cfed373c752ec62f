use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    /// Whether raw upstream error messages may be returned to clients.
    pub fn discloses_errors(self) -> bool {
        !matches!(self, Self::Production)
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub intake: IntakeConfig,
    pub staff_auth: Option<StaffAuthConfig>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .or_else(|_| env::var("PORT"))
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let database = DatabaseConfig {
            uri: optional_var("DB_URI"),
            database: env::var("DB_NAME").unwrap_or_else(|_| "Cluster0".to_string()),
            forms_collection: env::var("DB_COLLECTION")
                .unwrap_or_else(|_| "intakeforms".to_string()),
            users_collection: env::var("DB_USERS_COLLECTION")
                .unwrap_or_else(|_| "users".to_string()),
        };

        let storage = StorageConfig {
            bucket: optional_var("STORAGE_BUCKET"),
            region: env::var("STORAGE_REGION").unwrap_or_else(|_| "nyc3".to_string()),
            domain: env::var("STORAGE_DOMAIN")
                .unwrap_or_else(|_| "digitaloceanspaces.com".to_string()),
            access_key_id: optional_var("STORAGE_ACCESS_KEY_ID"),
            secret_access_key: optional_var("STORAGE_SECRET_ACCESS_KEY"),
        };

        let intake = IntakeConfig {
            upload_dir: optional_var("INTAKE_UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("intake-uploads")),
            max_upload_bytes: env::var("INTAKE_MAX_UPLOAD_BYTES")
                .unwrap_or_else(|_| "20971520".to_string())
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidUploadLimit)?,
            dob_policy: DobPolicy::parse(
                &env::var("INTAKE_DOB_POLICY").unwrap_or_else(|_| "lenient".to_string()),
            )?,
            orphan_policy: OrphanPolicy::parse(
                &env::var("INTAKE_ORPHAN_POLICY").unwrap_or_else(|_| "retain".to_string()),
            )?,
        };

        let staff_auth = optional_var("GOOGLE_CLIENT_ID").map(|client_id| StaffAuthConfig {
            client_id,
            allowed_emails: env::var("STAFF_ALLOWED_EMAILS")
                .unwrap_or_default()
                .split(',')
                .map(|email| email.trim().to_ascii_lowercase())
                .filter(|email| !email.is_empty())
                .collect(),
        });

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            database,
            storage,
            intake,
            staff_auth,
        })
    }
}

fn optional_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Document store location. The URI is only required by commands that touch the store.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub uri: Option<String>,
    pub database: String,
    pub forms_collection: String,
    pub users_collection: String,
}

impl DatabaseConfig {
    pub fn require_uri(&self) -> Result<&str, ConfigError> {
        self.uri.as_deref().ok_or(ConfigError::Missing("DB_URI"))
    }
}

/// S3-compatible bucket settings.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub bucket: Option<String>,
    pub region: String,
    pub domain: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl StorageConfig {
    pub fn require_bucket(&self) -> Result<&str, ConfigError> {
        self.bucket
            .as_deref()
            .ok_or(ConfigError::Missing("STORAGE_BUCKET"))
    }

    pub fn require_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let key = self
            .access_key_id
            .as_deref()
            .ok_or(ConfigError::Missing("STORAGE_ACCESS_KEY_ID"))?;
        let secret = self
            .secret_access_key
            .as_deref()
            .ok_or(ConfigError::Missing("STORAGE_SECRET_ACCESS_KEY"))?;
        Ok((key, secret))
    }
}

/// Knobs for the submission write path.
#[derive(Debug, Clone)]
pub struct IntakeConfig {
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub dob_policy: DobPolicy,
    pub orphan_policy: OrphanPolicy,
}

/// How an unparseable date of birth is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DobPolicy {
    /// Store the submission with an invalid-date marker.
    #[default]
    Lenient,
    /// Reject the submission as a client error before any upload.
    Strict,
}

impl DobPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "lenient" => Ok(Self::Lenient),
            "strict" => Ok(Self::Strict),
            other => Err(ConfigError::InvalidPolicy {
                key: "INTAKE_DOB_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

/// What happens to already uploaded objects when a later submission step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrphanPolicy {
    #[default]
    Retain,
    Cleanup,
}

impl OrphanPolicy {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "cleanup" => Ok(Self::Cleanup),
            other => Err(ConfigError::InvalidPolicy {
                key: "INTAKE_ORPHAN_POLICY",
                value: other.to_string(),
            }),
        }
    }
}

/// Google sign-in settings for staff users.
#[derive(Debug, Clone)]
pub struct StaffAuthConfig {
    pub client_id: String,
    pub allowed_emails: Vec<String>,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidUploadLimit,
    InvalidPolicy { key: &'static str, value: String },
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidUploadLimit => {
                write!(f, "INTAKE_MAX_UPLOAD_BYTES must be a positive integer")
            }
            ConfigError::InvalidPolicy { key, value } => {
                write!(f, "{key} does not accept '{value}'")
            }
            ConfigError::Missing(key) => write!(f, "{key} must be set"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidUploadLimit
            | ConfigError::InvalidPolicy { .. }
            | ConfigError::Missing(_) => None,
        }
    }
}
