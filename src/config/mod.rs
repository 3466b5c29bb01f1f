use std::env;

/// Where uploaded bytes end up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    /// S3-compatible bucket (AWS, MinIO, R2...)
    S3,
    /// Process-local map, lost on restart. Development only.
    Memory,
}

impl StorageBackend {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "s3" => Some(Self::S3),
            "memory" | "mem" => Some(Self::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::S3 => write!(f, "s3"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

/// Runtime configuration for the upload server
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Database connection string (`DATABASE_URL`)
    pub database_url: Option<String>,

    /// Port for the HTTP server (default: 3333)
    pub port: u16,

    /// Storage backend: "s3" or "memory" (default: "s3")
    pub storage_backend: StorageBackend,

    /// Custom S3 endpoint, e.g. a MinIO instance. `None` uses AWS.
    pub s3_endpoint: Option<String>,
    /// S3 region (default: "us-east-1")
    pub s3_region: String,
    /// Static S3 credentials. When absent the default AWS provider chain is used.
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    /// Bucket receiving uploads (default: "uploads")
    pub s3_bucket: String,

    /// Base URL under which stored objects are publicly reachable
    pub public_base_url: String,

    /// Maximum file size in bytes (default: 10 MB)
    pub max_file_size: u64,

    /// Accepted content types, `type/*` wildcards allowed. Empty accepts anything.
    pub allowed_content_types: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 3333,
            storage_backend: StorageBackend::S3,
            s3_endpoint: None,
            s3_region: "us-east-1".to_string(),
            s3_access_key: None,
            s3_secret_key: None,
            s3_bucket: "uploads".to_string(),
            public_base_url: "http://localhost:9000/uploads".to_string(),
            max_file_size: 10 * 1024 * 1024, // 10 MB
            allowed_content_types: vec!["image/*".to_string()],
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            database_url: env::var("DATABASE_URL").ok(),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.port),

            storage_backend: env::var("STORAGE_BACKEND")
                .ok()
                .and_then(|v| StorageBackend::parse(&v))
                .unwrap_or(default.storage_backend),

            s3_endpoint: env::var("S3_ENDPOINT").ok().filter(|v| !v.is_empty()),
            s3_region: env::var("S3_REGION").unwrap_or(default.s3_region),
            s3_access_key: env::var("S3_ACCESS_KEY").ok(),
            s3_secret_key: env::var("S3_SECRET_KEY").ok(),
            s3_bucket: env::var("S3_BUCKET").unwrap_or(default.s3_bucket),

            public_base_url: env::var("PUBLIC_BASE_URL").unwrap_or(default.public_base_url),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_content_types: env::var("UPLOAD_ALLOWED_TYPES")
                .ok()
                .map(|v| parse_list(&v))
                .unwrap_or(default.allowed_content_types),
        }
    }

    /// In-memory storage and SQLite, for local runs and tests
    pub fn development() -> Self {
        Self {
            database_url: Some("sqlite::memory:".to_string()),
            storage_backend: StorageBackend::Memory,
            public_base_url: "http://localhost:3333/files".to_string(),
            ..Self::default()
        }
    }

    /// Fails when the configuration cannot possibly work
    pub fn validate(&self) -> anyhow::Result<()> {
        url::Url::parse(&self.public_base_url).map_err(|e| {
            anyhow::anyhow!("PUBLIC_BASE_URL '{}' is invalid: {}", self.public_base_url, e)
        })?;

        if self.max_file_size == 0 {
            anyhow::bail!("MAX_FILE_SIZE must be greater than zero");
        }

        if self.storage_backend == StorageBackend::S3
            && self.s3_access_key.is_some() != self.s3_secret_key.is_some()
        {
            anyhow::bail!("S3_ACCESS_KEY and S3_SECRET_KEY must be set together");
        }

        Ok(())
    }
}

fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.max_file_size, 10 * 1024 * 1024);
        assert_eq!(config.storage_backend, StorageBackend::S3);
        assert_eq!(config.allowed_content_types, vec!["image/*"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_development_config() {
        let config = AppConfig::development();
        assert_eq!(config.storage_backend, StorageBackend::Memory);
        assert_eq!(config.database_url.as_deref(), Some("sqlite::memory:"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_storage_backend_parse() {
        assert_eq!(StorageBackend::parse("S3"), Some(StorageBackend::S3));
        assert_eq!(StorageBackend::parse(" memory "), Some(StorageBackend::Memory));
        assert_eq!(StorageBackend::parse("gcs"), None);
    }

    #[test]
    fn test_parse_list() {
        assert_eq!(
            parse_list("image/PNG, image/jpeg,,"),
            vec!["image/png".to_string(), "image/jpeg".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let config = AppConfig {
            public_base_url: "not a url".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            max_file_size: 0,
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());

        let config = AppConfig {
            s3_access_key: Some("key".to_string()),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
