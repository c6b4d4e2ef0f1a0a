use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub warehouse: WarehouseConfig,
    pub storage: StorageConfig,
    pub serializer: SerializerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Warehouse connection and query safety settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub catalog: String,
    pub database: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub default_limit: i64,
    pub max_limit: i64,
    pub allow_multi_statement: bool,
}

impl WarehouseConfig {
    /// Host/port/user/catalog/database must all be present before a
    /// connection attempt is worth making. Password may be empty.
    pub fn is_configured(&self) -> bool {
        !self.host.is_empty()
            && self.port > 0
            && !self.user.is_empty()
            && !self.catalog.is_empty()
            && !self.database.is_empty()
    }
}

/// Object storage credentials and URL-signing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    pub endpoint: String,
    pub presign_expiry_secs: u64,
}

/// Field lists driving result materialization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Columns whose values are lists of object-storage references.
    pub medium_fields: Vec<String>,
    /// Alternate columns consulted when a medium field yields no signed URLs.
    pub backup_medium_fields: Vec<String>,
    /// Columns holding a root path used to resolve relative references.
    pub root_path_fields: Vec<String>,
    /// Columns eligible for JSON decoding when returned as strings.
    pub parse_json_fields: Vec<String>,
    /// Recognized storage scheme prefixes (aliases of the same remote store).
    pub storage_prefixes: Vec<String>,
    /// Prefix applied to bare backup paths before signing.
    pub default_storage_prefix: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Warehouse overrides
        if let Ok(v) = env::var("WAREHOUSE_HOST") {
            self.warehouse.host = v;
        }
        if let Ok(v) = env::var("WAREHOUSE_PORT") {
            self.warehouse.port = v.parse().unwrap_or(self.warehouse.port);
        }
        if let Ok(v) = env::var("WAREHOUSE_USER") {
            self.warehouse.user = v;
        }
        if let Ok(v) = env::var("WAREHOUSE_PASSWORD") {
            self.warehouse.password = v;
        }
        if let Ok(v) = env::var("WAREHOUSE_CATALOG") {
            self.warehouse.catalog = v;
        }
        if let Ok(v) = env::var("WAREHOUSE_DATABASE") {
            self.warehouse.database = v;
        }
        if let Ok(v) = env::var("WAREHOUSE_MAX_CONNECTIONS") {
            self.warehouse.max_connections = v.parse().unwrap_or(self.warehouse.max_connections);
        }
        if let Ok(v) = env::var("WAREHOUSE_ACQUIRE_TIMEOUT_SECS") {
            self.warehouse.acquire_timeout_secs =
                v.parse().unwrap_or(self.warehouse.acquire_timeout_secs);
        }
        if let Ok(v) = env::var("WAREHOUSE_IDLE_TIMEOUT_SECS") {
            self.warehouse.idle_timeout_secs =
                v.parse().unwrap_or(self.warehouse.idle_timeout_secs);
        }
        if let Ok(v) = env::var("WAREHOUSE_DEFAULT_LIMIT") {
            self.warehouse.default_limit = v.parse().unwrap_or(self.warehouse.default_limit);
        }
        if let Ok(v) = env::var("WAREHOUSE_MAX_LIMIT") {
            self.warehouse.max_limit = v.parse().unwrap_or(self.warehouse.max_limit);
        }
        if let Ok(v) = env::var("WAREHOUSE_ALLOW_MULTI_STATEMENT") {
            self.warehouse.allow_multi_statement =
                v.parse().unwrap_or(self.warehouse.allow_multi_statement);
        }

        // Storage overrides
        if let Ok(v) = env::var("STORAGE_ACCESS_KEY") {
            self.storage.access_key = v;
        }
        if let Ok(v) = env::var("STORAGE_SECRET_KEY") {
            self.storage.secret_key = v;
        }
        if let Ok(v) = env::var("STORAGE_REGION") {
            self.storage.region = v;
        }
        if let Ok(v) = env::var("STORAGE_ENDPOINT") {
            self.storage.endpoint = v;
        }
        if let Ok(v) = env::var("STORAGE_PRESIGN_EXPIRY_SECS") {
            self.storage.presign_expiry_secs =
                v.parse().unwrap_or(self.storage.presign_expiry_secs);
        }

        // Serializer overrides (comma-separated lists)
        if let Ok(v) = env::var("SERIALIZER_MEDIUM_FIELDS") {
            self.serializer.medium_fields = split_csv(&v);
        }
        if let Ok(v) = env::var("SERIALIZER_BACKUP_MEDIUM_FIELDS") {
            self.serializer.backup_medium_fields = split_csv(&v);
        }
        if let Ok(v) = env::var("SERIALIZER_ROOT_PATH_FIELDS") {
            self.serializer.root_path_fields = split_csv(&v);
        }
        if let Ok(v) = env::var("SERIALIZER_PARSE_JSON_FIELDS") {
            self.serializer.parse_json_fields = split_csv(&v);
        }
        if let Ok(v) = env::var("SERIALIZER_DEFAULT_STORAGE_PREFIX") {
            self.serializer.default_storage_prefix = v;
        }

        self
    }

    fn serializer_defaults() -> SerializerConfig {
        let medium_fields: Vec<String> = ["image", "images", "video", "videos", "audio", "audios"]
            .iter()
            .map(|s| s.to_string())
            .collect();

        let mut parse_json_fields = medium_fields.clone();
        parse_json_fields.extend(
            ["relative_image", "conversations", "meta_data"]
                .iter()
                .map(|s| s.to_string()),
        );

        SerializerConfig {
            medium_fields,
            backup_medium_fields: vec![
                "absolute_image".to_string(),
                "absolute_images".to_string(),
                "absolute_video".to_string(),
                "absolute_videos".to_string(),
                "absolute_audio".to_string(),
                "absolute_audios".to_string(),
            ],
            root_path_fields: vec!["src_root_path".to_string(), "root_path".to_string()],
            parse_json_fields,
            storage_prefixes: vec!["s3://".to_string(), "bos://".to_string()],
            default_storage_prefix: "bos://".to_string(),
        }
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            warehouse: WarehouseConfig {
                host: String::new(),
                port: 0,
                user: String::new(),
                password: String::new(),
                catalog: String::new(),
                database: String::new(),
                max_connections: 10,
                acquire_timeout_secs: 30,
                idle_timeout_secs: 600,
                default_limit: 1000,
                max_limit: 1000,
                allow_multi_statement: false,
            },
            storage: StorageConfig {
                access_key: String::new(),
                secret_key: String::new(),
                region: "us-east-1".to_string(),
                endpoint: String::new(),
                presign_expiry_secs: 2 * 24 * 60 * 60,
            },
            serializer: Self::serializer_defaults(),
        }
    }

    fn staging() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Staging;
        config.warehouse.max_connections = 20;
        config.warehouse.acquire_timeout_secs = 10;
        config.warehouse.default_limit = 500;
        config
    }

    fn production() -> Self {
        let mut config = Self::development();
        config.environment = Environment::Production;
        config.warehouse.max_connections = 50;
        config.warehouse.acquire_timeout_secs = 5;
        config.warehouse.idle_timeout_secs = 300;
        config
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
