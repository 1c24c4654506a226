use anyhow::{bail, Context, Result};
use api_ingress::ApiIngressConfig;
use grpc_hub::GrpcHubConfig;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Application configuration: typed global sections plus a per-module bag.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Base directory for relative log file paths.
    #[serde(default = "default_home_dir")]
    pub home_dir: String,
    /// HTTP host settings.
    #[serde(default)]
    pub server: ApiIngressConfig,
    /// PostgreSQL connection; absent means the server needs `--mock`.
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
    /// gRPC host settings; absent disables the gRPC listener.
    #[serde(default)]
    pub grpc: Option<GrpcHubConfig>,
    #[serde(default)]
    pub auth: AuthConfig,
    /// Logging configuration (optional, uses defaults if None).
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
    /// Per-module configuration bag: module_name → arbitrary JSON/YAML value.
    #[serde(default)]
    pub modules: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// Full connection string; `${VAR}` references are expanded from the environment.
    #[serde(default)]
    pub dsn: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub user: Option<String>,
    /// Literal password or `${VAR}`.
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub dbname: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_acquire_timeout", with = "humantime_serde")]
    pub acquire_timeout: Duration,
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    /// HS256 signing secret, literal or `${VAR}`.
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl", with = "humantime_serde")]
    pub token_ttl: Duration,
}

/// Logging configuration - maps subsystem names to their logging settings.
/// Key "default" is the catch-all for logs that don't match explicit subsystems.
pub type LoggingConfig = HashMap<String, Section>;

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Section {
    pub console_level: String, // "info", "debug", "error", "off"
    #[serde(default)]
    pub file: String, // "logs/pvz.log"; empty disables the file sink
    #[serde(default)]
    pub file_level: String,
    #[serde(default)]
    pub max_age_days: Option<u32>,
    #[serde(default)]
    pub max_backups: Option<usize>,
    #[serde(default)]
    pub max_size_mb: Option<u64>,
}

fn default_home_dir() -> String {
    ".".to_string()
}

fn default_max_connections() -> u32 {
    10
}

fn default_acquire_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_token_ttl() -> Duration {
    Duration::from_secs(24 * 60 * 60)
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl: default_token_ttl(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            dsn: None,
            host: None,
            port: None,
            user: None,
            password: None,
            dbname: None,
            params: HashMap::new(),
            max_connections: default_max_connections(),
            acquire_timeout: default_acquire_timeout(),
        }
    }
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &redact_secret(&self.jwt_secret))
            .field("token_ttl", &self.token_ttl)
            .finish()
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("dsn", &self.dsn.as_deref().map(redact_dsn))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_deref().map(redact_secret))
            .field("dbname", &self.dbname)
            .field("params", &self.params)
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish()
    }
}

/// Create a default logging configuration.
pub fn default_logging_config() -> LoggingConfig {
    let mut logging = HashMap::new();
    logging.insert(
        "default".to_string(),
        Section {
            console_level: "info".to_string(),
            file: "logs/pvz.log".to_string(),
            file_level: "debug".to_string(),
            max_age_days: Some(7),
            max_backups: Some(3),
            max_size_mb: Some(100),
        },
    );
    logging
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            home_dir: default_home_dir(),
            server: ApiIngressConfig::default(),
            database: None,
            grpc: None,
            auth: AuthConfig::default(),
            logging: Some(default_logging_config()),
            modules: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Load configuration with layered loading: defaults → YAML file → environment variables.
    pub fn load_layered<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        use figment::{
            providers::{Env, Format, Serialized, Yaml},
            Figment,
        };

        let path = config_path.as_ref();
        if !path.is_file() {
            bail!("config file not found: {}", path.display());
        }

        // Optional sections stay None unless YAML or ENV provides them.
        let base = AppConfig {
            logging: None,
            ..AppConfig::default()
        };

        let figment = Figment::new()
            .merge(Serialized::defaults(base))
            .merge(Yaml::file(path))
            // Example: APP__SERVER__BIND_ADDR=0.0.0.0:8080 maps to server.bind_addr
            .merge(Env::prefixed("APP__").split("__"));

        let mut config: AppConfig = figment
            .extract()
            .with_context(|| format!("failed to load config from {}", path.display()))?;

        config.normalize_home_dir()?;
        Ok(config)
    }

    /// Load configuration from file or fall back to defaults.
    pub fn load_or_default<P: AsRef<Path>>(config_path: Option<P>) -> Result<Self> {
        match config_path {
            Some(path) => Self::load_layered(path),
            None => {
                let mut c = Self::default();
                c.normalize_home_dir()?;
                Ok(c)
            }
        }
    }

    /// Serialize configuration to YAML with secrets masked.
    pub fn to_yaml(&self) -> Result<String> {
        let mut masked = self.clone();
        masked.auth.jwt_secret = redact_secret(&masked.auth.jwt_secret);
        if let Some(db) = masked.database.as_mut() {
            db.dsn = db.dsn.as_deref().map(redact_dsn);
            db.password = db.password.as_deref().map(redact_secret);
        }
        serde_yaml::to_string(&masked).context("Failed to serialize config to YAML")
    }

    /// Apply overrides from command line arguments.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(port) = args.port {
            self.server.bind_addr = with_port(&self.server.bind_addr, port);
        }

        // Set logging level based on verbose flags for "default" section.
        let logging = self.logging.get_or_insert_with(default_logging_config);
        if let Some(default_section) = logging.get_mut("default") {
            default_section.console_level = match args.verbose {
                0 => default_section.console_level.clone(), // keep
                1 => "debug".to_string(),
                _ => "trace".to_string(),
            };
        }
    }

    /// Typed view of `modules.<name>`; a missing entry yields the defaults.
    pub fn module_config<T>(&self, name: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        match self.modules.get(name) {
            Some(raw) => serde_json::from_value(raw.clone())
                .with_context(|| format!("invalid config for module '{name}'")),
            None => Ok(T::default()),
        }
    }

    fn normalize_home_dir(&mut self) -> Result<()> {
        let dir = if self.home_dir.trim().is_empty() {
            PathBuf::from(".")
        } else {
            PathBuf::from(&self.home_dir)
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create home_dir {}", dir.display()))?;
        let dir = dir
            .canonicalize()
            .with_context(|| format!("failed to resolve home_dir {}", dir.display()))?;
        self.home_dir = dir.to_string_lossy().to_string();
        Ok(())
    }
}

impl AuthConfig {
    /// The signing secret with `${VAR}` references expanded; empty is an error.
    pub fn resolve_secret(&self) -> Result<String> {
        let secret = expand_env_vars(&self.jwt_secret).context("auth.jwt_secret")?;
        if secret.is_empty() {
            bail!("auth.jwt_secret must be set");
        }
        Ok(secret)
    }
}

impl DatabaseConfig {
    /// Final connection string: the DSN (if any) with individual fields overriding its parts.
    pub fn resolve_dsn(&self) -> Result<String> {
        let password = resolve_password(self.password.as_deref())?;

        let dsn = match &self.dsn {
            Some(raw) => {
                let expanded = expand_env_vars(raw)?;
                validate_dsn(&expanded)?;
                let mut url = Url::parse(&expanded)
                    .map_err(|e| anyhow::anyhow!("Invalid DSN '{}': {}", redact_dsn(&expanded), e))?;
                self.override_parts(&mut url, password.as_deref())?;
                url.to_string()
            }
            None => build_server_dsn(
                "postgresql",
                self.host.as_deref(),
                self.port,
                self.user.as_deref(),
                password.as_deref(),
                self.dbname.as_deref(),
                &self.params,
            )?,
        };

        let dbname_missing = Url::parse(&dsn)
            .map(|u| u.path().trim_start_matches('/').is_empty())
            .unwrap_or(true);
        if dbname_missing {
            bail!("database config missing required 'dbname'");
        }

        validate_dsn(&dsn)?;
        tracing::debug!(dsn = %redact_dsn(&dsn), "database DSN resolved");
        Ok(dsn)
    }

    fn override_parts(&self, url: &mut Url, password: Option<&str>) -> Result<()> {
        if let Some(host) = &self.host {
            url.set_host(Some(host))
                .with_context(|| format!("Invalid host: {}", host))?;
        }
        if let Some(port) = self.port {
            url.set_port(Some(port))
                .map_err(|_| anyhow::anyhow!("Invalid port: {}", port))?;
        }
        if let Some(user) = &self.user {
            url.set_username(user)
                .map_err(|_| anyhow::anyhow!("Failed to set username: {}", user))?;
        }
        if let Some(password) = password {
            url.set_password(Some(password))
                .map_err(|_| anyhow::anyhow!("Failed to set password"))?;
        }
        if let Some(dbname) = &self.dbname {
            url.set_path(&format!("/{}", urlencoding::encode(dbname)));
        }
        if !self.params.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &self.params {
                pairs.append_pair(key, value);
            }
        }
        Ok(())
    }
}

/// Command line arguments structure.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    pub config: Option<String>,
    pub port: Option<u16>,
    pub print_config: bool,
    pub verbose: u8,
    pub mock: bool,
}

fn with_port(bind_addr: &str, port: u16) -> String {
    match bind_addr.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{bind_addr}:{port}"),
    }
}

/// Replaces every `${VARNAME}` with the environment value.
/// Returns error if any referenced env var is missing.
pub fn expand_env_vars(raw: &str) -> Result<String> {
    let re = regex::Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")?;
    let mut result = raw.to_string();
    for cap in re.captures_iter(raw) {
        let full_match = &cap[0];
        let var_name = &cap[1];
        let value = std::env::var(var_name)
            .with_context(|| format!("Environment variable '{}' not found", var_name))?;
        result = result.replace(full_match, &value);
    }
    Ok(result)
}

/// Resolves password: `${VAR}` comes from the environment, anything else is literal.
pub fn resolve_password(password: Option<&str>) -> Result<Option<String>> {
    let Some(pwd) = password else {
        return Ok(None);
    };
    match pwd.strip_prefix("${").and_then(|p| p.strip_suffix('}')) {
        Some(var_name) => {
            let resolved = std::env::var(var_name).with_context(|| {
                format!("Environment variable '{}' not found for password", var_name)
            })?;
            Ok(Some(resolved))
        }
        None => Ok(Some(pwd.to_string())),
    }
}

/// Validates that a DSN string is parseable by the dsn crate.
pub fn validate_dsn(dsn: &str) -> Result<()> {
    dsn::parse(dsn).map_err(|e| anyhow::anyhow!("Invalid DSN '{}': {}", redact_dsn(dsn), e))?;
    Ok(())
}

/// Builds a server DSN from individual fields.
/// Uses url::Url to properly handle percent-encoding of special characters.
pub fn build_server_dsn(
    scheme: &str,
    host: Option<&str>,
    port: Option<u16>,
    user: Option<&str>,
    password: Option<&str>,
    dbname: Option<&str>,
    params: &HashMap<String, String>,
) -> Result<String> {
    let host = host.unwrap_or("localhost");
    let user = user.unwrap_or("postgres");

    let mut url = Url::parse(&format!("{}://dummy/", scheme))
        .with_context(|| format!("Invalid scheme: {}", scheme))?;

    url.set_host(Some(host))
        .with_context(|| format!("Invalid host: {}", host))?;

    if let Some(port) = port {
        url.set_port(Some(port))
            .map_err(|_| anyhow::anyhow!("Invalid port: {}", port))?;
    }

    url.set_username(user)
        .map_err(|_| anyhow::anyhow!("Failed to set username: {}", user))?;

    if let Some(password) = password {
        url.set_password(Some(password))
            .map_err(|_| anyhow::anyhow!("Failed to set password"))?;
    }

    match dbname {
        Some(dbname) => url.set_path(&format!("/{}", urlencoding::encode(dbname))),
        None => url.set_path("/"),
    }

    if !params.is_empty() {
        let mut query_pairs = url.query_pairs_mut();
        for (key, value) in params {
            query_pairs.append_pair(key, value);
        }
    }

    Ok(url.to_string())
}

/// DSN with its password replaced by `***`, for logs and `--print-config`.
pub fn redact_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) if url.password().is_some() && !dsn.contains("${") => {
            let _ = url.set_password(Some("***"));
            url.to_string()
        }
        _ => dsn.to_string(),
    }
}

fn redact_secret(secret: &str) -> String {
    if secret.is_empty() || secret.starts_with("${") {
        secret.to_string()
    } else {
        "***".to_string()
    }
}
