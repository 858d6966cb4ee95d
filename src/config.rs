//! Configuration of the meshca daemon and command line tools.

use std::{
    env, fmt, io,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};

use log::{LevelFilter, error, info};
use serde::{Deserialize, Deserializer, de};
#[cfg(unix)]
use syslog::Facility;
use url::Url;

use crate::{
    ca::{self, CaOptions, PluggedCertFiles},
    commons::{error::IoError, util::{ext_serde, file}},
    constants::*,
    probe::ProbeOptions,
    secrets::SecretStore,
};

//------------ ConfigDefaults ------------------------------------------------

pub struct ConfigDefaults;

impl ConfigDefaults {
    fn storage_uri() -> Url {
        match Url::parse("local://./data") {
            Ok(uri) => uri,
            Err(e) => {
                eprintln!("Invalid default storage uri: {}", e);
                ::std::process::exit(1);
            }
        }
    }

    fn namespace() -> String {
        "istio-system".to_string()
    }

    fn organization() -> String {
        "cluster.local".to_string()
    }

    fn multicluster() -> bool {
        false
    }

    fn ca_mode() -> CaMode {
        CaMode::SelfSigned
    }

    fn root_cert_ttl_seconds() -> u64 {
        365 * 24 * 3600
    }

    fn cert_ttl_seconds() -> u64 {
        3600
    }

    fn max_cert_ttl_seconds() -> u64 {
        7 * 24 * 3600
    }

    fn liveness_probe_interval_seconds() -> u64 {
        30
    }

    fn probe_check_interval_seconds() -> u64 {
        30
    }

    fn log_level() -> LevelFilter {
        match env::var(MESHCA_ENV_LOG_LEVEL) {
            Ok(level) => match LevelFilter::from_str(&level) {
                Ok(level) => level,
                Err(_) => {
                    eprintln!(
                        "Unrecognized value for log level in env var {}",
                        MESHCA_ENV_LOG_LEVEL
                    );
                    ::std::process::exit(1);
                }
            },
            _ => LevelFilter::Info,
        }
    }

    fn log_type() -> LogType {
        LogType::Stderr
    }

    fn log_file() -> PathBuf {
        PathBuf::from("./meshca.log")
    }

    fn syslog_facility() -> String {
        "daemon".to_string()
    }
}

//------------ Config --------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(
        default = "ConfigDefaults::storage_uri",
        deserialize_with = "ext_serde::de_storage_uri"
    )]
    pub storage_uri: Url,

    #[serde(default = "ConfigDefaults::namespace")]
    pub namespace: String,

    #[serde(default = "ConfigDefaults::organization")]
    pub organization: String,

    #[serde(default = "ConfigDefaults::multicluster")]
    pub multicluster: bool,

    #[serde(default = "ConfigDefaults::ca_mode")]
    pub ca_mode: CaMode,

    #[serde(default)]
    pub signing_cert: Option<PathBuf>,

    #[serde(default)]
    pub signing_key: Option<PathBuf>,

    #[serde(default)]
    pub root_cert: Option<PathBuf>,

    #[serde(default)]
    pub cert_chain: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::root_cert_ttl_seconds")]
    pub root_cert_ttl_seconds: u64,

    #[serde(default = "ConfigDefaults::cert_ttl_seconds")]
    pub cert_ttl_seconds: u64,

    #[serde(default = "ConfigDefaults::max_cert_ttl_seconds")]
    pub max_cert_ttl_seconds: u64,

    #[serde(default)]
    pub liveness_probe_path: Option<PathBuf>,

    #[serde(default = "ConfigDefaults::liveness_probe_interval_seconds")]
    pub liveness_probe_interval_seconds: u64,

    #[serde(default = "ConfigDefaults::probe_check_interval_seconds")]
    pub probe_check_interval_seconds: u64,

    #[serde(
        default = "ConfigDefaults::log_level",
        deserialize_with = "ext_serde::de_level_filter"
    )]
    pub log_level: LevelFilter,

    #[serde(default = "ConfigDefaults::log_type")]
    pub log_type: LogType,

    #[serde(default = "ConfigDefaults::log_file")]
    pub log_file: PathBuf,

    #[serde(default = "ConfigDefaults::syslog_facility")]
    pub syslog_facility: String,
}

/// # Accessors
impl Config {
    pub fn root_cert_ttl(&self) -> Duration {
        Duration::from_secs(self.root_cert_ttl_seconds)
    }

    pub fn cert_ttl(&self) -> Duration {
        Duration::from_secs(self.cert_ttl_seconds)
    }

    pub fn max_cert_ttl(&self) -> Duration {
        Duration::from_secs(self.max_cert_ttl_seconds)
    }

    pub fn probe_check_interval(&self) -> Duration {
        Duration::from_secs(self.probe_check_interval_seconds)
    }

    pub fn liveness_probe(&self) -> Option<ProbeOptions> {
        self.liveness_probe_path.as_ref().map(|path| ProbeOptions {
            path: path.clone(),
            update_interval: Duration::from_secs(self.liveness_probe_interval_seconds),
        })
    }

    /// Returns the plugged certificate files, if all required paths are set.
    pub fn plugged_cert_files(&self) -> Option<PluggedCertFiles> {
        Some(PluggedCertFiles {
            cert_chain: self.cert_chain.clone(),
            signing_cert: self.signing_cert.clone()?,
            signing_key: self.signing_key.clone()?,
            root_cert: self.root_cert.clone()?,
        })
    }

    /// Bootstraps the CA options for the configured mode.
    pub fn ca_options(&self, store: &dyn SecretStore) -> Result<CaOptions, ConfigError> {
        let options = match self.ca_mode {
            CaMode::SelfSigned => CaOptions::new_self_signed(
                self.root_cert_ttl(),
                self.cert_ttl(),
                self.max_cert_ttl(),
                self.multicluster,
                &self.organization,
                &self.namespace,
                store,
            )?,
            CaMode::Plugged => {
                let files = self.plugged_cert_files().ok_or_else(|| {
                    ConfigError::other(
                        "signing_cert, signing_key and root_cert are required for ca_mode 'plugged'",
                    )
                })?;
                CaOptions::new_plugged_cert(
                    files,
                    self.cert_ttl(),
                    self.max_cert_ttl(),
                    self.multicluster,
                )?
            }
        };

        match self.liveness_probe() {
            Some(probe) => Ok(options.with_liveness_probe(probe, self.probe_check_interval())?),
            None => Ok(options),
        }
    }
}

/// # Create, verify and read
impl Config {
    /// Creates the config from a file, verifies it and sets up logging.
    pub fn create(config_file: &Path) -> Result<Self, ConfigError> {
        let config = Self::read_config(config_file).map_err(|e| {
            if config_file == Path::new(MESHCA_DEFAULT_CONFIG_FILE) && e.is_not_found() {
                ConfigError::other(
                    "Cannot find config file. Please use --config to specify its location.",
                )
            } else {
                ConfigError::Other(format!(
                    "Error parsing config file: {}, error: {}",
                    config_file.display(),
                    e
                ))
            }
        })?;

        config.verify().map_err(|e| {
            ConfigError::Other(format!(
                "Error parsing config file: {}, error: {}",
                config_file.display(),
                e
            ))
        })?;

        config.init_logging()?;
        info!(
            "{} uses configuration file: {}",
            MESHCA_APP,
            config_file.display()
        );
        Ok(config)
    }

    pub fn read_config(file: &Path) -> Result<Self, ConfigError> {
        let bytes = file::read(file)?;
        let s = std::str::from_utf8(&bytes)
            .map_err(|e| ConfigError::Other(format!("Config file is not UTF-8: {}", e)))?;
        Self::parse(s)
    }

    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }

    /// Returns the annotated default configuration file.
    pub fn default_file() -> &'static str {
        include_str!("../defaults/meshca.conf")
    }

    pub fn verify(&self) -> Result<(), ConfigError> {
        if self.root_cert_ttl_seconds == 0 {
            return Err(ConfigError::other("root_cert_ttl_seconds must be at least 1"));
        }

        if self.cert_ttl_seconds == 0 {
            return Err(ConfigError::other("cert_ttl_seconds must be at least 1"));
        }

        if self.max_cert_ttl_seconds == 0 {
            return Err(ConfigError::other("max_cert_ttl_seconds must be at least 1"));
        }

        if self.cert_ttl_seconds > self.max_cert_ttl_seconds {
            return Err(ConfigError::other(
                "cert_ttl_seconds must not be greater than max_cert_ttl_seconds",
            ));
        }

        if self.namespace.is_empty() {
            return Err(ConfigError::other("namespace must not be empty"));
        }

        if self.ca_mode == CaMode::Plugged && self.plugged_cert_files().is_none() {
            return Err(ConfigError::other(
                "signing_cert, signing_key and root_cert are required for ca_mode 'plugged'",
            ));
        }

        if self.probe_check_interval_seconds == 0 {
            return Err(ConfigError::other(
                "probe_check_interval_seconds must be at least 1",
            ));
        }

        if let Some(probe) = self.liveness_probe() {
            if !probe.is_valid() {
                return Err(ConfigError::other(
                    "liveness_probe_path must not be empty and liveness_probe_interval_seconds must be at least 1",
                ));
            }
        }

        Ok(())
    }
}

/// # Logging
impl Config {
    pub fn init_logging(&self) -> Result<(), ConfigError> {
        match self.log_type {
            LogType::File => self.file_logger(&self.log_file),
            LogType::Stderr => self.stderr_logger(),
            #[cfg(unix)]
            LogType::Syslog => {
                let facility = Facility::from_str(&self.syslog_facility)
                    .map_err(|_| ConfigError::other("Invalid syslog_facility"))?;
                self.syslog_logger(facility)
            }
            #[cfg(not(unix))]
            LogType::Syslog => Err(ConfigError::other(
                "syslog is not supported on this platform",
            )),
        }
    }

    /// Creates a stderr logger.
    fn stderr_logger(&self) -> Result<(), ConfigError> {
        self.fern_logger()
            .chain(io::stderr())
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init stderr logging: {}", e)))
    }

    /// Creates a file logger using the file provided by `path`.
    fn file_logger(&self, path: &Path) -> Result<(), ConfigError> {
        let file = match fern::log_file(path) {
            Ok(file) => file,
            Err(err) => {
                let error_string =
                    format!("Failed to open log file '{}': {}", path.display(), err);
                error!("{}", error_string.as_str());
                return Err(ConfigError::Other(error_string));
            }
        };
        self.fern_logger()
            .chain(file)
            .apply()
            .map_err(|e| ConfigError::Other(format!("Failed to init file logging: {}", e)))
    }

    /// Creates a syslog logger and configures correctly.
    #[cfg(unix)]
    fn syslog_logger(&self, facility: Facility) -> Result<(), ConfigError> {
        let process = env::current_exe()
            .ok()
            .and_then(|path| {
                path.file_name()
                    .and_then(std::ffi::OsStr::to_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_else(|| String::from(MESHCA_APP));
        let formatter = syslog::Formatter3164 {
            facility,
            hostname: None,
            process,
            pid: std::process::id(),
        };
        let logger = syslog::unix(formatter.clone())
            .or_else(|_| syslog::tcp(formatter.clone(), ("127.0.0.1", 601)))
            .or_else(|_| syslog::udp(formatter, ("127.0.0.1", 0), ("127.0.0.1", 514)));
        match logger {
            Ok(logger) => self
                .fern_logger()
                .chain(logger)
                .apply()
                .map_err(|e| ConfigError::Other(format!("Failed to init syslog: {}", e))),
            Err(err) => {
                let msg = format!("Cannot connect to syslog: {}", err);
                Err(ConfigError::Other(msg))
            }
        }
    }

    /// Creates and returns a fern logger with log level tweaks
    fn fern_logger(&self) -> fern::Dispatch {
        // suppress overly noisy logging
        let framework_level = self.log_level.min(LevelFilter::Warn);

        let show_target =
            self.log_level == LevelFilter::Trace || self.log_level == LevelFilter::Debug;
        fern::Dispatch::new()
            .format(move |out, message, record| {
                if show_target {
                    out.finish(format_args!(
                        "{} [{}] [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        record.target(),
                        message
                    ))
                } else {
                    out.finish(format_args!(
                        "{} [{}] {}",
                        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                        record.level(),
                        message
                    ))
                }
            })
            .level(self.log_level)
            .level_for("mio", framework_level)
            .level_for("tokio", framework_level)
            .level_for("tracing::span", framework_level)
    }
}

//------------ ConfigError ---------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    IoError(IoError),
    TomlError(toml::de::Error),
    Ca(ca::Error),
    Other(String),
}

impl ConfigError {
    pub fn other(s: &str) -> ConfigError {
        ConfigError::Other(s.to_string())
    }

    fn is_not_found(&self) -> bool {
        matches!(self, ConfigError::IoError(e) if e.kind() == io::ErrorKind::NotFound)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => e.fmt(f),
            ConfigError::TomlError(e) => e.fmt(f),
            ConfigError::Ca(e) => e.fmt(f),
            ConfigError::Other(s) => s.fmt(f),
        }
    }
}

impl From<IoError> for ConfigError {
    fn from(e: IoError) -> Self {
        ConfigError::IoError(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::TomlError(e)
    }
}

impl From<ca::Error> for ConfigError {
    fn from(e: ca::Error) -> Self {
        ConfigError::Ca(e)
    }
}

impl std::error::Error for ConfigError {}

//------------ LogType -------------------------------------------------------

/// The target to log to.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LogType {
    Stderr,
    File,
    Syslog,
}

impl<'de> Deserialize<'de> for LogType {
    fn deserialize<D>(d: D) -> Result<LogType, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "stderr" => Ok(LogType::Stderr),
            "file" => Ok(LogType::File),
            "syslog" => Ok(LogType::Syslog),
            _ => Err(de::Error::custom(format!(
                "expected \"stderr\", \"file\" or \"syslog\", found: \"{}\"",
                string
            ))),
        }
    }
}

//------------ CaMode --------------------------------------------------------

/// Where the CA gets its signing key and certificate.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CaMode {
    SelfSigned,
    Plugged,
}

impl<'de> Deserialize<'de> for CaMode {
    fn deserialize<D>(d: D) -> Result<CaMode, D::Error>
    where
        D: Deserializer<'de>,
    {
        let string = String::deserialize(d)?;
        match string.as_str() {
            "self-signed" => Ok(CaMode::SelfSigned),
            "plugged" => Ok(CaMode::Plugged),
            _ => Err(de::Error::custom(format!(
                "expected \"self-signed\" or \"plugged\", found: \"{}\"",
                string
            ))),
        }
    }
}

//------------ Tests ---------------------------------------------------------
