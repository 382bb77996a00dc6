//! Configuration file loading.
//!
//! Settings live in a TOML file, by default `/usr/local/etc/cagefetch.toml`,
//! with the location overridable through `--config` or the
//! `CAGEFETCH_CONFIG` environment variable. Command-line flags are applied
//! on top by the binary.

use crate::error::{FetchError, Result};
use crate::transport::auth::AuthScheme;
use crate::transport::{BASE, DOC, LIB32, MANIFEST};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "/usr/local/etc/cagefetch.toml";

/// Environment variable naming an alternative configuration file.
pub const CONFIG_ENV: &str = "CAGEFETCH_CONFIG";

/// Which backend retrieves release files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// An FTP mirror.
    #[default]
    Ftp,
    /// A web server.
    Http,
    /// A local directory tree laid out as `<root>/<release>/<file>`.
    Local,
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// ZFS pool holding the `iocage` dataset tree.
    pub pool: String,
    /// Mountpoint of `<pool>/iocage`.
    pub iocroot: Utf8PathBuf,
    /// Release fetching.
    pub fetch: FetchSettings,
    /// Plugin provisioning.
    pub plugins: PluginSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool: "zroot".to_owned(),
            iocroot: Utf8PathBuf::from("/iocage"),
            fetch: FetchSettings::default(),
            plugins: PluginSettings::default(),
        }
    }
}

/// Settings for the release fetch pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    /// Server to fetch from; each backend has its own default.
    pub server: Option<String>,
    /// Login name for FTP and authenticated HTTP.
    pub user: String,
    /// Password for FTP and authenticated HTTP.
    pub password: String,
    /// HTTP authentication scheme, if any.
    pub auth: Option<AuthScheme>,
    /// Directory holding the release tree on the server or local disk.
    pub root_dir: Option<String>,
    /// Backend selection.
    pub transport: TransportKind,
    /// Fetch from the hardened lineage.
    pub hardened: bool,
    /// Verify TLS certificates.
    pub verify_tls: bool,
    /// Apply the latest patches after extraction.
    pub update: bool,
    /// Mark end-of-life releases in listings.
    pub eol: bool,
    /// Files that make up a release.
    pub files: Vec<String>,
    /// Machine architecture used in mirror paths.
    pub arch: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            server: None,
            user: "anonymous".to_owned(),
            password: "anonymous@".to_owned(),
            auth: None,
            root_dir: None,
            transport: TransportKind::Ftp,
            hardened: false,
            verify_tls: true,
            update: true,
            eol: true,
            files: [MANIFEST, BASE, LIB32, DOC].map(str::to_owned).to_vec(),
            arch: None,
        }
    }
}

impl FetchSettings {
    /// The configured architecture, or the host's in mirror naming.
    #[must_use]
    pub fn arch(&self) -> String {
        self.arch.clone().unwrap_or_else(host_arch)
    }
}

/// Settings for plugin provisioning.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginSettings {
    /// Git repository holding the plugin `INDEX` and descriptors.
    pub index_url: String,
    /// Branch of the index repository to track.
    pub branch: String,
    /// Jail manager command used to create, start, and destroy jails.
    pub jail_tool: String,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            index_url: "https://github.com/freenas/iocage-ix-plugins.git".to_owned(),
            branch: "master".to_owned(),
            jail_tool: "iocage".to_owned(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit path (argument first, then `CAGEFETCH_CONFIG`) must exist.
    /// When neither is given the default location is read if present, and
    /// built-in defaults are used otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the file is unreadable or invalid.
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        let from_env = std::env::var(CONFIG_ENV).ok().map(Utf8PathBuf::from);
        match explicit.map(Utf8Path::to_path_buf).or(from_env) {
            Some(path) => Self::read(&path),
            None => {
                let default = Utf8Path::new(DEFAULT_CONFIG_PATH);
                if default.is_file() {
                    Self::read(default)
                } else {
                    log::debug!("no configuration at {default}, using defaults");
                    Ok(Self::default())
                }
            }
        }
    }

    /// Read and parse one configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if the file is unreadable or invalid.
    pub fn read(path: &Utf8Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|err| FetchError::Config {
            reason: format!("cannot read {path}: {err}"),
        })?;
        Self::parse(&text).map_err(|err| FetchError::Config {
            reason: format!("{path}: {err}"),
        })
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML deserialisation error.
    pub fn parse(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// The host architecture as mirrors name it (`amd64`, `arm64`, `i386`).
#[must_use]
pub fn host_arch() -> String {
    match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        "x86" => "i386",
        "powerpc64" => "powerpc",
        other => other,
    }
    .to_owned()
}
