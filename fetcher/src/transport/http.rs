//! Web server backend.
//!
//! Lists releases by scraping anchors from the index page and streams each
//! file body to disk. The hardened lineage lives on a different server with
//! its own directory naming, handled here as well.

use super::auth::{AuthScheme, Credentials, DigestChallenge, basic_authorization};
use super::{FetchOutcome, ReleaseTransport, TransportError, is_mandatory};
use crate::config::FetchSettings;
use crate::progress::Progress;
use cagefetch_common::{Channel, Release, hardened_entry};
use camino::Utf8Path;
use regex::Regex;
use std::sync::{Once, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};
use ureq::Agent;
use ureq::http::Response;

/// Backend name used in messages.
pub const BACKEND: &str = "http";

/// Default server for the standard lineage.
pub const DEFAULT_SERVER: &str = "https://download.freebsd.org";

/// Build server for the hardened lineage.
pub const HARDENED_SERVER: &str = "http://jenkins.hardenedbsd.org";

const HARDENED_ROOT: &str = "builds";

static TLS_WARNING: Once = Once::new();

/// Fetches release files over HTTP(S).
pub struct HttpTransport {
    agent: Agent,
    server: String,
    root: String,
    arch: String,
    hardened: bool,
    credentials: Option<Credentials>,
    progress: Progress,
}

impl HttpTransport {
    /// Build the backend from fetch settings.
    #[must_use]
    pub fn from_settings(settings: &FetchSettings, progress: Progress) -> Self {
        let arch = settings.arch();
        let credentials = settings.auth.map(|scheme| Credentials {
            user: settings.user.clone(),
            password: settings.password.clone(),
            scheme,
        });

        let (server, root) = if settings.hardened {
            (
                settings.server.as_deref().unwrap_or(HARDENED_SERVER),
                HARDENED_ROOT.to_owned(),
            )
        } else {
            (
                settings.server.as_deref().unwrap_or(DEFAULT_SERVER),
                settings
                    .root_dir
                    .clone()
                    .unwrap_or_else(|| format!("ftp/releases/{arch}")),
            )
        };

        if !settings.verify_tls {
            TLS_WARNING.call_once(|| {
                log::warn!("TLS certificate verification is disabled");
            });
        }

        Self {
            agent: build_agent(settings.verify_tls),
            server: normalize_server(server, credentials.is_some()),
            root: root.trim_matches('/').to_owned(),
            arch,
            hardened: settings.hardened,
            credentials,
            progress,
        }
    }

    /// The URL of the release index page.
    #[must_use]
    pub fn index_url(&self) -> String {
        format!("{}/{}/", self.server, self.root)
    }

    /// The URL of `file` in `release`.
    #[must_use]
    pub fn file_url(&self, release: &Release, file: &str) -> String {
        if self.hardened {
            format!(
                "{}/{}/HardenedBSD-{release}-{}-LATEST/{file}",
                self.server, self.root, self.arch
            )
        } else {
            format!("{}/{}/{release}/{file}", self.server, self.root)
        }
    }

    fn get(&self, url: &str) -> Result<Response<ureq::Body>, TransportError> {
        let response = match &self.credentials {
            Some(creds) if creds.scheme == AuthScheme::Basic => self
                .agent
                .get(url)
                .header("Authorization", &basic_authorization(&creds.user, &creds.password))
                .call(),
            _ => self.agent.get(url).call(),
        }
        .map_err(protocol_error)?;

        let response = match &self.credentials {
            Some(creds) if creds.scheme == AuthScheme::Digest && response.status() == 401 => {
                self.retry_with_digest(url, creds, &response)?
            }
            _ => response,
        };

        let code = response.status().as_u16();
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(TransportError::Status {
                backend: BACKEND,
                code,
                resource: url.to_owned(),
            })
        }
    }

    fn retry_with_digest(
        &self,
        url: &str,
        creds: &Credentials,
        unauthorized: &Response<ureq::Body>,
    ) -> Result<Response<ureq::Body>, TransportError> {
        let challenge = unauthorized
            .headers()
            .get("www-authenticate")
            .and_then(|value| value.to_str().ok())
            .and_then(DigestChallenge::parse)
            .ok_or_else(|| TransportError::Protocol {
                backend: BACKEND,
                message: format!("{url} did not offer a digest challenge"),
            })?;

        let authorization = challenge.authorization(
            (&creds.user, &creds.password),
            "GET",
            request_path(url),
            &client_nonce(),
            1,
        );
        self.agent
            .get(url)
            .header("Authorization", &authorization)
            .call()
            .map_err(protocol_error)
    }

    fn download(&self, url: &str, file: &str, dest: &Utf8Path) -> Result<(), TransportError> {
        let response = self.get(url)?;
        let total = response
            .headers()
            .get("content-length")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());

        let bar = self.progress.download_bar(file, total);
        let mut reader = bar.wrap_read(response.into_body().into_reader());
        let mut out = std::fs::File::create(dest.join(file))?;
        std::io::copy(&mut reader, &mut out)?;
        bar.finish_and_clear();
        Ok(())
    }
}

impl ReleaseTransport for HttpTransport {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn channel(&self) -> Channel {
        if self.hardened {
            Channel::Stable
        } else {
            Channel::Release
        }
    }

    fn list_entries(&self) -> Result<Vec<String>, TransportError> {
        let url = self.index_url();
        let page = self
            .get(&url)?
            .into_body()
            .read_to_string()
            .map_err(protocol_error)?;
        let targets = anchor_targets(&page);

        if self.hardened {
            Ok(targets
                .iter()
                .filter(|entry| entry.contains(&self.arch))
                .filter_map(|entry| hardened_entry(entry))
                .map(|release| release.to_string())
                .collect())
        } else {
            Ok(targets)
        }
    }

    fn fetch(
        &self,
        release: &Release,
        files: &[String],
        dest: &Utf8Path,
    ) -> Result<FetchOutcome, TransportError> {
        let mut outcome = FetchOutcome::default();
        for file in files {
            let url = self.file_url(release, file);
            log::info!("fetching {url}");
            match self.download(&url, file, dest) {
                Ok(()) => {}
                Err(TransportError::Status { code: 404, .. }) if !is_mandatory(file) => {
                    log::warn!("{file} is not offered for {release}, skipping");
                    outcome.dropped.push(file.clone());
                }
                Err(err) => return Err(err),
            }
        }
        Ok(outcome)
    }
}

/// Fetch a page as text with certificate verification.
///
/// Used for pages outside the release tree, such as license texts and the
/// end-of-life advisory.
///
/// # Errors
///
/// Returns [`TransportError::Status`] for a non-success response and
/// [`TransportError::Protocol`] when the request cannot be made.
pub fn fetch_text(url: &str) -> Result<String, TransportError> {
    let response = shared_agent().get(url).call().map_err(protocol_error)?;
    if !response.status().is_success() {
        return Err(TransportError::Status {
            backend: BACKEND,
            code: response.status().as_u16(),
            resource: url.to_owned(),
        });
    }
    response
        .into_body()
        .read_to_string()
        .map_err(protocol_error)
}

/// Shared verifying agent for one-off page fetches.
fn shared_agent() -> &'static Agent {
    static AGENT: OnceLock<Agent> = OnceLock::new();
    AGENT.get_or_init(|| build_agent(true))
}

fn build_agent(verify_tls: bool) -> Agent {
    let mut builder = Agent::config_builder().http_status_as_error(false);
    if !verify_tls {
        builder = builder.tls_config(
            ureq::tls::TlsConfig::builder()
                .disable_verification(true)
                .build(),
        );
    }
    Agent::new_with_config(builder.build())
}

fn protocol_error(err: ureq::Error) -> TransportError {
    match err {
        ureq::Error::Io(io) => TransportError::Io(io),
        other => TransportError::Protocol {
            backend: BACKEND,
            message: other.to_string(),
        },
    }
}

/// Give a bare host name a scheme.
///
/// Authenticated servers default to `https://`, anonymous ones to `http://`.
#[must_use]
pub fn normalize_server(server: &str, authenticated: bool) -> String {
    let server = server.trim().trim_end_matches('/');
    if server.starts_with("http://") || server.starts_with("https://") {
        server.to_owned()
    } else if authenticated {
        format!("https://{server}")
    } else {
        format!("http://{server}")
    }
}

/// The `href` targets of every anchor in an HTML page, in document order.
#[must_use]
pub fn anchor_targets(html: &str) -> Vec<String> {
    let Some(pattern) = href_pattern() else {
        return Vec::new();
    };
    pattern
        .captures_iter(html)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)))
        .map(|target| target.as_str())
        .filter(|target| !target.is_empty())
        .map(str::to_owned)
        .collect()
}

fn href_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?i)href\s*=\s*(?:"([^"]*)"|'([^']*)'|([^"'\s>]+))"#).ok()
        })
        .as_ref()
}

/// The path and query of a URL, as digest authentication signs it.
fn request_path(url: &str) -> &str {
    let without_scheme = url.split_once("://").map_or(url, |(_, rest)| rest);
    without_scheme
        .find('/')
        .and_then(|pos| without_scheme.get(pos..))
        .unwrap_or("/")
}

fn client_nonce() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    format!("{nanos:016x}")
}
