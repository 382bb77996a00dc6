//! HTTP authentication headers.
//!
//! Basic authentication is a single encoded header. Digest authentication
//! (RFC 2617, MD5) needs the server's challenge first, so the HTTP backend
//! retries a request once after a `401` carrying a `WWW-Authenticate` header.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use md5::{Digest, Md5};
use serde::Deserialize;

/// Authentication scheme for the HTTP backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// `Authorization: Basic`.
    Basic,
    /// `Authorization: Digest`.
    Digest,
}

/// Login details for the HTTP backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// How to present them.
    pub scheme: AuthScheme,
}

/// The `Authorization` value for basic authentication.
///
/// # Examples
///
/// ```
/// use cagefetch::transport::auth::basic_authorization;
///
/// assert_eq!(
///     basic_authorization("Aladdin", "open sesame"),
///     "Basic QWxhZGRpbjpvcGVuIHNlc2FtZQ=="
/// );
/// ```
#[must_use]
pub fn basic_authorization(user: &str, password: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{password}")))
}

/// A parsed `WWW-Authenticate: Digest` challenge.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DigestChallenge {
    /// Protection space.
    pub realm: String,
    /// Server nonce.
    pub nonce: String,
    /// Opaque value echoed back unchanged.
    pub opaque: Option<String>,
    /// `auth` when the server offers it.
    pub qop: Option<String>,
    /// Hash algorithm; only MD5 is supported.
    pub algorithm: Option<String>,
}

impl DigestChallenge {
    /// Parse a `WWW-Authenticate` header value.
    ///
    /// Returns `None` unless the header is a digest challenge with a nonce
    /// whose algorithm, if named, is MD5.
    #[must_use]
    pub fn parse(header: &str) -> Option<Self> {
        let (scheme, params) = header.trim().split_once(char::is_whitespace)?;
        if !scheme.eq_ignore_ascii_case("digest") {
            return None;
        }

        let mut challenge = Self::default();
        for part in split_params(params) {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            let value = value.trim().trim_matches('"').to_owned();
            match key.trim().to_ascii_lowercase().as_str() {
                "realm" => challenge.realm = value,
                "nonce" => challenge.nonce = value,
                "opaque" => challenge.opaque = Some(value),
                "qop" => {
                    if value.split(',').any(|option| option.trim() == "auth") {
                        challenge.qop = Some("auth".to_owned());
                    }
                }
                "algorithm" => challenge.algorithm = Some(value),
                _ => {}
            }
        }

        if challenge
            .algorithm
            .as_deref()
            .is_some_and(|algorithm| !algorithm.eq_ignore_ascii_case("md5"))
        {
            return None;
        }
        (!challenge.nonce.is_empty()).then_some(challenge)
    }

    /// The `Authorization` value answering this challenge.
    #[must_use]
    pub fn authorization(
        &self,
        credentials: (&str, &str),
        method: &str,
        uri: &str,
        cnonce: &str,
        nonce_count: u32,
    ) -> String {
        let (user, password) = credentials;
        let ha1 = md5_hex(&format!("{user}:{}:{password}", self.realm));
        let ha2 = md5_hex(&format!("{method}:{uri}"));
        let nc = format!("{nonce_count:08x}");

        let response = match &self.qop {
            Some(qop) => md5_hex(&format!("{ha1}:{}:{nc}:{cnonce}:{qop}:{ha2}", self.nonce)),
            None => md5_hex(&format!("{ha1}:{}:{ha2}", self.nonce)),
        };

        let mut header = format!(
            "Digest username=\"{user}\", realm=\"{}\", nonce=\"{}\", uri=\"{uri}\", response=\"{response}\"",
            self.realm, self.nonce
        );
        if let Some(qop) = &self.qop {
            header.push_str(&format!(", qop={qop}, nc={nc}, cnonce=\"{cnonce}\""));
        }
        if let Some(opaque) = &self.opaque {
            header.push_str(&format!(", opaque=\"{opaque}\""));
        }
        if let Some(algorithm) = &self.algorithm {
            header.push_str(&format!(", algorithm={algorithm}"));
        }
        header
    }
}

/// Split challenge parameters on commas outside quoted strings.
fn split_params(params: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (idx, ch) in params.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.extend(params.get(start..idx));
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.extend(params.get(start..));
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}

fn md5_hex(input: &str) -> String {
    format!("{:x}", Md5::digest(input.as_bytes()))
}
