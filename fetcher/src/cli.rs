//! CLI argument definitions for cagefetch.
//!
//! Flags given here override the configuration file; see
//! [`FetchArgs::apply`].

use crate::config::{Config, TransportKind};
use crate::transport::auth::AuthScheme;
use cagefetch_common::Release;
use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};

/// Fetch base-system releases and provision plugin jails.
#[derive(Parser, Debug)]
#[command(name = "cagefetch")]
#[command(version, about)]
#[command(after_help = concat!(
    "EXAMPLES:\n",
    "  Pick a release from the default mirror:\n",
    "    $ cagefetch fetch\n\n",
    "  Fetch a release over HTTP without patching it:\n",
    "    $ cagefetch fetch --http -r 11.2-RELEASE --no-update\n\n",
    "  Install from a local tree laid out as <root>/<release>/<file>:\n",
    "    $ cagefetch fetch --local --root-dir /srv/dist -r 11.2-RELEASE\n\n",
    "  Provision a plugin from the index:\n",
    "    $ cagefetch plugin plexmediaserver -p ip4_addr='vnet0|10.0.0.5/24'\n\n",
    "  List the plugin index:\n",
    "    $ cagefetch plugins --list --header\n",
))]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file [default: /usr/local/etc/cagefetch.toml].
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<Utf8PathBuf>,

    /// Only show warnings and errors.
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Show debugging output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Fetch, verify, and extract a release.
    Fetch(FetchArgs),

    /// Provision one plugin from a descriptor.
    Plugin(PluginArgs),

    /// Browse the plugin index and provision a choice.
    Plugins(PluginsArgs),
}

/// Arguments for `fetch`.
#[derive(Args, Debug, Clone, Default)]
pub struct FetchArgs {
    /// Release to fetch; asks interactively when omitted.
    #[arg(short, long, value_name = "RELEASE")]
    pub release: Option<Release>,

    /// List available releases and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Fetch over HTTP.
    #[arg(long, conflicts_with_all = ["ftp", "local"])]
    pub http: bool,

    /// Fetch over FTP.
    #[arg(long, conflicts_with = "local")]
    pub ftp: bool,

    /// Copy from a local directory tree.
    #[arg(long)]
    pub local: bool,

    /// Server to fetch from.
    #[arg(short, long, value_name = "HOST")]
    pub server: Option<String>,

    /// User for authenticated servers.
    #[arg(short, long)]
    pub user: Option<String>,

    /// Password for authenticated servers.
    #[arg(long)]
    pub password: Option<String>,

    /// HTTP authentication scheme.
    #[arg(long, value_enum)]
    pub auth: Option<AuthScheme>,

    /// Directory on the server, or the local source root.
    #[arg(short = 'd', long, value_name = "DIR")]
    pub root_dir: Option<String>,

    /// Fetch from the hardened lineage.
    #[arg(long)]
    pub hardened: bool,

    /// Do not verify TLS certificates.
    #[arg(long)]
    pub no_verify_tls: bool,

    /// Do not apply patches after extraction.
    #[arg(long)]
    pub no_update: bool,

    /// Do not mark end-of-life releases.
    #[arg(long)]
    pub no_eol: bool,

    /// Files to fetch instead of the standard set.
    #[arg(short = 'F', long, num_args = 1.., value_name = "FILE")]
    pub files: Vec<String>,
}

impl FetchArgs {
    /// The transport the flags select, if any.
    #[must_use]
    pub fn transport(&self) -> Option<TransportKind> {
        if self.http {
            Some(TransportKind::Http)
        } else if self.ftp {
            Some(TransportKind::Ftp)
        } else if self.local {
            Some(TransportKind::Local)
        } else {
            None
        }
    }

    /// Apply these flags on top of `config`.
    ///
    /// # Examples
    ///
    /// ```
    /// use cagefetch::cli::FetchArgs;
    /// use cagefetch::config::{Config, TransportKind};
    ///
    /// let mut config = Config::default();
    /// let args = FetchArgs { http: true, no_update: true, ..FetchArgs::default() };
    /// args.apply(&mut config);
    /// assert_eq!(config.fetch.transport, TransportKind::Http);
    /// assert!(!config.fetch.update);
    /// ```
    pub fn apply(&self, config: &mut Config) {
        let fetch = &mut config.fetch;
        if let Some(transport) = self.transport() {
            fetch.transport = transport;
        }
        if let Some(server) = &self.server {
            fetch.server = Some(server.clone());
        }
        if let Some(user) = &self.user {
            fetch.user.clone_from(user);
        }
        if let Some(password) = &self.password {
            fetch.password.clone_from(password);
        }
        if self.auth.is_some() {
            fetch.auth = self.auth;
        }
        if let Some(root_dir) = &self.root_dir {
            fetch.root_dir = Some(root_dir.clone());
        }
        if !self.files.is_empty() {
            fetch.files.clone_from(&self.files);
        }
        fetch.hardened |= self.hardened;
        fetch.verify_tls &= !self.no_verify_tls;
        fetch.update &= !self.no_update;
        fetch.eol &= !self.no_eol;
    }
}

/// Arguments shared by the plugin commands.
#[derive(Args, Debug, Clone, Default)]
pub struct ProvisionArgs {
    /// Jail property as key=value (repeatable).
    #[arg(short = 'p', long = "property", value_name = "KEY=VALUE", value_parser = parse_property)]
    pub properties: Vec<(String, String)>,

    /// Jail name [default: the plugin's package name].
    #[arg(short, long)]
    pub name: Option<String>,

    /// Accept license terms without asking.
    #[arg(long)]
    pub accept_license: bool,

    /// Provision on the hardened lineage.
    #[arg(long)]
    pub hardened: bool,
}

/// Arguments for `plugin`.
#[derive(Args, Debug, Clone)]
pub struct PluginArgs {
    /// Plugin name in the index, or a descriptor path ending in `.json`.
    #[arg(value_name = "NAME|PATH.json")]
    pub reference: String,

    /// Provisioning options.
    #[command(flatten)]
    pub provision: ProvisionArgs,
}

/// Arguments for `plugins`.
#[derive(Args, Debug, Clone, Default)]
pub struct PluginsArgs {
    /// Plugin to provision; asks interactively when omitted.
    #[arg(value_name = "NAME")]
    pub reference: Option<String>,

    /// List the index and exit.
    #[arg(short, long)]
    pub list: bool,

    /// Show the listing as a table with headers.
    #[arg(short = 'H', long, requires = "list")]
    pub header: bool,

    /// Do not shorten table columns.
    #[arg(long, requires = "header")]
    pub long: bool,

    /// Show the listing as JSON.
    #[arg(long, requires = "list", conflicts_with = "header")]
    pub json: bool,

    /// Provisioning options.
    #[command(flatten)]
    pub provision: ProvisionArgs,
}

fn parse_property(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_owned(), value.to_owned()))
        }
        _ => Err(format!("expected KEY=VALUE, got {raw:?}")),
    }
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
