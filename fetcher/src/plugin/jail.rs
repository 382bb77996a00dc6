//! The jail manager seam.
//!
//! Jail lifecycle belongs to the host's jail tool; provisioning only needs
//! to create a jail with properties, read back its network settings, start
//! it, run commands inside it, and destroy it again.

use crate::command::{CommandExecutor, run_checked};
use crate::error::Result;
use cagefetch_common::Release;
use std::collections::BTreeMap;
use std::process::Output;

/// Network settings of a created jail.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JailConfig {
    /// `ip4_addr` property, `none` when unset.
    pub ip4_addr: Option<String>,
    /// `ip6_addr` property, `none` when unset.
    pub ip6_addr: Option<String>,
    /// Whether the jail asks for an address over DHCP.
    pub dhcp: bool,
    /// `interfaces` property, for example `vnet0:bridge0`.
    pub interfaces: Option<String>,
}

impl JailConfig {
    /// Parse `key:value` lines as printed by `<tool> get all`.
    #[must_use]
    pub fn from_properties(text: &str) -> Self {
        let props: BTreeMap<&str, &str> = text
            .lines()
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.trim(), value.trim()))
            .collect();
        let set = |key: &str| {
            props
                .get(key)
                .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("none"))
                .map(|value| (*value).to_owned())
        };
        let ip4_addr = set("ip4_addr");
        let dhcp = props
            .get("dhcp")
            .is_some_and(|value| matches!(value.to_ascii_lowercase().as_str(), "on" | "yes" | "1"))
            || ip4_addr
                .as_deref()
                .is_some_and(|addr| addr.to_ascii_uppercase().contains("DHCP"));

        Self {
            ip4_addr,
            ip6_addr: set("ip6_addr"),
            dhcp,
            interfaces: set("interfaces"),
        }
    }

    /// Return true when the jail has any way to reach the network.
    #[must_use]
    pub fn has_network(&self) -> bool {
        self.dhcp || self.ip4_addr.is_some() || self.ip6_addr.is_some()
    }

    /// The first static address, IPv4 preferred, without interface or mask.
    ///
    /// # Examples
    ///
    /// ```
    /// use cagefetch::plugin::jail::JailConfig;
    ///
    /// let config = JailConfig::from_properties("ip4_addr:vnet0|192.168.0.20/24\n");
    /// assert_eq!(config.static_address().as_deref(), Some("192.168.0.20"));
    /// ```
    #[must_use]
    pub fn static_address(&self) -> Option<String> {
        self.ip4_addr
            .as_deref()
            .and_then(bare_address)
            .or_else(|| self.ip6_addr.as_deref().and_then(bare_address))
    }

    /// The jail-side name of the first interface, `vnet0` by default.
    #[must_use]
    pub fn primary_interface(&self) -> String {
        self.interfaces
            .as_deref()
            .and_then(|list| list.split(',').next())
            .and_then(|pair| pair.split(':').next())
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or("vnet0")
            .to_owned()
    }
}

fn bare_address(value: &str) -> Option<String> {
    let first = value.split(',').next()?.trim();
    let address = first.rsplit_once('|').map_or(first, |(_, addr)| addr);
    let address = address.split('/').next()?.trim();
    if address.is_empty() || address.eq_ignore_ascii_case("DHCP") {
        None
    } else {
        Some(address.to_owned())
    }
}

/// Creates, runs commands in, and destroys jails.
#[cfg_attr(test, mockall::automock)]
pub trait JailManager {
    /// Create `name` from `release` with `properties`, returning its network
    /// settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the jail tool fails.
    fn create(
        &self,
        name: &str,
        release: &Release,
        properties: &[(String, String)],
    ) -> Result<JailConfig>;

    /// Start `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the jail tool fails.
    fn start(&self, name: &str) -> Result<()>;

    /// Run `command` inside `name` with extra environment variables,
    /// returning its output whatever the exit status.
    ///
    /// # Errors
    ///
    /// Returns an error only if the command cannot be spawned.
    fn exec(&self, name: &str, command: &[String], env: &[(String, String)]) -> Result<Output>;

    /// Stop and destroy `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the jail tool fails.
    fn destroy(&self, name: &str) -> Result<()>;
}

/// Drives a command-line jail tool such as `iocage`.
pub struct CommandJailManager<'a> {
    executor: &'a dyn CommandExecutor,
    tool: String,
}

impl<'a> CommandJailManager<'a> {
    /// Wrap `tool`, run through `executor`.
    #[must_use]
    pub fn new(executor: &'a dyn CommandExecutor, tool: impl Into<String>) -> Self {
        Self {
            executor,
            tool: tool.into(),
        }
    }
}

impl JailManager for CommandJailManager<'_> {
    fn create(
        &self,
        name: &str,
        release: &Release,
        properties: &[(String, String)],
    ) -> Result<JailConfig> {
        let release = release.to_string();
        let pairs: Vec<String> = properties
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        let mut args = vec!["create", "-n", name, "-r", release.as_str()];
        args.extend(pairs.iter().map(String::as_str));
        run_checked(self.executor, &self.tool, &args)?;
        log::info!("created jail {name} from {release}");

        let output = run_checked(self.executor, &self.tool, &["get", "all", name])?;
        Ok(JailConfig::from_properties(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn start(&self, name: &str) -> Result<()> {
        run_checked(self.executor, &self.tool, &["start", name]).map(drop)
    }

    fn exec(&self, name: &str, command: &[String], env: &[(String, String)]) -> Result<Output> {
        let host_name = format!("ioc-{name}");
        let mut args = vec![host_name.as_str()];
        args.extend(command.iter().map(String::as_str));
        let env: Vec<(&str, &str)> = env
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        self.executor.run_with_env("jexec", &args, &env)
    }

    fn destroy(&self, name: &str) -> Result<()> {
        run_checked(self.executor, &self.tool, &["destroy", "-f", name])?;
        log::warn!("destroyed jail {name}");
        Ok(())
    }
}
