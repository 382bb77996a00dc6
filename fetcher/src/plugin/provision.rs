//! Plugin provisioning.
//!
//! One descriptor becomes one jail. The jail is created from the plugin's
//! release, given trusted package repositories, has its packages installed,
//! receives the artifact overlay, and runs the artifact's post-install
//! script. Any failure or interrupt after the jail exists destroys it before
//! the error is returned.

use super::descriptor::PluginDescriptor;
use super::index::PluginIndex;
use super::jail::{JailConfig, JailManager};
use super::repos::write_repositories;
use crate::command::{CommandExecutor, failure_message};
use crate::dataset::DatasetLayout;
use crate::error::{FetchError, Result};
use crate::fetch::{FetchRequest, Fetcher};
use crate::git::GitClient;
use crate::interrupt::InterruptFlag;
use cagefetch_common::Release;
use camino::{Utf8Path, Utf8PathBuf};
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Branch of the artifact repository that is cloned.
pub const ARTIFACT_BRANCH: &str = "master";

/// Environment variable carrying the plugin's address into `post_install.sh`.
pub const PLUGIN_IP_ENV: &str = "IOCAGE_PLUGIN_IP";

const POST_INSTALL: &str = "post_install.sh";
const PORTAL_PLACEHOLDER: &str = "%%IP%%";

/// Makes a release available before a jail is created from it.
#[cfg_attr(test, mockall::automock)]
pub trait ReleaseProvider {
    /// Fetch `release` if it is not already extracted.
    ///
    /// # Errors
    ///
    /// Returns the fetch error.
    fn fetch_release(&self, release: &Release) -> Result<()>;
}

impl ReleaseProvider for Fetcher<'_> {
    fn fetch_release(&self, release: &Release) -> Result<()> {
        self.fetch(&FetchRequest::new(release.clone())).map(drop)
    }
}

/// Asks the operator to accept license terms.
#[cfg_attr(test, mockall::automock)]
pub trait LicensePrompt {
    /// Show the terms at `license` for `plugin`; true means accepted.
    ///
    /// # Errors
    ///
    /// Returns an error if the terms cannot be shown or the answer read.
    fn review(&self, plugin: &str, license: &str) -> Result<bool>;
}

/// What to provision.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvisionRequest {
    /// Plugin name in the index, or a path to a descriptor ending in `.json`.
    pub reference: String,
    /// Jail name; the plugin's package name when absent.
    pub name: Option<String>,
    /// Caller properties, taking precedence over the descriptor's.
    pub properties: Vec<(String, String)>,
    /// Accept license terms without asking.
    pub accept_license: bool,
}

/// The provisioned plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Name of the created jail.
    pub jail: String,
    /// Release the jail was created from.
    pub release: Release,
    /// Patch-level userland version recorded on the jail.
    pub userland: String,
    /// Address the plugin is reachable at, when known.
    pub address: Option<String>,
    /// Administrative portal URL, when the plugin declares one.
    pub admin_portal: Option<String>,
    /// Whether packages installed; nothing after that step ran otherwise.
    pub packages_installed: bool,
}

/// Provisions plugin jails.
pub struct Provisioner<'a> {
    /// Filesystem layout of the pool.
    pub layout: &'a DatasetLayout,
    /// Fetches releases on demand.
    pub releases: &'a dyn ReleaseProvider,
    /// Jail lifecycle.
    pub jails: &'a dyn JailManager,
    /// Host commands (`kldload`).
    pub executor: &'a dyn CommandExecutor,
    /// Clones artifacts.
    pub git: &'a dyn GitClient,
    /// Asks for license acceptance.
    pub licenses: &'a dyn LicensePrompt,
    /// Raised on SIGINT.
    pub interrupt: &'a InterruptFlag,
    /// Catalogue used for license lookups, when synced.
    pub index: Option<&'a PluginIndex>,
    /// Move plugins onto the hardened lineage.
    pub hardened: bool,
}

impl Provisioner<'_> {
    /// Provision the plugin `request` names.
    ///
    /// # Errors
    ///
    /// Returns the first failure. Once the jail has been created, it is
    /// destroyed before the error is returned.
    pub fn provision(&self, request: &ProvisionRequest) -> Result<ProvisionReport> {
        let index_dir = self.layout.plugin_index_dir();
        let path = PluginDescriptor::resolve_path(&request.reference, &index_dir);
        let descriptor = PluginDescriptor::load(&path)?.for_lineage(self.hardened);
        let jail = request
            .name
            .clone()
            .unwrap_or_else(|| descriptor.license_key());

        log::info!(
            "plugin {}: release {}, artifact {}, packages {}",
            descriptor.name,
            descriptor.release,
            descriptor.artifact,
            descriptor.pkgs.join(" ")
        );
        self.accept_license(&descriptor, request.accept_license)?;

        self.interrupt.check(&jail)?;
        let userland = self.resolve_userland(&descriptor.release, &jail)?;
        let properties = merge_properties(
            &request.properties,
            &descriptor.property_pairs(),
            &descriptor.release,
            &userland,
        );

        self.interrupt.check(&jail)?;
        let config = self
            .jails
            .create(&jail, &descriptor.release, &properties)
            .map_err(|err| FetchError::Provisioning {
                jail: jail.clone(),
                reason: err.to_string(),
            })?;

        match self.populate(&descriptor, &jail, &config) {
            Ok(outcome) => Ok(ProvisionReport {
                jail,
                release: descriptor.release,
                userland,
                address: outcome.address,
                admin_portal: outcome.admin_portal,
                packages_installed: outcome.packages_installed,
            }),
            Err(err) => {
                if let Err(destroy_err) = self.jails.destroy(&jail) {
                    log::error!("could not destroy partial plugin {jail}: {destroy_err}");
                }
                Err(err)
            }
        }
    }

    fn accept_license(&self, descriptor: &PluginDescriptor, pre_accepted: bool) -> Result<()> {
        let key = descriptor.license_key();
        let license = descriptor
            .license
            .as_deref()
            .or_else(|| self.index.and_then(|index| index.license_for(&key)))
            .filter(|license| !license.is_empty());
        let Some(license) = license else {
            return Ok(());
        };
        if pre_accepted {
            log::info!("license of {key} accepted in advance");
            return Ok(());
        }
        if self.licenses.review(&descriptor.name, license)? {
            Ok(())
        } else {
            Err(FetchError::LicenseRejected { plugin: key })
        }
    }

    fn resolve_userland(&self, release: &Release, jail: &str) -> Result<String> {
        let root = self.layout.release_root(release);
        if !release.has_version_binary() {
            if !root.is_dir() {
                self.releases.fetch_release(release)?;
            }
            return Ok(release.to_string());
        }

        if let Some(version) = userland_version(&root)? {
            return Ok(version);
        }
        log::info!("{release} is not fetched yet");
        self.releases.fetch_release(release)?;
        userland_version(&root)?.ok_or_else(|| FetchError::Provisioning {
            jail: jail.to_owned(),
            reason: format!("{root}/bin/freebsd-version does not name a userland version"),
        })
    }

    fn populate(
        &self,
        descriptor: &PluginDescriptor,
        jail: &str,
        config: &JailConfig,
    ) -> Result<Outcome> {
        if !config.has_network() {
            return Err(FetchError::NoNetworkAddress {
                jail: jail.to_owned(),
            });
        }
        self.interrupt.check(jail)?;
        self.load_kernel_modules(&descriptor.kmods)?;

        let jail_dir = self.layout.jail_dir(jail);
        let jail_root = jail_dir.join("root");
        write_repositories(&jail_root, &descriptor.packagesite, &descriptor.fingerprints)?;

        self.interrupt.check(jail)?;
        self.jails.start(jail)?;
        let installed = self.install_packages(jail, &descriptor.pkgs)?;
        self.interrupt.check(jail)?;
        if !installed {
            log::error!("package installation failed in {jail}, refusing to fetch artifact");
            return Ok(Outcome::default());
        }

        self.interrupt.check(jail)?;
        let address = self.address(jail, config)?;

        self.interrupt.check(jail)?;
        let plugin_dir = jail_dir.join("plugin");
        self.git
            .clone_repository(&descriptor.artifact, ARTIFACT_BRANCH, &plugin_dir)?;
        overlay(&plugin_dir.join("overlay"), &jail_root)?;
        self.run_post_install(jail, &plugin_dir, &jail_root, address.as_deref())?;

        self.interrupt.check(jail)?;
        let admin_portal = admin_portal(&plugin_dir, address.as_deref());
        if let Some(portal) = &admin_portal {
            log::info!("admin portal: {portal}");
        }
        Ok(Outcome {
            address,
            admin_portal,
            packages_installed: true,
        })
    }

    fn load_kernel_modules(&self, modules: &[String]) -> Result<()> {
        for module in modules {
            let output = self.executor.run("kldload", &["-n", module])?;
            if !output.status.success() {
                return Err(FetchError::KernelModule {
                    module: module.clone(),
                    message: failure_message(&output),
                });
            }
        }
        Ok(())
    }

    fn install_packages(&self, jail: &str, pkgs: &[String]) -> Result<bool> {
        let env = [("ASSUME_ALWAYS_YES".to_owned(), "yes".to_owned())];
        let bootstrap = self
            .jails
            .exec(jail, &["pkg".to_owned(), "bootstrap".to_owned()], &env)?;
        self.interrupt.check(jail)?;
        if !bootstrap.status.success() {
            log::error!("pkg bootstrap failed: {}", failure_message(&bootstrap));
            return Ok(false);
        }

        let mut install = vec!["pkg".to_owned(), "install".to_owned(), "-y".to_owned()];
        install.extend(pkgs.iter().cloned());
        let output = self.jails.exec(jail, &install, &env)?;
        if !output.status.success() {
            log::error!("pkg install failed: {}", failure_message(&output));
            return Ok(false);
        }
        Ok(true)
    }

    fn address(&self, jail: &str, config: &JailConfig) -> Result<Option<String>> {
        if let Some(address) = config.static_address() {
            return Ok(Some(address));
        }
        let command = [
            "ifconfig".to_owned(),
            config.primary_interface(),
            "inet".to_owned(),
        ];
        let output = self.jails.exec(jail, &command, &[])?;
        let address = inet_address(&String::from_utf8_lossy(&output.stdout));
        if address.is_none() {
            log::warn!("no DHCP lease found for {jail}");
        }
        Ok(address)
    }

    fn run_post_install(
        &self,
        jail: &str,
        plugin_dir: &Utf8Path,
        jail_root: &Utf8Path,
        address: Option<&str>,
    ) -> Result<()> {
        let script = plugin_dir.join(POST_INSTALL);
        if !script.is_file() {
            log::debug!("{jail} has no {POST_INSTALL}");
            return Ok(());
        }
        let target_dir = jail_root.join("root");
        std::fs::create_dir_all(&target_dir)?;
        std::fs::copy(&script, target_dir.join(POST_INSTALL))?;

        let command = ["sh".to_owned(), format!("/root/{POST_INSTALL}")];
        let env = [(PLUGIN_IP_ENV.to_owned(), address.unwrap_or_default().to_owned())];
        let output = self.jails.exec(jail, &command, &env)?;
        if output.status.success() {
            Ok(())
        } else {
            Err(FetchError::PostInstall {
                jail: jail.to_owned(),
                message: failure_message(&output),
            })
        }
    }
}

#[derive(Debug, Default)]
struct Outcome {
    address: Option<String>,
    admin_portal: Option<String>,
    packages_installed: bool,
}

/// Jail creation properties.
///
/// Caller values come first, then descriptor values whose key the caller did
/// not set, then the fixed plugin properties.
#[must_use]
pub fn merge_properties(
    caller: &[(String, String)],
    declared: &[(String, String)],
    release: &Release,
    userland: &str,
) -> Vec<(String, String)> {
    let mut merged = caller.to_vec();
    merged.extend(
        declared
            .iter()
            .filter(|(key, _)| !caller.iter().any(|(given, _)| given == key))
            .cloned(),
    );
    merged.extend([
        ("cloned_release".to_owned(), release.to_string()),
        ("release".to_owned(), userland.to_owned()),
        ("type".to_owned(), "plugin".to_owned()),
        ("boot".to_owned(), "on".to_owned()),
    ]);
    merged
}

/// The `USERLAND_VERSION` recorded in `<root>/bin/freebsd-version`.
///
/// # Errors
///
/// Returns I/O errors other than the file being absent.
pub fn userland_version(root: &Utf8Path) -> Result<Option<String>> {
    let text = match std::fs::read_to_string(root.join("bin/freebsd-version")) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    Ok(text.lines().find_map(|line| {
        line.trim()
            .strip_prefix("USERLAND_VERSION=")
            .map(|value| value.trim_matches('"').to_owned())
            .filter(|value| !value.is_empty())
    }))
}

/// The first address on an `inet` line of `ifconfig` output.
#[must_use]
pub fn inet_address(ifconfig: &str) -> Option<String> {
    ifconfig.lines().find_map(|line| {
        line.trim()
            .strip_prefix("inet ")
            .and_then(|rest| rest.split_whitespace().next())
            .map(str::to_owned)
    })
}

/// Copy `overlay` onto `root`, keeping symlinks as links.
fn overlay(overlay: &Utf8Path, root: &Utf8Path) -> Result<()> {
    if !overlay.is_dir() {
        return Ok(());
    }
    for entry in WalkDir::new(overlay).min_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(overlay)
            .map_err(|err| io::Error::other(err.to_string()))?;
        let dest = root.as_std_path().join(relative);
        let kind = entry.file_type();
        if kind.is_dir() {
            std::fs::create_dir_all(&dest)?;
        } else if kind.is_symlink() {
            copy_link(entry.path(), &dest)?;
        } else {
            std::fs::copy(entry.path(), &dest)?;
        }
    }
    log::debug!("overlaid {overlay} onto {root}");
    Ok(())
}

fn copy_link(source: &Path, dest: &Path) -> io::Result<()> {
    let target = std::fs::read_link(source)?;
    match std::fs::remove_file(dest) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err),
        _ => {}
    }
    std::os::unix::fs::symlink(target, dest)
}

fn admin_portal(plugin_dir: &Utf8Path, address: Option<&str>) -> Option<String> {
    let path: Utf8PathBuf = plugin_dir.join("ui.json");
    let text = std::fs::read_to_string(&path).ok()?;
    let ui: serde_json::Value = match serde_json::from_str(&text) {
        Ok(ui) => ui,
        Err(err) => {
            log::warn!("ignoring malformed {path}: {err}");
            return None;
        }
    };
    let portal = ui.get("adminportal")?.as_str()?;
    Some(match address {
        Some(address) => portal.replace(PORTAL_PLACEHOLDER, address),
        None => portal.to_owned(),
    })
}

#[cfg(test)]
#[path = "provision_tests.rs"]
mod tests;
