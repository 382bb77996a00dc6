//! Plugin jails.
//!
//! A plugin is described by a JSON descriptor, usually found in a git clone
//! of the plugin index. Provisioning turns one descriptor into one jail.

pub mod descriptor;
pub mod index;
pub mod jail;
pub mod provision;
pub mod repos;

pub use descriptor::{Fingerprint, PluginDescriptor};
pub use index::{IndexEntry, PluginIndex, sync_index};
pub use jail::{CommandJailManager, JailConfig, JailManager};
pub use provision::{
    LicensePrompt, ProvisionReport, ProvisionRequest, Provisioner, ReleaseProvider,
};
