//! Release naming, listing, and menu selection shared by the cagefetch
//! fetcher and plugin provisioner.
//!
//! Nothing in this crate touches the network or the filesystem; it only
//! interprets strings handed to it by the transports and the CLI.

pub mod host;
pub mod listing;
pub mod release;
pub mod selection;

pub use host::host_release;
pub use listing::{MenuEntry, filter_releases, hardened_entry, menu_entries};
pub use release::{Channel, Release, ReleaseError};
pub use selection::{Selection, SelectionError, resolve_plugin, resolve_release};
