//! Cooperative interruption of plugin provisioning.
//!
//! SIGINT only raises a flag; the provisioner checks it between steps and
//! tears down the partial jail itself.

use crate::error::{FetchError, Result};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag raised by the interrupt handler.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag(Arc<AtomicBool>);

impl InterruptFlag {
    /// A lowered flag with no handler attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A flag raised by SIGINT.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError::Config`] if a handler is already installed.
    pub fn install() -> Result<Self> {
        let flag = Self::new();
        let handle = flag.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping after the current step");
            handle.raise();
        })
        .map_err(|err| FetchError::Config {
            reason: format!("cannot install interrupt handler: {err}"),
        })?;
        Ok(flag)
    }

    /// Raise the flag.
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Return true once the flag is raised.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Fail with [`FetchError::Interrupted`] once the flag is raised.
    ///
    /// # Errors
    ///
    /// Returns `Interrupted` naming `jail`.
    pub fn check(&self, jail: &str) -> Result<()> {
        if self.is_set() {
            return Err(FetchError::Interrupted {
                jail: jail.to_owned(),
            });
        }
        Ok(())
    }
}
