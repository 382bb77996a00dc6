//! Terminal prompts for the interactive menus and license review.

use crate::error::{FetchError, Result};
use crate::fetch::ReleasePrompt;
use crate::plugin::LicensePrompt;
use crate::transport::http;
use cagefetch_common::{MenuEntry, Release};
use dialoguer::{Confirm, Input};
use std::io::{self, Write};

/// Prompts on the controlling terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt;

impl TerminalPrompt {
    /// Show the plugin menu and read an answer.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the terminal cannot be used.
    pub fn ask_plugin(self, labels: &[String]) -> Result<String> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "Available plugins:")?;
        for (index, label) in labels.iter().enumerate() {
            writeln!(stderr, "  [{index}] {label}")?;
        }
        drop(stderr);
        read_answer("Type the number or name of the desired plugin, or exit")
    }
}

impl ReleasePrompt for TerminalPrompt {
    fn ask(&self, menu: &[MenuEntry], default: Option<Release>) -> Result<String> {
        let mut stderr = io::stderr().lock();
        writeln!(stderr, "Supported releases are:")?;
        for entry in menu {
            writeln!(stderr, "  {entry}")?;
        }
        drop(stderr);
        let question = match default {
            Some(host) => format!("Type the number of the desired release, or Enter for {host}"),
            None => "Type the number of the desired release".to_owned(),
        };
        read_answer(&question)
    }
}

impl LicensePrompt for TerminalPrompt {
    fn review(&self, plugin: &str, license: &str) -> Result<bool> {
        let terms = if license.starts_with("http://") || license.starts_with("https://") {
            http::fetch_text(license)?
        } else {
            license.to_owned()
        };
        writeln!(io::stderr().lock(), "{terms}")?;
        Confirm::new()
            .with_prompt(format!("Do you accept the license terms of {plugin}?"))
            .default(false)
            .interact()
            .map_err(prompt_error)
    }
}

fn read_answer(question: &str) -> Result<String> {
    Input::<String>::new()
        .with_prompt(question)
        .allow_empty(true)
        .interact_text()
        .map_err(prompt_error)
}

fn prompt_error(err: dialoguer::Error) -> FetchError {
    FetchError::Io(io::Error::other(err))
}
