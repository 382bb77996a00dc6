//! cagefetch CLI entrypoint.
//!
//! `fetch` downloads, verifies, and extracts a base-system release;
//! `plugin` and `plugins` provision plugin jails on top of one. Listings go
//! to standard output, everything else to standard error.

use cagefetch::cli::{Cli, Command, FetchArgs, PluginArgs, PluginsArgs, ProvisionArgs};
use cagefetch::command::{CommandExecutor, SystemCommandExecutor};
use cagefetch::config::{Config, TransportKind};
use cagefetch::dataset::{DatasetLayout, ZfsStore};
use cagefetch::eol::fetch_end_of_life;
use cagefetch::error::{FetchError, Result};
use cagefetch::extract::TxzExtractor;
use cagefetch::fetch::{FetchRequest, Fetcher, choose_release, release_menu};
use cagefetch::git::SystemGit;
use cagefetch::interrupt::InterruptFlag;
use cagefetch::list_output::{
    format_json, format_plain, format_releases, format_table, plugin_rows,
};
use cagefetch::patch::{FreebsdUpdatePatcher, HttpUpdateScript};
use cagefetch::plugin::{
    CommandJailManager, PluginIndex, ProvisionReport, ProvisionRequest, Provisioner, sync_index,
};
use cagefetch::progress::Progress;
use cagefetch::prompt::TerminalPrompt;
use cagefetch::transport::{self, FileSet, ReleaseTransport};
use cagefetch_common::{Release, Selection, host_release};
use clap::Parser;
use std::io::Write;

struct RunContext<'a> {
    config: &'a Config,
    layout: &'a DatasetLayout,
    executor: &'a dyn CommandExecutor,
    progress: Progress,
}

fn main() {
    let cli = Cli::parse();
    init_logging(log_filter(&cli));
    let mut stderr = std::io::stderr();
    let run_result = run(&cli, &mut std::io::stdout());
    let exit_code = exit_code_for_run_result(run_result, &mut stderr);
    if exit_code != 0 {
        std::process::exit(exit_code);
    }
}

fn run(cli: &Cli, stdout: &mut dyn Write) -> Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Fetch(args) => args.apply(&mut config),
        Command::Plugin(PluginArgs { provision, .. })
        | Command::Plugins(PluginsArgs { provision, .. }) => {
            config.fetch.hardened |= provision.hardened;
        }
    }

    let layout = DatasetLayout::new(config.pool.clone(), config.iocroot.clone());
    let context = RunContext {
        config: &config,
        layout: &layout,
        executor: &SystemCommandExecutor,
        progress: Progress::new(!cli.quiet),
    };

    match &cli.command {
        Command::Fetch(args) => run_fetch(&context, args, stdout),
        Command::Plugin(args) => run_plugin(&context, args, stdout),
        Command::Plugins(args) => run_plugins(&context, args, stdout),
    }
}

/// Lists releases, or fetches the requested or chosen one.
fn run_fetch(context: &RunContext<'_>, args: &FetchArgs, stdout: &mut dyn Write) -> Result<()> {
    let settings = &context.config.fetch;
    let local = settings.transport == TransportKind::Local && !settings.hardened;
    if local && (args.list || args.release.is_none()) {
        return Err(FetchError::Config {
            reason: "a local fetch cannot list releases; name one with --release".to_owned(),
        });
    }

    let transport = transport::from_settings(settings, context.progress)?;
    let eol = if local {
        Vec::new()
    } else {
        end_of_life(context.config)
    };

    if args.list {
        let menu = release_menu(transport.as_ref(), &eol)?;
        write!(stdout, "{}", format_releases(&menu))?;
        return Ok(());
    }

    let release = match &args.release {
        Some(release) => release.clone(),
        None => {
            let host = running_release(context.executor);
            match choose_release(transport.as_ref(), &eol, host.as_ref(), &TerminalPrompt)? {
                Selection::Chosen(release) => release,
                Selection::Exit => return Ok(()),
            }
        }
    };
    let release = if settings.hardened {
        release.to_hardened()
    } else {
        release
    };

    let request = FetchRequest {
        files: FileSet::new(settings.files.iter().map(String::as_str))
            .for_lineage(release.is_hardened()),
        release,
        update: settings.update,
    };
    let report = with_fetcher(context, transport.as_ref(), |fetcher| fetcher.fetch(&request))?;

    if !report.dropped.is_empty() {
        log::warn!("not offered by the server: {}", report.dropped.join(", "));
    }
    log::info!(
        "{} extracted ({}){}",
        request.release,
        report.extracted.join(", "),
        if report.patched { ", patched" } else { "" }
    );
    Ok(())
}

/// Provisions one plugin; a plugin name needs the index synced first.
fn run_plugin(context: &RunContext<'_>, args: &PluginArgs, stdout: &mut dyn Write) -> Result<()> {
    let index = if args.reference.ends_with(".json") {
        None
    } else {
        Some(synced_index(context)?)
    };
    provision(context, &args.reference, &args.provision, index.as_ref(), stdout)
}

/// Lists the plugin index, or provisions the requested or chosen plugin.
fn run_plugins(
    context: &RunContext<'_>,
    args: &PluginsArgs,
    stdout: &mut dyn Write,
) -> Result<()> {
    let index = synced_index(context)?;

    if args.list {
        let rows = plugin_rows(&index);
        let listing = if args.json {
            format_json(&rows)
        } else if args.header {
            format_table(&rows, args.long)
        } else {
            format_plain(&rows)
        };
        write!(stdout, "{listing}")?;
        return Ok(());
    }

    let reference = match &args.reference {
        Some(reference) => reference.clone(),
        None => {
            let answer = TerminalPrompt.ask_plugin(&index.labels())?;
            match index.choose(&answer)? {
                Selection::Chosen(path) => path.into_string(),
                Selection::Exit => return Ok(()),
            }
        }
    };
    provision(context, &reference, &args.provision, Some(&index), stdout)
}

fn provision(
    context: &RunContext<'_>,
    reference: &str,
    args: &ProvisionArgs,
    index: Option<&PluginIndex>,
    stdout: &mut dyn Write,
) -> Result<()> {
    let interrupt = InterruptFlag::install()?;
    let transport = transport::from_settings(&context.config.fetch, context.progress)?;
    let jails = CommandJailManager::new(context.executor, context.config.plugins.jail_tool.clone());
    let request = ProvisionRequest {
        reference: reference.to_owned(),
        name: args.name.clone(),
        properties: args.properties.clone(),
        accept_license: args.accept_license,
    };

    let report = with_fetcher(context, transport.as_ref(), |fetcher| {
        Provisioner {
            layout: context.layout,
            releases: fetcher,
            jails: &jails,
            executor: context.executor,
            git: &SystemGit,
            licenses: &TerminalPrompt,
            interrupt: &interrupt,
            index,
            hardened: context.config.fetch.hardened,
        }
        .provision(&request)
    })?;

    write_report(stdout, &report)?;
    Ok(())
}

/// Wires a [`Fetcher`] over the host's datasets and hands it to `body`.
fn with_fetcher<T>(
    context: &RunContext<'_>,
    transport: &dyn ReleaseTransport,
    body: impl FnOnce(&Fetcher<'_>) -> Result<T>,
) -> Result<T> {
    let store = ZfsStore::new(context.executor);
    let patcher = FreebsdUpdatePatcher::new(context.executor, &HttpUpdateScript);
    let fetcher = Fetcher::new(transport, &store, context.layout, &TxzExtractor, &patcher);
    body(&fetcher)
}

fn synced_index(context: &RunContext<'_>) -> Result<PluginIndex> {
    let dir = context.layout.plugin_index_dir();
    let plugins = &context.config.plugins;
    log::info!("syncing plugin index from {}", plugins.index_url);
    sync_index(&SystemGit, &plugins.index_url, &plugins.branch, &dir)?;
    PluginIndex::load(&dir)
}

/// End-of-life markers, or none when disabled or unreachable.
fn end_of_life(config: &Config) -> Vec<Release> {
    if !(config.fetch.eol && config.fetch.verify_tls) || config.fetch.hardened {
        return Vec::new();
    }
    fetch_end_of_life().unwrap_or_else(|err| {
        log::warn!("cannot mark end-of-life releases: {err}");
        Vec::new()
    })
}

/// The release matching the running kernel, offered as the menu default.
fn running_release(executor: &dyn CommandExecutor) -> Option<Release> {
    match executor.run("uname", &["-r"]) {
        Ok(output) if output.status.success() => {
            host_release(&String::from_utf8_lossy(&output.stdout))
        }
        Ok(_) => None,
        Err(err) => {
            log::debug!("cannot read the kernel release: {err}");
            None
        }
    }
}

fn write_report(stdout: &mut dyn Write, report: &ProvisionReport) -> std::io::Result<()> {
    if !report.packages_installed {
        writeln!(
            stdout,
            "{} created from {} without its packages",
            report.jail, report.release
        )?;
        return Ok(());
    }
    writeln!(
        stdout,
        "{} installed on {} ({})",
        report.jail, report.release, report.userland
    )?;
    if let Some(address) = &report.address {
        writeln!(stdout, "  address: {address}")?;
    }
    if let Some(portal) = &report.admin_portal {
        writeln!(stdout, "  admin portal: {portal}")?;
    }
    Ok(())
}

fn log_filter(cli: &Cli) -> &'static str {
    if cli.quiet {
        "warn"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    }
}

fn init_logging(filter: &str) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn exit_code_for_run_result(result: Result<()>, stderr: &mut dyn Write) -> i32 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            write_stderr_line(stderr, err);
            1
        }
    }
}

fn write_stderr_line(stderr: &mut dyn Write, message: impl std::fmt::Display) {
    if writeln!(stderr, "{message}").is_err() {
        // Best-effort logging; ignore write failures.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cagefetch::test_utils::{ExpectedCall, StubExecutor, failure_output, stdout_output};
    use rstest::rstest;

    #[test]
    fn exit_code_for_run_result_returns_zero_on_success() {
        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Ok(()), &mut stderr);
        assert_eq!(exit_code, 0);
        assert!(stderr.is_empty());
    }

    #[test]
    fn exit_code_for_run_result_prints_error_and_returns_one() {
        let err = FetchError::LicenseRejected {
            plugin: "bru-server".to_owned(),
        };

        let mut stderr = Vec::new();
        let exit_code = exit_code_for_run_result(Err(err), &mut stderr);
        assert_eq!(exit_code, 1);

        let stderr_text = String::from_utf8(stderr).expect("stderr was not UTF-8");
        assert!(stderr_text.contains("accept the license of bru-server"));
    }

    #[rstest]
    #[case::quiet(&["cagefetch", "-q", "fetch"], "warn")]
    #[case::verbose(&["cagefetch", "-v", "fetch"], "debug")]
    #[case::default(&["cagefetch", "fetch"], "info")]
    fn log_filter_follows_verbosity(#[case] argv: &[&str], #[case] expected: &str) {
        let cli = Cli::parse_from(argv.iter().copied());
        assert_eq!(log_filter(&cli), expected);
    }

    #[test]
    fn running_release_maps_the_kernel_version() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "uname",
            &["-r"],
            Ok(stdout_output("11.2-RELEASE-p4\n")),
        )]);
        let release = running_release(&executor).map(|release| release.to_string());
        assert_eq!(release.as_deref(), Some("11.2-RELEASE"));
        executor.assert_finished();
    }

    #[test]
    fn running_release_is_absent_when_uname_fails() {
        let executor = StubExecutor::new(vec![ExpectedCall::new(
            "uname",
            &["-r"],
            Ok(failure_output("uname: not found")),
        )]);
        assert!(running_release(&executor).is_none());
    }

    #[test]
    fn local_fetch_without_a_release_is_rejected() {
        let mut config = Config::default();
        config.fetch.transport = TransportKind::Local;
        config.fetch.root_dir = Some("/srv/dist".to_owned());
        let layout = DatasetLayout::new("zroot", "/iocage");
        let executor = StubExecutor::new(Vec::new());
        let context = RunContext {
            config: &config,
            layout: &layout,
            executor: &executor,
            progress: Progress::hidden(),
        };

        let mut stdout = Vec::new();
        let err = run_fetch(&context, &FetchArgs::default(), &mut stdout)
            .expect_err("local fetch needs a release");
        assert!(matches!(err, FetchError::Config { .. }));
        assert!(stdout.is_empty());
    }

    #[test]
    fn report_lists_address_and_portal() {
        let report = ProvisionReport {
            jail: "plexmediaserver".to_owned(),
            release: "11.2-RELEASE".parse().expect("release"),
            userland: "11.2-RELEASE-p4".to_owned(),
            address: Some("10.0.0.5".to_owned()),
            admin_portal: Some("http://10.0.0.5:32400/web".to_owned()),
            packages_installed: true,
        };
        let mut stdout = Vec::new();
        write_report(&mut stdout, &report).expect("write report");
        let text = String::from_utf8(stdout).expect("utf8");
        assert!(text.contains("plexmediaserver installed on 11.2-RELEASE (11.2-RELEASE-p4)"));
        assert!(text.contains("admin portal: http://10.0.0.5:32400/web"));
    }
}
