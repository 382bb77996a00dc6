//! Tests for CLI parsing and flag overrides.

use super::*;
use rstest::rstest;

fn fetch_args(args: &[&str]) -> FetchArgs {
    let argv = ["cagefetch", "fetch"].into_iter().chain(args.iter().copied());
    let cli = Cli::parse_from(argv);
    match cli.command {
        Command::Fetch(args) => args,
        other => panic!("expected fetch, got {other:?}"),
    }
}

#[test]
fn fetch_parses_defaults() {
    let args = fetch_args(&[]);
    assert!(args.release.is_none());
    assert!(!args.list);
    assert!(args.transport().is_none());
    assert!(args.files.is_empty());
}

#[test]
fn fetch_parses_a_release() {
    let args = fetch_args(&["-r", "11.2-release"]);
    assert_eq!(
        args.release.map(|release| release.to_string()).as_deref(),
        Some("11.2-RELEASE")
    );
}

#[test]
fn malformed_release_is_rejected() {
    let result = Cli::try_parse_from(["cagefetch", "fetch", "-r", "latest"]);
    assert!(result.is_err());
}

#[rstest]
#[case("--http", TransportKind::Http)]
#[case("--ftp", TransportKind::Ftp)]
#[case("--local", TransportKind::Local)]
fn transport_flags_select_a_backend(#[case] flag: &str, #[case] expected: TransportKind) {
    assert_eq!(fetch_args(&[flag]).transport(), Some(expected));
}

#[test]
fn transport_flags_conflict() {
    assert!(Cli::try_parse_from(["cagefetch", "fetch", "--http", "--local"]).is_err());
}

#[test]
fn flags_override_configuration() {
    let mut config = Config::parse(
        r#"
        [fetch]
        transport = "http"
        server = "mirror.example.test"
        verify_tls = true
        "#,
    )
    .expect("config");
    let args = fetch_args(&[
        "--ftp",
        "--server",
        "ftp.example.test",
        "--no-verify-tls",
        "--no-eol",
        "-F",
        "base.txz",
        "doc.txz",
    ]);

    args.apply(&mut config);

    assert_eq!(config.fetch.transport, TransportKind::Ftp);
    assert_eq!(config.fetch.server.as_deref(), Some("ftp.example.test"));
    assert!(!config.fetch.verify_tls);
    assert!(!config.fetch.eol);
    assert!(config.fetch.update);
    assert_eq!(config.fetch.files, ["base.txz", "doc.txz"]);
}

#[test]
fn absent_flags_keep_configuration() {
    let mut config = Config::parse("[fetch]\nupdate = false\nuser = \"mirror\"\n").expect("config");
    fetch_args(&[]).apply(&mut config);
    assert!(!config.fetch.update);
    assert_eq!(config.fetch.user, "mirror");
}

#[test]
fn plugin_parses_properties() {
    let cli = Cli::parse_from([
        "cagefetch",
        "plugin",
        "plexmediaserver",
        "-p",
        "ip4_addr=vnet0|10.0.0.5/24",
        "-p",
        "vnet=on",
        "--accept-license",
    ]);
    match cli.command {
        Command::Plugin(args) => {
            assert_eq!(args.reference, "plexmediaserver");
            assert_eq!(
                args.provision.properties,
                [
                    ("ip4_addr".to_owned(), "vnet0|10.0.0.5/24".to_owned()),
                    ("vnet".to_owned(), "on".to_owned())
                ]
            );
            assert!(args.provision.accept_license);
        }
        other => panic!("expected plugin, got {other:?}"),
    }
}

#[test]
fn property_without_equals_is_rejected() {
    assert!(Cli::try_parse_from(["cagefetch", "plugin", "plex", "-p", "vnet"]).is_err());
}

#[test]
fn plugins_listing_flags() {
    let cli = Cli::parse_from(["cagefetch", "plugins", "--list", "--header", "--long"]);
    match cli.command {
        Command::Plugins(args) => {
            assert!(args.list && args.header && args.long);
            assert!(args.reference.is_none());
        }
        other => panic!("expected plugins, got {other:?}"),
    }
}

#[test]
fn header_requires_list() {
    assert!(Cli::try_parse_from(["cagefetch", "plugins", "--header"]).is_err());
}

#[test]
fn global_flags_follow_the_subcommand() {
    let cli = Cli::parse_from(["cagefetch", "fetch", "-q", "--config", "/tmp/cagefetch.toml"]);
    assert!(cli.quiet);
    assert_eq!(cli.config, Some(Utf8PathBuf::from("/tmp/cagefetch.toml")));
}

#[test]
fn quiet_and_verbose_conflict() {
    assert!(Cli::try_parse_from(["cagefetch", "-q", "-v", "fetch"]).is_err());
}
