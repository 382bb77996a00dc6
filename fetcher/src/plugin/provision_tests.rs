//! Tests for plugin provisioning.

use super::*;
use crate::git::MockGitClient;
use crate::plugin::jail::MockJailManager;
use crate::test_utils::{
    ExpectedCall, StubExecutor, failure_output, stdout_output, success_output,
};
use rstest::{fixture, rstest};
use tempfile::TempDir;

const VERSION_SCRIPT: &str = "#!/bin/sh\nUSERLAND_VERSION=\"11.2-RELEASE-p9\"\n";
const STATIC: &str = "ip4_addr:vnet0|10.0.0.5/24\nip6_addr:none\n";
const DHCP: &str = "ip4_addr:none\nip6_addr:none\ndhcp:on\ninterfaces:vnet0:bridge0\n";
const OFFLINE: &str = "ip4_addr:none\nip6_addr:none\ndhcp:off\n";
const IFCONFIG: &str = "vnet0: flags=8843<UP,BROADCAST,RUNNING> metric 0 mtu 1500\n\
                        \tinet 192.168.1.50 netmask 0xffffff00 broadcast 192.168.1.255\n";

struct Site {
    _dir: TempDir,
    base: Utf8PathBuf,
    layout: DatasetLayout,
}

impl Site {
    fn descriptor(&self, extra: &str) -> String {
        let path = self.base.join("plex.json");
        let body = format!(
            r#"{{
                "name": "Plex Media Server",
                "release": "11.2-RELEASE",
                "artifact": "https://example.test/iocage-plugin-plex.git",
                "pkgs": ["multimedia/plexmediaserver"],
                "packagesite": "http://pkg.example.test/latest",
                "fingerprints": {{
                    "iocage-plugins": [{{"function": "sha256", "fingerprint": "abc"}}]
                }},
                "properties": {{"vnet": "on"}}{extra}
            }}"#
        );
        std::fs::write(&path, body).expect("descriptor");
        path.into_string()
    }

    fn jail_root(&self) -> Utf8PathBuf {
        self.layout.jail_dir("plexmediaserver").join("root")
    }
}

fn write_version(layout: &DatasetLayout) {
    let bin = layout.release_root(&release()).join("bin");
    std::fs::create_dir_all(&bin).expect("bin");
    std::fs::write(bin.join("freebsd-version"), VERSION_SCRIPT).expect("version");
}

#[fixture]
fn site() -> Site {
    let dir = tempfile::tempdir().expect("temp dir");
    let base = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
    let layout = DatasetLayout::new("zroot", base.join("iocage"));
    write_version(&layout);
    Site {
        _dir: dir,
        base,
        layout,
    }
}

fn release() -> Release {
    "11.2-RELEASE".parse().expect("release")
}

fn request(reference: String) -> ProvisionRequest {
    ProvisionRequest {
        reference,
        ..ProvisionRequest::default()
    }
}

struct Parts {
    releases: MockReleaseProvider,
    jails: MockJailManager,
    executor: StubExecutor,
    git: MockGitClient,
    licenses: MockLicensePrompt,
    interrupt: InterruptFlag,
}

impl Parts {
    fn new() -> Self {
        Self {
            releases: MockReleaseProvider::new(),
            jails: MockJailManager::new(),
            executor: StubExecutor::new(Vec::new()),
            git: MockGitClient::new(),
            licenses: MockLicensePrompt::new(),
            interrupt: InterruptFlag::new(),
        }
    }

    fn created_with(mut self, properties: &'static str) -> Self {
        self.jails
            .expect_create()
            .times(1)
            .returning(move |_, _, _| Ok(JailConfig::from_properties(properties)));
        self
    }

    fn running(mut self) -> Self {
        self.jails.expect_start().returning(|_| Ok(()));
        self
    }

    fn destroyed(mut self, times: usize) -> Self {
        self.jails.expect_destroy().times(times).returning(|_| Ok(()));
        self
    }

    fn with_artifact(mut self) -> Self {
        self.git
            .expect_clone_repository()
            .withf(|url, branch, _| url.ends_with("iocage-plugin-plex.git") && branch == "master")
            .times(1)
            .returning(|_, _, target| {
                std::fs::create_dir_all(target.join("overlay/usr/local/etc"))?;
                std::fs::write(target.join("overlay/usr/local/etc/plex.conf"), "port=32400\n")?;
                std::fs::write(target.join("post_install.sh"), "#!/bin/sh\n")?;
                std::fs::write(
                    target.join("ui.json"),
                    r#"{"adminportal": "http://%%IP%%:32400/web"}"#,
                )?;
                Ok(())
            });
        self
    }

    fn commands_succeed(mut self) -> Self {
        self.jails
            .expect_exec()
            .returning(|_, command, _| match command.first().map(String::as_str) {
                Some("ifconfig") => Ok(stdout_output(IFCONFIG)),
                _ => Ok(success_output()),
            });
        self
    }

    fn provisioner<'a>(&'a self, layout: &'a DatasetLayout) -> Provisioner<'a> {
        Provisioner {
            layout,
            releases: &self.releases,
            jails: &self.jails,
            executor: &self.executor,
            git: &self.git,
            licenses: &self.licenses,
            interrupt: &self.interrupt,
            index: None,
            hardened: false,
        }
    }
}

#[rstest]
fn static_plugin_is_provisioned(site: Site) {
    let mut parts = Parts::new().running().destroyed(0).with_artifact();
    parts
        .jails
        .expect_create()
        .withf(|name, release, properties| {
            let has = |key: &str, value: &str| {
                properties.iter().any(|(k, v)| k == key && v == value)
            };
            name == "plexmediaserver"
                && release.to_string() == "11.2-RELEASE"
                && has("vnet", "on")
                && has("cloned_release", "11.2-RELEASE")
                && has("release", "11.2-RELEASE-p9")
                && has("type", "plugin")
        })
        .times(1)
        .returning(|_, _, _| Ok(JailConfig::from_properties(STATIC)));
    parts
        .jails
        .expect_exec()
        .withf(|_, command, _| command.first().is_some_and(|cmd| cmd == "pkg"))
        .times(2)
        .returning(|_, _, _| Ok(success_output()));
    parts
        .jails
        .expect_exec()
        .withf(|_, command, env| {
            command.iter().map(String::as_str).eq(["sh", "/root/post_install.sh"])
                && env == [(PLUGIN_IP_ENV.to_owned(), "10.0.0.5".to_owned())]
        })
        .times(1)
        .returning(|_, _, _| Ok(success_output()));
    let reference = site.descriptor("");

    let report = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect("provision");

    assert_eq!(report.jail, "plexmediaserver");
    assert_eq!(report.userland, "11.2-RELEASE-p9");
    assert_eq!(report.address.as_deref(), Some("10.0.0.5"));
    assert_eq!(report.admin_portal.as_deref(), Some("http://10.0.0.5:32400/web"));
    assert!(report.packages_installed);
    let root = site.jail_root();
    assert!(root.join("usr/local/etc/plex.conf").is_file());
    assert!(root.join("root/post_install.sh").is_file());
    assert!(root.join("usr/local/etc/pkg/repos/iocage-plugins.conf").is_file());
}

#[rstest]
fn dhcp_address_is_read_inside_the_jail(site: Site) {
    let parts = Parts::new()
        .created_with(DHCP)
        .running()
        .destroyed(0)
        .with_artifact()
        .commands_succeed();
    let reference = site.descriptor("");

    let report = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect("provision");

    assert_eq!(report.address.as_deref(), Some("192.168.1.50"));
    assert_eq!(
        report.admin_portal.as_deref(),
        Some("http://192.168.1.50:32400/web")
    );
}

#[rstest]
fn jail_without_network_is_destroyed(site: Site) {
    let mut parts = Parts::new().created_with(OFFLINE).destroyed(1);
    parts.jails.expect_start().never();
    let reference = site.descriptor("");

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("no address");

    assert!(matches!(err, FetchError::NoNetworkAddress { ref jail } if jail == "plexmediaserver"));
}

#[rstest]
fn rejected_license_stops_before_the_jail_exists(site: Site) {
    let mut parts = Parts::new();
    parts
        .licenses
        .expect_review()
        .withf(|plugin, license| plugin == "Plex Media Server" && license.ends_with("LICENSE"))
        .times(1)
        .returning(|_, _| Ok(false));
    parts.jails.expect_create().never();
    let reference = site.descriptor(r#", "license": "https://example.test/LICENSE""#);

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("rejected");

    assert!(matches!(err, FetchError::LicenseRejected { ref plugin } if plugin == "plexmediaserver"));
}

#[rstest]
fn pre_accepted_license_is_not_shown(site: Site) {
    let mut parts = Parts::new().created_with(OFFLINE).destroyed(1);
    parts.licenses.expect_review().never();
    let reference = site.descriptor(r#", "license": "https://example.test/LICENSE""#);
    let request = ProvisionRequest {
        accept_license: true,
        ..request(reference)
    };

    let err = parts
        .provisioner(&site.layout)
        .provision(&request)
        .expect_err("offline jail");

    assert!(matches!(err, FetchError::NoNetworkAddress { .. }));
}

#[rstest]
fn index_supplies_license_terms(site: Site) {
    let index = PluginIndex::parse(
        &site.layout.plugin_index_dir(),
        r#"{"plexmediaserver": {"name": "Plex", "description": "Media", "license": "https://example.test/plex/LICENSE"}}"#,
    )
    .expect("index");
    let mut parts = Parts::new();
    parts
        .licenses
        .expect_review()
        .withf(|_, license| license == "https://example.test/plex/LICENSE")
        .times(1)
        .returning(|_, _| Ok(false));
    let reference = site.descriptor("");
    let provisioner = Provisioner {
        index: Some(&index),
        ..parts.provisioner(&site.layout)
    };

    let err = provisioner
        .provision(&request(reference))
        .expect_err("rejected");

    assert!(matches!(err, FetchError::LicenseRejected { .. }));
}

#[rstest]
fn kernel_module_failure_destroys_the_jail(site: Site) {
    let mut parts = Parts::new().created_with(STATIC).destroyed(1);
    parts.executor = StubExecutor::new(vec![ExpectedCall::new(
        "kldload",
        &["-n", "vmm"],
        Ok(failure_output("kldload: can't load vmm: No such file or directory")),
    )]);
    let reference = site.descriptor(r#", "kmods": ["vmm"]"#);

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("kldload failed");

    assert!(matches!(err, FetchError::KernelModule { ref module, .. } if module == "vmm"));
    parts.executor.assert_finished();
}

#[rstest]
fn failed_post_install_destroys_the_jail(site: Site) {
    let mut parts = Parts::new()
        .created_with(STATIC)
        .running()
        .destroyed(1)
        .with_artifact();
    parts
        .jails
        .expect_exec()
        .returning(|_, command, _| match command.first().map(String::as_str) {
            Some("sh") => Ok(failure_output("service plexmediaserver: not found")),
            _ => Ok(success_output()),
        });
    let reference = site.descriptor("");

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("post install failed");

    match err {
        FetchError::PostInstall { jail, message } => {
            assert_eq!(jail, "plexmediaserver");
            assert!(message.contains("not found"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[rstest]
fn interrupt_after_creation_destroys_the_jail(site: Site) {
    let mut parts = Parts::new().destroyed(1);
    let flag = parts.interrupt.clone();
    parts.jails.expect_create().times(1).returning(move |_, _, _| {
        flag.raise();
        Ok(JailConfig::from_properties(STATIC))
    });
    parts.jails.expect_start().never();
    let reference = site.descriptor("");

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("interrupted");

    assert!(matches!(err, FetchError::Interrupted { .. }));
}

#[rstest]
fn failed_package_install_keeps_the_jail(site: Site) {
    let mut parts = Parts::new().created_with(STATIC).running().destroyed(0);
    parts.jails.expect_exec().returning(|_, command, _| {
        if command.iter().any(|arg| arg == "install") {
            Ok(failure_output("pkg: No packages available to install"))
        } else {
            Ok(success_output())
        }
    });
    parts.git.expect_clone_repository().never();
    let reference = site.descriptor("");

    let report = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect("jail kept");

    assert!(!report.packages_installed);
    assert_eq!(report.address, None);
    assert_eq!(report.admin_portal, None);
}

#[rstest]
#[case::during_bootstrap("bootstrap")]
#[case::during_install("install")]
fn interrupted_package_step_destroys_the_jail(site: Site, #[case] step: &'static str) {
    let mut parts = Parts::new().created_with(STATIC).running().destroyed(1);
    let flag = parts.interrupt.clone();
    parts.jails.expect_exec().returning(move |_, command, _| {
        if command.iter().any(|arg| arg == step) {
            flag.raise();
            Ok(failure_output("interrupted"))
        } else {
            Ok(success_output())
        }
    });
    parts.git.expect_clone_repository().never();
    let reference = site.descriptor("");

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("interrupted");

    assert!(matches!(err, FetchError::Interrupted { ref jail } if jail == "plexmediaserver"));
}

#[rstest]
fn missing_release_is_fetched_first(site: Site) {
    let version = site.layout.release_root(&release()).join("bin/freebsd-version");
    std::fs::remove_file(&version).expect("remove version");
    let mut parts = Parts::new().created_with(OFFLINE).destroyed(1);
    let layout = site.layout.clone();
    parts
        .releases
        .expect_fetch_release()
        .times(1)
        .returning(move |_| {
            write_version(&layout);
            Ok(())
        });
    let reference = site.descriptor("");

    let err = parts
        .provisioner(&site.layout)
        .provision(&request(reference))
        .expect_err("offline jail");

    assert!(matches!(err, FetchError::NoNetworkAddress { .. }));
}

#[test]
fn caller_properties_win_over_declared_ones() {
    let caller = vec![("vnet".to_owned(), "off".to_owned())];
    let declared = vec![
        ("vnet".to_owned(), "on".to_owned()),
        ("allow_raw_sockets".to_owned(), "1".to_owned()),
    ];

    let merged = merge_properties(&caller, &declared, &release(), "11.2-RELEASE-p9");

    let keys: Vec<&str> = merged.iter().map(|(key, _)| key.as_str()).collect();
    assert_eq!(
        keys,
        ["vnet", "allow_raw_sockets", "cloned_release", "release", "type", "boot"]
    );
    assert_eq!(merged.first().map(|(_, value)| value.as_str()), Some("off"));
}

#[test]
fn userland_version_strips_quotes() {
    let dir = tempfile::tempdir().expect("temp dir");
    let root = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");
    assert_eq!(userland_version(&root).expect("read"), None);

    std::fs::create_dir_all(root.join("bin")).expect("bin");
    std::fs::write(root.join("bin/freebsd-version"), VERSION_SCRIPT).expect("write");

    assert_eq!(
        userland_version(&root).expect("read").as_deref(),
        Some("11.2-RELEASE-p9")
    );
}

#[rstest]
#[case(IFCONFIG, Some("192.168.1.50"))]
#[case("vnet0: flags=8802<BROADCAST> metric 0 mtu 1500\n", None)]
fn inet_lines_yield_the_address(#[case] output: &str, #[case] expected: Option<&str>) {
    assert_eq!(inet_address(output).as_deref(), expected);
}
