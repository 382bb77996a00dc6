//! FTP mirror backend.
//!
//! Every transfer opens its own session so that sizing and retrieving one
//! file never interleaves with another command stream.

use super::{FetchOutcome, ReleaseTransport, TransportError, is_mandatory};
use crate::config::FetchSettings;
use crate::progress::Progress;
use cagefetch_common::Release;
use camino::Utf8Path;
use suppaftp::FtpStream;
use suppaftp::types::FileType;

/// Backend name used in messages.
pub const BACKEND: &str = "ftp";

/// Default mirror.
pub const DEFAULT_SERVER: &str = "ftp.freebsd.org";

/// Fetches release files from an FTP mirror.
#[derive(Debug, Clone)]
pub struct FtpTransport {
    server: String,
    user: String,
    password: String,
    root: String,
    progress: Progress,
}

impl FtpTransport {
    /// Build the backend from fetch settings.
    ///
    /// The default mirror keeps releases under `/pub/FreeBSD/releases/<arch>`;
    /// other servers use the configured root directory.
    #[must_use]
    pub fn from_settings(settings: &FetchSettings, progress: Progress) -> Self {
        let server = settings
            .server
            .as_deref()
            .map_or(DEFAULT_SERVER, |server| {
                server.trim_start_matches("ftp://").trim_end_matches('/')
            })
            .to_owned();
        let root = if server == DEFAULT_SERVER {
            format!("/pub/FreeBSD/releases/{}", settings.arch())
        } else {
            settings.root_dir.clone().unwrap_or_else(|| "/".to_owned())
        };

        Self {
            server,
            user: settings.user.clone(),
            password: settings.password.clone(),
            root,
            progress,
        }
    }

    /// Directory the release index is listed from.
    #[must_use]
    pub fn working_directory(&self) -> &str {
        &self.root
    }

    fn connect(&self) -> Result<FtpStream, TransportError> {
        let address = if self.server.contains(':') {
            self.server.clone()
        } else {
            format!("{}:21", self.server)
        };
        let mut stream = FtpStream::connect(address)?;
        stream.login(&self.user, &self.password)?;
        stream.cwd(&self.root)?;
        Ok(stream)
    }

    /// Retrieve one file; `Ok(false)` when the server cannot size it.
    fn retrieve(
        &self,
        release: &Release,
        file: &str,
        dest: &Utf8Path,
    ) -> Result<bool, TransportError> {
        let mut stream = self.connect()?;
        stream.cwd(release.to_string())?;
        stream.transfer_type(FileType::Binary)?;

        let Ok(size) = stream.size(file) else {
            close(stream);
            return Ok(false);
        };

        let bar = self.progress.download_bar(file, u64::try_from(size).ok());
        let mut data = stream.retr_as_stream(file)?;
        let mut out = std::fs::File::create(dest.join(file))?;
        std::io::copy(&mut bar.wrap_read(&mut data), &mut out)?;
        stream.finalize_retr_stream(data)?;
        bar.finish_and_clear();

        close(stream);
        Ok(true)
    }
}

impl ReleaseTransport for FtpTransport {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn list_entries(&self) -> Result<Vec<String>, TransportError> {
        let mut stream = self.connect()?;
        let entries = stream.nlst(None)?;
        close(stream);
        Ok(entries)
    }

    fn fetch(
        &self,
        release: &Release,
        files: &[String],
        dest: &Utf8Path,
    ) -> Result<FetchOutcome, TransportError> {
        let mut outcome = FetchOutcome::default();
        for file in files {
            log::info!("fetching {file} from {}", self.server);
            if self.retrieve(release, file, dest)? {
                continue;
            }
            if is_mandatory(file) {
                return Err(TransportError::Absent {
                    backend: BACKEND,
                    resource: format!("{release}/{file}"),
                });
            }
            log::warn!("{file} is not on {}, skipping", self.server);
            outcome.dropped.push(file.clone());
        }
        Ok(outcome)
    }
}

fn close(mut stream: FtpStream) {
    if let Err(err) = stream.quit() {
        log::debug!("ftp quit failed: {err}");
    }
}

impl From<suppaftp::FtpError> for TransportError {
    fn from(err: suppaftp::FtpError) -> Self {
        Self::Protocol {
            backend: BACKEND,
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader, Write};
    use std::net::{TcpListener, TcpStream};

    /// A passive-mode FTP server holding `files` for one release directory.
    fn serve(files: &[(&str, &[u8])]) -> String {
        let files: HashMap<String, Vec<u8>> = files
            .iter()
            .map(|(name, body)| ((*name).to_owned(), body.to_vec()))
            .collect();
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        std::thread::spawn(move || {
            for control in listener.incoming() {
                let Ok(control) = control else { break };
                let _ = session(control, &files);
            }
        });
        addr.to_string()
    }

    fn session(mut control: TcpStream, files: &HashMap<String, Vec<u8>>) -> std::io::Result<()> {
        let mut reader = BufReader::new(control.try_clone()?);
        let mut passive: Option<TcpListener> = None;
        control.write_all(b"220 ready\r\n")?;
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                return Ok(());
            }
            let line = line.trim_end();
            let (command, argument) = line.split_once(' ').unwrap_or((line, ""));
            match command.to_ascii_uppercase().as_str() {
                "USER" => control.write_all(b"331 password please\r\n")?,
                "PASS" => control.write_all(b"230 logged in\r\n")?,
                "CWD" => control.write_all(b"250 ok\r\n")?,
                "TYPE" => control.write_all(b"200 binary\r\n")?,
                "SIZE" => match files.get(argument) {
                    Some(body) => control.write_all(format!("213 {}\r\n", body.len()).as_bytes())?,
                    None => control.write_all(b"550 no such file\r\n")?,
                },
                "PASV" => {
                    let data = TcpListener::bind("127.0.0.1:0")?;
                    let port = data.local_addr()?.port();
                    passive = Some(data);
                    control.write_all(
                        format!(
                            "227 Entering Passive Mode (127,0,0,1,{},{})\r\n",
                            port >> 8,
                            port & 0xff
                        )
                        .as_bytes(),
                    )?;
                }
                "RETR" => {
                    let (Some(data), Some(body)) = (passive.take(), files.get(argument)) else {
                        control.write_all(b"550 no such file\r\n")?;
                        continue;
                    };
                    control.write_all(b"150 sending\r\n")?;
                    let (mut stream, _) = data.accept()?;
                    stream.write_all(body)?;
                    drop(stream);
                    control.write_all(b"226 done\r\n")?;
                }
                "QUIT" => {
                    control.write_all(b"221 bye\r\n")?;
                    return Ok(());
                }
                _ => control.write_all(b"502 not implemented\r\n")?,
            }
        }
    }

    fn loopback(server: String) -> FtpTransport {
        let settings = FetchSettings {
            server: Some(server),
            root_dir: Some("/releases".to_owned()),
            user: "anonymous".to_owned(),
            password: "anonymous@".to_owned(),
            ..FetchSettings::default()
        };
        FtpTransport::from_settings(&settings, Progress::hidden())
    }

    fn release() -> Release {
        "11.2-RELEASE".parse().expect("release")
    }

    fn files(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| (*name).to_owned()).collect()
    }

    #[test]
    fn unsized_optional_file_is_dropped() {
        let transport = loopback(serve(&[
            ("MANIFEST", b"manifest".as_slice()),
            ("base.txz", b"base system".as_slice()),
        ]));
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");

        let outcome = transport
            .fetch(&release(), &files(&["MANIFEST", "base.txz", "doc.txz"]), &dest)
            .expect("fetch");

        assert_eq!(outcome.dropped, ["doc.txz"]);
        assert_eq!(std::fs::read(dest.join("base.txz")).expect("base"), b"base system");
        assert!(!dest.join("doc.txz").exists());
    }

    #[test]
    fn unsized_base_archive_is_an_error() {
        let transport = loopback(serve(&[("MANIFEST", b"manifest".as_slice())]));
        let dir = tempfile::tempdir().expect("temp dir");
        let dest = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("utf8");

        let err = transport
            .fetch(&release(), &files(&["MANIFEST", "base.txz"]), &dest)
            .expect_err("base.txz is required");

        assert!(
            matches!(err, TransportError::Absent { ref resource, .. } if resource == "11.2-RELEASE/base.txz"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn default_mirror_uses_the_release_tree() {
        let settings = FetchSettings {
            arch: Some("amd64".to_owned()),
            ..FetchSettings::default()
        };
        let transport = FtpTransport::from_settings(&settings, Progress::hidden());
        assert_eq!(transport.working_directory(), "/pub/FreeBSD/releases/amd64");
    }

    #[test]
    fn other_servers_use_the_configured_root() {
        let settings = FetchSettings {
            server: Some("ftp://mirror.example.org/".to_owned()),
            root_dir: Some("/mirror/releases".to_owned()),
            ..FetchSettings::default()
        };
        let transport = FtpTransport::from_settings(&settings, Progress::hidden());
        assert_eq!(transport.working_directory(), "/mirror/releases");
        assert_eq!(transport.server, "mirror.example.org");
    }
}
