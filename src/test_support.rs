//! Fixtures shared by the unit tests: a scripted [`Host`], a loopback HTTP
//! responder and helpers for building application bundles and archives.

use anyhow::{anyhow, bail, Result};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use crate::host::Host;

pub enum InstallBehavior {
    /// Write a bundle with the given version at the path and succeed
    Succeed { bundle: PathBuf, version: String },
    /// Leave a half-written bundle behind and fail
    FailPartial { bundle: PathBuf },
    Fail,
}

pub struct FakeHost {
    pub package_version: String,
    pub idle_samples: RefCell<VecDeque<Result<u64, String>>>,
    pub running: Cell<bool>,
    pub install: InstallBehavior,
    pub console_uid: u32,
    pub calls: RefCell<Vec<String>>,
    pub sleeps: Cell<u32>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            package_version: "121.0.0.1".to_string(),
            idle_samples: RefCell::new(VecDeque::new()),
            running: Cell::new(false),
            install: InstallBehavior::Fail,
            console_uid: 501,
            calls: RefCell::new(Vec::new()),
            sleeps: Cell::new(0),
        }
    }

    pub fn with_idle(self, samples: Vec<Result<u64, String>>) -> Self {
        *self.idle_samples.borrow_mut() = samples.into();
        self
    }

    pub fn with_install(mut self, install: InstallBehavior) -> Self {
        self.install = install;
        self
    }

    pub fn with_package_version(mut self, version: &str) -> Self {
        self.package_version = version.to_string();
        self
    }

    pub fn running(self) -> Self {
        self.running.set(true);
        self
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }

    /// Minimal bundle: a `key=value` metadata file, a payload and a symlink.
    pub fn write_bundle(bundle: &Path, version: &str) {
        let contents = bundle.join("Contents");
        let macos = contents.join("MacOS");
        fs::create_dir_all(&macos).unwrap();
        fs::write(
            contents.join("Info.plist"),
            format!("CFBundleShortVersionString={}\n", version),
        )
        .unwrap();
        fs::write(macos.join("app"), format!("binary {}", version)).unwrap();

        #[cfg(unix)]
        std::os::unix::fs::symlink("MacOS/app", contents.join("Current")).unwrap();
    }
}

impl Host for FakeHost {
    fn expand_package(&self, package: &Path, dest: &Path) -> Result<()> {
        self.record(format!("expand:{}", package.display()));
        if dest.exists() {
            bail!("{} already exists", dest.display());
        }
        fs::create_dir_all(dest)?;
        fs::write(
            dest.join("Distribution"),
            format!(
                "<installer-gui-script><bundle CFBundleShortVersionString=\"{}\" id=\"com.example.app\"/></installer-gui-script>",
                self.package_version
            ),
        )?;
        Ok(())
    }

    fn read_bundle_value(&self, bundle: &Path, key: &str) -> Result<Option<String>> {
        let plist = bundle.join("Contents").join("Info.plist");
        if !plist.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(plist)?;
        Ok(text.lines().find_map(|line| {
            line.split_once('=')
                .filter(|(k, _)| *k == key)
                .map(|(_, v)| v.to_string())
        }))
    }

    fn idle_seconds(&self) -> Result<u64> {
        match self.idle_samples.borrow_mut().pop_front() {
            Some(Ok(secs)) => Ok(secs),
            Some(Err(msg)) => Err(anyhow!(msg)),
            None => Ok(0),
        }
    }

    fn is_running(&self, _app_name: &str) -> bool {
        self.running.get()
    }

    fn quit(&self, app_name: &str) -> Result<()> {
        self.record(format!("quit:{}", app_name));
        self.running.set(false);
        Ok(())
    }

    fn install_package(&self, package: &Path, _target: &Path) -> Result<()> {
        self.record(format!("install:{}", package.display()));
        match &self.install {
            InstallBehavior::Succeed { bundle, version } => {
                if bundle.exists() {
                    fs::remove_dir_all(bundle)?;
                }
                Self::write_bundle(bundle, version);
                Ok(())
            }
            InstallBehavior::FailPartial { bundle } => {
                fs::create_dir_all(bundle.join("Contents"))?;
                fs::write(bundle.join("Contents").join("partial"), "half")?;
                bail!("installer: package failed to install")
            }
            InstallBehavior::Fail => bail!("installer: package failed to install"),
        }
    }

    fn console_uid(&self) -> Result<u32> {
        Ok(self.console_uid)
    }

    fn launch_as(&self, uid: u32, app: &Path) -> Result<()> {
        self.record(format!("launch:{}:{}", uid, app.display()));
        Ok(())
    }

    fn sleep(&self, _duration: Duration) {
        self.sleeps.set(self.sleeps.get() + 1);
    }
}

/// Answer one connection per entry with the given status and body.
/// Returns a URL whose last path segment is `file_name`.
pub fn serve(responses: Vec<(u16, Vec<u8>)>, file_name: &str) -> String {
    let raw = responses
        .into_iter()
        .map(|(status, body)| {
            let mut response = format!(
                "HTTP/1.1 {} Status\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                status,
                body.len()
            )
            .into_bytes();
            response.extend_from_slice(&body);
            response
        })
        .collect();
    serve_raw(raw, file_name)
}

/// Write each entry verbatim to one connection, then close it
pub fn serve_raw(responses: Vec<Vec<u8>>, file_name: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        for response in responses {
            let Ok((mut stream, _)) = listener.accept() else {
                return;
            };
            let mut buf = [0u8; 4096];
            let _ = stream.read(&mut buf);
            let _ = stream.write_all(&response);
            let _ = stream.flush();
        }
    });

    format!("http://{}/download/{}", addr, file_name)
}

/// gzip-compressed tarball of everything under `root`
pub fn tar_gz(root: &Path) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;

    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    builder.follow_symlinks(false);
    builder.append_dir_all(".", root).unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

/// Recursively list a tree as (relative path, kind/content) pairs for comparison
pub fn snapshot_tree(root: &Path) -> Vec<(PathBuf, String)> {
    let mut entries: Vec<(PathBuf, String)> = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .map(|e| e.unwrap())
        .map(|e| {
            let rel = e.path().strip_prefix(root).unwrap().to_path_buf();
            let ft = e.file_type();
            let desc = if ft.is_symlink() {
                format!("link:{}", fs::read_link(e.path()).unwrap().display())
            } else if ft.is_dir() {
                "dir".to_string()
            } else {
                format!("file:{:?}", fs::read(e.path()).unwrap())
            };
            (rel, desc)
        })
        .collect();
    entries.sort();
    entries
}
