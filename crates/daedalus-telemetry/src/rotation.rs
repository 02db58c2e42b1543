//! Rotating log file writer.
//!
//! [`RotatingWriter`] appends to a single active file and moves it aside
//! when the policy says so. Rotated files get a timestamp suffix and are
//! optionally gzipped.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use flate2::write::GzEncoder;
use flate2::Compression;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Bytes per MiB.
const MIB: u64 = 1024 * 1024;

/// When the active log file is rotated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotatePolicy {
    /// On the first write of a new local day.
    #[default]
    Daily,
    /// When the next write would exceed the size limit.
    Size,
    /// Never.
    None,
}

#[derive(Debug)]
struct ActiveFile {
    path: PathBuf,
    policy: RotatePolicy,
    max_bytes: u64,
    compress: bool,
    file: File,
    written: u64,
    opened_on: NaiveDate,
    sequence: u32,
}

impl ActiveFile {
    fn should_rotate(&self, incoming: usize) -> bool {
        match self.policy {
            RotatePolicy::Daily => Local::now().date_naive() != self.opened_on,
            RotatePolicy::Size => {
                self.written > 0 && self.written + incoming as u64 > self.max_bytes
            }
            RotatePolicy::None => false,
        }
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.sequence = self.sequence.wrapping_add(1);
        let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
        let rotated = suffixed(&self.path, &format!("{stamp}.{}", self.sequence));
        fs::rename(&self.path, &rotated)?;

        self.file = open_append(&self.path)?;
        self.written = 0;
        self.opened_on = Local::now().date_naive();

        if self.compress {
            compress_file(&rotated)?;
        }
        Ok(())
    }
}

/// A cloneable, thread-safe writer over a rotating log file.
///
/// # Example
///
/// ```rust,no_run
/// use daedalus_telemetry::{RotatePolicy, RotatingWriter};
/// use std::io::Write;
///
/// let mut writer = RotatingWriter::open("logs/app.log", RotatePolicy::Size, 100, true)?;
/// writeln!(writer, "hello")?;
/// # Ok::<(), std::io::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct RotatingWriter {
    inner: Arc<Mutex<ActiveFile>>,
}

impl RotatingWriter {
    /// Opens `path` for appending. `max_size_mib` applies to the size policy.
    pub fn open(
        path: impl AsRef<Path>,
        policy: RotatePolicy,
        max_size_mib: u64,
        compress: bool,
    ) -> io::Result<Self> {
        Self::with_max_bytes(path, policy, max_size_mib.max(1) * MIB, compress)
    }

    /// Like [`RotatingWriter::open`] with the limit in bytes.
    pub fn with_max_bytes(
        path: impl AsRef<Path>,
        policy: RotatePolicy,
        max_bytes: u64,
        compress: bool,
    ) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let file = open_append(&path)?;
        let written = file.metadata()?.len();

        Ok(Self {
            inner: Arc::new(Mutex::new(ActiveFile {
                path,
                policy,
                max_bytes,
                compress,
                file,
                written,
                opened_on: Local::now().date_naive(),
                sequence: 0,
            })),
        })
    }

    /// Returns the path of the active file.
    #[must_use]
    pub fn path(&self) -> PathBuf {
        self.inner.lock().path.clone()
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut active = self.inner.lock();
        if active.should_rotate(buf.len()) {
            active.rotate()?;
        }
        active.file.write_all(buf)?;
        active.written += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn compress_file(path: &Path) -> io::Result<()> {
    let mut source = File::open(path)?;
    let target = File::create(suffixed(path, "gz"))?;
    let mut encoder = GzEncoder::new(target, Compression::default());
    io::copy(&mut source, &mut encoder)?;
    encoder.finish()?;
    fs::remove_file(path)
}
