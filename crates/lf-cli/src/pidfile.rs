//! Exclusive pidfile, removed when dropped.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};

/// A pidfile holding this process's id.
#[derive(Debug)]
pub struct PidFile {
    path: Utf8PathBuf,
}

impl PidFile {
    /// Creates `path` and writes the current process id to it.
    ///
    /// # Errors
    ///
    /// Fails with `AlreadyExists` if the file is already there, or with any
    /// error from creating or writing it.
    pub fn create(path: impl Into<Utf8PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        // from here on, dropping cleans up
        let pidfile = Self { path };
        writeln!(file, "{}", std::process::id())?;
        file.sync_all()?;
        tracing::debug!(path = %pidfile.path(), "Wrote pidfile");
        Ok(pidfile)
    }

    /// The pidfile's location.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(error) = fs::remove_file(&self.path) {
            tracing::warn!(path = %self.path, error = %error, "Could not remove pidfile");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn scratch() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(temp.path().join("limitfiles.pid"))
            .expect("temp path is UTF-8");
        (temp, path)
    }

    #[test]
    fn test_pidfile_holds_process_id() {
        let (_temp, path) = scratch();
        let pidfile = PidFile::create(&path).expect("create pidfile");
        assert_eq!(pidfile.path(), path.as_path());

        let contents = fs::read_to_string(&path).expect("read pidfile");
        assert_eq!(contents, format!("{}\n", std::process::id()));
    }

    #[test]
    fn test_pidfile_removed_on_drop() {
        let (_temp, path) = scratch();
        drop(PidFile::create(&path).expect("create pidfile"));
        assert!(!path.exists());
    }

    #[test]
    fn test_existing_pidfile_is_refused() {
        let (_temp, path) = scratch();
        fs::write(&path, "12345\n").expect("seed pidfile");

        let err = PidFile::create(&path).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        // the other daemon's pidfile is left alone
        assert_eq!(fs::read_to_string(&path).expect("read"), "12345\n");
    }
}
