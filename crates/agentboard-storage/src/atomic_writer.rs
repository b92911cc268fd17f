//! Atomic file writer to ensure safe file operations

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Atomic file writer that writes to a temporary file and renames on success.
///
/// The temporary file lives next to the target and carries the process id
/// and a random suffix, so concurrent writers never share one. Readers only
/// ever observe the old file or the complete new one.
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    file: Option<File>,
}

impl AtomicWriter {
    /// Create a new atomic writer for the given path
    pub fn new<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let final_path = path.as_ref().to_path_buf();

        if let Some(parent) = final_path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let temp_path = Self::temp_path(&final_path);
        let file = File::create(&temp_path)?;

        Ok(Self {
            temp_path,
            final_path,
            file: Some(file),
        })
    }

    /// Write data to the temporary file
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        match self.file.as_mut() {
            Some(file) => file.write_all(data),
            None => Err(io::Error::other("atomic writer already committed")),
        }
    }

    /// Commit the write by renaming the temp file to the final path
    pub fn commit(mut self) -> io::Result<()> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.sync_all()?;
        }

        fs::rename(&self.temp_path, &self.final_path)?;
        // Nothing left for Drop to clean up
        self.temp_path.clear();
        Ok(())
    }

    /// Path the data lands at after `commit`
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    fn temp_path(final_path: &Path) -> PathBuf {
        let mut temp = final_path.as_os_str().to_owned();
        temp.push(format!(
            ".{}.{}.tmp",
            std::process::id(),
            uuid::Uuid::new_v4().simple()
        ));
        PathBuf::from(temp)
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.temp_path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}
