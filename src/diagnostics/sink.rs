use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Destination for failure artifacts
pub trait ArtifactSink {
    /// Store an encoded image, returning where it ended up
    fn persist_image(&mut self, bytes: &[u8], file_name: &str) -> io::Result<PathBuf>;

    /// Store a UTF-8 text document, returning where it ended up
    fn persist_text(&mut self, text: &str, file_name: &str) -> io::Result<PathBuf>;
}

/// Writes artifacts into a directory, creating it on first use
#[derive(Debug, Clone)]
pub struct FsArtifactSink {
    dir: PathBuf,
}

impl FsArtifactSink {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Sink rooted at the configured artifacts directory
    pub fn from_config() -> Self {
        Self::new(crate::config::artifacts_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn write(&self, bytes: &[u8], file_name: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(file_name);
        fs::write(&path, bytes)?;
        Ok(path)
    }
}

impl ArtifactSink for FsArtifactSink {
    fn persist_image(&mut self, bytes: &[u8], file_name: &str) -> io::Result<PathBuf> {
        self.write(bytes, file_name)
    }

    fn persist_text(&mut self, text: &str, file_name: &str) -> io::Result<PathBuf> {
        self.write(text.as_bytes(), file_name)
    }
}
