//! Sub-resource store contracts and release directory helpers.
//!
//! The store behind [`SubResourceSaver`] and [`SubResourceLoader`] is supplied
//! by the config container (typically an S3 bucket keyed by checksum). Both
//! are called concurrently from the archive codec's worker threads.

use crate::error::Result;
use crate::protocol::ConfigureReleaseRequest;
use crate::release::archive::{build_archive, extract_archive};
use anyhow::Context;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Receives offloaded plugin content during archive builds.
pub trait SubResourceSaver: Send + Sync {
    fn save(&self, path: &str, checksum: &str, reader: &mut dyn Read) -> anyhow::Result<()>;
}

/// Provides offloaded plugin content during archive extraction.
pub trait SubResourceLoader: Send + Sync {
    fn load(&self, path: &str, checksum: &str) -> anyhow::Result<Box<dyn Read + Send>>;
}

impl<F> SubResourceSaver for F
where
    F: Fn(&str, &str, &mut dyn Read) -> anyhow::Result<()> + Send + Sync,
{
    fn save(&self, path: &str, checksum: &str, reader: &mut dyn Read) -> anyhow::Result<()> {
        self(path, checksum, reader)
    }
}

impl<F> SubResourceLoader for F
where
    F: Fn(&str, &str) -> anyhow::Result<Box<dyn Read + Send>> + Send + Sync,
{
    fn load(&self, path: &str, checksum: &str) -> anyhow::Result<Box<dyn Read + Send>> {
        self(path, checksum)
    }
}

/// In-process store keyed by checksum.
///
/// Useful for testing config containers, and as a cache between a build and
/// an extraction in the same process.
#[derive(Debug, Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
    saved: Mutex<Vec<(String, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// `(path, checksum)` of every save, sorted by path.
    pub fn saved(&self) -> Vec<(String, String)> {
        let mut saved = self.saved.lock().unwrap_or_else(|e| e.into_inner()).clone();
        saved.sort();
        saved
    }

    pub fn contains(&self, checksum: &str) -> bool {
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(checksum)
    }
}

impl SubResourceSaver for MemoryStore {
    fn save(&self, path: &str, checksum: &str, reader: &mut dyn Read) -> anyhow::Result<()> {
        let mut data = Vec::new();
        reader
            .read_to_end(&mut data)
            .with_context(|| format!("reading {}", path))?;
        self.blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(checksum.to_string(), data);
        self.saved
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((path.to_string(), checksum.to_string()));
        Ok(())
    }
}

impl SubResourceLoader for MemoryStore {
    fn load(&self, path: &str, checksum: &str) -> anyhow::Result<Box<dyn Read + Send>> {
        let data = self
            .blobs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(checksum)
            .cloned()
            .with_context(|| format!("no content for {} ({})", path, checksum))?;
        Ok(Box::new(Cursor::new(data)))
    }
}

// =============================================================================
// Release directory helpers
// =============================================================================

/// Archives a release directory for upload.
#[derive(Debug, Clone)]
pub struct ReleaseSaver {
    release_dir: PathBuf,
    component: String,
    version: String,
    terraform_image: String,
}

impl ReleaseSaver {
    pub fn new(
        release_dir: impl Into<PathBuf>,
        component: impl Into<String>,
        version: impl Into<String>,
        terraform_image: impl Into<String>,
    ) -> Self {
        Self {
            release_dir: release_dir.into(),
            component: component.into(),
            version: version.into(),
            terraform_image: terraform_image.into(),
        }
    }

    /// Component and version come from the session. Without one the component
    /// is empty and [`save`](Self::save) fails with `MissingComponent`.
    pub fn from_session(
        session: Option<&ConfigureReleaseRequest>,
        release_dir: impl Into<PathBuf>,
        terraform_image: impl Into<String>,
    ) -> Self {
        let (component, version) = session
            .map(|s| (s.component.clone(), s.version.clone()))
            .unwrap_or_default();
        Self::new(release_dir, component, version, terraform_image)
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    pub fn save<W: Write + ?Sized>(&self, output: &mut W, saver: &dyn SubResourceSaver) -> Result<()> {
        build_archive(
            output,
            &self.release_dir,
            &self.component,
            &self.version,
            &self.terraform_image,
            saver,
        )
    }
}

/// Restores a release directory from an archive.
#[derive(Debug, Clone)]
pub struct ReleaseLoader {
    release_dir: PathBuf,
    component: String,
    version: String,
}

impl ReleaseLoader {
    pub fn new(
        release_dir: impl Into<PathBuf>,
        component: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            release_dir: release_dir.into(),
            component: component.into(),
            version: version.into(),
        }
    }

    pub fn release_dir(&self) -> &Path {
        &self.release_dir
    }

    /// Extract into the release directory and return the terraform image.
    pub fn load<R: Read + ?Sized>(&self, input: &mut R, loader: &dyn SubResourceLoader) -> Result<String> {
        extract_archive(
            input,
            &self.release_dir,
            &self.component,
            &self.version,
            loader,
        )
    }
}
