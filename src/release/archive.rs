//! Release archive codec.
//!
//! A release archive is a zip with every entry under `<component>-<version>/`:
//!
//! ```text
//! svc-1.0/terraform-image                    (always first)
//! svc-1.0/<files of the release directory>
//! svc-1.0/.cdflow2-saved-plugins-manifest    (always last)
//! ```
//!
//! Files under `.terraform/plugins/` are not embedded. They are handed to a
//! [`SubResourceSaver`] keyed by their SHA-256 and listed in the manifest, and
//! fetched back through a [`SubResourceLoader`] on extraction.

use crate::error::{Error, Result};
use crate::release::checksum::{decode_manifest, encode_manifest, sha256_hex, SavedPlugin};
use crate::release::paths::{relative_posix_path, validate_path};
use crate::release::store::{SubResourceLoader, SubResourceSaver};
use rayon::prelude::*;
use std::fs::{self, File, Metadata};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{DateTime, ZipArchive, ZipWriter};

/// Entry holding the terraform image reference.
pub const TERRAFORM_IMAGE_FILENAME: &str = "terraform-image";

/// Entry holding the JSON list of offloaded plugins.
pub const MANIFEST_FILENAME: &str = ".cdflow2-saved-plugins-manifest";

/// Release-relative prefix of third-party plugin binaries.
pub const PLUGIN_CACHE_PREFIX: &str = ".terraform/plugins/";

/// Mode of the manifest entry
const MANIFEST_MODE: u32 = 0o644;

/// Top-level directory of every entry in the archive.
pub fn release_prefix(component: &str, version: &str) -> String {
    format!("{}-{}", component, version)
}

/// Whether a release-relative path is offloaded rather than embedded.
pub fn is_plugin_path(relative: &str) -> bool {
    relative.starts_with(PLUGIN_CACHE_PREFIX)
}

// =============================================================================
// Build
// =============================================================================

/// Zip `source_dir` into `output`.
///
/// Plugin offloads run in parallel while the rest of the directory is
/// embedded. The first offload failure stops offloads that have not started
/// yet; it is returned after the archive is written and every started offload
/// has finished.
pub fn build_archive<W: Write + ?Sized>(
    output: &mut W,
    source_dir: &Path,
    component: &str,
    version: &str,
    terraform_image: &str,
    saver: &dyn SubResourceSaver,
) -> Result<()> {
    if component.is_empty() {
        return Err(Error::MissingComponent);
    }

    let prefix = release_prefix(component, version);
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

    zip.start_file(
        format!("{}/{}", prefix, TERRAFORM_IMAGE_FILENAME),
        entry_options(MANIFEST_MODE),
    )?;
    zip.write_all(terraform_image.as_bytes())?;

    let saved: Mutex<Vec<SavedPlugin>> = Mutex::new(Vec::new());
    let failure: Mutex<Option<Error>> = Mutex::new(None);
    let mut embedded = 0usize;

    rayon::scope(|scope| -> Result<()> {
        for entry in WalkDir::new(source_dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_dir() {
                continue;
            }

            let relative = relative_posix_path(source_dir, entry.path())
                .ok_or_else(|| Error::UnsafePath(entry.path().display().to_string()))?;
            let mode = file_mode(&entry.metadata()?);

            if is_plugin_path(&relative) {
                let path = entry.into_path();
                let saved = &saved;
                let failure = &failure;
                scope.spawn(move |_| {
                    if lock(failure).is_some() {
                        return;
                    }
                    match offload_plugin(&path, relative, mode, saver) {
                        Ok(plugin) => lock(saved).push(plugin),
                        Err(e) => {
                            lock(failure).get_or_insert(e);
                        }
                    }
                });
                continue;
            }

            zip.start_file(format!("{}/{}", prefix, relative), entry_options(mode))?;
            let mut file = File::open(entry.path())?;
            io::copy(&mut file, &mut zip)?;
            embedded += 1;
        }
        Ok(())
    })?;

    let saved = saved.into_inner().unwrap_or_else(|e| e.into_inner());
    let manifest = encode_manifest(&saved)?;
    zip.start_file(
        format!("{}/{}", prefix, MANIFEST_FILENAME),
        entry_options(MANIFEST_MODE),
    )?;
    zip.write_all(&manifest)?;

    let archive = zip.finish()?.into_inner();
    output.write_all(&archive)?;
    output.flush()?;

    if let Some(err) = failure.into_inner().unwrap_or_else(|e| e.into_inner()) {
        return Err(err);
    }

    tracing::debug!(
        prefix = %prefix,
        embedded,
        offloaded = saved.len(),
        bytes = archive.len(),
        "Built release archive"
    );
    Ok(())
}

fn offload_plugin(
    path: &Path,
    relative: String,
    mode: u32,
    saver: &dyn SubResourceSaver,
) -> Result<SavedPlugin> {
    let mut file = File::open(path)?;
    let checksum = sha256_hex(&mut file)?;
    file.seek(SeekFrom::Start(0))?;

    saver
        .save(&relative, &checksum, &mut file)
        .map_err(|source| Error::SaveSubResource {
            path: relative.clone(),
            source,
        })?;

    Ok(SavedPlugin {
        path: relative,
        checksum,
        mode,
    })
}

// Fixed timestamp so identical trees produce identical archives
fn entry_options(mode: u32) -> SimpleFileOptions {
    SimpleFileOptions::default()
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(unix)]
fn file_mode(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o777
}

#[cfg(not(unix))]
fn file_mode(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

// =============================================================================
// Extract
// =============================================================================

/// Unzip a release into `dest_dir` and return its terraform image reference.
///
/// Offloaded plugins are fetched in parallel and verified against the
/// manifest checksum before being moved into place. A plugin that fails
/// verification is never left at its destination; the others still complete.
pub fn extract_archive<R: Read + ?Sized>(
    input: &mut R,
    dest_dir: &Path,
    component: &str,
    version: &str,
    loader: &dyn SubResourceLoader,
) -> Result<String> {
    let mut contents = Vec::new();
    input.read_to_end(&mut contents)?;
    let mut archive = ZipArchive::new(Cursor::new(contents))?;

    let prefix = release_prefix(component, version);
    let mut terraform_image = Vec::new();
    let mut manifest = Vec::new();
    let mut extracted = 0usize;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }

        let name = file.name().to_string();
        if name.starts_with('/') {
            return Err(Error::AbsolutePath(name));
        }

        let (top, rest) = name.split_once('/').unwrap_or((name.as_str(), ""));
        if top != prefix {
            return Err(Error::PrefixMismatch {
                expected: prefix,
                actual: top.to_string(),
            });
        }

        match rest {
            TERRAFORM_IMAGE_FILENAME => {
                file.read_to_end(&mut terraform_image)?;
            }
            MANIFEST_FILENAME => {
                file.read_to_end(&mut manifest)?;
            }
            _ => {
                let dest = validate_path(dest_dir, rest)?;
                let mode = file.unix_mode().map(|m| m & 0o7777);
                write_entry(&dest, &mut file, mode)?;
                extracted += 1;
            }
        }
    }

    if terraform_image.is_empty() {
        return Err(Error::MissingTerraformImage);
    }
    let terraform_image = String::from_utf8(terraform_image).map_err(Error::InvalidTerraformImage)?;

    let mut rehydrated = 0usize;
    if !manifest.is_empty() {
        let plugins = decode_manifest(&manifest)?;
        rehydrate_plugins(dest_dir, &plugins, loader)?;
        rehydrated = plugins.len();
    }

    tracing::debug!(prefix = %prefix, extracted, rehydrated, "Extracted release archive");
    Ok(terraform_image)
}

fn write_entry<R: Read + ?Sized>(dest: &Path, reader: &mut R, mode: Option<u32>) -> Result<()> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = File::create(dest)?;
    io::copy(reader, &mut out)?;
    if let Some(mode) = mode {
        set_mode(dest, mode)?;
    }
    Ok(())
}

/// Fetch every plugin, then report the first failure in manifest order.
fn rehydrate_plugins(
    dest_dir: &Path,
    plugins: &[SavedPlugin],
    loader: &dyn SubResourceLoader,
) -> Result<()> {
    let results: Vec<Result<()>> = plugins
        .par_iter()
        .map(|plugin| rehydrate_plugin(dest_dir, plugin, loader))
        .collect();

    for result in results {
        result?;
    }
    Ok(())
}

fn rehydrate_plugin(
    dest_dir: &Path,
    plugin: &SavedPlugin,
    loader: &dyn SubResourceLoader,
) -> Result<()> {
    let dest = validate_path(dest_dir, &plugin.path)?;
    let mut reader =
        loader
            .load(&plugin.path, &plugin.checksum)
            .map_err(|source| Error::LoadSubResource {
                path: plugin.path.clone(),
                source,
            })?;

    let parent = dest.parent().unwrap_or(dest_dir);
    fs::create_dir_all(parent)?;

    // Removed on drop unless persisted
    let mut temp = tempfile::NamedTempFile::new_in(parent)?;
    io::copy(&mut reader, temp.as_file_mut())?;
    set_mode(temp.path(), plugin.mode)?;

    temp.as_file_mut().seek(SeekFrom::Start(0))?;
    let actual = sha256_hex(temp.as_file_mut())?;
    if actual != plugin.checksum {
        return Err(Error::ChecksumMismatch {
            path: plugin.path.clone(),
            expected: plugin.checksum.clone(),
            actual,
        });
    }

    temp.persist(&dest).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}
