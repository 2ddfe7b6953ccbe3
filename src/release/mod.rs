//! Release archives.
//!
//! `upload_release` handlers archive the release directory with
//! [`ReleaseSaver`] and upload the bytes wherever the config container keeps
//! releases. `prepare_terraform` handlers download them and restore the
//! directory with [`ReleaseLoader`]. Terraform provider plugins are large and
//! shared between releases, so they travel separately through the
//! [`SubResourceSaver`] / [`SubResourceLoader`] pair.

pub mod archive;
pub mod checksum;
pub mod paths;
pub mod store;

pub use archive::{
    build_archive, extract_archive, release_prefix, MANIFEST_FILENAME, PLUGIN_CACHE_PREFIX,
    TERRAFORM_IMAGE_FILENAME,
};
pub use checksum::{sha256_hex, SavedPlugin};
pub use store::{MemoryStore, ReleaseLoader, ReleaseSaver, SubResourceLoader, SubResourceSaver};
