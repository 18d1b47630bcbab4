use std::path::Path;

use registry_model::Model;

use crate::error::CacheError;

/// A storage engine capable of persisting and reloading a built [`Model`].
/// `registry-cache` ships two: [`crate::kv::KvBackend`] and
/// [`crate::json::JsonBackend`].
pub(crate) trait Backend {
    fn write_model(&self, dir: &Path, model: &Model) -> Result<(), CacheError>;

    /// `schema_version` is the version recorded in the cache directory's
    /// `.schema-version` marker (0 for directories written before that
    /// marker existed); implementations decode their records and run
    /// `crate::migrations::apply_all` against it before rebuilding a model.
    fn read_model(&self, dir: &Path, schema_version: u32) -> Result<Model, CacheError>;
}

#[cfg(unix)]
pub(crate) fn set_permissions(path: &Path, mode: u32) -> Result<(), CacheError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).map_err(|source| {
        CacheError::Io {
            path: path.to_owned(),
            source,
        }
    })
}

#[cfg(not(unix))]
pub(crate) fn set_permissions(_path: &Path, _mode: u32) -> Result<(), CacheError> {
    Ok(())
}
