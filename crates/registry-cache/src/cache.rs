use std::path::{Path, PathBuf};

use registry_model::Model;

use crate::backend::Backend;
use crate::digest;
use crate::error::CacheError;
use crate::format::CacheFormat;
use crate::json::JsonBackend;
use crate::kv::KvBackend;
use crate::migrations::CURRENT_SCHEMA_VERSION;

const DIGEST_FILE: &str = ".digest";
const SCHEMA_VERSION_FILE: &str = ".schema-version";

/// A cache directory: a pre-built [`Model`] plus the digest of the source
/// catalog it was built from, so a later process can cheaply decide whether
/// to reuse it or rebuild.
pub struct Cache {
    dir: PathBuf,
    format: CacheFormat,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>, format: CacheFormat) -> Cache {
        Cache {
            dir: dir.into(),
            format,
        }
    }

    pub fn format(&self) -> CacheFormat {
        self.format
    }

    fn backend(&self) -> Box<dyn Backend> {
        match self.format {
            CacheFormat::Kv => Box::new(KvBackend),
            CacheFormat::Json => Box::new(JsonBackend),
        }
    }

    /// Builds (or reuses) the model for `catalog_root`.
    ///
    /// * no cache exists yet: builds the model and persists it;
    /// * the cache's recorded digest matches the catalog's current digest:
    ///   loads the model straight from the cache, skipping the FS walk and
    ///   upgrade-graph derivation entirely;
    /// * the digests differ and `enforce_integrity` is set: fails rather
    ///   than silently serving or silently discarding stale data;
    /// * the digests differ and `enforce_integrity` is unset: rebuilds and
    ///   atomically replaces the cache.
    pub fn ensure(&self, catalog_root: &Path, enforce_integrity: bool) -> Result<Model, CacheError> {
        let expected = digest::compute(catalog_root)?;

        match self.read_digest()? {
            Some(found) if found == expected => {
                tracing::info!(dir = %self.dir.display(), "cache digest matches, reusing");
                self.backend().read_model(&self.dir, self.read_schema_version()?)
            }
            Some(found) if enforce_integrity => Err(CacheError::Mismatch {
                dir: self.dir.clone(),
                expected,
                found,
            }),
            Some(_) => {
                tracing::warn!(dir = %self.dir.display(), "cache digest mismatch, rebuilding");
                self.rebuild(catalog_root, &expected)
            }
            None => {
                tracing::info!(dir = %self.dir.display(), "no existing cache, building");
                self.rebuild(catalog_root, &expected)
            }
        }
    }

    /// Loads a previously built model without touching the source catalog.
    /// Used by cache-only server startup: the catalog directory need not
    /// even be present on this host.
    pub fn load(&self) -> Result<Model, CacheError> {
        self.backend().read_model(&self.dir, self.read_schema_version()?)
    }

    fn rebuild(&self, catalog_root: &Path, digest: &str) -> Result<Model, CacheError> {
        let model = registry_model::build(catalog_root)?;

        let tmp_dir = self.dir.with_file_name(format!(
            ".{}.tmp-{}",
            self.dir
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("cache"),
            std::process::id(),
        ));
        if tmp_dir.exists() {
            std::fs::remove_dir_all(&tmp_dir).map_err(|source| CacheError::Io {
                path: tmp_dir.clone(),
                source,
            })?;
        }

        self.backend().write_model(&tmp_dir, &model)?;
        std::fs::write(tmp_dir.join(DIGEST_FILE), digest).map_err(|source| CacheError::Io {
            path: tmp_dir.join(DIGEST_FILE),
            source,
        })?;
        std::fs::write(tmp_dir.join(SCHEMA_VERSION_FILE), CURRENT_SCHEMA_VERSION.to_string()).map_err(
            |source| CacheError::Io {
                path: tmp_dir.join(SCHEMA_VERSION_FILE),
                source,
            },
        )?;

        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir).map_err(|source| CacheError::Io {
                path: self.dir.clone(),
                source,
            })?;
        } else if let Some(parent) = self.dir.parent() {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_owned(),
                source,
            })?;
        }
        std::fs::rename(&tmp_dir, &self.dir).map_err(|source| CacheError::Io {
            path: self.dir.clone(),
            source,
        })?;

        Ok(model)
    }

    fn read_digest(&self) -> Result<Option<String>, CacheError> {
        match std::fs::read_to_string(self.dir.join(DIGEST_FILE)) {
            Ok(contents) => Ok(Some(contents.trim().to_owned())),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CacheError::Io {
                path: self.dir.join(DIGEST_FILE),
                source,
            }),
        }
    }

    /// A cache directory written before the `.schema-version` marker existed
    /// is treated as schema version 0, so every migration registered against
    /// it still runs.
    fn read_schema_version(&self) -> Result<u32, CacheError> {
        match std::fs::read_to_string(self.dir.join(SCHEMA_VERSION_FILE)) {
            Ok(contents) => contents.trim().parse().map_err(|_| CacheError::Corrupt {
                dir: self.dir.clone(),
                detail: format!("{SCHEMA_VERSION_FILE} does not contain an integer: {contents:?}"),
            }),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(source) => Err(CacheError::Io {
                path: self.dir.join(SCHEMA_VERSION_FILE),
                source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_package(dir: &Path, name: &str) {
        std::fs::write(
            dir.join(format!("{name}.json")),
            format!(r#"{{"schema":"olm.package","name":"{name}","defaultChannel":"stable"}}"#),
        )
        .unwrap();
    }

    #[test]
    fn builds_then_reuses_a_json_cache() {
        let catalog = tempfile::tempdir().unwrap();
        write_package(catalog.path(), "etcd");

        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(cache_dir.path().join("cache"), CacheFormat::Json);

        let built = cache.ensure(catalog.path(), true).unwrap();
        assert!(built.package_by_name("etcd").is_some());

        let reused = cache.ensure(catalog.path(), true).unwrap();
        assert!(reused.package_by_name("etcd").is_some());
    }

    #[test]
    fn strict_integrity_fails_on_mismatch() {
        let catalog = tempfile::tempdir().unwrap();
        write_package(catalog.path(), "etcd");

        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(cache_dir.path().join("cache"), CacheFormat::Kv);
        cache.ensure(catalog.path(), true).unwrap();

        write_package(catalog.path(), "postgres");
        let err = cache.ensure(catalog.path(), true).unwrap_err();
        assert!(matches!(err, CacheError::Mismatch { .. }));
    }

    #[test]
    fn non_strict_integrity_rebuilds_on_mismatch() {
        let catalog = tempfile::tempdir().unwrap();
        write_package(catalog.path(), "etcd");

        let cache_dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(cache_dir.path().join("cache"), CacheFormat::Kv);
        cache.ensure(catalog.path(), false).unwrap();

        write_package(catalog.path(), "postgres");
        let model = cache.ensure(catalog.path(), false).unwrap();
        assert!(model.package_by_name("postgres").is_some());
    }

    #[test]
    fn kv_and_json_formats_are_interchangeable_given_the_same_source() {
        let catalog = tempfile::tempdir().unwrap();
        write_package(catalog.path(), "etcd");

        let cache_dir = tempfile::tempdir().unwrap();
        let kv = Cache::new(cache_dir.path().join("kv"), CacheFormat::Kv);
        let json = Cache::new(cache_dir.path().join("json"), CacheFormat::Json);

        let from_kv = kv.ensure(catalog.path(), true).unwrap();
        let from_json = json.ensure(catalog.path(), true).unwrap();
        assert_eq!(
            from_kv.package_by_name("etcd").unwrap().name,
            from_json.package_by_name("etcd").unwrap().name,
        );
    }
}
