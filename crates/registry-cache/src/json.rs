use std::path::Path;

use registry_model::Model;
use registry_proto::v1 as proto;

use crate::backend::{set_permissions, Backend};
use crate::error::CacheError;
use crate::migrations::{self, CacheRecords};
use crate::records::{self, Record};

const RECORDS_DIR: &str = "records";
const DIR_MODE: u32 = 0o750;
const FILE_MODE: u32 = 0o640;

/// Stores each cache record as its own JSON file, one per key, laid out
/// under `records/` in a directory tree that mirrors the key space (e.g.
/// `records/api.bundle:etcd/stable/etcd.v1.json`). Slower to load than
/// [`crate::kv::KvBackend`] for large catalogs, but human-diffable, which
/// makes it the default for local development and CI fixtures.
pub(crate) struct JsonBackend;

impl Backend for JsonBackend {
    fn write_model(&self, dir: &Path, model: &Model) -> Result<(), CacheError> {
        std::fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_owned(),
            source,
        })?;
        set_permissions(dir, DIR_MODE)?;

        let records_dir = dir.join(RECORDS_DIR);
        for (key, record) in records::derive(model) {
            let path = records_dir.join(format!("{key}.json"));
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                    path: parent.to_owned(),
                    source,
                })?;
                set_permissions(parent, DIR_MODE)?;
            }

            let file = std::fs::File::create(&path).map_err(|source| CacheError::Io {
                path: path.clone(),
                source,
            })?;
            match record {
                Record::Package(p) => serde_json::to_writer_pretty(&file, &p)?,
                Record::Bundle(b) => serde_json::to_writer_pretty(&file, &b)?,
                Record::GvkIndex(g) => serde_json::to_writer_pretty(&file, &g)?,
            }
            set_permissions(&path, FILE_MODE)?;
        }

        Ok(())
    }

    fn read_model(&self, dir: &Path, schema_version: u32) -> Result<Model, CacheError> {
        let records_dir = dir.join(RECORDS_DIR);

        let mut packages = Vec::new();
        let mut bundles = Vec::new();

        for entry in walkdir::WalkDir::new(&records_dir) {
            let entry = entry.map_err(|source| CacheError::Corrupt {
                dir: records_dir.clone(),
                detail: source.to_string(),
            })?;
            if !entry.file_type().is_file() {
                continue;
            }

            let relative = entry
                .path()
                .strip_prefix(&records_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");

            let file = std::fs::File::open(entry.path()).map_err(|source| CacheError::Io {
                path: entry.path().to_owned(),
                source,
            })?;

            if relative.starts_with(records::PACKAGE_PREFIX) {
                packages.push(serde_json::from_reader::<_, proto::Package>(file)?);
            } else if relative.starts_with(records::BUNDLE_PREFIX) {
                bundles.push(serde_json::from_reader::<_, proto::Bundle>(file)?);
            }
        }

        if packages.is_empty() {
            return Err(CacheError::Corrupt {
                dir: dir.to_owned(),
                detail: "no package record files found under records/".to_owned(),
            });
        }

        let mut records = CacheRecords { packages, bundles };
        migrations::apply_all(schema_version, &mut records);
        records::rebuild_model(records.packages, records.bundles)
    }
}
