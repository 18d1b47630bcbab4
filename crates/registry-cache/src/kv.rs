use std::path::Path;

use prost::Message;
use registry_model::Model;
use registry_proto::v1 as proto;

use crate::backend::{set_permissions, Backend};
use crate::error::CacheError;
use crate::migrations::{self, CacheRecords};
use crate::records::{self, Record};

const DB_DIR: &str = "db";
const DIR_MODE: u32 = 0o770;
const FILE_MODE: u32 = 0o660;

/// Stores each cache record as its own key in an embedded `sled` database,
/// keyed by the same `package:`/`api.bundle:`/`gvk:`/`gvk-latest:` names the
/// JSON backend lays out as files. Substitutes for a `pogreb`-style embedded
/// KV store, since no such crate is part of this core's dependency stack;
/// `sled` fills the same role (ordered, crash-safe, single-file-per-tree
/// embedded storage).
pub(crate) struct KvBackend;

impl Backend for KvBackend {
    fn write_model(&self, dir: &Path, model: &Model) -> Result<(), CacheError> {
        std::fs::create_dir_all(dir).map_err(|source| CacheError::Io {
            path: dir.to_owned(),
            source,
        })?;
        set_permissions(dir, DIR_MODE)?;

        let db_path = dir.join(DB_DIR);
        let db = sled::open(&db_path)?;
        for (key, record) in records::derive(model) {
            let encoded = match record {
                Record::Package(p) => p.encode_to_vec(),
                Record::Bundle(b) => b.encode_to_vec(),
                Record::GvkIndex(g) => g.encode_to_vec(),
            };
            db.insert(key.as_bytes(), encoded)?;
        }
        db.flush()?;

        if db_path.is_dir() {
            set_permissions(&db_path, DIR_MODE)?;
            for entry in std::fs::read_dir(&db_path).map_err(|source| CacheError::Io {
                path: db_path.clone(),
                source,
            })? {
                let entry = entry.map_err(|source| CacheError::Io {
                    path: db_path.clone(),
                    source,
                })?;
                set_permissions(&entry.path(), FILE_MODE)?;
            }
        }

        Ok(())
    }

    fn read_model(&self, dir: &Path, schema_version: u32) -> Result<Model, CacheError> {
        let db_path = dir.join(DB_DIR);
        let db = sled::open(&db_path)?;

        let mut packages = Vec::new();
        for item in db.scan_prefix(records::PACKAGE_PREFIX.as_bytes()) {
            let (_, value) = item?;
            packages.push(proto::Package::decode(value.as_ref())?);
        }

        let mut bundles = Vec::new();
        for item in db.scan_prefix(records::BUNDLE_PREFIX.as_bytes()) {
            let (_, value) = item?;
            bundles.push(proto::Bundle::decode(value.as_ref())?);
        }

        if packages.is_empty() {
            return Err(CacheError::Corrupt {
                dir: dir.to_owned(),
                detail: "sled database has no package records".to_owned(),
            });
        }

        let mut records = CacheRecords { packages, bundles };
        migrations::apply_all(schema_version, &mut records);
        records::rebuild_model(records.packages, records.bundles)
    }
}
