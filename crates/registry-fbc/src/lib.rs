//! Walks a File-Based-Catalog directory and decodes its documents into a raw,
//! uninterpreted catalog ready for `registry-model`'s Model Builder.
//!
//! The loader does not cross-reference validate anything -- it only knows how
//! to find files, decode JSON/YAML, and recognize the `schema` tag. Everything
//! else (uniqueness, resolution, graph derivation) belongs to the builder.

mod ignore;

pub use ignore::IgnoreSet;

use std::path::{Path, PathBuf};

use registry_schema::Document;
use serde::Deserialize;

const INDEXIGNORE: &str = ".indexignore";

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("{path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path:?}: failed to decode document: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{path:?}: failed to decode document: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("{path:?}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: registry_schema::SchemaError,
    },
}

/// A decoded document together with the file it came from, for error
/// attribution further down the pipeline.
#[derive(Clone, Debug)]
pub struct RawDocument {
    pub path: PathBuf,
    pub document: Document,
}

/// The unvalidated contents of a catalog directory: every decoded document,
/// in a deterministic (path-sorted) order.
#[derive(Clone, Debug, Default)]
pub struct RawCatalog {
    pub documents: Vec<RawDocument>,
}

/// Walks `root`, applying any `.indexignore` found at its top level, and
/// decodes every eligible JSON/YAML file into a [`RawCatalog`].
///
/// Eligible files are those with a `.json`, `.yaml`, or `.yml` extension.
/// Any decode failure (malformed JSON/YAML) is fatal and aborts the load.
/// A well-formed document missing a `schema` field is silently ignored.
pub fn load(root: &Path) -> Result<RawCatalog, LoadError> {
    let ignore = load_ignore_set(root)?;

    let mut paths: Vec<PathBuf> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
            if relative.as_os_str().is_empty() {
                return false;
            }
            !ignore.is_ignored(relative, entry.file_type().is_dir())
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| is_eligible(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    let mut documents = Vec::new();
    for path in paths {
        for value in decode_file(&path)? {
            let Some(_schema) = value.get("schema").and_then(|s| s.as_str()) else {
                tracing::debug!(path = %path.display(), "document has no \"schema\" field, ignoring");
                continue;
            };
            let document = Document::from_value(value).map_err(|source| LoadError::Schema {
                path: path.clone(),
                source,
            })?;
            documents.push(RawDocument {
                path: path.clone(),
                document,
            });
        }
    }

    Ok(RawCatalog { documents })
}

fn load_ignore_set(root: &Path) -> Result<IgnoreSet, LoadError> {
    let path = root.join(INDEXIGNORE);
    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(IgnoreSet::parse(&contents)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(IgnoreSet::default()),
        Err(source) => Err(LoadError::Io { path, source }),
    }
}

fn is_eligible(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("json") | Some("yaml") | Some("yml")
    )
}

/// Decodes a file as a sequence of documents: concatenated JSON objects for
/// `.json` files, `---`-separated YAML documents for `.yaml`/`.yml`.
fn decode_file(path: &Path) -> Result<Vec<serde_json::Value>, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_owned(),
        source,
    })?;

    if path.extension().and_then(|e| e.to_str()) == Some("json") {
        let stream = serde_json::Deserializer::from_str(&contents).into_iter::<serde_json::Value>();
        stream
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| LoadError::Json {
                path: path.to_owned(),
                source,
            })
    } else {
        serde_yaml::Deserializer::from_str(&contents)
            .map(serde_json::Value::deserialize)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| LoadError::Yaml {
                path: path.to_owned(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_schema::Document;

    fn write(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn loads_concatenated_json() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "catalog.json",
            r#"{"schema":"olm.package","name":"etcd","defaultChannel":"stable"}
{"schema":"olm.channel","name":"stable","package":"etcd","entries":[]}"#,
        );
        let catalog = load(dir.path()).unwrap();
        assert_eq!(catalog.documents.len(), 2);
    }

    #[test]
    fn loads_yaml_with_document_separators() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "catalog.yaml",
            "schema: olm.package\nname: etcd\ndefaultChannel: stable\n---\nschema: olm.channel\nname: stable\npackage: etcd\nentries: []\n",
        );
        let catalog = load(dir.path()).unwrap();
        assert_eq!(catalog.documents.len(), 2);
    }

    #[test]
    fn non_eligible_files_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "README.md", "not a catalog file");
        let catalog = load(dir.path()).unwrap();
        assert!(catalog.documents.is_empty());
    }

    #[test]
    fn document_missing_schema_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "stray.json", r#"{"foo":"bar"}"#);
        let catalog = load(dir.path()).unwrap();
        assert!(catalog.documents.is_empty());
    }

    #[test]
    fn malformed_json_aborts_the_load() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "broken.json", r#"{"schema": "olm.package", "#);
        let err = load(dir.path()).unwrap_err();
        assert!(matches!(err, LoadError::Json { .. }));
    }

    #[test]
    fn indexignore_excludes_matching_paths() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), ".indexignore", "drafts/\n");
        write(
            dir.path(),
            "drafts/wip.json",
            r#"{"schema":"olm.package","name":"wip","defaultChannel":"x"}"#,
        );
        write(
            dir.path(),
            "final.json",
            r#"{"schema":"olm.package","name":"final","defaultChannel":"x"}"#,
        );
        let catalog = load(dir.path()).unwrap();
        assert_eq!(catalog.documents.len(), 1);
        match &catalog.documents[0].document {
            Document::Package(p) => assert_eq!(p.name, "final"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
