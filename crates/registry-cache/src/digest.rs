use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::CacheError;

const INDEXIGNORE: &str = ".indexignore";

/// Computes a stable digest over a catalog directory's source bytes: every
/// eligible JSON/YAML file (the same set `registry-fbc` would load, honoring
/// `.indexignore`), in path-sorted order, hashed as `path || '\0' || contents`
/// per file. Used to decide whether an on-disk cache still matches its
/// source catalog.
pub fn compute(root: &Path) -> Result<String, CacheError> {
    let ignore = match std::fs::read_to_string(root.join(INDEXIGNORE)) {
        Ok(contents) => registry_fbc::IgnoreSet::parse(&contents),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => registry_fbc::IgnoreSet::default(),
        Err(source) => {
            return Err(CacheError::Io {
                path: root.join(INDEXIGNORE),
                source,
            })
        }
    };

    let mut paths: Vec<_> = walkdir::WalkDir::new(root)
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
        .filter(|entry| {
            matches!(
                entry.path().extension().and_then(|e| e.to_str()),
                Some("json") | Some("yaml") | Some("yml")
            )
        })
        .map(|entry| entry.into_path())
        .collect();
    paths.sort();

    let mut hasher = Sha256::new();
    for path in paths {
        let relative = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        let contents = std::fs::read(&path).map_err(|source| CacheError::Io {
            path: path.clone(),
            source,
        })?;
        hasher.update(&contents);
        hasher.update([0u8]);
    }

    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn digest_is_stable_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"schema":"olm.package","name":"a"}"#);
        let first = compute(dir.path()).unwrap();
        let second = compute(dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn digest_changes_when_a_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"schema":"olm.package","name":"a"}"#);
        let before = compute(dir.path()).unwrap();
        write(dir.path(), "a.json", r#"{"schema":"olm.package","name":"b"}"#);
        let after = compute(dir.path()).unwrap();
        assert_ne!(before, after);
    }

    #[test]
    fn digest_ignores_non_eligible_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a.json", r#"{"schema":"olm.package","name":"a"}"#);
        let before = compute(dir.path()).unwrap();
        write(dir.path(), "README.md", "unrelated");
        let after = compute(dir.path()).unwrap();
        assert_eq!(before, after);
    }
}
