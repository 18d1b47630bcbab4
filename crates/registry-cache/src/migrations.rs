//! Idempotent schema migrations, applied to cache records after they're
//! decoded from disk and before they're reassembled into a
//! [`registry_model::Model`].
//!
//! Mirrors the teacher's `Vec<Box<dyn Handler>>` pipeline shape (see
//! `agent::handlers::serve`), but run synchronously once per cache load
//! instead of polled in a loop. A migration must tolerate being applied to
//! records that already reflect its change: a cache directory's recorded
//! schema version only says what version it was *written* at, and a crash
//! between writing records and updating that marker can leave records a
//! migration has already touched.

use registry_proto::v1 as proto;

/// The schema version this build of the cache writes. Bumped whenever a
/// change to the record shapes needs a migration to read older directories.
pub(crate) const CURRENT_SCHEMA_VERSION: u32 = 1;

/// The package and bundle records loaded from a cache directory, not yet
/// reassembled into a [`registry_model::Model`].
pub(crate) struct CacheRecords {
    pub packages: Vec<proto::Package>,
    pub bundles: Vec<proto::Bundle>,
}

/// A single idempotent schema transform.
pub(crate) trait Migration: Send + Sync {
    /// The schema version a cache directory must be at or below to need
    /// this migration.
    fn from_version(&self) -> u32;

    fn apply(&self, records: &mut CacheRecords);

    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// `olm.bundle.version` was briefly written with a `v` prefix (`v1.2.3`) by
/// an earlier cache layout; `registry_schema`'s version parsing never
/// accepted that form, so any bundle record carrying it would fail to
/// reconstruct. Strips it if present; a no-op on records that never had it.
struct StripLegacyVersionPrefix;

impl Migration for StripLegacyVersionPrefix {
    fn from_version(&self) -> u32 {
        0
    }

    fn apply(&self, records: &mut CacheRecords) {
        for bundle in &mut records.bundles {
            if let Some(stripped) = bundle.version.strip_prefix('v') {
                bundle.version = stripped.to_owned();
            }
        }
    }
}

/// Registered in ascending `from_version` order.
fn migrations() -> Vec<Box<dyn Migration>> {
    vec![Box::new(StripLegacyVersionPrefix)]
}

/// Applies every migration whose `from_version` is at or above
/// `stored_version`, in order, and returns how many ran.
pub(crate) fn apply_all(stored_version: u32, records: &mut CacheRecords) -> usize {
    let mut applied = 0;
    for migration in migrations() {
        if stored_version <= migration.from_version() {
            tracing::debug!(migration = migration.name(), stored_version, "applying cache migration");
            migration.apply(records);
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(version: &str) -> proto::Bundle {
        proto::Bundle {
            version: version.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn strips_legacy_v_prefix() {
        let mut records = CacheRecords {
            packages: Vec::new(),
            bundles: vec![bundle("v1.2.3")],
        };
        apply_all(0, &mut records);
        assert_eq!(records.bundles[0].version, "1.2.3");
    }

    #[test]
    fn migration_is_idempotent() {
        let mut records = CacheRecords {
            packages: Vec::new(),
            bundles: vec![bundle("1.2.3")],
        };
        apply_all(0, &mut records);
        apply_all(0, &mut records);
        assert_eq!(records.bundles[0].version, "1.2.3");
    }

    #[test]
    fn skips_migration_for_a_schema_version_past_it() {
        let mut records = CacheRecords {
            packages: Vec::new(),
            bundles: vec![bundle("v1.2.3")],
        };
        let applied = apply_all(CURRENT_SCHEMA_VERSION + 1, &mut records);
        assert_eq!(applied, 0);
        assert_eq!(records.bundles[0].version, "v1.2.3");
    }
}
