use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::Engine;
use registry_fbc::RawCatalog;
use registry_schema::{BundleObjectRef, Document, DeprecationReference, Property};

use crate::error::ModelError;
use crate::graph;
use crate::model::{BundleId, BundleRecord, ChannelId, ChannelRecord, Model, PackageId, PackageRecord};

/// Loads a File-Based-Catalog directory and builds a validated [`Model`] from
/// it, per `spec.md` §4.2's Model Builder algorithm:
///
/// 1. bucket raw documents by schema and package;
/// 2. materialize a [`PackageRecord`] per `olm.package` document;
/// 3. validate and attach each package's bundles;
/// 4. derive and attach each package's channel upgrade graphs;
/// 5. resolve each package's default channel;
/// 6. apply deprecations.
///
/// Any failure at any step is fatal: the core never serves a partially
/// validated catalog.
pub fn build(root: &Path) -> Result<Model, ModelError> {
    build_from_catalog(registry_fbc::load(root)?)
}

/// Builds a [`Model`] directly from an already-decoded [`RawCatalog`],
/// skipping the filesystem walk. Used by `registry-cache` to reconstruct a
/// model from cache records without touching the source catalog directory.
pub fn build_from_catalog(raw: RawCatalog) -> Result<Model, ModelError> {
    let mut package_docs: BTreeMap<String, registry_schema::Package> = BTreeMap::new();
    let mut channel_docs: BTreeMap<String, Vec<registry_schema::Channel>> = BTreeMap::new();
    let mut bundle_docs: BTreeMap<String, Vec<(PathBuf, registry_schema::Bundle)>> = BTreeMap::new();
    let mut deprecation_docs: BTreeMap<String, registry_schema::Deprecation> = BTreeMap::new();

    for raw_doc in raw.documents {
        match raw_doc.document {
            Document::Package(p) => {
                let name = p.name.clone();
                if package_docs.insert(name.clone(), p).is_some() {
                    return Err(ModelError::reference(
                        name.clone(),
                        None,
                        format!("duplicate olm.package document for package {name:?}"),
                    ));
                }
            }
            Document::Channel(c) => channel_docs.entry(c.package.clone()).or_default().push(c),
            Document::Bundle(b) => bundle_docs
                .entry(b.package.clone())
                .or_default()
                .push((raw_doc.path.clone(), b)),
            Document::Deprecation(d) => {
                if deprecation_docs.insert(d.package.clone(), d).is_some() {
                    return Err(ModelError::reference(
                        None,
                        None,
                        "duplicate olm.deprecations document for a package",
                    ));
                }
            }
            // Opaque documents are accepted but not interpreted or served.
            Document::Meta(_) => {}
        }
    }

    let mut model = Model::default();

    for (name, package_doc) in package_docs {
        let package_id = PackageId(model.packages.len());

        let (package_bundle_ids, bundle_versions) =
            attach_bundles(&mut model, package_id, &name, bundle_docs.remove(&name).unwrap_or_default())?;

        let (channel_ids, channel_name_to_id) = attach_channels(
            &mut model,
            package_id,
            &name,
            channel_docs.remove(&name).unwrap_or_default(),
            &bundle_versions,
        )?;

        let default_channel = *channel_name_to_id
            .get(&package_doc.default_channel)
            .ok_or_else(|| {
                ModelError::reference(
                    name.clone(),
                    package_doc.default_channel.clone(),
                    format!(
                        "package {:?} names default channel {:?} which does not exist",
                        name, package_doc.default_channel
                    ),
                )
            })?;

        model.packages.push(PackageRecord {
            name: name.clone(),
            description: package_doc.description,
            icon: package_doc.icon,
            default_channel,
            channels: channel_ids,
            bundles: package_bundle_ids,
            deprecation_message: None,
        });
        model.package_by_name.insert(name, package_id);
    }

    if let Some(package) = bundle_docs.keys().next() {
        return Err(ModelError::reference(
            package.clone(),
            None,
            format!("bundle(s) reference package {package:?} which has no olm.package document"),
        ));
    }
    if let Some(package) = channel_docs.keys().next() {
        return Err(ModelError::reference(
            package.clone(),
            None,
            format!("channel(s) reference package {package:?} which has no olm.package document"),
        ));
    }

    apply_deprecations(&mut model, deprecation_docs)?;

    Ok(model)
}

type BundleVersions = BTreeMap<String, (BundleId, semver::Version)>;

fn attach_bundles(
    model: &mut Model,
    package_id: PackageId,
    package_name: &str,
    bundles: Vec<(PathBuf, registry_schema::Bundle)>,
) -> Result<(Vec<BundleId>, BundleVersions), ModelError> {
    let mut ids = Vec::with_capacity(bundles.len());
    let mut versions = BundleVersions::new();

    for (doc_path, mut bundle) in bundles {
        bundle.properties = resolve_object_refs(&doc_path, bundle.properties)?;

        let package_property = bundle
            .properties
            .iter()
            .find_map(|p| match p {
                Property::Package(pp) if pp.package_name == package_name => Some(pp),
                _ => None,
            })
            .ok_or_else(|| {
                ModelError::schema(
                    package_name.to_owned(),
                    bundle.name.clone(),
                    "bundle is missing its olm.package property",
                )
            })?;

        let version = semver::Version::parse(&package_property.version).map_err(|source| {
            ModelError::schema(
                package_name.to_owned(),
                bundle.name.clone(),
                format!("invalid version {:?}: {source}", package_property.version),
            )
        })?;

        let bundle_id = BundleId(model.bundles.len());
        if versions
            .insert(bundle.name.clone(), (bundle_id, version.clone()))
            .is_some()
        {
            return Err(ModelError::reference(
                package_name.to_owned(),
                None,
                format!(
                    "duplicate bundle name {:?} in package {:?}",
                    bundle.name, package_name
                ),
            ));
        }

        model.bundles.push(BundleRecord {
            name: bundle.name,
            package: package_id,
            image: bundle.image,
            version,
            properties: bundle.properties,
            related_images: bundle.related_images,
            deprecation_message: None,
        });
        ids.push(bundle_id);
    }

    Ok((ids, versions))
}

/// Resolves every `olm.bundle.object` file-ref property against the
/// directory the bundle document was loaded from, base64-encoding the
/// referenced file's contents so the served property is always self
/// contained. Properties already carrying an inline payload pass through
/// untouched.
fn resolve_object_refs(doc_path: &Path, properties: Vec<Property>) -> Result<Vec<Property>, ModelError> {
    let base = doc_path.parent().unwrap_or_else(|| Path::new("."));

    properties
        .into_iter()
        .map(|property| match property {
            Property::BundleObject(BundleObjectRef::FileRef(rel)) => {
                let file_path = base.join(&rel);
                let bytes = std::fs::read(&file_path).map_err(|source| ModelError::ObjectRef {
                    path: file_path,
                    source,
                })?;
                let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
                Ok(Property::BundleObject(BundleObjectRef::Inline(encoded)))
            }
            other => Ok(other),
        })
        .collect()
}

fn attach_channels(
    model: &mut Model,
    package_id: PackageId,
    package_name: &str,
    channels: Vec<registry_schema::Channel>,
    bundle_versions: &BundleVersions,
) -> Result<(Vec<ChannelId>, BTreeMap<String, ChannelId>), ModelError> {
    let mut ids = Vec::with_capacity(channels.len());
    let mut by_name = BTreeMap::new();

    for channel in channels {
        if by_name.contains_key(&channel.name) {
            return Err(ModelError::reference(
                package_name.to_owned(),
                channel.name.clone(),
                format!(
                    "duplicate channel name {:?} in package {:?}",
                    channel.name, package_name
                ),
            ));
        }

        let (nodes, head) = graph::derive(package_name, &channel.name, &channel.entries, bundle_versions)?;

        let channel_id = ChannelId(model.channels.len());
        model.channels.push(ChannelRecord {
            name: channel.name.clone(),
            package: package_id,
            head,
            nodes,
            deprecation_message: None,
        });
        by_name.insert(channel.name, channel_id);
        ids.push(channel_id);
    }

    Ok((ids, by_name))
}

fn apply_deprecations(
    model: &mut Model,
    deprecations: BTreeMap<String, registry_schema::Deprecation>,
) -> Result<(), ModelError> {
    for (package_name, deprecation) in deprecations {
        let package_id = model.package_id_by_name(&package_name).ok_or_else(|| {
            ModelError::reference(
                package_name.clone(),
                None,
                format!("olm.deprecations document references unknown package {package_name:?}"),
            )
        })?;

        for entry in deprecation.entries {
            match entry.reference {
                DeprecationReference::Package => {
                    model.packages[package_id.0].deprecation_message = Some(entry.message);
                }
                DeprecationReference::Channel { name } => {
                    let channel_id = model.channel_by_name(package_id, &name).ok_or_else(|| {
                        ModelError::reference(
                            package_name.clone(),
                            name.clone(),
                            format!("deprecation references unknown channel {name:?}"),
                        )
                    })?;
                    model.channels[channel_id.0].deprecation_message = Some(entry.message);
                }
                DeprecationReference::Bundle { name } => {
                    let bundle_id = model.bundle_by_name(package_id, &name).ok_or_else(|| {
                        ModelError::reference(
                            package_name.clone(),
                            None,
                            format!("deprecation references unknown bundle {name:?}"),
                        )
                    })?;
                    model.bundles[bundle_id.0].deprecation_message = Some(entry.message);
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry_fbc::RawDocument;
    use serde_json::json;
    use std::path::PathBuf;

    fn doc(value: serde_json::Value) -> RawDocument {
        RawDocument {
            path: PathBuf::from("test"),
            document: Document::from_value(value).unwrap(),
        }
    }

    fn bundle(name: &str, package: &str, version: &str, replaces_none: bool) -> serde_json::Value {
        let _ = replaces_none;
        json!({
            "schema": "olm.bundle",
            "name": name,
            "package": package,
            "image": format!("quay.io/example/{name}"),
            "properties": [
                {"type": "olm.package", "value": {"packageName": package, "version": version}}
            ],
        })
    }

    #[test]
    fn single_package_two_bundle_replaces_chain_builds_cleanly() {
        let catalog = RawCatalog {
            documents: vec![
                doc(json!({"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"})),
                doc(bundle("etcd.v1.0.0", "etcd", "1.0.0", true)),
                doc(bundle("etcd.v1.1.0", "etcd", "1.1.0", true)),
                doc(json!({
                    "schema": "olm.channel",
                    "name": "stable",
                    "package": "etcd",
                    "entries": [
                        {"name": "etcd.v1.0.0"},
                        {"name": "etcd.v1.1.0", "replaces": "etcd.v1.0.0"},
                    ],
                })),
            ],
        };

        let model = build_from_catalog(catalog).unwrap();
        let package = model.package_by_name("etcd").unwrap();
        assert_eq!(package.bundles.len(), 2);
        let channel = model.channel(package.default_channel);
        assert_eq!(channel.name, "stable");
        let head = model.head_bundle(package.default_channel);
        assert_eq!(model.bundle(head).name, "etcd.v1.1.0");
    }

    #[test]
    fn two_heads_fails_the_whole_build() {
        let catalog = RawCatalog {
            documents: vec![
                doc(json!({"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"})),
                doc(bundle("etcd.v1", "etcd", "1.0.0", true)),
                doc(bundle("etcd.v2", "etcd", "2.0.0", true)),
                doc(json!({
                    "schema": "olm.channel",
                    "name": "stable",
                    "package": "etcd",
                    "entries": [
                        {"name": "etcd.v1"},
                        {"name": "etcd.v2"},
                    ],
                })),
            ],
        };

        let err = build_from_catalog(catalog).unwrap_err();
        assert!(matches!(err, ModelError::Graph { .. }));
    }

    #[test]
    fn unknown_default_channel_is_a_reference_error() {
        let catalog = RawCatalog {
            documents: vec![doc(
                json!({"schema": "olm.package", "name": "etcd", "defaultChannel": "missing"}),
            )],
        };

        let err = build_from_catalog(catalog).unwrap_err();
        assert!(matches!(err, ModelError::Reference { .. }));
    }

    #[test]
    fn deprecation_marks_bundle() {
        let catalog = RawCatalog {
            documents: vec![
                doc(json!({"schema": "olm.package", "name": "etcd", "defaultChannel": "stable"})),
                doc(bundle("etcd.v1", "etcd", "1.0.0", true)),
                doc(json!({
                    "schema": "olm.channel",
                    "name": "stable",
                    "package": "etcd",
                    "entries": [{"name": "etcd.v1"}],
                })),
                doc(json!({
                    "schema": "olm.deprecations",
                    "package": "etcd",
                    "entries": [
                        {"reference": {"schema": "olm.bundle", "name": "etcd.v1"}, "message": "end of life"}
                    ],
                })),
            ],
        };

        let model = build_from_catalog(catalog).unwrap();
        let package = model.package_by_name("etcd").unwrap();
        let bundle_id = model.bundle_by_name(model.package_id_by_name("etcd").unwrap(), "etcd.v1").unwrap();
        assert_eq!(
            model.bundle(bundle_id).deprecation_message.as_deref(),
            Some("end of life")
        );
        assert!(package.deprecation_message.is_none());
    }
}
