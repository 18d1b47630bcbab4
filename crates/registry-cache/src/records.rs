//! The per-API keyed records a [`crate::backend::Backend`] actually
//! persists, and the two directions between them and a [`Model`]: `derive`
//! renders a built model into the record set a cache write persists;
//! `rebuild_model` reconstructs a model from a record set a cache read
//! loaded, by replaying the same graph derivation the builder uses, never by
//! touching the source catalog.

use std::collections::BTreeMap;
use std::path::PathBuf;

use registry_fbc::{RawCatalog, RawDocument};
use registry_model::Model;
use registry_proto::convert::{self, ChannelContext};
use registry_proto::v1 as proto;
use registry_schema::{Document, GroupVersionKind};

use crate::error::CacheError;

pub(crate) const PACKAGE_PREFIX: &str = "package:";
pub(crate) const BUNDLE_PREFIX: &str = "api.bundle:";
pub(crate) const GVK_PREFIX: &str = "gvk:";
pub(crate) const GVK_LATEST_PREFIX: &str = "gvk-latest:";

pub(crate) fn package_key(name: &str) -> String {
    format!("{PACKAGE_PREFIX}{name}")
}

pub(crate) fn bundle_key(package: &str, channel: &str, bundle: &str) -> String {
    format!("{BUNDLE_PREFIX}{package}/{channel}/{bundle}")
}

pub(crate) fn gvk_key(gvk: &GroupVersionKind) -> String {
    format!("{GVK_PREFIX}{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

pub(crate) fn gvk_latest_key(gvk: &GroupVersionKind) -> String {
    format!("{GVK_LATEST_PREFIX}{}/{}/{}", gvk.group, gvk.version, gvk.kind)
}

/// One persisted record, tagged by the key it's stored under. A backend
/// only needs to know how to encode/decode each variant; it doesn't
/// interpret the contents.
pub(crate) enum Record {
    Package(proto::Package),
    Bundle(proto::Bundle),
    GvkIndex(proto::GvkIndex),
}

/// Every record a built model renders into, per `spec.md` §4.4's "contents
/// of the cache" list: a Package record per package, a channel-scoped
/// Bundle record per (package, channel, bundle), and the two GVK indexes.
pub(crate) fn derive(model: &Model) -> Vec<(String, Record)> {
    let mut records = Vec::new();
    let mut gvk_index: BTreeMap<String, Vec<proto::GvkIndexEntry>> = BTreeMap::new();
    let mut gvk_latest_index: BTreeMap<String, Vec<proto::GvkIndexEntry>> = BTreeMap::new();

    for package in model.packages() {
        records.push((
            package_key(&package.name),
            Record::Package(convert::package_to_proto(model, package)),
        ));

        for &channel_id in &package.channels {
            let channel = model.channel(channel_id);
            for (node_index, node) in channel.nodes.iter().enumerate() {
                let Some(bundle_id) = node.bundle else { continue };
                let bundle = model.bundle(bundle_id);

                records.push((
                    bundle_key(&package.name, &channel.name, &node.bundle_name),
                    Record::Bundle(convert::bundle_to_proto(model, bundle, Some(ChannelContext { channel, node }))),
                ));

                for gvk in bundle.provided_gvks() {
                    let entry = proto::GvkIndexEntry {
                        package_name: package.name.clone(),
                        channel_name: channel.name.clone(),
                        bundle_name: node.bundle_name.clone(),
                    };
                    gvk_index.entry(gvk_key(gvk)).or_default().push(entry.clone());
                    if node_index == channel.head {
                        gvk_latest_index.entry(gvk_latest_key(gvk)).or_default().push(entry);
                    }
                }
            }
        }
    }

    for (key, entries) in gvk_index {
        records.push((key, Record::GvkIndex(proto::GvkIndex { entries })));
    }
    for (key, entries) in gvk_latest_index {
        records.push((key, Record::GvkIndex(proto::GvkIndex { entries })));
    }

    records
}

/// Reconstructs a [`Model`] from a previously-derived record set. The GVK
/// indexes aren't consulted here -- they exist on disk because `spec.md`
/// names them as cache contents in their own right, but the package and
/// bundle records alone are sufficient (and, since replaces/skips are
/// already resolved to names, cheaper) to rebuild the whole catalog.
pub(crate) fn rebuild_model(
    packages: Vec<proto::Package>,
    bundles: Vec<proto::Bundle>,
) -> Result<Model, CacheError> {
    let bundle_by_channel: BTreeMap<(String, String, String), &proto::Bundle> = bundles
        .iter()
        .map(|b| {
            (
                (b.package_name.clone(), b.channel_name.clone(), b.csv_name.clone()),
                b,
            )
        })
        .collect();

    let mut bundle_docs: BTreeMap<(String, String), registry_schema::Bundle> = BTreeMap::new();
    let mut deprecations: BTreeMap<String, registry_schema::Deprecation> = BTreeMap::new();
    let mut documents = Vec::new();

    for package in &packages {
        documents.push(doc(Document::Package(registry_schema::Package {
            name: package.name.clone(),
            default_channel: package.default_channel_name.clone(),
            description: non_empty(&package.description),
            icon: package.icon.as_ref().map(convert::icon_from_proto),
        })));

        if let Some(message) = non_empty(&package.deprecation_message) {
            deprecation_entry(
                &mut deprecations,
                &package.name,
                registry_schema::DeprecationReference::Package,
                message,
            );
        }

        for channel in &package.channels {
            let entries = channel
                .entries
                .iter()
                .map(|entry| {
                    let skip_range = bundle_by_channel
                        .get(&(package.name.clone(), channel.name.clone(), entry.bundle_name.clone()))
                        .and_then(|b| non_empty(&b.skip_range));
                    registry_schema::ChannelEntry {
                        name: entry.bundle_name.clone(),
                        replaces: non_empty(&entry.replaces),
                        skips: entry.skips.clone(),
                        skip_range,
                    }
                })
                .collect();

            documents.push(doc(Document::Channel(registry_schema::Channel {
                name: channel.name.clone(),
                package: package.name.clone(),
                entries,
            })));

            if let Some(message) = non_empty(&channel.deprecation_message) {
                deprecation_entry(
                    &mut deprecations,
                    &package.name,
                    registry_schema::DeprecationReference::Channel { name: channel.name.clone() },
                    message,
                );
            }

            for entry in &channel.entries {
                let key = (package.name.clone(), entry.bundle_name.clone());
                if bundle_docs.contains_key(&key) {
                    continue;
                }
                let Some(bundle) = bundle_by_channel.get(&(
                    package.name.clone(),
                    channel.name.clone(),
                    entry.bundle_name.clone(),
                )) else {
                    continue;
                };
                let properties = bundle
                    .properties
                    .iter()
                    .map(convert::property_from_proto)
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(|source| CacheError::Corrupt {
                        dir: PathBuf::from(&bundle.csv_name),
                        detail: format!("decoding cached properties: {source}"),
                    })?;

                if let Some(message) = non_empty(&bundle.deprecation_message) {
                    deprecation_entry(
                        &mut deprecations,
                        &package.name,
                        registry_schema::DeprecationReference::Bundle { name: bundle.csv_name.clone() },
                        message,
                    );
                }

                bundle_docs.insert(
                    key,
                    registry_schema::Bundle {
                        name: bundle.csv_name.clone(),
                        package: bundle.package_name.clone(),
                        image: bundle.bundle_path.clone(),
                        properties,
                        related_images: bundle.related_images.iter().map(convert::related_image_from_proto).collect(),
                    },
                );
            }
        }
    }

    for bundle in bundle_docs.into_values() {
        documents.push(doc(Document::Bundle(bundle)));
    }
    for deprecation in deprecations.into_values() {
        documents.push(doc(Document::Deprecation(deprecation)));
    }

    Ok(registry_model::build_from_catalog(RawCatalog { documents })?)
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_owned())
    }
}

fn deprecation_entry(
    deprecations: &mut BTreeMap<String, registry_schema::Deprecation>,
    package: &str,
    reference: registry_schema::DeprecationReference,
    message: String,
) {
    deprecations
        .entry(package.to_owned())
        .or_insert_with(|| registry_schema::Deprecation {
            package: package.to_owned(),
            entries: Vec::new(),
        })
        .entries
        .push(registry_schema::DeprecationEntry { reference, message });
}

fn doc(document: Document) -> RawDocument {
    RawDocument {
        path: PathBuf::from("cache"),
        document,
    }
}
