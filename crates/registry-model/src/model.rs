use std::collections::BTreeMap;

use registry_schema::{CsvMetadata, GroupVersionKind, Icon, Property};
use serde::{Deserialize, Serialize};

macro_rules! arena_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub(crate) usize);
    };
}

arena_id!(PackageId);
arena_id!(ChannelId);
arena_id!(BundleId);

/// The complete, validated, frozen catalog. Built once by
/// [`crate::build::build`] and shared read-only thereafter.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Model {
    pub(crate) packages: Vec<PackageRecord>,
    pub(crate) channels: Vec<ChannelRecord>,
    pub(crate) bundles: Vec<BundleRecord>,
    pub(crate) package_by_name: BTreeMap<String, PackageId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    pub description: Option<String>,
    pub icon: Option<Icon>,
    pub default_channel: ChannelId,
    pub channels: Vec<ChannelId>,
    pub bundles: Vec<BundleId>,
    pub deprecation_message: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelRecord {
    pub name: String,
    pub package: PackageId,
    pub head: usize,
    pub nodes: Vec<ChannelNode>,
    pub deprecation_message: Option<String>,
}

/// A node in a channel's upgrade graph. Real nodes correspond 1:1 with a
/// channel's declared entries and carry a `bundle`; synthetic nodes
/// represent a `replaces`/`skips` target that names a bundle absent from the
/// channel (e.g. since removed) and exist only so the graph's edges have
/// somewhere to point.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelNode {
    pub bundle_name: String,
    pub bundle: Option<BundleId>,
    pub version: Option<semver::Version>,
    pub replaces: Option<usize>,
    pub skips: Vec<usize>,
    pub skip_range: Option<semver::VersionReq>,
    /// Precomputed winner of the "multiple replaces" tie-break: the single
    /// real node whose `replaces` edge targets this node, if any.
    pub replaced_by: Option<usize>,
}

impl ChannelNode {
    pub fn is_synthetic(&self) -> bool {
        self.bundle.is_none()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BundleRecord {
    pub name: String,
    pub package: PackageId,
    pub image: String,
    pub version: semver::Version,
    pub properties: Vec<Property>,
    pub related_images: Vec<registry_schema::RelatedImage>,
    pub deprecation_message: Option<String>,
}

impl BundleRecord {
    pub fn provided_gvks(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.properties.iter().filter_map(|p| match p {
            Property::Gvk(gvk) => Some(gvk),
            _ => None,
        })
    }

    pub fn required_gvks(&self) -> impl Iterator<Item = &GroupVersionKind> {
        self.properties.iter().filter_map(|p| match p {
            Property::GvkRequired(gvk) => Some(gvk),
            _ => None,
        })
    }

    pub fn csv_metadata(&self) -> Option<&CsvMetadata> {
        self.properties.iter().find_map(|p| match p {
            Property::CsvMetadata(meta) => Some(meta),
            _ => None,
        })
    }
}

impl Model {
    pub fn packages(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.iter()
    }

    pub fn package(&self, id: PackageId) -> &PackageRecord {
        &self.packages[id.0]
    }

    pub fn channel(&self, id: ChannelId) -> &ChannelRecord {
        &self.channels[id.0]
    }

    pub fn bundle(&self, id: BundleId) -> &BundleRecord {
        &self.bundles[id.0]
    }

    pub fn bundles(&self) -> impl Iterator<Item = &BundleRecord> {
        self.bundles.iter()
    }

    pub fn bundle_ids(&self) -> impl Iterator<Item = BundleId> + '_ {
        (0..self.bundles.len()).map(BundleId)
    }

    pub fn package_by_name(&self, name: &str) -> Option<&PackageRecord> {
        self.package_by_name
            .get(name)
            .map(|id| self.package(*id))
    }

    pub fn package_id_by_name(&self, name: &str) -> Option<PackageId> {
        self.package_by_name.get(name).copied()
    }

    pub fn channel_by_name(&self, package: PackageId, name: &str) -> Option<ChannelId> {
        self.package(package)
            .channels
            .iter()
            .copied()
            .find(|id| self.channel(*id).name == name)
    }

    pub fn bundle_by_name(&self, package: PackageId, name: &str) -> Option<BundleId> {
        self.package(package)
            .bundles
            .iter()
            .copied()
            .find(|id| self.bundle(*id).name == name)
    }

    /// The head bundle of a channel -- guaranteed to exist and to be a real
    /// (non-synthetic) node by the invariants enforced at build time.
    pub fn head_bundle(&self, channel: ChannelId) -> BundleId {
        let channel = self.channel(channel);
        channel.nodes[channel.head]
            .bundle
            .expect("channel head is always a real node")
    }
}
