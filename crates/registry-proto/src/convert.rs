//! Translates between [`registry_model`] records and `registry.v1` wire
//! messages, in both directions.
//!
//! The forward direction (`*_to_proto`) is what the gRPC service and the
//! cache's write path use to render a served answer. The reverse direction
//! (`*_from_proto`) exists for the cache's read path: reconstructing a
//! [`registry_model::Model`] from persisted records without ever touching
//! the source catalog again.

use registry_model::{BundleRecord, ChannelNode, ChannelRecord, Model, PackageRecord};
use registry_schema::{GroupVersionKind, Property};

use crate::v1 as proto;

pub fn gvk_to_proto(gvk: &GroupVersionKind) -> proto::GroupVersionKind {
    proto::GroupVersionKind {
        group: gvk.group.clone(),
        version: gvk.version.clone(),
        kind: gvk.kind.clone(),
    }
}

pub fn gvk_from_proto(gvk: &proto::GroupVersionKind) -> GroupVersionKind {
    GroupVersionKind {
        group: gvk.group.clone(),
        version: gvk.version.clone(),
        kind: gvk.kind.clone(),
    }
}

fn property_value_json(prop: &Property) -> String {
    let encoded = serde_json::to_value(prop).unwrap_or(serde_json::Value::Null);
    encoded
        .get("value")
        .cloned()
        .unwrap_or(serde_json::Value::Null)
        .to_string()
}

fn property_to_proto(prop: &Property) -> proto::Property {
    proto::Property {
        kind: prop.type_name().to_owned(),
        value: property_value_json(prop),
    }
}

/// The inverse of [`property_to_proto`]: reassembles a typed [`Property`]
/// from its wire `{kind, value}` pair by round-tripping through the same
/// `{"type": ..., "value": ...}` shape `Property`'s `Deserialize` expects.
pub fn property_from_proto(prop: &proto::Property) -> Result<Property, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(&prop.value).unwrap_or(serde_json::Value::Null);
    let shaped = serde_json::json!({ "type": prop.kind, "value": value });
    serde_json::from_value(shaped)
}

/// `olm.package.required`/`olm.gvk.required` are both properties and, by OLM
/// convention, also surfaced as `Dependency` entries.
fn dependency_from_property(prop: &Property) -> Option<proto::Dependency> {
    match prop {
        Property::PackageRequired(_) | Property::GvkRequired(_) => Some(proto::Dependency {
            kind: prop.type_name().to_owned(),
            value: property_value_json(prop),
        }),
        _ => None,
    }
}

/// Channel context used to fill in the per-channel edges of a served
/// [`proto::Bundle`]. Absent for `ListBundles`, present everywhere else.
pub struct ChannelContext<'a> {
    pub channel: &'a ChannelRecord,
    pub node: &'a ChannelNode,
}

pub fn bundle_to_proto(
    model: &Model,
    bundle: &BundleRecord,
    channel: Option<ChannelContext<'_>>,
) -> proto::Bundle {
    let package_name = model.package(bundle.package).name.clone();

    let object = bundle
        .properties
        .iter()
        .filter_map(|p| match p {
            Property::BundleObject(obj) => Some(match obj {
                registry_schema::BundleObjectRef::Inline(data) => data.clone(),
                registry_schema::BundleObjectRef::FileRef(path) => path.clone(),
            }),
            _ => None,
        })
        .collect();

    let csv_json = bundle
        .csv_metadata()
        .map(|meta| meta.0.to_string())
        .unwrap_or_default();

    let (channel_name, skip_range, skips, replaces) = match &channel {
        Some(ctx) => (
            ctx.channel.name.clone(),
            ctx.node.skip_range.as_ref().map(|r| r.to_string()).unwrap_or_default(),
            ctx.node
                .skips
                .iter()
                .map(|&idx| ctx.channel.nodes[idx].bundle_name.clone())
                .collect(),
            ctx.node
                .replaces
                .map(|idx| ctx.channel.nodes[idx].bundle_name.clone())
                .unwrap_or_default(),
        ),
        None => (String::new(), String::new(), Vec::new(), String::new()),
    };

    proto::Bundle {
        csv_name: bundle.name.clone(),
        package_name,
        channel_name,
        bundle_path: bundle.image.clone(),
        version: bundle.version.to_string(),
        skip_range,
        skips,
        replaces,
        dependencies: bundle.properties.iter().filter_map(dependency_from_property).collect(),
        properties: bundle.properties.iter().map(property_to_proto).collect(),
        provided_apis: bundle.provided_gvks().map(gvk_to_proto).collect(),
        required_apis: bundle.required_gvks().map(gvk_to_proto).collect(),
        related_images: bundle
            .related_images
            .iter()
            .map(|img| proto::RelatedImage {
                name: img.name.clone(),
                image: img.image.clone(),
            })
            .collect(),
        csv_json,
        object,
        deprecation_message: bundle.deprecation_message.clone().unwrap_or_default(),
    }
}

pub fn channel_to_proto(model: &Model, channel: &ChannelRecord) -> proto::Channel {
    let head = &channel.nodes[channel.head];
    proto::Channel {
        name: channel.name.clone(),
        csv_name: head.bundle_name.clone(),
        entries: channel
            .nodes
            .iter()
            .filter(|node| !node.is_synthetic())
            .map(|node| proto::ChannelEntry {
                package_name: model.package(channel.package).name.clone(),
                channel_name: channel.name.clone(),
                bundle_name: node.bundle_name.clone(),
                replaces: node
                    .replaces
                    .map(|idx| channel.nodes[idx].bundle_name.clone())
                    .unwrap_or_default(),
                skips: node
                    .skips
                    .iter()
                    .map(|&idx| channel.nodes[idx].bundle_name.clone())
                    .collect(),
                version: node.version.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            })
            .collect(),
        deprecation_message: channel.deprecation_message.clone().unwrap_or_default(),
    }
}

pub fn package_to_proto(model: &Model, package: &PackageRecord) -> proto::Package {
    proto::Package {
        name: package.name.clone(),
        default_channel_name: model.channel(package.default_channel).name.clone(),
        channels: package
            .channels
            .iter()
            .map(|&id| channel_to_proto(model, model.channel(id)))
            .collect(),
        icon: package.icon.as_ref().map(|icon| proto::Icon {
            base64_data: icon.base64_data.clone(),
            media_type: icon.media_type.clone(),
        }),
        description: package.description.clone().unwrap_or_default(),
        deprecation_message: package.deprecation_message.clone().unwrap_or_default(),
    }
}

pub fn icon_from_proto(icon: &proto::Icon) -> registry_schema::Icon {
    registry_schema::Icon {
        base64_data: icon.base64_data.clone(),
        media_type: icon.media_type.clone(),
    }
}

pub fn related_image_from_proto(image: &proto::RelatedImage) -> registry_schema::RelatedImage {
    registry_schema::RelatedImage {
        name: image.name.clone(),
        image: image.image.clone(),
    }
}
