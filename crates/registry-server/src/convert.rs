//! Re-exports the Model<->wire conversions from `registry-proto`, plus the
//! one direction that's specific to this crate: turning a querier's
//! [`registry_query::ChannelEntryView`] into the wire `ChannelEntry`.

pub use registry_proto::convert::{
    bundle_to_proto, channel_to_proto, gvk_from_proto, gvk_to_proto, package_to_proto, ChannelContext,
};

use registry_proto::v1 as proto;

pub fn channel_entry_view_to_proto(entry: &registry_query::ChannelEntryView) -> proto::ChannelEntry {
    proto::ChannelEntry {
        package_name: entry.package.clone(),
        channel_name: entry.channel.clone(),
        bundle_name: entry.bundle.clone(),
        replaces: entry.replaces.clone().unwrap_or_default(),
        skips: entry.skips.clone(),
        version: entry.version.clone().unwrap_or_default(),
    }
}
