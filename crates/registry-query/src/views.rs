/// A single channel-graph node, flattened for serving: which bundle it
/// names, and what it replaces/skips, independent of the arena indices that
/// only make sense inside a [`registry_model::Model`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelEntryView {
    pub package: String,
    pub channel: String,
    pub bundle: String,
    pub replaces: Option<String>,
    pub skips: Vec<String>,
    pub version: Option<String>,
}
