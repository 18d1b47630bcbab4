use serde::{Deserialize, Serialize};

/// An `olm.channel` document: a named upgrade stream inside a package.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Channel {
    pub name: String,
    pub package: String,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
}

/// A single entry in a channel's ordered entry list, naming a bundle and its
/// upgrade edges (replaces/skips/skipRange).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChannelEntry {
    pub name: String,
    #[serde(default)]
    pub replaces: Option<String>,
    #[serde(default)]
    pub skips: Vec<String>,
    #[serde(default, rename = "skipRange")]
    pub skip_range: Option<String>,
}
