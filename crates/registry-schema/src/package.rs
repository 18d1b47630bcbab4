use serde::{Deserialize, Serialize};

/// An `olm.package` document: a package's identity and its default channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Package {
    pub name: String,
    #[serde(rename = "defaultChannel")]
    pub default_channel: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub icon: Option<Icon>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Icon {
    #[serde(rename = "base64data")]
    pub base64_data: String,
    #[serde(rename = "mediatype")]
    pub media_type: String,
}
