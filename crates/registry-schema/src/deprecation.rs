use serde::{Deserialize, Serialize};

/// An `olm.deprecations` document: free-text deprecation messages attached to
/// a package, one or more of its channels, and/or one or more of its bundles.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Deprecation {
    pub package: String,
    #[serde(default)]
    pub entries: Vec<DeprecationEntry>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DeprecationEntry {
    pub reference: DeprecationReference,
    pub message: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "lowercase")]
pub enum DeprecationReference {
    #[serde(rename = "olm.package")]
    Package,
    #[serde(rename = "olm.channel")]
    Channel { name: String },
    #[serde(rename = "olm.bundle")]
    Bundle { name: String },
}
