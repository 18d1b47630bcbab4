use serde::{Deserialize, Serialize};

use crate::Property;

/// An `olm.bundle` document: a single installable version of an operator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bundle {
    pub name: String,
    pub package: String,
    pub image: String,
    #[serde(default)]
    pub properties: Vec<Property>,
    #[serde(default, rename = "relatedImages")]
    pub related_images: Vec<RelatedImage>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelatedImage {
    pub name: String,
    pub image: String,
}
