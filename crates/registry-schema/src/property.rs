use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A single typed property attached to a bundle.
///
/// On the wire a property is `{"type": "...", "value": ...}`. The core
/// recognizes six `type` values and parses their `value` into a concrete
/// struct; any other `type` is retained verbatim as [`Property::Other`] so
/// forward-compatible bundles don't get mangled by a catalog built with an
/// older core.
#[derive(Clone, Debug, PartialEq)]
pub enum Property {
    Package(PackageProperty),
    Gvk(GroupVersionKind),
    PackageRequired(PackageRequiredProperty),
    GvkRequired(GroupVersionKind),
    BundleObject(BundleObjectRef),
    CsvMetadata(CsvMetadata),
    Other(OtherProperty),
}

impl Serialize for Property {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;

        fn emit<S: Serializer, V: Serialize>(
            serializer: S,
            kind: &str,
            value: &V,
        ) -> Result<S::Ok, S::Error> {
            let mut map = serializer.serialize_map(Some(2))?;
            map.serialize_entry("type", kind)?;
            map.serialize_entry("value", value)?;
            map.end()
        }

        match self {
            Property::Package(v) => emit(serializer, "olm.package", v),
            Property::Gvk(v) => emit(serializer, "olm.gvk", v),
            Property::PackageRequired(v) => emit(serializer, "olm.package.required", v),
            Property::GvkRequired(v) => emit(serializer, "olm.gvk.required", v),
            Property::BundleObject(v) => emit(serializer, "olm.bundle.object", v),
            Property::CsvMetadata(v) => emit(serializer, "olm.csv.metadata", v),
            Property::Other(other) => emit(serializer, &other.kind, &other.value),
        }
    }
}

/// An unrecognized property type, preserved byte-for-byte.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OtherProperty {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

// `#[serde(tag = "type", content = "value")]` can't express "unknown tag falls
// through to a catch-all variant that also carries the tag", so the
// deserializer is hand-written: read `type`/`value` generically first, then
// dispatch on `type`.
impl<'de> Deserialize<'de> for Property {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Shape {
            #[serde(rename = "type")]
            kind: String,
            #[serde(default)]
            value: serde_json::Value,
        }

        let Shape { kind, value } = Shape::deserialize(deserializer)?;
        let parse = |v: serde_json::Value| serde_json::from_value(v).map_err(D::Error::custom);

        Ok(match kind.as_str() {
            "olm.package" => Property::Package(parse(value)?),
            "olm.gvk" => Property::Gvk(parse(value)?),
            "olm.package.required" => Property::PackageRequired(parse(value)?),
            "olm.gvk.required" => Property::GvkRequired(parse(value)?),
            "olm.bundle.object" => Property::BundleObject(parse(value)?),
            "olm.csv.metadata" => Property::CsvMetadata(parse(value)?),
            other => Property::Other(OtherProperty {
                kind: other.to_owned(),
                value,
            }),
        })
    }
}

impl Property {
    pub fn type_name(&self) -> &str {
        match self {
            Property::Package(_) => "olm.package",
            Property::Gvk(_) => "olm.gvk",
            Property::PackageRequired(_) => "olm.package.required",
            Property::GvkRequired(_) => "olm.gvk.required",
            Property::BundleObject(_) => "olm.bundle.object",
            Property::CsvMetadata(_) => "olm.csv.metadata",
            Property::Other(other) => &other.kind,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageProperty {
    #[serde(rename = "packageName")]
    pub package_name: String,
    pub version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PackageRequiredProperty {
    #[serde(rename = "packageName")]
    pub package_name: String,
    #[serde(rename = "versionRange")]
    pub version_range: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

/// An embedded manifest object: either inlined as base64, or a reference to a
/// file alongside the bundle document in the source catalog.
#[derive(Clone, Debug, PartialEq)]
pub enum BundleObjectRef {
    Inline(String),
    FileRef(String),
}

impl Serialize for BundleObjectRef {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(1))?;
        match self {
            BundleObjectRef::Inline(data) => map.serialize_entry("data", data)?,
            BundleObjectRef::FileRef(path) => map.serialize_entry("ref", path)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for BundleObjectRef {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Shape {
            #[serde(default)]
            data: Option<String>,
            #[serde(default, rename = "ref")]
            file_ref: Option<String>,
        }
        let shape = Shape::deserialize(deserializer)?;
        match (shape.data, shape.file_ref) {
            (Some(data), None) => Ok(BundleObjectRef::Inline(data)),
            (None, Some(path)) => Ok(BundleObjectRef::FileRef(path)),
            _ => Err(D::Error::custom(
                "olm.bundle.object value must have exactly one of \"data\" or \"ref\"",
            )),
        }
    }
}

/// Display metadata extracted from a bundle's CSV. Kept as a loosely-typed
/// JSON value: the core never branches on its contents, it only serves it
/// back verbatim in `GetBundle`/`GetPackage` responses.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CsvMetadata(pub serde_json::Value);

impl CsvMetadata {
    pub fn display_name(&self) -> Option<&str> {
        self.0.get("displayName").and_then(|v| v.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_property_type_round_trips() {
        let value = json!({"type": "my.custom.prop", "value": {"a": 1}});
        let prop: Property = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(prop.type_name(), "my.custom.prop");
        assert_eq!(serde_json::to_value(&prop).unwrap(), value);
    }

    #[test]
    fn bundle_object_requires_exactly_one_field() {
        let err: Result<BundleObjectRef, _> = serde_json::from_value(json!({}));
        assert!(err.is_err());
        let err: Result<BundleObjectRef, _> =
            serde_json::from_value(json!({"data": "x", "ref": "y"}));
        assert!(err.is_err());
    }

    #[test]
    fn gvk_property_parses() {
        let value = json!({
            "type": "olm.gvk",
            "value": {"group": "etcd.database.coreos.com", "version": "v1beta2", "kind": "EtcdCluster"}
        });
        let prop: Property = serde_json::from_value(value).unwrap();
        assert!(matches!(prop, Property::Gvk(_)));
    }
}
