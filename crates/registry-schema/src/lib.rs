//! Typed representation of File-Based-Catalog (FBC) documents and the
//! properties embedded in bundle documents.
//!
//! A catalog is a stream of polymorphic JSON/YAML documents, each tagged by a
//! `schema` field. [`Document`] is the tagged union of the four schemas the
//! core understands; anything else is retained as [`Document::Meta`] so blob
//! APIs can still surface it without forcing every catalog author onto a
//! schema we recognize.

mod bundle;
mod channel;
mod deprecation;
mod package;
mod property;

pub use bundle::{Bundle, RelatedImage};
pub use channel::{Channel, ChannelEntry};
pub use deprecation::{Deprecation, DeprecationEntry, DeprecationReference};
pub use package::{Icon, Package};
pub use property::{
    BundleObjectRef, CsvMetadata, GroupVersionKind, PackageProperty, PackageRequiredProperty,
    Property,
};

/// The `schema` value a document is tagged with.
pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";
pub const SCHEMA_DEPRECATIONS: &str = "olm.deprecations";

#[derive(thiserror::Error, Debug)]
pub enum SchemaError {
    #[error("document is missing a \"schema\" field")]
    MissingSchema,
    #[error("document is not a JSON object")]
    NotAnObject,
    #[error("schema {schema:?}: {source}")]
    Invalid {
        schema: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A single decoded catalog document, tagged by its `schema` field.
#[derive(Clone, Debug)]
pub enum Document {
    Package(Package),
    Channel(Channel),
    Bundle(Bundle),
    Deprecation(Deprecation),
    /// An unrecognized schema, preserved verbatim.
    Meta(MetaDocument),
}

/// An opaque document whose schema the core does not interpret.
#[derive(Clone, Debug)]
pub struct MetaDocument {
    pub schema: String,
    pub value: serde_json::Value,
}

impl Document {
    /// Extracts the `schema` tag from a decoded JSON value and dispatches to
    /// the matching typed variant, falling back to [`Document::Meta`] for any
    /// schema this core doesn't know about.
    ///
    /// Mirrors the FS Loader's contract: a document missing `schema` should
    /// have already been filtered out by the caller (see `registry-fbc`); this
    /// function still reports it as an error so misuse fails loudly.
    pub fn from_value(value: serde_json::Value) -> Result<Document, SchemaError> {
        let schema = value
            .as_object()
            .ok_or(SchemaError::NotAnObject)?
            .get("schema")
            .and_then(|s| s.as_str())
            .ok_or(SchemaError::MissingSchema)?
            .to_owned();

        match schema.as_str() {
            SCHEMA_PACKAGE => serde_json::from_value(value)
                .map(Document::Package)
                .map_err(|source| SchemaError::Invalid { schema, source }),
            SCHEMA_CHANNEL => serde_json::from_value(value)
                .map(Document::Channel)
                .map_err(|source| SchemaError::Invalid { schema, source }),
            SCHEMA_BUNDLE => serde_json::from_value(value)
                .map(Document::Bundle)
                .map_err(|source| SchemaError::Invalid { schema, source }),
            SCHEMA_DEPRECATIONS => serde_json::from_value(value)
                .map(Document::Deprecation)
                .map_err(|source| SchemaError::Invalid { schema, source }),
            other => Ok(Document::Meta(MetaDocument {
                schema: other.to_owned(),
                value,
            })),
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Document::Package(_) => SCHEMA_PACKAGE,
            Document::Channel(_) => SCHEMA_CHANNEL,
            Document::Bundle(_) => SCHEMA_BUNDLE,
            Document::Deprecation(_) => SCHEMA_DEPRECATIONS,
            Document::Meta(m) => &m.schema,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_schema_is_preserved_as_meta() {
        let value = json!({"schema": "my.custom.thing", "foo": "bar"});
        let doc = Document::from_value(value.clone()).unwrap();
        match doc {
            Document::Meta(meta) => {
                assert_eq!(meta.schema, "my.custom.thing");
                assert_eq!(meta.value, value);
            }
            other => panic!("expected Meta, got {other:?}"),
        }
    }

    #[test]
    fn missing_schema_is_an_error() {
        let err = Document::from_value(json!({"foo": "bar"})).unwrap_err();
        assert!(matches!(err, SchemaError::MissingSchema));
    }

    #[test]
    fn package_round_trips() {
        let value = json!({
            "schema": "olm.package",
            "name": "etcd",
            "defaultChannel": "stable",
            "description": "An etcd operator",
        });
        let doc = Document::from_value(value).unwrap();
        match doc {
            Document::Package(pkg) => {
                assert_eq!(pkg.name, "etcd");
                assert_eq!(pkg.default_channel, "stable");
            }
            other => panic!("expected Package, got {other:?}"),
        }
    }
}
