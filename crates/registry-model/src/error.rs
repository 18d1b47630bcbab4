/// The load-time error taxonomy of the core: every variant is fatal and
/// aborts the build, carrying enough identity (package/channel/bundle name)
/// to say which rule was violated and where.
#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Load(#[from] registry_fbc::LoadError),

    /// A document's schema tag is known but its fields are missing, ill-typed,
    /// or otherwise fail a structural check (bad semver, bad skipRange, a
    /// bundle without its mandatory `olm.package` property, ...).
    #[error("package {package:?}: {detail}")]
    Schema {
        package: Option<String>,
        bundle: Option<String>,
        detail: String,
    },

    /// A cross-reference did not resolve: an unknown default channel, a
    /// channel entry naming a bundle that doesn't exist in the package, a
    /// deprecation target, a duplicate name in a namespace that must be
    /// unique.
    #[error("{detail}")]
    Reference {
        package: Option<String>,
        channel: Option<String>,
        detail: String,
    },

    /// A channel's upgrade graph violates a structural invariant: not
    /// exactly one head, or an unresolvable tie among equal-version
    /// replaces-edge candidates.
    #[error("package {package} channel {channel}: {detail}")]
    Graph {
        package: String,
        channel: String,
        detail: String,
    },

    /// An `olm.bundle.object` file-ref could not be resolved against the raw
    /// document set at build time.
    #[error("{path:?}: failed to resolve bundle object reference: {source}")]
    ObjectRef {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ModelError {
    pub(crate) fn schema(
        package: impl Into<Option<String>>,
        bundle: impl Into<Option<String>>,
        detail: impl Into<String>,
    ) -> ModelError {
        ModelError::Schema {
            package: package.into(),
            bundle: bundle.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn reference(
        package: impl Into<Option<String>>,
        channel: impl Into<Option<String>>,
        detail: impl Into<String>,
    ) -> ModelError {
        ModelError::Reference {
            package: package.into(),
            channel: channel.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn graph(package: &str, channel: &str, detail: impl Into<String>) -> ModelError {
        ModelError::Graph {
            package: package.to_owned(),
            channel: channel.to_owned(),
            detail: detail.into(),
        }
    }
}
