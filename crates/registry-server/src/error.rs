/// Everything that can fail between process start and the gRPC transport
/// accepting its first request. Always fatal: the server never exposes a
/// partially-initialized model.
#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error(transparent)]
    Model(#[from] registry_model::ModelError),
    #[error(transparent)]
    Cache(#[from] registry_cache::CacheError),
    #[error("binding {addr}: {source}")]
    Bind {
        addr: std::net::SocketAddr,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("installing signal handler: {0}")]
    Signal(#[source] std::io::Error),
    #[error("configuring reflection service: {0}")]
    Reflection(#[source] tonic_reflection::server::Error),
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),
    #[error("startup task panicked: {0}")]
    Task(#[from] tokio::task::JoinError),
}
