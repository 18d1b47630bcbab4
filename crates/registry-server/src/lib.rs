//! Wires the Querier up to a `tonic` transport: the gRPC `Registry` service
//! itself, a standard health service, server reflection for debuggability,
//! and the [`Controller`] that sequences startup ahead of all three.

mod convert;
mod error;
mod init;
mod readiness;
mod service;

use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::signal::unix::{self, SignalKind};
use tonic::transport::server::TcpIncoming;

use init::{Controller, InitConfig};

pub use error::InitError;
pub use registry_cache::CacheFormat;
pub use service::RegistryService;

/// Configuration for a full server run: build/load the catalog, then serve
/// it over gRPC until a termination signal arrives.
pub struct ServeConfig {
    pub catalog_root: PathBuf,
    pub port: u16,
    pub cache_dir: Option<PathBuf>,
    pub cache_format: CacheFormat,
    pub enforce_integrity: bool,
    /// When set, the catalog directory is never walked: the model is loaded
    /// straight from `cache_dir`, which must already exist.
    pub cache_only_load: bool,
}

/// Runs load -> validate -> cache-ensure and returns without ever starting
/// the transport. This is cache-only mode (`--cache-only`): it exists so CI
/// can pre-build a cache directory without standing up a listener.
pub async fn ensure_cache(
    catalog_root: PathBuf,
    cache_dir: PathBuf,
    cache_format: CacheFormat,
    enforce_integrity: bool,
) -> Result<(), InitError> {
    let (controller, _readiness) = Controller::new();
    controller
        .initialize(InitConfig {
            catalog_root,
            cache_dir: Some(cache_dir),
            cache_format,
            enforce_integrity,
        })
        .await?;
    Ok(())
}

/// Runs the full Initialization Controller protocol, then serves gRPC until
/// SIGINT or SIGTERM. Returns once the server has shut down cleanly.
pub async fn serve(config: ServeConfig) -> Result<(), InitError> {
    let addr: SocketAddr = ([0, 0, 0, 0], config.port).into();

    let (controller, readiness) = Controller::new();

    let model = if config.cache_only_load {
        let dir = config
            .cache_dir
            .clone()
            .expect("cache_only_load requires cache_dir to be set");
        controller.initialize_from_cache(dir, config.cache_format).await?
    } else {
        controller
            .initialize(InitConfig {
                catalog_root: config.catalog_root.clone(),
                cache_dir: config.cache_dir.clone(),
                cache_format: config.cache_format,
                enforce_integrity: config.enforce_integrity,
            })
            .await?
    };

    // Only bind once the model (or cache) has been proven good: a strict-
    // integrity mismatch must fail before the port is ever listening.
    let incoming = TcpIncoming::new(addr, true, None).map_err(|source| InitError::Bind { addr, source })?;

    let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
    health_reporter
        .set_serving::<registry_proto::v1::registry_server::RegistryServer<RegistryService>>()
        .await;

    let reflection_service = tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(registry_proto::FILE_DESCRIPTOR_SET)
        .build_v1()
        .map_err(InitError::Reflection)?;

    controller.signal_ready(model);
    tracing::info!(%addr, "registry server ready");

    let registry_service = registry_proto::v1::registry_server::RegistryServer::new(RegistryService::new(readiness));

    let mut sigint = unix::signal(SignalKind::interrupt()).map_err(InitError::Signal)?;
    let mut sigterm = unix::signal(SignalKind::terminate()).map_err(InitError::Signal)?;

    let signal = async move {
        tokio::select! {
            _ = sigint.recv() => (),
            _ = sigterm.recv() => (),
        }
        tracing::info!("caught signal to exit");
    };

    tonic::transport::Server::builder()
        .add_service(registry_service)
        .add_service(health_service)
        .add_service(reflection_service)
        .serve_with_incoming_shutdown(incoming, signal)
        .await?;

    Ok(())
}
