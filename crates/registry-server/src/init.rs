use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

use registry_cache::{Cache, CacheFormat};
use registry_model::Model;
use registry_query::Querier;

use crate::error::InitError;
use crate::readiness::{Readiness, State};

/// Configuration the [`Controller`] needs to build (or load) the catalog
/// before the transport is allowed to accept queries.
pub struct InitConfig {
    pub catalog_root: PathBuf,
    pub cache_dir: Option<PathBuf>,
    pub cache_format: CacheFormat,
    pub enforce_integrity: bool,
}

/// Sequences startup so that queries observe a fully-initialized store:
/// create the model (loader + builder), ensure the cache is current (or
/// bypass it entirely when disabled), then open the readiness gate. A
/// failure anywhere in between marks the gate `Failed` rather than leaving
/// waiters blocked forever.
pub struct Controller {
    tx: watch::Sender<State>,
}

impl Controller {
    pub fn new() -> (Controller, Readiness) {
        let (tx, rx) = watch::channel(State::Initializing);
        (Controller { tx }, Readiness::new(rx))
    }

    /// Runs the load/build/cache-ensure sequence. Filesystem walking, JSON
    /// and YAML decoding, and upgrade-graph derivation are all blocking CPU
    /// work, so it runs on tokio's blocking pool rather than the async
    /// runtime's worker threads.
    pub async fn initialize(&self, config: InitConfig) -> Result<Model, InitError> {
        let result = tokio::task::spawn_blocking(move || -> Result<Model, InitError> {
            match config.cache_dir {
                Some(dir) => {
                    let cache = Cache::new(dir, config.cache_format);
                    Ok(cache.ensure(&config.catalog_root, config.enforce_integrity)?)
                }
                None => Ok(registry_model::build(&config.catalog_root)?),
            }
        })
        .await;

        match result {
            Ok(Ok(model)) => {
                tracing::info!("catalog model ready");
                Ok(model)
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "startup failed");
                let _ = self.tx.send(State::Failed);
                Err(err)
            }
            Err(join_err) => {
                let err = InitError::Task(join_err);
                tracing::error!(error = %err, "startup task panicked");
                let _ = self.tx.send(State::Failed);
                Err(err)
            }
        }
    }

    /// Loads a previously built cache without touching the source catalog
    /// at all. Used by servers that start in a directory where only the
    /// cache, not the original FBC tree, is present.
    pub async fn initialize_from_cache(
        &self,
        cache_dir: PathBuf,
        cache_format: CacheFormat,
    ) -> Result<Model, InitError> {
        let result = tokio::task::spawn_blocking(move || -> Result<Model, InitError> {
            let cache = Cache::new(cache_dir, cache_format);
            Ok(cache.load()?)
        })
        .await;

        match result {
            Ok(Ok(model)) => {
                tracing::info!("catalog model loaded from cache");
                Ok(model)
            }
            Ok(Err(err)) => {
                tracing::error!(error = %err, "loading cached model failed");
                let _ = self.tx.send(State::Failed);
                Err(err)
            }
            Err(join_err) => {
                let err = InitError::Task(join_err);
                let _ = self.tx.send(State::Failed);
                Err(err)
            }
        }
    }

    /// Opens the readiness gate, unblocking any request that arrived while
    /// startup was still running.
    pub fn signal_ready(&self, model: Model) {
        let querier = Querier::new(Arc::new(model));
        let _ = self.tx.send(State::Ready(querier));
    }
}
