mod logging;

use std::path::PathBuf;

use clap::Parser;
use logging::{init_logging, LogArgs, OrBail};
use registry_cache::CacheFormat;

/// Serves a validated catalog of operator packages, channels, and bundles
/// over gRPC.
#[derive(Debug, Parser)]
#[clap(name = "registry", about = "Operator catalog registry server")]
struct Args {
    /// Root directory of the file-based catalog to serve.
    catalog_root: PathBuf,

    /// TCP port to listen on for gRPC requests.
    #[arg(long, default_value_t = 50051)]
    port: u16,

    /// Directory for the on-disk cache. If unset, the cache is disabled and
    /// every query is answered straight from the in-memory model.
    #[arg(long = "cache-dir")]
    cache_dir: Option<PathBuf>,

    /// On-disk cache representation.
    #[arg(long = "cache-format", value_enum, default_value_t = CliCacheFormat::PogrebV1)]
    cache_format: CliCacheFormat,

    /// Fail startup on a cache digest mismatch instead of rebuilding.
    #[arg(long = "enforce-integrity")]
    enforce_integrity: bool,

    /// Ensure the cache is current, then exit without serving. Requires
    /// `--cache-dir`.
    #[arg(long = "cache-only")]
    cache_only: bool,

    /// File to receive the final error line on fatal exit.
    #[arg(long = "termination-log")]
    termination_log: Option<PathBuf>,

    /// Optional debug endpoint address. Accepted for interface
    /// compatibility; no profiling endpoint is bound.
    #[arg(long = "pprof-addr")]
    pprof_addr: Option<String>,

    /// Forces debug-level logging regardless of `--log.level`.
    #[arg(long)]
    debug: bool,

    #[clap(flatten)]
    log_args: LogArgs,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliCacheFormat {
    #[value(name = "pogreb.v1")]
    PogrebV1,
    #[value(name = "json")]
    Json,
}

impl std::fmt::Display for CliCacheFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CliCacheFormat::PogrebV1 => "pogreb.v1",
            CliCacheFormat::Json => "json",
        })
    }
}

impl From<CliCacheFormat> for CacheFormat {
    fn from(value: CliCacheFormat) -> CacheFormat {
        match value {
            CliCacheFormat::PogrebV1 => CacheFormat::Kv,
            CliCacheFormat::Json => CacheFormat::Json,
        }
    }
}

fn main() {
    let args = Args::parse();
    init_logging(&args.log_args, args.debug);

    if let Some(addr) = &args.pprof_addr {
        tracing::warn!(%addr, "pprofAddr is accepted but no profiling endpoint is bound");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .or_bail(args.termination_log.as_deref(), "building tokio runtime");

    let termination_log = args.termination_log.clone();

    if args.cache_only {
        let cache_dir = args
            .cache_dir
            .clone()
            .ok_or("--cache-only requires --cache-dir")
            .or_bail(termination_log.as_deref(), "validating arguments");
        let result = runtime.block_on(registry_server::ensure_cache(
            args.catalog_root,
            cache_dir,
            args.cache_format.into(),
            args.enforce_integrity,
        ));
        result.or_bail(termination_log.as_deref(), "ensuring cache");
        tracing::info!("cache is current, exiting");
        return;
    }

    let config = registry_server::ServeConfig {
        catalog_root: args.catalog_root,
        port: args.port,
        cache_dir: args.cache_dir,
        cache_format: args.cache_format.into(),
        enforce_integrity: args.enforce_integrity,
        cache_only_load: false,
    };

    let result = runtime.block_on(registry_server::serve(config));
    result.or_bail(termination_log.as_deref(), "serving registry");
}
