use tokio::sync::watch;
use tonic::Status;

use registry_query::Querier;

/// The state the [`Controller`](crate::init::Controller) drives the server
/// through. Every RPC handler waits on this before touching the model, so a
/// request that arrives mid-startup blocks instead of racing the builder.
#[derive(Clone)]
pub(crate) enum State {
    Initializing,
    Ready(Querier),
    Failed,
}

/// The receiving half of the readiness gate, cloned into every service
/// instance handed to `tonic`.
#[derive(Clone)]
pub(crate) struct Readiness {
    rx: watch::Receiver<State>,
}

impl Readiness {
    pub(crate) fn new(rx: watch::Receiver<State>) -> Readiness {
        Readiness { rx }
    }

    /// Waits for the model to be ready, or returns `Unavailable` once
    /// startup has failed or the controller has been dropped.
    pub(crate) async fn querier(&self) -> Result<Querier, Status> {
        let mut rx = self.rx.clone();
        loop {
            match &*rx.borrow() {
                State::Ready(querier) => return Ok(querier.clone()),
                State::Failed => return Err(Status::unavailable("registry failed to initialize")),
                State::Initializing => {}
            }
            if rx.changed().await.is_err() {
                return Err(Status::unavailable("registry is shutting down"));
            }
        }
    }
}
