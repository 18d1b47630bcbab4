use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio_stream::StreamExt;
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::{Request, Response, Status};

use registry_model::ChannelId;
use registry_proto::v1 as proto;
use registry_proto::v1::registry_server::Registry;
use registry_query::QueryError;

use crate::convert::{self, ChannelContext};
use crate::readiness::Readiness;

fn to_status(err: QueryError) -> Status {
    match err {
        QueryError::NotFound { detail } => Status::not_found(detail),
        QueryError::Cancelled => Status::cancelled("operation cancelled"),
        QueryError::Internal { detail } => Status::internal(detail),
    }
}

/// The transport-level [`Registry`] implementation. Holds no state of its
/// own beyond the readiness gate: every RPC resolves a [`registry_query::Querier`]
/// from it and answers directly against the model it wraps.
#[derive(Clone)]
pub struct RegistryService {
    ready: Readiness,
}

impl RegistryService {
    pub(crate) fn new(ready: Readiness) -> RegistryService {
        RegistryService { ready }
    }

    /// A fresh cancellation token for a single streaming request. The model
    /// is fully in memory, so a query's traversal completes before the first
    /// item is sent; the token only gates how many already-collected items
    /// still get forwarded once a caller cancels or the connection drops.
    fn request_token() -> CancellationToken {
        CancellationToken::new()
    }
}

/// Ties a token's lifetime to a response stream's: `tonic` drops the stream
/// as soon as the client cancels the call or the connection goes away, which
/// runs the guard's `Drop` and cancels the token the querier is watching.
struct CancelOnDrop<S> {
    inner: S,
    _guard: DropGuard,
}

impl<S> CancelOnDrop<S> {
    fn new(inner: S, cancel: CancellationToken) -> CancelOnDrop<S> {
        CancelOnDrop {
            inner,
            _guard: cancel.drop_guard(),
        }
    }
}

impl<S: Stream + Unpin> Stream for CancelOnDrop<S> {
    type Item = S::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.get_mut().inner).poll_next(cx)
    }
}

type EntryStream = Pin<Box<dyn Stream<Item = Result<proto::ChannelEntry, Status>> + Send + 'static>>;
type BundleStream = Pin<Box<dyn Stream<Item = Result<proto::Bundle, Status>> + Send + 'static>>;
type PackageNameStream = Pin<Box<dyn Stream<Item = Result<proto::PackageName, Status>> + Send + 'static>>;

#[tonic::async_trait]
impl Registry for RegistryService {
    type ListPackagesStream = PackageNameStream;
    type GetChannelEntriesThatReplaceStream = EntryStream;
    type GetChannelEntriesThatProvideStream = EntryStream;
    type GetLatestChannelEntriesThatProvideStream = EntryStream;
    type ListBundlesStream = BundleStream;

    async fn list_packages(
        &self,
        _request: Request<proto::ListPackagesRequest>,
    ) -> Result<Response<Self::ListPackagesStream>, Status> {
        let querier = self.ready.querier().await?;
        let cancel = Self::request_token();
        let stream = querier
            .list_packages(cancel.clone())
            .map(|r| r.map(|name| proto::PackageName { name }).map_err(to_status));
        Ok(Response::new(Box::pin(CancelOnDrop::new(stream, cancel))))
    }

    async fn get_package(
        &self,
        request: Request<proto::GetPackageRequest>,
    ) -> Result<Response<proto::Package>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let package_id = querier.get_package(&req.name).map_err(to_status)?;
        let model = querier.model();
        let package = convert::package_to_proto(model, model.package(package_id));
        Ok(Response::new(package))
    }

    async fn get_bundle(
        &self,
        request: Request<proto::GetBundleRequest>,
    ) -> Result<Response<proto::Bundle>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let bundle_id = querier
            .get_bundle(&req.package_name, &req.channel_name, &req.csv_name)
            .map_err(to_status)?;
        let model = querier.model();
        let package_id = querier.get_package(&req.package_name).map_err(to_status)?;
        let channel_id = model
            .channel_by_name(package_id, &req.channel_name)
            .ok_or_else(|| Status::not_found(format!("channel {:?} does not exist", req.channel_name)))?;
        let context = channel_context(model, channel_id, bundle_id);
        Ok(Response::new(convert::bundle_to_proto(model, model.bundle(bundle_id), context)))
    }

    async fn get_bundle_for_channel(
        &self,
        request: Request<proto::GetBundleForChannelRequest>,
    ) -> Result<Response<proto::Bundle>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let bundle_id = querier
            .get_bundle_for_channel(&req.package_name, &req.channel_name)
            .map_err(to_status)?;
        let model = querier.model();
        let package_id = querier.get_package(&req.package_name).map_err(to_status)?;
        let channel_id = model
            .channel_by_name(package_id, &req.channel_name)
            .ok_or_else(|| Status::not_found(format!("channel {:?} does not exist", req.channel_name)))?;
        let context = channel_context(model, channel_id, bundle_id);
        Ok(Response::new(convert::bundle_to_proto(model, model.bundle(bundle_id), context)))
    }

    async fn get_channel_entries_that_replace(
        &self,
        request: Request<proto::GetChannelEntriesThatReplaceRequest>,
    ) -> Result<Response<Self::GetChannelEntriesThatReplaceStream>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let cancel = Self::request_token();
        let stream = querier
            .get_channel_entries_that_replace(&req.bundle_name, cancel.clone())
            .map(|r| r.map(|v| convert::channel_entry_view_to_proto(&v)).map_err(to_status));
        Ok(Response::new(Box::pin(CancelOnDrop::new(stream, cancel))))
    }

    async fn get_bundle_that_replaces(
        &self,
        request: Request<proto::GetBundleThatReplacesRequest>,
    ) -> Result<Response<proto::Bundle>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let bundle_id = querier
            .get_bundle_that_replaces(&req.csv_name, &req.package_name, &req.channel_name)
            .map_err(to_status)?;
        let model = querier.model();
        let package_id = querier.get_package(&req.package_name).map_err(to_status)?;
        let channel_id = model
            .channel_by_name(package_id, &req.channel_name)
            .ok_or_else(|| Status::not_found(format!("channel {:?} does not exist", req.channel_name)))?;
        let context = channel_context(model, channel_id, bundle_id);
        Ok(Response::new(convert::bundle_to_proto(model, model.bundle(bundle_id), context)))
    }

    async fn get_channel_entries_that_provide(
        &self,
        request: Request<proto::GetChannelEntriesThatProvideRequest>,
    ) -> Result<Response<Self::GetChannelEntriesThatProvideStream>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let gvk = req
            .gvk
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("gvk is required"))?;
        let gvk = convert::gvk_from_proto(gvk);
        let cancel = Self::request_token();
        let stream = querier
            .get_channel_entries_that_provide(&gvk, cancel.clone())
            .map(|r| r.map(|v| convert::channel_entry_view_to_proto(&v)).map_err(to_status));
        Ok(Response::new(Box::pin(CancelOnDrop::new(stream, cancel))))
    }

    async fn get_latest_channel_entries_that_provide(
        &self,
        request: Request<proto::GetLatestChannelEntriesThatProvideRequest>,
    ) -> Result<Response<Self::GetLatestChannelEntriesThatProvideStream>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let gvk = req
            .gvk
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("gvk is required"))?;
        let gvk = convert::gvk_from_proto(gvk);
        let cancel = Self::request_token();
        let stream = querier
            .get_latest_channel_entries_that_provide(&gvk, cancel.clone())
            .map(|r| r.map(|v| convert::channel_entry_view_to_proto(&v)).map_err(to_status));
        Ok(Response::new(Box::pin(CancelOnDrop::new(stream, cancel))))
    }

    async fn get_default_bundle_that_provides(
        &self,
        request: Request<proto::GetDefaultBundleThatProvidesRequest>,
    ) -> Result<Response<proto::Bundle>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let gvk = req
            .gvk
            .as_ref()
            .ok_or_else(|| Status::invalid_argument("gvk is required"))?;
        let gvk = convert::gvk_from_proto(gvk);
        let bundle_id = querier.get_default_bundle_that_provides(&gvk).map_err(to_status)?;
        let model = querier.model();
        let package_id = model.bundle(bundle_id).package;
        let channel_id = model.package(package_id).default_channel;
        let context = channel_context(model, channel_id, bundle_id);
        Ok(Response::new(convert::bundle_to_proto(model, model.bundle(bundle_id), context)))
    }

    async fn list_bundles(
        &self,
        request: Request<proto::ListBundlesRequest>,
    ) -> Result<Response<Self::ListBundlesStream>, Status> {
        let querier = self.ready.querier().await?;
        let req = request.into_inner();
        let package = if req.package_name.is_empty() {
            None
        } else {
            Some(req.package_name.as_str())
        };
        let cancel = Self::request_token();
        let stream = querier.list_bundles(package, cancel.clone()).map_err(to_status)?;
        let model = querier.model().clone();
        let stream = stream.map(move |r| r.map(|id| convert::bundle_to_proto(&model, model.bundle(id), None)).map_err(to_status));
        Ok(Response::new(Box::pin(CancelOnDrop::new(stream, cancel))))
    }
}

/// Looks up the node that carries `bundle_id` within `channel_id`, so
/// responses resolved by a channel/bundle pair can report `replaces`/`skips`.
/// A bundle found via `get_default_bundle_that_provides` or `get_bundle_that_replaces`
/// is always the node the query actually walked, so this always finds it.
fn channel_context<'a>(
    model: &'a registry_model::Model,
    channel_id: ChannelId,
    bundle_id: registry_model::BundleId,
) -> Option<ChannelContext<'a>> {
    let channel = model.channel(channel_id);
    channel
        .nodes
        .iter()
        .find(|node| node.bundle == Some(bundle_id))
        .map(|node| ChannelContext { channel, node })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::watch;
    use tokio_stream::StreamExt;

    use crate::readiness::State;

    use super::*;

    fn write(dir: &std::path::Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn service() -> RegistryService {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "etcd.json",
            r#"{"schema":"olm.package","name":"etcd","defaultChannel":"stable"}
{"schema":"olm.bundle","name":"etcd.v1.0.0","package":"etcd","image":"quay.io/e/etcd:1.0.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.0.0"}}
]}
{"schema":"olm.bundle","name":"etcd.v1.1.0","package":"etcd","image":"quay.io/e/etcd:1.1.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.1.0"}}
]}
{"schema":"olm.channel","name":"stable","package":"etcd","entries":[
  {"name":"etcd.v1.0.0"},
  {"name":"etcd.v1.1.0","replaces":"etcd.v1.0.0"}
]}"#,
        );
        let model = registry_model::build(dir.path()).unwrap();
        let querier = registry_query::Querier::new(Arc::new(model));
        let (_tx, rx) = watch::channel(State::Ready(querier));
        RegistryService::new(Readiness::new(rx))
    }

    fn failed_service() -> RegistryService {
        let (_tx, rx) = watch::channel(State::Failed);
        RegistryService::new(Readiness::new(rx))
    }

    #[tokio::test]
    async fn unready_service_returns_unavailable() {
        let svc = failed_service();
        let err = svc
            .get_package(Request::new(proto::GetPackageRequest { name: "etcd".to_owned() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::Unavailable);
    }

    #[tokio::test]
    async fn get_package_returns_channels_and_head_csv_name() {
        let svc = service();
        let response = svc
            .get_package(Request::new(proto::GetPackageRequest { name: "etcd".to_owned() }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.name, "etcd");
        assert_eq!(response.channels.len(), 1);
        assert_eq!(response.channels[0].csv_name, "etcd.v1.1.0");
    }

    #[tokio::test]
    async fn get_package_unknown_is_not_found() {
        let svc = service();
        let err = svc
            .get_package(Request::new(proto::GetPackageRequest { name: "nope".to_owned() }))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::NotFound);
    }

    #[tokio::test]
    async fn get_bundle_for_channel_carries_channel_edges() {
        let svc = service();
        let response = svc
            .get_bundle_for_channel(Request::new(proto::GetBundleForChannelRequest {
                package_name: "etcd".to_owned(),
                channel_name: "stable".to_owned(),
            }))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(response.csv_name, "etcd.v1.1.0");
        assert_eq!(response.channel_name, "stable");
        assert_eq!(response.replaces, "etcd.v1.0.0");
    }

    #[tokio::test]
    async fn list_packages_streams_every_package() {
        let svc = service();
        let mut stream = svc
            .list_packages(Request::new(proto::ListPackagesRequest {}))
            .await
            .unwrap()
            .into_inner();
        let mut names = Vec::new();
        while let Some(item) = stream.next().await {
            names.push(item.unwrap().name);
        }
        assert_eq!(names, vec!["etcd".to_owned()]);
    }

    #[tokio::test]
    async fn list_bundles_without_a_package_filter_omits_channel_edges() {
        let svc = service();
        let mut stream = svc
            .list_bundles(Request::new(proto::ListBundlesRequest { package_name: String::new() }))
            .await
            .unwrap()
            .into_inner();
        let mut versions = Vec::new();
        while let Some(item) = stream.next().await {
            let bundle = item.unwrap();
            assert_eq!(bundle.channel_name, "");
            versions.push(bundle.version);
        }
        versions.sort();
        assert_eq!(versions, vec!["1.0.0".to_owned(), "1.1.0".to_owned()]);
    }
}
