use std::sync::Arc;

use futures_core::Stream;
use registry_model::{BundleId, Model, PackageId};
use registry_schema::GroupVersionKind;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::error::QueryError;
use crate::views::ChannelEntryView;

/// Answers read-only questions against a single, immutable [`Model`].
///
/// Every streaming operation accepts a [`CancellationToken`] and stops
/// producing items as soon as it's cancelled, rather than running to
/// completion regardless of whether a client is still listening.
#[derive(Clone)]
pub struct Querier {
    model: Arc<Model>,
}

impl Querier {
    pub fn new(model: Arc<Model>) -> Querier {
        Querier { model }
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn list_packages(&self, cancel: CancellationToken) -> impl Stream<Item = Result<String, QueryError>> {
        let names: Vec<String> = self.model.packages().map(|p| p.name.clone()).collect();
        cancellable(names, cancel).map(Ok)
    }

    pub fn get_package(&self, name: &str) -> Result<PackageId, QueryError> {
        self.model
            .package_id_by_name(name)
            .ok_or_else(|| QueryError::not_found(format!("package {name:?} does not exist")))
    }

    pub fn get_bundle_for_channel(&self, package: &str, channel: &str) -> Result<BundleId, QueryError> {
        let package_id = self.get_package(package)?;
        let channel_id = self.model.channel_by_name(package_id, channel).ok_or_else(|| {
            QueryError::not_found(format!("channel {channel:?} does not exist in package {package:?}"))
        })?;
        Ok(self.model.head_bundle(channel_id))
    }

    pub fn get_bundle(&self, package: &str, channel: &str, bundle: &str) -> Result<BundleId, QueryError> {
        let package_id = self.get_package(package)?;
        let channel_id = self.model.channel_by_name(package_id, channel).ok_or_else(|| {
            QueryError::not_found(format!("channel {channel:?} does not exist in package {package:?}"))
        })?;
        let record = self.model.channel(channel_id);
        record
            .nodes
            .iter()
            .find(|node| node.bundle_name == bundle)
            .and_then(|node| node.bundle)
            .ok_or_else(|| {
                QueryError::not_found(format!(
                    "bundle {bundle:?} does not exist in channel {channel:?} of package {package:?}"
                ))
            })
    }

    pub fn get_channel_entries_that_replace(
        &self,
        bundle: &str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<ChannelEntryView, QueryError>> {
        let mut entries = Vec::new();
        for package in self.model.packages() {
            for &channel_id in &package.channels {
                let channel = self.model.channel(channel_id);
                for node in &channel.nodes {
                    if node.is_synthetic() {
                        continue;
                    }
                    let replaces_target = node
                        .replaces
                        .map(|idx| channel.nodes[idx].bundle_name.as_str());
                    let skips_target = node
                        .skips
                        .iter()
                        .any(|&idx| channel.nodes[idx].bundle_name == bundle);
                    if replaces_target == Some(bundle) || skips_target {
                        entries.push(channel_entry_view(&package.name, channel, node));
                    }
                }
            }
        }
        cancellable(entries, cancel).map(Ok)
    }

    pub fn get_bundle_that_replaces(
        &self,
        bundle: &str,
        package: &str,
        channel: &str,
    ) -> Result<BundleId, QueryError> {
        let package_id = self.get_package(package)?;
        let channel_id = self.model.channel_by_name(package_id, channel).ok_or_else(|| {
            QueryError::not_found(format!("channel {channel:?} does not exist in package {package:?}"))
        })?;
        let record = self.model.channel(channel_id);
        let target = record
            .nodes
            .iter()
            .position(|node| node.bundle_name == bundle)
            .ok_or_else(|| {
                QueryError::not_found(format!(
                    "bundle {bundle:?} does not exist in channel {channel:?} of package {package:?}"
                ))
            })?;
        let winner = record.nodes[target].replaced_by.ok_or_else(|| {
            QueryError::not_found(format!(
                "no bundle in channel {channel:?} of package {package:?} replaces {bundle:?}"
            ))
        })?;
        record.nodes[winner].bundle.ok_or_else(|| {
            QueryError::Internal {
                detail: "replaced_by points at a synthetic node".to_owned(),
            }
        })
    }

    pub fn get_channel_entries_that_provide(
        &self,
        gvk: &GroupVersionKind,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<ChannelEntryView, QueryError>> {
        let entries = self.providers(gvk, false);
        cancellable(entries, cancel).map(Ok)
    }

    pub fn get_latest_channel_entries_that_provide(
        &self,
        gvk: &GroupVersionKind,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<ChannelEntryView, QueryError>> {
        let entries = self.providers(gvk, true);
        cancellable(entries, cancel).map(Ok)
    }

    /// Packages are visited in lexicographic name order (the [`Model`]'s
    /// package map is a `BTreeMap`), so the first match is deterministic.
    pub fn get_default_bundle_that_provides(&self, gvk: &GroupVersionKind) -> Result<BundleId, QueryError> {
        for package in self.model.packages() {
            let head = self.model.head_bundle(package.default_channel);
            if self.model.bundle(head).provided_gvks().any(|g| g == gvk) {
                return Ok(head);
            }
        }
        Err(QueryError::not_found(format!(
            "no package's default channel head provides {}/{} {}",
            gvk.group, gvk.version, gvk.kind
        )))
    }

    pub fn list_bundles(
        &self,
        package: Option<&str>,
        cancel: CancellationToken,
    ) -> Result<impl Stream<Item = Result<BundleId, QueryError>>, QueryError> {
        let ids: Vec<BundleId> = match package {
            Some(name) => {
                let package_id = self.get_package(name)?;
                self.model.package(package_id).bundles.clone()
            }
            None => self.model.bundle_ids().collect(),
        };
        Ok(cancellable(ids, cancel).map(Ok))
    }

    fn providers(&self, gvk: &GroupVersionKind, latest_only: bool) -> Vec<ChannelEntryView> {
        let mut entries = Vec::new();
        for package in self.model.packages() {
            for &channel_id in &package.channels {
                let channel = self.model.channel(channel_id);
                for (node_index, node) in channel.nodes.iter().enumerate() {
                    let Some(bundle_id) = node.bundle else { continue };
                    if !self.model.bundle(bundle_id).provided_gvks().any(|g| g == gvk) {
                        continue;
                    }
                    if latest_only && node_index != channel.head {
                        continue;
                    }
                    entries.push(channel_entry_view(&package.name, channel, node));
                }
            }
        }
        entries
    }
}

fn channel_entry_view(
    package: &str,
    channel: &registry_model::ChannelRecord,
    node: &registry_model::ChannelNode,
) -> ChannelEntryView {
    ChannelEntryView {
        package: package.to_owned(),
        channel: channel.name.clone(),
        bundle: node.bundle_name.clone(),
        replaces: node.replaces.map(|idx| channel.nodes[idx].bundle_name.clone()),
        skips: node
            .skips
            .iter()
            .map(|&idx| channel.nodes[idx].bundle_name.clone())
            .collect(),
        version: node.version.as_ref().map(|v| v.to_string()),
    }
}

fn cancellable<T: 'static>(
    items: Vec<T>,
    cancel: CancellationToken,
) -> impl Stream<Item = T> {
    tokio_stream::iter(items).take_while(move |_| !cancel.is_cancelled())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn write(dir: &Path, name: &str, contents: &str) {
        std::fs::write(dir.join(name), contents).unwrap();
    }

    fn fixture() -> Querier {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "etcd.json",
            r#"{"schema":"olm.package","name":"etcd","defaultChannel":"stable"}
{"schema":"olm.bundle","name":"etcd.v1.0.0","package":"etcd","image":"quay.io/e/etcd:1.0.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.0.0"}},
  {"type":"olm.gvk","value":{"group":"etcd.database.coreos.com","version":"v1beta2","kind":"EtcdCluster"}}
]}
{"schema":"olm.bundle","name":"etcd.v1.1.0","package":"etcd","image":"quay.io/e/etcd:1.1.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.1.0"}},
  {"type":"olm.gvk","value":{"group":"etcd.database.coreos.com","version":"v1beta2","kind":"EtcdCluster"}}
]}
{"schema":"olm.channel","name":"stable","package":"etcd","entries":[
  {"name":"etcd.v1.0.0"},
  {"name":"etcd.v1.1.0","replaces":"etcd.v1.0.0"}
]}"#,
        );
        let model = registry_model::build(dir.path()).unwrap();
        Querier::new(Arc::new(model))
    }

    #[tokio::test]
    async fn list_packages_yields_every_package() {
        let querier = fixture();
        let names: Vec<_> = querier
            .list_packages(CancellationToken::new())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(names, vec![Ok("etcd".to_owned())]);
    }

    #[tokio::test]
    async fn get_bundle_for_channel_returns_the_head() {
        let querier = fixture();
        let bundle_id = querier.get_bundle_for_channel("etcd", "stable").unwrap();
        assert_eq!(querier.model().bundle(bundle_id).name, "etcd.v1.1.0");
    }

    #[tokio::test]
    async fn get_bundle_that_replaces_follows_the_precomputed_edge() {
        let querier = fixture();
        let bundle_id = querier
            .get_bundle_that_replaces("etcd.v1.0.0", "etcd", "stable")
            .unwrap();
        assert_eq!(querier.model().bundle(bundle_id).name, "etcd.v1.1.0");
    }

    #[tokio::test]
    async fn get_default_bundle_that_provides_finds_the_gvk() {
        let querier = fixture();
        let gvk = GroupVersionKind {
            group: "etcd.database.coreos.com".to_owned(),
            version: "v1beta2".to_owned(),
            kind: "EtcdCluster".to_owned(),
        };
        let bundle_id = querier.get_default_bundle_that_provides(&gvk).unwrap();
        assert_eq!(querier.model().bundle(bundle_id).name, "etcd.v1.1.0");
    }

    #[tokio::test]
    async fn latest_providers_excludes_the_superseded_bundle() {
        let querier = fixture();
        let gvk = GroupVersionKind {
            group: "etcd.database.coreos.com".to_owned(),
            version: "v1beta2".to_owned(),
            kind: "EtcdCluster".to_owned(),
        };
        let latest: Vec<_> = querier
            .get_latest_channel_entries_that_provide(&gvk, CancellationToken::new())
            .collect::<Vec<_>>()
            .await;
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].as_ref().unwrap().bundle, "etcd.v1.1.0");
    }

    #[tokio::test]
    async fn latest_providers_excludes_a_non_head_whose_successor_does_not_redeclare() {
        // Three-entry chain: v1 -> v2 -> v3 (head). v1 and v2 both provide the
        // gvk; v3 (the actual head) does not. Checking only the immediate
        // successor would wrongly keep v2, since v3 doesn't redeclare it.
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "etcd.json",
            r#"{"schema":"olm.package","name":"etcd","defaultChannel":"stable"}
{"schema":"olm.bundle","name":"etcd.v1","package":"etcd","image":"quay.io/e/etcd:1.0.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.0.0"}},
  {"type":"olm.gvk","value":{"group":"etcd.database.coreos.com","version":"v1beta2","kind":"EtcdCluster"}}
]}
{"schema":"olm.bundle","name":"etcd.v2","package":"etcd","image":"quay.io/e/etcd:1.1.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.1.0"}},
  {"type":"olm.gvk","value":{"group":"etcd.database.coreos.com","version":"v1beta2","kind":"EtcdCluster"}}
]}
{"schema":"olm.bundle","name":"etcd.v3","package":"etcd","image":"quay.io/e/etcd:1.2.0","properties":[
  {"type":"olm.package","value":{"packageName":"etcd","version":"1.2.0"}}
]}
{"schema":"olm.channel","name":"stable","package":"etcd","entries":[
  {"name":"etcd.v1"},
  {"name":"etcd.v2","replaces":"etcd.v1"},
  {"name":"etcd.v3","replaces":"etcd.v2"}
]}"#,
        );
        let model = registry_model::build(dir.path()).unwrap();
        let querier = Querier::new(Arc::new(model));

        let gvk = GroupVersionKind {
            group: "etcd.database.coreos.com".to_owned(),
            version: "v1beta2".to_owned(),
            kind: "EtcdCluster".to_owned(),
        };
        let latest: Vec<_> = querier
            .get_latest_channel_entries_that_provide(&gvk, CancellationToken::new())
            .collect::<Vec<_>>()
            .await;
        assert!(latest.is_empty(), "the head etcd.v3 does not provide the gvk, so nothing should");
    }

    #[tokio::test]
    async fn cancelling_stops_the_stream_early() {
        let querier = fixture();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let names: Vec<_> = querier.list_packages(cancel).collect::<Vec<_>>().await;
        assert!(names.is_empty());
    }
}
