use std::collections::BTreeMap;

use registry_schema::ChannelEntry;

use crate::error::ModelError;
use crate::model::{BundleId, ChannelNode};

/// Derives a single channel's upgrade graph from its declared entries and the
/// versions of bundles in its package, per `spec.md` §4.3:
///
/// * each entry becomes a "real" node; a `replaces`/`skips` target absent
///   from the channel becomes a "synthetic" node so edges have somewhere to
///   point;
/// * `skipRange` materializes an implicit skip edge to every other real node
///   whose version satisfies the range;
/// * exactly one real node must have no incoming edge (the head);
/// * for each node, the single real predecessor that `replaces` it is
///   precomputed, breaking ties on greater version and failing fatally on an
///   exact tie (never silently picking one).
pub(crate) fn derive(
    package: &str,
    channel: &str,
    entries: &[ChannelEntry],
    bundle_versions: &BTreeMap<String, (BundleId, semver::Version)>,
) -> Result<(Vec<ChannelNode>, usize), ModelError> {
    let mut nodes: Vec<ChannelNode> = Vec::new();
    let mut index_of: BTreeMap<String, usize> = BTreeMap::new();

    for entry in entries {
        if index_of.contains_key(&entry.name) {
            continue;
        }
        let (bundle, version) = bundle_versions.get(&entry.name).cloned().ok_or_else(|| {
            ModelError::reference(
                package.to_owned(),
                channel.to_owned(),
                format!(
                    "channel entry {:?} names bundle {:?} which does not exist in package {:?}",
                    entry.name, entry.name, package
                ),
            )
        })?;
        let idx = nodes.len();
        index_of.insert(entry.name.clone(), idx);
        nodes.push(ChannelNode {
            bundle_name: entry.name.clone(),
            bundle: Some(bundle),
            version: Some(version),
            replaces: None,
            skips: Vec::new(),
            skip_range: None,
            replaced_by: None,
        });
    }
    let real_node_count = nodes.len();

    for entry in entries {
        let i = index_of[&entry.name];

        if let Some(replaces) = &entry.replaces {
            let target = resolve_or_synthesize(&mut nodes, &mut index_of, replaces);
            nodes[i].replaces = Some(target);
        }
        for skip in &entry.skips {
            let target = resolve_or_synthesize(&mut nodes, &mut index_of, skip);
            if !nodes[i].skips.contains(&target) {
                nodes[i].skips.push(target);
            }
        }
        if let Some(range) = &entry.skip_range {
            let parsed = semver::VersionReq::parse(range).map_err(|source| {
                ModelError::schema(
                    package.to_owned(),
                    entry.name.clone(),
                    format!("invalid skipRange {range:?}: {source}"),
                )
            })?;
            nodes[i].skip_range = Some(parsed);
        }
    }

    // Materialize implicit skip edges from skipRange, now that every real
    // node's version is known.
    for i in 0..real_node_count {
        let Some(range) = nodes[i].skip_range.clone() else {
            continue;
        };
        for j in 0..real_node_count {
            if i == j {
                continue;
            }
            let version = nodes[j].version.as_ref().expect("real node has a version");
            if range.matches(version) && !nodes[i].skips.contains(&j) {
                nodes[i].skips.push(j);
            }
        }
    }

    let head = find_head(package, channel, &nodes, real_node_count)?;
    resolve_replaced_by(package, channel, &mut nodes, real_node_count)?;

    Ok((nodes, head))
}

fn resolve_or_synthesize(
    nodes: &mut Vec<ChannelNode>,
    index_of: &mut BTreeMap<String, usize>,
    name: &str,
) -> usize {
    if let Some(&idx) = index_of.get(name) {
        return idx;
    }
    let idx = nodes.len();
    index_of.insert(name.to_owned(), idx);
    nodes.push(ChannelNode {
        bundle_name: name.to_owned(),
        bundle: None,
        version: None,
        replaces: None,
        skips: Vec::new(),
        skip_range: None,
        replaced_by: None,
    });
    idx
}

fn find_head(
    package: &str,
    channel: &str,
    nodes: &[ChannelNode],
    real_node_count: usize,
) -> Result<usize, ModelError> {
    let mut has_incoming = vec![false; nodes.len()];
    for node in nodes {
        if let Some(r) = node.replaces {
            has_incoming[r] = true;
        }
        for &s in &node.skips {
            has_incoming[s] = true;
        }
    }

    let candidates: Vec<usize> = (0..real_node_count)
        .filter(|&i| !has_incoming[i])
        .collect();

    match candidates.as_slice() {
        [head] => Ok(*head),
        [] => Err(ModelError::graph(
            package,
            channel,
            "channel has no head: every bundle is replaced or skipped by another",
        )),
        many => {
            let names: Vec<&str> = many.iter().map(|&i| nodes[i].bundle_name.as_str()).collect();
            Err(ModelError::graph(
                package,
                channel,
                format!("channel has {} heads: {:?}", many.len(), names),
            ))
        }
    }
}

fn resolve_replaced_by(
    package: &str,
    channel: &str,
    nodes: &mut [ChannelNode],
    real_node_count: usize,
) -> Result<(), ModelError> {
    for target in 0..real_node_count {
        let mut candidates: Vec<usize> = (0..real_node_count)
            .filter(|&y| nodes[y].replaces == Some(target))
            .collect();
        if candidates.is_empty() {
            continue;
        }
        candidates.sort_by(|&a, &b| nodes[b].version.cmp(&nodes[a].version));
        if candidates.len() > 1 && nodes[candidates[0]].version == nodes[candidates[1]].version {
            return Err(ModelError::graph(
                package,
                channel,
                format!(
                    "multiple replaces: both {:?} and {:?} replace {:?} at version {}",
                    nodes[candidates[0]].bundle_name,
                    nodes[candidates[1]].bundle_name,
                    nodes[target].bundle_name,
                    nodes[candidates[0]]
                        .version
                        .as_ref()
                        .expect("real node has a version"),
                ),
            ));
        }
        nodes[target].replaced_by = Some(candidates[0]);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, replaces: Option<&str>, skips: &[&str], range: Option<&str>) -> ChannelEntry {
        ChannelEntry {
            name: name.to_owned(),
            replaces: replaces.map(str::to_owned),
            skips: skips.iter().map(|s| (*s).to_owned()).collect(),
            skip_range: range.map(str::to_owned),
        }
    }

    fn versions(pairs: &[(&str, &str)]) -> BTreeMap<String, (BundleId, semver::Version)> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (name, version))| {
                (
                    (*name).to_owned(),
                    (BundleId(i), semver::Version::parse(version).unwrap()),
                )
            })
            .collect()
    }

    #[test]
    fn replaces_chain_has_single_head_and_tail() {
        let entries = vec![entry("p.v1", None, &[], None), entry("p.v2", Some("p.v1"), &[], None)];
        let bundles = versions(&[("p.v1", "1.0.0"), ("p.v2", "1.1.0")]);
        let (nodes, head) = derive("p", "stable", &entries, &bundles).unwrap();
        assert_eq!(nodes[head].bundle_name, "p.v2");
        assert_eq!(nodes[0].replaced_by, Some(1));
    }

    #[test]
    fn two_heads_is_a_graph_error() {
        let entries = vec![
            entry("p.v1", None, &[], None),
            entry("p.v2", Some("p.v1"), &[], None),
            entry("p.v2b", None, &[], None),
        ];
        let bundles = versions(&[("p.v1", "1.0.0"), ("p.v2", "1.1.0"), ("p.v2b", "1.2.0")]);
        let err = derive("p", "stable", &entries, &bundles).unwrap_err();
        assert!(matches!(err, ModelError::Graph { .. }));
    }

    #[test]
    fn skip_range_materializes_edges_to_matching_versions() {
        let entries = vec![
            entry("q.v1", None, &[], None),
            entry("q.v2", None, &[], None),
            entry("q.v3", None, &[], Some(">=1.0.0, <1.5.0")),
        ];
        let bundles = versions(&[("q.v1", "1.0.0"), ("q.v2", "1.2.0"), ("q.v3", "1.5.0")]);
        let (nodes, head) = derive("q", "alpha", &entries, &bundles).unwrap();
        assert_eq!(nodes[head].bundle_name, "q.v3");
        assert!(nodes[2].skips.contains(&0));
        assert!(nodes[2].skips.contains(&1));
    }

    #[test]
    fn replaces_target_outside_channel_is_synthetic() {
        let entries = vec![entry("p.v2", Some("p.v1"), &[], None)];
        let bundles = versions(&[("p.v2", "1.1.0")]);
        let (nodes, head) = derive("p", "stable", &entries, &bundles).unwrap();
        assert_eq!(nodes[head].bundle_name, "p.v2");
        let synthetic = &nodes[nodes[head].replaces.unwrap()];
        assert!(synthetic.is_synthetic());
        assert_eq!(synthetic.bundle_name, "p.v1");
    }

    #[test]
    fn equal_version_tie_is_a_graph_error_not_a_silent_pick() {
        let entries = vec![
            entry("p.v1", None, &[], None),
            entry("p.v2a", Some("p.v1"), &[], None),
            entry("p.v2b", Some("p.v1"), &[], None),
        ];
        let bundles = versions(&[("p.v1", "1.0.0"), ("p.v2a", "1.1.0"), ("p.v2b", "1.1.0")]);
        let err = derive("p", "stable", &entries, &bundles).unwrap_err();
        match err {
            ModelError::Graph { detail, .. } => assert!(detail.contains("multiple replaces")),
            other => panic!("expected Graph error, got {other:?}"),
        }
    }
}
