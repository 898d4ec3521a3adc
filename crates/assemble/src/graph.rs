use itertools::Itertools;
use models::{BundleName, ChannelName, PackageName};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet};

/// The kind of a directed upgrade edge between two bundles of a channel.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum EdgeKind {
    Replaces,
    Skips,
    SkipRange,
}

#[derive(thiserror::Error, Debug)]
pub enum HeadError {
    #[error("channel contains a cycle of upgrade edges through bundle {bundle}")]
    Cycle { bundle: BundleName },
    #[error("multiple channel heads found: {}", .candidates.iter().join(", "))]
    Ambiguous { candidates: Vec<BundleName> },
    #[error("channel has no entries")]
    Empty,
}

/// ChannelGraph is the upgrade graph of one channel: a vertex per channel
/// entry, and a directed edge from each bundle to every bundle it
/// replaces, skips over, or covers with its skip range. Bundles are kept
/// in a flat table; the graph refers to them by name and index.
pub struct ChannelGraph {
    graph: DiGraph<BundleName, EdgeKind>,
    nodes: BTreeMap<BundleName, NodeIndex>,
}

impl ChannelGraph {
    /// Build the upgrade graph of a channel from its entries.
    ///
    /// Edges target only bundles which are themselves entries of the
    /// channel: a `skips` or `skipRange` of an absent bundle is inert,
    /// and skip ranges never cover a bundle without a parsable version.
    pub fn build(
        package: &PackageName,
        entries: &[tables::Entry],
        bundles: &tables::Bundles,
    ) -> Self {
        let mut graph = DiGraph::new();
        let mut nodes = BTreeMap::new();

        for entry in entries {
            nodes
                .entry(entry.bundle.clone())
                .or_insert_with(|| graph.add_node(entry.bundle.clone()));
        }

        for entry in entries {
            let from = nodes[&entry.bundle];

            if let Some(replaces) = &entry.replaces {
                if let Some(&to) = nodes.get(replaces) {
                    graph.add_edge(from, to, EdgeKind::Replaces);
                }
            }
            for skip in &entry.skips {
                if let Some(&to) = nodes.get(skip) {
                    graph.add_edge(from, to, EdgeKind::Skips);
                }
            }
            let range = match &entry.skip_range {
                Some(range) => range,
                None => continue,
            };
            for other in entries {
                if other.bundle == entry.bundle {
                    continue;
                }
                let version = bundles
                    .get(package, &other.bundle)
                    .and_then(|b| b.version.as_ref());
                match version {
                    Some(version) if range.matches(version) => {
                        graph.add_edge(from, nodes[&other.bundle], EdgeKind::SkipRange);
                    }
                    _ => (),
                }
            }
        }

        Self { graph, nodes }
    }

    pub fn contains(&self, bundle: &BundleName) -> bool {
        self.nodes.contains_key(bundle)
    }

    /// Detect a cycle of upgrade edges, returning a bundle on the cycle.
    pub fn find_cycle(&self) -> Option<BundleName> {
        match petgraph::algo::toposort(&self.graph, None) {
            Ok(_) => None,
            Err(cycle) => Some(self.graph[cycle.node_id()].clone()),
        }
    }

    /// Elect the channel head: the unique entry which no other entry
    /// replaces, skips over, or covers with a skip range. No candidate
    /// means a cycle; more than one means election is ambiguous.
    pub fn elect_head(&self) -> Result<BundleName, HeadError> {
        if self.nodes.is_empty() {
            return Err(HeadError::Empty);
        }
        if let Some(bundle) = self.find_cycle() {
            return Err(HeadError::Cycle { bundle });
        }

        let mut candidates: Vec<BundleName> = self
            .graph
            .node_indices()
            .filter(|&n| {
                self.graph
                    .edges_directed(n, Direction::Incoming)
                    .next()
                    .is_none()
            })
            .map(|n| self.graph[n].clone())
            .collect();
        candidates.sort();

        match candidates.len() {
            // A cycle-free non-empty graph has at least one root.
            0 => unreachable!("acyclic graph must have a root"),
            1 => Ok(candidates.pop().unwrap()),
            _ => Err(HeadError::Ambiguous { candidates }),
        }
    }

    /// The set of bundles reachable from |from| by following upgrade
    /// edges, inclusive of |from| itself. This is the channel's member
    /// set when |from| is its head.
    pub fn reachable_from(&self, from: &BundleName) -> BTreeSet<BundleName> {
        let mut reached = BTreeSet::new();
        let start = match self.nodes.get(from) {
            Some(&start) => start,
            None => return reached,
        };

        let mut dfs = petgraph::visit::Dfs::new(&self.graph, start);
        while let Some(node) = dfs.next(&self.graph) {
            reached.insert(self.graph[node].clone());
        }
        reached
    }

    /// The bundles which supersede |bundle|: sources of its incoming
    /// replaces / skips / skipRange edges.
    pub fn superseded_by(&self, bundle: &BundleName) -> Vec<(BundleName, EdgeKind)> {
        let node = match self.nodes.get(bundle) {
            Some(&node) => node,
            None => return Vec::new(),
        };
        let mut sources: Vec<(BundleName, EdgeKind)> = self
            .graph
            .edges_directed(node, Direction::Incoming)
            .map(|edge| (self.graph[edge.source()].clone(), *edge.weight()))
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

/// Elect the default channel of a package: its explicitly named channel
/// when present, else its sole channel, else election fails.
#[derive(thiserror::Error, Debug)]
pub enum DefaultChannelError {
    #[error("default channel {channel} of package {package} does not exist")]
    Unknown {
        package: PackageName,
        channel: ChannelName,
    },
    #[error("package {package} does not name a default channel, and has {count} channels")]
    NotNamed { package: PackageName, count: usize },
}

pub fn elect_default_channel(
    package: &tables::Package,
    channels: &[tables::Channel],
) -> Result<ChannelName, DefaultChannelError> {
    if let Some(default) = &package.default_channel {
        if channels.iter().any(|c| &c.channel == default) {
            return Ok(default.clone());
        }
        return Err(DefaultChannelError::Unknown {
            package: package.package.clone(),
            channel: default.clone(),
        });
    }
    if channels.len() == 1 {
        return Ok(channels[0].channel.clone());
    }
    Err(DefaultChannelError::NotNamed {
        package: package.package.clone(),
        count: channels.len(),
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{BundleName, PackageName, Property, Version};

    fn scope() -> url::Url {
        url::Url::parse("test://graph").unwrap()
    }

    fn fixture(
        entries: &[(&str, Option<&str>, &[&str], Option<&str>)],
    ) -> (PackageName, tables::Entries, tables::Bundles) {
        let package = PackageName::new("op");
        let mut entry_table = tables::Entries::new();
        let mut bundle_table = tables::Bundles::new();

        for (name, replaces, skips, skip_range) in entries {
            entry_table.insert_row(
                scope(),
                &package,
                models::ChannelName::new("alpha"),
                BundleName::new(*name),
                replaces.map(BundleName::new),
                skips.iter().map(|s| BundleName::new(*s)).collect::<Vec<_>>(),
                skip_range.map(|r| r.parse::<models::Range>().unwrap()),
            );

            // Bundle versions derive from the name, e.g. "op.v0.9.2".
            let version: Option<Version> =
                name.split_once(".v").and_then(|(_, v)| v.parse().ok());
            bundle_table.insert_row(
                scope(),
                &package,
                BundleName::new(*name),
                format!("quay.io/example/{}", name),
                version.clone(),
                version
                    .map(|v| vec![Property::package(&package, &v)])
                    .unwrap_or_default(),
                Vec::new(),
                std::collections::BTreeMap::new(),
            );
        }
        (package, entry_table, bundle_table)
    }

    #[test]
    fn test_head_of_replaces_chain() {
        let (package, entries, bundles) = fixture(&[
            ("op.v0.9.0", None, &[], None),
            ("op.v0.9.2", Some("op.v0.9.0"), &[], None),
            ("op.v0.9.4", Some("op.v0.9.2"), &[], None),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);

        assert_eq!(graph.elect_head().unwrap().as_str(), "op.v0.9.4");
        assert_eq!(
            graph.reachable_from(&BundleName::new("op.v0.9.4")).len(),
            3
        );
    }

    #[test]
    fn test_ambiguous_heads() {
        let (package, entries, bundles) = fixture(&[
            ("op.v0.9.0", None, &[], None),
            ("op.v0.9.2", Some("op.v0.9.0"), &[], None),
            ("op.v1.0.0", None, &[], None),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);

        match graph.elect_head().unwrap_err() {
            HeadError::Ambiguous { candidates } => {
                assert_eq!(
                    candidates.iter().map(|c| c.as_str()).collect::<Vec<_>>(),
                    vec!["op.v0.9.2", "op.v1.0.0"],
                );
            }
            err => panic!("unexpected error {err}"),
        }
    }

    #[test]
    fn test_cycle_detection() {
        let (package, entries, bundles) = fixture(&[
            ("op.v0.9.0", Some("op.v0.9.2"), &[], None),
            ("op.v0.9.2", Some("op.v0.9.0"), &[], None),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);

        assert!(matches!(
            graph.elect_head().unwrap_err(),
            HeadError::Cycle { .. }
        ));
    }

    #[test]
    fn test_skip_range_edges() {
        let (package, entries, bundles) = fixture(&[
            ("op.v0.9.0", None, &[], None),
            ("op.v0.9.1", Some("op.v0.9.0"), &[], None),
            ("op.v0.9.2", Some("op.v0.9.1"), &[], Some(">=0.9.0 <0.9.2")),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);

        assert_eq!(graph.elect_head().unwrap().as_str(), "op.v0.9.2");

        // v0.9.0 is superseded both by v0.9.1 (replaces) and by the
        // skip range of v0.9.2.
        let sources = graph.superseded_by(&BundleName::new("op.v0.9.0"));
        assert_eq!(
            sources,
            vec![
                (BundleName::new("op.v0.9.1"), EdgeKind::Replaces),
                (BundleName::new("op.v0.9.2"), EdgeKind::SkipRange),
            ],
        );
    }

    #[test]
    fn test_skip_range_cycle_is_an_error() {
        // Two bundles whose ranges cover one another form a cycle purely
        // of skip-range edges.
        let (package, entries, bundles) = fixture(&[
            ("op.v1.0.0", None, &[], Some(">=2.0.0 <=2.0.0")),
            ("op.v2.0.0", None, &[], Some(">=1.0.0 <=1.0.0")),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);

        assert!(matches!(
            graph.elect_head().unwrap_err(),
            HeadError::Cycle { .. }
        ));
    }

    #[test]
    fn test_skips_of_absent_bundles_are_inert() {
        let (package, entries, bundles) = fixture(&[
            ("op.v0.9.0", None, &[], None),
            ("op.v0.9.2", Some("op.v0.9.0"), &["op.v0.6.1"], None),
        ]);
        let graph = ChannelGraph::build(&package, &entries, &bundles);
        assert_eq!(graph.elect_head().unwrap().as_str(), "op.v0.9.2");
    }

    #[test]
    fn test_default_channel_election() {
        let package = tables::Package {
            scope: scope(),
            package: PackageName::new("op"),
            default_channel: None,
            description: None,
            icon: None,
            extra: Default::default(),
        };
        let mut channels = tables::Channels::new();
        channels.insert_row(
            scope(),
            PackageName::new("op"),
            models::ChannelName::new("alpha"),
            std::collections::BTreeMap::new(),
        );

        // A package with a single channel defaults to it.
        assert_eq!(
            elect_default_channel(&package, &channels).unwrap().as_str(),
            "alpha"
        );

        // With a second channel, a default must be named.
        channels.insert_row(
            scope(),
            PackageName::new("op"),
            models::ChannelName::new("stable"),
            std::collections::BTreeMap::new(),
        );
        assert!(matches!(
            elect_default_channel(&package, &channels).unwrap_err(),
            DefaultChannelError::NotNamed { count: 2, .. }
        ));

        // An explicitly named default wins when it exists.
        let named = tables::Package {
            default_channel: Some(models::ChannelName::new("stable")),
            ..package.clone()
        };
        assert_eq!(
            elect_default_channel(&named, &channels).unwrap().as_str(),
            "stable"
        );

        let unknown = tables::Package {
            default_channel: Some(models::ChannelName::new("gone")),
            ..package
        };
        assert!(matches!(
            elect_default_channel(&unknown, &channels).unwrap_err(),
            DefaultChannelError::Unknown { .. }
        ));
    }
}
