use models::{BundleName, ChannelName, PackageName, Version};
use serde::{Deserialize, Serialize};

mod add;
mod ops;
mod persist;
mod stream;

pub use add::{add, AddRequest};
pub use ops::{deprecate, prune_stranded, prune_to_keep, remove_package};
pub use persist::{persist, CatalogLock, LOCK_SENTINEL};
pub use stream::order_batch;

/// Draft is a mutable snapshot of the catalog model: its tables, plus the
/// maintained channel heads and default channels. Mutations consume a
/// Draft and produce a new one, leaving the input untouched on failure.
#[derive(Default, Debug, Clone)]
pub struct Draft {
    pub catalog: tables::Catalog,
    pub built: tables::Built,
}

impl Draft {
    /// Snapshot a loaded catalog and its assembled artifacts.
    pub fn new(catalog: tables::Catalog, built: tables::Built) -> Self {
        Self { catalog, built }
    }
}

/// How an add batch derives upgrade edges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Edges are exactly as declared by each bundle.
    Replaces,
    /// As Replaces, with a synthesized `skips` of every existing bundle
    /// of the channel sharing the new bundle's major and minor version
    /// with a lesser version.
    SkipPatch,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Replaces
    }
}

/// One bundle pending addition to the catalog: its identity, content
/// reference, channel memberships, and declared upgrade edges.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct BundleInput {
    pub package: PackageName,
    pub name: BundleName,
    pub version: Version,
    pub image: String,
    pub channels: Vec<ChannelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<ChannelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<BundleName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<BundleName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<models::Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub substitutes_for: Option<BundleName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<models::Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_images: Vec<models::RelatedImage>,
}

/// Mutation conflicts and operational failures.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("bundle image {image} is already present in the catalog (bundle {bundle})")]
    BundleAlreadyAdded { bundle: BundleName, image: String },
    #[error("package {package} already has a bundle of version {version} (bundle {bundle})")]
    PackageVersionAlreadyAdded {
        package: PackageName,
        version: Version,
        bundle: BundleName,
    },
    #[error("only a channel head may be overwritten; bundle {bundle} is not the head of channel {channel} of package {package}")]
    NonHeadOverwrite {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
    #[error("at most one overwrite is allowed per package per batch; the batch overwrites {count} bundles of package {package}")]
    TooManyOverwrites { package: PackageName, count: usize },
    #[error("bundles of package {package} do not form a connected graph of upgrade edges")]
    DisconnectedBatch { package: PackageName },
    #[error("bundles {first} and {second} of package {package} share version {version} within one batch")]
    DuplicateBatchVersion {
        package: PackageName,
        version: Version,
        first: BundleName,
        second: BundleName,
    },
    #[error("no legal add order exists for package {package}: bundle {bundle} replaces {replaces}, which is not present")]
    UnresolvableOrder {
        package: PackageName,
        bundle: BundleName,
        replaces: BundleName,
    },
    #[error("replaces target {replaces} of bundle {bundle} does not exist in package {package}")]
    ReplacesNotFound {
        package: PackageName,
        bundle: BundleName,
        replaces: BundleName,
    },
    #[error("substituted bundle {substitutes_for} of bundle {bundle} does not exist in package {package}")]
    SubstitutedNotFound {
        package: PackageName,
        bundle: BundleName,
        substitutes_for: BundleName,
    },
    #[error("bundle {bundle} does not exist in package {package}")]
    BundleNotFound {
        package: PackageName,
        bundle: BundleName,
    },
    #[error("package {package} does not exist")]
    PackageNotFound { package: PackageName },
    #[error("package {package} is invalid after mutation: {details}")]
    InvalidPostState {
        package: PackageName,
        details: String,
    },
    #[error("the catalog lock at {path} is held by another process")]
    LockContended {
        path: String,
        #[source]
        detail: std::io::Error,
    },
    #[error("mutation was cancelled")]
    Cancelled,
}

// Synthetic scope recorded on rows produced by a mutation, in place of a
// source file location.
fn mutation_scope(op: &str, package: &PackageName, name: &str) -> url::Url {
    let raw = format!("carta://mutation/{}/{}/{}", op, package, name);
    url::Url::parse(&raw).expect("mutation scopes parse as URLs")
}

/// Re-validate |package| of a mutated draft, translating any invariant
/// violation into an InvalidPostState conflict.
fn revalidate_package(
    draft: &Draft,
    package: &PackageName,
    registry: &models::PropertyRegistry,
) -> Result<(), Error> {
    let mut heads = std::collections::BTreeMap::new();
    for channel in draft.built.built_channels.iter() {
        heads.insert(
            (channel.package.clone(), channel.channel.clone()),
            channel.head.clone(),
        );
    }

    let mut errors = tables::Errors::new();
    assemble::validate_package(&draft.catalog, package, &heads, registry, &mut errors);
    assemble::validate_global(&draft.catalog, &mut errors);

    if errors.is_empty() {
        return Ok(());
    }
    use itertools::Itertools;
    Err(Error::InvalidPostState {
        package: package.clone(),
        details: errors.iter().map(|e| format!("{:#}", e.error)).join("; "),
    })
}
