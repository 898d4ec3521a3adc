use models::{BundleName, ChannelName, PackageName};
use std::collections::BTreeMap;

mod graph;
mod validate;

pub use graph::{
    elect_default_channel, ChannelGraph, DefaultChannelError, EdgeKind, HeadError,
};
pub use validate::{package_names, validate, validate_global, validate_package};

/// Invariant violations of the catalog model.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("package {package} has no olm.package blob")]
    MissingPackageBlob { package: PackageName },
    #[error("duplicate olm.package blob for package {package}")]
    DuplicatePackage { package: PackageName },
    #[error("duplicate olm.channel blob for channel {channel} of package {package}")]
    DuplicateChannel {
        package: PackageName,
        channel: ChannelName,
    },
    #[error("duplicate entry for bundle {bundle} in channel {channel} of package {package}")]
    DuplicateEntry {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
    #[error("duplicate olm.bundle blob for bundle {bundle} of package {package}")]
    DuplicateBundle {
        package: PackageName,
        bundle: BundleName,
    },
    #[error("bundle name {bundle} is used by package {package} and also by package {other}")]
    DuplicateBundleName {
        bundle: BundleName,
        package: PackageName,
        other: PackageName,
    },
    #[error("package {package} has no channels")]
    NoChannels { package: PackageName },
    #[error("channel {channel} of package {package} has an entry for bundle {bundle}, but no olm.bundle blob defines it")]
    MissingBundle {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
    #[error("bundle {bundle} of channel {channel} replaces {replaces}, which is not present in package {package}")]
    DanglingReplaces {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
        replaces: BundleName,
    },
    #[error("head {head} of channel {channel} is not an entry of the channel (package {package})")]
    HeadNotInChannel {
        package: PackageName,
        channel: ChannelName,
        head: BundleName,
    },
    #[error("bundle {bundle} of package {package} must have exactly one olm.package property, not {count}")]
    PackagePropertyCount {
        package: PackageName,
        bundle: BundleName,
        count: usize,
    },
    #[error("bundle {bundle} declares package {found}, but belongs to package {package}")]
    WrongPackageProperty {
        package: PackageName,
        bundle: BundleName,
        found: PackageName,
    },
    #[error("bundle {bundle} of package {package} has no parsable semver version")]
    MissingVersion {
        package: PackageName,
        bundle: BundleName,
    },
    #[error("bundle {bundle} of package {package} has an empty image reference")]
    MissingImage {
        package: PackageName,
        bundle: BundleName,
    },
    #[error("bundle {bundle} of package {package} is not a member of any channel")]
    NoChannelMembership {
        package: PackageName,
        bundle: BundleName,
    },
    #[error("bundle {bundle} is missing an olm.channel property for channel {channel} (package {package})")]
    MissingChannelProperty {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
}

/// Assemble the upgrade graphs of a loaded catalog: elect the head of
/// every channel and the default channel of every package, then validate
/// all model invariants relative to those elections.
///
/// Failures are aggregated per package: a package with any error is
/// withheld from the returned Built tables, without affecting its
/// neighbors.
pub fn assemble(
    catalog: &tables::Catalog,
    registry: &models::PropertyRegistry,
) -> (tables::Built, tables::Errors) {
    let mut built = tables::Built::default();
    let mut errors = tables::Errors::new();

    validate::validate_global(catalog, &mut errors);

    let mut heads = BTreeMap::new();

    for package in package_names(catalog) {
        let mut scratch = tables::Errors::new();

        for channel in catalog.channels.in_package(&package) {
            let entries = catalog.entries.in_channel(&package, &channel.channel);
            let graph = ChannelGraph::build(&package, entries, &catalog.bundles);

            match graph.elect_head() {
                Ok(head) => {
                    heads.insert((package.clone(), channel.channel.clone()), head);
                }
                Err(err) => scratch.push(channel.scope.clone(), err.into()),
            }
        }

        validate_package(catalog, &package, &heads, registry, &mut scratch);

        if scratch.is_empty() {
            build_package(catalog, &package, &heads, &mut built);
        } else {
            tracing::debug!(
                package = %package,
                errors = scratch.len(),
                "withholding invalid package from the assembled catalog",
            );
        }
        errors.extend(scratch);
    }

    (built, errors)
}

fn build_package(
    catalog: &tables::Catalog,
    package: &PackageName,
    heads: &BTreeMap<(PackageName, ChannelName), BundleName>,
    built: &mut tables::Built,
) {
    let package_blob = match catalog.packages.get(package) {
        Some(blob) => blob,
        None => return,
    };
    let channels = catalog.channels.in_package(package);
    let default_channel = match elect_default_channel(package_blob, channels) {
        Ok(default) => default,
        Err(_) => return,
    };

    built
        .built_packages
        .insert_row(package_blob.scope.clone(), package, default_channel);

    for channel in channels {
        if let Some(head) = heads.get(&(package.clone(), channel.channel.clone())) {
            built.built_channels.insert_row(
                channel.scope.clone(),
                package,
                &channel.channel,
                head,
            );
        }
    }
}
