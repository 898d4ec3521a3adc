use crate::{revalidate_package, Draft, Error};
use models::{BundleName, ChannelName, PackageName, Property, PropertyRegistry};
use std::collections::BTreeSet;

/// Mark |bundle| with the `olm.deprecated` property. With |and_below|,
/// every bundle it transitively replaces within each of its channels is
/// deprecated as well. Upgrade edges are not touched.
pub fn deprecate(
    draft: &Draft,
    package: &PackageName,
    bundle: &BundleName,
    and_below: bool,
    registry: &PropertyRegistry,
) -> Result<Draft, Error> {
    let mut next = draft.clone();

    if next.catalog.packages.get(package).is_none() {
        return Err(Error::PackageNotFound {
            package: package.clone(),
        });
    }
    if next.catalog.bundles.get(package, bundle).is_none() {
        return Err(Error::BundleNotFound {
            package: package.clone(),
            bundle: bundle.clone(),
        });
    }

    let mut targets: BTreeSet<BundleName> = BTreeSet::new();
    targets.insert(bundle.clone());

    if and_below {
        for channel in next.catalog.channels.in_package(package) {
            let entries = next.catalog.entries.in_channel(package, &channel.channel);
            let graph = assemble::ChannelGraph::build(package, entries, &next.catalog.bundles);
            targets.extend(graph.reachable_from(bundle));
        }
    }
    tracing::debug!(
        package = %package,
        bundle = %bundle,
        count = targets.len(),
        "deprecating bundles",
    );

    for row in next.catalog.bundles.iter_mut() {
        if &row.package != package || !targets.contains(&row.bundle) {
            continue;
        }
        if !row
            .properties
            .iter()
            .any(|p| p.r#type == models::TYPE_DEPRECATED)
        {
            row.properties.push(Property::deprecated());
        }
    }

    revalidate_package(&next, package, registry)?;
    Ok(next)
}

/// Delete |package| and everything it owns.
pub fn remove_package(draft: &Draft, package: &PackageName) -> Result<Draft, Error> {
    let mut next = draft.clone();

    if !next.catalog.remove_package(package) {
        return Err(Error::PackageNotFound {
            package: package.clone(),
        });
    }
    next.built.built_packages.retain(|p| &p.package != package);
    next.built.built_channels.retain(|c| &c.package != package);
    Ok(next)
}

/// Retain only the named packages, deleting all others.
pub fn prune_to_keep(draft: &Draft, keep: &BTreeSet<PackageName>) -> Draft {
    let mut next = draft.clone();

    next.catalog.packages.retain(|p| keep.contains(&p.package));
    next.catalog.channels.retain(|c| keep.contains(&c.package));
    next.catalog.entries.retain(|e| keep.contains(&e.package));
    next.catalog.bundles.retain(|b| keep.contains(&b.package));
    next.built.built_packages.retain(|p| keep.contains(&p.package));
    next.built.built_channels.retain(|c| keep.contains(&c.package));
    next
}

/// Delete every channel entry unreachable from its channel's head, then
/// every bundle, channel, and package left without members. This cleans
/// up bundles stranded by prior adds which elected a different head.
pub fn prune_stranded(draft: &Draft, registry: &PropertyRegistry) -> Result<Draft, Error> {
    let mut next = draft.clone();

    let mut keep: BTreeSet<(PackageName, ChannelName, BundleName)> = BTreeSet::new();
    let mut pruned: BTreeSet<PackageName> = BTreeSet::new();

    for built in next.built.built_channels.iter() {
        let entries = next.catalog.entries.in_channel(&built.package, &built.channel);
        let graph = assemble::ChannelGraph::build(&built.package, entries, &next.catalog.bundles);
        let members = graph.reachable_from(&built.head);

        for entry in entries {
            if members.contains(&entry.bundle) {
                keep.insert((
                    entry.package.clone(),
                    entry.channel.clone(),
                    entry.bundle.clone(),
                ));
            } else {
                tracing::info!(
                    package = %entry.package,
                    channel = %entry.channel,
                    bundle = %entry.bundle,
                    "pruning stranded channel entry",
                );
                pruned.insert(entry.package.clone());
            }
        }
    }

    // Channels without an elected head are left untouched.
    let unelected: BTreeSet<(PackageName, ChannelName)> = next
        .catalog
        .channels
        .iter()
        .filter(|c| next.built.built_channels.get(&c.package, &c.channel).is_none())
        .map(|c| (c.package.clone(), c.channel.clone()))
        .collect();

    next.catalog.entries.retain(|e| {
        keep.contains(&(e.package.clone(), e.channel.clone(), e.bundle.clone()))
            || unelected.contains(&(e.package.clone(), e.channel.clone()))
    });

    // Bundles referenced by no remaining entry are destroyed.
    let referenced: BTreeSet<(PackageName, BundleName)> = next
        .catalog
        .entries
        .iter()
        .map(|e| (e.package.clone(), e.bundle.clone()))
        .collect();
    next.catalog
        .bundles
        .retain(|b| referenced.contains(&(b.package.clone(), b.bundle.clone())));

    // A channel is destroyed with its last entry, and a package with its
    // last channel.
    let live_channels: BTreeSet<(PackageName, ChannelName)> = next
        .catalog
        .entries
        .iter()
        .map(|e| (e.package.clone(), e.channel.clone()))
        .collect();
    next.catalog
        .channels
        .retain(|c| live_channels.contains(&(c.package.clone(), c.channel.clone())));
    next.built
        .built_channels
        .retain(|c| live_channels.contains(&(c.package.clone(), c.channel.clone())));

    let live_packages: BTreeSet<PackageName> = next
        .catalog
        .channels
        .iter()
        .map(|c| c.package.clone())
        .collect();
    next.catalog.packages.retain(|p| live_packages.contains(&p.package));
    next.built
        .built_packages
        .retain(|p| live_packages.contains(&p.package));

    for package in pruned {
        if live_packages.contains(&package) {
            revalidate_package(&next, &package, registry)?;
        }
    }
    Ok(next)
}
