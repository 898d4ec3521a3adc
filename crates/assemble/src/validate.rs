use crate::{elect_default_channel, ChannelGraph, Error};
use models::{BundleName, ChannelName, PackageName, PropertyRegistry, TypedProperty};
use std::collections::{BTreeMap, BTreeSet};

/// Validate every invariant of the catalog model, aggregating all
/// failures rather than stopping at the first. Channel-level checks are
/// made relative to |heads|: the elected (or, after a mutation, the
/// maintained) head of each channel.
pub fn validate(
    catalog: &tables::Catalog,
    heads: &BTreeMap<(PackageName, ChannelName), BundleName>,
    registry: &PropertyRegistry,
    errors: &mut tables::Errors,
) {
    validate_global(catalog, errors);

    for package in package_names(catalog) {
        validate_package(catalog, &package, heads, registry, errors);
    }
}

/// The union of package names appearing anywhere in the catalog.
pub fn package_names(catalog: &tables::Catalog) -> Vec<PackageName> {
    let mut names = BTreeSet::new();
    names.extend(catalog.packages.iter().map(|p| p.package.clone()));
    names.extend(catalog.channels.iter().map(|c| c.package.clone()));
    names.extend(catalog.bundles.iter().map(|b| b.package.clone()));
    names.into_iter().collect()
}

/// Cross-package checks: bundle names are globally unique.
pub fn validate_global(catalog: &tables::Catalog, errors: &mut tables::Errors) {
    let mut owners: BTreeMap<&BundleName, &PackageName> = BTreeMap::new();

    for bundle in catalog.bundles.iter() {
        match owners.get(&bundle.bundle) {
            Some(&other) if other != &bundle.package => {
                errors.push(
                    bundle.scope.clone(),
                    Error::DuplicateBundleName {
                        bundle: bundle.bundle.clone(),
                        package: bundle.package.clone(),
                        other: other.clone(),
                    }
                    .into(),
                );
            }
            _ => {
                owners.insert(&bundle.bundle, &bundle.package);
            }
        }
    }
}

/// Validate one package of the catalog.
pub fn validate_package(
    catalog: &tables::Catalog,
    package: &PackageName,
    heads: &BTreeMap<(PackageName, ChannelName), BundleName>,
    registry: &PropertyRegistry,
    errors: &mut tables::Errors,
) {
    let channels = catalog.channels.in_package(package);
    let bundles = catalog.bundles.in_package(package);
    let entries = catalog.entries.in_package(package);

    // The package must be described by exactly one olm.package blob.
    let blobs = catalog
        .packages
        .iter()
        .filter(|p| &p.package == package)
        .collect::<Vec<_>>();

    match blobs.as_slice() {
        [] => {
            let scope = channels
                .first()
                .map(|c| &c.scope)
                .or_else(|| bundles.first().map(|b| &b.scope));
            if let Some(scope) = scope {
                errors.push(
                    scope.clone(),
                    Error::MissingPackageBlob {
                        package: package.clone(),
                    }
                    .into(),
                );
            }
        }
        [package_blob] => {
            if channels.is_empty() {
                errors.push(
                    package_blob.scope.clone(),
                    Error::NoChannels {
                        package: package.clone(),
                    }
                    .into(),
                );
            } else if let Err(err) = elect_default_channel(package_blob, channels) {
                errors.push(package_blob.scope.clone(), err.into());
            }
        }
        [_, duplicates @ ..] => {
            for duplicate in duplicates {
                errors.push(
                    duplicate.scope.clone(),
                    Error::DuplicatePackage {
                        package: package.clone(),
                    }
                    .into(),
                );
            }
        }
    }

    // Channels must be unique within the package.
    for pair in channels.windows(2) {
        if pair[0].channel == pair[1].channel {
            errors.push(
                pair[1].scope.clone(),
                Error::DuplicateChannel {
                    package: package.clone(),
                    channel: pair[1].channel.clone(),
                }
                .into(),
            );
        }
    }
    // Bundles must be unique within the package.
    for pair in bundles.windows(2) {
        if pair[0].bundle == pair[1].bundle {
            errors.push(
                pair[1].scope.clone(),
                Error::DuplicateBundle {
                    package: package.clone(),
                    bundle: pair[1].bundle.clone(),
                }
                .into(),
            );
        }
    }

    let bundle_names: BTreeSet<&BundleName> = bundles.iter().map(|b| &b.bundle).collect();
    let entry_names: BTreeSet<&BundleName> = entries.iter().map(|e| &e.bundle).collect();

    for channel in channels {
        validate_channel(catalog, package, channel, &bundle_names, heads, registry, errors);
    }

    for bundle in bundles {
        validate_bundle(bundle, &entry_names, registry, errors);
    }
}

fn validate_channel(
    catalog: &tables::Catalog,
    package: &PackageName,
    channel: &tables::Channel,
    bundle_names: &BTreeSet<&BundleName>,
    heads: &BTreeMap<(PackageName, ChannelName), BundleName>,
    registry: &PropertyRegistry,
    errors: &mut tables::Errors,
) {
    let entries = catalog.entries.in_channel(package, &channel.channel);
    let in_channel: BTreeSet<&BundleName> = entries.iter().map(|e| &e.bundle).collect();

    for pair in entries.windows(2) {
        if pair[0].bundle == pair[1].bundle {
            errors.push(
                pair[1].scope.clone(),
                Error::DuplicateEntry {
                    package: package.clone(),
                    channel: channel.channel.clone(),
                    bundle: pair[1].bundle.clone(),
                }
                .into(),
            );
        }
    }

    for entry in entries {
        // Every entry must be backed by an olm.bundle blob.
        if !bundle_names.contains(&entry.bundle) {
            errors.push(
                entry.scope.clone(),
                Error::MissingBundle {
                    package: package.clone(),
                    channel: channel.channel.clone(),
                    bundle: entry.bundle.clone(),
                }
                .into(),
            );
        }
        // A replaces target must be present in the package, as a bundle
        // or at least as another entry of this channel.
        if let Some(replaces) = &entry.replaces {
            if !bundle_names.contains(replaces) && !in_channel.contains(replaces) {
                errors.push(
                    entry.scope.clone(),
                    Error::DanglingReplaces {
                        package: package.clone(),
                        channel: channel.channel.clone(),
                        bundle: entry.bundle.clone(),
                        replaces: replaces.clone(),
                    }
                    .into(),
                );
            }
        }
    }

    let head = match heads.get(&(package.clone(), channel.channel.clone())) {
        Some(head) => head,
        // Head election failed; its error is already recorded.
        None => return,
    };

    let graph = ChannelGraph::build(package, entries, &catalog.bundles);
    if let Some(bundle) = graph.find_cycle() {
        errors.push(
            channel.scope.clone(),
            crate::HeadError::Cycle { bundle }.into(),
        );
        return;
    }
    if !graph.contains(head) {
        errors.push(
            channel.scope.clone(),
            Error::HeadNotInChannel {
                package: package.clone(),
                channel: channel.channel.clone(),
                head: head.clone(),
            }
            .into(),
        );
        return;
    }

    // The channel's member set is the head's reachability closure.
    // Entries outside of it are stranded: tolerated, but surfaced, so
    // that a prune can clean them up.
    let members = graph.reachable_from(head);
    for entry in entries {
        if !members.contains(&entry.bundle) {
            tracing::warn!(
                package = %package,
                channel = %channel.channel,
                bundle = %entry.bundle,
                "channel entry is not reachable from the channel head",
            );
        }
    }

    // Every member bundle must carry an olm.channel property naming this
    // channel.
    for member in &members {
        let bundle = match catalog.bundles.get(package, member) {
            Some(bundle) => bundle,
            None => continue, // Reported as MissingBundle above.
        };
        let (typed, _) = registry.parse_all(&bundle.properties);
        let named = typed.iter().any(|t| match t {
            TypedProperty::Channel(membership) => membership.name == channel.channel,
            _ => false,
        });
        if !named {
            errors.push(
                bundle.scope.clone(),
                Error::MissingChannelProperty {
                    package: package.clone(),
                    channel: channel.channel.clone(),
                    bundle: member.clone(),
                }
                .into(),
            );
        }
    }
}

fn validate_bundle(
    bundle: &tables::Bundle,
    entry_names: &BTreeSet<&BundleName>,
    registry: &PropertyRegistry,
    errors: &mut tables::Errors,
) {
    // Exactly one olm.package property.
    let count = bundle
        .properties
        .iter()
        .filter(|p| p.r#type == models::TYPE_PACKAGE)
        .count();
    if count != 1 {
        errors.push(
            bundle.scope.clone(),
            Error::PackagePropertyCount {
                package: bundle.package.clone(),
                bundle: bundle.bundle.clone(),
                count,
            }
            .into(),
        );
    }

    // Its packageName must agree with the owning package.
    let (typed, _) = registry.parse_all(&bundle.properties);
    for t in &typed {
        match t {
            models::TypedProperty::Package(provide)
                if provide.package_name != bundle.package =>
            {
                errors.push(
                    bundle.scope.clone(),
                    Error::WrongPackageProperty {
                        package: bundle.package.clone(),
                        bundle: bundle.bundle.clone(),
                        found: provide.package_name.clone(),
                    }
                    .into(),
                );
            }
            _ => (),
        }
    }

    if bundle.version.is_none() {
        errors.push(
            bundle.scope.clone(),
            Error::MissingVersion {
                package: bundle.package.clone(),
                bundle: bundle.bundle.clone(),
            }
            .into(),
        );
    }
    if bundle.image.is_empty() {
        errors.push(
            bundle.scope.clone(),
            Error::MissingImage {
                package: bundle.package.clone(),
                bundle: bundle.bundle.clone(),
            }
            .into(),
        );
    }
    // Every bundle participates in at least one channel.
    if !entry_names.contains(&bundle.bundle) {
        errors.push(
            bundle.scope.clone(),
            Error::NoChannelMembership {
                package: bundle.package.clone(),
                bundle: bundle.bundle.clone(),
            }
            .into(),
        );
    }
}
