use crate::{mutation_scope, revalidate_package, BundleInput, Draft, Error, Mode};
use models::{BundleName, ChannelName, PackageName, Property, PropertyRegistry};
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;

/// AddRequest is a batch of bundles to apply to the catalog.
#[derive(Debug, Clone)]
pub struct AddRequest {
    pub inputs: Vec<BundleInput>,
    pub mode: Mode,
    /// Permit a bundle name which is already present, overwriting the
    /// current channel head in place.
    pub overwrite: bool,
}

/// Apply an add batch, returning the mutated model. The batch is ordered
/// per the update stream; any conflict fails the whole batch and leaves
/// the input draft untouched.
pub fn add(
    draft: &Draft,
    request: AddRequest,
    registry: &PropertyRegistry,
    cancel: &CancellationToken,
) -> Result<Draft, Error> {
    let batches = crate::order_batch(&draft.catalog, request.inputs)?;
    let mut next = draft.clone();

    for (package, batch) in batches {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        if request.overwrite {
            let count = batch
                .iter()
                .filter(|input| next.catalog.bundles.get(&package, &input.name).is_some())
                .count();
            if count > 1 {
                return Err(Error::TooManyOverwrites { package, count });
            }
        }

        for input in &batch {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            tracing::debug!(
                package = %input.package,
                bundle = %input.name,
                version = %input.version,
                "adding bundle",
            );
            add_bundle(&mut next, input, request.mode, request.overwrite, registry)?;
        }
        revalidate_package(&next, &package, registry)?;
    }
    Ok(next)
}

fn add_bundle(
    draft: &mut Draft,
    input: &BundleInput,
    mode: Mode,
    overwrite: bool,
    registry: &PropertyRegistry,
) -> Result<(), Error> {
    let package = &input.package;

    if let Some(substitutes_for) = &input.substitutes_for {
        return substitute_bundle(draft, input, substitutes_for, registry);
    }

    let exists = draft.catalog.bundles.get(package, &input.name).is_some();

    if exists && !overwrite {
        return Err(Error::BundleAlreadyAdded {
            bundle: input.name.clone(),
            image: input.image.clone(),
        });
    }
    if !exists {
        // A content reference may enter the catalog only once.
        if let Some(duplicate) = draft.catalog.bundles.iter().find(|b| b.image == input.image) {
            return Err(Error::BundleAlreadyAdded {
                bundle: duplicate.bundle.clone(),
                image: input.image.clone(),
            });
        }
        if let Some(duplicate) = draft
            .catalog
            .bundles
            .in_package(package)
            .iter()
            .find(|b| b.version.as_ref() == Some(&input.version))
        {
            return Err(Error::PackageVersionAlreadyAdded {
                package: package.clone(),
                version: input.version.clone(),
                bundle: duplicate.bundle.clone(),
            });
        }
    }

    // The replaces target must already exist in the package, either from
    // before the batch or from an earlier emission of it.
    if let Some(replaces) = &input.replaces {
        if draft.catalog.bundles.get(package, replaces).is_none() {
            return Err(Error::ReplacesNotFound {
                package: package.clone(),
                bundle: input.name.clone(),
                replaces: replaces.clone(),
            });
        }
    }

    if exists {
        overwrite_bundle(draft, input, registry)
    } else {
        insert_bundle(draft, input, mode, registry);
        Ok(())
    }
}

fn insert_bundle(draft: &mut Draft, input: &BundleInput, mode: Mode, registry: &PropertyRegistry) {
    let package = &input.package;
    let scope = mutation_scope("add", package, input.name.as_str());

    // The first bundle of a package creates it.
    if draft.catalog.packages.get(package).is_none() {
        draft.catalog.packages.insert_row(
            scope.clone(),
            package,
            input.default_channel.clone(),
            None,
            None,
            BTreeMap::new(),
        );
    }

    draft.catalog.bundles.insert_row(
        scope.clone(),
        package,
        &input.name,
        &input.image,
        Some(input.version.clone()),
        build_properties(input, registry),
        input.related_images.clone(),
        BTreeMap::new(),
    );

    for channel in &input.channels {
        ensure_channel(draft, package, channel, &scope);

        let mut skips = input.skips.clone();
        if let Mode::SkipPatch = mode {
            skips.extend(skip_patch_targets(draft, input, channel));
            skips.sort();
            skips.dedup();
        }

        draft.catalog.entries.insert_row(
            scope.clone(),
            package,
            channel,
            &input.name,
            input.replaces.clone(),
            skips,
            input.skip_range.clone(),
        );

        update_head(draft, input, channel);
    }

    // The bundle's declared default channel wins when it is a member of
    // the bundle's own channel set; otherwise the prior default is kept.
    if let Some(default) = &input.default_channel {
        if input.channels.contains(default) {
            for row in draft.catalog.packages.iter_mut() {
                if &row.package == package {
                    row.default_channel = Some(default.clone());
                }
            }
        }
    }
    refresh_built_package(draft, package);
}

fn ensure_channel(
    draft: &mut Draft,
    package: &PackageName,
    channel: &ChannelName,
    scope: &url::Url,
) {
    if draft.catalog.channels.get(package, channel).is_none() {
        draft
            .catalog
            .channels
            .insert_row(scope.clone(), package, channel, BTreeMap::new());
    }
}

// Head maintenance: the new bundle becomes head of the channel when
// the channel is new, or when nothing in the channel supersedes it and
// its version is strictly greater than the current head's.
fn update_head(draft: &mut Draft, input: &BundleInput, channel: &ChannelName) {
    let package = &input.package;
    let entries = draft.catalog.entries.in_channel(package, channel);
    let graph = assemble::ChannelGraph::build(package, entries, &draft.catalog.bundles);
    let superseded = !graph.superseded_by(&input.name).is_empty();

    let position = draft
        .built
        .built_channels
        .iter()
        .position(|c| &c.package == package && &c.channel == channel);

    match position {
        None => {
            let head = graph.elect_head().unwrap_or_else(|_| input.name.clone());
            draft.built.built_channels.insert_row(
                mutation_scope("add", package, channel.as_str()),
                package,
                channel,
                head,
            );
        }
        Some(position) => {
            let head_version = {
                let head = &draft.built.built_channels[position].head;
                draft
                    .catalog
                    .bundles
                    .get(package, head)
                    .and_then(|b| b.version.clone())
            };
            let greater = head_version.map_or(true, |head| input.version > head);
            if !superseded && greater {
                draft.built.built_channels[position].head = input.name.clone();
            }
        }
    }
}

// Skip-patch mode: existing bundles of the channel which share the new
// bundle's major and minor version, at a lesser version, are skipped.
fn skip_patch_targets(
    draft: &Draft,
    input: &BundleInput,
    channel: &ChannelName,
) -> Vec<BundleName> {
    let package = &input.package;
    draft
        .catalog
        .entries
        .in_channel(package, channel)
        .iter()
        .filter(|entry| entry.bundle != input.name)
        .filter_map(|entry| draft.catalog.bundles.get(package, &entry.bundle))
        .filter(|bundle| match &bundle.version {
            Some(version) => {
                version.major() == input.version.major()
                    && version.minor() == input.version.minor()
                    && *version < input.version
            }
            None => false,
        })
        .map(|bundle| bundle.bundle.clone())
        .collect()
}

fn build_properties(input: &BundleInput, registry: &PropertyRegistry) -> Vec<Property> {
    let mut properties = input.properties.clone();

    if !properties.iter().any(|p| p.r#type == models::TYPE_PACKAGE) {
        properties.insert(0, Property::package(&input.package, &input.version));
    }
    for channel in &input.channels {
        properties.push(Property::channel(channel, input.replaces.as_ref()));
    }
    registry.dedup(properties)
}

// Maintain the package's default-channel election after a change to its
// channels or declared default.
fn refresh_built_package(draft: &mut Draft, package: &PackageName) {
    let (elected, scope) = match draft.catalog.packages.get(package) {
        Some(row) => (
            assemble::elect_default_channel(row, draft.catalog.channels.in_package(package)),
            row.scope.clone(),
        ),
        None => {
            draft.built.built_packages.retain(|p| &p.package != package);
            return;
        }
    };

    match elected {
        Ok(default) => {
            let position = draft
                .built
                .built_packages
                .iter()
                .position(|p| &p.package == package);
            match position {
                Some(position) => draft.built.built_packages[position].default_channel = default,
                None => draft
                    .built
                    .built_packages
                    .insert_row(scope, package, default),
            }
        }
        // Election failed; revalidation reports it against the package.
        Err(_) => draft.built.built_packages.retain(|p| &p.package != package),
    }
}

// Overwrite-latest: replace the record of an existing bundle in place.
// Only the current head of each of its channels may be overwritten.
fn overwrite_bundle(
    draft: &mut Draft,
    input: &BundleInput,
    registry: &PropertyRegistry,
) -> Result<(), Error> {
    let package = &input.package;

    let memberships: Vec<ChannelName> = draft
        .catalog
        .entries
        .in_package(package)
        .iter()
        .filter(|entry| entry.bundle == input.name)
        .map(|entry| entry.channel.clone())
        .collect();

    for channel in &memberships {
        let head = draft
            .built
            .built_channels
            .get(package, channel)
            .map(|c| c.head.clone());
        if head.as_ref() != Some(&input.name) {
            return Err(Error::NonHeadOverwrite {
                package: package.clone(),
                channel: channel.clone(),
                bundle: input.name.clone(),
            });
        }
    }

    // Membership properties cover every channel the bundle stays in, not
    // only those the overwrite names.
    let mut channels: Vec<ChannelName> = memberships.clone();
    channels.extend(input.channels.iter().cloned());
    channels.sort();
    channels.dedup();

    let mut properties = input.properties.clone();
    if !properties.iter().any(|p| p.r#type == models::TYPE_PACKAGE) {
        properties.insert(0, Property::package(package, &input.version));
    }
    for channel in &channels {
        properties.push(Property::channel(channel, input.replaces.as_ref()));
    }
    let properties = registry.dedup(properties);

    let scope = mutation_scope("overwrite", package, input.name.as_str());
    for bundle in draft.catalog.bundles.iter_mut() {
        if &bundle.package == package && bundle.bundle == input.name {
            bundle.scope = scope.clone();
            bundle.image = input.image.clone();
            bundle.version = Some(input.version.clone());
            bundle.properties = properties.clone();
            bundle.related_images = input.related_images.clone();
        }
    }

    // Edges of channels the overwrite names are refreshed from the input.
    for channel in &input.channels {
        let position = draft
            .catalog
            .entries
            .iter()
            .position(|e| &e.package == package && &e.channel == channel && e.bundle == input.name);
        match position {
            Some(position) => {
                let entry = &mut draft.catalog.entries[position];
                entry.scope = scope.clone();
                entry.replaces = input.replaces.clone();
                entry.skips = input.skips.clone();
                entry.skip_range = input.skip_range.clone();
            }
            None => {
                ensure_channel(draft, package, channel, &scope);
                draft.catalog.entries.insert_row(
                    scope.clone(),
                    package,
                    channel,
                    &input.name,
                    input.replaces.clone(),
                    input.skips.clone(),
                    input.skip_range.clone(),
                );
                update_head(draft, input, channel);
            }
        }
    }
    refresh_built_package(draft, package);
    Ok(())
}

// Substitutes-for: the new bundle assumes the substituted bundle's place
// in every channel it participates in. Edges which pointed at the
// substituted bundle are redirected to the substitute, and the substitute
// directly skips it so the record stays reachable. Chained substitutions
// compose into a linear chain whose newest link is the head.
fn substitute_bundle(
    draft: &mut Draft,
    input: &BundleInput,
    target: &BundleName,
    registry: &PropertyRegistry,
) -> Result<(), Error> {
    let package = &input.package;

    if draft.catalog.bundles.get(package, target).is_none() {
        return Err(Error::SubstitutedNotFound {
            package: package.clone(),
            bundle: input.name.clone(),
            substitutes_for: target.clone(),
        });
    }
    if draft.catalog.bundles.get(package, &input.name).is_some() {
        return Err(Error::BundleAlreadyAdded {
            bundle: input.name.clone(),
            image: input.image.clone(),
        });
    }
    if let Some(duplicate) = draft.catalog.bundles.iter().find(|b| b.image == input.image) {
        return Err(Error::BundleAlreadyAdded {
            bundle: duplicate.bundle.clone(),
            image: input.image.clone(),
        });
    }

    let scope = mutation_scope("substitute", package, input.name.as_str());

    // Assume the substituted bundle's entries: same channels, same
    // outgoing edges, plus a direct skip of it.
    let assumed: Vec<tables::Entry> = draft
        .catalog
        .entries
        .in_package(package)
        .iter()
        .filter(|entry| &entry.bundle == target)
        .cloned()
        .collect();
    let channels: Vec<ChannelName> = assumed.iter().map(|e| e.channel.clone()).collect();

    for entry in &assumed {
        let mut skips = entry.skips.clone();
        skips.extend(input.skips.iter().cloned());
        skips.push(target.clone());
        skips.sort();
        skips.dedup();

        draft.catalog.entries.insert_row(
            scope.clone(),
            package,
            &entry.channel,
            &input.name,
            entry.replaces.clone(),
            skips,
            entry.skip_range.clone().or_else(|| input.skip_range.clone()),
        );
    }

    // Redirect edges which pointed at the substituted bundle.
    for entry in draft.catalog.entries.iter_mut() {
        if &entry.package != package || entry.bundle == input.name {
            continue;
        }
        if entry.replaces.as_ref() == Some(target) {
            entry.replaces = Some(input.name.clone());
        }
        for skip in entry.skips.iter_mut() {
            if skip == target {
                *skip = input.name.clone();
            }
        }
    }

    // Heads which referred to the substituted bundle move to the
    // substitute.
    for built in draft.built.built_channels.iter_mut() {
        if &built.package == package && &built.head == target {
            built.head = input.name.clone();
        }
    }

    let mut properties = input.properties.clone();
    if !properties.iter().any(|p| p.r#type == models::TYPE_PACKAGE) {
        properties.insert(0, Property::package(package, &input.version));
    }
    for channel in &channels {
        properties.push(Property::channel(channel, input.replaces.as_ref()));
    }
    properties.push(Property::new(
        models::TYPE_SUBSTITUTES_FOR,
        serde_json::json!(target.as_str()),
    ));
    let properties = registry.dedup(properties);

    draft.catalog.bundles.insert_row(
        scope,
        package,
        &input.name,
        &input.image,
        Some(input.version.clone()),
        properties,
        input.related_images.clone(),
        BTreeMap::new(),
    );
    Ok(())
}
