use models::{Blob, BundleBlob, ChannelBlob, ChannelEntry, PackageBlob, UnknownBlob};
use std::collections::BTreeSet;
use std::path::Path;

/// Reconstruct the canonical blob stream of |catalog|: for each package in
/// lexicographic order, its `olm.package` blob, then its channel blobs
/// sorted by channel name, then its bundle blobs sorted by bundle name.
/// Blobs of unrecognized schema follow, sorted by schema. A bundle which
/// appears in several channels is emitted exactly once.
pub fn canonical_blobs(catalog: &tables::Catalog) -> Vec<Blob> {
    let mut out = Vec::new();

    for package in package_names(catalog) {
        out.extend(package_blobs(catalog, &package));
    }
    for unknown in catalog.unknown_blobs.iter() {
        out.push(Blob::Unknown(UnknownBlob {
            schema: unknown.schema.clone(),
            value: unknown.blob.clone(),
        }));
    }
    out
}

/// The canonical blob stream of one package. A package which lost its
/// `olm.package` blob still renders its channels and bundles, so that a
/// write→read round-trip reports the same validation failure instead of
/// silently dropping rows.
pub fn package_blobs(catalog: &tables::Catalog, package: &models::PackageName) -> Vec<Blob> {
    let mut out = Vec::new();

    if let Some(row) = catalog.packages.get(package) {
        out.push(Blob::Package(package_blob(row)));
    }
    for channel in catalog.channels.in_package(package) {
        let entries = catalog
            .entries
            .in_channel(&channel.package, &channel.channel);
        out.push(Blob::Channel(channel_blob(channel, entries)));
    }
    for bundle in catalog.bundles.in_package(package) {
        out.push(Blob::Bundle(bundle_blob(bundle)));
    }
    out
}

// Every package named anywhere in the catalog, in lexicographic order.
fn package_names(catalog: &tables::Catalog) -> Vec<models::PackageName> {
    let mut names = BTreeSet::new();
    names.extend(catalog.packages.iter().map(|p| p.package.clone()));
    names.extend(catalog.channels.iter().map(|c| c.package.clone()));
    names.extend(catalog.bundles.iter().map(|b| b.package.clone()));
    names.into_iter().collect()
}

/// Write the canonical JSON rendering of |catalog| to |out|, one
/// pretty-printed blob at a time. The rendering is byte-stable: writing a
/// catalog loaded from this writer's own output reproduces it exactly.
pub fn write_catalog(catalog: &tables::Catalog, out: &mut dyn std::io::Write) -> anyhow::Result<()> {
    for blob in canonical_blobs(catalog) {
        write_blob(&blob, out)?;
    }
    Ok(())
}

/// Write |catalog| into |dir| in the canonical directory layout: one
/// `<package>/catalog.json` file per package, with blobs of unrecognized
/// schema in a `_unknown.json` file at the root. The layout is a
/// presentation detail only; the blob stream (and so the catalog digest)
/// is identical to `write_catalog`'s.
pub fn write_catalog_to_dir(catalog: &tables::Catalog, dir: &Path) -> anyhow::Result<()> {
    for package in package_names(catalog) {
        let package_dir = dir.join(package.as_str());
        std::fs::create_dir_all(&package_dir)?;

        let mut file = std::fs::File::create(package_dir.join("catalog.json"))?;
        for blob in package_blobs(catalog, &package) {
            write_blob(&blob, &mut file)?;
        }
        file.sync_all()?;
    }

    if !catalog.unknown_blobs.is_empty() {
        let mut file = std::fs::File::create(dir.join("_unknown.json"))?;
        for unknown in catalog.unknown_blobs.iter() {
            let blob = Blob::Unknown(UnknownBlob {
                schema: unknown.schema.clone(),
                value: unknown.blob.clone(),
            });
            write_blob(&blob, &mut file)?;
        }
        file.sync_all()?;
    }
    Ok(())
}

fn write_blob(blob: &Blob, out: &mut dyn std::io::Write) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *out, blob)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn package_blob(package: &tables::Package) -> PackageBlob {
    PackageBlob {
        schema: models::SCHEMA_PACKAGE.to_string(),
        name: package.package.clone(),
        default_channel: package.default_channel.clone(),
        description: package.description.clone(),
        icon: package.icon.clone(),
        extra: package.extra.clone(),
    }
}

fn channel_blob(channel: &tables::Channel, entries: &[tables::Entry]) -> ChannelBlob {
    ChannelBlob {
        schema: models::SCHEMA_CHANNEL.to_string(),
        package: channel.package.clone(),
        name: channel.channel.clone(),
        entries: entries
            .iter()
            .map(|entry| ChannelEntry {
                name: entry.bundle.clone(),
                replaces: entry.replaces.clone(),
                skips: entry.skips.clone(),
                skip_range: entry.skip_range.clone(),
            })
            .collect(),
        extra: channel.extra.clone(),
    }
}

fn bundle_blob(bundle: &tables::Bundle) -> BundleBlob {
    BundleBlob {
        schema: models::SCHEMA_BUNDLE.to_string(),
        name: bundle.bundle.clone(),
        package: bundle.package.clone(),
        image: bundle.image.clone(),
        properties: bundle.properties.clone(),
        related_images: bundle.related_images.clone(),
        extra: bundle.extra.clone(),
    }
}
