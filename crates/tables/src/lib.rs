use std::collections::BTreeMap;

#[macro_use]
mod macros;
pub use macros::OwnOrClone;

mod behaviors;

tables!(
    table Packages (row Package, order_by [package]) {
        scope: url::Url,
        package: models::PackageName,
        // Channel named by the package as its default, if any.
        default_channel: Option<models::ChannelName>,
        description: Option<String>,
        icon: Option<models::Icon>,
        // Unrecognized fields of the package blob.
        extra: BTreeMap<String, serde_json::Value>,
    }

    table Channels (row Channel, order_by [package channel]) {
        scope: url::Url,
        package: models::PackageName,
        channel: models::ChannelName,
        // Unrecognized fields of the channel blob.
        extra: BTreeMap<String, serde_json::Value>,
    }

    table Entries (row Entry, order_by [package channel bundle]) {
        scope: url::Url,
        package: models::PackageName,
        channel: models::ChannelName,
        bundle: models::BundleName,
        // Bundle which this bundle replaces within the channel.
        replaces: Option<models::BundleName>,
        // Bundles which this bundle directly skips over.
        skips: Vec<models::BundleName>,
        // Range of versions which this bundle skips over.
        skip_range: Option<models::Range>,
    }

    table Bundles (row Bundle, order_by [package bundle]) {
        scope: url::Url,
        package: models::PackageName,
        bundle: models::BundleName,
        // Opaque reference to the bundle's content. Two bundles with an
        // equal image are equal content.
        image: String,
        // Version extracted from the bundle's olm.package property.
        // None if the property is missing or malformed, which validation
        // separately rejects.
        version: Option<models::Version>,
        properties: Vec<models::Property>,
        related_images: Vec<models::RelatedImage>,
        // Unrecognized fields of the bundle blob.
        extra: BTreeMap<String, serde_json::Value>,
    }

    table UnknownBlobs (row UnknownBlob, order_by [schema]) {
        scope: url::Url,
        schema: String,
        blob: serde_json::Value,
    }

    table BuiltPackages (row BuiltPackage, order_by [package]) {
        scope: url::Url,
        package: models::PackageName,
        // Default channel after election.
        default_channel: models::ChannelName,
    }

    table BuiltChannels (row BuiltChannel, order_by [package channel]) {
        scope: url::Url,
        package: models::PackageName,
        channel: models::ChannelName,
        // Elected channel head.
        head: models::BundleName,
    }
);

/// Error is a scoped failure encountered while loading, assembling, or
/// mutating a catalog.
#[derive(Debug)]
pub struct Error {
    pub scope: url::Url,
    pub error: anyhow::Error,
}

/// Errors collects scoped failures. Unlike other tables it holds opaque
/// error chains and is append-only.
#[derive(Default, Debug)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, scope: url::Url, error: anyhow::Error) {
        self.0.push(Error { scope, error });
    }

    pub fn extend(&mut self, other: Errors) {
        self.0.extend(other.0);
    }
}

impl std::ops::Deref for Errors {
    type Target = [Error];
    fn deref(&self) -> &[Error] {
        &self.0
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "at {}: {:#}", self.scope, self.error)
    }
}

/// Catalog is the complete model of a declarative catalog: every loaded
/// blob, held in flat ordered tables. Packages, channels and bundles are
/// key ranges over these tables; upgrade edges refer to bundles by name.
#[derive(Default, Debug, Clone)]
pub struct Catalog {
    pub packages: Packages,
    pub channels: Channels,
    pub entries: Entries,
    pub bundles: Bundles,
    pub unknown_blobs: UnknownBlobs,
}

/// Built holds the artifacts derived from a Catalog by graph assembly:
/// elected channel heads and default channels.
#[derive(Default, Debug, Clone)]
pub struct Built {
    pub built_packages: BuiltPackages,
    pub built_channels: BuiltChannels,
}
