use models::{
    BundleName, ChannelName, GroupVersionKind, PackageName, Property, PropertyRegistry,
    RelatedImage, TypedProperty, Version,
};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

mod service;
pub use service::CatalogService;

/// Lookup and operational failures of the query surface.
#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("package {package} not found")]
    PackageNotFound { package: PackageName },
    #[error("channel {channel} of package {package} not found")]
    ChannelNotFound {
        package: PackageName,
        channel: ChannelName,
    },
    #[error("bundle {bundle} not found in channel {channel} of package {package}")]
    BundleNotFound {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
    #[error("no bundle replaces {bundle} in channel {channel} of package {package}")]
    NoReplacement {
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
    },
    #[error("no bundle provides {group}/{version}/{kind}")]
    NoProvider {
        group: String,
        version: String,
        kind: String,
    },
    #[error("query was cancelled")]
    Cancelled,
}

/// Package metadata: its default channel, channels, and their heads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSummary {
    pub name: PackageName,
    pub default_channel: ChannelName,
    pub channels: Vec<ChannelSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub name: ChannelName,
    pub head: BundleName,
}

/// A full bundle record, in the context of one channel membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleRecord {
    pub package: PackageName,
    pub channel: ChannelName,
    pub name: BundleName,
    pub image: String,
    pub version: Option<Version>,
    pub properties: Vec<Property>,
    /// The bundle's requirements on other packages and APIs: its
    /// `olm.package.required` and `olm.gvk.required` properties.
    pub dependencies: Vec<Property>,
    pub related_images: Vec<RelatedImage>,
    pub replaces: Option<BundleName>,
    pub skips: Vec<BundleName>,
    pub skip_range: Option<models::Range>,
}

/// A channel entry, as returned by graph queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelEntryRef {
    pub package: PackageName,
    pub channel: ChannelName,
    pub bundle: BundleName,
    pub replaces: Option<BundleName>,
}

/// Engine answers graph and content queries against an immutable,
/// assembled catalog snapshot. Every operation is side-effect free,
/// returns owned copies, and observes a cancellation signal at its
/// emission boundaries. Queries never suspend: the snapshot is entirely
/// in memory.
pub struct Engine {
    catalog: tables::Catalog,
    built: tables::Built,
    registry: PropertyRegistry,
}

impl Engine {
    pub fn new(
        catalog: tables::Catalog,
        built: tables::Built,
        registry: PropertyRegistry,
    ) -> Self {
        Self {
            catalog,
            built,
            registry,
        }
    }

    pub fn catalog(&self) -> &tables::Catalog {
        &self.catalog
    }
    pub fn built(&self) -> &tables::Built {
        &self.built
    }

    /// Package metadata: name, default channel, channels and their heads.
    pub fn get_package(
        &self,
        package: &PackageName,
        _cancel: &CancellationToken,
    ) -> Result<PackageSummary, Error> {
        let built = self
            .built
            .built_packages
            .get(package)
            .ok_or_else(|| Error::PackageNotFound {
                package: package.clone(),
            })?;

        let channels = self
            .built
            .built_channels
            .in_package(package)
            .iter()
            .map(|c| ChannelSummary {
                name: c.channel.clone(),
                head: c.head.clone(),
            })
            .collect();

        Ok(PackageSummary {
            name: built.package.clone(),
            default_channel: built.default_channel.clone(),
            channels,
        })
    }

    /// All package names, ordered lexicographically.
    pub fn list_packages(&self, _cancel: &CancellationToken) -> Result<Vec<PackageName>, Error> {
        Ok(self
            .built
            .built_packages
            .iter()
            .map(|p| p.package.clone())
            .collect())
    }

    /// The full record of one bundle within one channel.
    pub fn get_bundle(
        &self,
        package: &PackageName,
        channel: &ChannelName,
        bundle: &BundleName,
        _cancel: &CancellationToken,
    ) -> Result<BundleRecord, Error> {
        self.channel_of(package, channel)?;

        let entry = self
            .catalog
            .entries
            .get(package, channel, bundle)
            .ok_or_else(|| Error::BundleNotFound {
                package: package.clone(),
                channel: channel.clone(),
                bundle: bundle.clone(),
            })?;
        self.record_of(entry)
    }

    /// The head of a channel.
    pub fn get_bundle_for_channel(
        &self,
        package: &PackageName,
        channel: &ChannelName,
        cancel: &CancellationToken,
    ) -> Result<BundleRecord, Error> {
        let head = self.channel_of(package, channel)?.head.clone();
        self.get_bundle(package, channel, &head, cancel)
    }

    /// The unique bundle of the channel which names |bundle| as its
    /// replaces target, or carries it in its skips. With several
    /// candidates, the one of greatest version wins.
    pub fn get_bundle_that_replaces(
        &self,
        bundle: &BundleName,
        package: &PackageName,
        channel: &ChannelName,
        _cancel: &CancellationToken,
    ) -> Result<BundleRecord, Error> {
        self.channel_of(package, channel)?;

        let candidate = self
            .catalog
            .entries
            .in_channel(package, channel)
            .iter()
            .filter(|e| e.replaces.as_ref() == Some(bundle) || e.skips.contains(bundle))
            .max_by_key(|e| self.version_of(package, &e.bundle));

        match candidate {
            Some(entry) => self.record_of(entry),
            None => Err(Error::NoReplacement {
                package: package.clone(),
                channel: channel.clone(),
                bundle: bundle.clone(),
            }),
        }
    }

    /// Every channel entry, across all packages, which replaces or skips
    /// |bundle|.
    pub fn get_channel_entries_that_replace(
        &self,
        bundle: &BundleName,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let mut out = Vec::new();
        for entry in self.catalog.entries.iter() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if entry.replaces.as_ref() == Some(bundle) || entry.skips.contains(bundle) {
                out.push(entry_ref(entry));
            }
        }
        Ok(out)
    }

    /// Every channel entry whose bundle provides the given API.
    pub fn get_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let mut out = Vec::new();
        for bundle in self.catalog.bundles.iter() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if !self.provides(bundle, group, version, kind) {
                continue;
            }
            for entry in self.catalog.entries.in_package(&bundle.package) {
                if entry.bundle == bundle.bundle {
                    out.push(entry_ref(entry));
                }
            }
        }
        out.sort_by(|lhs, rhs| {
            (&lhs.package, &lhs.channel, &lhs.bundle).cmp(&(&rhs.package, &rhs.channel, &rhs.bundle))
        });
        Ok(out)
    }

    /// Per (package, channel), only the greatest-version entry providing
    /// the given API.
    pub fn get_latest_channel_entries_that_provide(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let all = self.get_channel_entries_that_provide(group, version, kind, cancel)?;

        let mut latest: Vec<ChannelEntryRef> = Vec::new();
        for entry in all {
            match latest.last_mut() {
                Some(last) if last.package == entry.package && last.channel == entry.channel => {
                    if self.version_of(&entry.package, &entry.bundle)
                        > self.version_of(&last.package, &last.bundle)
                    {
                        *last = entry;
                    }
                }
                _ => latest.push(entry),
            }
        }
        Ok(latest)
    }

    /// The greatest-version bundle providing the given API through the
    /// default channel of its package. Packages are equal peers: the
    /// greatest-version provider across all default channels wins.
    pub fn get_bundle_that_provides(
        &self,
        group: &str,
        version: &str,
        kind: &str,
        cancel: &CancellationToken,
    ) -> Result<BundleRecord, Error> {
        let mut best: Option<&tables::Entry> = None;

        for package in self.built.built_packages.iter() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let entries = self
                .catalog
                .entries
                .in_channel(&package.package, &package.default_channel);

            for entry in entries {
                let bundle = match self.catalog.bundles.get(&package.package, &entry.bundle) {
                    Some(bundle) => bundle,
                    None => continue,
                };
                if !self.provides(bundle, group, version, kind) {
                    continue;
                }
                let better = match best {
                    Some(current) => {
                        self.version_of(&entry.package, &entry.bundle)
                            > self.version_of(&current.package, &current.bundle)
                    }
                    None => true,
                };
                if better {
                    best = Some(entry);
                }
            }
        }

        match best {
            Some(entry) => self.record_of(entry),
            None => Err(Error::NoProvider {
                group: group.to_string(),
                version: version.to_string(),
                kind: kind.to_string(),
            }),
        }
    }

    /// Every bundle, flattened: one record per (package, channel, bundle)
    /// membership.
    pub fn list_bundles(&self, cancel: &CancellationToken) -> Result<Vec<BundleRecord>, Error> {
        let mut out = Vec::new();
        for entry in self.catalog.entries.iter() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let Ok(record) = self.record_of(entry) {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn channel_of(
        &self,
        package: &PackageName,
        channel: &ChannelName,
    ) -> Result<&tables::BuiltChannel, Error> {
        if self.built.built_packages.get(package).is_none() {
            return Err(Error::PackageNotFound {
                package: package.clone(),
            });
        }
        self.built
            .built_channels
            .get(package, channel)
            .ok_or_else(|| Error::ChannelNotFound {
                package: package.clone(),
                channel: channel.clone(),
            })
    }

    fn record_of(&self, entry: &tables::Entry) -> Result<BundleRecord, Error> {
        let bundle = self
            .catalog
            .bundles
            .get(&entry.package, &entry.bundle)
            .ok_or_else(|| Error::BundleNotFound {
                package: entry.package.clone(),
                channel: entry.channel.clone(),
                bundle: entry.bundle.clone(),
            })?;

        let dependencies = bundle
            .properties
            .iter()
            .filter(|p| {
                p.r#type == models::TYPE_PACKAGE_REQUIRED || p.r#type == models::TYPE_GVK_REQUIRED
            })
            .cloned()
            .collect();

        Ok(BundleRecord {
            package: entry.package.clone(),
            channel: entry.channel.clone(),
            name: entry.bundle.clone(),
            image: bundle.image.clone(),
            version: bundle.version.clone(),
            properties: bundle.properties.clone(),
            dependencies,
            related_images: bundle.related_images.clone(),
            replaces: entry.replaces.clone(),
            skips: entry.skips.clone(),
            skip_range: entry.skip_range.clone(),
        })
    }

    fn version_of(&self, package: &PackageName, bundle: &BundleName) -> Option<Version> {
        self.catalog
            .bundles
            .get(package, bundle)
            .and_then(|b| b.version.clone())
    }

    fn provides(&self, bundle: &tables::Bundle, group: &str, version: &str, kind: &str) -> bool {
        let (typed, _) = self.registry.parse_all(&bundle.properties);
        typed.iter().any(|t| match t {
            TypedProperty::Gvk(gvk) => {
                gvk == &GroupVersionKind {
                    group: group.to_string(),
                    version: version.to_string(),
                    kind: kind.to_string(),
                }
            }
            _ => false,
        })
    }
}

fn entry_ref(entry: &tables::Entry) -> ChannelEntryRef {
    ChannelEntryRef {
        package: entry.package.clone(),
        channel: entry.channel.clone(),
        bundle: entry.bundle.clone(),
        replaces: entry.replaces.clone(),
    }
}
