use crate::Cache;
use models::{BundleName, ChannelName, PackageName, Version};
use queries::{BundleRecord, ChannelEntryRef, ChannelSummary, Error, PackageSummary};
use tokio_util::sync::CancellationToken;

/// Served answers the full query surface from cached answers alone,
/// without re-assembling the catalog model. Startup costs only the cache
/// read, which is the point of caching: a large catalog serves as soon as
/// its digest matches.
pub struct Served {
    cache: Cache,
}

impl Served {
    pub fn new(cache: Cache) -> Self {
        Self { cache }
    }

    pub fn digest(&self) -> &str {
        &self.cache.digest
    }

    fn package(&self, package: &PackageName) -> Result<&PackageSummary, Error> {
        self.cache
            .packages
            .iter()
            .find(|p| &p.name == package)
            .ok_or_else(|| Error::PackageNotFound {
                package: package.clone(),
            })
    }

    fn channel(
        &self,
        package: &PackageName,
        channel: &ChannelName,
    ) -> Result<&ChannelSummary, Error> {
        self.package(package)?
            .channels
            .iter()
            .find(|c| &c.name == channel)
            .ok_or_else(|| Error::ChannelNotFound {
                package: package.clone(),
                channel: channel.clone(),
            })
    }

    fn record(
        &self,
        package: &PackageName,
        channel: &ChannelName,
        bundle: &BundleName,
    ) -> Result<&BundleRecord, Error> {
        self.cache
            .bundles
            .iter()
            .find(|b| &b.package == package && &b.channel == channel && &b.name == bundle)
            .ok_or_else(|| Error::BundleNotFound {
                package: package.clone(),
                channel: channel.clone(),
                bundle: bundle.clone(),
            })
    }

    fn version_of(&self, package: &PackageName, bundle: &BundleName) -> Option<&Version> {
        self.cache
            .bundles
            .iter()
            .find(|b| &b.package == package && &b.name == bundle)
            .and_then(|b| b.version.as_ref())
    }

    fn provider_key(group: &str, version: &str, kind: &str) -> String {
        format!("{}/{}/{}", group, version, kind)
    }
}

#[async_trait::async_trait]
impl queries::CatalogService for Served {
    async fn get_package(
        &self,
        package: PackageName,
        _cancel: CancellationToken,
    ) -> Result<PackageSummary, Error> {
        self.package(&package).cloned()
    }

    async fn list_packages(&self, _cancel: CancellationToken) -> Result<Vec<PackageName>, Error> {
        Ok(self.cache.packages.iter().map(|p| p.name.clone()).collect())
    }

    async fn get_bundle(
        &self,
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
        _cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        self.channel(&package, &channel)?;
        self.record(&package, &channel, &bundle).cloned()
    }

    async fn get_bundle_for_channel(
        &self,
        package: PackageName,
        channel: ChannelName,
        _cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        let head = self.channel(&package, &channel)?.head.clone();
        self.record(&package, &channel, &head).cloned()
    }

    async fn get_bundle_that_replaces(
        &self,
        bundle: BundleName,
        package: PackageName,
        channel: ChannelName,
        _cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        self.channel(&package, &channel)?;

        let candidate = self
            .cache
            .bundles
            .iter()
            .filter(|b| b.package == package && b.channel == channel)
            .filter(|b| b.replaces.as_ref() == Some(&bundle) || b.skips.contains(&bundle))
            .max_by_key(|b| b.version.clone());

        match candidate {
            Some(record) => Ok(record.clone()),
            None => Err(Error::NoReplacement {
                package,
                channel,
                bundle,
            }),
        }
    }

    async fn get_channel_entries_that_replace(
        &self,
        bundle: BundleName,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let mut out = Vec::new();
        for record in &self.cache.bundles {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if record.replaces.as_ref() == Some(&bundle) || record.skips.contains(&bundle) {
                out.push(ChannelEntryRef {
                    package: record.package.clone(),
                    channel: record.channel.clone(),
                    bundle: record.name.clone(),
                    replaces: record.replaces.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn get_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        _cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let key = Self::provider_key(&group, &version, &kind);
        Ok(self.cache.providers.all.get(&key).cloned().unwrap_or_default())
    }

    async fn get_latest_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        _cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        let key = Self::provider_key(&group, &version, &kind);
        Ok(self
            .cache
            .providers
            .latest
            .get(&key)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_bundle_that_provides(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        let key = Self::provider_key(&group, &version, &kind);
        let providers = self.cache.providers.all.get(&key);

        let mut best: Option<&ChannelEntryRef> = None;
        for entry in providers.into_iter().flatten() {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            // Only entries reached through their package's default
            // channel are candidates.
            let summary = self.package(&entry.package)?;
            if summary.default_channel != entry.channel {
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

        match best {
            Some(entry) => self.record(&entry.package, &entry.channel, &entry.bundle).cloned(),
            None => Err(Error::NoProvider {
                group,
                version,
                kind,
            }),
        }
    }

    async fn list_bundles(&self, _cancel: CancellationToken) -> Result<Vec<BundleRecord>, Error> {
        Ok(self.cache.bundles.clone())
    }
}
