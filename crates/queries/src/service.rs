use crate::{BundleRecord, ChannelEntryRef, Engine, Error, PackageSummary};
use models::{BundleName, ChannelName, PackageName};
use tokio_util::sync::CancellationToken;

/// The remote query surface of a served catalog. Each operation maps to
/// one remote procedure taking a structured request and returning a
/// structured response or a typed Error; the transport binding (method
/// framing, status codes) is left to the server embedding this trait.
#[async_trait::async_trait]
pub trait CatalogService: Send + Sync {
    async fn get_package(
        &self,
        package: PackageName,
        cancel: CancellationToken,
    ) -> Result<PackageSummary, Error>;

    async fn list_packages(&self, cancel: CancellationToken) -> Result<Vec<PackageName>, Error>;

    async fn get_bundle(
        &self,
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error>;

    async fn get_bundle_for_channel(
        &self,
        package: PackageName,
        channel: ChannelName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error>;

    async fn get_bundle_that_replaces(
        &self,
        bundle: BundleName,
        package: PackageName,
        channel: ChannelName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error>;

    async fn get_channel_entries_that_replace(
        &self,
        bundle: BundleName,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error>;

    async fn get_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error>;

    async fn get_latest_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error>;

    async fn get_bundle_that_provides(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error>;

    async fn list_bundles(&self, cancel: CancellationToken) -> Result<Vec<BundleRecord>, Error>;
}

#[async_trait::async_trait]
impl CatalogService for Engine {
    async fn get_package(
        &self,
        package: PackageName,
        cancel: CancellationToken,
    ) -> Result<PackageSummary, Error> {
        tracing::debug!(%package, "get_package");
        Engine::get_package(self, &package, &cancel)
    }

    async fn list_packages(&self, cancel: CancellationToken) -> Result<Vec<PackageName>, Error> {
        Engine::list_packages(self, &cancel)
    }

    async fn get_bundle(
        &self,
        package: PackageName,
        channel: ChannelName,
        bundle: BundleName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        Engine::get_bundle(self, &package, &channel, &bundle, &cancel)
    }

    async fn get_bundle_for_channel(
        &self,
        package: PackageName,
        channel: ChannelName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        Engine::get_bundle_for_channel(self, &package, &channel, &cancel)
    }

    async fn get_bundle_that_replaces(
        &self,
        bundle: BundleName,
        package: PackageName,
        channel: ChannelName,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        Engine::get_bundle_that_replaces(self, &bundle, &package, &channel, &cancel)
    }

    async fn get_channel_entries_that_replace(
        &self,
        bundle: BundleName,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        Engine::get_channel_entries_that_replace(self, &bundle, &cancel)
    }

    async fn get_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        Engine::get_channel_entries_that_provide(self, &group, &version, &kind, &cancel)
    }

    async fn get_latest_channel_entries_that_provide(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<Vec<ChannelEntryRef>, Error> {
        Engine::get_latest_channel_entries_that_provide(self, &group, &version, &kind, &cancel)
    }

    async fn get_bundle_that_provides(
        &self,
        group: String,
        version: String,
        kind: String,
        cancel: CancellationToken,
    ) -> Result<BundleRecord, Error> {
        Engine::get_bundle_that_provides(self, &group, &version, &kind, &cancel)
    }

    async fn list_bundles(&self, cancel: CancellationToken) -> Result<Vec<BundleRecord>, Error> {
        Engine::list_bundles(self, &cancel)
    }
}
