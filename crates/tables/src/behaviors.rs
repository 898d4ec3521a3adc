use models::{BundleName, ChannelName, PackageName};
use superslice::Ext;

impl super::Packages {
    /// Fetch the named package, if present.
    pub fn get(&self, package: &PackageName) -> Option<&super::Package> {
        let range = self.equal_range_by_key(&package, |p| &p.package);
        self[range].first()
    }
}

impl super::Channels {
    pub fn get(&self, package: &PackageName, channel: &ChannelName) -> Option<&super::Channel> {
        let range = self.equal_range_by(|c| (&c.package, &c.channel).cmp(&(package, channel)));
        self[range].first()
    }

    /// All channels of |package|.
    pub fn in_package(&self, package: &PackageName) -> &[super::Channel] {
        let range = self.equal_range_by_key(&package, |c| &c.package);
        &self[range]
    }
}

impl super::Entries {
    /// All entries of |package|, across its channels.
    pub fn in_package(&self, package: &PackageName) -> &[super::Entry] {
        let range = self.equal_range_by_key(&package, |e| &e.package);
        &self[range]
    }

    /// All entries of one channel of |package|.
    pub fn in_channel(&self, package: &PackageName, channel: &ChannelName) -> &[super::Entry] {
        let range = self.equal_range_by(|e| (&e.package, &e.channel).cmp(&(package, channel)));
        &self[range]
    }

    pub fn get(
        &self,
        package: &PackageName,
        channel: &ChannelName,
        bundle: &BundleName,
    ) -> Option<&super::Entry> {
        let range = self.equal_range_by(|e| {
            (&e.package, &e.channel, &e.bundle).cmp(&(package, channel, bundle))
        });
        self[range].first()
    }
}

impl super::Bundles {
    /// All bundles of |package|.
    pub fn in_package(&self, package: &PackageName) -> &[super::Bundle] {
        let range = self.equal_range_by_key(&package, |b| &b.package);
        &self[range]
    }

    pub fn get(&self, package: &PackageName, bundle: &BundleName) -> Option<&super::Bundle> {
        let range = self.equal_range_by(|b| (&b.package, &b.bundle).cmp(&(package, bundle)));
        self[range].first()
    }

    /// Fetch |bundle| by its globally-unique name, in whichever package
    /// it lives. A valid catalog holds at most one match.
    pub fn get_by_name(&self, bundle: &BundleName) -> Option<&super::Bundle> {
        self.iter().find(|b| &b.bundle == bundle)
    }
}

impl super::BuiltPackages {
    pub fn get(&self, package: &PackageName) -> Option<&super::BuiltPackage> {
        let range = self.equal_range_by_key(&package, |p| &p.package);
        self[range].first()
    }
}

impl super::BuiltChannels {
    pub fn get(
        &self,
        package: &PackageName,
        channel: &ChannelName,
    ) -> Option<&super::BuiltChannel> {
        let range = self.equal_range_by(|c| (&c.package, &c.channel).cmp(&(package, channel)));
        self[range].first()
    }

    pub fn in_package(&self, package: &PackageName) -> &[super::BuiltChannel] {
        let range = self.equal_range_by_key(&package, |c| &c.package);
        &self[range]
    }
}

impl super::Catalog {
    /// Remove every row of |package| from the catalog, returning whether
    /// any row was removed.
    pub fn remove_package(&mut self, package: &PackageName) -> bool {
        let before = self.packages.len() + self.channels.len() + self.entries.len() + self.bundles.len();

        self.packages.retain(|p| &p.package != package);
        self.channels.retain(|c| &c.package != package);
        self.entries.retain(|e| &e.package != package);
        self.bundles.retain(|b| &b.package != package);

        let after = self.packages.len() + self.channels.len() + self.entries.len() + self.bundles.len();
        before != after
    }
}
