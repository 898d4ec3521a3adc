mod blobs;
mod names;
mod properties;
mod semver;

pub use blobs::{
    Blob, BlobError, BundleBlob, ChannelBlob, ChannelEntry, Icon, PackageBlob, RelatedImage,
    UnknownBlob, SCHEMA_BUNDLE, SCHEMA_CHANNEL, SCHEMA_PACKAGE,
};
pub use names::{BundleName, ChannelName, PackageName, NAME_RE};
pub use properties::{
    ChannelMembership, GroupVersionKind, InvalidProperty, PackageProvide, PackageRequirement,
    Property, PropertyRegistry, TypedProperty, TYPE_CHANNEL, TYPE_DEPRECATED, TYPE_GVK,
    TYPE_GVK_REQUIRED, TYPE_PACKAGE, TYPE_PACKAGE_REQUIRED, TYPE_SKIPS, TYPE_SKIP_RANGE,
    TYPE_SUBSTITUTES_FOR,
};
pub use crate::semver::{ParseRangeError, Range, Version};
