use crate::{BundleName, ChannelName, PackageName, Range, Version};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// First-party property types. The payload grammar of each is defined by
// the types below; anything else passes through the registry verbatim.
pub const TYPE_PACKAGE: &str = "olm.package";
pub const TYPE_PACKAGE_REQUIRED: &str = "olm.package.required";
pub const TYPE_GVK: &str = "olm.gvk";
pub const TYPE_GVK_REQUIRED: &str = "olm.gvk.required";
pub const TYPE_CHANNEL: &str = "olm.channel";
pub const TYPE_SKIP_RANGE: &str = "olm.skipRange";
pub const TYPE_SKIPS: &str = "olm.skips";
pub const TYPE_DEPRECATED: &str = "olm.deprecated";
pub const TYPE_SUBSTITUTES_FOR: &str = "olm.substitutesFor";

/// Property is a typed fact attached to a bundle: its package identity, a
/// provided or required API, channel membership, deprecation, and so on.
/// The payload is kept as opaque JSON so that unrecognized types survive a
/// load / serialize round-trip byte-for-byte.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct Property {
    pub r#type: String,
    pub value: Value,
}

impl Property {
    pub fn new(r#type: impl Into<String>, value: Value) -> Self {
        Self {
            r#type: r#type.into(),
            value,
        }
    }

    /// The `olm.package` identity property of a bundle.
    pub fn package(package_name: &PackageName, version: &Version) -> Self {
        Self::new(
            TYPE_PACKAGE,
            serde_json::json!({
                "packageName": package_name.as_str(),
                "version": version.to_string(),
            }),
        )
    }

    /// An `olm.channel` membership property.
    pub fn channel(name: &ChannelName, replaces: Option<&BundleName>) -> Self {
        let mut value = serde_json::json!({"name": name.as_str()});
        if let Some(replaces) = replaces {
            value["replaces"] = Value::String(replaces.to_string());
        }
        Self::new(TYPE_CHANNEL, value)
    }

    /// The `olm.deprecated` marker property.
    pub fn deprecated() -> Self {
        Self::new(TYPE_DEPRECATED, serde_json::json!({}))
    }

    /// The canonical serialization of this property's payload.
    /// Object keys are emitted in sorted order.
    pub fn canonical_payload(&self) -> String {
        self.value.to_string()
    }
}

/// Payload of `olm.package`: the package identity of a bundle.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PackageProvide {
    pub package_name: PackageName,
    pub version: Version,
}

/// Payload of `olm.package.required`: a dependency on another package.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct PackageRequirement {
    pub package_name: PackageName,
    pub version_range: Range,
}

/// Payload of `olm.gvk` and `olm.gvk.required`: a Kubernetes API surface,
/// provided or depended upon.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(deny_unknown_fields)]
pub struct GroupVersionKind {
    pub group: String,
    pub version: String,
    pub kind: String,
}

impl std::fmt::Display for GroupVersionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.group, self.version, self.kind)
    }
}

/// Payload of `olm.channel`: membership of the bundle within a channel.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChannelMembership {
    pub name: ChannelName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<BundleName>,
}

/// A Property parsed against the registry's closed set of known types.
/// Parsing is exhaustive on the type tag; unknown types land in Other.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedProperty {
    Package(PackageProvide),
    PackageRequired(PackageRequirement),
    Gvk(GroupVersionKind),
    GvkRequired(GroupVersionKind),
    Channel(ChannelMembership),
    SkipRange(Range),
    Skips(BundleName),
    Deprecated,
    SubstitutesFor(BundleName),
    Other(Property),
}

#[derive(thiserror::Error, Debug)]
#[error("invalid {ty:?} property at index {index}", ty = .r#type)]
pub struct InvalidProperty {
    pub index: usize,
    pub r#type: String,
    #[source]
    pub cause: serde_json::Error,
}

/// PropertyRegistry is the single source of truth for the payload grammars
/// of structured property types. It is an explicitly-passed value: loaders
/// and converters receive a registry rather than consulting global state.
#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    _private: (),
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse |property|, found at |index| of its property set, into its
    /// typed representation.
    pub fn parse(&self, index: usize, property: &Property) -> Result<TypedProperty, InvalidProperty> {
        let invalid = |cause| InvalidProperty {
            index,
            r#type: property.r#type.clone(),
            cause,
        };

        match property.r#type.as_str() {
            TYPE_PACKAGE => serde_json::from_value(property.value.clone())
                .map(TypedProperty::Package)
                .map_err(invalid),
            TYPE_PACKAGE_REQUIRED => serde_json::from_value(property.value.clone())
                .map(TypedProperty::PackageRequired)
                .map_err(invalid),
            TYPE_GVK => serde_json::from_value(property.value.clone())
                .map(TypedProperty::Gvk)
                .map_err(invalid),
            TYPE_GVK_REQUIRED => serde_json::from_value(property.value.clone())
                .map(TypedProperty::GvkRequired)
                .map_err(invalid),
            TYPE_CHANNEL => serde_json::from_value(property.value.clone())
                .map(TypedProperty::Channel)
                .map_err(invalid),
            TYPE_SKIP_RANGE => serde_json::from_value(property.value.clone())
                .map(TypedProperty::SkipRange)
                .map_err(invalid),
            TYPE_SKIPS => serde_json::from_value(property.value.clone())
                .map(TypedProperty::Skips)
                .map_err(invalid),
            TYPE_SUBSTITUTES_FOR => serde_json::from_value(property.value.clone())
                .map(TypedProperty::SubstitutesFor)
                .map_err(invalid),
            TYPE_DEPRECATED => match &property.value {
                Value::Null => Ok(TypedProperty::Deprecated),
                Value::Object(m) if m.is_empty() => Ok(TypedProperty::Deprecated),
                other => Err(invalid(serde::de::Error::custom(format!(
                    "expected an empty object, not {}",
                    other
                )))),
            },
            _ => Ok(TypedProperty::Other(property.clone())),
        }
    }

    /// Parse every property of |properties|, aggregating failures rather
    /// than stopping at the first.
    pub fn parse_all(
        &self,
        properties: &[Property],
    ) -> (Vec<TypedProperty>, Vec<InvalidProperty>) {
        let mut parsed = Vec::with_capacity(properties.len());
        let mut errors = Vec::new();

        for (index, property) in properties.iter().enumerate() {
            match self.parse(index, property) {
                Ok(typed) => parsed.push(typed),
                Err(err) => errors.push(err),
            }
        }
        (parsed, errors)
    }

    /// Collapse |properties| into a set under (type, canonical payload)
    /// equality, preserving first-occurrence order.
    pub fn dedup(&self, properties: Vec<Property>) -> Vec<Property> {
        let mut seen = std::collections::HashSet::new();
        properties
            .into_iter()
            .filter(|p| seen.insert((p.r#type.clone(), p.canonical_payload())))
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_parse_known_types() {
        let registry = PropertyRegistry::new();

        let cases = vec![
            (
                Property::new(TYPE_PACKAGE, serde_json::json!({"packageName": "etcd", "version": "0.9.4"})),
                TypedProperty::Package(PackageProvide {
                    package_name: PackageName::new("etcd"),
                    version: "0.9.4".parse().unwrap(),
                }),
            ),
            (
                Property::new(TYPE_GVK, serde_json::json!({
                    "group": "etcd.database.coreos.com",
                    "version": "v1beta2",
                    "kind": "EtcdBackup",
                })),
                TypedProperty::Gvk(GroupVersionKind {
                    group: "etcd.database.coreos.com".to_string(),
                    version: "v1beta2".to_string(),
                    kind: "EtcdBackup".to_string(),
                }),
            ),
            (
                Property::new(TYPE_CHANNEL, serde_json::json!({"name": "alpha", "replaces": "etcd.v0.9.2"})),
                TypedProperty::Channel(ChannelMembership {
                    name: ChannelName::new("alpha"),
                    replaces: Some(BundleName::new("etcd.v0.9.2")),
                }),
            ),
            (
                Property::new(TYPE_SKIP_RANGE, serde_json::json!(">=0.9.0 <0.9.4")),
                TypedProperty::SkipRange(">=0.9.0 <0.9.4".parse().unwrap()),
            ),
            (
                Property::new(TYPE_SKIPS, serde_json::json!("etcd.v0.9.1")),
                TypedProperty::Skips(BundleName::new("etcd.v0.9.1")),
            ),
            (
                Property::new(TYPE_DEPRECATED, serde_json::json!({})),
                TypedProperty::Deprecated,
            ),
            (
                Property::new("custom.annotation", serde_json::json!({"answer": 42})),
                TypedProperty::Other(Property::new("custom.annotation", serde_json::json!({"answer": 42}))),
            ),
        ];

        for (property, expect) in cases {
            assert_eq!(registry.parse(0, &property).unwrap(), expect);
        }
    }

    #[test]
    fn test_parse_failures_carry_index_and_type() {
        let registry = PropertyRegistry::new();

        let properties = vec![
            Property::package(&PackageName::new("etcd"), &"0.9.4".parse().unwrap()),
            Property::new(TYPE_PACKAGE, serde_json::json!({"packageName": "etcd"})),
            Property::new(TYPE_GVK, serde_json::json!("not-an-object")),
        ];
        let (parsed, errors) = registry.parse_all(&properties);

        assert_eq!(parsed.len(), 1);
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].index, 1);
        assert_eq!(errors[0].r#type, TYPE_PACKAGE);
        assert_eq!(errors[1].index, 2);
        assert_eq!(errors[1].r#type, TYPE_GVK);
    }

    #[test]
    fn test_dedup_is_by_canonical_payload() {
        let registry = PropertyRegistry::new();

        let properties = vec![
            // Key order of the payload doesn't defeat deduplication.
            Property::new(TYPE_GVK, serde_json::json!({"group": "g", "version": "v", "kind": "K"})),
            Property::new(TYPE_GVK, serde_json::json!({"kind": "K", "group": "g", "version": "v"})),
            Property::new(TYPE_GVK, serde_json::json!({"group": "g", "version": "v2", "kind": "K"})),
            Property::deprecated(),
            Property::deprecated(),
        ];
        let deduped = registry.dedup(properties);

        assert_eq!(
            deduped
                .iter()
                .map(|p| (p.r#type.as_str(), p.canonical_payload()))
                .collect::<Vec<_>>(),
            vec![
                (TYPE_GVK, r#"{"group":"g","kind":"K","version":"v"}"#.to_string()),
                (TYPE_GVK, r#"{"group":"g","kind":"K","version":"v2"}"#.to_string()),
                (TYPE_DEPRECATED, "{}".to_string()),
            ],
        );
    }
}
