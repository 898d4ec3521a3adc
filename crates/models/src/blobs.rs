use crate::{BundleName, ChannelName, PackageName, Property, Range};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

// First-class blob schemas of the declarative catalog format.
pub const SCHEMA_PACKAGE: &str = "olm.package";
pub const SCHEMA_CHANNEL: &str = "olm.channel";
pub const SCHEMA_BUNDLE: &str = "olm.bundle";

/// An `olm.package` blob: the package's identity and presentation metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PackageBlob {
    pub schema: String,
    pub name: PackageName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_channel: Option<ChannelName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<Icon>,
    /// Unrecognized fields of the blob, preserved for round-trip fidelity.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct Icon {
    pub base64data: String,
    pub mediatype: String,
}

/// An `olm.channel` blob: one upgrade track of a package, with an entry
/// per member bundle carrying that bundle's upgrade edges.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct ChannelBlob {
    pub schema: String,
    pub package: PackageName,
    pub name: ChannelName,
    #[serde(default)]
    pub entries: Vec<ChannelEntry>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEntry {
    pub name: BundleName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaces: Option<BundleName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skips: Vec<BundleName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_range: Option<Range>,
}

/// An `olm.bundle` blob: one immutable, versioned unit installing an
/// operator, together with its typed properties.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BundleBlob {
    pub schema: String,
    pub name: BundleName,
    pub package: PackageName,
    pub image: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related_images: Vec<RelatedImage>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, JsonSchema)]
pub struct RelatedImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub image: String,
}

/// A blob whose schema is not first-class. It is preserved verbatim so
/// that catalogs written by newer tooling survive a round-trip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownBlob {
    pub schema: String,
    pub value: Value,
}

impl Serialize for UnknownBlob {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

/// One self-describing blob of the declarative catalog stream.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Blob {
    Package(PackageBlob),
    Channel(ChannelBlob),
    Bundle(BundleBlob),
    Unknown(UnknownBlob),
}

#[derive(thiserror::Error, Debug)]
pub enum BlobError {
    #[error("blob must be an object, not {0}")]
    NotAnObject(&'static str),
    #[error("blob has a missing or empty schema field")]
    MissingSchema,
    #[error("failed to decode {schema:?} blob")]
    Decode {
        schema: String,
        #[source]
        cause: serde_json::Error,
    },
}

impl Blob {
    /// Decode a parsed JSON document into a typed blob, dispatching on its
    /// `schema` field.
    pub fn decode(value: Value) -> Result<Blob, BlobError> {
        let object = match &value {
            Value::Object(object) => object,
            Value::Null => return Err(BlobError::NotAnObject("null")),
            Value::Bool(_) => return Err(BlobError::NotAnObject("a boolean")),
            Value::Number(_) => return Err(BlobError::NotAnObject("a number")),
            Value::String(_) => return Err(BlobError::NotAnObject("a string")),
            Value::Array(_) => return Err(BlobError::NotAnObject("an array")),
        };
        let schema = match object.get("schema") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            _ => return Err(BlobError::MissingSchema),
        };
        let decode_err = |cause| BlobError::Decode {
            schema: schema.clone(),
            cause,
        };

        match schema.as_str() {
            SCHEMA_PACKAGE => serde_json::from_value(value)
                .map(Blob::Package)
                .map_err(decode_err),
            SCHEMA_CHANNEL => serde_json::from_value(value)
                .map(Blob::Channel)
                .map_err(decode_err),
            SCHEMA_BUNDLE => serde_json::from_value(value)
                .map(Blob::Bundle)
                .map_err(decode_err),
            _ => Ok(Blob::Unknown(UnknownBlob { schema, value })),
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Blob::Package(p) => &p.schema,
            Blob::Channel(c) => &c.schema,
            Blob::Bundle(b) => &b.schema,
            Blob::Unknown(u) => &u.schema,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_decode_dispatches_on_schema() {
        let blob = Blob::decode(serde_json::json!({
            "schema": "olm.package",
            "name": "etcd",
            "defaultChannel": "singlenamespace-alpha",
        }))
        .unwrap();

        match blob {
            Blob::Package(p) => {
                assert_eq!(p.name.as_str(), "etcd");
                assert_eq!(p.default_channel.unwrap().as_str(), "singlenamespace-alpha");
                assert!(p.extra.is_empty());
            }
            other => panic!("unexpected blob {:?}", other),
        }
    }

    #[test]
    fn test_decode_channel_entries() {
        let blob = Blob::decode(serde_json::json!({
            "schema": "olm.channel",
            "package": "etcd",
            "name": "clusterwide-alpha",
            "entries": [
                {"name": "etcd.v0.9.0"},
                {
                    "name": "etcd.v0.9.2-clusterwide",
                    "replaces": "etcd.v0.9.0",
                    "skips": ["etcd.v0.6.1"],
                    "skipRange": ">=0.9.0 <=0.9.1",
                },
            ],
        }))
        .unwrap();

        let channel = match blob {
            Blob::Channel(c) => c,
            other => panic!("unexpected blob {:?}", other),
        };
        assert_eq!(channel.entries.len(), 2);
        assert_eq!(channel.entries[1].skips.len(), 1);
        assert!(channel.entries[1]
            .skip_range
            .as_ref()
            .unwrap()
            .matches(&"0.9.1".parse().unwrap()));
    }

    #[test]
    fn test_unknown_fields_round_trip() {
        let doc = serde_json::json!({
            "schema": "olm.bundle",
            "name": "etcd.v0.9.4",
            "package": "etcd",
            "image": "quay.io/coreos/etcd-operator@sha256:66a37fd",
            "futureField": {"carried": true},
        });
        let blob = Blob::decode(doc.clone()).unwrap();

        assert_eq!(serde_json::to_value(&blob).unwrap(), doc);
    }

    #[test]
    fn test_unknown_schema_passes_through() {
        let doc = serde_json::json!({
            "schema": "olm.deprecations",
            "package": "etcd",
            "entries": [],
        });
        let blob = Blob::decode(doc.clone()).unwrap();

        assert_eq!(blob.schema(), "olm.deprecations");
        assert_eq!(serde_json::to_value(&blob).unwrap(), doc);
    }

    #[test]
    fn test_malformed_recognized_schema() {
        let err = Blob::decode(serde_json::json!({
            "schema": "olm.bundle",
            "name": "etcd.v0.9.4",
        }))
        .unwrap_err();

        match err {
            BlobError::Decode { schema, .. } => assert_eq!(schema, "olm.bundle"),
            other => panic!("unexpected error {other}"),
        }
    }

    #[test]
    fn test_rejected_blobs() {
        for case in [
            serde_json::json!([]),
            serde_json::json!("olm.bundle"),
            serde_json::json!({"name": "no-schema"}),
            serde_json::json!({"schema": ""}),
        ] {
            Blob::decode(case).unwrap_err();
        }
    }
}
