use lazy_static::lazy_static;
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{from_value, json};
use std::fmt;
use validator::{Validate, ValidationError, ValidationErrors};

// This module contains types which name entities of the catalog.
// They use the newtype pattern for strong type safety.

// TOKEN_CHAR is a string production which allows Unicode letters and
// numbers, and a restricted set of punctuation symbols. It covers the
// names produced by operator bundle tooling, e.g. "etcdoperator.v0.9.4".
const TOKEN_CHAR: &'static str = r"\p{Letter}\p{Number}\-_\.";

lazy_static! {
    // TOKEN is one or more TOKEN_CHARs.
    static ref TOKEN: String = ["[", TOKEN_CHAR, "]+"].concat();
    // NAME_RE is a single TOKEN component.
    pub static ref NAME_RE: Regex = Regex::new(&TOKEN).unwrap();
}

macro_rules! string_name_types {
    (
        $(#[$outer:meta])*
        $vis:vis struct $Wrapper:ident($WrapperStr:literal, example = $Example:literal);

        $($rest:tt)*
    ) => {

        $(#[$outer])*
        #[derive(Serialize, Deserialize, Default, Debug, Clone, PartialEq, JsonSchema, Eq, PartialOrd, Ord, Hash)]
        pub struct $Wrapper(#[schemars(schema_with = $WrapperStr)] String);

        impl $Wrapper {
            pub fn new(s: impl Into<String>) -> Self {
                Self(s.into())
            }
            pub fn as_str(&self) -> &str {
                &self.0
            }
            pub fn example() -> Self {
                Self($Example.into())
            }
            pub fn schema_pattern() -> String {
                ["^", NAME_RE.as_str(), "$"].concat()
            }

            fn schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
                from_value(json!({
                    "type": "string",
                    "pattern": Self::schema_pattern(),
                }))
                .unwrap()
            }
        }

        impl std::ops::Deref for $Wrapper {
            type Target = str;

            fn deref(&self) -> &str {
                &self.0
            }
        }

        impl AsRef<str> for $Wrapper {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Into<String> for $Wrapper {
            fn into(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $Wrapper {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(self.as_ref())
            }
        }

        impl std::str::FromStr for $Wrapper {
            type Err = std::convert::Infallible;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(s.to_string()))
            }
        }

        impl Validate for $Wrapper {
            fn validate(&self) -> Result<(), ValidationErrors> {
                let s = self.0.as_ref();

                let unmatched = match NAME_RE.find(s) {
                    Some(m) if m.start() == 0 && m.end() == s.len() => None, // Full match.
                    Some(m) => Some([&s[..m.start()], &s[m.end()..]].concat()), // Partial match.
                    None => Some(s.to_string()), // No match.
                };

                if let Some(unmatched) = unmatched {
                    let mut errors = ValidationErrors::new();
                    errors.add(
                        "",
                        ValidationError {
                            code: "regex mismatch".into(),
                            message: Some(format!(
                                "{} doesn't match pattern {} (unmatched portion is: {})",
                                s, NAME_RE.to_string(), unmatched,
                            ).into()),
                            params: std::collections::HashMap::new(),
                        },
                    );
                    Err(errors)
                } else {
                    Ok(())
                }
            }
        }

        string_name_types! {
            $($rest)*
        }
    };

    () => {};
}

string_name_types! {
    /// Package names are Unicode letters, numbers, '-', '_', or '.',
    /// and are globally unique within a catalog.
    pub struct PackageName("PackageName::schema", example = "etcd");

    /// Channel names are Unicode letters, numbers, '-', '_', or '.',
    /// and are unique within their package.
    pub struct ChannelName("ChannelName::schema", example = "singlenamespace-alpha");

    /// Bundle names are Unicode letters, numbers, '-', '_', or '.',
    /// and are globally unique across all packages of a catalog.
    pub struct BundleName("BundleName::schema", example = "etcdoperator.v0.9.4");
}
