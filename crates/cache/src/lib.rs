use models::{GroupVersionKind, PropertyRegistry, TypedProperty};
use queries::{BundleRecord, ChannelEntryRef, Engine, PackageSummary};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use tokio_util::sync::CancellationToken;

mod served;
pub use served::Served;

// Files of the cache directory.
const DIGEST_FILE: &str = "digest";
const PACKAGES_FILE: &str = "packages.json";
const BUNDLES_FILE: &str = "bundles.json";
const PROVIDERS_FILE: &str = "providers.json";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("failed to read or write cache file {path}")]
    Io {
        path: String,
        #[source]
        detail: std::io::Error,
    },
    #[error("cache file {path} is malformed")]
    Malformed {
        path: String,
        #[source]
        detail: serde_json::Error,
    },
    #[error("cached answers disagree with the loaded catalog: {detail}")]
    CacheInconsistent { detail: String },
    #[error(transparent)]
    Query(#[from] queries::Error),
    #[error("cache operation was cancelled")]
    Cancelled,
}

/// The digest of a declarative catalog: a sha-256 over its sorted,
/// canonicalized blob stream. Two directories holding the same logical
/// catalog in different file layouts share a digest.
pub fn catalog_digest(catalog: &tables::Catalog) -> String {
    let mut hasher = Sha256::new();
    for blob in sources::canonical_blobs(catalog) {
        let bytes = serde_json::to_vec(&blob).expect("canonical blobs serialize");
        hasher.update(&bytes);
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

/// Per-GVK provider answers, keyed by "group/version/kind".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Providers {
    pub all: BTreeMap<String, Vec<ChannelEntryRef>>,
    pub latest: BTreeMap<String, Vec<ChannelEntryRef>>,
}

/// Cache holds the pre-computed answers of the query surface, keyed by
/// the digest of the declarative input which produced them. A server can
/// answer every query operation from these tables without re-assembling
/// the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    pub digest: String,
    pub packages: Vec<PackageSummary>,
    pub bundles: Vec<BundleRecord>,
    pub providers: Providers,
}

impl Cache {
    /// Compute every query answer of |engine|.
    pub fn build(
        engine: &Engine,
        digest: String,
        cancel: &CancellationToken,
    ) -> Result<Self, Error> {
        let mut packages = Vec::new();
        for name in engine.list_packages(cancel)? {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            packages.push(engine.get_package(&name, cancel)?);
        }

        let bundles = engine.list_bundles(cancel)?;

        let mut providers = Providers::default();
        for gvk in provided_apis(engine) {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }
            let key = gvk.to_string();
            providers.all.insert(
                key.clone(),
                engine.get_channel_entries_that_provide(
                    &gvk.group,
                    &gvk.version,
                    &gvk.kind,
                    cancel,
                )?,
            );
            providers.latest.insert(
                key,
                engine.get_latest_channel_entries_that_provide(
                    &gvk.group,
                    &gvk.version,
                    &gvk.kind,
                    cancel,
                )?,
            );
        }

        Ok(Self {
            digest,
            packages,
            bundles,
            providers,
        })
    }

    /// Write the cache into |dir|, creating it as needed.
    pub async fn write(&self, dir: &Path) -> Result<(), Error> {
        let io_err = |path: &Path| {
            let path = path.display().to_string();
            move |detail| Error::Io {
                path: path.clone(),
                detail,
            }
        };

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(io_err(dir))?;

        for (name, content) in [
            (DIGEST_FILE, self.digest.clone().into_bytes()),
            (PACKAGES_FILE, to_canonical_json(&self.packages)),
            (BUNDLES_FILE, to_canonical_json(&self.bundles)),
            (PROVIDERS_FILE, to_canonical_json(&self.providers)),
        ] {
            let path = dir.join(name);
            tokio::fs::write(&path, content)
                .await
                .map_err(io_err(&path))?;
        }
        tracing::debug!(dir = %dir.display(), digest = %self.digest, "wrote query cache");
        Ok(())
    }

    /// Read a cache previously written into |dir|.
    pub async fn read(dir: &Path) -> Result<Self, Error> {
        let read = |name: &'static str| {
            let path = dir.join(name);
            async move {
                tokio::fs::read(&path).await.map_err(|detail| Error::Io {
                    path: path.display().to_string(),
                    detail,
                })
            }
        };

        let digest = String::from_utf8_lossy(&read(DIGEST_FILE).await?).into_owned();
        let packages = from_json(dir.join(PACKAGES_FILE), &read(PACKAGES_FILE).await?)?;
        let bundles = from_json(dir.join(BUNDLES_FILE), &read(BUNDLES_FILE).await?)?;
        let providers = from_json(dir.join(PROVIDERS_FILE), &read(PROVIDERS_FILE).await?)?;

        Ok(Self {
            digest,
            packages,
            bundles,
            providers,
        })
    }

    /// The digest recorded in |dir|, if a cache is present.
    pub async fn stored_digest(dir: &Path) -> Option<String> {
        tokio::fs::read(dir.join(DIGEST_FILE))
            .await
            .ok()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Use the cache at |dir| when its digest matches the loaded catalog, and
/// rebuild it otherwise. Returns the cache and whether it was rebuilt.
pub async fn load_or_rebuild(
    dir: &Path,
    engine: &Engine,
    cancel: &CancellationToken,
) -> Result<(Cache, bool), Error> {
    let digest = catalog_digest(engine.catalog());

    if Cache::stored_digest(dir).await.as_ref() == Some(&digest) {
        let cache = Cache::read(dir).await?;
        tracing::debug!(digest = %digest, "reusing query cache");
        return Ok((cache, false));
    }

    let cache = Cache::build(engine, digest, cancel)?;
    cache.write(dir).await?;
    Ok((cache, true))
}

/// Rebuild the answers transiently and compare them to |cached|,
/// byte-for-byte. A mismatch means the cache does not faithfully answer
/// for its catalog.
pub fn check_integrity(
    cached: &Cache,
    engine: &Engine,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let fresh = Cache::build(engine, catalog_digest(engine.catalog()), cancel)?;

    for (name, lhs, rhs) in [
        (
            DIGEST_FILE,
            cached.digest.clone().into_bytes(),
            fresh.digest.clone().into_bytes(),
        ),
        (
            PACKAGES_FILE,
            to_canonical_json(&cached.packages),
            to_canonical_json(&fresh.packages),
        ),
        (
            BUNDLES_FILE,
            to_canonical_json(&cached.bundles),
            to_canonical_json(&fresh.bundles),
        ),
        (
            PROVIDERS_FILE,
            to_canonical_json(&cached.providers),
            to_canonical_json(&fresh.providers),
        ),
    ] {
        if lhs != rhs {
            return Err(Error::CacheInconsistent {
                detail: format!("{} diverges from the freshly computed answers", name),
            });
        }
    }
    Ok(())
}

// Every distinct API provided by some bundle of the catalog.
fn provided_apis(engine: &Engine) -> Vec<GroupVersionKind> {
    let registry = PropertyRegistry::new();
    let mut apis = std::collections::BTreeSet::new();

    for bundle in engine.catalog().bundles.iter() {
        let (typed, _) = registry.parse_all(&bundle.properties);
        for t in typed {
            if let TypedProperty::Gvk(gvk) = t {
                apis.insert(gvk);
            }
        }
    }
    apis.into_iter().collect()
}

fn to_canonical_json<T: Serialize>(value: &T) -> Vec<u8> {
    let mut bytes = serde_json::to_vec_pretty(value).expect("cache answers serialize");
    bytes.push(b'\n');
    bytes
}

fn from_json<T: for<'de> Deserialize<'de>>(
    path: std::path::PathBuf,
    bytes: &[u8],
) -> Result<T, Error> {
    serde_json::from_slice(bytes).map_err(|detail| Error::Malformed {
        path: path.display().to_string(),
        detail,
    })
}
