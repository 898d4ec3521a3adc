use crate::Location;
use serde::Deserialize;
use std::cell::RefCell;
use std::future::Future;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use url::Url;

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("failed to fetch resource {uri}")]
    Fetch {
        uri: String,
        #[source]
        detail: Box<dyn std::error::Error + Send + Sync>,
    },
    #[error("failed to read catalog directory {path}")]
    Io {
        path: String,
        #[source]
        detail: std::io::Error,
    },
    #[error("failed to walk catalog directory {path}")]
    Walk {
        path: String,
        #[source]
        detail: walkdir::Error,
    },
    #[error("failed to parse JSON document at byte offset {offset}")]
    JsonErr {
        offset: usize,
        #[source]
        detail: serde_json::Error,
    },
    #[error("failed to parse YAML document {index} (location {:?})", .detail.location())]
    YamlErr {
        index: usize,
        #[source]
        detail: serde_yaml::Error,
    },
    #[error(transparent)]
    Blob(#[from] models::BlobError),
    #[error(transparent)]
    Property(#[from] models::InvalidProperty),
    #[error("catalog load was cancelled")]
    Cancelled,
}

pub type FetchResult = Result<Box<[u8]>, Box<dyn std::error::Error + Send + Sync>>;

/// Fetch a file:// resource from the local filesystem.
pub fn fetch_file(resource: &Url) -> impl Future<Output = FetchResult> + 'static {
    let resource = resource.clone();
    async move {
        let path = resource
            .to_file_path()
            .map_err(|()| anyhow::anyhow!("resource {} is not a local path", resource))?;
        let content = tokio::fs::read(&path).await?;
        Ok(content.into_boxed_slice())
    }
}

// File format, determined from the resource extension.
enum Format {
    Json,
    Yaml,
    // No recognized extension: sniff the content.
    Auto,
}

fn format_of(resource: &Url) -> Format {
    match Path::new(resource.path()).extension().and_then(|e| e.to_str()) {
        Some("json") => Format::Json,
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => Format::Auto,
    }
}

/// Loader drives the traversal of a declarative catalog directory,
/// draining its typed blobs into catalog tables and aggregating failures
/// as scoped error rows. It's parameterized over a fetch function for
/// retrieving resource contents, which is where loads suspend on I/O.
pub struct Loader<F, FF>
where
    F: FnMut(&Url) -> FF,
    FF: Future<Output = FetchResult>,
{
    catalog: RefCell<tables::Catalog>,
    errors: RefCell<tables::Errors>,
    registry: models::PropertyRegistry,
    fetch: RefCell<F>,
}

impl<F, FF> Loader<F, FF>
where
    F: FnMut(&Url) -> FF,
    FF: Future<Output = FetchResult>,
{
    /// Build and return a new Loader.
    pub fn new(registry: models::PropertyRegistry, fetch: F) -> Loader<F, FF> {
        Loader {
            catalog: RefCell::new(tables::Catalog::default()),
            errors: RefCell::new(tables::Errors::new()),
            registry,
            fetch: RefCell::new(fetch),
        }
    }

    /// Consume this Loader, returning its loaded tables and error rows.
    pub fn into_tables(self) -> (tables::Catalog, tables::Errors) {
        let Loader {
            catalog, errors, ..
        } = self;
        (catalog.into_inner(), errors.into_inner())
    }

    /// Load every regular file under |root|, visiting files in
    /// lexicographic order of their relative path. Returns Cancelled if
    /// |cancel| fires, abandoning the remainder of the walk.
    pub async fn load_directory(
        &self,
        root: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), LoadError> {
        let root = root.canonicalize().map_err(|detail| LoadError::Io {
            path: root.display().to_string(),
            detail,
        })?;

        let mut files = Vec::new();
        for dent in walkdir::WalkDir::new(&root).follow_links(true) {
            let dent = dent.map_err(|detail| LoadError::Walk {
                path: root.display().to_string(),
                detail,
            })?;
            if !dent.file_type().is_file() {
                continue;
            }
            let rel = dent
                .path()
                .strip_prefix(&root)
                .unwrap_or(dent.path())
                .to_string_lossy()
                .into_owned();
            let resource = Url::from_file_path(dent.path())
                .expect("canonicalized walk paths are absolute");
            files.push((rel, resource));
        }
        files.sort_by(|lhs, rhs| lhs.0.cmp(&rhs.0));

        for (rel, resource) in &files {
            if cancel.is_cancelled() {
                return Err(LoadError::Cancelled);
            }
            tracing::debug!(path = %rel, "loading catalog file");
            self.load_resource(resource).await;
        }
        Ok(())
    }

    /// Load a single resource. Failures become error rows rather than
    /// aborting the load.
    pub async fn load_resource(&self, resource: &Url) {
        let location = Location::resource(resource);
        let content = (self.fetch.borrow_mut())(resource);
        match content.await {
            Ok(content) => self.load_resource_content(&location, resource, &content),
            Err(detail) => self.push_error(
                &location,
                LoadError::Fetch {
                    uri: resource.to_string(),
                    detail,
                },
            ),
        }
    }

    fn load_resource_content(&self, location: &Location, resource: &Url, content: &[u8]) {
        match format_of(resource) {
            Format::Json => self.load_json(location, content),
            Format::Yaml => self.load_yaml(location, content),
            // A JSON object stream isn't a well-formed YAML multi-document
            // stream, so sniff on the first significant byte.
            Format::Auto => {
                let first = content.iter().find(|b| !b.is_ascii_whitespace());
                if first == Some(&b'{') {
                    self.load_json(location, content)
                } else {
                    self.load_yaml(location, content)
                }
            }
        }
    }

    // Parse a stream of concatenated top-level JSON objects.
    fn load_json(&self, location: &Location, content: &[u8]) {
        let mut stream =
            serde_json::Deserializer::from_slice(content).into_iter::<serde_json::Value>();
        let mut index = 0;

        loop {
            let offset = stream.byte_offset();
            match stream.next() {
                None => break,
                Some(Ok(doc)) => {
                    self.load_document(location.document(index), doc);
                    index += 1;
                }
                Some(Err(detail)) => {
                    // There's no way to re-synchronize a malformed stream.
                    self.push_error(location, LoadError::JsonErr { offset, detail });
                    break;
                }
            }
        }
    }

    // Parse a stream of `---`-separated YAML documents.
    fn load_yaml(&self, location: &Location, content: &[u8]) {
        for (index, document) in serde_yaml::Deserializer::from_slice(content).enumerate() {
            match serde_json::Value::deserialize(document) {
                Ok(doc) => self.load_document(location.document(index), doc),
                Err(detail) => self.push_error(
                    &location.document(index),
                    LoadError::YamlErr { index, detail },
                ),
            }
        }
    }

    fn load_document(&self, location: Location, doc: serde_json::Value) {
        // An empty document (e.g. a trailing `---`) is not a blob.
        if doc.is_null() {
            return;
        }
        match models::Blob::decode(doc) {
            Ok(models::Blob::Package(package)) => self.load_package(location, package),
            Ok(models::Blob::Channel(channel)) => self.load_channel(location, channel),
            Ok(models::Blob::Bundle(bundle)) => self.load_bundle(location, bundle),
            Ok(models::Blob::Unknown(unknown)) => {
                self.catalog.borrow_mut().unknown_blobs.insert_row(
                    location.url(),
                    unknown.schema,
                    unknown.value,
                );
            }
            Err(err) => self.push_error(&location, err.into()),
        }
    }

    fn load_package(&self, location: Location, package: models::PackageBlob) {
        let models::PackageBlob {
            schema: _,
            name,
            default_channel,
            description,
            icon,
            extra,
        } = package;

        self.catalog.borrow_mut().packages.insert_row(
            location.url(),
            name,
            default_channel,
            description,
            icon,
            extra,
        );
    }

    fn load_channel(&self, location: Location, channel: models::ChannelBlob) {
        let models::ChannelBlob {
            schema: _,
            package,
            name,
            entries,
            extra,
        } = channel;

        let mut catalog = self.catalog.borrow_mut();

        for (index, entry) in entries.into_iter().enumerate() {
            let models::ChannelEntry {
                name: bundle,
                replaces,
                skips,
                skip_range,
            } = entry;

            catalog.entries.insert_row(
                location.entry(index).url(),
                &package,
                &name,
                bundle,
                replaces,
                skips,
                skip_range,
            );
        }
        catalog
            .channels
            .insert_row(location.url(), package, name, extra);
    }

    fn load_bundle(&self, location: Location, bundle: models::BundleBlob) {
        let models::BundleBlob {
            schema: _,
            name,
            package,
            image,
            properties,
            related_images,
            extra,
        } = bundle;

        // Properties are a set under (type, canonical payload) equality.
        let properties = self.registry.dedup(properties);
        let (typed, invalid) = self.registry.parse_all(&properties);

        for err in invalid {
            let index = err.index;
            self.push_error(&location.property(index), err.into());
        }

        let version = typed.iter().find_map(|t| match t {
            models::TypedProperty::Package(p) => Some(p.version.clone()),
            _ => None,
        });

        self.catalog.borrow_mut().bundles.insert_row(
            location.url(),
            package,
            name,
            image,
            version,
            properties,
            related_images,
            extra,
        );
    }

    fn push_error(&self, location: &Location, err: LoadError) {
        self.errors
            .borrow_mut()
            .push(location.url(), anyhow::Error::new(err));
    }
}

/// Load the declarative catalog rooted at |root| from the local
/// filesystem. Parse and property errors are aggregated as error rows;
/// only walk failures and cancellation fail the load outright.
pub async fn load(
    root: &Path,
    registry: models::PropertyRegistry,
    cancel: &CancellationToken,
) -> Result<(tables::Catalog, tables::Errors), LoadError> {
    let loader = Loader::new(registry, |resource: &Url| fetch_file(resource));
    loader.load_directory(root, cancel).await?;
    Ok(loader.into_tables())
}
