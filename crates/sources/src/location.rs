use url::Url;

/// Location identifies where a catalog row came from: the resource it
/// was read from, the index of the document within that resource's blob
/// stream, and, inside a recognized blob, the channel entry or bundle
/// property at fault. Error rows and loaded rows carry its URL rendering
/// as their scope.
///
/// Blobs have exactly two indexed interiors worth addressing (a
/// channel's `entries` and a bundle's `properties`), so Location is a
/// small owned value rather than a general document-pointer mechanism.
#[derive(Clone, Debug)]
pub struct Location {
    resource: Url,
    document: Option<usize>,
    field: Option<Field>,
}

// The addressable interior of a recognized blob.
#[derive(Copy, Clone, Debug)]
enum Field {
    Entry(usize),
    Property(usize),
}

impl Location {
    /// The root of a resource, before any document has been read.
    pub fn resource(resource: &Url) -> Self {
        Self {
            resource: resource.clone(),
            document: None,
            field: None,
        }
    }

    /// The |index|'th document of the resource's blob stream.
    pub fn document(&self, index: usize) -> Self {
        Self {
            resource: self.resource.clone(),
            document: Some(index),
            field: None,
        }
    }

    /// The |index|'th entry of the channel blob at this location.
    pub fn entry(&self, index: usize) -> Self {
        Self {
            field: Some(Field::Entry(index)),
            ..self.clone()
        }
    }

    /// The |index|'th property of the bundle blob at this location.
    pub fn property(&self, index: usize) -> Self {
        Self {
            field: Some(Field::Property(index)),
            ..self.clone()
        }
    }

    /// Render the location as its resource URL, extended with a fragment
    /// naming the document and field when they are set.
    pub fn url(&self) -> Url {
        let mut url = self.resource.clone();
        let mut fragment = String::new();

        if let Some(document) = self.document {
            fragment.push_str(&format!("/{}", document));
        }
        match self.field {
            Some(Field::Entry(index)) => fragment.push_str(&format!("/entries/{}", index)),
            Some(Field::Property(index)) => fragment.push_str(&format!("/properties/{}", index)),
            None => (),
        }

        if !fragment.is_empty() {
            url.set_fragment(Some(&fragment));
        }
        url
    }
}
