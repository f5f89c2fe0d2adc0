//! Case-insensitive header collection.

use std::collections::HashMap;

/// A single header with the name casing it was first set with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpHeader {
    name: String,
    value: String,
}

impl HttpHeader {
    /// Creates a new header.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Returns the header name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the raw header value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns the comma-separated values.
    #[must_use]
    pub fn values(&self) -> Vec<&str> {
        self.value.split(',').map(str::trim).collect()
    }
}

/// Headers keyed case-insensitively.
///
/// The first-seen casing of a name is kept; later writes only replace the
/// value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HttpHeaders {
    headers: HashMap<String, HttpHeader>,
}

impl HttpHeaders {
    /// Creates an empty header collection.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a header value, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        let name = name.into();
        let value = value.into();
        self.headers
            .entry(name.to_ascii_lowercase())
            .and_modify(|header| header.value.clone_from(&value))
            .or_insert_with(|| HttpHeader::new(name, value));
        self
    }

    /// Removes a header, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<HttpHeader> {
        self.headers.remove(&name.to_ascii_lowercase())
    }

    /// Returns the header value for a name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&str> {
        self.get(name).map(HttpHeader::value)
    }

    /// Returns the header for a name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&HttpHeader> {
        self.headers.get(&name.to_ascii_lowercase())
    }

    /// Checks whether a header is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.headers.contains_key(&name.to_ascii_lowercase())
    }

    /// Iterates over all headers in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &HttpHeader> {
        self.headers.values()
    }

    /// Returns the number of headers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.headers.len()
    }

    /// Returns true if there are no headers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Returns the headers as a name to value map.
    #[must_use]
    pub fn to_map(&self) -> HashMap<String, String> {
        self.headers
            .values()
            .map(|h| (h.name.clone(), h.value.clone()))
            .collect()
    }
}

impl<K, V> FromIterator<(K, V)> for HttpHeaders
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.set(name, value);
        }
        headers
    }
}
