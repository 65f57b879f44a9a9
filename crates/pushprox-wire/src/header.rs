//! Ordered HTTP header collection.
//!
//! Wire-format messages relay arbitrary target headers, so duplicate
//! names and insertion order must survive the trip back to the
//! collector. Entries are stored as a flat list of name/value pairs;
//! name comparisons are case-insensitive.

/// An ordered collection of HTTP headers.
///
/// Duplicate names are kept (e.g. repeated `Set-Cookie` headers), in
/// insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Values for `name`, in insertion order.
    fn values<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a str> + 'a {
        let wanted = name.to_ascii_lowercase();
        self.entries
            .iter()
            .filter(move |(n, _)| n.eq_ignore_ascii_case(&wanted))
            .map(|(_, v)| v.as_str())
    }

    /// Append a header, keeping any existing entries with the same name.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Replace every entry named `name` with a single one holding `value`.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        self.remove(name);
        self.insert(name, value);
    }

    /// Drop every entry named `name`. Returns whether anything was
    /// removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.entries.len() != before
    }

    /// First value for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values(name).next()
    }

    /// Every value for `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.values(name).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// All entries as name/value pairs, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy headers out of an `http::HeaderMap`. Values that are not
    /// valid UTF-8 are carried lossily.
    pub fn from_http(headers: &http::HeaderMap) -> Self {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect()
    }

    /// Convert into an `http::HeaderMap`, skipping entries whose name
    /// or value the `http` crate rejects.
    pub fn to_http(&self) -> http::HeaderMap {
        let mut out = http::HeaderMap::new();
        for (name, value) in self.iter() {
            let Ok(name) = http::HeaderName::from_bytes(name.as_bytes()) else {
                continue;
            };
            let Ok(value) = http::HeaderValue::from_str(value) else {
                continue;
            };
            out.append(name, value);
        }
        out
    }
}

impl FromIterator<(String, String)> for HeaderMap {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
