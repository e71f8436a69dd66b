//! Path parameters extracted by the matcher
//!
//! - **Named values**: `:id` and `:id(\d+)` captures, keyed by declared name
//! - **Wildcard**: the trailing `*` capture, keyed by `*`
//! - **Decoding**: every captured segment is percent-decoded exactly once
//! - **Merging**: mounted routers can overlay their params onto the outer ones

use std::borrow::Cow;
use std::collections::HashMap;

/// Key under which the wildcard capture is stored.
pub const WILDCARD_KEY: &str = "*";

/// String-keyed parameter map produced by a route match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params {
    inner: HashMap<String, String>,
}

impl Params {
    /// Create empty params.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create with capacity.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: HashMap::with_capacity(capacity),
        }
    }

    /// Insert a parameter, replacing any previous value.
    #[inline]
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.inner.insert(name.into(), value.into());
    }

    /// Get parameter by name.
    #[inline]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.inner.get(name).map(String::as_str)
    }

    /// Get parameter and parse as type T.
    #[inline]
    pub fn get_parsed<T: std::str::FromStr>(&self, name: &str) -> Option<Result<T, T::Err>> {
        self.get(name).map(|v| v.parse())
    }

    /// Get wildcard capture.
    #[inline]
    pub fn wildcard(&self) -> Option<&str> {
        self.get(WILDCARD_KEY)
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.inner.remove(name)
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overlay these params onto `outer`: keys already present here win,
    /// keys only present in `outer` are copied in.
    pub fn merge_outer(&mut self, outer: &Params) {
        for (name, value) in &outer.inner {
            self.inner
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    /// Borrow the underlying map.
    pub fn as_map(&self) -> &HashMap<String, String> {
        &self.inner
    }

    pub fn into_map(self) -> HashMap<String, String> {
        self.inner
    }
}

impl From<HashMap<String, String>> for Params {
    fn from(inner: HashMap<String, String>) -> Self {
        Self { inner }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            inner: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Percent-decode one raw path segment.
///
/// Malformed escapes are left untouched; a segment that decodes to invalid
/// UTF-8 is returned raw.
#[inline]
pub fn decode_segment(raw: &str) -> Cow<'_, str> {
    if !raw.contains('%') {
        return Cow::Borrowed(raw);
    }
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// Decode each segment of a wildcard capture and re-join them with `/`.
pub fn decode_wildcard(segments: &[&str]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        if i > 0 {
            out.push('/');
        }
        out.push_str(&decode_segment(segment));
    }
    out
}

/// Parse a query string into a map of decoded parameters.
///
/// Later duplicates overwrite earlier ones; `+` is treated as a space.
pub fn parse_query_string(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let (key, value) = part.split_once('=').unwrap_or((part, ""));
            (decode_query(key), decode_query(value))
        })
        .collect()
}

fn decode_query(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    decode_segment(&spaced).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_plain_segment_borrows() {
        assert!(matches!(decode_segment("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn test_decode_once() {
        assert_eq!(decode_segment("%40"), "@");
        // %2540 is an encoded "%40" and must stay "%40" after one pass
        assert_eq!(decode_segment("%2540"), "%40");
    }

    #[test]
    fn test_decode_malformed_escape() {
        assert_eq!(decode_segment("100%"), "100%");
        assert_eq!(decode_segment("%zz"), "%zz");
    }

    #[test]
    fn test_decode_wildcard_joins_segments() {
        assert_eq!(decode_wildcard(&["a", "b%20c", "d.txt"]), "a/b c/d.txt");
        assert_eq!(decode_wildcard(&[""]), "");
        assert_eq!(decode_wildcard(&["x%2Fy"]), "x/y");
    }

    #[test]
    fn test_merge_outer_inner_wins() {
        let mut inner: Params = [("id", "inner"), ("post", "9")].into_iter().collect();
        let outer: Params = [("id", "outer"), ("org", "acme")].into_iter().collect();

        inner.merge_outer(&outer);

        assert_eq!(inner.get("id"), Some("inner"));
        assert_eq!(inner.get("org"), Some("acme"));
        assert_eq!(inner.get("post"), Some("9"));
        assert_eq!(inner.len(), 3);
    }

    #[test]
    fn test_get_parsed() {
        let params: Params = [("id", "42")].into_iter().collect();
        assert_eq!(params.get_parsed::<u32>("id"), Some(Ok(42)));
        assert!(params.get_parsed::<u32>("missing").is_none());
    }

    #[test]
    fn test_parse_query_string() {
        let params = parse_query_string("name=john+doe&email=test%40example.com&flag");
        assert_eq!(params.get("name"), Some(&"john doe".to_string()));
        assert_eq!(params.get("email"), Some(&"test@example.com".to_string()));
        assert_eq!(params.get("flag"), Some(&String::new()));
        assert!(parse_query_string("").is_empty());
    }
}
