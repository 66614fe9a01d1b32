//! Header copying with a deny-list of sensitive names.

use std::collections::BTreeMap;

use axum::http::HeaderMap;

/// Header names dropped from every record unless configured otherwise.
pub const DEFAULT_EXCLUDED_HEADERS: &[&str] = &["authorization"];

/// Copies header sets, leaving out every header on the deny-list.
///
/// Matching is case-insensitive. Denied headers are omitted entirely, not masked.
#[derive(Debug, Clone)]
pub struct HeaderFilter {
    excluded: Vec<String>,
}

impl HeaderFilter {
    pub fn new<I, S>(excluded: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded: excluded
                .into_iter()
                .map(|name| name.as_ref().trim().to_ascii_lowercase())
                .collect(),
        }
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.excluded.iter().any(|excluded| *excluded == name)
    }

    /// Returns a copy of `headers` without the denied entries. All values of a
    /// multi-value header are kept in order.
    pub fn filter(&self, headers: &HeaderMap) -> HeaderMap {
        let mut filtered = HeaderMap::with_capacity(headers.keys_len());
        for (name, value) in headers {
            if !self.is_excluded(name.as_str()) {
                filtered.append(name.clone(), value.clone());
            }
        }
        filtered
    }
}

impl Default for HeaderFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUDED_HEADERS)
    }
}

/// Converts a header map into the `name -> [values]` shape used by log records.
/// Values that are not valid UTF-8 are decoded lossily.
pub fn to_record_headers(headers: &HeaderMap) -> BTreeMap<String, Vec<String>> {
    let mut result: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in headers {
        result
            .entry(name.as_str().to_owned())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    fn sample_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.append(header::ACCEPT, HeaderValue::from_static("text/plain"));
        headers.append(header::ACCEPT, HeaderValue::from_static("application/json"));
        headers
    }

    #[test]
    fn test_default_filter_drops_authorization() {
        let filtered = HeaderFilter::default().filter(&sample_headers());
        assert!(filtered.get(header::AUTHORIZATION).is_none());
        assert_eq!(filtered.get(header::CONTENT_TYPE).unwrap(), "application/json");
    }

    #[test]
    fn test_multi_value_headers_pass_through() {
        let filtered = HeaderFilter::default().filter(&sample_headers());
        let accept: Vec<_> = filtered.get_all(header::ACCEPT).iter().collect();
        assert_eq!(accept, vec!["text/plain", "application/json"]);
    }

    #[test]
    fn test_deny_list_is_case_insensitive() {
        let filter = HeaderFilter::new(["X-Api-Key", "AUTHORIZATION"]);
        let mut headers = sample_headers();
        headers.insert("x-api-key", HeaderValue::from_static("k"));

        let filtered = filter.filter(&headers);
        assert!(filtered.get("x-api-key").is_none());
        assert!(filtered.get(header::AUTHORIZATION).is_none());
        assert!(filter.is_excluded("Authorization"));
        assert!(!filter.is_excluded("accept"));
    }

    #[test]
    fn test_filter_does_not_touch_source() {
        let headers = sample_headers();
        let _ = HeaderFilter::default().filter(&headers);
        assert!(headers.get(header::AUTHORIZATION).is_some());
    }

    #[test]
    fn test_record_headers_group_values() {
        let converted = to_record_headers(&HeaderFilter::default().filter(&sample_headers()));
        assert_eq!(
            converted.get("accept").unwrap(),
            &vec!["text/plain".to_string(), "application/json".to_string()]
        );
        assert!(!converted.contains_key("authorization"));
    }
}
