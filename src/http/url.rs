//! URL checks and query-string merging.

use std::fmt;

use reqwest::Url;

use super::error::InvalidUrlError;

const SCHEMES: [&str; 2] = ["https://", "http://"];

/// `scheme://authority` prefix of an http(s) URL.
///
/// Everything up to the first `/` after the scheme belongs to the origin,
/// so `http://host:8080?x=1` keeps its query in the origin.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Origin(String);

impl Origin {
    /// Extracts the origin, failing for anything but a non-empty http(s)
    /// authority. The scheme is matched case-insensitively and surrounding
    /// whitespace is ignored.
    pub fn parse(url: &str) -> Result<Self, InvalidUrlError> {
        let trimmed = url.trim();

        let scheme_len = SCHEMES
            .iter()
            .find(|scheme| {
                trimmed
                    .get(..scheme.len())
                    .is_some_and(|prefix| prefix.eq_ignore_ascii_case(scheme))
            })
            .map(|scheme| scheme.len())
            .ok_or_else(|| InvalidUrlError::new(url))?;

        let rest = &trimmed[scheme_len..];
        let authority_len = rest.find('/').unwrap_or(rest.len());
        if authority_len == 0 {
            return Err(InvalidUrlError::new(url));
        }

        Ok(Origin(trimmed[..scheme_len + authority_len].to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Appends `params` form-encoded to the query of `url`, after any query the
/// URL already carries.
pub fn merge_query<K, V>(url: &str, params: &[(K, V)]) -> Result<String, InvalidUrlError>
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    Origin::parse(url)?;
    let mut parsed = Url::parse(url.trim()).map_err(|_| InvalidUrlError::new(url))?;
    parsed.query_pairs_mut().extend_pairs(params);
    Ok(parsed.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_http_and_https() {
        assert_eq!(
            Origin::parse("http://example.com/search?q=1").unwrap().as_str(),
            "http://example.com"
        );
        assert_eq!(
            Origin::parse("https://api.example.com:8443/v1").unwrap().as_str(),
            "https://api.example.com:8443"
        );
        assert_eq!(
            Origin::parse("http://example.com").unwrap().as_str(),
            "http://example.com"
        );
    }

    #[test]
    fn test_origin_scheme_case_insensitive_and_trimmed() {
        assert_eq!(
            Origin::parse("  HTTPS://Example.com/x ").unwrap().as_str(),
            "HTTPS://Example.com"
        );
    }

    #[test]
    fn test_origin_rejects_other_schemes() {
        for url in [
            "ftp://example.com/file",
            "example.com/path",
            "http:/example.com",
            "http://",
            "http:///path",
            "",
            "mailto:user@example.com",
        ] {
            let err = Origin::parse(url).unwrap_err();
            assert_eq!(err.url, url);
        }
    }

    #[test]
    fn test_merge_query_without_existing_query() {
        let url = merge_query("http://example.com/search", &[("q", "x")]).unwrap();
        assert_eq!(url, "http://example.com/search?q=x");
    }

    #[test]
    fn test_merge_query_appends_to_existing_query() {
        let url = merge_query("http://example.com/search?p=1", &[("q", "x")]).unwrap();
        assert_eq!(url, "http://example.com/search?p=1&q=x");
    }

    #[test]
    fn test_merge_query_encodes_values() {
        let url = merge_query(
            "https://example.com/s",
            &[("q", "a b&c"), ("lang", "zh")],
        )
        .unwrap();
        assert_eq!(url, "https://example.com/s?q=a+b%26c&lang=zh");
    }

    #[test]
    fn test_merge_query_keeps_fragment_last() {
        let url = merge_query("http://example.com/page#top", &[("a", "1")]).unwrap();
        assert_eq!(url, "http://example.com/page?a=1#top");
    }

    #[test]
    fn test_merge_query_rejects_invalid_url() {
        let err = merge_query("ftp://example.com/", &[("a", "1")]).unwrap_err();
        assert_eq!(err.url, "ftp://example.com/");
    }
}
