// Command path parsing

use crate::domain::DomainError;
use std::collections::BTreeMap;

/// Namespace-relative path split into segments plus its query map
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedPath {
    pub segments: Vec<String>,
    pub query: BTreeMap<String, String>,
}

impl ParsedPath {
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }
}

/// Parse `<...><namespace>/<segments...>[?k=v&...]`
///
/// The path may be a full URL; everything up to and including the first
/// occurrence of the namespace that ends at a segment boundary is discarded,
/// so a host name containing the namespace text is skipped. Empty segments
/// are ignored.
pub fn parse_path(path: &str, namespace: &str) -> Result<ParsedPath, DomainError> {
    let namespace = namespace.trim_end_matches('/');

    // "/nsfoo" is not under "/ns"
    let rest = path
        .match_indices(namespace)
        .map(|(start, _)| &path[start + namespace.len()..])
        .find(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
        .ok_or_else(|| DomainError::InvalidPath(format!("'{}' outside {}", path, namespace)))?;

    let (route, query) = match rest.split_once('?') {
        Some((route, query)) => (route, Some(query)),
        None => (rest, None),
    };

    let segments = route
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ParsedPath {
        segments,
        query: query.map(parse_query).unwrap_or_default(),
    })
}

/// `a=1&b&c=` becomes {a: "1", b: "", c: ""}
fn parse_query(query: &str) -> BTreeMap<String, String> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const NS: &str = "/nga/api/v1";

    #[test]
    fn test_segments_after_namespace() {
        let parsed = parse_path("/nga/api/v1/jobs/job-a/run", NS).unwrap();
        assert_eq!(parsed.segments, vec!["jobs", "job-a", "run"]);
        assert!(parsed.query.is_empty());
    }

    #[test]
    fn test_full_url_and_trailing_slash() {
        let parsed = parse_path("https://ci.example.com/jenkins/nga/api/v1/status/", NS).unwrap();
        assert_eq!(parsed.segments, vec!["status"]);
    }

    #[test]
    fn test_namespace_text_in_host_is_skipped() {
        let parsed = parse_path("https://ci.example.com/ci/status", "/ci").unwrap();
        assert_eq!(parsed.segments, vec!["status"]);

        let parsed = parse_path("https://ci.example.com/cimirror/ci/jobs?parameters=false", "/ci")
            .unwrap();
        assert_eq!(parsed.segments, vec!["jobs"]);
        assert_eq!(parsed.query_param("parameters"), Some("false"));
    }

    #[test]
    fn test_query_on_last_segment() {
        let parsed = parse_path("/nga/api/v1/jobs?parameters=false&flag", NS).unwrap();
        assert_eq!(parsed.segments, vec!["jobs"]);
        assert_eq!(parsed.query_param("parameters"), Some("false"));
        assert_eq!(parsed.query_param("flag"), Some(""));
        assert_eq!(parsed.query_param("missing"), None);
    }

    #[test]
    fn test_outside_namespace_rejected() {
        assert!(matches!(
            parse_path("/other/api/status", NS),
            Err(DomainError::InvalidPath(_))
        ));
        assert!(matches!(
            parse_path("/nga/api/v1status", NS),
            Err(DomainError::InvalidPath(_))
        ));
    }

    #[test]
    fn test_bare_namespace_has_no_segments() {
        let parsed = parse_path("/nga/api/v1", NS).unwrap();
        assert!(parsed.segments.is_empty());
    }
}
