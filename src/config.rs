//! Endpoint config file parser.
//!
//! Parses `key = value` lines without a regex dependency — the character
//! class this format allows is simple enough for a manual scan.

use std::collections::HashMap;
use std::path::Path;

use crate::error::ConfigError;

/// The parsed, validated endpoint config (`region` and `domain` required).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub region: String,
    pub domain: String,
    pub extra: HashMap<String, String>,
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Parse one `key = value` line. Returns `None` for lines that don't match
/// `^[A-Za-z0-9_-]+\s*=\s*[A-Za-z0-9_-]+\s*$` (including blank lines and
/// comments) — those are silently ignored, matching the original regex's
/// behavior of simply not matching.
fn parse_line(line: &str) -> Option<(String, String)> {
    let (key_part, rest) = line.split_once('=')?;
    let key = key_part.trim();
    let value = rest.trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    if !key.chars().all(is_key_char) || !value.chars().all(is_key_char) {
        return None;
    }
    Some((key.to_string(), value.to_string()))
}

/// Parse the raw contents of a config file into a key/value map, ignoring
/// any line that doesn't match the expected shape.
pub fn parse_str(contents: &str) -> HashMap<String, String> {
    contents.lines().filter_map(parse_line).collect()
}

/// Load and validate an endpoint config file, requiring `region` and
/// `domain`.
pub fn load(path: &Path) -> Result<EndpointConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError(format!("cannot read {}: {e}", path.display())))?;
    let mut map = parse_str(&contents);

    let region = map
        .remove("region")
        .ok_or_else(|| ConfigError(format!("missing required key 'region' in {}", path.display())))?;
    let domain = map
        .remove("domain")
        .ok_or_else(|| ConfigError(format!("missing required key 'domain' in {}", path.display())))?;

    Ok(EndpointConfig {
        region,
        domain,
        extra: map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_lines() {
        let map = parse_str("region = us-west-2\ndomain=fauxfillment\n");
        assert_eq!(map.get("region"), Some(&"us-west-2".to_string()));
        assert_eq!(map.get("domain"), Some(&"fauxfillment".to_string()));
    }

    #[test]
    fn ignores_malformed_lines() {
        let map = parse_str("# a comment\n\nnot a valid line\nregion = us-east-1\n");
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("region"), Some(&"us-east-1".to_string()));
    }

    #[test]
    fn rejects_disallowed_characters() {
        let map = parse_str("region = us west 2\n");
        assert!(map.is_empty());
    }

    #[test]
    fn load_requires_region_and_domain() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aws.properties.private");
        std::fs::write(&path, "region = us-west-2\n").unwrap();
        let err = load(&path).unwrap_err();
        assert!(err.0.contains("domain"));
    }

    #[test]
    fn load_succeeds_with_both_required_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aws.properties.private");
        std::fs::write(&path, "region = us-west-2\ndomain = fauxfillment\nextra = stuff\n").unwrap();
        let cfg = load(&path).unwrap();
        assert_eq!(cfg.region, "us-west-2");
        assert_eq!(cfg.domain, "fauxfillment");
        assert_eq!(cfg.extra.get("extra"), Some(&"stuff".to_string()));
    }
}
