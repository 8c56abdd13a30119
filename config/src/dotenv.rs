//! Minimal `.env` parser: `KEY=value` lines, `#` comments, optional
//! `export ` prefix, optional single/double quotes around the value.

use std::collections::HashMap;
use std::path::Path;

pub(crate) fn load_env_map(
    override_dir: Option<&Path>,
) -> Result<HashMap<String, String>, std::io::Error> {
    let dir = match override_dir {
        Some(dir) => dir.to_path_buf(),
        None => std::env::current_dir()?,
    };
    let path = dir.join(".env");
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let raw = std::fs::read_to_string(path)?;
    Ok(parse(&raw))
}

fn parse(raw: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
            .unwrap_or(value);
        map.insert(key.to_string(), value.to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_comments_quotes_and_export() {
        let map = parse(
            "# comment\nPLAIN=1\nexport EXPORTED=2\nQUOTED=\"a b\"\nSINGLE='c'\nbad-line\n=novalue\n",
        );
        assert_eq!(map.get("PLAIN").map(String::as_str), Some("1"));
        assert_eq!(map.get("EXPORTED").map(String::as_str), Some("2"));
        assert_eq!(map.get("QUOTED").map(String::as_str), Some("a b"));
        assert_eq!(map.get("SINGLE").map(String::as_str), Some("c"));
        assert_eq!(map.len(), 4);
    }
}
