//! # Request Parsing
//!
//! Transport-agnostic request input: the [`Params`] bundle an adapter hands
//! to the executor, plus target and query-string parsing.
//!
//! The query parser understands the bracket conventions JavaScript clients
//! send: repeated keys, `k[]=` appends, `k[0]=` indexed positions, and
//! `k[a][b]=` nested maps. Values are percent-decoded but stay strings;
//! turning them into typed JSON is the coercion layer's job.

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Raw request parameters handed to the executor
///
/// Everything here is pre-validation. Query and path values are strings or
/// string containers straight off the wire, and the body is whatever JSON
/// the transport decoded. Header names are expected lowercase.
#[derive(Debug, Clone, Default)]
pub struct Params {
    /// Path parameters captured by the router, keyed by template name
    pub path: Map<String, Value>,
    /// Query parameters parsed from the request target
    pub query: Map<String, Value>,
    /// Decoded JSON body, if the request carried one
    pub body: Option<Value>,
    /// Request headers
    pub headers: HashMap<String, String>,
}

impl Params {
    /// Empty parameter bundle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Split a request target into its path and parsed query parameters
///
/// The path portion is returned undecoded; [`split_path`] decodes segments
/// individually so an encoded slash cannot change the segment structure.
#[must_use]
pub fn parse_target(target: &str) -> (String, Map<String, Value>) {
    match target.split_once('?') {
        Some((path, qs)) => (path.to_string(), parse_query_string(qs)),
        None => (target.to_string(), Map::new()),
    }
}

/// Parse a query string into a string-valued parameter map
///
/// A key without `=` maps to the empty string. Repeated flat keys
/// accumulate into an array. Bracket segments build arrays and nested maps;
/// gaps left by sparse indices are filled with `null`. When a key is reused
/// with a conflicting shape, the later pair wins.
#[must_use]
pub fn parse_query_string(qs: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for pair in qs.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = percent_decode(raw_key, true);
        let value = percent_decode(raw_value, true);
        insert_pair(&mut out, &key, value);
    }
    out
}

/// Split a request path into decoded, non-empty segments
///
/// Consecutive and trailing slashes collapse. Unlike query strings, `+` is
/// a literal plus in path segments.
#[must_use]
pub fn split_path(path: &str) -> Vec<String> {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .map(|seg| percent_decode(seg, false))
        .collect()
}

fn insert_pair(out: &mut Map<String, Value>, key: &str, value: String) {
    let (head, segments) = parse_key(key);
    if segments.is_empty() {
        match out.get_mut(head) {
            Some(Value::Array(items)) => items.push(Value::String(value)),
            Some(existing) => {
                let prior = existing.take();
                *existing = Value::Array(vec![prior, Value::String(value)]);
            }
            None => {
                out.insert(head.to_string(), Value::String(value));
            }
        }
        return;
    }
    let slot = out.entry(head.to_string()).or_insert(Value::Null);
    set_path(slot, &segments, value);
}

/// Split `a[b][0][]` into `("a", ["b", "0", ""])`. Keys with unbalanced or
/// leading brackets are treated as flat.
fn parse_key(key: &str) -> (&str, Vec<&str>) {
    let Some(open) = key.find('[') else {
        return (key, Vec::new());
    };
    let head = &key[..open];
    if head.is_empty() {
        return (key, Vec::new());
    }
    let mut segments = Vec::new();
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        let Some(close) = stripped.find(']') else {
            return (key, Vec::new());
        };
        segments.push(&stripped[..close]);
        rest = &stripped[close + 1..];
    }
    if rest.is_empty() {
        (head, segments)
    } else {
        (key, Vec::new())
    }
}

fn set_path(slot: &mut Value, segments: &[&str], value: String) {
    let Some((seg, rest)) = segments.split_first() else {
        *slot = Value::String(value);
        return;
    };
    let index = if seg.is_empty() {
        None
    } else {
        seg.parse::<usize>().ok()
    };
    if seg.is_empty() || index.is_some() {
        if !matches!(slot, Value::Array(_)) {
            *slot = Value::Array(Vec::new());
        }
        if let Value::Array(items) = slot {
            let idx = index.unwrap_or(items.len());
            while items.len() <= idx {
                items.push(Value::Null);
            }
            set_path(&mut items[idx], rest, value);
        }
    } else {
        if !matches!(slot, Value::Object(_)) {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            let child = map.entry((*seg).to_string()).or_insert(Value::Null);
            set_path(child, rest, value);
        }
    }
}

fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let decoded = if i + 2 < bytes.len() {
                    hex_val(bytes[i + 1]).zip(hex_val(bytes[i + 2]))
                } else {
                    None
                };
                if let Some((hi, lo)) = decoded {
                    out.push(hi * 16 + lo);
                    i += 3;
                } else {
                    out.push(b'%');
                    i += 1;
                }
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

fn hex_val(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_simple_pairs() {
        let out = parse_query_string("a=1&b=two");
        assert_eq!(Value::Object(out), json!({ "a": "1", "b": "two" }));
    }

    #[test]
    fn test_percent_and_plus_decoding() {
        let out = parse_query_string("greeting=hello+world&name=caf%C3%A9");
        assert_eq!(
            Value::Object(out),
            json!({ "greeting": "hello world", "name": "café" })
        );
    }

    #[test]
    fn test_flag_without_value() {
        let out = parse_query_string("verbose&x=1");
        assert_eq!(Value::Object(out), json!({ "verbose": "", "x": "1" }));
    }

    #[test]
    fn test_repeated_keys_accumulate() {
        let out = parse_query_string("include=user&include=user.posts");
        assert_eq!(
            Value::Object(out),
            json!({ "include": ["user", "user.posts"] })
        );
    }

    #[test]
    fn test_empty_brackets_append() {
        let out = parse_query_string("tag[]=a&tag[]=b");
        assert_eq!(Value::Object(out), json!({ "tag": ["a", "b"] }));
    }

    #[test]
    fn test_indexed_brackets() {
        let out = parse_query_string("expand[0]=user&expand[1]=user.posts");
        assert_eq!(
            Value::Object(out),
            json!({ "expand": ["user", "user.posts"] })
        );
    }

    #[test]
    fn test_sparse_index_pads_with_null() {
        let out = parse_query_string("a[2]=x");
        assert_eq!(Value::Object(out), json!({ "a": [null, null, "x"] }));
    }

    #[test]
    fn test_nested_brackets() {
        let out = parse_query_string("select[comments][id]=true&select[comments][text]=false");
        assert_eq!(
            Value::Object(out),
            json!({ "select": { "comments": { "id": "true", "text": "false" } } })
        );
    }

    #[test]
    fn test_conflicting_shapes_last_wins() {
        let out = parse_query_string("a=1&a[b]=2");
        assert_eq!(Value::Object(out), json!({ "a": { "b": "2" } }));
    }

    #[test]
    fn test_unbalanced_brackets_stay_flat() {
        let out = parse_query_string("a[b=1&[x]=2");
        assert_eq!(Value::Object(out), json!({ "a[b": "1", "[x]": "2" }));
    }

    #[test]
    fn test_invalid_percent_passes_through() {
        let out = parse_query_string("a=%zz&b=100%");
        assert_eq!(Value::Object(out), json!({ "a": "%zz", "b": "100%" }));
    }

    #[test]
    fn test_parse_target_splits_query() {
        let (path, query) = parse_target("/posts/5?include=user");
        assert_eq!(path, "/posts/5");
        assert_eq!(Value::Object(query), json!({ "include": "user" }));

        let (path, query) = parse_target("/posts/5");
        assert_eq!(path, "/posts/5");
        assert!(query.is_empty());
    }

    #[test]
    fn test_split_path_collapses_and_decodes() {
        assert_eq!(split_path("/posts//5/"), vec!["posts", "5"]);
        assert_eq!(split_path("/a%2Fb"), vec!["a/b"]);
        assert_eq!(split_path("/a+b"), vec!["a+b"]);
        assert!(split_path("/").is_empty());
    }
}
