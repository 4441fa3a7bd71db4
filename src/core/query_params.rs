use std::collections::HashMap;

/// Parse query parameters from a URI string
///
/// Handles URL decoding and returns a HashMap of parameter key-value pairs.
/// Multiple values for the same key are not supported (only the last is kept).
///
/// # Example
/// ```
/// use feedline::core::query_params::parse_query_params;
///
/// let params = parse_query_params("/posts?author=42&hashtag=py%20thon");
/// assert_eq!(params.get("author"), Some(&"42".to_string()));
/// assert_eq!(params.get("hashtag"), Some(&"py thon".to_string()));
/// ```
pub fn parse_query_params(uri: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();

    if let Some((_, query)) = uri.split_once('?') {
        for param in query.split('&').filter(|p| !p.is_empty()) {
            match param.split_once('=') {
                Some((key, encoded_value)) => {
                    let plus_decoded = encoded_value.replace('+', " ");
                    let decoded = urlencoding::decode(&plus_decoded)
                        .map(|v| v.into_owned())
                        .unwrap_or_else(|_| plus_decoded.clone());
                    params.insert(key.to_string(), decoded);
                }
                // Flag parameter without value
                None => {
                    params.insert(param.to_string(), String::new());
                }
            }
        }
    }

    params
}

/// Get a non-empty string parameter. Empty values count as absent.
pub fn get_string(params: &HashMap<String, String>, key: &str) -> Option<String> {
    params
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Get a comma-separated list parameter (e.g., ?author=a,b).
pub fn get_list(params: &HashMap<String, String>, key: &str) -> Option<Vec<String>> {
    let values: Vec<String> = get_string(params, key)?
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect();
    if values.is_empty() {
        None
    } else {
        Some(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("/posts", None)]
    #[case("/posts?hashtag=", None)]
    #[case("/posts?hashtag=%20", None)]
    #[case("/posts?hashtag=ec", Some("ec"))]
    #[case("/posts?author=1&hashtag=Py%20th", Some("Py th"))]
    #[case("/posts?hashtag=a+b", Some("a b"))]
    fn hashtag_param(#[case] uri: &str, #[case] expected: Option<&str>) {
        let params = parse_query_params(uri);
        assert_eq!(get_string(&params, "hashtag").as_deref(), expected);
    }

    #[test]
    fn author_list_splits_on_commas() {
        let params = parse_query_params("/posts?author=a,%20b,,c");
        assert_eq!(
            get_list(&params, "author"),
            Some(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
        assert_eq!(get_list(&parse_query_params("/posts?author=,"), "author"), None);
    }

    #[test]
    fn flag_without_value() {
        let params = parse_query_params("/profiles?verbose");
        assert_eq!(params.get("verbose"), Some(&String::new()));
    }
}
