//! URL normalization and redirect-chain helpers
//!
//! Rule sources and navigated URLs are always compared in normalized form:
//! no scheme, no leading `www.`, lowercase. These functions are total and
//! treat bare domains as valid input.

/// Query parameter that records the sources traversed by a redirect chain.
pub const CHAIN_PARAM: &str = "url_redirector";

/// Separator between chain members inside the parameter value.
pub const CHAIN_SEPARATOR: char = ',';

// =============================================================================
// Scheme Handling
// =============================================================================

/// Get the position after "://" if the URL starts with a scheme.
#[inline]
pub fn get_scheme_end(url: &str) -> Option<usize> {
    let bytes = url.as_bytes();

    let colon_pos = bytes.iter().position(|&b| b == b':')?;
    if colon_pos == 0 || !bytes[0].is_ascii_alphabetic() {
        return None;
    }
    let scheme_ok = bytes[..colon_pos]
        .iter()
        .all(|&b| b.is_ascii_alphanumeric() || b == b'+' || b == b'-' || b == b'.');
    if !scheme_ok {
        return None;
    }

    if bytes.len() > colon_pos + 2 && bytes[colon_pos + 1] == b'/' && bytes[colon_pos + 2] == b'/' {
        return Some(colon_pos + 3);
    }

    None
}

/// Whether the string carries an explicit scheme such as `https://`.
#[inline]
pub fn has_scheme(url: &str) -> bool {
    get_scheme_end(url).is_some()
}

/// Strip a leading `http://` or `https://`, case-insensitively.
#[inline]
pub fn strip_http_scheme(url: &str) -> &str {
    let bytes = url.as_bytes();
    if bytes.len() >= 8 && bytes[..8].eq_ignore_ascii_case(b"https://") {
        &url[8..]
    } else if bytes.len() >= 7 && bytes[..7].eq_ignore_ascii_case(b"http://") {
        &url[7..]
    } else {
        url
    }
}

/// Prefix `https://` unless the target already names a scheme.
pub fn with_default_scheme(target: &str) -> String {
    if has_scheme(target) {
        target.to_string()
    } else {
        format!("https://{}", target)
    }
}

// =============================================================================
// Normalization
// =============================================================================

/// Normalize a URL or bare domain for comparison.
///
/// Trims surrounding whitespace, removes a leading `http://`/`https://`,
/// lowercases, then removes a leading `www.`.
pub fn normalize(url: &str) -> String {
    let lower = strip_http_scheme(url.trim()).to_lowercase();
    match lower.strip_prefix("www.") {
        Some(rest) => rest.to_string(),
        None => lower,
    }
}

// =============================================================================
// Redirect Chain Parameter
// =============================================================================

/// Percent-encode the characters that would break a chain member out of
/// its query parameter slot.
pub fn encode_chain_member(member: &str) -> String {
    let mut out = String::with_capacity(member.len());
    for c in member.chars() {
        match c {
            '%' => out.push_str("%25"),
            '&' => out.push_str("%26"),
            '#' => out.push_str("%23"),
            ',' => out.push_str("%2C"),
            '=' => out.push_str("%3D"),
            '?' => out.push_str("%3F"),
            ' ' => out.push_str("%20"),
            _ => out.push(c),
        }
    }
    out
}

/// Reverse of [`encode_chain_member`]. Unknown escapes are kept verbatim.
pub fn decode_chain_member(member: &str) -> String {
    let mut out = String::with_capacity(member.len());
    let mut rest = member;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let escape = rest.get(pos..pos + 3).unwrap_or(&rest[pos..]);
        let decoded = match escape.to_ascii_uppercase().as_str() {
            "%25" => Some('%'),
            "%26" => Some('&'),
            "%23" => Some('#'),
            "%2C" => Some(','),
            "%3D" => Some('='),
            "%3F" => Some('?'),
            "%20" => Some(' '),
            _ => None,
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &rest[pos + 3..];
            }
            None => {
                out.push('%');
                rest = &rest[pos + 1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Find the raw value of the chain parameter in a URL's query string.
pub fn chain_param_value(url: &str) -> Option<&str> {
    let q_pos = url.find('?')?;
    let query = match url[q_pos + 1..].find('#') {
        Some(hash_pos) => &url[q_pos + 1..q_pos + 1 + hash_pos],
        None => &url[q_pos + 1..],
    };

    query.split('&').find_map(|pair| {
        let (key, value) = match pair.find('=') {
            Some(eq_pos) => (&pair[..eq_pos], &pair[eq_pos + 1..]),
            None => (pair, ""),
        };
        (key == CHAIN_PARAM).then_some(value)
    })
}

/// Decode the redirect chain carried by a URL, oldest hop first.
///
/// Members are returned normalized. A URL without the parameter yields an
/// empty chain.
pub fn parse_chain(url: &str) -> Vec<String> {
    let value = match chain_param_value(url) {
        Some(value) => value,
        None => return Vec::new(),
    };

    split_chain_value(value)
        .filter(|member| !member.is_empty())
        .map(|member| normalize(&decode_chain_member(member)))
        .collect()
}

/// Split on literal commas and on `%2C`, which some browsers substitute.
fn split_chain_value(value: &str) -> impl Iterator<Item = &str> {
    let mut parts = Vec::new();
    let bytes = value.as_bytes();
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == CHAIN_SEPARATOR as u8 {
            parts.push(&value[start..i]);
            i += 1;
            start = i;
        } else if bytes[i] == b'%'
            && i + 2 < bytes.len()
            && bytes[i + 1] == b'2'
            && (bytes[i + 2] | 0x20) == b'c'
        {
            parts.push(&value[start..i]);
            i += 3;
            start = i;
        } else {
            i += 1;
        }
    }
    parts.push(&value[start..]);
    parts.into_iter()
}

/// Append the chain parameter to a target URL, before any fragment.
///
/// An existing chain parameter in the target is replaced.
pub fn with_chain(target: &str, chain: &[String]) -> String {
    if chain.is_empty() {
        return target.to_string();
    }

    let (base, fragment) = match target.find('#') {
        Some(pos) => (&target[..pos], &target[pos..]),
        None => (target, ""),
    };
    let base = remove_chain_param(base);

    let joined: Vec<String> = chain.iter().map(|m| encode_chain_member(m)).collect();
    let separator = if base.ends_with('?') || base.ends_with('&') {
        ""
    } else if base.contains('?') {
        "&"
    } else {
        "?"
    };

    format!(
        "{}{}{}={}{}",
        base,
        separator,
        CHAIN_PARAM,
        joined.join(&CHAIN_SEPARATOR.to_string()),
        fragment
    )
}

fn remove_chain_param(base: &str) -> String {
    let q_pos = match base.find('?') {
        Some(pos) => pos,
        None => return base.to_string(),
    };
    let kept: Vec<&str> = base[q_pos + 1..]
        .split('&')
        .filter(|pair| {
            let key = pair.split('=').next().unwrap_or(pair);
            !pair.is_empty() && key != CHAIN_PARAM
        })
        .collect();

    if kept.is_empty() {
        base[..q_pos].to_string()
    } else {
        format!("{}?{}", &base[..q_pos], kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("https://www.Example.com/Path"), "example.com/path");
        assert_eq!(normalize("HTTP://example.com"), "example.com");
        assert_eq!(normalize("WWW.example.com"), "example.com");
        assert_eq!(normalize("example.com"), "example.com");
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("  https://www.a.com/x \n"), "a.com/x");
    }

    #[test]
    fn test_normalize_keeps_inner_www() {
        assert_eq!(normalize("https://blog.www.example.com"), "blog.www.example.com");
    }

    #[test]
    fn test_get_scheme_end() {
        assert_eq!(get_scheme_end("https://example.com"), Some(8));
        assert_eq!(get_scheme_end("chrome-extension://abc/page.html"), Some(19));
        assert_eq!(get_scheme_end("example.com"), None);
        assert_eq!(get_scheme_end("example.com:8080/path"), None);
        assert_eq!(get_scheme_end("://oops"), None);
    }

    #[test]
    fn test_with_default_scheme() {
        assert_eq!(with_default_scheme("b.com"), "https://b.com");
        assert_eq!(with_default_scheme("http://b.com"), "http://b.com");
        assert_eq!(with_default_scheme("https://b.com/x"), "https://b.com/x");
    }

    #[test]
    fn test_chain_param_value() {
        assert_eq!(
            chain_param_value("https://c.com/?x=1&url_redirector=a.com,b.com#top"),
            Some("a.com,b.com")
        );
        assert_eq!(chain_param_value("https://c.com/?x=1"), None);
        assert_eq!(chain_param_value("https://c.com/"), None);
    }

    #[test]
    fn test_parse_chain() {
        assert_eq!(
            parse_chain("https://d.com/?url_redirector=a.com,www.B.com%2Cc.com"),
            vec!["a.com", "b.com", "c.com"]
        );
        assert!(parse_chain("https://d.com/").is_empty());
        assert!(parse_chain("https://d.com/?url_redirector=").is_empty());
    }

    #[test]
    fn test_with_chain() {
        let chain = vec!["a.com".to_string()];
        assert_eq!(with_chain("https://b.com", &chain), "https://b.com?url_redirector=a.com");
        assert_eq!(
            with_chain("https://b.com/?q=1#frag", &chain),
            "https://b.com/?q=1&url_redirector=a.com#frag"
        );

        let longer = vec!["a.com".to_string(), "b.com".to_string()];
        assert_eq!(
            with_chain("https://c.com/?url_redirector=a.com", &longer),
            "https://c.com/?url_redirector=a.com,b.com"
        );
    }

    #[test]
    fn test_chain_members_with_query_survive() {
        let chain = vec!["youtube.com/watch?v=1&t=2".to_string()];
        let url = with_chain("https://b.com", &chain);
        assert_eq!(parse_chain(&url), chain);
    }

    #[test]
    fn test_decode_chain_member_keeps_unknown_escapes() {
        assert_eq!(decode_chain_member("a%41b"), "a%41b");
        assert_eq!(decode_chain_member("trailing%"), "trailing%");
    }
}
