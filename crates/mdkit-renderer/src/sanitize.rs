//! Administrative HTML filter.
//!
//! Rendered HTML passes through [`filter_admin`] before it leaves
//! [`convert`](crate::convert): tags outside a broad allowlist are removed
//! (their text content stays), event handler and `style` attributes are
//! dropped, URL attributes with a disallowed protocol are dropped, and
//! comments are removed.

use std::sync::LazyLock;

use regex::Regex;

/// Elements kept by [`filter_admin`].
pub const ADMIN_TAGS: &[&str] = &[
    "a", "abbr", "acronym", "address", "article", "aside", "b", "bdi", "bdo", "big",
    "blockquote", "br", "caption", "cite", "code", "col", "colgroup", "command", "dd", "del",
    "details", "dfn", "div", "dl", "dt", "em", "figcaption", "figure", "footer", "h1", "h2", "h3",
    "h4", "h5", "h6", "header", "hgroup", "hr", "i", "img", "ins", "kbd", "li", "mark", "menu",
    "meter", "nav", "ol", "output", "p", "pre", "progress", "q", "rp", "rt", "ruby", "s", "samp",
    "section", "small", "span", "strong", "sub", "summary", "sup", "table", "tbody", "td",
    "tfoot", "th", "thead", "time", "tr", "tt", "u", "ul", "var", "wbr",
];

/// URL schemes allowed in URL attributes.
pub const ALLOWED_PROTOCOLS: &[&str] = &[
    "http", "https", "ftp", "news", "nntp", "tel", "telnet", "mailto", "irc", "ssh", "sftp",
    "webcal", "rtsp",
];

/// Attributes whose value is a URL.
const URL_ATTRIBUTES: &[&str] = &[
    "href", "src", "cite", "action", "formaction", "poster", "background", "longdesc", "usemap",
    "xlink:href",
];

/// Comments, tags (possibly unterminated), and stray `>`.
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->|<[^>]*(?:>|$)|>").unwrap());

/// Element name and attribute list of one tag.
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^<\s*(/\s*)?([a-zA-Z0-9\-]+)\s*([^>]*)>?$").unwrap()
});

/// One attribute: name, then a double-quoted, single-quoted or bare value.
static ATTRIBUTE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"?|'([^']*)'?|([^\s"'=<>`]+)))?"#).unwrap()
});

/// Remove everything but allowlisted markup from `html`.
#[must_use]
pub fn filter_admin(html: &str) -> String {
    filter(html, ADMIN_TAGS)
}

/// Remove everything but `allowed` elements from `html`.
#[must_use]
pub fn filter(html: &str, allowed: &[&str]) -> String {
    let html = html.replace('\0', "");
    let mut out = String::with_capacity(html.len());
    let mut pos = 0;

    while let Some(token) = TOKEN_RE.find_at(&html, pos) {
        out.push_str(&html[pos..token.start()]);
        let text = token.as_str();

        if text == ">" {
            out.push_str("&gt;");
            pos = token.end();
            continue;
        }
        if text.starts_with("<!--") && text.ends_with("-->") {
            pos = token.end();
            continue;
        }
        // A `<` not opening a tag is text; rescan right after it.
        if !text[1..].starts_with(|c: char| c.is_ascii_alphabetic() || c == '/' || c == '!') {
            out.push_str("&lt;");
            pos = token.start() + 1;
            continue;
        }

        out.push_str(&filter_tag(text, allowed));
        pos = token.end();
    }

    out.push_str(&html[pos..]);
    out
}

fn filter_tag(tag: &str, allowed: &[&str]) -> String {
    let Some(captures) = TAG_RE.captures(tag) else {
        return String::new();
    };
    let element = &captures[2];
    let lower = element.to_ascii_lowercase();
    if !allowed.contains(&lower.as_str()) {
        return String::new();
    }
    if captures.get(1).is_some() {
        return format!("</{element}>");
    }

    let attributes = captures.get(3).map_or("", |m| m.as_str()).trim_end();
    let (attributes, self_closing) = match attributes.strip_suffix('/') {
        Some(rest) => (rest, " /"),
        None => (attributes, ""),
    };

    let kept = filter_attributes(attributes);
    if kept.is_empty() {
        format!("<{element}{self_closing}>")
    } else {
        format!("<{element} {}{self_closing}>", kept.join(" "))
    }
}

fn filter_attributes(attributes: &str) -> Vec<String> {
    let mut kept = Vec::new();
    for captures in ATTRIBUTE_RE.captures_iter(attributes) {
        let name = captures[1].to_ascii_lowercase();
        if name.starts_with("on") || name == "style" {
            continue;
        }
        let value = captures
            .get(2)
            .or_else(|| captures.get(3))
            .or_else(|| captures.get(4))
            .map(|m| m.as_str());

        match value {
            None => kept.push(name),
            Some(value) => {
                if URL_ATTRIBUTES.contains(&name.as_str()) && has_bad_protocol(value) {
                    continue;
                }
                let value = value.replace('"', "&quot;").replace(['<', '>'], "");
                kept.push(format!(r#"{name}="{value}""#));
            }
        }
    }
    kept
}

/// Whether a URL names a scheme outside [`ALLOWED_PROTOCOLS`].
///
/// Entities are decoded and whitespace or control characters removed first,
/// so `jav&#x61;script:` and `java\tscript:` are caught.
#[must_use]
pub fn has_bad_protocol(url: &str) -> bool {
    let decoded: String = decode_entities(url)
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    let Some(colon) = decoded.find(':') else {
        return false;
    };
    // A `/`, `?` or `#` before the colon makes it part of a relative path.
    if decoded[..colon].contains(['/', '?', '#']) {
        return false;
    }
    let scheme = decoded[..colon].to_ascii_lowercase();
    !ALLOWED_PROTOCOLS.contains(&scheme.as_str())
}

/// Decode character references the way browsers do inside attribute values.
///
/// Numeric references take any number of digits and need no trailing `;`
/// (`&#58`, `&#x000000003a;`). Named references need the `;`.
pub(crate) fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let candidate = &rest[amp + 1..];
        match decode_reference(candidate) {
            Some((c, consumed)) => {
                out.push(c);
                rest = &candidate[consumed..];
            }
            None => {
                out.push('&');
                rest = candidate;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Decode the reference following a `&`, returning the character and the
/// number of bytes consumed.
fn decode_reference(candidate: &str) -> Option<(char, usize)> {
    if let Some(numeric) = candidate.strip_prefix('#') {
        let (digits, radix, prefix) = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => (hex, 16, 2),
            None => (numeric, 10, 1),
        };
        let len = digits
            .find(|c: char| !c.is_digit(radix))
            .unwrap_or(digits.len());
        if len == 0 {
            return None;
        }
        let significant = digits[..len].trim_start_matches('0');
        // Zero, surrogates and out-of-range code points decode to U+FFFD.
        let c = (significant.len() <= 8)
            .then(|| u32::from_str_radix(significant, radix).ok())
            .flatten()
            .and_then(char::from_u32)
            .unwrap_or(char::REPLACEMENT_CHARACTER);
        let semicolon = usize::from(digits[len..].starts_with(';'));
        return Some((c, prefix + len + semicolon));
    }

    let end = candidate.find(';').filter(|&end| end <= 10)?;
    let c = match &candidate[..end] {
        "colon" => ':',
        "amp" => '&',
        "tab" => '\t',
        "newline" => '\n',
        "sol" => '/',
        "quest" => '?',
        "num" => '#',
        _ => return None,
    };
    Some((c, end + 1))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_keeps_allowed_markup() {
        let html = r#"<p class="x">Hi <strong>there</strong> <a href="https://example.com/">link</a></p>"#;

        assert_eq!(filter_admin(html), html);
    }

    #[test]
    fn test_removes_disallowed_tags_keeps_text() {
        assert_eq!(
            filter_admin("<script>alert(1)</script><p>ok</p>"),
            "alert(1)<p>ok</p>"
        );
        assert_eq!(filter_admin(r#"<iframe src="x"></iframe>"#), "");
    }

    #[test]
    fn test_drops_event_and_style_attributes() {
        assert_eq!(
            filter_admin(r#"<img src="a.png" onerror="x()" style="color:red" alt="A">"#),
            r#"<img src="a.png" alt="A">"#
        );
    }

    #[test]
    fn test_drops_bad_protocol_urls() {
        assert_eq!(
            filter_admin(r#"<a href="javascript:alert(1)">x</a>"#),
            "<a>x</a>"
        );
        assert_eq!(
            filter_admin(r#"<a href="jav&#x61;script:alert(1)">x</a>"#),
            "<a>x</a>"
        );
        assert_eq!(
            filter_admin(r#"<a href="/docs:intro">x</a>"#),
            r#"<a href="/docs:intro">x</a>"#
        );
    }

    #[test]
    fn test_comments_removed_and_stray_brackets_escaped() {
        assert_eq!(filter_admin("a <!-- hidden --> b"), "a  b");
        assert_eq!(filter_admin("1 < 2 > 0"), "1 &lt; 2 &gt; 0");
    }

    #[test]
    fn test_self_closing_and_closing_tags() {
        assert_eq!(filter_admin("<br/>line<hr />"), "<br />line<hr />");
        assert_eq!(filter_admin("</P >"), "</P>");
    }

    #[test]
    fn test_drops_urls_with_loosely_encoded_colons() {
        assert_eq!(
            filter_admin(r#"<a href="javascript&#58alert(1)">x</a>"#),
            "<a>x</a>"
        );
        assert_eq!(
            filter_admin(r#"<a href="javascript&#x000000003a;alert(1)">x</a>"#),
            "<a>x</a>"
        );
        assert_eq!(
            filter_admin(r#"<a href="javascript&#0000058;alert(1)">x</a>"#),
            "<a>x</a>"
        );
        assert_eq!(
            filter_admin(r#"<a href="https://example.com/?a=1&amp;b=2">x</a>"#),
            r#"<a href="https://example.com/?a=1&amp;b=2">x</a>"#
        );
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("a&#58b"), "a:b");
        assert_eq!(decode_entities("a&#x3A;b"), "a:b");
        assert_eq!(decode_entities("&#x00000000000000003a;"), ":");
        assert_eq!(decode_entities("&#99999999999;"), "\u{fffd}");
        assert_eq!(decode_entities("&colon;&unknown;&#;"), ":&unknown;&#;");
        assert_eq!(decode_entities("Tom & Jerry"), "Tom & Jerry");
    }

    #[test]
    fn test_has_bad_protocol() {
        assert!(has_bad_protocol("data:text/html,x"));
        assert!(has_bad_protocol(" java\tscript:x"));
        assert!(!has_bad_protocol("mailto:a@example.com"));
        assert!(!has_bad_protocol("page.html#a:b"));
        assert!(!has_bad_protocol("relative/path"));
    }
}
