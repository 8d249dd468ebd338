//! Markup-dialect normalization.
//!
//! Applied exactly once, after placeholder substitution. The pass is a
//! pure function of its input: attribute spellings are canonicalized,
//! void elements self-closed, inline style strings restructured and
//! comments stripped. Generated `weft-*` elements pass through like any
//! other element.

/// Component-framework attribute spellings mapped back to markup.
const ATTRIBUTE_SPELLINGS: &[(&str, &str)] = &[("className", "class"), ("htmlFor", "for")];

/// Elements that never carry content and are emitted self-closed.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Normalize one markup fragment.
pub fn normalize_markup(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("<!--") {
            // Comment: drop it entirely. Unterminated comments swallow the
            // rest of the fragment, matching browser recovery.
            match after.find("-->") {
                Some(end) => rest = &after[end + 3..],
                None => rest = "",
            }
            continue;
        }

        if rest.starts_with('<') && !rest.starts_with("</") {
            if let Some((tag, remainder)) = split_tag(rest) {
                out.push_str(&rewrite_open_tag(tag));
                rest = remainder;
                continue;
            }
        }

        let mut chars = rest.chars();
        match chars.next() {
            Some(ch) => {
                out.push(ch);
                rest = chars.as_str();
            }
            None => break,
        }
    }

    out
}

/// Split `<name attrs...>` off the front of `input`, honoring quoted
/// attribute values. Returns `None` for text that merely starts with `<`.
fn split_tag(input: &str) -> Option<(&str, &str)> {
    let bytes = input.as_bytes();
    if bytes.len() < 2 || !(bytes[1] as char).is_ascii_alphabetic() {
        return None;
    }

    let mut quote: Option<u8> = None;
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        match quote {
            Some(q) if b == q => quote = None,
            Some(_) => {}
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b == b'>' => return Some((&input[..=i], &input[i + 1..])),
            None => {}
        }
    }
    None
}

/// Rebuild an opening tag with canonical attribute spellings, structured
/// style strings and void-element self-closing.
fn rewrite_open_tag(tag: &str) -> String {
    let inner = tag
        .trim_start_matches('<')
        .trim_end_matches('>')
        .trim_end();
    let (inner, explicit_self_close) = match inner.strip_suffix('/') {
        Some(stripped) => (stripped.trim_end(), true),
        None => (inner, false),
    };

    let name_end = inner
        .find(|c: char| c.is_whitespace())
        .unwrap_or(inner.len());
    let name = &inner[..name_end];
    let attrs = parse_attributes(&inner[name_end..]);

    let mut out = String::with_capacity(tag.len());
    out.push('<');
    out.push_str(name);
    for (attr_name, value) in &attrs {
        out.push(' ');
        out.push_str(canonical_attribute(attr_name));
        if let Some(value) = value {
            let value = if attr_name.eq_ignore_ascii_case("style") {
                normalize_style(value)
            } else {
                value.to_string()
            };
            out.push_str("=\"");
            out.push_str(&value);
            out.push('"');
        }
    }

    let is_void = VOID_ELEMENTS.contains(&name.to_ascii_lowercase().as_str());
    if is_void || explicit_self_close {
        out.push('/');
    }
    out.push('>');
    out
}

/// Attribute list as (name, optional value) pairs, order preserved.
fn parse_attributes(input: &str) -> Vec<(String, Option<String>)> {
    let mut attrs = Vec::new();
    let mut rest = input.trim_start();

    while !rest.is_empty() {
        let name_end = rest
            .find(|c: char| c.is_whitespace() || c == '=')
            .unwrap_or(rest.len());
        let name = &rest[..name_end];
        rest = rest[name_end..].trim_start();

        if let Some(after_eq) = rest.strip_prefix('=') {
            let after_eq = after_eq.trim_start();
            let (value, remainder) = match after_eq.as_bytes().first() {
                Some(&q @ (b'"' | b'\'')) => {
                    let body = &after_eq[1..];
                    match body.find(q as char) {
                        Some(end) => (&body[..end], &body[end + 1..]),
                        None => (body, ""),
                    }
                }
                _ => {
                    let end = after_eq
                        .find(|c: char| c.is_whitespace())
                        .unwrap_or(after_eq.len());
                    (&after_eq[..end], &after_eq[end..])
                }
            };
            attrs.push((name.to_string(), Some(value.to_string())));
            rest = remainder.trim_start();
        } else {
            if !name.is_empty() {
                attrs.push((name.to_string(), None));
            }
            rest = rest.trim_start();
            if name.is_empty() {
                break;
            }
        }
    }

    attrs
}

fn canonical_attribute(name: &str) -> &str {
    ATTRIBUTE_SPELLINGS
        .iter()
        .find(|(from, _)| *from == name)
        .map(|(_, to)| *to)
        .unwrap_or(name)
}

/// `color:red;margin:0;` becomes `color: red; margin: 0`.
fn normalize_style(value: &str) -> String {
    value
        .split(';')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|decl| match decl.split_once(':') {
            Some((k, v)) => format!("{}: {}", k.trim(), v.trim()),
            None => decl.to_string(),
        })
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comments_stripped() {
        assert_eq!(normalize_markup("a<!-- x -->b"), "ab");
        assert_eq!(normalize_markup("a<!-- unterminated"), "a");
    }

    #[test]
    fn test_attribute_spelling_canonicalized() {
        assert_eq!(
            normalize_markup("<div className=\"note\">x</div>"),
            "<div class=\"note\">x</div>"
        );
        assert_eq!(
            normalize_markup("<label htmlFor=\"a\">x</label>"),
            "<label for=\"a\">x</label>"
        );
    }

    #[test]
    fn test_void_elements_self_closed() {
        assert_eq!(normalize_markup("<br>"), "<br/>");
        assert_eq!(normalize_markup("<img src=\"x.png\">"), "<img src=\"x.png\"/>");
        assert_eq!(normalize_markup("<hr/>"), "<hr/>");
    }

    #[test]
    fn test_style_string_structured() {
        assert_eq!(
            normalize_markup("<div style=\"color:red;margin:0;\"></div>"),
            "<div style=\"color: red; margin: 0\"></div>"
        );
    }

    #[test]
    fn test_weft_elements_preserved() {
        let body = "<weft-boundary><weft-cell id=\"cell_3\"></weft-cell></weft-boundary>";
        assert_eq!(normalize_markup(body), body);
    }

    #[test]
    fn test_bare_attribute_preserved() {
        assert_eq!(
            normalize_markup("<input disabled>"),
            "<input disabled/>"
        );
    }

    #[test]
    fn test_angle_bracket_in_text_untouched() {
        assert_eq!(normalize_markup("1 < 2 and 3 > 2"), "1 < 2 and 3 > 2");
    }

    #[test]
    fn test_idempotent() {
        let once = normalize_markup("<div className=\"a\" style=\"x:1;\"><br></div>");
        assert_eq!(normalize_markup(&once), once);
    }
}
