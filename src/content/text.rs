//! Cleanup for the HTML fragments embedded in exam content

/// Remove paragraph markup the way the content bundle's display text expects:
/// `<p>`, `</p>` and `<br/>` are dropped without replacement.
pub fn strip_paragraph_tags(text: &str) -> String {
    text.replace("<p>", "").replace("</p>", "").replace("<br/>", "")
}

/// Normalize prompt/reference text before it is quoted to the grader.
///
/// Any `<br>`, `<br/>` or `<br />` (any case) becomes a newline, `<p>` and
/// `</p>` are removed, and the result is trimmed.
pub fn clean_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find('<') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];

        match match_tag(tail) {
            Some((Tag::LineBreak, len)) => {
                out.push('\n');
                rest = &tail[len..];
            }
            Some((Tag::Paragraph, len)) => {
                rest = &tail[len..];
            }
            None => {
                out.push('<');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);

    out.trim().to_string()
}

enum Tag {
    LineBreak,
    Paragraph,
}

/// Match a `<br ... >` or `<p>` / `</p>` tag at the start of `s`
fn match_tag(s: &str) -> Option<(Tag, usize)> {
    let bytes = s.as_bytes();
    let lower = |i: usize| bytes.get(i).map(|b| b.to_ascii_lowercase());

    // <p> and </p>
    let mut i = 1;
    if lower(i) == Some(b'/') {
        i += 1;
    }
    if lower(i) == Some(b'p') && lower(i + 1) == Some(b'>') {
        return Some((Tag::Paragraph, i + 2));
    }

    // <br>, <br/>, <br />
    if lower(1) == Some(b'b') && lower(2) == Some(b'r') {
        let mut j = 3;
        while lower(j).is_some_and(|b| b.is_ascii_whitespace()) {
            j += 1;
        }
        if lower(j) == Some(b'/') {
            j += 1;
        }
        if lower(j) == Some(b'>') {
            return Some((Tag::LineBreak, j + 1));
        }
    }

    None
}
