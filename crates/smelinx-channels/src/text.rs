use std::sync::LazyLock;

use regex::Regex;

static TAG: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"(?s)<[^>]+>").ok());

/// Plain-text rendition of a notice body for the `text/plain` part.
pub fn html_to_text(html: &str) -> String {
    let mut s = html
        .replace("<br>", "\n")
        .replace("<br/>", "\n")
        .replace("<br />", "\n")
        .replace("</p>", "\n\n")
        .replace("</li>", "\n");
    if let Some(tag) = TAG.as_ref() {
        s = tag.replace_all(&s, "").into_owned();
    }
    while s.contains("  ") {
        s = s.replace("  ", " ");
    }
    s.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_breaks_and_paragraphs() {
        let html = "<p><b>API:</b> Payments<br/><b>Version:</b> v1</p><p>Bye</p>";
        assert_eq!(html_to_text(html), "API: Payments\nVersion: v1\n\nBye");
    }

    #[test]
    fn test_strips_multiline_tags_and_spaces() {
        let html = "<div\n style=\"x\">Hello   <a href=\"u\">link</a></div>";
        assert_eq!(html_to_text(html), "Hello link");
    }

    #[test]
    fn test_list_items() {
        assert_eq!(html_to_text("<ul><li>a</li><li>b</li></ul>"), "a\nb");
    }
}
