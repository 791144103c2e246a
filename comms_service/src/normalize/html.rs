use scraper::Html;

/// Strips an HTML body down to readable plain text. Used as the content
/// fallback when a payload carries only HTML; the original markup is kept
/// in `metadata.original_html`.
pub fn html_to_text(html: &str) -> String {
    let fragment = Html::parse_fragment(html);

    let mut text = String::new();
    for piece in fragment.root_element().text() {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(piece);
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_html_to_text_strips_tags() {
        assert_eq!(
            html_to_text("<div><p>Hello <b>world</b></p></div>"),
            "Hello world"
        );
    }

    #[test]
    fn test_html_to_text_plain_passthrough() {
        assert_eq!(html_to_text("just text"), "just text");
    }

    #[test]
    fn test_html_to_text_empty() {
        assert_eq!(html_to_text(""), "");
    }
}
