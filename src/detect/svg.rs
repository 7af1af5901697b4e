//! SVG heuristic
//!
//! Binary signatures cannot identify SVG, which is plain XML text. The text
//! prefix is cleaned of DTD entity declarations, DTD markup declarations and
//! comments, then must open with an optional XML declaration, an optional
//! `<!doctype svg>` and an `<svg>` tag. Only the opening tag is required
//! since the prefix is usually not the whole document.

use lazy_static::lazy_static;
use regex_lite::Regex;

lazy_static! {
    static ref ENTITY_DECLARATION: Regex =
        Regex::new(r#"(?im)\s*<!Entity\s+\S*\s*(?:"|')[^"]+(?:"|')\s*>"#).unwrap();

    // Case-sensitive: strips `<!DOCTYPE ...>` but keeps `<!doctype svg>`.
    static ref MARKUP_DECLARATION: Regex =
        Regex::new(r"\[?(?:\s*<![A-Z]+[^>]*>\s*)*\]?").unwrap();

    static ref COMMENT: Regex = Regex::new(r"(?s)<!--.*?-->").unwrap();

    static ref SVG_OPENING: Regex =
        Regex::new(r"(?i)^\s*(?:<\?xml[^>]*>\s*)?(?:<!doctype svg[^>]*>\s*)?<svg[^>]*>").unwrap();
}

/// Whether a text prefix looks like the start of an SVG document.
pub fn is_svg(text: &str) -> bool {
    let text = ENTITY_DECLARATION.replace_all(text, "");
    let text = MARKUP_DECLARATION.replace_all(&text, "");
    let text = COMMENT.replace_all(&text, "");
    SVG_OPENING.is_match(&text)
}
