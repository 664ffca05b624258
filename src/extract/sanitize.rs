//! Body sanitizing
//!
//! The chosen fragment is copied out of the page tree, script/style subtrees and
//! comments are detached from the copy, and html5ever serializes what is left.

use scraper::{ElementRef, Node};

/// Elements whose whole subtree is dropped
const STRIPPED_ELEMENTS: &[&str] = &["script", "style"];

/// A serialized fragment with scripts, styles and comments removed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SanitizedFragment {
    /// Inner HTML with whitespace runs collapsed
    pub html: String,
    /// True if any non-whitespace text survived
    pub has_text: bool,
}

/// Serializes the children of `root`, dropping script/style subtrees and comments
///
/// The page tree itself is left untouched; stripping happens on a clone.
pub fn sanitize_fragment(root: ElementRef<'_>) -> SanitizedFragment {
    let stripped: Vec<_> = root
        .descendants()
        .filter(|node| is_stripped(node.value()))
        .map(|node| node.id())
        .collect();

    let mut tree = root.tree().clone();
    for id in stripped {
        if let Some(mut node) = tree.get_mut(id) {
            node.detach();
        }
    }

    match tree.get(root.id()).and_then(ElementRef::wrap) {
        Some(cleaned) => SanitizedFragment {
            html: collapse_whitespace(&cleaned.inner_html()),
            has_text: cleaned.text().any(|text| !text.trim().is_empty()),
        },
        None => SanitizedFragment::default(),
    }
}

/// Collapses every whitespace run to a single space and trims both ends
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_stripped(node: &Node) -> bool {
    match node {
        Node::Comment(_) => true,
        Node::Element(el) => STRIPPED_ELEMENTS.contains(&el.name()),
        _ => false,
    }
}
