//! Per-page category paths from breadcrumb markup

use crate::category::CategoryPath;
use crate::extract::collapse_whitespace;
use scraper::{Html, Selector};

/// Derives a page's category path from its own breadcrumb markup
///
/// Each selector is applied in order and the text of every non-empty match is
/// appended below `default_category`. Pages without breadcrumbs get the root
/// path.
pub fn page_category_path(
    document: &Html,
    default_category: &str,
    selectors: &[Selector],
) -> CategoryPath {
    let names = selectors.iter().flat_map(|selector| {
        document
            .select(selector)
            .map(|element| collapse_whitespace(&element.text().collect::<String>()))
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
    });

    CategoryPath::under(default_category, names)
}
