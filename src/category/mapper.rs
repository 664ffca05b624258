//! Navigation-driven category tree construction

use crate::category::{CategoryIndex, CategoryPath};
use crate::config::CategoryHierarchy;
use crate::extract::collapse_whitespace;
use crate::state::CrawlJob;
use crate::storage::{lock, CategoryRecord, SharedStorage, Storage};
use crate::{ConfigError, HarvestError};
use reqwest::Client;
use scraper::{ElementRef, Html, Node, Selector};
use tracing::{debug, info, warn};

/// Builds a run's category index from the job's navigation page
///
/// Uses its own HTTP client, separate from the content fetcher, so mapping
/// shares no politeness state with dispatch and follows no links.
pub struct CategoryMapper {
    client: Client,
    hierarchy: CategoryHierarchy,
}

impl CategoryMapper {
    pub fn new(client: Client, hierarchy: CategoryHierarchy) -> Self {
        Self { client, hierarchy }
    }

    /// Maps the navigation of `job` into a sealed index
    ///
    /// Fails if the root category cannot be persisted or the navigation page
    /// cannot be fetched. A discovered category that fails to persist is
    /// skipped.
    pub async fn map<S>(
        &self,
        job: &CrawlJob,
        storage: &SharedStorage<S>,
    ) -> Result<CategoryIndex, HarvestError>
    where
        S: Storage,
    {
        let index = CategoryIndex::new();
        let root_path = CategoryPath::root(&job.default_category);

        let root = CategoryRecord::new_root(&job.default_category);
        lock(storage)
            .upsert_category(&root)
            .map_err(|source| HarvestError::RootCategory {
                name: job.default_category.clone(),
                source,
            })?;
        index.insert(&root_path, root.clone())?;

        let map_url = job.resolved_map_url();
        info!("Mapping categories from {}", map_url);
        let html = self.fetch_navigation(&map_url).await?;

        let nav_selector = Selector::parse(&job.nav_selector).map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid selector '{}': {:?}",
                job.nav_selector, e
            ))
        })?;

        let discovered = discover_nav_paths(&html, &nav_selector);
        if discovered.is_empty() {
            warn!(
                "No navigation items matched '{}' on {}",
                job.nav_selector, map_url
            );
        }

        for names in discovered {
            let path = CategoryPath::under(&job.default_category, names);
            let parent_id = match self.hierarchy {
                CategoryHierarchy::Flat => root.id,
                CategoryHierarchy::Nested => path
                    .parent()
                    .and_then(|parent| index.get(&parent))
                    .map_or(root.id, |parent| parent.id),
            };

            let category =
                CategoryRecord::new_child(path.leaf(), parent_id, format!("Category: {}", path));

            if let Err(e) = lock(storage).upsert_category(&category) {
                warn!("Failed to persist category {}: {}", path, e);
                continue;
            }

            debug!("Found category: {}", path);
            index.insert(&path, category)?;
        }

        index.seal();
        info!("Category mapping completed: {} categories", index.len());
        Ok(index)
    }

    async fn fetch_navigation(&self, url: &str) -> Result<String, HarvestError> {
        let fetch_error = |message: String| HarvestError::NavigationFetch {
            url: url.to_string(),
            message,
        };

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_error(format!("HTTP {}", response.status().as_u16())));
        }

        response.text().await.map_err(|e| fetch_error(e.to_string()))
    }
}

/// Walks every navigation container in `html` and returns the label chain of
/// each labelled list item, in document order
///
/// A chain holds the labels of the enclosing list items, outermost first,
/// followed by the item's own label. Items without a label contribute no
/// segment but their nested items are still visited.
pub fn discover_nav_paths(html: &str, nav_selector: &Selector) -> Vec<Vec<String>> {
    let document = Html::parse_document(html);
    let mut paths = Vec::new();
    let mut ancestors = Vec::new();

    for nav in document.select(nav_selector) {
        walk_items(nav, &mut ancestors, &mut paths);
    }

    paths
}

fn walk_items(element: ElementRef<'_>, ancestors: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
    for child in element.children().filter_map(ElementRef::wrap) {
        if child.value().name() != "li" {
            walk_items(child, ancestors, paths);
            continue;
        }

        let label = item_label(child);
        if label.is_empty() {
            walk_items(child, ancestors, paths);
            continue;
        }

        ancestors.push(label);
        paths.push(ancestors.clone());
        walk_items(child, ancestors, paths);
        ancestors.pop();
    }
}

/// Visible text of a list item, excluding its nested lists
fn item_label(item: ElementRef<'_>) -> String {
    let mut text = String::new();
    collect_label_text(item, &mut text);
    collapse_whitespace(&text)
}

fn collect_label_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => {
                out.push_str(text);
                out.push(' ');
            }
            Node::Element(el) => {
                if matches!(el.name(), "ul" | "ol" | "li" | "script" | "style") {
                    continue;
                }
                if let Some(child) = ElementRef::wrap(child) {
                    collect_label_text(child, out);
                }
            }
            _ => {}
        }
    }
}
