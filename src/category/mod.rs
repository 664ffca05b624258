//! Category tree discovery and lookup
//!
//! This module contains:
//! - `CategoryPath`, the colon-joined lookup key
//! - `CategoryIndex`, the per-run path → category map
//! - `CategoryMapper`, which builds the index from a site's navigation
//! - Per-page breadcrumb path derivation

mod breadcrumb;
mod index;
mod mapper;

pub use breadcrumb::page_category_path;
pub use index::{CategoryIndex, ResolvedCategory};
pub use mapper::{discover_nav_paths, CategoryMapper};

use std::fmt;

/// Separator between names in a joined category path
pub const PATH_SEPARATOR: &str = ":";

/// Ordered names from the default root category down to one node
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CategoryPath {
    segments: Vec<String>,
}

impl CategoryPath {
    /// The single-element path of a job's root category
    pub fn root(default_category: &str) -> Self {
        Self {
            segments: vec![default_category.to_string()],
        }
    }

    /// Builds a path under `default_category`
    pub fn under<I, T>(default_category: &str, names: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut path = Self::root(default_category);
        path.segments.extend(names.into_iter().map(Into::into));
        path
    }

    /// Splits a joined key back into its names
    pub fn parse(key: &str) -> Self {
        Self {
            segments: key.split(PATH_SEPARATOR).map(str::to_string).collect(),
        }
    }

    /// The joined lookup key, e.g. `Docs:Setup:Install`
    pub fn key(&self) -> String {
        self.segments.join(PATH_SEPARATOR)
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Name of the node the path points at
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// The path one level up, or `None` for a root path
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }
}

impl fmt::Display for CategoryPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}
