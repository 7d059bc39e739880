//! Source descriptors for the meta source

use serde::{Deserialize, Serialize};

use crate::generic::Attrs;
use crate::source::DataSource;

/// Format and attribute information about one data source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Supported format names, sorted
    pub formats: Vec<String>,
    /// Arbitrary descriptive attributes
    pub attrs: Attrs,
}

impl SourceInfo {
    /// Describe a data source.
    pub fn of(source: &dyn DataSource) -> Self {
        Self {
            formats: source.formats(),
            attrs: source.attrs(),
        }
    }
}
