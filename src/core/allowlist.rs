//! Tool allow-list loaded from an external file

use std::collections::HashSet;
use std::path::Path;

use crate::core::error::{ServerError, ServerResult};

/// Names of the tools the server may expose.
///
/// The file holds one tool name per line; blank lines and `#` comments are
/// ignored. A file containing a JSON array of strings is accepted too.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn from_file(path: &Path) -> ServerResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ServerError::AllowList {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&contents))
    }

    pub fn parse(contents: &str) -> Self {
        if let Ok(names) = serde_json::from_str::<Vec<String>>(contents) {
            return names.into_iter().collect();
        }

        contents
            .lines()
            .map(|line| line.split('#').next().unwrap_or_default().trim())
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn permits(&self, tool_name: &str) -> bool {
        self.names.contains(tool_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}

impl FromIterator<String> for AllowList {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            names: iter.into_iter().collect(),
        }
    }
}
