//! Tag table: integer tag to symbolic name and description.
//!
//! The table never influences the binary layout; it only resolves the names
//! callers use when building fields and labels fields for display.
//!
//! Text format, one definition per line:
//!
//! ```text
//! # comment
//! 10 author Personal author
//! 24 title  Title proper
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use crate::errors::{MstError, MstResult};

/// A tag definition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagDefinition {
    pub tag: u32,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default)]
pub struct TagTable {
    by_tag: BTreeMap<u32, TagDefinition>,
    by_name: HashMap<String, u32>,
}

impl TagTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a tag table file.
    pub fn load(path: &Path) -> MstResult<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            MstError::io(format!("Failed to read tag table: {}", path.display()), e)
        })?;
        Self::parse(&text)
    }

    /// Parses the line format described in the module docs.
    pub fn parse(text: &str) -> MstResult<Self> {
        let mut table = Self::new();
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut parts = line.splitn(3, char::is_whitespace);
            let tag = parts
                .next()
                .and_then(|t| t.parse::<u32>().ok())
                .ok_or_else(|| {
                    MstError::format(format!("tag table line {}: invalid tag", lineno + 1))
                })?;
            let name = parts.next().unwrap_or("").trim();
            if name.is_empty() {
                return Err(MstError::format(format!(
                    "tag table line {}: missing name",
                    lineno + 1
                )));
            }
            let description = parts.next().unwrap_or("").trim();
            table.insert(tag, name, description)?;
        }
        Ok(table)
    }

    /// Adds a definition. Tags are 1..=99999.
    pub fn insert(&mut self, tag: u32, name: &str, description: &str) -> MstResult<()> {
        if tag == 0 || tag > 99_999 {
            return Err(MstError::range(format!("tag {} outside 1..=99999", tag)));
        }
        if let Some(old) = self.by_tag.get(&tag) {
            self.by_name.remove(&old.name.to_lowercase());
        }
        self.by_name.insert(name.to_lowercase(), tag);
        self.by_tag.insert(
            tag,
            TagDefinition {
                tag,
                name: name.to_string(),
                description: description.to_string(),
            },
        );
        Ok(())
    }

    /// Resolves a symbolic name (case-insensitive) or a numeric string.
    pub fn resolve(&self, name: &str) -> Option<u32> {
        if let Ok(tag) = name.parse::<u32>() {
            return Some(tag);
        }
        self.by_name.get(&name.to_lowercase()).copied()
    }

    pub fn get(&self, tag: u32) -> Option<&TagDefinition> {
        self.by_tag.get(&tag)
    }

    pub fn name_of(&self, tag: u32) -> Option<&str> {
        self.by_tag.get(&tag).map(|d| d.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_tag.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_tag.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TagDefinition> {
        self.by_tag.values()
    }
}
