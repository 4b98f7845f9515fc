use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use url::Url;

/// One account's login pair, read once per batch and never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub identity: String,
    pub secret: String,
}

impl Credential {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("identity", &self.identity)
            .field("secret", &"***")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Ebooks,
    Audiobooks,
    Courses,
}

impl Section {
    pub const ALL: [Section; 3] = [Section::Ebooks, Section::Audiobooks, Section::Courses];

    pub fn as_str(&self) -> &'static str {
        match self {
            Section::Ebooks => "ebooks",
            Section::Audiobooks => "audiobooks",
            Section::Courses => "courses",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A purchased title as it appeared on the shelf page. Identity is positional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub title: String,
    #[serde(
        rename = "cover",
        default,
        serialize_with = "empty_if_none",
        deserialize_with = "none_if_empty"
    )]
    pub resource_ref: Option<String>,
}

impl Item {
    pub fn new(author: impl Into<String>, title: impl Into<String>, cover: Option<&str>) -> Self {
        Self {
            author: author.into(),
            title: title.into(),
            resource_ref: cover.map(str::to_owned),
        }
    }

    /// A cover that is present but cannot be fetched without guessing a base URL.
    pub fn has_integrity_violation(&self) -> bool {
        match self.resource_ref.as_deref().map(str::trim) {
            Some(cover) if !cover.is_empty() => !is_absolute_url(cover),
            _ => false,
        }
    }
}

fn empty_if_none<S: Serializer>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

fn none_if_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|v| !v.is_empty()))
}

/// Scheme plus host; `data:` and other host-less URLs do not count.
pub fn is_absolute_url(value: &str) -> bool {
    Url::parse(value)
        .map(|url| url.has_host() && !url.cannot_be_a_base())
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionResult {
    pub section: Section,
    pub items: Vec<Item>,
}

impl SectionResult {
    pub fn new(section: Section, items: Vec<Item>) -> Self {
        Self { section, items }
    }

    pub fn empty(section: Section) -> Self {
        Self::new(section, Vec::new())
    }
}

/// The unit of checkpointing: one record per credential identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountRecord {
    pub credential: Credential,
    pub sections: BTreeMap<Section, SectionResult>,
}

impl AccountRecord {
    pub fn new(credential: Credential) -> Self {
        Self {
            credential,
            sections: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, result: SectionResult) {
        self.sections.insert(result.section, result);
    }

    pub fn items(&self, section: Section) -> &[Item] {
        self.sections
            .get(&section)
            .map(|result| result.items.as_slice())
            .unwrap_or(&[])
    }

    pub fn total_items(&self) -> usize {
        self.sections.values().map(|result| result.items.len()).sum()
    }

    pub fn integrity_violations(&self) -> usize {
        self.sections
            .values()
            .flat_map(|result| result.items.iter())
            .filter(|item| item.has_integrity_violation())
            .count()
    }

    pub fn is_complete(&self) -> bool {
        self.integrity_violations() == 0
    }
}
