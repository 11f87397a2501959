use std::collections::BTreeSet;

use crate::tags::TagSet;
use crate::timestamp::Timestamp;

/// Optional overrides applied to a reported metric.
///
/// `None` always means "inherit", never "clear".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Modifiers {
    pub tags_to_add: Option<TagSet>,
    pub tags_to_remove: Option<BTreeSet<String>>,
    pub timestamp: Option<Timestamp>,
    pub description: Option<String>,
    pub unit: Option<String>,
}

/// Metadata of a sample once every modifier layer has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedMetadata {
    pub tags: TagSet,
    pub timestamp: Timestamp,
    pub description: String,
    pub unit: String,
}

impl Modifiers {
    pub fn is_empty(&self) -> bool {
        self.tags_to_add.is_none()
            && self.tags_to_remove.is_none()
            && self.timestamp.is_none()
            && self.description.is_none()
            && self.unit.is_none()
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags_to_add.get_or_insert_with(TagSet::new).insert(key, value);
        self
    }

    pub fn without_tag(mut self, key: impl Into<String>) -> Self {
        self.tags_to_remove.get_or_insert_with(BTreeSet::new).insert(key.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: Timestamp) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Layers `self` on top of `base`; fields set in `self` take precedence.
    ///
    /// Tag additions are unioned with `self` winning per key. Removals from every
    /// layer are unioned and applied after all additions, so a removed key stays
    /// removed whichever layer adds it.
    pub fn merged_over(&self, base: &Modifiers) -> Modifiers {
        let mut adds = base.tags_to_add.clone();
        if let Some(upper) = &self.tags_to_add {
            adds.get_or_insert_with(TagSet::new).extend_from(upper);
        }

        let mut removes = base.tags_to_remove.clone();
        if let Some(upper) = &self.tags_to_remove {
            removes.get_or_insert_with(BTreeSet::new).extend(upper.iter().cloned());
        }

        Modifiers {
            tags_to_add: adds,
            tags_to_remove: removes,
            timestamp: self.timestamp.or(base.timestamp),
            description: self.description.clone().or_else(|| base.description.clone()),
            unit: self.unit.clone().or_else(|| base.unit.clone()),
        }
    }

    /// Produces the final metadata, falling back to the given defaults for
    /// anything no layer set. Removals are applied after additions.
    pub fn resolve(&self, timestamp: Timestamp, description: &str, unit: &str) -> ResolvedMetadata {
        let mut tags = self.tags_to_add.clone().unwrap_or_default();
        if let Some(removes) = &self.tags_to_remove {
            tags.retain(|k| !removes.contains(k));
        }

        ResolvedMetadata {
            tags,
            timestamp: self.timestamp.unwrap_or(timestamp),
            description: self.description.clone().unwrap_or_else(|| description.to_string()),
            unit: self.unit.clone().unwrap_or_else(|| unit.to_string()),
        }
    }
}
