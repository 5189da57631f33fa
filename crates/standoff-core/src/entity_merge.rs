//! Entity-set merge policies
//!
//! Combines two independently produced entity collections (typically two
//! annotators, or gold and predicted) under a per-type policy table.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::annotation::{numeric_suffix, shift_id, Entity};
use crate::document::Document;
use crate::{Result, StandoffError};

/// Wildcard key of a policy table
pub const WILDCARD: &str = "*";

/// How entities of one type are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeMode {
    /// Keep a first-side entity only if the second side has the same type
    /// and the identical span
    Exact,
    /// Keep a first-side entity only if a same-type second-side entity
    /// contains it
    Overlap,
    /// Keep both sides
    All,
    /// Keep the second side only
    LeftOnly,
    /// Keep nothing from either side
    RightOnly,
}

impl MergeMode {
    fn keeps_second(&self) -> bool {
        matches!(self, Self::All | Self::LeftOnly)
    }

    fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "EXACT",
            Self::Overlap => "OVERLAP",
            Self::All => "ALL",
            Self::LeftOnly => "LEFT_ONLY",
            Self::RightOnly => "RIGHT_ONLY",
        }
    }
}

impl fmt::Display for MergeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMode {
    type Err = StandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "EXACT" => Ok(Self::Exact),
            "OVERLAP" => Ok(Self::Overlap),
            "ALL" => Ok(Self::All),
            "LEFT_ONLY" => Ok(Self::LeftOnly),
            "RIGHT_ONLY" => Ok(Self::RightOnly),
            _ => Err(StandoffError::InvalidArgument(format!("unknown merge mode '{s}'"))),
        }
    }
}

/// Per-type merge modes with a wildcard default
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergePolicy {
    default: MergeMode,
    per_type: HashMap<String, MergeMode>,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self::new(MergeMode::All)
    }
}

impl MergePolicy {
    pub fn new(default: MergeMode) -> Self {
        Self {
            default,
            per_type: HashMap::new(),
        }
    }

    /// Build from a table keyed by entity type; `*` sets the default.
    /// A table without `*` defaults to [`MergeMode::All`].
    pub fn from_table(table: HashMap<String, MergeMode>) -> Self {
        let mut per_type = table;
        let default = per_type.remove(WILDCARD).unwrap_or(MergeMode::All);
        Self { default, per_type }
    }

    /// Parse `Type=MODE` pairs, e.g. `*=ALL,Protein=EXACT`
    pub fn parse(policy: &str) -> Result<Self> {
        let mut table = HashMap::new();
        for pair in policy.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (entity_type, mode) = pair.split_once('=').ok_or_else(|| {
                StandoffError::InvalidArgument(format!("expected Type=MODE, got '{pair}'"))
            })?;
            table.insert(entity_type.trim().to_string(), mode.parse()?);
        }
        Ok(Self::from_table(table))
    }

    pub fn with_type(mut self, entity_type: impl Into<String>, mode: MergeMode) -> Self {
        self.per_type.insert(entity_type.into(), mode);
        self
    }

    pub fn mode_for(&self, entity_type: &str) -> MergeMode {
        self.per_type.get(entity_type).copied().unwrap_or(self.default)
    }
}

impl Serialize for MergePolicy {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut table: HashMap<&str, MergeMode> =
            self.per_type.iter().map(|(k, v)| (k.as_str(), *v)).collect();
        table.insert(WILDCARD, self.default);
        table.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for MergePolicy {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        HashMap::<String, MergeMode>::deserialize(deserializer).map(Self::from_table)
    }
}

/// Combine two entity collections under `policy`.
///
/// First-side entities come first in their original order and keep their
/// ids. Second-side entities follow; an id already taken is moved past the
/// highest numeric id of the first side.
pub fn merge_entities<'a, I, J>(first: I, second: J, policy: &MergePolicy) -> Vec<Entity>
where
    I: IntoIterator<Item = &'a Entity>,
    J: IntoIterator<Item = &'a Entity>,
{
    let first: Vec<&Entity> = first.into_iter().collect();
    let second: Vec<&Entity> = second.into_iter().collect();

    let mut merged: Vec<Entity> = first
        .iter()
        .filter(|e1| {
            let same_type = || second.iter().filter(|e2| e2.entity_type == e1.entity_type);
            match policy.mode_for(&e1.entity_type) {
                MergeMode::Exact => same_type().any(|e2| e2.span == e1.span),
                MergeMode::Overlap => same_type().any(|e2| e1.span.within(&e2.span)),
                MergeMode::All => true,
                MergeMode::LeftOnly | MergeMode::RightOnly => false,
            }
        })
        .map(|e1| (*e1).clone())
        .collect();

    let offset = first
        .iter()
        .filter_map(|e| numeric_suffix(&e.id))
        .max()
        .unwrap_or(0)
        .max(1);
    let mut taken: HashSet<String> = merged.iter().map(|e| e.id.clone()).collect();
    let kept_first = merged.len();

    for e2 in second.iter().copied() {
        if !policy.mode_for(&e2.entity_type).keeps_second() {
            continue;
        }
        let mut entity = e2.clone();
        while taken.contains(&entity.id) {
            let shifted = shift_id(&entity.id, offset);
            if shifted == entity.id {
                break;
            }
            entity.id = shifted;
        }
        if !taken.insert(entity.id.clone()) {
            tracing::warn!("Dropping entity {} with an id that cannot be renumbered", entity.id);
            continue;
        }
        merged.push(entity);
    }

    tracing::debug!(
        "Entity merge kept {} of {} first-side and {} of {} second-side entities",
        kept_first,
        first.len(),
        merged.len() - kept_first,
        second.len()
    );

    merged
}

impl Document {
    /// Document over the shared text holding only the policy-merged
    /// entities of `first` and `second`
    pub fn merge_entity_layers(
        first: &Document,
        second: &Document,
        policy: &MergePolicy,
    ) -> Result<Document> {
        if first.text != second.text {
            return Err(StandoffError::TextMismatch {
                left: first.uid.clone(),
                right: second.uid.clone(),
            });
        }

        let mut merged = Document::new(first.uid.clone(), first.text.clone());
        for entity in merge_entities(first.entities(), second.entities(), policy) {
            merged.add(entity)?;
        }
        Ok(merged)
    }
}
