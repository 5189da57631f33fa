//! Relation-pair rows
//!
//! Turns a document into a relation-classification table: every pair of
//! entities whose types match a requested type pair becomes a row, labeled
//! with the relation types that directly link them or with a "no relation"
//! label. Negative rows can be filtered by distance and sampled down with a
//! caller-supplied random generator.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::annotation::Entity;
use crate::config::RelationConfig;
use crate::document::Document;
use crate::{Result, StandoffError};

pub const DEFAULT_NO_RELATION_LABEL: &str = "NO_RELATION";

// ============================================================================
// Options
// ============================================================================

/// How many negative rows to keep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NegativeSampling {
    /// Keep every negative row
    #[default]
    All,
    /// Keep as many negatives as there are positives
    Auto,
    /// Keep at most this many; zero drops negatives entirely
    Limit(usize),
}

impl NegativeSampling {
    fn limit(&self, positives: usize) -> Option<usize> {
        match self {
            Self::All => None,
            Self::Auto => Some(positives),
            Self::Limit(n) => Some(*n),
        }
    }
}

impl FromStr for NegativeSampling {
    type Err = StandoffError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "all" => Ok(Self::All),
            "auto" => Ok(Self::Auto),
            other => other.parse().map(Self::Limit).map_err(|_| {
                StandoffError::InvalidArgument(format!(
                    "negative sampling must be 'all', 'auto' or a count, got '{s}'"
                ))
            }),
        }
    }
}

impl fmt::Display for NegativeSampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Auto => write!(f, "auto"),
            Self::Limit(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for NegativeSampling {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Limit(n) => serializer.serialize_u64(*n as u64),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for NegativeSampling {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(usize),
            Keyword(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Ok(Self::Limit(n)),
            Raw::Keyword(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

/// Maximum span (in chars) a negative pair may cover. Zero disables the
/// filter. Per-pair tables are looked up as `[t1][t2]`, then `[t2][t1]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DistanceThreshold {
    Uniform(usize),
    PerPair(HashMap<String, HashMap<String, usize>>),
}

impl Default for DistanceThreshold {
    fn default() -> Self {
        Self::Uniform(0)
    }
}

impl DistanceThreshold {
    pub fn for_pair(&self, first: &str, second: &str) -> usize {
        match self {
            Self::Uniform(threshold) => *threshold,
            Self::PerPair(table) => {
                let lookup = |a: &str, b: &str| table.get(a).and_then(|inner| inner.get(b)).copied();
                lookup(first, second)
                    .or_else(|| lookup(second, first))
                    .unwrap_or_else(|| {
                        tracing::debug!("No distance threshold for ({first}, {second}), not filtering");
                        0
                    })
            }
        }
    }
}

/// Parameters for [`Document::relation_rows`]
#[derive(Debug, Clone)]
pub struct RelationOptions {
    /// Entity type pairs to enumerate, first type first
    pub type_pairs: Vec<(String, String)>,
    pub negatives: NegativeSampling,
    pub distance_threshold: DistanceThreshold,
    /// Seed for negative sampling; `None` draws from entropy
    pub seed: Option<u64>,
    pub no_relation_label: String,
}

impl Default for RelationOptions {
    fn default() -> Self {
        Self {
            type_pairs: Vec::new(),
            negatives: NegativeSampling::All,
            distance_threshold: DistanceThreshold::default(),
            seed: None,
            no_relation_label: DEFAULT_NO_RELATION_LABEL.to_string(),
        }
    }
}

impl RelationOptions {
    pub fn new<A: Into<String>, B: Into<String>>(pairs: impl IntoIterator<Item = (A, B)>) -> Self {
        Self {
            type_pairs: pairs.into_iter().map(|(a, b)| (a.into(), b.into())).collect(),
            ..Self::default()
        }
    }

    /// Options for `pairs` with the sampling settings of `config`
    pub fn from_config<A: Into<String>, B: Into<String>>(
        pairs: impl IntoIterator<Item = (A, B)>,
        config: &RelationConfig,
    ) -> Self {
        Self {
            negatives: config.negatives,
            distance_threshold: config.distance_threshold.clone(),
            seed: config.seed,
            no_relation_label: config.no_relation_label.clone(),
            ..Self::new(pairs)
        }
    }

    pub fn with_negatives(mut self, negatives: NegativeSampling) -> Self {
        self.negatives = negatives;
        self
    }

    pub fn with_distance_threshold(mut self, threshold: DistanceThreshold) -> Self {
        self.distance_threshold = threshold;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_no_relation_label(mut self, label: impl Into<String>) -> Self {
        self.no_relation_label = label.into();
        self
    }
}

// ============================================================================
// Rows
// ============================================================================

/// One entity pair with its label(s)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationRow<K = String, L = Vec<String>> {
    pub first: K,
    pub second: K,
    pub labels: L,
}

/// Arguments of one relation, by role
#[derive(Debug, Clone)]
pub struct RelationArguments<'a> {
    pub relation_type: &'a str,
    pub roles: Vec<(&'a str, &'a Entity)>,
}

/// first entity id -> second entity id -> relations linking them
pub type EntityRelations<'a> = HashMap<&'a str, HashMap<&'a str, Vec<RelationArguments<'a>>>>;

/// Default row key: `{doc uid}-{entity span}`
pub fn span_key(doc: &Document, entity: &Entity) -> String {
    format!("{}-{}", doc.uid, entity.span)
}

impl Document {
    /// Index binary relations by their (first, second) entity arguments.
    ///
    /// Only relations with exactly two arguments are indexed; a later
    /// relation of the same type between the same pair replaces the earlier.
    pub fn entity_relations(&self) -> EntityRelations<'_> {
        let mut index: EntityRelations<'_> = HashMap::new();

        for relation in self.relations() {
            let [(_, first), (_, second)] = relation.arguments.as_slice() else {
                tracing::debug!(
                    "Skipping relation {} with {} arguments",
                    relation.id,
                    relation.arguments.len()
                );
                continue;
            };

            let roles: Option<Vec<(&str, &Entity)>> = relation
                .arguments
                .iter()
                .map(|(role, target)| self.entity(target).map(|e| (role.as_str(), e)))
                .collect();
            let Some(roles) = roles else {
                tracing::debug!("Skipping relation {} with a non-entity argument", relation.id);
                continue;
            };

            let linked = index
                .entry(first.as_str())
                .or_default()
                .entry(second.as_str())
                .or_default();
            linked.retain(|r| r.relation_type != relation.relation_type);
            linked.push(RelationArguments {
                relation_type: &relation.relation_type,
                roles,
            });
        }

        index
    }

    /// Relation rows with default keys and labels.
    ///
    /// Sampling draws from a generator seeded with `options.seed`.
    pub fn relation_rows(&self, options: &RelationOptions) -> Result<Vec<RelationRow>> {
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        self.relation_rows_with(options, &mut rng, span_key, |labels| labels)
    }

    /// Relation rows with caller-chosen random generator and row shaping.
    ///
    /// Positive rows come first in pair order, followed by the sampled
    /// negatives. The distance filter only ever drops negatives.
    pub fn relation_rows_with<R, K, L, FK, FL>(
        &self,
        options: &RelationOptions,
        rng: &mut R,
        entity_key: FK,
        label: FL,
    ) -> Result<Vec<RelationRow<K, L>>>
    where
        R: Rng + ?Sized,
        FK: Fn(&Document, &Entity) -> K,
        FL: Fn(Vec<String>) -> L,
    {
        if options.type_pairs.is_empty() {
            return Err(StandoffError::InvalidArgument(
                "relation rows need at least one entity type pair".to_string(),
            ));
        }

        let linked = self.entity_relations();
        let mut by_type: HashMap<&str, Vec<&Entity>> = HashMap::new();
        for entity in self.entities() {
            by_type.entry(&entity.entity_type).or_default().push(entity);
        }

        let mut positives = Vec::new();
        let mut negatives = Vec::new();

        for (first_type, second_type) in &options.type_pairs {
            let firsts = by_type.get(first_type.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let seconds = by_type.get(second_type.as_str()).map(Vec::as_slice).unwrap_or(&[]);
            let threshold = options.distance_threshold.for_pair(first_type, second_type);

            for e1 in firsts {
                for e2 in seconds {
                    let relation_types: Vec<String> = linked
                        .get(e1.id.as_str())
                        .and_then(|inner| inner.get(e2.id.as_str()))
                        .map(|found| found.iter().map(|r| r.relation_type.to_string()).collect())
                        .unwrap_or_default();

                    if relation_types.is_empty() {
                        let distance = e1.span.end().max(e2.span.end())
                            - e1.span.start().min(e2.span.start())
                            + 1;
                        if 0 < threshold && threshold < distance {
                            continue;
                        }
                        negatives.push(RelationRow {
                            first: entity_key(self, e1),
                            second: entity_key(self, e2),
                            labels: label(vec![options.no_relation_label.clone()]),
                        });
                    } else {
                        positives.push(RelationRow {
                            first: entity_key(self, e1),
                            second: entity_key(self, e2),
                            labels: label(relation_types),
                        });
                    }
                }
            }
        }

        let candidates = negatives.len();
        if let Some(limit) = options.negatives.limit(positives.len()) {
            if limit > 0 {
                negatives.shuffle(rng);
            }
            negatives.truncate(limit);
        }

        tracing::debug!(
            "Relation rows for {}: {} positive, {} of {} negative kept ({})",
            self.uid,
            positives.len(),
            negatives.len(),
            candidates,
            options.negatives
        );

        positives.extend(negatives);
        Ok(positives)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::Relation;

    fn doc() -> Document {
        let text = "Alice met Bob in Paris and later Carol in Rome.";
        let lines = [
            "T1\tPerson 0 5\tAlice",
            "T2\tPerson 10 13\tBob",
            "T3\tCity 17 22\tParis",
            "T4\tPerson 33 38\tCarol",
            "T5\tCity 42 46\tRome",
            "R1\tLivesIn Arg1:T2 Arg2:T3",
            "R2\tVisits Arg1:T2 Arg2:T3",
            "R3\tLivesIn Arg1:T4 Arg2:T5",
            "R4\tMeets Arg1:T1 Arg2:T2 Arg3:T4",
        ];
        Document::parse("d1", text, lines).unwrap()
    }

    fn count_label(rows: &[RelationRow], label: &str) -> usize {
        rows.iter()
            .filter(|row| row.labels.iter().any(|l| l == label))
            .count()
    }

    #[test]
    fn test_negative_sampling_parse() {
        assert_eq!("all".parse::<NegativeSampling>().unwrap(), NegativeSampling::All);
        assert_eq!("AUTO".parse::<NegativeSampling>().unwrap(), NegativeSampling::Auto);
        assert_eq!("5".parse::<NegativeSampling>().unwrap(), NegativeSampling::Limit(5));
        let err = "some".parse::<NegativeSampling>().unwrap_err();
        assert!(matches!(err, StandoffError::InvalidArgument(_)));
        assert!("-1".parse::<NegativeSampling>().is_err());
    }

    #[test]
    fn test_entity_relations_binary_only() {
        let doc = doc();
        let linked = doc.entity_relations();
        let types: Vec<&str> = linked["T2"]["T3"].iter().map(|r| r.relation_type).collect();
        assert_eq!(types, vec!["LivesIn", "Visits"]);
        assert_eq!(linked["T2"]["T3"][0].roles[1].0, "Arg2");
        assert_eq!(linked["T2"]["T3"][0].roles[1].1.content, "Paris");
        assert!(!linked.contains_key("T1"));
    }

    #[test]
    fn test_empty_type_pairs() {
        let err = doc().relation_rows(&RelationOptions::default()).unwrap_err();
        assert!(matches!(err, StandoffError::InvalidArgument(_)));
    }

    #[test]
    fn test_relation_rows_all() {
        let rows = doc()
            .relation_rows(&RelationOptions::new([("Person", "City")]))
            .unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].first, "d1-10-13");
        assert_eq!(rows[0].second, "d1-17-22");
        assert_eq!(rows[0].labels, vec!["LivesIn", "Visits"]);
        assert_eq!(rows[1].labels, vec!["LivesIn"]);
        assert_eq!(count_label(&rows, DEFAULT_NO_RELATION_LABEL), 4);
    }

    #[test]
    fn test_relation_rows_direction_matters() {
        let rows = doc()
            .relation_rows(&RelationOptions::new([("City", "Person")]))
            .unwrap();
        assert_eq!(count_label(&rows, DEFAULT_NO_RELATION_LABEL), 6);
    }

    #[test]
    fn test_distance_filter_keeps_positives() {
        let options = RelationOptions::new([("Person", "City")])
            .with_distance_threshold(DistanceThreshold::Uniform(15));
        let rows = doc().relation_rows(&options).unwrap();
        // every negative pair covers 22 chars or more
        assert_eq!(rows.len(), 2);
        assert_eq!(count_label(&rows, DEFAULT_NO_RELATION_LABEL), 0);

        let wide = RelationOptions::new([("Person", "City")])
            .with_distance_threshold(DistanceThreshold::Uniform(40));
        let rows = doc().relation_rows(&wide).unwrap();
        assert_eq!(count_label(&rows, DEFAULT_NO_RELATION_LABEL), 3);
    }

    #[test]
    fn test_distance_per_pair_table() {
        let table: DistanceThreshold =
            serde_json::from_str(r#"{"City": {"Person": 25}}"#).unwrap();
        assert_eq!(table.for_pair("Person", "City"), 25);
        assert_eq!(table.for_pair("City", "Person"), 25);
        assert_eq!(table.for_pair("Person", "Person"), 0);

        let options = RelationOptions::new([("Person", "City")]).with_distance_threshold(table);
        let rows = doc().relation_rows(&options).unwrap();
        // Alice-Paris (23) and Carol-Paris (22) survive
        assert_eq!(count_label(&rows, DEFAULT_NO_RELATION_LABEL), 2);
    }

    #[test]
    fn test_custom_row_shaping() {
        let options = RelationOptions::new([("Person", "City")]).with_negatives(NegativeSampling::Limit(0));
        let mut rng = StdRng::seed_from_u64(7);
        let rows = doc()
            .relation_rows_with(&options, &mut rng, |_, e| e.id.clone(), |labels| labels.len())
            .unwrap();
        assert_eq!(
            rows,
            vec![
                RelationRow { first: "T2".to_string(), second: "T3".to_string(), labels: 2 },
                RelationRow { first: "T4".to_string(), second: "T5".to_string(), labels: 1 },
            ]
        );
    }

    #[test]
    fn test_relation_with_missing_entity_is_skipped() {
        let mut doc = doc();
        doc.add(Relation::new(
            "R9",
            "LivesIn",
            vec![("Arg1".into(), "T1".into()), ("Arg2".into(), "T99".into())],
        ))
        .unwrap();
        assert!(!doc.entity_relations().contains_key("T1"));
    }
}
