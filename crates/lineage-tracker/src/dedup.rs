//! Entity deduplication across replayed conversation histories.
//!
//! Each request repeats earlier tool calls and tasks in its history. The
//! deduplicator collapses those repeats into one canonical record per
//! (entity type, id) and keeps occurrence counts for statistics.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::{Map, Value};

use lineage_core::AgentId;

/// Canonical record of an identified entity.
///
/// `occurrence_count == seen_in_requests.len()` always holds; a request
/// that shows the entity twice is listed twice.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UniqueEntity {
    pub id: String,
    pub entity_type: String,
    pub payload: Value,
    pub first_seen_request: usize,
    pub first_seen_agent: Option<AgentId>,
    pub occurrence_count: usize,
    pub seen_in_requests: Vec<usize>,
    pub seen_in_agents: Vec<AgentId>,
}

/// One observed occurrence, tagged with its deduplication status.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrichedEntity {
    #[serde(flatten)]
    pub payload: Map<String, Value>,
    pub entity_type: String,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_request: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_seen_agent: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence_count: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TypeStats {
    pub unique: usize,
    pub duplicates: usize,
    pub total: usize,
    pub duplication_ratio: f64,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct DedupStats {
    pub total_unique_entities: usize,
    pub total_occurrences: usize,
    pub overall_duplication_ratio: f64,
    pub duplicates_removed: usize,
    pub by_entity_type: BTreeMap<String, TypeStats>,
}

#[derive(Debug, Default)]
pub struct EntityDeduplicator {
    entities: Vec<UniqueEntity>,
    index: HashMap<(String, String), usize>,
    unique_by_type: BTreeMap<String, usize>,
    duplicates_by_type: BTreeMap<String, usize>,
}

impl EntityDeduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one occurrence of an entity seen in `request_index`.
    ///
    /// Entities without an id cannot be deduplicated and pass through
    /// tagged as unique. Otherwise the first occurrence creates the
    /// canonical record; later ones bump its counters and come back
    /// tagged as duplicates of it.
    pub fn record_occurrence(
        &mut self,
        payload: Value,
        id: Option<&str>,
        entity_type: &str,
        request_index: usize,
        agent: Option<&AgentId>,
    ) -> EnrichedEntity {
        let fields = match payload.clone() {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("value".to_string(), other)]),
        };

        let Some(id) = id.filter(|id| !id.is_empty()) else {
            return EnrichedEntity {
                payload: fields,
                entity_type: entity_type.to_string(),
                is_duplicate: false,
                duplicate_of: None,
                first_seen_request: None,
                first_seen_agent: None,
                occurrence_count: None,
            };
        };

        let key = (entity_type.to_string(), id.to_string());
        if let Some(&pos) = self.index.get(&key) {
            let entity = &mut self.entities[pos];
            entity.occurrence_count += 1;
            entity.seen_in_requests.push(request_index);
            if let Some(agent) = agent {
                if !entity.seen_in_agents.contains(agent) {
                    entity.seen_in_agents.push(agent.clone());
                }
            }
            *self
                .duplicates_by_type
                .entry(entity_type.to_string())
                .or_insert(0) += 1;

            return EnrichedEntity {
                payload: fields,
                entity_type: entity_type.to_string(),
                is_duplicate: true,
                duplicate_of: Some(id.to_string()),
                first_seen_request: Some(entity.first_seen_request),
                first_seen_agent: entity.first_seen_agent.clone(),
                occurrence_count: Some(entity.occurrence_count),
            };
        }

        let entity = UniqueEntity {
            id: id.to_string(),
            entity_type: entity_type.to_string(),
            payload,
            first_seen_request: request_index,
            first_seen_agent: agent.cloned(),
            occurrence_count: 1,
            seen_in_requests: vec![request_index],
            seen_in_agents: agent.into_iter().cloned().collect(),
        };
        self.index.insert(key, self.entities.len());
        self.entities.push(entity);
        *self
            .unique_by_type
            .entry(entity_type.to_string())
            .or_insert(0) += 1;

        EnrichedEntity {
            payload: fields,
            entity_type: entity_type.to_string(),
            is_duplicate: false,
            duplicate_of: None,
            first_seen_request: Some(request_index),
            first_seen_agent: agent.cloned(),
            occurrence_count: Some(1),
        }
    }

    pub fn get(&self, entity_type: &str, id: &str) -> Option<&UniqueEntity> {
        self.index
            .get(&(entity_type.to_string(), id.to_string()))
            .map(|&pos| &self.entities[pos])
    }

    /// Canonical records in first-seen order, optionally of one type.
    pub fn unique_entities<'a>(
        &'a self,
        entity_type: Option<&'a str>,
    ) -> impl Iterator<Item = &'a UniqueEntity> + 'a {
        self.entities
            .iter()
            .filter(move |e| entity_type.map_or(true, |t| e.entity_type == t))
    }

    /// Records observed by more than one agent.
    pub fn cross_agent_entities(&self) -> impl Iterator<Item = &UniqueEntity> {
        self.entities.iter().filter(|e| e.seen_in_agents.len() > 1)
    }

    pub fn stats(&self) -> DedupStats {
        let total_unique = self.entities.len();
        let total_occurrences: usize = self.entities.iter().map(|e| e.occurrence_count).sum();

        let by_entity_type = self
            .unique_by_type
            .iter()
            .map(|(entity_type, &unique)| {
                let duplicates = self.duplicates_by_type.get(entity_type).copied().unwrap_or(0);
                let total = unique + duplicates;
                let stats = TypeStats {
                    unique,
                    duplicates,
                    total,
                    duplication_ratio: ratio(total, unique),
                };
                (entity_type.clone(), stats)
            })
            .collect();

        DedupStats {
            total_unique_entities: total_unique,
            total_occurrences,
            overall_duplication_ratio: ratio(total_occurrences, total_unique),
            duplicates_removed: total_occurrences - total_unique,
            by_entity_type,
        }
    }
}

fn ratio(total: usize, unique: usize) -> f64 {
    if unique == 0 {
        0.0
    } else {
        total as f64 / unique as f64
    }
}
