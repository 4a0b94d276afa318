//! Canonical mapping registry (the 108 item descriptors).
//!
//! The registry is the trust root for every other component: schema
//! membership, reverse flags, weights, legacy positions and persona names all
//! come from one embedded data file (`data/taxonomy_v1.json`). It is built
//! once, validated in full, and then shared read-only for the rest of the
//! process.
//!
//! ```text
//!   taxonomy_v1.json ──parse──► TaxonomyFileV1 ──validate──► Registry
//!                                                              │
//!                      ┌────────────────┬────────────────┬─────┴──────────┐
//!                      ▼                ▼                ▼                ▼
//!                  by opaque id   by canonical id   by position     persona table
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::MappingIntegrityError;
use crate::identity::{self, ItemKey};
use crate::persona::{PersonaTable, SchemaRowV1};
use crate::taxonomy::{CanonicalId, Domain, SchemaId, ITEMS_PER_SCHEMA, ITEM_COUNT};

/// The authoritative taxonomy table, shipped with the crate.
pub const TAXONOMY_V1_JSON: &str = include_str!("../data/taxonomy_v1.json");

// ============================================================================
// Data file layout
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxonomyFileV1 {
    pub mapping_version: String,
    pub persona_table_version: String,
    /// Schema precedence when rounded indexes tie, highest first.
    pub tie_break_priority: Vec<SchemaId>,
    pub domains: Vec<DomainRowV1>,
    pub schemas: Vec<SchemaRowV1>,
    pub items: Vec<ItemRowV1>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainRowV1 {
    pub domain: u8,
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRowV1 {
    pub id: String,
    pub canonical_id: CanonicalId,
    pub schema: SchemaId,
    #[serde(default)]
    pub reverse: bool,
    #[serde(default = "default_weight")]
    pub weight: f64,
}

fn default_weight() -> f64 {
    1.0
}

impl TaxonomyFileV1 {
    pub fn from_json(text: &str) -> Result<Self, MappingIntegrityError> {
        serde_json::from_str(text).map_err(|e| MappingIntegrityError::Parse(e.to_string()))
    }

    /// The embedded v1 table, parsed but not yet validated.
    pub fn embedded() -> Result<Self, MappingIntegrityError> {
        Self::from_json(TAXONOMY_V1_JSON)
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable descriptor for one questionnaire item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemDescriptor {
    pub canonical_id: CanonicalId,
    pub opaque_id: String,
    pub schema: SchemaId,
    pub reverse: bool,
    pub weight: f64,
    /// 1-based legacy position in canonical order.
    pub position: u32,
}

#[derive(Debug, Clone)]
pub struct Registry {
    mapping_version: String,
    items: Vec<ItemDescriptor>,
    by_canonical: HashMap<CanonicalId, usize>,
    by_opaque: HashMap<String, usize>,
    personas: PersonaTable,
    tie_break_priority: Vec<SchemaId>,
}

static REGISTRY: OnceLock<Result<Registry, MappingIntegrityError>> = OnceLock::new();

fn mapping_version_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^mapping-v[0-9]+$").expect("static regex"))
}

pub fn is_mapping_version(s: &str) -> bool {
    mapping_version_pattern().is_match(s)
}

impl Registry {
    /// Process-wide registry built from the embedded table.
    ///
    /// The first caller builds and validates; everyone after that (including
    /// concurrent first callers) gets the same cached result. A failed build is
    /// cached too, so a broken table fails every call the same way.
    pub fn load() -> Result<&'static Registry, MappingIntegrityError> {
        REGISTRY
            .get_or_init(|| {
                let result = TaxonomyFileV1::embedded().and_then(Registry::from_taxonomy);
                match &result {
                    Ok(registry) => tracing::debug!(
                        mapping_version = %registry.mapping_version,
                        items = registry.items.len(),
                        "schema registry loaded"
                    ),
                    Err(err) => tracing::error!(error = %err, "schema registry failed validation"),
                }
                result
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    pub fn from_json(text: &str) -> Result<Self, MappingIntegrityError> {
        TaxonomyFileV1::from_json(text).and_then(Self::from_taxonomy)
    }

    /// Validate a parsed taxonomy and build the lookup indexes.
    pub fn from_taxonomy(file: TaxonomyFileV1) -> Result<Self, MappingIntegrityError> {
        if !is_mapping_version(&file.mapping_version) {
            return Err(MappingIntegrityError::InvalidMappingVersion(
                file.mapping_version,
            ));
        }

        let domain_names = check_domains(&file.domains)?;
        check_schemas(&file.schemas)?;
        check_tie_break_priority(&file.tie_break_priority)?;
        let personas = PersonaTable::build(
            &file.persona_table_version,
            &file.schemas,
            &domain_names,
        )?;

        if file.items.len() != ITEM_COUNT {
            return Err(MappingIntegrityError::ItemCount {
                expected: ITEM_COUNT,
                actual: file.items.len(),
            });
        }

        let mut seen_canonical = HashSet::new();
        let mut seen_opaque = HashSet::new();
        let mut per_schema: BTreeMap<SchemaId, usize> = BTreeMap::new();

        for row in &file.items {
            let id = row.canonical_id;
            if !identity::is_opaque_id(&row.id) {
                return Err(MappingIntegrityError::MalformedOpaqueId(row.id.clone()));
            }
            if !seen_opaque.insert(row.id.as_str()) {
                return Err(MappingIntegrityError::DuplicateOpaqueId(row.id.clone()));
            }
            if !seen_canonical.insert(id) {
                return Err(MappingIntegrityError::DuplicateCanonicalId(id));
            }
            if id.question == 0 || id.question as usize > ITEMS_PER_SCHEMA {
                return Err(MappingIntegrityError::QuestionOutOfRange(id));
            }
            if id.domain != row.schema.domain().number() || id.sub != row.schema.sub() {
                return Err(MappingIntegrityError::ItemOutsideSchema {
                    item: id,
                    schema: row.schema,
                });
            }
            if !row.weight.is_finite() || row.weight <= 0.0 {
                return Err(MappingIntegrityError::InvalidWeight {
                    item: id,
                    weight: row.weight,
                });
            }
            *per_schema.entry(row.schema).or_default() += 1;
        }

        for schema in SchemaId::ALL {
            let actual = per_schema.get(&schema).copied().unwrap_or(0);
            if actual != ITEMS_PER_SCHEMA {
                return Err(MappingIntegrityError::SchemaItemCount {
                    schema,
                    expected: ITEMS_PER_SCHEMA,
                    actual,
                });
            }
        }

        let mut rows = file.items;
        rows.sort_by_key(|r| r.canonical_id);

        let items: Vec<ItemDescriptor> = rows
            .into_iter()
            .enumerate()
            .map(|(i, row)| ItemDescriptor {
                canonical_id: row.canonical_id,
                opaque_id: row.id,
                schema: row.schema,
                reverse: row.reverse,
                weight: row.weight,
                position: (i + 1) as u32,
            })
            .collect();

        let by_canonical = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.canonical_id, i))
            .collect();
        let by_opaque = items
            .iter()
            .enumerate()
            .map(|(i, item)| (item.opaque_id.clone(), i))
            .collect();

        Ok(Self {
            mapping_version: file.mapping_version,
            items,
            by_canonical,
            by_opaque,
            personas,
            tie_break_priority: file.tie_break_priority,
        })
    }

    pub fn mapping_version(&self) -> &str {
        &self.mapping_version
    }

    /// All descriptors in canonical order.
    pub fn items(&self) -> &[ItemDescriptor] {
        &self.items
    }

    pub fn by_canonical(&self, id: CanonicalId) -> Option<&ItemDescriptor> {
        self.by_canonical.get(&id).map(|&i| &self.items[i])
    }

    pub fn by_opaque(&self, id: &str) -> Option<&ItemDescriptor> {
        self.by_opaque.get(id).map(|&i| &self.items[i])
    }

    /// Legacy 1-based positional lookup.
    pub fn by_position(&self, position: u32) -> Option<&ItemDescriptor> {
        let index = (position as usize).checked_sub(1)?;
        self.items.get(index)
    }

    pub fn lookup(&self, key: &ItemKey) -> Option<&ItemDescriptor> {
        match key {
            ItemKey::Opaque(id) => self.by_opaque(id),
            ItemKey::Canonical(id) => self.by_canonical(*id),
            ItemKey::Legacy(position) => self.by_position(*position),
        }
    }

    pub fn items_for(&self, schema: SchemaId) -> impl Iterator<Item = &ItemDescriptor> {
        self.items.iter().filter(move |item| item.schema == schema)
    }

    pub fn personas(&self) -> &PersonaTable {
        &self.personas
    }

    /// Display label used by reports and by the ranking tie-break.
    pub fn label(&self, schema: SchemaId) -> &str {
        &self.personas.get(schema).label
    }

    /// Every schema exactly once, in tie-break precedence.
    pub fn tie_break_priority(&self) -> &[SchemaId] {
        &self.tie_break_priority
    }
}

fn check_domains(rows: &[DomainRowV1]) -> Result<[String; 5], MappingIntegrityError> {
    let mut counts: BTreeMap<u8, usize> = BTreeMap::new();
    for row in rows {
        *counts.entry(row.domain).or_default() += 1;
    }
    for (&domain, &count) in &counts {
        if Domain::from_number(domain).is_none() || count != 1 {
            return Err(MappingIntegrityError::DomainDeclaration { domain, count });
        }
    }

    let mut names: [String; 5] = Default::default();
    for domain in Domain::ALL {
        let row = rows
            .iter()
            .find(|r| r.domain == domain.number())
            .ok_or(MappingIntegrityError::DomainDeclaration {
                domain: domain.number(),
                count: 0,
            })?;
        if row.key != domain.key() {
            return Err(MappingIntegrityError::DomainKey {
                domain: domain.number(),
                expected: domain.key().to_string(),
                actual: row.key.clone(),
            });
        }
        names[domain.number() as usize - 1] = row.name.clone();
    }
    Ok(names)
}

fn check_tie_break_priority(priority: &[SchemaId]) -> Result<(), MappingIntegrityError> {
    for schema in SchemaId::ALL {
        let count = priority.iter().filter(|&&s| s == schema).count();
        if count != 1 {
            return Err(MappingIntegrityError::TieBreakPriority { schema, count });
        }
    }
    Ok(())
}

fn check_schemas(rows: &[SchemaRowV1]) -> Result<(), MappingIntegrityError> {
    for schema in SchemaId::ALL {
        let count = rows.iter().filter(|r| r.id == schema).count();
        if count != 1 {
            return Err(MappingIntegrityError::SchemaDeclaration { schema, count });
        }
    }
    for row in rows {
        let expected_domain = row.id.domain().number();
        let expected_sub = row.id.sub();
        if row.domain != expected_domain || row.sub != expected_sub {
            return Err(MappingIntegrityError::SchemaCoordinates {
                schema: row.id,
                domain: row.domain,
                sub: row.sub,
                expected_domain,
                expected_sub,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::SCHEMA_COUNT;

    fn embedded() -> TaxonomyFileV1 {
        TaxonomyFileV1::embedded().expect("embedded taxonomy parses")
    }

    #[test]
    fn embedded_table_validates() {
        let registry = Registry::load().expect("registry");
        assert_eq!(registry.items().len(), ITEM_COUNT);
        assert_eq!(registry.mapping_version(), "mapping-v1");
        for schema in SchemaId::ALL {
            assert_eq!(registry.items_for(schema).count(), ITEMS_PER_SCHEMA);
        }
    }

    #[test]
    fn load_is_memoized() {
        let a = Registry::load().unwrap() as *const Registry;
        let b = Registry::load().unwrap() as *const Registry;
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_first_access_sees_one_registry() {
        let handles: Vec<_> = (0..8)
            .map(|_| std::thread::spawn(|| Registry::load().unwrap() as *const Registry as usize))
            .collect();
        let ptrs: HashSet<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(ptrs.len(), 1);
    }

    #[test]
    fn positions_follow_canonical_order() {
        let registry = Registry::load().unwrap();
        let first = registry.by_position(1).unwrap();
        assert_eq!(first.canonical_id.to_string(), "1.1.1");
        let last = registry.by_position(ITEM_COUNT as u32).unwrap();
        assert_eq!(last.canonical_id.to_string(), "5.4.6");
        assert!(registry.by_position(0).is_none());
        assert!(registry.by_position(ITEM_COUNT as u32 + 1).is_none());
        let ids: Vec<CanonicalId> = registry.items().iter().map(|i| i.canonical_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    #[test]
    fn rejects_missing_item() {
        let mut file = embedded();
        file.items.pop();
        assert_eq!(
            Registry::from_taxonomy(file).unwrap_err(),
            MappingIntegrityError::ItemCount {
                expected: ITEM_COUNT,
                actual: ITEM_COUNT - 1
            }
        );
    }

    #[test]
    fn rejects_duplicate_opaque_id() {
        let mut file = embedded();
        file.items[1].id = file.items[0].id.clone();
        assert!(matches!(
            Registry::from_taxonomy(file),
            Err(MappingIntegrityError::DuplicateOpaqueId(_))
        ));
    }

    #[test]
    fn rejects_duplicate_canonical_id() {
        let mut file = embedded();
        file.items[1].canonical_id = file.items[0].canonical_id;
        assert!(matches!(
            Registry::from_taxonomy(file),
            Err(MappingIntegrityError::DuplicateCanonicalId(_))
        ));
    }

    #[test]
    fn rejects_item_moved_to_another_schema() {
        let mut file = embedded();
        // 1.1.1 relabelled as mistrust: mistrust now has 7, coordinates disagree.
        file.items[0].schema = SchemaId::MistrustAbuse;
        assert!(matches!(
            Registry::from_taxonomy(file),
            Err(MappingIntegrityError::ItemOutsideSchema { .. })
        ));
    }

    #[test]
    fn rejects_question_seven() {
        let mut file = embedded();
        file.items[0].canonical_id = CanonicalId::new(1, 1, 7);
        assert_eq!(
            Registry::from_taxonomy(file).unwrap_err(),
            MappingIntegrityError::QuestionOutOfRange(CanonicalId::new(1, 1, 7))
        );
    }

    #[test]
    fn rejects_non_positive_weight() {
        let mut file = embedded();
        file.items[3].weight = 0.0;
        assert!(matches!(
            Registry::from_taxonomy(file),
            Err(MappingIntegrityError::InvalidWeight { .. })
        ));
    }

    #[test]
    fn rejects_bad_mapping_version() {
        let mut file = embedded();
        file.mapping_version = "v1".to_string();
        assert!(matches!(
            Registry::from_taxonomy(file),
            Err(MappingIntegrityError::InvalidMappingVersion(_))
        ));
    }

    #[test]
    fn rejects_missing_schema_declaration() {
        let mut file = embedded();
        file.schemas.retain(|s| s.id != SchemaId::Failure);
        assert_eq!(file.schemas.len(), SCHEMA_COUNT - 1);
        assert_eq!(
            Registry::from_taxonomy(file).unwrap_err(),
            MappingIntegrityError::SchemaDeclaration {
                schema: SchemaId::Failure,
                count: 0
            }
        );
    }

    #[test]
    fn rejects_mislabelled_domain_key() {
        let mut file = embedded();
        file.domains[2].key = "impaired_autonomy".to_string();
        assert_eq!(
            Registry::from_taxonomy(file).unwrap_err(),
            MappingIntegrityError::DomainKey {
                domain: 3,
                expected: "impaired_limits".to_string(),
                actual: "impaired_autonomy".to_string(),
            }
        );
    }

    #[test]
    fn tie_break_priority_is_a_permutation_of_the_schemas() {
        let registry = Registry::load().unwrap();
        let mut priority = registry.tie_break_priority().to_vec();
        assert_eq!(priority.len(), SCHEMA_COUNT);
        priority.sort();
        assert_eq!(priority, SchemaId::ALL.to_vec());
        assert_eq!(registry.tie_break_priority()[0], SchemaId::DefectivenessShame);
    }

    #[test]
    fn rejects_tie_break_priority_with_repeated_schema() {
        let mut file = embedded();
        // Failure twice, Punitiveness dropped.
        let slot = file
            .tie_break_priority
            .iter()
            .position(|&s| s == SchemaId::Punitiveness)
            .unwrap();
        file.tie_break_priority[slot] = SchemaId::Failure;
        assert_eq!(
            Registry::from_taxonomy(file).unwrap_err(),
            MappingIntegrityError::TieBreakPriority {
                schema: SchemaId::Failure,
                count: 2
            }
        );
    }

    #[test]
    fn rejects_unknown_schema_name_at_parse() {
        let text = TAXONOMY_V1_JSON.replacen("\"punitiveness\"", "\"grumpiness\"", 1);
        assert!(matches!(
            Registry::from_json(&text),
            Err(MappingIntegrityError::Parse(_))
        ));
    }
}
