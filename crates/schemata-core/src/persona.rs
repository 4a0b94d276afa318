//! Persona / domain lookup.
//!
//! Reports rendered by the external Studio application key off the same
//! schema identities, so this table is a versioned contract: it is built from
//! the schema rows of the taxonomy file and pinned by a golden file in the
//! test suite. Older display-name keys ("The Clinger", labels, short aliases)
//! are accepted on input through [`PersonaTable::resolve_alias`] and always
//! land on the one canonical [`SchemaId`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::MappingIntegrityError;
use crate::registry::Registry;
use crate::taxonomy::{Domain, SchemaId};

/// One schema row as declared in the taxonomy data file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaRowV1 {
    pub id: SchemaId,
    pub domain: u8,
    pub sub: u8,
    pub label: String,
    pub public_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Persona {
    pub schema: SchemaId,
    pub public_name: String,
    pub label: String,
    pub domain: Domain,
    pub domain_name: String,
}

/// Serialized form of the whole table (what the golden file pins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonaTableV1 {
    pub version: String,
    pub personas: Vec<Persona>,
}

#[derive(Debug, Clone)]
pub struct PersonaTable {
    version: String,
    // indexed by SchemaId::ordinal
    entries: Vec<Persona>,
    aliases: HashMap<String, SchemaId>,
}

fn alias_key(s: &str) -> String {
    s.trim().to_lowercase()
}

impl PersonaTable {
    pub(crate) fn build(
        version: &str,
        rows: &[SchemaRowV1],
        domain_names: &[String; 5],
    ) -> Result<Self, MappingIntegrityError> {
        let mut entries = Vec::with_capacity(SchemaId::ALL.len());
        let mut aliases: HashMap<String, SchemaId> = HashMap::new();

        for schema in SchemaId::ALL {
            let row = rows
                .iter()
                .find(|r| r.id == schema)
                .ok_or(MappingIntegrityError::SchemaDeclaration { schema, count: 0 })?;
            let domain = schema.domain();
            entries.push(Persona {
                schema,
                public_name: row.public_name.clone(),
                label: row.label.clone(),
                domain,
                domain_name: domain_names[domain.number() as usize - 1].clone(),
            });

            let keys = [schema.key(), row.label.as_str(), row.public_name.as_str()]
                .into_iter()
                .chain(row.aliases.iter().map(String::as_str));
            for key in keys {
                let key = alias_key(key);
                match aliases.get(&key) {
                    Some(&other) if other != schema => {
                        return Err(MappingIntegrityError::AmbiguousAlias {
                            key,
                            first: other,
                            second: schema,
                        });
                    }
                    _ => {
                        aliases.insert(key, schema);
                    }
                }
            }
        }

        Ok(Self {
            version: version.to_string(),
            entries,
            aliases,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Total: every schema has an entry once the registry validated.
    pub fn get(&self, schema: SchemaId) -> &Persona {
        &self.entries[schema.ordinal()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.entries.iter()
    }

    /// Map a schema id, label, public name or legacy alias to its schema.
    pub fn resolve_alias(&self, key: &str) -> Option<SchemaId> {
        self.aliases.get(&alias_key(key)).copied()
    }

    pub fn to_v1(&self) -> PersonaTableV1 {
        PersonaTableV1 {
            version: self.version.clone(),
            personas: self.entries.clone(),
        }
    }
}

/// Presentation name and domain for a schema.
pub fn to_persona(registry: &Registry, schema: SchemaId) -> &Persona {
    registry.personas().get(schema)
}
