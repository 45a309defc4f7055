//! Splitting one nested legislator payload into flat relational rows.
//!
//! The split is driven by an [`ExtractionSchema`]: an ordered list of
//! "remove this path, route it to that row" rules. Rules run in order over the
//! payload, and a schema is rejected at construction if a rule targets a path
//! nested inside one that an earlier rule already removed.

use serde_json::Value;
use thiserror::Error;

use crate::camara::{LegislatorOffice, Record, ENVELOPE_FIELD, LEGISLATOR_FK};

#[derive(Debug, Error)]
pub enum FlattenError {
    #[error("malformed record for legislator {id}: {reason}")]
    MalformedRecord { id: i64, reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("rule {index} has an empty path")]
    EmptyPath { index: usize },

    #[error("rule {later} reads '{path}' after rule {earlier} removed its parent")]
    ParentRemovedFirst {
        earlier: usize,
        later: usize,
        path: String,
    },

    #[error("path '{path}' is extracted twice")]
    Duplicate { path: String },
}

/// Destination of an extracted substructure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Office,
    Status,
    Discard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionRule {
    pub path: &'static [&'static str],
    pub target: Target,
}

impl ExtractionRule {
    #[must_use]
    pub const fn new(path: &'static [&'static str], target: Target) -> Self {
        Self { path, target }
    }

    fn display_path(&self) -> String {
        self.path.join(".")
    }
}

/// Rules for the legislator detail payload.
pub const LEGISLATOR_RULES: [ExtractionRule; 4] = [
    ExtractionRule::new(&["ultimoStatus", "gabinete"], Target::Office),
    ExtractionRule::new(&["ultimoStatus"], Target::Status),
    ExtractionRule::new(&["redeSocial"], Target::Discard),
    ExtractionRule::new(&["urlWebsite"], Target::Discard),
];

/// Validated, ordered extraction rules.
#[derive(Debug, Clone)]
pub struct ExtractionSchema {
    rules: Vec<ExtractionRule>,
}

impl ExtractionSchema {
    /// Build a schema, checking that no rule reads below a path an earlier rule removed.
    ///
    /// # Errors
    ///
    /// Returns a [`SchemaError`] for empty paths, duplicate paths, or a nested
    /// path ordered after its parent.
    pub fn new(rules: Vec<ExtractionRule>) -> Result<Self, SchemaError> {
        for (later, rule) in rules.iter().enumerate() {
            if rule.path.is_empty() {
                return Err(SchemaError::EmptyPath { index: later });
            }
            for (earlier, prior) in rules[..later].iter().enumerate() {
                if prior.path == rule.path {
                    return Err(SchemaError::Duplicate {
                        path: rule.display_path(),
                    });
                }
                if rule.path.starts_with(prior.path) {
                    return Err(SchemaError::ParentRemovedFirst {
                        earlier,
                        later,
                        path: rule.display_path(),
                    });
                }
            }
        }
        Ok(Self { rules })
    }

    /// The schema for `/deputados/{id}` payloads.
    #[must_use]
    pub fn legislator() -> Self {
        Self {
            rules: LEGISLATOR_RULES.to_vec(),
        }
    }

    #[must_use]
    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    /// Split one detail response into detail, status and office rows.
    ///
    /// `requested_id` is the id the payload was fetched for; the payload's own
    /// `id` wins when present. Missing substructures yield rows holding only
    /// the foreign key (and, for the office, all-absent attributes).
    ///
    /// # Errors
    ///
    /// Returns [`FlattenError::MalformedRecord`] when the `dados` envelope is
    /// missing or is not an object.
    pub fn flatten(
        &self,
        requested_id: i64,
        mut response: Value,
    ) -> Result<FlattenedLegislator, FlattenError> {
        let malformed = |reason: String| FlattenError::MalformedRecord {
            id: requested_id,
            reason,
        };

        let mut detail = match response.get_mut(ENVELOPE_FIELD).map(Value::take) {
            Some(Value::Object(map)) => map,
            Some(_) => return Err(malformed(format!("'{ENVELOPE_FIELD}' is not an object"))),
            None => return Err(malformed(format!("missing '{ENVELOPE_FIELD}'"))),
        };

        let id = detail.get("id").and_then(Value::as_i64).unwrap_or(requested_id);

        let mut office = None;
        let mut status = None;
        for rule in &self.rules {
            let extracted = remove_path(&mut detail, rule.path);
            match rule.target {
                Target::Office => office = extracted,
                Target::Status => status = extracted,
                Target::Discard => {}
            }
        }

        let office = match office {
            Some(Value::Object(map)) => office_from(&map, id),
            _ => LegislatorOffice::empty(id),
        };

        let status = match status {
            Some(Value::Object(mut map)) => {
                map.insert(LEGISLATOR_FK.to_string(), Value::from(id));
                map
            }
            _ => {
                let mut map = Record::new();
                map.insert(LEGISLATOR_FK.to_string(), Value::from(id));
                map
            }
        };

        Ok(FlattenedLegislator {
            id,
            detail,
            status,
            office,
        })
    }
}

impl Default for ExtractionSchema {
    fn default() -> Self {
        Self::legislator()
    }
}

/// The three rows derived from one legislator detail payload.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedLegislator {
    pub id: i64,
    pub detail: Record,
    pub status: Record,
    pub office: LegislatorOffice,
}

fn office_from(map: &Record, id: i64) -> LegislatorOffice {
    let field = |key: &str| match map.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.trim().is_empty() => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    };

    LegislatorOffice {
        nome: field("nome"),
        predio: field("predio"),
        sala: field("sala"),
        andar: field("andar"),
        telefone: field("telefone"),
        email: field("email"),
        id_deputado: id,
    }
}

/// Remove `path` from `record`, returning the removed value.
fn remove_path(record: &mut Record, path: &[&str]) -> Option<Value> {
    let (last, parents) = path.split_last()?;
    let mut current = record;
    for key in parents {
        current = current.get_mut(*key)?.as_object_mut()?;
    }
    current.shift_remove(*last)
}
