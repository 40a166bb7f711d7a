// 📋 Component Table - named collection of entities of one type
// Each entity has a unique identifier and a map of attributes

use super::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

static MISSING: Value = Value::Missing;

// ============================================================================
// ENTITY
// ============================================================================

/// One row of a component table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Unique identifier within the table
    pub id: String,

    /// Attribute values; absent keys read as Missing
    pub attributes: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Builder: set an attribute
    pub fn with(mut self, attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(attribute.into(), value.into());
        self
    }

    pub fn get(&self, attribute: &str) -> &Value {
        self.attributes.get(attribute).unwrap_or(&MISSING)
    }

    pub fn set(&mut self, attribute: impl Into<String>, value: Value) {
        self.attributes.insert(attribute.into(), value);
    }

    pub fn remove(&mut self, attribute: &str) -> Option<Value> {
        self.attributes.remove(attribute)
    }
}

// ============================================================================
// COMPONENT TABLE
// ============================================================================

/// Component table with stable row order and O(1) id lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentTable {
    name: String,
    columns: Vec<String>,
    entities: Vec<Entity>,
    index: HashMap<String, usize>,
}

impl ComponentTable {
    pub fn new(name: impl Into<String>) -> Self {
        ComponentTable {
            name: name.into(),
            columns: Vec::new(),
            entities: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Create a table from entities; columns are discovered in first-seen order
    pub fn from_entities(name: impl Into<String>, entities: Vec<Entity>) -> Self {
        let mut table = ComponentTable::new(name);
        for entity in entities {
            table.insert(entity);
        }
        table
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, attribute: &str) -> bool {
        self.columns.iter().any(|c| c == attribute)
    }

    /// Declare a column without setting any values
    pub fn add_column(&mut self, attribute: impl Into<String>) {
        let attribute = attribute.into();
        if !self.has_column(&attribute) {
            self.columns.push(attribute);
        }
    }

    /// Remove a column from every entity
    pub fn drop_column(&mut self, attribute: &str) {
        self.columns.retain(|c| c != attribute);
        for entity in &mut self.entities {
            entity.remove(attribute);
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.id.as_str())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: &str) -> Option<&Entity> {
        self.index.get(id).map(|&i| &self.entities[i])
    }

    pub fn entity_mut(&mut self, id: &str) -> Option<&mut Entity> {
        match self.index.get(id) {
            Some(&i) => Some(&mut self.entities[i]),
            None => None,
        }
    }

    pub fn entities_mut(&mut self) -> impl Iterator<Item = &mut Entity> {
        self.entities.iter_mut()
    }

    /// Attribute value of one entity (Missing for unknown entity or attribute)
    pub fn get(&self, id: &str, attribute: &str) -> &Value {
        self.entity(id).map(|e| e.get(attribute)).unwrap_or(&MISSING)
    }

    /// Set an attribute on an existing entity. Returns false if the id is unknown.
    pub fn set(&mut self, id: &str, attribute: &str, value: Value) -> bool {
        self.add_column(attribute);
        match self.entity_mut(id) {
            Some(entity) => {
                entity.set(attribute, value);
                true
            }
            None => false,
        }
    }

    /// Insert an entity, replacing any entity with the same id in place
    pub fn insert(&mut self, entity: Entity) {
        for attribute in entity.attributes.keys() {
            if !self.has_column(attribute) {
                self.columns.push(attribute.clone());
            }
        }
        match self.index.get(&entity.id) {
            Some(&i) => self.entities[i] = entity,
            None => {
                self.index.insert(entity.id.clone(), self.entities.len());
                self.entities.push(entity);
            }
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<Entity> {
        let position = self.index.get(id).copied()?;
        let removed = self.entities.remove(position);
        self.reindex();
        Some(removed)
    }

    /// Remove many entities in one pass
    pub fn remove_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) -> usize {
        let doomed: std::collections::HashSet<&str> = ids.into_iter().collect();
        let before = self.entities.len();
        self.entities.retain(|e| !doomed.contains(e.id.as_str()));
        self.reindex();
        before - self.entities.len()
    }

    /// (id, value) pairs of one column, in row order
    pub fn column(&self, attribute: &str) -> Vec<(&str, &Value)> {
        self.entities
            .iter()
            .map(|e| (e.id.as_str(), e.get(attribute)))
            .collect()
    }

    fn reindex(&mut self) {
        self.index = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), i))
            .collect();
    }
}

// ============================================================================
// TESTS
// ============================================================================
