//! Enum-labelled ("typed") attribute values.
//!
//! Many attributes are state machines whose states travel as integer
//! codes. Mapping an attribute to an [`EnumLabels`] table makes its events
//! render the state by name (`ObsState.IDLE` rather than `2`) in event
//! listings and failure reports, and lets criteria name states by label.
//!
//! ```
//! use changeprobe::typed::{EnumLabels, EventEnumMapper};
//! use changeprobe::Event;
//!
//! let obs_state = EnumLabels::new("ObsState")
//!     .with_label(0, "EMPTY")
//!     .with_label(2, "IDLE");
//!
//! let mapper = EventEnumMapper::new();
//! mapper.map_attribute_to_enum("obsState", obs_state);
//!
//! let event = mapper.typed_event(Event::new("mid/subarray/1", "obsState", 2));
//! assert_eq!(event.value_label(), Some("IDLE"));
//! assert!(event.to_string().contains("value=ObsState.IDLE"));
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};

use crate::event::{same_attribute_name, Event};
use crate::value::Value;

/// Names for the integer codes of one enumerated attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumLabels {
    name: String,
    labels: BTreeMap<i64, String>,
}

impl EnumLabels {
    /// An empty table for the enum called `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// A table built from `(code, label)` pairs.
    #[must_use]
    pub fn from_pairs<L>(name: impl Into<String>, pairs: impl IntoIterator<Item = (i64, L)>) -> Self
    where
        L: Into<String>,
    {
        Self {
            name: name.into(),
            labels: pairs.into_iter().map(|(code, label)| (code, label.into())).collect(),
        }
    }

    /// Add (or rename) one code.
    #[must_use]
    pub fn with_label(mut self, code: i64, label: impl Into<String>) -> Self {
        self.labels.insert(code, label.into());
        self
    }

    /// Name of the enum.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of labelled codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether no code is labelled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Label of an integer value; `None` for unknown codes and non-integers.
    #[must_use]
    pub fn label_of(&self, value: &Value) -> Option<&str> {
        value
            .as_int()
            .and_then(|code| self.labels.get(&code))
            .map(String::as_str)
    }

    /// Value carrying the code of `label` (exact spelling).
    #[must_use]
    pub fn value_of(&self, label: &str) -> Option<Value> {
        self.labels
            .iter()
            .find(|(_, l)| l.as_str() == label)
            .map(|(code, _)| Value::Int(*code))
    }

    /// `Name.LABEL` for a known code.
    #[must_use]
    pub fn render(&self, value: &Value) -> Option<String> {
        self.label_of(value).map(|label| format!("{}.{label}", self.name))
    }
}

/// Associates attribute names with [`EnumLabels`] tables and types events
/// accordingly.
///
/// Attribute names are compared case-insensitively, like everywhere else
/// in the crate. The mapping can grow while events are being received.
#[derive(Debug, Default)]
pub struct EventEnumMapper {
    mapping: RwLock<Vec<(String, Arc<EnumLabels>)>>,
}

impl EventEnumMapper {
    /// A mapper with no attribute mapped.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A mapper seeded with `(attribute, labels)` pairs.
    pub fn from_mapping<A>(mapping: impl IntoIterator<Item = (A, EnumLabels)>) -> Self
    where
        A: Into<String>,
    {
        let mapper = Self::new();
        for (attribute, labels) in mapping {
            mapper.map_attribute_to_enum(attribute, labels);
        }
        mapper
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<(String, Arc<EnumLabels>)>> {
        self.mapping.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<(String, Arc<EnumLabels>)>> {
        self.mapping.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Type the events of `attribute` with `labels`, replacing any table
    /// already mapped to that attribute.
    pub fn map_attribute_to_enum(&self, attribute: impl Into<String>, labels: EnumLabels) {
        let attribute = attribute.into();
        let labels = Arc::new(labels);
        let mut mapping = self.write();
        match mapping.iter_mut().find(|(name, _)| same_attribute_name(name, &attribute)) {
            Some(entry) => entry.1 = labels,
            None => mapping.push((attribute, labels)),
        }
    }

    /// The table mapped to `attribute`, if any.
    #[must_use]
    pub fn labels_for(&self, attribute: &str) -> Option<Arc<EnumLabels>> {
        self.read()
            .iter()
            .find(|(name, _)| same_attribute_name(name, attribute))
            .map(|(_, labels)| Arc::clone(labels))
    }

    /// Number of mapped attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether no attribute is mapped.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// `event` typed with the table of its attribute, or unchanged.
    #[must_use]
    pub fn typed_event(&self, event: Event) -> Event {
        match self.labels_for(event.attribute()) {
            Some(labels) => event.with_labels(labels),
            None => event,
        }
    }
}
