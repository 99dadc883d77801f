//! Transition table definition and compilation.
//!
//! Event lists use a JSON/YAML DSL:
//!
//! ```json
//! [
//!   {"name": "activate", "from": "none", "to": "active"},
//!   {"name": "cancel", "from": "active", "to": "canceled"},
//!   {"name": "reactivate", "from": "canceled", "to": "active"},
//!   {"name": "expire", "from": ["active", "canceled"], "to": "expired"},
//!   {"name": "archive", "from": "*", "to": "archived", "settings": {"allowForce": true}}
//! ]
//! ```

use crate::error::CoreError;
use crate::hooks::HookTable;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Origin value meaning "any current state".
pub const WILDCARD: &str = "*";

/// A state in the machine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct State(pub String);

impl State {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for State {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for State {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// The states an event may be fired from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// Wildcard: legal from any current state.
    Any,
    /// Legal only from one of the listed states.
    States(Vec<State>),
}

impl Origin {
    /// Returns true if the event may fire from `state`.
    pub fn allows(&self, state: &State) -> bool {
        match self {
            Origin::Any => true,
            Origin::States(states) => states.contains(state),
        }
    }

    /// Returns the explicit origin states (empty for the wildcard).
    pub fn states(&self) -> &[State] {
        match self {
            Origin::Any => &[],
            Origin::States(states) => states,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Origin::Any)
    }
}

impl From<&str> for Origin {
    fn from(s: &str) -> Self {
        if s == WILDCARD {
            Origin::Any
        } else {
            Origin::States(vec![State::from(s)])
        }
    }
}

impl<const N: usize> From<[&str; N]> for Origin {
    fn from(states: [&str; N]) -> Self {
        if states.contains(&WILDCARD) {
            return Origin::Any;
        }
        Origin::States(states.iter().map(|s| State::from(*s)).collect())
    }
}

impl Serialize for Origin {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        match self {
            Origin::Any => serializer.serialize_str(WILDCARD),
            Origin::States(states) if states.len() == 1 => {
                serializer.serialize_str(states[0].as_str())
            }
            Origin::States(states) => states.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for Origin {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::{self, Visitor};

        struct OriginVisitor;

        impl<'de> Visitor<'de> for OriginVisitor {
            type Value = Origin;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a state, an array of states, or \"*\"")
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                Ok(Origin::from(v))
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: de::SeqAccess<'de>,
            {
                let mut states = Vec::new();
                while let Some(s) = seq.next_element::<String>()? {
                    if s == WILDCARD {
                        // Drain the rest; a wildcard anywhere means "any".
                        while seq.next_element::<de::IgnoredAny>()?.is_some() {}
                        return Ok(Origin::Any);
                    }
                    states.push(State(s));
                }
                Ok(Origin::States(states))
            }
        }

        deserializer.deserialize_any(OriginVisitor)
    }
}

/// Per-event settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Allow callers to force this event from a state outside `from`.
    #[serde(alias = "allowForce")]
    pub allow_force: bool,
}

/// A declared event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDefinition {
    /// Event name.
    pub name: String,

    /// Origin state(s).
    pub from: Origin,

    /// Target state.
    pub to: State,

    /// Options handed to the persistence layer when the new state is written.
    #[serde(
        default,
        alias = "transitionOptions",
        skip_serializing_if = "Option::is_none"
    )]
    pub transition_options: Option<Value>,

    #[serde(default)]
    pub settings: EventSettings,
}

impl EventDefinition {
    pub fn new(name: impl Into<String>, from: impl Into<Origin>, to: impl Into<State>) -> Self {
        Self {
            name: name.into(),
            from: from.into(),
            to: to.into(),
            transition_options: None,
            settings: EventSettings::default(),
        }
    }

    pub fn with_options(mut self, options: Value) -> Self {
        self.transition_options = Some(options);
        self
    }

    pub fn allow_force(mut self) -> Self {
        self.settings.allow_force = true;
        self
    }
}

/// Collects every origin and target state, wildcard excluded, first occurrence first.
pub fn derive_states(events: &[EventDefinition]) -> Vec<State> {
    let mut seen = HashSet::new();
    let mut states = Vec::new();

    for event in events {
        for state in event.from.states().iter().chain(std::iter::once(&event.to)) {
            if state.as_str() != WILDCARD && seen.insert(state.clone()) {
                states.push(state.clone());
            }
        }
    }

    states
}

/// Collects event names, first occurrence first.
pub fn derive_event_names(events: &[EventDefinition]) -> Vec<String> {
    let mut seen = HashSet::new();
    events
        .iter()
        .filter(|e| seen.insert(e.name.as_str()))
        .map(|e| e.name.clone())
        .collect()
}

/// Validated and indexed transition table.
#[derive(Debug, Clone)]
pub struct TransitionTable {
    /// Declared events, in declaration order.
    events: Vec<EventDefinition>,

    /// Every state named by an event.
    states: Vec<State>,

    /// Unique event names.
    event_names: Vec<String>,

    /// Explicit transitions indexed by (event, from_state) -> position in `events`.
    explicit: HashMap<(String, State), usize>,

    /// Wildcard transitions indexed by event -> position in `events`.
    wildcard: HashMap<String, usize>,

    /// Hook identifiers for every stage.
    hooks: HookTable,

    /// Checksum of the compiled event list.
    checksum: String,
}

impl TransitionTable {
    /// Parses and compiles an event list from JSON.
    pub fn from_json(json: &Value) -> Result<Self, CoreError> {
        let events: Vec<EventDefinition> = serde_json::from_value(json.clone())?;
        Self::compile(events)
    }

    /// Validates an event list and builds the lookup indexes.
    pub fn compile(events: Vec<EventDefinition>) -> Result<Self, CoreError> {
        if events.is_empty() {
            return Err(CoreError::InvalidDefinition {
                reason: "no events declared".to_string(),
            });
        }

        let mut explicit = HashMap::new();
        let mut wildcard = HashMap::new();

        for (idx, event) in events.iter().enumerate() {
            if event.name.is_empty() {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("event #{} has an empty name", idx),
                });
            }
            if event.to.as_str().is_empty() || event.to.as_str() == WILDCARD {
                return Err(CoreError::InvalidDefinition {
                    reason: format!("event '{}' has an invalid target state", event.name),
                });
            }

            match &event.from {
                Origin::Any => {
                    if wildcard.insert(event.name.clone(), idx).is_some() {
                        return Err(CoreError::InvalidDefinition {
                            reason: format!("duplicate wildcard transition on event '{}'", event.name),
                        });
                    }
                }
                Origin::States(states) => {
                    if states.is_empty() {
                        return Err(CoreError::InvalidDefinition {
                            reason: format!("event '{}' has no origin states", event.name),
                        });
                    }
                    for from in states {
                        if from.as_str().is_empty() {
                            return Err(CoreError::InvalidDefinition {
                                reason: format!("event '{}' has an empty origin state", event.name),
                            });
                        }

                        let key = (event.name.clone(), from.clone());
                        if explicit.insert(key, idx).is_some() {
                            return Err(CoreError::InvalidDefinition {
                                reason: format!(
                                    "duplicate transition from '{}' on event '{}'",
                                    from.as_str(),
                                    event.name
                                ),
                            });
                        }
                    }
                }
            }
        }

        let states = derive_states(&events);
        let event_names = derive_event_names(&events);
        let hooks = HookTable::build(&states, &event_names)?;

        let json_bytes = serde_json::to_vec(&events)?;
        let checksum = format!("{:08x}", crc32c::crc32c(&json_bytes));

        Ok(Self {
            events,
            states,
            event_names,
            explicit,
            wildcard,
            hooks,
            checksum,
        })
    }

    pub fn events(&self) -> &[EventDefinition] {
        &self.events
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn event_names(&self) -> &[String] {
        &self.event_names
    }

    pub fn hooks(&self) -> &HookTable {
        &self.hooks
    }

    pub fn checksum(&self) -> &str {
        &self.checksum
    }

    /// Returns true if the given state is named by some event.
    pub fn has_state(&self, state: &str) -> bool {
        self.states.iter().any(|s| s.as_str() == state)
    }

    pub fn has_event(&self, event: &str) -> bool {
        self.event_names.iter().any(|e| e == event)
    }

    /// Restricts a persisted state value to the declared vocabulary.
    pub fn validate_state(&self, state: &str) -> Result<(), CoreError> {
        if self.has_state(state) {
            Ok(())
        } else {
            Err(CoreError::InvalidState {
                state: state.to_string(),
            })
        }
    }

    /// Looks up the definition that makes `event` legal from `state`.
    ///
    /// Explicit origins take precedence over a wildcard.
    pub fn lookup(&self, event: &str, state: &State) -> Option<&EventDefinition> {
        self.explicit
            .get(&(event.to_string(), state.clone()))
            .or_else(|| self.wildcard.get(event))
            .map(|&idx| &self.events[idx])
    }

    /// Returns every definition declared under `event`.
    pub fn definitions(&self, event: &str) -> impl Iterator<Item = &EventDefinition> + '_ {
        let event = event.to_string();
        self.events.iter().filter(move |e| e.name == event)
    }

    /// Returns all events legal from the given state, in declaration order.
    pub fn events_from(&self, state: &State) -> Vec<&str> {
        self.event_names
            .iter()
            .filter(|e| self.lookup(e, state).is_some())
            .map(|e| e.as_str())
            .collect()
    }

    /// Returns `(event, target)` pairs legal from the given state.
    pub fn transitions_from(&self, state: &State) -> Vec<(&str, &State)> {
        self.event_names
            .iter()
            .filter_map(|e| self.lookup(e, state).map(|def| (e.as_str(), &def.to)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn subscription_events() -> Vec<EventDefinition> {
        vec![
            EventDefinition::new("activate", "none", "active"),
            EventDefinition::new("cancel", "active", "canceled"),
            EventDefinition::new("reactivate", "canceled", "active"),
            EventDefinition::new("expire", ["active", "canceled"], "expired"),
        ]
    }

    fn names(states: &[State]) -> Vec<&str> {
        states.iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn test_derive_states() {
        let states = derive_states(&subscription_events());
        assert_eq!(names(&states), vec!["none", "active", "canceled", "expired"]);
    }

    #[test]
    fn test_derive_states_skips_wildcard() {
        let events = vec![
            EventDefinition::new("reset", "*", "initial"),
            EventDefinition::new("go", "initial", "done"),
        ];
        assert_eq!(names(&derive_states(&events)), vec!["initial", "done"]);
    }

    #[test]
    fn test_derive_event_names() {
        let mut events = subscription_events();
        events.push(EventDefinition::new("cancel", "expired", "canceled"));

        assert_eq!(
            derive_event_names(&events),
            vec!["activate", "cancel", "reactivate", "expire"]
        );
    }

    #[test]
    fn test_parse_from_json() {
        let json = serde_json::json!([
            {"name": "cancel", "from": "active", "to": "canceled"},
            {"name": "expire", "from": ["active", "canceled"], "to": "expired"},
            {"name": "archive", "from": "*", "to": "archived",
             "transitionOptions": {"touch": false},
             "settings": {"allowForce": true}}
        ]);

        let table = TransitionTable::from_json(&json).unwrap();
        let archive = table.definitions("archive").next().unwrap();

        assert!(archive.from.is_wildcard());
        assert!(archive.settings.allow_force);
        assert_eq!(archive.transition_options, Some(serde_json::json!({"touch": false})));
        assert_eq!(names(table.states()), vec!["active", "canceled", "expired", "archived"]);
    }

    #[test]
    fn test_lookup() {
        let table = TransitionTable::compile(subscription_events()).unwrap();

        let def = table.lookup("cancel", &State::from("active")).unwrap();
        assert_eq!(def.to.as_str(), "canceled");

        // Multi-source
        assert!(table.lookup("expire", &State::from("active")).is_some());
        assert!(table.lookup("expire", &State::from("canceled")).is_some());

        // reactivate only from canceled
        assert!(table.lookup("reactivate", &State::from("active")).is_none());
        assert!(table.lookup("unknown", &State::from("active")).is_none());
    }

    #[test]
    fn test_explicit_wins_over_wildcard() {
        let table = TransitionTable::compile(vec![
            EventDefinition::new("close", "*", "closed"),
            EventDefinition::new("close", "draft", "discarded"),
        ])
        .unwrap();

        let def = table.lookup("close", &State::from("draft")).unwrap();
        assert_eq!(def.to.as_str(), "discarded");
        let def = table.lookup("close", &State::from("open")).unwrap();
        assert_eq!(def.to.as_str(), "closed");
    }

    #[test]
    fn test_events_from() {
        let table = TransitionTable::compile(subscription_events()).unwrap();

        assert_eq!(table.events_from(&State::from("active")), vec!["cancel", "expire"]);
        assert_eq!(
            table.transitions_from(&State::from("canceled")),
            vec![("reactivate", &State::from("active")), ("expire", &State::from("expired"))]
        );
    }

    #[test]
    fn test_validate_state() {
        let table = TransitionTable::compile(subscription_events()).unwrap();

        assert!(table.validate_state("canceled").is_ok());
        assert!(matches!(
            table.validate_state("paused"),
            Err(CoreError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_duplicate_transition_rejected() {
        let result = TransitionTable::compile(vec![
            EventDefinition::new("cancel", "active", "canceled"),
            EventDefinition::new("cancel", ["paused", "active"], "void"),
        ]);
        assert!(matches!(result, Err(CoreError::InvalidDefinition { .. })));
    }

    #[test]
    fn test_invalid_definitions() {
        assert!(TransitionTable::compile(vec![]).is_err());
        assert!(TransitionTable::compile(vec![EventDefinition::new("", "a", "b")]).is_err());
        assert!(TransitionTable::compile(vec![EventDefinition::new("go", "a", "*")]).is_err());

        let no_origin = EventDefinition {
            from: Origin::States(vec![]),
            ..EventDefinition::new("go", "a", "b")
        };
        assert!(TransitionTable::compile(vec![no_origin]).is_err());
    }

    #[test]
    fn test_compile_is_deterministic() {
        let a = TransitionTable::compile(subscription_events()).unwrap();
        let b = TransitionTable::compile(subscription_events()).unwrap();

        assert_eq!(a.states(), b.states());
        assert_eq!(a.event_names(), b.event_names());
        assert_eq!(a.checksum(), b.checksum());
    }

    fn arb_events() -> impl Strategy<Value = Vec<EventDefinition>> {
        let state = prop::sample::select(vec!["a", "b", "c", "d", "*"]);
        let target = prop::sample::select(vec!["a", "b", "c", "d"]);
        let name = prop::sample::select(vec!["go", "stop", "reset", "retry"]);
        prop::collection::vec(
            (name, prop::collection::vec(state, 1..3), target),
            1..12,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .map(|(name, from, to)| EventDefinition {
                    from: if from.contains(&WILDCARD) {
                        Origin::Any
                    } else {
                        Origin::States(from.into_iter().map(State::from).collect())
                    },
                    ..EventDefinition::new(name, "x", to)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn prop_derived_states_unique_and_complete(events in arb_events()) {
            let states = derive_states(&events);
            let unique: HashSet<_> = states.iter().collect();
            prop_assert_eq!(unique.len(), states.len());
            prop_assert!(states.iter().all(|s| s.as_str() != WILDCARD));

            for event in &events {
                prop_assert!(states.contains(&event.to));
                for from in event.from.states() {
                    prop_assert!(states.contains(from));
                }
            }
        }

        #[test]
        fn prop_event_names_first_occurrence_order(events in arb_events()) {
            let derived = derive_event_names(&events);
            let mut expected: Vec<String> = Vec::new();
            for event in &events {
                if !expected.contains(&event.name) {
                    expected.push(event.name.clone());
                }
            }
            prop_assert_eq!(derived, expected);
        }

        #[test]
        fn prop_derivation_is_idempotent(events in arb_events()) {
            prop_assert_eq!(derive_states(&events), derive_states(&events));
            prop_assert_eq!(derive_event_names(&events), derive_event_names(&events));
        }
    }
}
