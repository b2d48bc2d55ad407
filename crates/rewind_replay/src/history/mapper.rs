//! Record-to-event translation.
//!
//! Lookup order for a record:
//! 1. the entry registered for its kind (a translator, or an explicit drop)
//! 2. custom matchers, in registration order, first match wins
//! 3. the fallback

use rustc_hash::FxHashMap;
use serde::Deserialize;

use super::record::RawRecord;
use crate::event::{Event, LocationUpdate};

type Translator<E> = Box<dyn Fn(&RawRecord) -> Option<E> + Send + Sync>;
type Predicate = Box<dyn Fn(&RawRecord) -> bool + Send + Sync>;

enum KindRule<E> {
    Map(Translator<E>),
    Drop,
}

/// What happens to records nothing else matched.
pub enum Fallback<E> {
    /// Drop them.
    Drop,
    /// Translate them with this function.
    PassThrough(Translator<E>),
}

/// Registry of per-kind translation functions.
pub struct EventMapper<E> {
    kinds: FxHashMap<String, KindRule<E>>,
    custom: Vec<(Predicate, Translator<E>)>,
    fallback: Fallback<E>,
}

impl<E> EventMapper<E> {
    /// An empty mapper that drops everything.
    pub fn new() -> Self {
        Self {
            kinds: FxHashMap::default(),
            custom: Vec::new(),
            fallback: Fallback::Drop,
        }
    }

    /// Translate records of `kind` with `translate`. Replaces any earlier entry.
    pub fn map_kind<F>(&mut self, kind: impl Into<String>, translate: F) -> &mut Self
    where
        F: Fn(&RawRecord) -> Option<E> + Send + Sync + 'static,
    {
        self.kinds
            .insert(kind.into(), KindRule::Map(Box::new(translate)));
        self
    }

    /// Always drop records of `kind`.
    pub fn disable_kind(&mut self, kind: impl Into<String>) -> &mut Self {
        self.kinds.insert(kind.into(), KindRule::Drop);
        self
    }

    /// Append a custom matcher, tried after kind entries.
    pub fn map_custom<P, F>(&mut self, matches: P, translate: F) -> &mut Self
    where
        P: Fn(&RawRecord) -> bool + Send + Sync + 'static,
        F: Fn(&RawRecord) -> Option<E> + Send + Sync + 'static,
    {
        self.custom.push((Box::new(matches), Box::new(translate)));
        self
    }

    /// Set how unmatched records are handled.
    pub fn set_fallback(&mut self, fallback: Fallback<E>) -> &mut Self {
        self.fallback = fallback;
        self
    }

    /// Builder form of [`set_fallback`](Self::set_fallback).
    pub fn with_fallback(mut self, fallback: Fallback<E>) -> Self {
        self.fallback = fallback;
        self
    }

    /// Whether `kind` has its own entry.
    pub fn handles_kind(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Translate `record`, or `None` to drop it.
    pub fn map(&self, record: &RawRecord) -> Option<E> {
        if let Some(rule) = self.kinds.get(record.kind.as_str()) {
            return match rule {
                KindRule::Map(translate) => translate(record),
                KindRule::Drop => None,
            };
        }

        if let Some((_, translate)) = self.custom.iter().find(|(matches, _)| matches(record)) {
            return translate(record);
        }

        match &self.fallback {
            Fallback::Drop => None,
            Fallback::PassThrough(translate) => translate(record),
        }
    }
}

impl<E> Default for EventMapper<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl EventMapper<Event> {
    /// Mapper for the built-in telemetry kinds.
    ///
    /// `updateLocation`, `getStatus` and `setRoute` become their [`Event`]
    /// variants; any other kind passes through as [`Event::Custom`].
    pub fn standard() -> Self {
        let mut mapper = Self::new();
        mapper
            .map_kind("updateLocation", map_location)
            .map_kind("getStatus", |record| Some(Event::status(record.event_time)))
            .map_kind("setRoute", |record| {
                let route = record
                    .payload
                    .get("route")
                    .filter(|route| !route.is_null())
                    .cloned();
                Some(Event::route(record.event_time, route))
            })
            .set_fallback(Fallback::PassThrough(Box::new(|record: &RawRecord| {
                Some(Event::custom(
                    record.event_time,
                    record.kind.clone(),
                    record.payload.clone(),
                ))
            })));
        mapper
    }
}

/// Location fields live either inline or under a nested `location` object.
fn map_location(record: &RawRecord) -> Option<Event> {
    let source = record.payload.get("location").unwrap_or(&record.payload);
    match LocationUpdate::deserialize(source) {
        Ok(mut location) => {
            location.event_time = record.event_time;
            Some(Event::UpdateLocation(location))
        }
        Err(err) => {
            tracing::warn!(event_time = record.event_time, error = %err, "dropping malformed location record");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReplayEvent;
    use serde_json::json;

    fn record(kind: &str, event_time: f64, payload: serde_json::Value) -> RawRecord {
        RawRecord::new(kind, event_time, payload)
    }

    #[test]
    fn test_empty_mapper_drops() {
        let mapper: EventMapper<Event> = EventMapper::new();
        assert_eq!(mapper.map(&record("getStatus", 1.0, json!({}))), None);
    }

    #[test]
    fn test_standard_kinds() {
        let mapper = EventMapper::standard();

        let location = mapper
            .map(&record(
                "updateLocation",
                3.0,
                json!({"kind": "updateLocation", "event_time": 3.0, "lat": 59.3, "lon": 18.0}),
            ))
            .unwrap();
        assert!(location.is_location_update());
        assert_eq!(location.event_time(), 3.0);

        let status = mapper.map(&record("getStatus", 4.0, json!({}))).unwrap();
        assert_eq!(status, Event::status(4.0));

        let route = mapper
            .map(&record("setRoute", 5.0, json!({"route": null})))
            .unwrap();
        assert_eq!(route, Event::route(5.0, None));
    }

    #[test]
    fn test_nested_location() {
        let mapper = EventMapper::standard();
        let event = mapper
            .map(&record(
                "updateLocation",
                9.0,
                json!({"location": {"lat": 1.0, "lon": 2.0, "provider": "gps"}}),
            ))
            .unwrap();

        match event {
            Event::UpdateLocation(loc) => {
                assert_eq!(loc.event_time, 9.0);
                assert_eq!(loc.provider.as_deref(), Some("gps"));
            }
            other => panic!("expected location, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_location_is_dropped() {
        let mapper = EventMapper::standard();
        assert_eq!(mapper.map(&record("updateLocation", 1.0, json!({"lat": "north"}))), None);
    }

    #[test]
    fn test_unknown_kind_passes_through() {
        let mapper = EventMapper::standard();
        let event = mapper.map(&record("pushHistory", 2.0, json!({"x": 1}))).unwrap();
        assert_eq!(event.kind_name(), "pushHistory");
    }

    #[test]
    fn test_disabled_kind_wins_over_fallback() {
        let mut mapper = EventMapper::standard();
        mapper.disable_kind("getStatus");
        assert_eq!(mapper.map(&record("getStatus", 1.0, json!({}))), None);
    }

    #[test]
    fn test_custom_matchers_first_match_wins() {
        let mut mapper: EventMapper<Event> = EventMapper::new();
        mapper
            .map_custom(
                |r| r.kind.starts_with("push"),
                |r| Some(Event::custom(r.event_time, "first", serde_json::Value::Null)),
            )
            .map_custom(
                |r| r.kind == "pushHistory",
                |r| Some(Event::custom(r.event_time, "second", serde_json::Value::Null)),
            );

        let event = mapper.map(&record("pushHistory", 1.0, json!({}))).unwrap();
        assert_eq!(event.kind_name(), "first");
        assert_eq!(mapper.map(&record("other", 1.0, json!({}))), None);
    }

    #[test]
    fn test_kind_entry_beats_custom_matcher() {
        let mut mapper: EventMapper<Event> = EventMapper::new();
        mapper
            .map_custom(|_| true, |_| None)
            .map_kind("getStatus", |r| Some(Event::status(r.event_time)));

        assert!(mapper.handles_kind("getStatus"));
        assert_eq!(
            mapper.map(&record("getStatus", 1.0, json!({}))),
            Some(Event::status(1.0))
        );
    }
}
