//! Replay events
//!
//! Everything moved through the replay engine implements [`ReplayEvent`]. The
//! engine only ever looks at [`ReplayEvent::event_time`]; the rest of the
//! payload is opaque to it.
//!
//! [`Event`] is the built-in payload set for telemetry sessions: location
//! fixes, status probes, route changes, and caller-defined custom events.

use serde::{Deserialize, Serialize};

/// A timestamped unit of replayed telemetry.
pub trait ReplayEvent {
    /// Position of this event on the timeline, in seconds.
    ///
    /// Commonly Unix-epoch seconds, but only differences between events are
    /// ever observable.
    fn event_time(&self) -> f64;

    /// Whether this event is a location fix.
    fn is_location_update(&self) -> bool {
        false
    }
}

/// A location fix.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocationUpdate {
    #[serde(default)]
    pub event_time: f64,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_horizontal: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bearing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

impl LocationUpdate {
    pub fn new(event_time: f64, lat: f64, lon: f64) -> Self {
        Self {
            event_time,
            lat,
            lon,
            provider: None,
            altitude: None,
            accuracy_horizontal: None,
            bearing: None,
            speed: None,
        }
    }

    /// Set the reporting provider (e.g. "gps", "fused").
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Set bearing (degrees) and speed (m/s).
    pub fn with_motion(mut self, bearing: f64, speed: f64) -> Self {
        self.bearing = Some(bearing);
        self.speed = Some(speed);
        self
    }
}

/// A status probe: the client asked for its current status.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusProbe {
    #[serde(default)]
    pub event_time: f64,
}

/// A new route was set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RouteSet {
    #[serde(default)]
    pub event_time: f64,
    /// Opaque route document, `None` when the route was cleared.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<serde_json::Value>,
}

/// A caller-defined event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustomEvent {
    #[serde(default)]
    pub event_time: f64,
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// Built-in telemetry event set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Event {
    UpdateLocation(LocationUpdate),
    GetStatus(StatusProbe),
    SetRoute(RouteSet),
    Custom(CustomEvent),
}

impl Event {
    pub fn location(event_time: f64, lat: f64, lon: f64) -> Self {
        Event::UpdateLocation(LocationUpdate::new(event_time, lat, lon))
    }

    pub fn status(event_time: f64) -> Self {
        Event::GetStatus(StatusProbe { event_time })
    }

    pub fn route(event_time: f64, route: Option<serde_json::Value>) -> Self {
        Event::SetRoute(RouteSet { event_time, route })
    }

    pub fn custom(event_time: f64, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Event::Custom(CustomEvent {
            event_time,
            kind: kind.into(),
            payload,
        })
    }

    /// Short name of the variant, as used in logs.
    pub fn kind_name(&self) -> &str {
        match self {
            Event::UpdateLocation(_) => "updateLocation",
            Event::GetStatus(_) => "getStatus",
            Event::SetRoute(_) => "setRoute",
            Event::Custom(e) => &e.kind,
        }
    }
}

impl ReplayEvent for Event {
    fn event_time(&self) -> f64 {
        match self {
            Event::UpdateLocation(e) => e.event_time,
            Event::GetStatus(e) => e.event_time,
            Event::SetRoute(e) => e.event_time,
            Event::Custom(e) => e.event_time,
        }
    }

    fn is_location_update(&self) -> bool {
        matches!(self, Event::UpdateLocation(_))
    }
}

impl From<LocationUpdate> for Event {
    fn from(location: LocationUpdate) -> Self {
        Event::UpdateLocation(location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_time_per_variant() {
        assert_eq!(Event::location(1.5, 0.0, 0.0).event_time(), 1.5);
        assert_eq!(Event::status(2.0).event_time(), 2.0);
        assert_eq!(Event::route(3.0, None).event_time(), 3.0);
        assert_eq!(
            Event::custom(4.0, "push", serde_json::Value::Null).event_time(),
            4.0
        );
    }

    #[test]
    fn test_location_classification() {
        assert!(Event::location(0.0, 1.0, 2.0).is_location_update());
        assert!(!Event::status(0.0).is_location_update());
        assert!(!Event::custom(0.0, "updateLocation", serde_json::Value::Null).is_location_update());
    }

    #[test]
    fn test_serialized_tag() {
        let json = serde_json::to_value(Event::status(1.0)).unwrap();
        assert_eq!(json["type"], "getStatus");
        assert_eq!(json["event_time"], 1.0);
    }
}
