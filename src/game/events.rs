//! Event Vocabulary
//!
//! Fixed set of signal names the queue accepts, plus positional argument
//! decoding. Arguments stay as JSON values so local input and inbound
//! channel messages travel the same path.

use std::fmt;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Serialize, Deserialize};
use serde_json::Value;
use thiserror::Error;

/// Registered event names.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    /// `NEW_ENTITY(eid, name, textureKey, pos)`
    NewEntity,
    /// `MOVE_ENTITY(eid, dx, dy)`
    MoveEntity,
    /// `MOVE_TO(eid, x, y)`
    MoveTo,
    /// `RERENDER()`
    Rerender,
    /// `TOGGLE_UI()`
    ToggleUi,
    /// `INIT_MAP()`
    InitMap,
    /// `DEBUG_MSG(text)`
    DebugMsg,
    /// `UI_SELECT(code)`
    UiSelect,
    /// `UI_INPUT(char | code)`
    UiInput,
    /// `UPDATE_ENTITY(eid)`
    UpdateEntity,
}

impl Signal {
    /// Every signal, in declaration order.
    pub const ALL: [Signal; 10] = [
        Signal::NewEntity,
        Signal::MoveEntity,
        Signal::MoveTo,
        Signal::Rerender,
        Signal::ToggleUi,
        Signal::InitMap,
        Signal::DebugMsg,
        Signal::UiSelect,
        Signal::UiInput,
        Signal::UpdateEntity,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Signal::NewEntity => "NEW_ENTITY",
            Signal::MoveEntity => "MOVE_ENTITY",
            Signal::MoveTo => "MOVE_TO",
            Signal::Rerender => "RERENDER",
            Signal::ToggleUi => "TOGGLE_UI",
            Signal::InitMap => "INIT_MAP",
            Signal::DebugMsg => "DEBUG_MSG",
            Signal::UiSelect => "UI_SELECT",
            Signal::UiInput => "UI_INPUT",
            Signal::UpdateEntity => "UPDATE_ENTITY",
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized signal name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown signal: {0}")]
pub struct UnknownSignal(pub String);

impl FromStr for Signal {
    type Err = UnknownSignal;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Signal::ALL
            .iter()
            .copied()
            .find(|signal| signal.as_str() == s)
            .ok_or_else(|| UnknownSignal(s.to_string()))
    }
}

/// Where an event came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    /// Produced on this client (input, mode setup, lookup continuation).
    Local,
    /// Received from the synchronization channel.
    Remote,
}

/// Handler failures. Logged by the queue; never stop a drain.
#[derive(Debug, Error)]
pub enum EventError {
    /// Arguments did not match the signal's shape.
    #[error("bad arguments for {signal}: {source}")]
    BadArguments {
        /// Signal being handled.
        signal: Signal,
        /// Decode failure.
        #[source]
        source: serde_json::Error,
    },

    /// Referenced entity is not in the local projection.
    #[error("{signal} references unknown entity {eid}")]
    UnknownEntity {
        /// Signal being handled.
        signal: Signal,
        /// Missing id.
        eid: u64,
    },
}

/// Decode positional arguments into a tuple (or any type that deserializes
/// from a JSON array). Tuple arity must match the argument count.
pub fn decode_args<T: DeserializeOwned>(signal: Signal, params: &[Value]) -> Result<T, EventError> {
    serde_json::from_value(Value::Array(params.to_vec()))
        .map_err(|source| EventError::BadArguments { signal, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_signal_round_trip_names() {
        for signal in Signal::ALL {
            assert_eq!(signal.as_str().parse::<Signal>().unwrap(), signal);
            let json = serde_json::to_value(signal).unwrap();
            assert_eq!(json, json!(signal.as_str()));
        }
        assert!("PAINT_MAP".parse::<Signal>().is_err());
    }

    #[test]
    fn test_decode_args() {
        let params = vec![json!(1), json!(-1), json!(0)];
        let (eid, dx, dy): (u64, i32, i32) = decode_args(Signal::MoveEntity, &params).unwrap();
        assert_eq!((eid, dx, dy), (1, -1, 0));

        let short = vec![json!(1)];
        let err = decode_args::<(u64, i32, i32)>(Signal::MoveEntity, &short);
        assert!(matches!(err, Err(EventError::BadArguments { signal: Signal::MoveEntity, .. })));
    }
}
