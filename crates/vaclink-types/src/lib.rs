use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Merged device telemetry: the last-known-good union of every field the
/// robot has ever reported. Keys are overwritten shallowly, never pruned.
pub type FieldMap = serde_json::Map<String, Value>;

/// Sender class of a decoded packet, taken from its `origin` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The vacuum itself, relayed through the proxy.
    Robot,
    /// The proxy's own control channel (not the robot).
    Local,
    /// The proxy's upstream cloud session.
    Server,
    /// This client. Used on outbound envelopes only.
    Ha,
    /// Anything unrecognised. Packets with this origin are dropped.
    #[serde(other)]
    Unknown,
}

impl Origin {
    /// Map an `origin` field value onto a variant. Unrecognised tags become
    /// [`Origin::Unknown`].
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "robot" => Origin::Robot,
            "local" => Origin::Local,
            "server" => Origin::Server,
            "ha" => Origin::Ha,
            _ => Origin::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Robot => "robot",
            Origin::Local => "local",
            Origin::Server => "server",
            Origin::Ha => "ha",
            Origin::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded inbound packet. Ephemeral: only its effects on the state store
/// survive dispatch.
#[derive(Debug, Clone)]
pub struct Packet {
    pub origin: Origin,
    pub body: Value,
}

impl Packet {
    /// Wrap a decoded JSON payload, classifying it by its `origin` field.
    pub fn from_value(body: Value) -> Self {
        let origin = body
            .get("origin")
            .and_then(Value::as_str)
            .map(Origin::from_tag)
            .unwrap_or(Origin::Unknown);
        Self { origin, body }
    }

    /// Serial number, when the payload carries one.
    pub fn sn(&self) -> Option<&str> {
        self.body.get("sn").and_then(Value::as_str)
    }

    /// `robot_connected` flag on robot-origin payloads.
    pub fn robot_connected(&self) -> Option<bool> {
        self.body.get("robot_connected").and_then(Value::as_bool)
    }

    /// `cloud_connected` flag on robot-origin payloads.
    pub fn cloud_connected(&self) -> Option<bool> {
        self.body.get("cloud_connected").and_then(Value::as_bool)
    }

    /// `connected` flag on local-origin payloads.
    pub fn local_connected(&self) -> Option<bool> {
        self.body.get("connected").and_then(Value::as_bool)
    }

    /// Select the telemetry fields to merge from a robot-origin payload.
    ///
    /// The proxy emits an incremental delta under `data.data` when one is
    /// available, and a full cached snapshot under `cache` when not. The
    /// selection rule is fixed: fall back to `cache` only when `data` is
    /// empty and `cache` is not; otherwise take `data.data`. Emptiness
    /// follows the upstream convention (absent, null, `false`, `0`, or an
    /// empty string/array/object all count as empty).
    pub fn telemetry(&self) -> Option<&FieldMap> {
        let data = self.body.get("data");
        let cache = self.body.get("cache");
        if !is_truthy(data) && is_truthy(cache) {
            cache.and_then(Value::as_object)
        } else {
            data.and_then(|d| d.get("data")).and_then(Value::as_object)
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(m)) => !m.is_empty(),
    }
}

/// Outbound command envelope: `{origin: "ha", infoType, sn, data}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub origin: Origin,
    #[serde(rename = "infoType")]
    pub info_type: u32,
    pub sn: Option<String>,
    pub data: Value,
}

impl CommandEnvelope {
    pub fn new(info_type: u32, sn: Option<String>, data: Value) -> Self {
        Self {
            origin: Origin::Ha,
            info_type,
            sn,
            data,
        }
    }
}

/// Notification unit fanned out to bridge observers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: BridgeEventKind,
}

impl BridgeEvent {
    pub fn now(kind: BridgeEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// What changed. Observers re-read the store rather than trusting stale
/// event payloads; the flags carried here are a convenience snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BridgeEventKind {
    /// Device telemetry was merged (robot-origin packet processed).
    StateUpdated,
    /// A connectivity flag flipped or a session was torn down.
    LinkChanged { robot: bool, cloud: bool },
}

/// Global error type spanning the codec, the transport, and the command path.
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Bad JSON inside a correctly length-delimited frame. Recoverable: the
    /// frame is dropped and the read loop continues.
    #[error("malformed frame payload: {0}")]
    MalformedFrame(#[from] serde_json::Error),

    /// The encoded payload does not fit the 16-bit length field.
    #[error("frame payload of {0} bytes exceeds the u16 length field")]
    OversizedPayload(usize),

    /// Socket error, truncated read, or EOF. Fatal to the current
    /// connection; the supervisor reconnects after its fixed delay.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A command was issued while no connection is established.
    #[error("not connected to the proxy")]
    NotConnected,

    /// The framed command could not be written to an established connection.
    #[error("command write failed: {0}")]
    WriteFailed(#[source] std::io::Error),
}

impl BridgeError {
    /// Whether the error is confined to a single frame. Frame-local errors
    /// are logged and skipped; everything else tears the connection down.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, BridgeError::MalformedFrame(_))
    }
}
