use serde::{Deserialize, Serialize};

/// Default telnet port for the integration protocol
pub const DEFAULT_PORT: u16 = 23;

/// Motion state of a shade group, matching the window-covering convention
/// (0 = decreasing, 1 = increasing, 2 = stopped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionState {
    Decreasing = 0,
    Increasing = 1,
    Stopped = 2,
}

impl PositionState {
    /// Map a raw status parameter to a motion state.
    ///
    /// Returns `None` for values outside the wire encoding, which callers
    /// treat as a malformed report.
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Decreasing),
            1 => Some(Self::Increasing),
            2 => Some(Self::Stopped),
            _ => None,
        }
    }
}

/// The physical kind of covering behind a shade group.
///
/// The kind is a tagged variant rather than a trait hierarchy; the only
/// behavioral difference is whether tilt is exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadeKind {
    /// Horizontal slats; supports tilt
    VenetianBlind,
    /// Fabric on a roller; no tilt
    RollerShade,
    /// Anything else; no tilt
    Generic,
}

impl ShadeKind {
    /// Select a kind from the configuration string used by the original
    /// plugin. Unrecognized labels fall back to [`ShadeKind::Generic`].
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "venetian blinds" | "venetian blind" => Self::VenetianBlind,
            "roller shade" => Self::RollerShade,
            _ => Self::Generic,
        }
    }

    /// Whether tilt queries, commands, and state are exposed at all
    pub fn supports_tilt(&self) -> bool {
        matches!(self, Self::VenetianBlind)
    }
}

/// Credentials and address of one processor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
}

/// Configuration for one shade group accessory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShadeConfig {
    /// Display name for the embedding application
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Address of the shade group on the integration bus
    pub integration_id: u32,
    /// Kind label, e.g. "venetian blinds" or "roller shade"
    #[serde(default)]
    pub shade_type: String,
}

impl ShadeConfig {
    /// The credential tuple this shade's connection is keyed by
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }

    /// The shade kind selected by the `shade_type` label
    pub fn kind(&self) -> ShadeKind {
        ShadeKind::from_label(&self.shade_type)
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
