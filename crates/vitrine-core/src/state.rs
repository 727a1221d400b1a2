use serde::{Deserialize, Serialize};

/// Session lifecycle states.
///
/// `Starting → Active → Ending → Closed` is the normal path; `Failed` is
/// reached only when setup never produced a usable automation context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Starting,
    Active,
    Ending,
    Closed,
    Failed,
}

impl SessionState {
    /// Whether new input intents may still be dispatched.
    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Whether teardown has begun (or finished).
    pub fn is_teardown(&self) -> bool {
        matches!(self, Self::Ending | Self::Closed | Self::Failed)
    }

    /// Whether the session has reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Active => write!(f, "active"),
            Self::Ending => write!(f, "ending"),
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for SessionState {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "active" => Ok(Self::Active),
            "ending" => Ok(Self::Ending),
            "closed" => Ok(Self::Closed),
            "failed" => Ok(Self::Failed),
            other => Err(format!("unknown session state: {other}")),
        }
    }
}
