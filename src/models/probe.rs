use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use super::endpoint::{Endpoint, HttpMethod};
use super::payload::Payload;

/// Lifecycle state of a probe. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeState {
    Pending,
    InFlight,
    Completed,
    Failed,
    TimedOut,
}

impl ProbeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::TimedOut)
    }

    /// Validate a state transition. Pending -> InFlight -> terminal only.
    pub fn transition(self, next: ProbeState) -> Result<ProbeState, InvalidTransition> {
        let allowed = match (self, next) {
            (Self::Pending, Self::InFlight) => true,
            (Self::InFlight, s) if s.is_terminal() => true,
            _ => false,
        };
        if allowed {
            Ok(next)
        } else {
            Err(InvalidTransition { from: self, to: next })
        }
    }
}

impl fmt::Display for ProbeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timed_out",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: ProbeState,
    pub to: ProbeState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid probe transition {} -> {}", self.from, self.to)
    }
}

/// A fully built HTTP request for one probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestDescriptor {
    pub method: HttpMethod,
    pub url: String,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// What came back from the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
    pub elapsed_ms: u64,
}

/// The terminal result of a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Completed { response: ProbeResponse },
    Failed { error: String, attempts: u32 },
    TimedOut { timeout_ms: u64 },
}

impl ProbeOutcome {
    pub fn state(&self) -> ProbeState {
        match self {
            Self::Completed { .. } => ProbeState::Completed,
            Self::Failed { .. } => ProbeState::Failed,
            Self::TimedOut { .. } => ProbeState::TimedOut,
        }
    }
}

/// One scheduled unit of work.
#[derive(Debug, Clone)]
pub struct Probe {
    pub id: usize,
    pub endpoint: Arc<Endpoint>,
    /// `None` for a baseline probe carrying only benign values.
    pub payload: Option<Arc<Payload>>,
    pub request: RequestDescriptor,
    state: ProbeState,
}

impl Probe {
    pub fn new(id: usize, endpoint: Arc<Endpoint>, payload: Option<Arc<Payload>>, request: RequestDescriptor) -> Self {
        Self { id, endpoint, payload, request, state: ProbeState::Pending }
    }

    pub fn state(&self) -> ProbeState {
        self.state
    }

    pub fn advance(&mut self, next: ProbeState) -> Result<(), InvalidTransition> {
        self.state = self.state.transition(next)?;
        Ok(())
    }

    pub fn is_baseline(&self) -> bool {
        self.payload.is_none()
    }
}

/// A probe that reached a terminal state.
#[derive(Debug, Clone)]
pub struct ProbeRecord {
    pub probe: Probe,
    pub outcome: ProbeOutcome,
}
