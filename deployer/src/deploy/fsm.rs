//! Finite state machine for one deployment run
//!
//! Progression is fixed per deployment kind and never branches back. Any
//! non-terminal state may fail; `Failed` and `Completed` absorb.

use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentKind;

/// Deployment state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DeploymentState {
    /// Request accepted, nothing done yet
    Idle,

    /// Device accepted the credentials
    ConnectivityVerified,

    /// Code and certificates staged in the workspace
    CodeOrCertStaged,

    /// Connection parameters written for the device
    ResourceInfoWritten,

    /// Device has room for the payload
    CapacityVerified,

    /// Payload copied to the device
    Transferred,

    /// Result handed back
    Completed,

    /// Absorbing failure state
    Failed,
}

impl DeploymentState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeploymentState::Completed | DeploymentState::Failed)
    }
}

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    ConnectivityVerified,
    Staged,
    ResourceInfoWritten,
    CapacityVerified,
    Transferred,
    Complete,
    Fail(String),
}

/// Fixed step sequence of a deployment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentPlan {
    /// Sample code and resources write connection parameters
    WithResourceInfo,

    /// User functions carry no connection parameters
    CodeOnly,
}

impl DeploymentPlan {
    pub fn for_kind(kind: &DeploymentKind) -> Self {
        match kind {
            DeploymentKind::UserFunction { .. } => DeploymentPlan::CodeOnly,
            DeploymentKind::SampleCode { .. }
            | DeploymentKind::InferredSampleCode { .. }
            | DeploymentKind::Resources { .. } => DeploymentPlan::WithResourceInfo,
        }
    }

    /// States a successful run passes through, in order
    pub fn states(&self) -> &'static [DeploymentState] {
        match self {
            DeploymentPlan::WithResourceInfo => &[
                DeploymentState::Idle,
                DeploymentState::ConnectivityVerified,
                DeploymentState::CodeOrCertStaged,
                DeploymentState::ResourceInfoWritten,
                DeploymentState::CapacityVerified,
                DeploymentState::Transferred,
                DeploymentState::Completed,
            ],
            DeploymentPlan::CodeOnly => &[
                DeploymentState::Idle,
                DeploymentState::ConnectivityVerified,
                DeploymentState::CodeOrCertStaged,
                DeploymentState::CapacityVerified,
                DeploymentState::Transferred,
                DeploymentState::Completed,
            ],
        }
    }
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    plan: DeploymentPlan,
    state: DeploymentState,
    failed_from: Option<DeploymentState>,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in idle state
    pub fn new(plan: DeploymentPlan) -> Self {
        Self {
            plan,
            state: DeploymentState::Idle,
            failed_from: None,
            error: None,
        }
    }

    pub fn plan(&self) -> DeploymentPlan {
        self.plan
    }

    /// Get current state
    pub fn state(&self) -> DeploymentState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// State the run was in when it failed
    pub fn failed_from(&self) -> Option<DeploymentState> {
        self.failed_from
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentState, String> {
        use DeploymentPlan::*;
        use DeploymentState as S;

        let new_state = match (self.plan, self.state, &event) {
            (_, state, DeploymentEvent::Fail(err)) if !state.is_terminal() => {
                self.error = Some(err.clone());
                self.failed_from = Some(state);
                S::Failed
            }

            (_, S::Idle, DeploymentEvent::ConnectivityVerified) => S::ConnectivityVerified,
            (_, S::ConnectivityVerified, DeploymentEvent::Staged) => S::CodeOrCertStaged,

            (WithResourceInfo, S::CodeOrCertStaged, DeploymentEvent::ResourceInfoWritten) => {
                S::ResourceInfoWritten
            }
            (WithResourceInfo, S::ResourceInfoWritten, DeploymentEvent::CapacityVerified) => {
                S::CapacityVerified
            }
            (CodeOnly, S::CodeOrCertStaged, DeploymentEvent::CapacityVerified) => {
                S::CapacityVerified
            }

            (_, S::CapacityVerified, DeploymentEvent::Transferred) => S::Transferred,
            (_, S::Transferred, DeploymentEvent::Complete) => S::Completed,

            // Invalid transitions
            (plan, state, event) => {
                return Err(format!(
                    "Invalid transition: {:?} -> {:?} ({:?})",
                    state, event, plan
                ));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}
