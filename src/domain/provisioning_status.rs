use crate::domain::ProvisioningStatus::*;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

#[derive(PartialEq, Eq, Hash, Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningStatus {
    AwaitingApproval,
    ApprovalPendingRequestReceived,
    ScriptGenerated,
    ProvisioningComplete,
}

impl ProvisioningStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwaitingApproval => "awaiting_approval",
            ApprovalPendingRequestReceived => "approval_pending_request_received",
            ScriptGenerated => "script_generated",
            ProvisioningComplete => "provisioning_complete",
        }
    }

    /// The transition table. Whether the device is approved is checked by the record itself,
    /// this only answers whether the edge exists.
    pub fn can_transition_to(&self, next: ProvisioningStatus) -> bool {
        match (self, next) {
            // Re-registration and revocation reset from anywhere
            (_, AwaitingApproval) => true,
            (AwaitingApproval | ApprovalPendingRequestReceived | ScriptGenerated, ApprovalPendingRequestReceived) => true,
            (AwaitingApproval | ApprovalPendingRequestReceived | ScriptGenerated, ScriptGenerated) => true,
            (ScriptGenerated | ProvisioningComplete, ProvisioningComplete) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProvisioningComplete)
    }
}

impl Display for ProvisioningStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProvisioningStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "awaiting_approval" => Ok(AwaitingApproval),
            "approval_pending_request_received" => Ok(ApprovalPendingRequestReceived),
            "script_generated" => Ok(ScriptGenerated),
            "provisioning_complete" => Ok(ProvisioningComplete),
            other => Err(format!("unknown provisioning status '{}'", other)),
        }
    }
}
