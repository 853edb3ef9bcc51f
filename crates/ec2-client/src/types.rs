//! EC2 model types

/// VPC state reported once the VPC can be used
pub const VPC_STATE_AVAILABLE: &str = "available";

/// Name AWS gives the security group created with every VPC
pub const DEFAULT_SECURITY_GROUP: &str = "default";

/// Security group as listed for a VPC
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityGroupSummary {
    pub group_id: String,
    pub group_name: String,
}

impl SecurityGroupSummary {
    /// The VPC's default group, which is deleted together with the VPC.
    pub fn is_default(&self) -> bool {
        self.group_name == DEFAULT_SECURITY_GROUP
    }
}
