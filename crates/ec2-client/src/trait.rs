//! Ec2NetworkClient trait for mocking
//!
//! The controller only talks to EC2 through this trait so that the network
//! graph builder can be exercised against an in-memory fake.

use crate::error::Ec2Error;
use crate::types::SecurityGroupSummary;

/// Operations needed to build and tear down a machine's network prerequisites.
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait Ec2NetworkClientTrait: Send + Sync {
    /// Region the client is bound to
    fn region(&self) -> &str;

    // VPC
    async fn create_vpc(&self, cidr_block: &str) -> Result<String, Ec2Error>;
    /// Current state of the VPC, `None` if it is not returned by EC2
    async fn vpc_state(&self, vpc_id: &str) -> Result<Option<String>, Ec2Error>;
    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), Ec2Error>;

    // Subnet
    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &str,
        availability_zone: &str,
    ) -> Result<String, Ec2Error>;
    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), Ec2Error>;

    // Internet gateway
    async fn create_internet_gateway(&self) -> Result<String, Ec2Error>;
    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error>;
    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error>;
    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), Ec2Error>;

    // Routing
    /// ID of the VPC's main route table
    async fn main_route_table(&self, vpc_id: &str) -> Result<String, Ec2Error>;
    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<(), Ec2Error>;
    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<(), Ec2Error>;

    // Security groups
    async fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroupSummary>, Ec2Error>;
    async fn delete_security_group(&self, group_id: &str) -> Result<(), Ec2Error>;
}
