//! EC2 network client
//!
//! Implements [`Ec2NetworkClientTrait`] on top of `aws-sdk-ec2`. Credentials
//! come from the Machine's auth secret rather than the pod environment, so
//! they are supplied as a static provider.

use crate::ec2_trait::Ec2NetworkClientTrait;
use crate::error::{from_sdk, Ec2Error};
use crate::types::SecurityGroupSummary;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_credential_types::Credentials;
use aws_sdk_ec2::types::Filter;
use tracing::{debug, info};

/// Provider name attached to credentials built from a secret
const CREDENTIALS_PROVIDER: &str = "machine-auth-secret";

/// EC2 client bound to one region
#[derive(Debug, Clone)]
pub struct Ec2NetworkClient {
    client: aws_sdk_ec2::Client,
    region: String,
}

impl Ec2NetworkClient {
    /// Create a client from a static access key pair.
    pub async fn new(region: &str, access_key_id: &str, secret_access_key: &str) -> Self {
        let credentials = Credentials::new(
            access_key_id,
            secret_access_key,
            None,
            None,
            CREDENTIALS_PROVIDER,
        );
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .load()
            .await;
        Self::from_sdk_config(&config, region)
    }

    /// Create a client from an already loaded SDK config.
    pub fn from_sdk_config(config: &SdkConfig, region: &str) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(config),
            region: region.to_string(),
        }
    }

    fn vpc_filter(vpc_id: &str) -> Filter {
        Filter::builder().name("vpc-id").values(vpc_id).build()
    }
}

#[async_trait::async_trait]
impl Ec2NetworkClientTrait for Ec2NetworkClient {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_vpc(&self, cidr_block: &str) -> Result<String, Ec2Error> {
        let output = self
            .client
            .create_vpc()
            .cidr_block(cidr_block)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        let vpc_id = output
            .vpc()
            .and_then(|v| v.vpc_id())
            .ok_or(Ec2Error::MissingField("vpc.vpcId"))?
            .to_string();
        info!(vpc_id = %vpc_id, cidr = %cidr_block, "Created VPC");
        Ok(vpc_id)
    }

    async fn vpc_state(&self, vpc_id: &str) -> Result<Option<String>, Ec2Error> {
        let output = self
            .client
            .describe_vpcs()
            .vpc_ids(vpc_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        Ok(output
            .vpcs()
            .first()
            .and_then(|v| v.state())
            .map(|s| s.as_str().to_string()))
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), Ec2Error> {
        self.client
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        info!(vpc_id = %vpc_id, "Deleted VPC");
        Ok(())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        cidr_block: &str,
        availability_zone: &str,
    ) -> Result<String, Ec2Error> {
        let output = self
            .client
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr_block)
            .availability_zone(availability_zone)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        let subnet_id = output
            .subnet()
            .and_then(|s| s.subnet_id())
            .ok_or(Ec2Error::MissingField("subnet.subnetId"))?
            .to_string();
        info!(subnet_id = %subnet_id, vpc_id = %vpc_id, az = %availability_zone, "Created subnet");
        Ok(subnet_id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), Ec2Error> {
        self.client
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        info!(subnet_id = %subnet_id, "Deleted subnet");
        Ok(())
    }

    async fn create_internet_gateway(&self) -> Result<String, Ec2Error> {
        let output = self
            .client
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        let gateway_id = output
            .internet_gateway()
            .and_then(|g| g.internet_gateway_id())
            .ok_or(Ec2Error::MissingField("internetGateway.internetGatewayId"))?
            .to_string();
        info!(gateway_id = %gateway_id, "Created internet gateway");
        Ok(gateway_id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
        self.client
            .attach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        debug!(gateway_id = %gateway_id, vpc_id = %vpc_id, "Attached internet gateway");
        Ok(())
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
        self.client
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        debug!(gateway_id = %gateway_id, vpc_id = %vpc_id, "Detached internet gateway");
        Ok(())
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), Ec2Error> {
        self.client
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        info!(gateway_id = %gateway_id, "Deleted internet gateway");
        Ok(())
    }

    async fn main_route_table(&self, vpc_id: &str) -> Result<String, Ec2Error> {
        let output = self
            .client
            .describe_route_tables()
            .filters(Self::vpc_filter(vpc_id))
            .filters(Filter::builder().name("association.main").values("true").build())
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        output
            .route_tables()
            .first()
            .and_then(|rt| rt.route_table_id())
            .map(str::to_string)
            .ok_or_else(|| Ec2Error::NotFound(format!("main route table for VPC {vpc_id}")))
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<(), Ec2Error> {
        self.client
            .create_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        debug!(route_table_id = %route_table_id, destination = %destination_cidr, gateway_id = %gateway_id, "Created route");
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<(), Ec2Error> {
        self.client
            .delete_route()
            .route_table_id(route_table_id)
            .destination_cidr_block(destination_cidr)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        debug!(route_table_id = %route_table_id, destination = %destination_cidr, "Deleted route");
        Ok(())
    }

    async fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroupSummary>, Ec2Error> {
        let output = self
            .client
            .describe_security_groups()
            .filters(Self::vpc_filter(vpc_id))
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        Ok(output
            .security_groups()
            .iter()
            .filter_map(|sg| {
                Some(SecurityGroupSummary {
                    group_id: sg.group_id()?.to_string(),
                    group_name: sg.group_name().unwrap_or_default().to_string(),
                })
            })
            .collect())
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), Ec2Error> {
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| from_sdk(&e))?;
        info!(group_id = %group_id, "Deleted security group");
        Ok(())
    }
}
