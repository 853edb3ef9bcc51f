//! Mock Ec2NetworkClient for unit testing
//!
//! Keeps VPCs, subnets, gateways, routes and security groups in memory and
//! enforces the same dependency rules EC2 does (a VPC cannot be deleted while
//! subnets, gateways or custom security groups still reference it). Every
//! call is recorded so tests can assert on ordering, and individual
//! operations can be made to fail with a given AWS error code.

use crate::ec2_trait::Ec2NetworkClientTrait;
use crate::error::{classify_ec2_error, Ec2Error};
use crate::types::{SecurityGroupSummary, DEFAULT_SECURITY_GROUP, VPC_STATE_AVAILABLE};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct MockState {
    next_id: u64,
    /// vpc id -> main route table id
    vpcs: HashMap<String, String>,
    /// subnet id -> vpc id
    subnets: HashMap<String, String>,
    /// gateway id -> attached vpc
    gateways: HashMap<String, Option<String>>,
    /// (route table, destination)
    routes: BTreeSet<(String, String)>,
    /// group id -> (vpc id, name)
    security_groups: HashMap<String, (String, String)>,
    /// Number of `vpc_state` calls that still report "pending"
    pending_polls: u32,
    /// operation -> (error code, sticky)
    failures: HashMap<String, (String, bool)>,
    calls: Vec<String>,
}

impl MockState {
    fn id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:08x}", self.next_id)
    }

    fn enter(&mut self, op: &str, arg: &str) -> Result<(), Ec2Error> {
        if arg.is_empty() {
            self.calls.push(op.to_string());
        } else {
            self.calls.push(format!("{op} {arg}"));
        }
        let Some((code, sticky)) = self.failures.get(op).cloned() else {
            return Ok(());
        };
        if !sticky {
            self.failures.remove(op);
        }
        Err(classify_ec2_error(
            Some(&code),
            Some(&format!("injected {op} failure")),
        ))
    }
}

fn not_found(code: &str, id: &str) -> Ec2Error {
    classify_ec2_error(Some(code), Some(&format!("The ID '{id}' does not exist")))
}

fn dependency(id: &str) -> Ec2Error {
    classify_ec2_error(
        Some("DependencyViolation"),
        Some(&format!("'{id}' has dependencies and cannot be deleted")),
    )
}

/// Mock EC2 client for testing
#[derive(Debug, Clone)]
pub struct MockEc2Client {
    region: String,
    state: Arc<Mutex<MockState>>,
}

impl MockEc2Client {
    /// Create a new mock client
    pub fn new(region: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Make the next call of `op` fail with `code`
    pub fn fail_next(&self, op: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op.to_string(), (code.to_string(), false));
    }

    /// Make every call of `op` fail with `code`
    pub fn fail_always(&self, op: &str, code: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(op.to_string(), (code.to_string(), true));
    }

    /// Clear injected failures
    pub fn clear_failures(&self) {
        self.state.lock().unwrap().failures.clear();
    }

    /// Report "pending" for the next `polls` VPC state queries
    pub fn set_pending_polls(&self, polls: u32) {
        self.state.lock().unwrap().pending_polls = polls;
    }

    /// Add a custom security group to a VPC (for test setup)
    pub fn add_security_group(&self, vpc_id: &str, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        let id = state.id("sg");
        state
            .security_groups
            .insert(id.clone(), (vpc_id.to_string(), name.to_string()));
        id
    }

    /// All recorded calls as `"<op> <first arg>"`
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    /// Recorded operation names, without arguments
    pub fn operations(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .map(|c| c.split_whitespace().next().unwrap_or_default().to_string())
            .collect()
    }

    /// Number of calls made to `op`
    pub fn call_count(&self, op: &str) -> usize {
        self.operations().iter().filter(|o| *o == op).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn vpc_count(&self) -> usize {
        self.state.lock().unwrap().vpcs.len()
    }

    pub fn subnet_count(&self) -> usize {
        self.state.lock().unwrap().subnets.len()
    }

    pub fn gateway_count(&self) -> usize {
        self.state.lock().unwrap().gateways.len()
    }

    pub fn route_count(&self) -> usize {
        self.state.lock().unwrap().routes.len()
    }

    pub fn security_group_count(&self) -> usize {
        self.state.lock().unwrap().security_groups.len()
    }

    pub fn has_vpc(&self, vpc_id: &str) -> bool {
        self.state.lock().unwrap().vpcs.contains_key(vpc_id)
    }

    pub fn has_subnet(&self, subnet_id: &str) -> bool {
        self.state.lock().unwrap().subnets.contains_key(subnet_id)
    }

    pub fn has_gateway(&self, gateway_id: &str) -> bool {
        self.state.lock().unwrap().gateways.contains_key(gateway_id)
    }

    /// VPC the gateway is attached to
    pub fn gateway_attachment(&self, gateway_id: &str) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .gateways
            .get(gateway_id)
            .cloned()
            .flatten()
    }
}

#[async_trait::async_trait]
impl Ec2NetworkClientTrait for MockEc2Client {
    fn region(&self) -> &str {
        &self.region
    }

    async fn create_vpc(&self, cidr_block: &str) -> Result<String, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("create_vpc", cidr_block)?;
        let vpc_id = state.id("vpc");
        let route_table = state.id("rtb");
        let default_sg = state.id("sg");
        state.vpcs.insert(vpc_id.clone(), route_table);
        state.security_groups.insert(
            default_sg,
            (vpc_id.clone(), DEFAULT_SECURITY_GROUP.to_string()),
        );
        Ok(vpc_id)
    }

    async fn vpc_state(&self, vpc_id: &str) -> Result<Option<String>, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("vpc_state", vpc_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("InvalidVpcID.NotFound", vpc_id));
        }
        if state.pending_polls > 0 {
            state.pending_polls -= 1;
            return Ok(Some("pending".to_string()));
        }
        Ok(Some(VPC_STATE_AVAILABLE.to_string()))
    }

    async fn delete_vpc(&self, vpc_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("delete_vpc", vpc_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("InvalidVpcID.NotFound", vpc_id));
        }
        let in_use = state.subnets.values().any(|v| v == vpc_id)
            || state.gateways.values().any(|v| v.as_deref() == Some(vpc_id))
            || state
                .security_groups
                .values()
                .any(|(v, name)| v == vpc_id && name != DEFAULT_SECURITY_GROUP);
        if in_use {
            return Err(dependency(vpc_id));
        }
        if let Some(route_table) = state.vpcs.remove(vpc_id) {
            state.routes.retain(|(rt, _)| *rt != route_table);
        }
        state.security_groups.retain(|_, (v, _)| v != vpc_id);
        Ok(())
    }

    async fn create_subnet(
        &self,
        vpc_id: &str,
        _cidr_block: &str,
        _availability_zone: &str,
    ) -> Result<String, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("create_subnet", vpc_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("InvalidVpcID.NotFound", vpc_id));
        }
        let subnet_id = state.id("subnet");
        state.subnets.insert(subnet_id.clone(), vpc_id.to_string());
        Ok(subnet_id)
    }

    async fn delete_subnet(&self, subnet_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("delete_subnet", subnet_id)?;
        state
            .subnets
            .remove(subnet_id)
            .map(|_| ())
            .ok_or_else(|| not_found("InvalidSubnetID.NotFound", subnet_id))
    }

    async fn create_internet_gateway(&self) -> Result<String, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("create_internet_gateway", "")?;
        let gateway_id = state.id("igw");
        state.gateways.insert(gateway_id.clone(), None);
        Ok(gateway_id)
    }

    async fn attach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("attach_internet_gateway", gateway_id)?;
        if !state.vpcs.contains_key(vpc_id) {
            return Err(not_found("InvalidVpcID.NotFound", vpc_id));
        }
        match state.gateways.get_mut(gateway_id) {
            Some(Some(attached)) => Err(classify_ec2_error(
                Some("Resource.AlreadyAssociated"),
                Some(&format!("resource {gateway_id} is already attached to network {attached}")),
            )),
            Some(attachment) => {
                *attachment = Some(vpc_id.to_string());
                Ok(())
            }
            None => Err(not_found("InvalidInternetGatewayID.NotFound", gateway_id)),
        }
    }

    async fn detach_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("detach_internet_gateway", gateway_id)?;
        match state.gateways.get_mut(gateway_id) {
            Some(attachment) if attachment.as_deref() == Some(vpc_id) => {
                *attachment = None;
                Ok(())
            }
            Some(_) => Err(classify_ec2_error(
                Some("Gateway.NotAttached"),
                Some(&format!("resource {gateway_id} is not attached to network {vpc_id}")),
            )),
            None => Err(not_found("InvalidInternetGatewayID.NotFound", gateway_id)),
        }
    }

    async fn delete_internet_gateway(&self, gateway_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("delete_internet_gateway", gateway_id)?;
        match state.gateways.get(gateway_id) {
            Some(Some(_)) => Err(dependency(gateway_id)),
            Some(None) => {
                state.gateways.remove(gateway_id);
                Ok(())
            }
            None => Err(not_found("InvalidInternetGatewayID.NotFound", gateway_id)),
        }
    }

    async fn main_route_table(&self, vpc_id: &str) -> Result<String, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("main_route_table", vpc_id)?;
        state
            .vpcs
            .get(vpc_id)
            .cloned()
            .ok_or_else(|| Ec2Error::NotFound(format!("main route table for VPC {vpc_id}")))
    }

    async fn create_route(
        &self,
        route_table_id: &str,
        destination_cidr: &str,
        gateway_id: &str,
    ) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("create_route", route_table_id)?;
        if !state.gateways.contains_key(gateway_id) {
            return Err(not_found("InvalidInternetGatewayID.NotFound", gateway_id));
        }
        let inserted = state
            .routes
            .insert((route_table_id.to_string(), destination_cidr.to_string()));
        if !inserted {
            return Err(classify_ec2_error(
                Some("RouteAlreadyExists"),
                Some(&format!("The route identified by {destination_cidr} already exists.")),
            ));
        }
        Ok(())
    }

    async fn delete_route(&self, route_table_id: &str, destination_cidr: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("delete_route", route_table_id)?;
        let key = (route_table_id.to_string(), destination_cidr.to_string());
        if state.routes.remove(&key) {
            Ok(())
        } else {
            Err(not_found("InvalidRoute.NotFound", destination_cidr))
        }
    }

    async fn list_security_groups(&self, vpc_id: &str) -> Result<Vec<SecurityGroupSummary>, Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("list_security_groups", vpc_id)?;
        let mut groups: Vec<SecurityGroupSummary> = state
            .security_groups
            .iter()
            .filter(|(_, (v, _))| v == vpc_id)
            .map(|(id, (_, name))| SecurityGroupSummary {
                group_id: id.clone(),
                group_name: name.clone(),
            })
            .collect();
        groups.sort_by(|a, b| a.group_id.cmp(&b.group_id));
        Ok(groups)
    }

    async fn delete_security_group(&self, group_id: &str) -> Result<(), Ec2Error> {
        let mut state = self.state.lock().unwrap();
        state.enter("delete_security_group", group_id)?;
        state
            .security_groups
            .remove(group_id)
            .map(|_| ())
            .ok_or_else(|| not_found("InvalidGroup.NotFound", group_id))
    }
}
