//! EC2 Network Client
//!
//! Creates and tears down the network prerequisites of an EC2-backed machine:
//! a VPC, one subnet, an internet gateway and the default route through it.
//!
//! # Example
//!
//! ```no_run
//! use ec2_client::{Ec2NetworkClient, Ec2NetworkClientTrait};
//!
//! # async fn example() -> Result<(), ec2_client::Ec2Error> {
//! let client = Ec2NetworkClient::new("us-east-1", "AKIA...", "secret").await;
//! let vpc_id = client.create_vpc("10.1.0.0/16").await?;
//! let route_table = client.main_route_table(&vpc_id).await?;
//! # let _ = route_table;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod ec2_trait;
pub mod types;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::Ec2NetworkClient;
pub use ec2_trait::Ec2NetworkClientTrait;
pub use error::{classify_ec2_error, Ec2Error};
pub use types::*;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockEc2Client;
