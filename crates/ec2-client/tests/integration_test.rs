//! Integration tests for the EC2 network client
//!
//! These tests create real (free) network resources.
//! Set AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and optionally AWS_REGION to run.

use ec2_client::{Ec2NetworkClient, Ec2NetworkClientTrait, VPC_STATE_AVAILABLE};
use std::time::Duration;

async fn client() -> Ec2NetworkClient {
    let region = std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string());
    let access_key = std::env::var("AWS_ACCESS_KEY_ID")
        .expect("AWS_ACCESS_KEY_ID environment variable must be set");
    let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
        .expect("AWS_SECRET_ACCESS_KEY environment variable must be set");
    Ec2NetworkClient::new(&region, &access_key, &secret_key).await
}

#[tokio::test]
#[ignore] // Requires AWS credentials
async fn test_vpc_lifecycle() {
    let client = client().await;

    let vpc_id = client.create_vpc("10.1.0.0/16").await.expect("Failed to create VPC");

    let mut state = None;
    for _ in 0..12 {
        state = client.vpc_state(&vpc_id).await.expect("Failed to describe VPC");
        if state.as_deref() == Some(VPC_STATE_AVAILABLE) {
            break;
        }
        tokio::time::sleep(Duration::from_secs(5)).await;
    }
    assert_eq!(state.as_deref(), Some(VPC_STATE_AVAILABLE));

    let route_table = client.main_route_table(&vpc_id).await.expect("No main route table");
    assert!(route_table.starts_with("rtb-"));

    client.delete_vpc(&vpc_id).await.expect("Failed to delete VPC");
}

#[tokio::test]
#[ignore]
async fn test_delete_missing_vpc_is_not_found() {
    let client = client().await;
    let err = client
        .delete_vpc("vpc-00000000000000000")
        .await
        .expect_err("Deleting an unknown VPC must fail");
    assert!(err.is_not_found(), "unexpected error: {err}");
}
