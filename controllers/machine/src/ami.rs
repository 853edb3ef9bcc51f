//! Default Ubuntu AMI per AWS region
//!
//! Passed as `--amazonec2-ami` unless the Machine names an image itself.

/// Region to AMI, sorted by region.
const AMI_IDS: &[(&str, &str)] = &[
    ("af-south-1", "ami-0e806decb501416d7"),
    ("ap-east-1", "ami-01412724cbc6252ef"),
    ("ap-northeast-1", "ami-0162fe8bfebb6ea16"),
    ("ap-northeast-2", "ami-056a29f2eddc40520"),
    ("ap-northeast-3", "ami-0a70c5266db4a6202"),
    ("ap-south-1", "ami-0c2af51e265bd5e0e"),
    ("ap-south-2", "ami-00680cef23a721c2a"),
    ("ap-southeast-1", "ami-0497a974f8d5dcef8"),
    ("ap-southeast-2", "ami-0375ab65ee943a2a6"),
    ("ap-southeast-3", "ami-06a2e6561950f5040"),
    ("ap-southeast-4", "ami-0d5de3084c18e52d9"),
    ("ca-central-1", "ami-048ddca51ab3229ab"),
    ("ca-west-1", "ami-08fa6bf45a9f39b9e"),
    ("eu-central-1", "ami-07652eda1fbad7432"),
    ("eu-central-2", "ami-02871ac2c044b004f"),
    ("eu-north-1", "ami-07a0715df72e58928"),
    ("eu-south-1", "ami-05dfcfdd4f0f2620f"),
    ("eu-south-2", "ami-0549851bafe151f6c"),
    ("eu-west-1", "ami-0932dacac40965a65"),
    ("eu-west-2", "ami-07d20571c32ba6cdc"),
    ("eu-west-3", "ami-0062b622072515714"),
    ("il-central-1", "ami-01bbc242f90fb2d97"),
    ("me-central-1", "ami-0a389865294dadfe2"),
    ("me-south-1", "ami-0674e550ebeaf53d0"),
    ("sa-east-1", "ami-01a38093d387a7497"),
    ("us-east-1", "ami-0a0e5d9c7acc336f1"),
    ("us-east-2", "ami-003932de22c285676"),
    ("us-west-1", "ami-0ecaad63ed3668fca"),
    ("us-west-2", "ami-0075013580f6322a1"),
];

/// AMI for `region`, if the region is known.
pub fn ami_for_region(region: &str) -> Option<&'static str> {
    AMI_IDS
        .binary_search_by(|(r, _)| (*r).cmp(region))
        .ok()
        .map(|i| AMI_IDS[i].1)
}
