//! The audit log bucket.
//!
//! A bucket's configuration lives in several sub-resources, each with its own
//! get/put pair. S3 answers "not configured" with a sub-resource specific
//! error code, which reads back as an absent attribute.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{parse_document, put_if, tag_list, tags_from_list, Args, AwsCliAccount};

const NO_ENCRYPTION: &[&str] = &["ServerSideEncryptionConfigurationNotFoundError"];
const NO_PUBLIC_ACCESS_BLOCK: &[&str] = &["NoSuchPublicAccessBlockConfiguration"];
const NO_POLICY: &[&str] = &["NoSuchBucketPolicy"];
const NO_TAGS: &[&str] = &["NoSuchTagSet"];
const NO_BUCKET: &[&str] = &["NoSuchBucket"];

fn bucket(name: &str) -> Args {
    Args::new().opt("--bucket", name)
}

pub(super) async fn describe(cli: &AwsCliAccount, name: &str) -> Result<Option<ResourceSnapshot>, ApiError> {
    if cli.call_optional("s3api", "head-bucket", bucket(name), NO_BUCKET).await?.is_none() {
        return Ok(None);
    }

    let mut attributes = Map::new();

    let versioning = cli.call("s3api", "get-bucket-versioning", bucket(name)).await?;
    attributes.insert(
        "versioning".to_string(),
        Value::Bool(versioning["Status"].as_str() == Some("Enabled")),
    );

    let encryption = cli
        .call_optional("s3api", "get-bucket-encryption", bucket(name), NO_ENCRYPTION)
        .await?;
    put_if(
        &mut attributes,
        "encryption",
        encryption.and_then(|e| {
            e["ServerSideEncryptionConfiguration"]["Rules"][0]["ApplyServerSideEncryptionByDefault"]["SSEAlgorithm"]
                .as_str()
                .map(|s| Value::String(s.to_string()))
        }),
    );

    let block = cli
        .call_optional("s3api", "get-public-access-block", bucket(name), NO_PUBLIC_ACCESS_BLOCK)
        .await?;
    let blocked = block.is_some_and(|b| {
        let config = &b["PublicAccessBlockConfiguration"];
        ["BlockPublicAcls", "IgnorePublicAcls", "BlockPublicPolicy", "RestrictPublicBuckets"]
            .iter()
            .all(|flag| config[*flag].as_bool() == Some(true))
    });
    attributes.insert("block_public_access".to_string(), Value::Bool(blocked));

    let policy = cli.call_optional("s3api", "get-bucket-policy", bucket(name), NO_POLICY).await?;
    put_if(&mut attributes, "policy", policy.map(|p| parse_document(&p["Policy"])));

    let tagging = cli.call_optional("s3api", "get-bucket-tagging", bucket(name), NO_TAGS).await?;
    let tags = tagging.map(|t| tags_from_list(&t["TagSet"])).unwrap_or_default();

    Ok(Some(ResourceSnapshot { attributes: Value::Object(attributes), tags }))
}

pub(super) async fn create(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    tags: &BTreeMap<String, String>,
) -> Result<(), ApiError> {
    let mut args = bucket(name);
    // us-east-1 rejects an explicit location constraint.
    if cli.region() != "us-east-1" {
        args = args.opt("--create-bucket-configuration", format!("LocationConstraint={}", cli.region()));
    }
    cli.call("s3api", "create-bucket", args).await?;

    if !tags.is_empty() {
        cli.call(
            "s3api",
            "put-bucket-tagging",
            bucket(name).json("--tagging", &json!({ "TagSet": tag_list(tags) })),
        )
        .await?;
    }

    if let Some(attributes) = desired.as_object() {
        for (attribute, value) in attributes {
            put_attribute(cli, name, attribute, value).await?;
        }
    }
    Ok(())
}

pub(super) async fn update(cli: &AwsCliAccount, name: &str, diff: &StateDiff) -> Result<(), ApiError> {
    for change in diff.iter() {
        put_attribute(cli, name, &change.attribute, &change.desired).await?;
    }
    Ok(())
}

async fn put_attribute(cli: &AwsCliAccount, name: &str, attribute: &str, value: &Value) -> Result<(), ApiError> {
    match attribute {
        "versioning" => {
            let status = if value.as_bool() == Some(true) { "Enabled" } else { "Suspended" };
            cli.call(
                "s3api",
                "put-bucket-versioning",
                bucket(name).opt("--versioning-configuration", format!("Status={status}")),
            )
            .await?;
        }
        "encryption" => {
            let algorithm = value.as_str().unwrap_or("AES256");
            cli.call(
                "s3api",
                "put-bucket-encryption",
                bucket(name).json(
                    "--server-side-encryption-configuration",
                    &json!({ "Rules": [{ "ApplyServerSideEncryptionByDefault": { "SSEAlgorithm": algorithm } }] }),
                ),
            )
            .await?;
        }
        "block_public_access" => {
            let on = value.as_bool() == Some(true);
            cli.call(
                "s3api",
                "put-public-access-block",
                bucket(name).json(
                    "--public-access-block-configuration",
                    &json!({
                        "BlockPublicAcls": on,
                        "IgnorePublicAcls": on,
                        "BlockPublicPolicy": on,
                        "RestrictPublicBuckets": on
                    }),
                ),
            )
            .await?;
        }
        "policy" => {
            cli.call("s3api", "put-bucket-policy", bucket(name).json("--policy", value)).await?;
        }
        other => {
            return Err(ApiError::new(
                "InvalidParameterValue",
                format!("log buckets have no attribute '{other}'"),
            ));
        }
    }
    Ok(())
}

pub(super) async fn delete(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    cli.call("s3api", "delete-bucket", bucket(name)).await?;
    Ok(())
}
