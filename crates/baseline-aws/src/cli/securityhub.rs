//! Security Hub, a per-region singleton.
//!
//! Standards are named in the catalog by their short id, e.g.
//! `aws-foundational-security-best-practices/v/1.0.0`; the service wants
//! full ARNs, which differ in shape between regional standards and the
//! global CIS ruleset.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{json, Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{desired_bool, put_if, tags_from_map, Args, AwsCliAccount};

const NOT_ENABLED: &[&str] = &["InvalidAccessException", "ResourceNotFoundException"];

fn standard_arn(region: &str, id: &str) -> String {
    if id.starts_with("cis-aws-foundations-benchmark/v/1.2.0") {
        format!("arn:aws:securityhub:::ruleset/{id}")
    } else {
        format!("arn:aws:securityhub:{region}::standards/{id}")
    }
}

/// The short id in a standards ARN: the part after `standards/` or `ruleset/`.
fn short_id(arn: &str) -> Option<&str> {
    arn.split_once(":standards/")
        .or_else(|| arn.split_once(":ruleset/"))
        .map(|(_, id)| id)
}

struct Subscription {
    subscription_arn: String,
    id: String,
}

async fn subscriptions(cli: &AwsCliAccount) -> Result<Vec<Subscription>, ApiError> {
    let enabled = cli.call("securityhub", "get-enabled-standards", Args::new()).await?;
    Ok(enabled["StandardsSubscriptions"]
        .as_array()
        .into_iter()
        .flatten()
        .filter(|s| s["StandardsStatus"].as_str() != Some("DELETING"))
        .filter_map(|s| {
            Some(Subscription {
                subscription_arn: s["StandardsSubscriptionArn"].as_str()?.to_string(),
                id: short_id(s["StandardsArn"].as_str()?)?.to_string(),
            })
        })
        .collect())
}

pub(super) async fn describe(cli: &AwsCliAccount) -> Result<Option<ResourceSnapshot>, ApiError> {
    let Some(hub) = cli
        .call_optional("securityhub", "describe-hub", Args::new(), NOT_ENABLED)
        .await?
    else {
        return Ok(None);
    };

    let mut attributes = Map::new();
    let standards: Vec<Value> = subscriptions(cli)
        .await?
        .into_iter()
        .map(|s| Value::String(s.id))
        .collect();
    attributes.insert("standards".to_string(), Value::Array(standards));
    put_if(&mut attributes, "auto_enable_controls", hub.get("AutoEnableControls").cloned());

    let tags = match hub["HubArn"].as_str() {
        Some(arn) => {
            let listed = cli
                .call("securityhub", "list-tags-for-resource", Args::new().opt("--resource-arn", arn))
                .await?;
            tags_from_map(&listed["Tags"])
        }
        None => BTreeMap::new(),
    };

    Ok(Some(ResourceSnapshot { attributes: Value::Object(attributes), tags }))
}

fn desired_standards(desired: &Value) -> BTreeSet<&str> {
    desired["standards"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
        .collect()
}

async fn enable_standards(cli: &AwsCliAccount, ids: &[&str]) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let requests: Vec<Value> = ids
        .iter()
        .map(|id| json!({ "StandardsArn": standard_arn(cli.region(), id) }))
        .collect();
    cli.call(
        "securityhub",
        "batch-enable-standards",
        Args::new().json("--standards-subscription-requests", &Value::Array(requests)),
    )
    .await?;
    Ok(())
}

async fn set_auto_enable(cli: &AwsCliAccount, on: bool) -> Result<(), ApiError> {
    cli.call(
        "securityhub",
        "update-security-hub-configuration",
        Args::new().toggle("auto-enable-controls", on),
    )
    .await?;
    Ok(())
}

pub(super) async fn create(
    cli: &AwsCliAccount,
    desired: &Value,
    tags: &BTreeMap<String, String>,
) -> Result<(), ApiError> {
    let tag_map: Map<String, Value> = tags
        .iter()
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    cli.call(
        "securityhub",
        "enable-security-hub",
        Args::new()
            .flag("--no-enable-default-standards")
            .json("--tags", &Value::Object(tag_map)),
    )
    .await?;

    let wanted: Vec<&str> = desired_standards(desired).into_iter().collect();
    enable_standards(cli, &wanted).await?;
    if let Some(on) = desired_bool(desired, "auto_enable_controls") {
        set_auto_enable(cli, on).await?;
    }
    Ok(())
}

pub(super) async fn update(cli: &AwsCliAccount, desired: &Value, diff: &StateDiff) -> Result<(), ApiError> {
    let changed = diff.attributes();

    if changed.contains(&"standards") {
        let wanted = desired_standards(desired);
        let current = subscriptions(cli).await?;

        let missing: Vec<&str> = wanted
            .iter()
            .copied()
            .filter(|id| !current.iter().any(|s| s.id == *id))
            .collect();
        enable_standards(cli, &missing).await?;

        let extra: Vec<Value> = current
            .iter()
            .filter(|s| !wanted.contains(s.id.as_str()))
            .map(|s| Value::String(s.subscription_arn.clone()))
            .collect();
        if !extra.is_empty() {
            cli.call(
                "securityhub",
                "batch-disable-standards",
                Args::new().json("--standards-subscription-arns", &Value::Array(extra)),
            )
            .await?;
        }
    }

    if changed.contains(&"auto_enable_controls") {
        set_auto_enable(cli, desired_bool(desired, "auto_enable_controls").unwrap_or(true)).await?;
    }
    Ok(())
}

pub(super) async fn delete(cli: &AwsCliAccount) -> Result<(), ApiError> {
    cli.call("securityhub", "disable-security-hub", Args::new()).await?;
    Ok(())
}
