//! AWS Config: the configuration recorder with its delivery channel, and
//! managed config rules.
//!
//! The recorder cannot be tagged, so its snapshot never carries tags.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{desired_bool, desired_str, put_if, required_str, tag_list, tags_from_list, Args, AwsCliAccount};

const NO_RULE: &[&str] = &["NoSuchConfigRuleException"];

// ── Recorder ─────────────────────────────────────────────────────────────────

pub(super) async fn describe_recorder(
    cli: &AwsCliAccount,
    name: &str,
) -> Result<Option<ResourceSnapshot>, ApiError> {
    let recorders = cli
        .call("configservice", "describe-configuration-recorders", Args::new())
        .await?;
    let Some(recorder) = recorders["ConfigurationRecorders"]
        .as_array()
        .and_then(|all| all.iter().find(|r| r["name"].as_str() == Some(name)))
    else {
        return Ok(None);
    };

    let mut attributes = Map::new();
    put_if(&mut attributes, "role_arn", recorder.get("roleARN").cloned());
    let group = &recorder["recordingGroup"];
    put_if(&mut attributes, "all_supported", group.get("allSupported").cloned());
    put_if(&mut attributes, "include_global_resources", group.get("includeGlobalResourceTypes").cloned());

    let channels = cli
        .call("configservice", "describe-delivery-channels", Args::new())
        .await?;
    put_if(
        &mut attributes,
        "delivery_bucket",
        channels["DeliveryChannels"][0].get("s3BucketName").cloned(),
    );

    let status = cli
        .call("configservice", "describe-configuration-recorder-status", Args::new())
        .await?;
    let recording = status["ConfigurationRecordersStatus"]
        .as_array()
        .and_then(|all| all.iter().find(|s| s["name"].as_str() == Some(name)))
        .and_then(|s| s["recording"].as_bool())
        .unwrap_or(false);
    attributes.insert("recording".to_string(), Value::Bool(recording));

    Ok(Some(ResourceSnapshot {
        attributes: Value::Object(attributes),
        tags: BTreeMap::new(),
    }))
}

/// Create or reconfigure the recorder and its delivery channel.
///
/// `diff` is `None` on create, when every part is written.
pub(super) async fn put_recorder(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    diff: Option<&StateDiff>,
) -> Result<(), ApiError> {
    let changed = |attribute: &str| diff.map_or(true, |d| d.attributes().contains(&attribute));

    if changed("role_arn") || changed("all_supported") || changed("include_global_resources") {
        let role_arn = match desired_str(desired, "role_arn") {
            Some(arn) => arn.to_string(),
            None => format!(
                "arn:aws:iam::{}:role/aws-service-role/config.amazonaws.com/AWSServiceRoleForConfig",
                cli.account_id().await?
            ),
        };
        let recorder = json!({
            "name": name,
            "roleARN": role_arn,
            "recordingGroup": {
                "allSupported": desired_bool(desired, "all_supported").unwrap_or(true),
                "includeGlobalResourceTypes": desired_bool(desired, "include_global_resources").unwrap_or(true)
            }
        });
        cli.call(
            "configservice",
            "put-configuration-recorder",
            Args::new().json("--configuration-recorder", &recorder),
        )
        .await?;
    }

    if changed("delivery_bucket") {
        let channel = json!({ "name": "default", "s3BucketName": required_str(desired, "delivery_bucket")? });
        cli.call(
            "configservice",
            "put-delivery-channel",
            Args::new().json("--delivery-channel", &channel),
        )
        .await?;
    }

    if changed("recording") {
        let operation = if desired_bool(desired, "recording").unwrap_or(true) {
            "start-configuration-recorder"
        } else {
            "stop-configuration-recorder"
        };
        cli.call(
            "configservice",
            operation,
            Args::new().opt("--configuration-recorder-name", name),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn delete_recorder(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    cli.call(
        "configservice",
        "stop-configuration-recorder",
        Args::new().opt("--configuration-recorder-name", name),
    )
    .await?;

    let channels = cli
        .call("configservice", "describe-delivery-channels", Args::new())
        .await?;
    for channel in channels["DeliveryChannels"].as_array().into_iter().flatten() {
        if let Some(channel_name) = channel["name"].as_str() {
            cli.call(
                "configservice",
                "delete-delivery-channel",
                Args::new().opt("--delivery-channel-name", channel_name),
            )
            .await?;
        }
    }

    cli.call(
        "configservice",
        "delete-configuration-recorder",
        Args::new().opt("--configuration-recorder-name", name),
    )
    .await?;
    Ok(())
}

// ── Rules ────────────────────────────────────────────────────────────────────

pub(super) async fn describe_rule(cli: &AwsCliAccount, name: &str) -> Result<Option<ResourceSnapshot>, ApiError> {
    let Some(found) = cli
        .call_optional(
            "configservice",
            "describe-config-rules",
            Args::new().opt("--config-rule-names", name),
            NO_RULE,
        )
        .await?
    else {
        return Ok(None);
    };
    let Some(rule) = found["ConfigRules"].as_array().and_then(|rules| rules.first()) else {
        return Ok(None);
    };

    let mut attributes = Map::new();
    put_if(&mut attributes, "source_identifier", rule["Source"].get("SourceIdentifier").cloned());
    put_if(
        &mut attributes,
        "input_parameters",
        rule["InputParameters"]
            .as_str()
            .and_then(|s| serde_json::from_str::<Value>(s).ok())
            .filter(|v| v.as_object().is_some_and(|o| !o.is_empty())),
    );
    put_if(&mut attributes, "resource_types", rule["Scope"].get("ComplianceResourceTypes").cloned());
    put_if(
        &mut attributes,
        "maximum_execution_frequency",
        rule.get("MaximumExecutionFrequency").cloned(),
    );

    let tags = match rule["ConfigRuleArn"].as_str() {
        Some(arn) => {
            let listed = cli
                .call(
                    "configservice",
                    "list-tags-for-resource",
                    Args::new().opt("--resource-arn", arn),
                )
                .await?;
            tags_from_list(&listed["Tags"])
        }
        None => BTreeMap::new(),
    };

    Ok(Some(ResourceSnapshot { attributes: Value::Object(attributes), tags }))
}

/// `put-config-rule` replaces the whole rule, so create and update share it.
/// Tags are only passed on create.
pub(super) async fn put_rule(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    tags: Option<&BTreeMap<String, String>>,
) -> Result<(), ApiError> {
    let mut rule = json!({
        "ConfigRuleName": name,
        "Source": { "Owner": "AWS", "SourceIdentifier": required_str(desired, "source_identifier")? }
    });
    if let Some(parameters) = desired.get("input_parameters") {
        rule["InputParameters"] = Value::String(parameters.to_string());
    }
    if let Some(types) = desired.get("resource_types") {
        rule["Scope"] = json!({ "ComplianceResourceTypes": types });
    }
    if let Some(frequency) = desired.get("maximum_execution_frequency") {
        rule["MaximumExecutionFrequency"] = frequency.clone();
    }

    let mut args = Args::new().json("--config-rule", &rule);
    if let Some(tags) = tags.filter(|t| !t.is_empty()) {
        args = args.json("--tags", &tag_list(tags));
    }
    cli.call("configservice", "put-config-rule", args).await?;
    Ok(())
}

pub(super) async fn delete_rule(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    cli.call(
        "configservice",
        "delete-config-rule",
        Args::new().opt("--config-rule-name", name),
    )
    .await?;
    Ok(())
}
