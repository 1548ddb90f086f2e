//! CloudTrail trails.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{desired_bool, put_if, required_str, tag_list, tags_from_list, Args, AwsCliAccount};

pub(super) async fn describe(cli: &AwsCliAccount, name: &str) -> Result<Option<ResourceSnapshot>, ApiError> {
    let listed = cli
        .call("cloudtrail", "describe-trails", Args::new().opt("--trail-name-list", name))
        .await?;
    let Some(trail) = listed["trailList"]
        .as_array()
        .and_then(|trails| trails.iter().find(|t| t["Name"].as_str() == Some(name)))
    else {
        return Ok(None);
    };
    let arn = trail["TrailARN"].as_str().unwrap_or(name).to_string();

    let mut attributes = Map::new();
    put_if(&mut attributes, "bucket", trail.get("S3BucketName").cloned());
    put_if(&mut attributes, "multi_region", trail.get("IsMultiRegionTrail").cloned());
    put_if(&mut attributes, "log_file_validation", trail.get("LogFileValidationEnabled").cloned());
    put_if(&mut attributes, "include_global_events", trail.get("IncludeGlobalServiceEvents").cloned());

    let status = cli.call("cloudtrail", "get-trail-status", Args::new().opt("--name", &arn)).await?;
    put_if(&mut attributes, "logging", status.get("IsLogging").cloned());

    let tagged = cli
        .call("cloudtrail", "list-tags", Args::new().opt("--resource-id-list", &arn))
        .await?;
    let tags = tags_from_list(&tagged["ResourceTagList"][0]["TagsList"]);

    Ok(Some(ResourceSnapshot { attributes: Value::Object(attributes), tags }))
}

/// The `create-trail`/`update-trail` flags for the desired settings present.
fn settings(mut args: Args, desired: &Value) -> Args {
    if let Some(on) = desired_bool(desired, "multi_region") {
        args = args.toggle("is-multi-region-trail", on);
    }
    if let Some(on) = desired_bool(desired, "log_file_validation") {
        args = args.toggle("enable-log-file-validation", on);
    }
    if let Some(on) = desired_bool(desired, "include_global_events") {
        args = args.toggle("include-global-service-events", on);
    }
    args
}

async fn set_logging(cli: &AwsCliAccount, name: &str, on: bool) -> Result<(), ApiError> {
    let operation = if on { "start-logging" } else { "stop-logging" };
    cli.call("cloudtrail", operation, Args::new().opt("--name", name)).await?;
    Ok(())
}

pub(super) async fn create(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    tags: &BTreeMap<String, String>,
) -> Result<(), ApiError> {
    let args = Args::new()
        .opt("--name", name)
        .opt("--s3-bucket-name", required_str(desired, "bucket")?)
        .json("--tags-list", &tag_list(tags));
    cli.call("cloudtrail", "create-trail", settings(args, desired)).await?;

    // A new trail does not log until told to.
    if desired_bool(desired, "logging").unwrap_or(true) {
        set_logging(cli, name, true).await?;
    }
    Ok(())
}

pub(super) async fn update(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    diff: &StateDiff,
) -> Result<(), ApiError> {
    let changed = diff.attributes();
    if changed.iter().any(|a| *a != "logging") {
        let mut args = Args::new().opt("--name", name);
        if changed.contains(&"bucket") {
            args = args.opt("--s3-bucket-name", required_str(desired, "bucket")?);
        }
        cli.call("cloudtrail", "update-trail", settings(args, desired)).await?;
    }
    if changed.contains(&"logging") {
        set_logging(cli, name, desired_bool(desired, "logging").unwrap_or(true)).await?;
    }
    Ok(())
}

pub(super) async fn delete(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    cli.call("cloudtrail", "delete-trail", Args::new().opt("--name", name)).await?;
    Ok(())
}
