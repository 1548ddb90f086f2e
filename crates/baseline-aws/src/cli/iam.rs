//! Customer-managed IAM policies.
//!
//! Policies are looked up by name in the account's local scope. A document
//! change becomes a new default policy version; IAM keeps at most five, so
//! the oldest non-default version is pruned first when the limit is hit.

use std::collections::BTreeMap;

use serde_json::{Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{desired_str, parse_document, put_if, tag_list, tags_from_list, Args, AwsCliAccount};

const MAX_POLICY_VERSIONS: usize = 5;

async fn find_arn(cli: &AwsCliAccount, name: &str) -> Result<Option<String>, ApiError> {
    let found = cli
        .call(
            "iam",
            "list-policies",
            Args::new()
                .opt("--scope", "Local")
                .opt("--query", format!("Policies[?PolicyName=='{name}']")),
        )
        .await?;
    Ok(found
        .as_array()
        .and_then(|policies| policies.first())
        .and_then(|p| p["Arn"].as_str())
        .map(str::to_string))
}

async fn require_arn(cli: &AwsCliAccount, name: &str) -> Result<String, ApiError> {
    find_arn(cli, name).await?.ok_or_else(|| {
        ApiError::new("NoSuchEntity", format!("policy {name} does not exist")).with_status(404)
    })
}

pub(super) async fn describe(cli: &AwsCliAccount, name: &str) -> Result<Option<ResourceSnapshot>, ApiError> {
    let Some(arn) = find_arn(cli, name).await? else {
        return Ok(None);
    };
    let policy = cli.call("iam", "get-policy", Args::new().opt("--policy-arn", &arn)).await?;
    let policy = &policy["Policy"];
    let version_id = policy["DefaultVersionId"].as_str().unwrap_or("v1").to_string();
    let version = cli
        .call(
            "iam",
            "get-policy-version",
            Args::new().opt("--policy-arn", &arn).opt("--version-id", version_id),
        )
        .await?;

    let mut attributes = Map::new();
    attributes.insert("document".to_string(), parse_document(&version["PolicyVersion"]["Document"]));
    put_if(&mut attributes, "description", policy.get("Description").cloned());
    put_if(&mut attributes, "path", policy.get("Path").cloned());

    Ok(Some(ResourceSnapshot {
        attributes: Value::Object(attributes),
        tags: tags_from_list(&policy["Tags"]),
    }))
}

pub(super) async fn create(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    tags: &BTreeMap<String, String>,
) -> Result<(), ApiError> {
    let mut args = Args::new()
        .opt("--policy-name", name)
        .json("--policy-document", &desired["document"])
        .json("--tags", &tag_list(tags));
    if let Some(description) = desired_str(desired, "description") {
        args = args.opt("--description", description);
    }
    if let Some(path) = desired_str(desired, "path") {
        args = args.opt("--path", path);
    }
    cli.call("iam", "create-policy", args).await?;
    Ok(())
}

pub(super) async fn update(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    diff: &StateDiff,
) -> Result<(), ApiError> {
    if let Some(fixed) = diff.attributes().into_iter().find(|a| *a == "description" || *a == "path") {
        return Err(ApiError::new(
            "ImmutableAttribute",
            format!("the {fixed} of policy {name} cannot be changed after creation; delete and re-create it"),
        )
        .with_status(400));
    }
    if !diff.attributes().contains(&"document") {
        return Ok(());
    }

    let arn = require_arn(cli, name).await?;
    prune_versions(cli, &arn).await?;
    cli.call(
        "iam",
        "create-policy-version",
        Args::new()
            .opt("--policy-arn", &arn)
            .json("--policy-document", &desired["document"])
            .flag("--set-as-default"),
    )
    .await?;
    Ok(())
}

/// Non-default versions, oldest first.
async fn old_versions(cli: &AwsCliAccount, arn: &str) -> Result<(usize, Vec<String>), ApiError> {
    let listed = cli
        .call("iam", "list-policy-versions", Args::new().opt("--policy-arn", arn))
        .await?;
    let versions = listed["Versions"].as_array().cloned().unwrap_or_default();
    let mut old: Vec<(&str, &str)> = versions
        .iter()
        .filter(|v| !v["IsDefaultVersion"].as_bool().unwrap_or(false))
        .filter_map(|v| Some((v["CreateDate"].as_str().unwrap_or(""), v["VersionId"].as_str()?)))
        .collect();
    old.sort();
    Ok((versions.len(), old.into_iter().map(|(_, id)| id.to_string()).collect()))
}

async fn prune_versions(cli: &AwsCliAccount, arn: &str) -> Result<(), ApiError> {
    let (total, old) = old_versions(cli, arn).await?;
    if total < MAX_POLICY_VERSIONS {
        return Ok(());
    }
    if let Some(oldest) = old.first() {
        cli.call(
            "iam",
            "delete-policy-version",
            Args::new().opt("--policy-arn", arn).opt("--version-id", oldest),
        )
        .await?;
    }
    Ok(())
}

pub(super) async fn delete(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    let arn = require_arn(cli, name).await?;
    let (_, old) = old_versions(cli, &arn).await?;
    for version in old {
        cli.call(
            "iam",
            "delete-policy-version",
            Args::new().opt("--policy-arn", &arn).opt("--version-id", version),
        )
        .await?;
    }
    cli.call("iam", "delete-policy", Args::new().opt("--policy-arn", &arn)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use baseline_contracts::state::{AttributeDiff, StateDiff};

    use super::super::testing::{account, ScriptedRunner};

    const ARN: &str = "arn:aws:iam::123456789012:policy/RequireMFA";

    fn listed(runner: &ScriptedRunner) {
        runner.ok("iam list-policies", json!([{ "PolicyName": "RequireMFA", "Arn": ARN }]));
    }

    fn diff(attribute: &str, desired: serde_json::Value) -> StateDiff {
        StateDiff(vec![AttributeDiff { attribute: attribute.to_string(), desired, observed: None }])
    }

    #[tokio::test]
    async fn missing_policy_is_none() {
        let runner = Arc::new(ScriptedRunner::default());
        runner.ok("iam list-policies", json!([]));
        let found = super::describe(&account(&runner), "RequireMFA").await.unwrap();
        assert_eq!(found, None);
        assert_eq!(runner.operations(), vec!["iam list-policies"]);
    }

    #[tokio::test]
    async fn string_documents_are_decoded() {
        let runner = Arc::new(ScriptedRunner::default());
        listed(&runner);
        runner.ok(
            "iam get-policy",
            json!({ "Policy": {
                "DefaultVersionId": "v2",
                "Path": "/",
                "Tags": [{ "Key": "baseline:managed-by", "Value": "aws-governance-baseline" }]
            }}),
        );
        runner.ok(
            "iam get-policy-version",
            json!({ "PolicyVersion": { "Document": "{\"Version\":\"2012-10-17\",\"Statement\":[]}" } }),
        );

        let snapshot = super::describe(&account(&runner), "RequireMFA").await.unwrap().unwrap();
        assert_eq!(snapshot.attributes["document"]["Version"], "2012-10-17");
        assert_eq!(snapshot.attributes["path"], "/");
        assert_eq!(snapshot.tags.len(), 1);
        assert!(runner.args_of("iam get-policy-version").contains(&"v2".to_string()));
    }

    #[tokio::test]
    async fn create_passes_tags_and_document() {
        let runner = Arc::new(ScriptedRunner::default());
        let mut tags = BTreeMap::new();
        tags.insert("owner".to_string(), "baseline".to_string());
        let desired = json!({ "document": { "Version": "2012-10-17", "Statement": [] } });

        super::create(&account(&runner), "RequireMFA", &desired, &tags).await.unwrap();

        let argv = runner.args_of("iam create-policy");
        let tags_at = argv.iter().position(|a| a == "--tags").unwrap();
        assert_eq!(argv[tags_at + 1], r#"[{"Key":"owner","Value":"baseline"}]"#);
    }

    #[tokio::test]
    async fn document_change_prunes_then_adds_version() {
        let runner = Arc::new(ScriptedRunner::default());
        listed(&runner);
        runner.ok(
            "iam list-policy-versions",
            json!({ "Versions": [
                { "VersionId": "v5", "IsDefaultVersion": true, "CreateDate": "2026-05-01" },
                { "VersionId": "v3", "IsDefaultVersion": false, "CreateDate": "2026-03-01" },
                { "VersionId": "v1", "IsDefaultVersion": false, "CreateDate": "2026-01-01" },
                { "VersionId": "v2", "IsDefaultVersion": false, "CreateDate": "2026-02-01" },
                { "VersionId": "v4", "IsDefaultVersion": false, "CreateDate": "2026-04-01" }
            ]}),
        );
        let desired = json!({ "document": { "Version": "2012-10-17", "Statement": [{}] } });

        super::update(&account(&runner), "RequireMFA", &desired, &diff("document", desired["document"].clone()))
            .await
            .unwrap();

        assert!(runner.args_of("iam delete-policy-version").contains(&"v1".to_string()));
        assert!(runner.args_of("iam create-policy-version").contains(&"--set-as-default".to_string()));
    }

    #[tokio::test]
    async fn path_change_is_refused() {
        let runner = Arc::new(ScriptedRunner::default());
        let err = super::update(&account(&runner), "RequireMFA", &json!({}), &diff("path", json!("/x/")))
            .await
            .unwrap_err();
        assert_eq!(err.code, "ImmutableAttribute");
        assert!(runner.operations().is_empty());
    }
}
