//! Cost budgets with one percentage alert.
//!
//! The alert is an `ACTUAL` notification at `alert_threshold_percent`,
//! emailed to every address in `subscribers`. Budgets have no in-place
//! notification update, so a changed alert is deleted and re-created.

use std::collections::BTreeMap;

use serde_json::{json, Map, Value};

use baseline_contracts::{api::ApiError, state::ResourceSnapshot, state::StateDiff};

use super::{desired_str, tag_list, tags_from_list, Args, AwsCliAccount};

const NO_BUDGET: &[&str] = &["NotFoundException"];

fn budget_arn(account_id: &str, name: &str) -> String {
    format!("arn:aws:budgets::{account_id}:budget/{name}")
}

fn scoped(account_id: &str, name: &str) -> Args {
    Args::new().opt("--account-id", account_id).opt("--budget-name", name)
}

fn budget_body(name: &str, desired: &Value) -> Value {
    let amount = desired["limit_amount"].as_f64().unwrap_or_default();
    json!({
        "BudgetName": name,
        "BudgetType": "COST",
        "TimeUnit": desired_str(desired, "time_unit").unwrap_or("MONTHLY"),
        "BudgetLimit": {
            "Amount": format!("{amount}"),
            "Unit": desired_str(desired, "unit").unwrap_or("USD")
        }
    })
}

/// The alert notification, when the desired state asks for one.
fn notification(desired: &Value) -> Option<Value> {
    let threshold = desired["alert_threshold_percent"].as_f64()?;
    Some(json!({
        "NotificationType": "ACTUAL",
        "ComparisonOperator": "GREATER_THAN",
        "Threshold": threshold,
        "ThresholdType": "PERCENTAGE"
    }))
}

fn subscribers(desired: &Value) -> Value {
    Value::Array(
        desired["subscribers"]
            .as_array()
            .into_iter()
            .flatten()
            .filter_map(Value::as_str)
            .map(|address| json!({ "SubscriptionType": "EMAIL", "Address": address }))
            .collect(),
    )
}

pub(super) async fn describe(cli: &AwsCliAccount, name: &str) -> Result<Option<ResourceSnapshot>, ApiError> {
    let account_id = cli.account_id().await?.to_string();
    let Some(found) = cli
        .call_optional("budgets", "describe-budget", scoped(&account_id, name), NO_BUDGET)
        .await?
    else {
        return Ok(None);
    };
    let budget = &found["Budget"];

    let mut attributes = Map::new();
    let limit = &budget["BudgetLimit"];
    // The service reports amounts as decimal strings.
    if let Some(amount) = limit["Amount"].as_str().and_then(|a| a.parse::<f64>().ok()) {
        attributes.insert("limit_amount".to_string(), json!(amount));
    }
    if let Some(unit) = limit["Unit"].as_str() {
        attributes.insert("unit".to_string(), json!(unit));
    }
    if let Some(time_unit) = budget["TimeUnit"].as_str() {
        attributes.insert("time_unit".to_string(), json!(time_unit));
    }

    if let Some(alert) = current_alert(cli, &account_id, name).await? {
        attributes.insert("alert_threshold_percent".to_string(), alert["Threshold"].clone());
        let listed = cli
            .call(
                "budgets",
                "describe-subscribers-for-notification",
                scoped(&account_id, name).json("--notification", &alert),
            )
            .await?;
        let addresses: Vec<Value> = listed["Subscribers"]
            .as_array()
            .into_iter()
            .flatten()
            .filter(|s| s["SubscriptionType"].as_str() == Some("EMAIL"))
            .filter_map(|s| s.get("Address").cloned())
            .collect();
        attributes.insert("subscribers".to_string(), Value::Array(addresses));
    }

    let tagged = cli
        .call(
            "budgets",
            "list-tags-for-resource",
            Args::new().opt("--resource-arn", budget_arn(&account_id, name)),
        )
        .await?;
    let tags = tags_from_list(&tagged["ResourceTags"]);

    Ok(Some(ResourceSnapshot { attributes: Value::Object(attributes), tags }))
}

/// The first percentage notification on the budget.
async fn current_alert(cli: &AwsCliAccount, account_id: &str, name: &str) -> Result<Option<Value>, ApiError> {
    let listed = cli
        .call("budgets", "describe-notifications-for-budget", scoped(account_id, name))
        .await?;
    Ok(listed["Notifications"]
        .as_array()
        .and_then(|all| {
            all.iter()
                .find(|n| n["ThresholdType"].as_str().unwrap_or("PERCENTAGE") == "PERCENTAGE")
        })
        .cloned())
}

pub(super) async fn create(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    tags: &BTreeMap<String, String>,
) -> Result<(), ApiError> {
    let account_id = cli.account_id().await?.to_string();
    let mut args = Args::new()
        .opt("--account-id", &account_id)
        .json("--budget", &budget_body(name, desired));
    if let Some(alert) = notification(desired) {
        args = args.json(
            "--notifications-with-subscribers",
            &json!([{ "Notification": alert, "Subscribers": subscribers(desired) }]),
        );
    }
    if !tags.is_empty() {
        args = args.json("--resource-tags", &tag_list(tags));
    }
    cli.call("budgets", "create-budget", args).await?;
    Ok(())
}

pub(super) async fn update(
    cli: &AwsCliAccount,
    name: &str,
    desired: &Value,
    diff: &StateDiff,
) -> Result<(), ApiError> {
    let account_id = cli.account_id().await?.to_string();
    let changed = diff.attributes();

    if changed.iter().any(|a| matches!(*a, "limit_amount" | "unit" | "time_unit")) {
        cli.call(
            "budgets",
            "update-budget",
            Args::new()
                .opt("--account-id", &account_id)
                .json("--new-budget", &budget_body(name, desired)),
        )
        .await?;
    }

    if changed.iter().any(|a| matches!(*a, "alert_threshold_percent" | "subscribers")) {
        if let Some(existing) = current_alert(cli, &account_id, name).await? {
            cli.call(
                "budgets",
                "delete-notification",
                scoped(&account_id, name).json("--notification", &existing),
            )
            .await?;
        }
        if let Some(alert) = notification(desired) {
            cli.call(
                "budgets",
                "create-notification",
                scoped(&account_id, name)
                    .json("--notification", &alert)
                    .json("--subscribers", &subscribers(desired)),
            )
            .await?;
        }
    }
    Ok(())
}

pub(super) async fn delete(cli: &AwsCliAccount, name: &str) -> Result<(), ApiError> {
    let account_id = cli.account_id().await?.to_string();
    cli.call("budgets", "delete-budget", scoped(&account_id, name)).await?;
    Ok(())
}
