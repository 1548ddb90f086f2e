//! `AccountApi` over the `aws` command-line interface.
//!
//! Each `ResourceKind` maps to one service module that knows the describe,
//! create, update and delete commands for it. Every invocation is pinned to
//! the configured region (and profile, when set) and asks for JSON output;
//! the untyped responses are reduced to the catalog's attribute vocabulary
//! before they leave the service module.

mod budgets;
mod cloudtrail;
mod configservice;
pub mod errors;
mod iam;
pub mod process;
mod s3;
mod securityhub;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::OnceCell;
use tracing::debug;

use baseline_contracts::{
    api::ApiError,
    control::{ResourceKind, ResourceRef},
    error::BaselineResult,
    state::{ResourceSnapshot, StateDiff},
};
use baseline_core::traits::AccountApi;

use crate::settings::AwsSettings;
use errors::{is_not_found, malformed_output, parse_cli_error, spawn_error};
use process::{CommandRunner, ProcessRunner};

/// The live-account adapter.
pub struct AwsCliAccount {
    runner: Arc<dyn CommandRunner>,
    settings: AwsSettings,
    account_id: OnceCell<String>,
}

impl AwsCliAccount {
    /// An adapter that spawns the CLI at `settings.cli_path`.
    pub fn new(settings: AwsSettings) -> BaselineResult<Self> {
        let runner = Arc::new(ProcessRunner::new(settings.cli_path.clone()));
        Self::with_runner(settings, runner)
    }

    /// An adapter that runs commands through `runner`.
    pub fn with_runner(settings: AwsSettings, runner: Arc<dyn CommandRunner>) -> BaselineResult<Self> {
        settings.validate()?;
        let account_id = match &settings.account_id {
            Some(id) => OnceCell::new_with(Some(id.clone())),
            None => OnceCell::new(),
        };
        Ok(Self { runner, settings, account_id })
    }

    pub(crate) fn region(&self) -> &str {
        &self.settings.region
    }

    /// The account id, from configuration or `sts get-caller-identity`.
    pub(crate) async fn account_id(&self) -> Result<&str, ApiError> {
        let id = self
            .account_id
            .get_or_try_init(|| async {
                let identity = self.call("sts", "get-caller-identity", Args::new()).await?;
                identity["Account"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ApiError::new("MalformedResponse", "get-caller-identity returned no Account"))
            })
            .await?;
        Ok(id.as_str())
    }

    /// Run `aws <service> <operation> <args>` and parse its JSON output.
    ///
    /// Operations that print nothing on success yield `Value::Null`.
    pub(crate) async fn call(&self, service: &str, operation: &str, args: Args) -> Result<Value, ApiError> {
        let mut argv = vec![service.to_string(), operation.to_string()];
        argv.extend(args.0);
        argv.extend(["--output".to_string(), "json".to_string()]);
        argv.extend(["--region".to_string(), self.settings.region.clone()]);
        if let Some(profile) = &self.settings.profile {
            argv.extend(["--profile".to_string(), profile.clone()]);
        }

        debug!(service, operation, "aws cli call");
        let program = self.settings.cli_path.display().to_string();
        let output = self
            .runner
            .run(&argv)
            .await
            .map_err(|e| spawn_error(&program, &e))?;

        if !output.success {
            return Err(parse_cli_error(&output.stderr));
        }
        let stdout = output.stdout.trim();
        if stdout.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout).map_err(|e| malformed_output(&format!("{service} {operation}"), &e))
    }

    /// Like `call`, but `Ok(None)` when the service answers with one of the
    /// `missing` error codes.
    pub(crate) async fn call_optional(
        &self,
        service: &str,
        operation: &str,
        args: Args,
        missing: &[&str],
    ) -> Result<Option<Value>, ApiError> {
        match self.call(service, operation, args).await {
            Ok(value) => Ok(Some(value)),
            Err(err) if is_not_found(&err, missing) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl AccountApi for AwsCliAccount {
    async fn describe(&self, target: &ResourceRef) -> Result<Option<ResourceSnapshot>, ApiError> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::IamPolicy => iam::describe(self, name).await,
            ResourceKind::LogBucket => s3::describe(self, name).await,
            ResourceKind::Trail => cloudtrail::describe(self, name).await,
            ResourceKind::ConfigRecorder => configservice::describe_recorder(self, name).await,
            ResourceKind::ConfigRule => configservice::describe_rule(self, name).await,
            ResourceKind::SecurityHub => securityhub::describe(self).await,
            ResourceKind::Budget => budgets::describe(self, name).await,
        }
    }

    async fn create(
        &self,
        target: &ResourceRef,
        desired: &Value,
        tags: &BTreeMap<String, String>,
    ) -> Result<(), ApiError> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::IamPolicy => iam::create(self, name, desired, tags).await,
            ResourceKind::LogBucket => s3::create(self, name, desired, tags).await,
            ResourceKind::Trail => cloudtrail::create(self, name, desired, tags).await,
            ResourceKind::ConfigRecorder => configservice::put_recorder(self, name, desired, None).await,
            ResourceKind::ConfigRule => configservice::put_rule(self, name, desired, Some(tags)).await,
            ResourceKind::SecurityHub => securityhub::create(self, desired, tags).await,
            ResourceKind::Budget => budgets::create(self, name, desired, tags).await,
        }
    }

    async fn update(&self, target: &ResourceRef, desired: &Value, diff: &StateDiff) -> Result<(), ApiError> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::IamPolicy => iam::update(self, name, desired, diff).await,
            ResourceKind::LogBucket => s3::update(self, name, diff).await,
            ResourceKind::Trail => cloudtrail::update(self, name, desired, diff).await,
            ResourceKind::ConfigRecorder => configservice::put_recorder(self, name, desired, Some(diff)).await,
            ResourceKind::ConfigRule => configservice::put_rule(self, name, desired, None).await,
            ResourceKind::SecurityHub => securityhub::update(self, desired, diff).await,
            ResourceKind::Budget => budgets::update(self, name, desired, diff).await,
        }
    }

    async fn delete(&self, target: &ResourceRef) -> Result<(), ApiError> {
        let name = target.name.as_str();
        match target.kind {
            ResourceKind::IamPolicy => iam::delete(self, name).await,
            ResourceKind::LogBucket => s3::delete(self, name).await,
            ResourceKind::Trail => cloudtrail::delete(self, name).await,
            ResourceKind::ConfigRecorder => configservice::delete_recorder(self, name).await,
            ResourceKind::ConfigRule => configservice::delete_rule(self, name).await,
            ResourceKind::SecurityHub => securityhub::delete(self).await,
            ResourceKind::Budget => budgets::delete(self, name).await,
        }
    }
}

// ── Argument building ────────────────────────────────────────────────────────

/// CLI arguments after `<service> <operation>`.
#[derive(Debug, Default, Clone)]
pub(crate) struct Args(Vec<String>);

impl Args {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn opt(mut self, flag: &str, value: impl Into<String>) -> Self {
        self.0.push(flag.to_string());
        self.0.push(value.into());
        self
    }

    /// A structured argument, passed as compact JSON.
    pub(crate) fn json(self, flag: &str, value: &Value) -> Self {
        self.opt(flag, value.to_string())
    }

    pub(crate) fn flag(mut self, flag: &str) -> Self {
        self.0.push(flag.to_string());
        self
    }

    /// `--<name>` when `on`, `--no-<name>` otherwise.
    pub(crate) fn toggle(self, name: &str, on: bool) -> Self {
        if on {
            self.flag(&format!("--{name}"))
        } else {
            self.flag(&format!("--no-{name}"))
        }
    }
}

// ── Tag and attribute helpers ────────────────────────────────────────────────

/// `[{"Key": k, "Value": v}, …]`, the shape most services take.
pub(crate) fn tag_list(tags: &BTreeMap<String, String>) -> Value {
    Value::Array(
        tags.iter()
            .map(|(k, v)| json!({ "Key": k, "Value": v }))
            .collect(),
    )
}

/// Read a `[{"Key": k, "Value": v}, …]` list; anything else is empty.
pub(crate) fn tags_from_list(value: &Value) -> BTreeMap<String, String> {
    value
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|t| Some((t["Key"].as_str()?.to_string(), t["Value"].as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Read a `{"k": "v", …}` map; anything else is empty.
pub(crate) fn tags_from_map(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| Some((k.clone(), v.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

/// Policy documents come back either as a JSON object or as a (possibly
/// JSON-encoded) string.
pub(crate) fn parse_document(value: &Value) -> Value {
    match value {
        Value::String(s) => serde_json::from_str(s).unwrap_or_else(|_| value.clone()),
        other => other.clone(),
    }
}

pub(crate) fn desired_bool(desired: &Value, attribute: &str) -> Option<bool> {
    desired.get(attribute).and_then(Value::as_bool)
}

pub(crate) fn desired_str<'a>(desired: &'a Value, attribute: &str) -> Option<&'a str> {
    desired.get(attribute).and_then(Value::as_str)
}

/// A desired attribute the service cannot be configured without.
pub(crate) fn required_str<'a>(desired: &'a Value, attribute: &str) -> Result<&'a str, ApiError> {
    desired_str(desired, attribute).ok_or_else(|| {
        ApiError::new(
            "InvalidParameterValue",
            format!("desired attribute '{attribute}' is required"),
        )
    })
}

/// Set `attributes[key]` only when `value` is present.
pub(crate) fn put_if(attributes: &mut serde_json::Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value.filter(|v| !v.is_null()) {
        attributes.insert(key.to_string(), value);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A scripted `CommandRunner` shared by the service module tests.

    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::Value;

    use super::process::{CommandOutput, CommandRunner};
    use super::AwsCliAccount;
    use crate::settings::AwsSettings;

    /// Replies keyed by "service operation". Unscripted calls succeed with
    /// empty output. Every argv is recorded.
    #[derive(Default)]
    pub(crate) struct ScriptedRunner {
        replies: Mutex<HashMap<String, VecDeque<CommandOutput>>>,
        pub(crate) argv: Mutex<Vec<Vec<String>>>,
    }

    impl ScriptedRunner {
        pub(crate) fn ok(&self, call: &str, body: Value) {
            self.push(call, CommandOutput { success: true, stdout: body.to_string(), stderr: String::new() });
        }

        pub(crate) fn fail(&self, call: &str, code: &str) {
            self.push(
                call,
                CommandOutput {
                    success: false,
                    stdout: String::new(),
                    stderr: format!("An error occurred ({code}) when calling the X operation: scripted"),
                },
            );
        }

        fn push(&self, call: &str, output: CommandOutput) {
            self.replies
                .lock()
                .unwrap()
                .entry(call.to_string())
                .or_default()
                .push_back(output);
        }

        /// "service operation" of every call, in order.
        pub(crate) fn operations(&self) -> Vec<String> {
            self.argv
                .lock()
                .unwrap()
                .iter()
                .map(|a| format!("{} {}", a[0], a[1]))
                .collect()
        }

        /// The full argv of the first call to `call`.
        pub(crate) fn args_of(&self, call: &str) -> Vec<String> {
            self.argv
                .lock()
                .unwrap()
                .iter()
                .find(|a| format!("{} {}", a[0], a[1]) == call)
                .cloned()
                .unwrap_or_default()
        }
    }

    #[async_trait]
    impl CommandRunner for ScriptedRunner {
        async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
            self.argv.lock().unwrap().push(args.to_vec());
            let key = format!("{} {}", args[0], args[1]);
            let reply = self.replies.lock().unwrap().get_mut(&key).and_then(VecDeque::pop_front);
            Ok(reply.unwrap_or(CommandOutput { success: true, stdout: String::new(), stderr: String::new() }))
        }
    }

    pub(crate) fn account(runner: &Arc<ScriptedRunner>) -> AwsCliAccount {
        let settings = AwsSettings {
            region: "eu-west-1".to_string(),
            account_id: Some("123456789012".to_string()),
            ..AwsSettings::default()
        };
        AwsCliAccount::with_runner(settings, runner.clone()).unwrap()
    }
}
