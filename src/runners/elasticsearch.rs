//! Elasticsearch runner.
//!
//! Uses the snapshot API against the cluster at `Host`. Snapshots live in a
//! shared-filesystem repository registered on demand; the repository is the
//! backend's native storage and snapshots are not relocated out of it.

use std::time::Duration;

use reqwest::Method;
use reqwest::blocking::Client;
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{Target, keys};
use crate::error::{Result, SnapError};
use crate::runner::{RunContext, TargetRunner};

/// Registry key of this runner.
pub const ELASTICSEARCH_TYPE: &str = "elasticsearch";
/// Property naming the snapshot repository.
pub const REPOSITORY_KEY: &str = "Repository";
/// Property naming the repository's `fs` location on the cluster nodes.
pub const REPOSITORY_LOCATION_KEY: &str = "RepositoryLocation";
pub const DEFAULT_REPOSITORY: &str = "snap";
pub const DEFAULT_REPOSITORY_LOCATION: &str = "/usr/share/elasticsearch/backup";

/// Status code and decoded JSON body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// JSON-over-HTTP transport.
pub trait HttpTransport {
    /// Send a request. Non-2xx responses are returned, not raised.
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse>;
}

/// Blocking `reqwest` transport without a request timeout, since
/// `wait_for_completion` calls last as long as the snapshot does.
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| SnapError::http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn send(&self, method: Method, url: &str, body: Option<&Value>) -> Result<HttpResponse> {
        debug!("{} {}", method, url);
        let mut request = self.client.request(method.clone(), url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .map_err(|e| SnapError::http(format!("{} {} failed: {}", method, url, e)))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .map_err(|e| SnapError::http(format!("{} {}: unreadable body: {}", method, url, e)))?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };
        Ok(HttpResponse { status, body })
    }
}

/// Snapshot names must be lowercase and free of URL-significant characters.
pub fn snapshot_name(unique_name: &str) -> String {
    unique_name
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

struct Plan {
    host: String,
    repository: String,
    location: String,
    snapshot: String,
}

impl Plan {
    fn repository_url(&self) -> String {
        format!("{}/_snapshot/{}", self.host, self.repository)
    }

    fn snapshot_url(&self) -> String {
        format!("{}/{}", self.repository_url(), self.snapshot)
    }
}

/// Pack, restore and clean for Elasticsearch clusters.
pub struct ElasticsearchRunner {
    transport: Box<dyn HttpTransport>,
}

impl ElasticsearchRunner {
    pub fn new(transport: Box<dyn HttpTransport>) -> Self {
        Self { transport }
    }

    fn plan(&self, ctx: &RunContext<'_>, target: &Target) -> Result<Plan> {
        let host = ctx
            .required_property(target, keys::HOST)?
            .trim()
            .trim_end_matches('/')
            .to_string();
        let repository = ctx
            .property(target, REPOSITORY_KEY)
            .unwrap_or(DEFAULT_REPOSITORY)
            .to_string();
        let location = ctx
            .property(target, REPOSITORY_LOCATION_KEY)
            .unwrap_or(DEFAULT_REPOSITORY_LOCATION)
            .to_string();
        let snapshot = snapshot_name(&ctx.naming.generate_unique_name(ctx.config, target));

        Ok(Plan {
            host,
            repository,
            location,
            snapshot,
        })
    }

    fn fail(target: &Target, plan: &Plan, message: impl Into<String>) -> SnapError {
        SnapError::backend(target.label(), &plan.snapshot, message)
    }

    fn ensure_repository(&self, target: &Target, plan: &Plan) -> Result<()> {
        let body = json!({ "type": "fs", "settings": { "location": plan.location } });
        let response = self
            .transport
            .send(Method::PUT, &plan.repository_url(), Some(&body))?;

        if !response.is_success() || response.body["acknowledged"] != Value::Bool(true) {
            return Err(Self::fail(
                target,
                plan,
                format!(
                    "repository '{}' creation not acknowledged ({}): {}",
                    plan.repository, response.status, response.body
                ),
            ));
        }
        Ok(())
    }

    /// Indices contained in the snapshot, or None when the snapshot does not exist.
    fn snapshot_indices(&self, target: &Target, plan: &Plan) -> Result<Option<Vec<String>>> {
        let response = self.transport.send(Method::GET, &plan.snapshot_url(), None)?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Self::fail(
                target,
                plan,
                format!("snapshot lookup failed ({}): {}", response.status, response.body),
            ));
        }

        let indices = response.body["snapshots"][0]["indices"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Some(indices))
    }
}

impl TargetRunner for ElasticsearchRunner {
    fn runner_type(&self) -> &str {
        ELASTICSEARCH_TYPE
    }

    fn pack(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        info!("Snapshotting {} into {}/{}", plan.host, plan.repository, plan.snapshot);
        self.ensure_repository(target, &plan)?;

        // Same inputs overwrite the same snapshot name.
        let deleted = self
            .transport
            .send(Method::DELETE, &plan.snapshot_url(), None)?;
        if !deleted.is_success() && deleted.status != 404 {
            return Err(Self::fail(
                target,
                &plan,
                format!("could not replace snapshot ({}): {}", deleted.status, deleted.body),
            ));
        }

        let url = format!("{}?wait_for_completion=true", plan.snapshot_url());
        let body = json!({ "include_global_state": false });
        let response = self.transport.send(Method::PUT, &url, Some(&body))?;

        let succeeded = response.body["snapshot"]["state"] == Value::from("SUCCESS")
            || response.body["accepted"] == Value::Bool(true);
        if !response.is_success() || !succeeded {
            return Err(Self::fail(
                target,
                &plan,
                format!("snapshot not accepted ({}): {}", response.status, response.body),
            ));
        }
        Ok(())
    }

    fn restore(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        info!("Restoring {} from {}/{}", plan.host, plan.repository, plan.snapshot);
        self.ensure_repository(target, &plan)?;

        let url = format!("{}/_restore?wait_for_completion=true", plan.snapshot_url());
        let body = json!({ "include_global_state": false });
        let response = self.transport.send(Method::POST, &url, Some(&body))?;

        let accepted =
            !response.body["snapshot"].is_null() || response.body["accepted"] == Value::Bool(true);
        if !response.is_success() || !accepted {
            return Err(Self::fail(
                target,
                &plan,
                format!("restore not accepted ({}): {}", response.status, response.body),
            ));
        }
        Ok(())
    }

    /// Delete the indices the target's snapshot would restore.
    fn clean(&self, ctx: &RunContext<'_>, target: &Target) -> Result<()> {
        let plan = self.plan(ctx, target)?;
        self.ensure_repository(target, &plan)?;

        let indices = match self.snapshot_indices(target, &plan)? {
            Some(indices) if !indices.is_empty() => indices,
            Some(_) => {
                info!("Snapshot {} holds no indices, nothing to clean", plan.snapshot);
                return Ok(());
            }
            None => {
                info!("No snapshot {} yet, nothing to clean", plan.snapshot);
                return Ok(());
            }
        };

        info!("Deleting {} indices on {}", indices.len(), plan.host);
        let url = format!(
            "{}/{}?ignore_unavailable=true",
            plan.host,
            indices.join(",")
        );
        let response = self.transport.send(Method::DELETE, &url, None)?;
        if !response.is_success() {
            return Err(Self::fail(
                target,
                &plan,
                format!("index deletion failed ({}): {}", response.status, response.body),
            ));
        }
        Ok(())
    }
}
