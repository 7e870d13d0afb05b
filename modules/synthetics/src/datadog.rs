//! Datadog Synthetics API v1 backend.

use crate::{CheckRequest, ManagedCheck, SyntheticBackend, EXPIRY_OPERATOR, EXPIRY_TARGET};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_SITE: &str = "datadoghq.com";

const API_KEY_HEADER: &str = "DD-API-KEY";
const APP_KEY_HEADER: &str = "DD-APPLICATION-KEY";

#[derive(Debug, Serialize)]
pub(crate) struct ApiTest<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: &'static str,
    subtype: &'static str,
    config: TestConfig<'a>,
    options: TestOptions,
    locations: &'a [String],
    tags: &'a [String],
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct TestConfig<'a> {
    assertions: Vec<Assertion>,
    request: TestRequest<'a>,
}

#[derive(Debug, Serialize)]
struct Assertion {
    #[serde(rename = "type")]
    kind: &'static str,
    operator: &'static str,
    target: u32,
}

#[derive(Debug, Serialize)]
struct TestRequest<'a> {
    host: &'a str,
    port: u16,
}

#[derive(Debug, Serialize)]
struct TestOptions {
    accept_self_signed: bool,
    tick_every: u32,
}

impl<'a> ApiTest<'a> {
    pub(crate) fn new(req: &'a CheckRequest) -> Self {
        ApiTest {
            name: &req.name,
            kind: "api",
            subtype: "ssl",
            config: TestConfig {
                assertions: vec![Assertion { kind: "certificate", operator: EXPIRY_OPERATOR, target: EXPIRY_TARGET }],
                request: TestRequest { host: &req.host, port: req.port },
            },
            options: TestOptions { accept_self_signed: false, tick_every: req.tick_every },
            locations: &req.locations,
            tags: &req.tags,
            message: &req.message,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    tests: Vec<ManagedCheck>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    public_ids: &'a [String],
}

pub struct DatadogSynthetics {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    app_key: String,
}

impl DatadogSynthetics {
    /// `site` is the Datadog site, e.g. `datadoghq.com` or `datadoghq.eu`.
    pub fn new(api_key: &str, app_key: &str, site: &str, timeout: Duration) -> Result<Self> {
        if api_key.is_empty() || app_key.is_empty() {
            bail!("datadog api and application keys are both required for synthetics");
        }
        let site = if site.is_empty() { DEFAULT_SITE } else { site };
        Ok(DatadogSynthetics {
            client: reqwest::Client::builder().timeout(timeout).build()?,
            base_url: format!("https://api.{}", site),
            api_key: api_key.to_string(),
            app_key: app_key.to_string(),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header(API_KEY_HEADER, &self.api_key)
            .header(APP_KEY_HEADER, &self.app_key)
    }
}

#[async_trait]
impl SyntheticBackend for DatadogSynthetics {
    async fn list_checks(&self) -> Result<Vec<ManagedCheck>> {
        let resp: ListResponse = self
            .request(reqwest::Method::GET, "/api/v1/synthetics/tests")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding synthetic test list")?;
        Ok(resp.tests)
    }

    async fn create_check(&self, request: &CheckRequest) -> Result<ManagedCheck> {
        let created = self
            .request(reqwest::Method::POST, "/api/v1/synthetics/tests/api")
            .json(&ApiTest::new(request))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("decoding created synthetic test")?;
        Ok(created)
    }

    async fn delete_checks(&self, public_ids: &[String]) -> Result<()> {
        self.request(reqwest::Method::POST, "/api/v1/synthetics/tests/delete")
            .json(&DeleteRequest { public_ids })
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
