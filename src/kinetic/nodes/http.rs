// SPDX-License-Identifier: MIT

use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

use super::args;
use crate::ndk::error::EngineError;
use crate::ndk::executor::{NodeExecutor, RunContext};
use crate::ndk::result::NodeResult;
use crate::ndk::value::value_to_text;

#[derive(Debug, Deserialize)]
struct HttpArgs {
    url: String,
    #[serde(default = "default_method")]
    method: String,
    #[serde(default)]
    headers: BTreeMap<String, Value>,
    #[serde(default)]
    query: BTreeMap<String, Value>,
    #[serde(default)]
    body: Option<Value>,
    /// Treat non-2xx responses as a failed node
    #[serde(default = "default_fail_on_status")]
    fail_on_status: bool,
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_fail_on_status() -> bool {
    true
}

/// Calls an HTTP endpoint. Output is `{status, headers, body}`; a JSON
/// response body is parsed, anything else is returned as text.
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    pub fn new(timeout: Duration) -> Result<Self, EngineError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NodeExecutor for HttpExecutor {
    fn node_type(&self) -> &str {
        "http"
    }

    async fn execute(&self, ctx: &RunContext<'_>) -> Result<NodeResult, EngineError> {
        let args: HttpArgs = args(ctx)?;

        let method = Method::from_bytes(args.method.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| {
                EngineError::node(ctx.node_id, format!("invalid method '{}'", args.method))
            })?;
        let mut url = Url::parse(&args.url).map_err(|e| {
            EngineError::node(ctx.node_id, format!("invalid url '{}': {}", args.url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EngineError::node(
                ctx.node_id,
                format!("unsupported url scheme '{}'", url.scheme()),
            ));
        }
        if !args.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &args.query {
                pairs.append_pair(key, &value_to_text(value));
            }
        }

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in &args.headers {
            request = request.header(name.as_str(), value_to_text(value));
        }
        request = match args.body {
            Some(Value::String(text)) => request.body(text),
            Some(Value::Null) | None => request,
            Some(body) => request.json(&body),
        };

        log::info!("[{}] {} {}", ctx.node_id, method, args.url);
        let response = request.send().await?;
        let status = response.status();

        let mut headers = Map::new();
        for (name, value) in response.headers() {
            if let Ok(text) = value.to_str() {
                headers.insert(name.to_string(), Value::String(text.to_string()));
            }
        }
        let text = response.text().await?;
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

        if args.fail_on_status && !status.is_success() {
            return Ok(NodeResult::failed(format!(
                "{} {} returned {}",
                method, args.url, status
            )));
        }

        let output = json!({
            "status": status.as_u16(),
            "headers": headers,
            "body": body,
        });
        Ok(NodeResult::success(crate::ndk::value::into_output(output)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kinetic::nodes::testing::Fixture;
    use crate::ndk::result::NodeStatus;

    fn executor() -> HttpExecutor {
        HttpExecutor::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_missing_url_is_error() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"method": "POST"}), Value::Null);
        let err = executor().execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("invalid config"));
    }

    #[tokio::test]
    async fn test_invalid_url_is_error() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"url": "not a url"}), Value::Null);
        let err = executor().execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("invalid url"));
    }

    #[tokio::test]
    async fn test_non_http_scheme_rejected() {
        let fixture = Fixture::new();
        let ctx = fixture.context(json!({"url": "file:///etc/passwd"}), Value::Null);
        let err = executor().execute(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("unsupported url scheme"));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_error() {
        let fixture = Fixture::new();
        // port 9 (discard) on localhost is closed on test machines
        let ctx = fixture.context(json!({"url": "http://127.0.0.1:9/"}), Value::Null);
        let result = executor().execute(&ctx).await;
        assert!(result.is_err() || result.unwrap().status == NodeStatus::Failed);
    }

    #[test]
    fn test_args_defaults() {
        let args: HttpArgs = serde_json::from_value(json!({"url": "https://x.test"})).unwrap();
        assert_eq!(args.method, "GET");
        assert!(args.fail_on_status);
        assert!(args.body.is_none());
    }
}
