//! `call_api`: issue a GET against the URL held in the payload.

use std::time::Duration;

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    cadence_config::ActionsConfig,
    cadence_scheduler::action::{ActionContext, ActionHandler, ActionOutcome},
    reqwest::Url,
    tracing::{debug, warn},
};

pub struct CallApi {
    client: reqwest::Client,
    timeout: Duration,
}

impl CallApi {
    pub fn from_config(config: &ActionsConfig) -> anyhow::Result<Self> {
        let timeout = config.http_timeout();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, timeout })
    }
}

fn parse_target(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim()).with_context(|| format!("invalid URL: {raw:?}"))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => bail!("unsupported URL scheme: {other}"),
    }
}

#[async_trait]
impl ActionHandler for CallApi {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        let url = parse_target(&ctx.payload)?;
        debug!(job = %ctx.job_name, %url, "calling API");

        let resp = self.client.get(url.clone()).send().await.map_err(|e| {
            if e.is_timeout() {
                anyhow::anyhow!("API call failed: timed out after {:?}", self.timeout)
            } else {
                anyhow::anyhow!("API call failed: {e}")
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            warn!(job = %ctx.job_name, %url, status = status.as_u16(), "API call failed");
            return Ok(ActionOutcome::failed(format!("API call failed: HTTP {status}")));
        }
        Ok(ActionOutcome::ok(format!("API call successful: HTTP {}", status.as_u16())))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(payload: &str) -> ActionContext {
        ActionContext {
            job_id: "j1".into(),
            job_name: "ping".into(),
            attempt: 1,
            payload: payload.into(),
        }
    }

    fn handler() -> CallApi {
        CallApi::from_config(&ActionsConfig {
            http_timeout_secs: 5,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn success_on_2xx() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/health")
            .match_header("user-agent", mockito::Matcher::Regex("^cadence/".into()))
            .with_status(200)
            .with_body("ok")
            .create_async()
            .await;

        let out = handler()
            .execute(&ctx(&format!("{}/health", server.url())))
            .await
            .unwrap();
        assert!(out.ok);
        assert_eq!(out.message, "API call successful: HTTP 200");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_2xx_is_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/down")
            .with_status(503)
            .create_async()
            .await;

        let out = handler()
            .execute(&ctx(&format!("{}/down", server.url())))
            .await
            .unwrap();
        assert!(!out.ok);
        assert!(out.message.contains("503"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rejects_bad_targets() {
        for bad in ["", "not a url", "ftp://example.com/file", "file:///etc/passwd"] {
            assert!(handler().execute(&ctx(bad)).await.is_err(), "{bad}");
        }
    }

    #[tokio::test]
    async fn connection_error_is_failure() {
        // Port 9 (discard) on localhost is almost never listening.
        let err = handler()
            .execute(&ctx("http://127.0.0.1:9/"))
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("API call failed"));
    }
}
