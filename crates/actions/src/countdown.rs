//! Counts a numeric payload down by one per firing.

use {
    async_trait::async_trait,
    cadence_scheduler::action::{ActionContext, ActionHandler, ActionOutcome},
    tracing::info,
};

pub struct Countdown;

#[async_trait]
impl ActionHandler for Countdown {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        let current: u64 = ctx.payload.trim().parse().map_err(|_| {
            anyhow::anyhow!("invalid countdown number for job {}: {:?}", ctx.job_name, ctx.payload)
        })?;

        if current == 0 {
            info!(job = %ctx.job_name, "countdown finished");
            return Ok(ActionOutcome::ok("Countdown finished!"));
        }

        info!(job = %ctx.job_name, remaining = current, "countdown tick");
        Ok(ActionOutcome::ok(format!("Countdown: {current}")).with_payload((current - 1).to_string()))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(payload: &str) -> ActionContext {
        ActionContext {
            job_id: "j1".into(),
            job_name: "launch".into(),
            attempt: 1,
            payload: payload.into(),
        }
    }

    #[tokio::test]
    async fn decrements_payload() {
        let out = Countdown.execute(&ctx("3")).await.unwrap();
        assert_eq!(out.message, "Countdown: 3");
        assert_eq!(out.payload.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn finishes_at_zero_without_new_payload() {
        let out = Countdown.execute(&ctx("0")).await.unwrap();
        assert_eq!(out.message, "Countdown finished!");
        assert!(out.payload.is_none());
    }

    #[tokio::test]
    async fn rejects_non_numbers() {
        for bad in ["", "ten", "-1", "1.5"] {
            let err = Countdown.execute(&ctx(bad)).await.unwrap_err();
            assert!(err.to_string().contains("invalid countdown number"), "{bad}");
        }
    }
}
