//! Handlers that only report: print, log insert and the fake mailer.

use {
    async_trait::async_trait,
    cadence_scheduler::action::{ActionContext, ActionHandler, ActionOutcome},
    tracing::info,
};

/// Writes the payload to stdout.
pub struct PrintMessage;

#[async_trait]
impl ActionHandler for PrintMessage {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        println!("[Job {}] {}", ctx.job_name, ctx.payload);
        Ok(ActionOutcome::ok(ctx.payload.clone()))
    }
}

/// Stores the payload as the execution log message.
pub struct InsertLog;

#[async_trait]
impl ActionHandler for InsertLog {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        info!(job = %ctx.job_name, entry = %ctx.payload, "log entry inserted");
        Ok(ActionOutcome::ok(format!("Inserted log: {}", ctx.payload)))
    }
}

/// Pretends to send an email to the address in the payload.
pub struct SendEmail;

#[async_trait]
impl ActionHandler for SendEmail {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        let to = ctx.payload.trim();
        if !looks_like_email(to) {
            anyhow::bail!("invalid email address: {to:?}");
        }
        info!(job = %ctx.job_name, to, "sending fake email");
        Ok(ActionOutcome::ok(format!("Fake email sent to {to}")))
    }
}

fn looks_like_email(addr: &str) -> bool {
    let Some((local, domain)) = addr.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !addr.contains(char::is_whitespace)
        && domain
            .split('.')
            .filter(|part| !part.is_empty())
            .count()
            >= 2
        && !domain.starts_with('.')
        && !domain.ends_with('.')
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(payload: &str) -> ActionContext {
        ActionContext {
            job_id: "j1".into(),
            job_name: "test".into(),
            attempt: 1,
            payload: payload.into(),
        }
    }

    #[tokio::test]
    async fn print_echoes_payload() {
        let out = PrintMessage.execute(&ctx("hello")).await.unwrap();
        assert!(out.ok);
        assert_eq!(out.message, "hello");
        assert!(out.payload.is_none());
    }

    #[tokio::test]
    async fn insert_log_records_payload() {
        let out = InsertLog.execute(&ctx("disk at 91%")).await.unwrap();
        assert_eq!(out.message, "Inserted log: disk at 91%");
    }

    #[tokio::test]
    async fn send_email_validates_address() {
        let out = SendEmail.execute(&ctx(" ops@example.com ")).await.unwrap();
        assert_eq!(out.message, "Fake email sent to ops@example.com");
        for bad in ["", "nobody", "a@b", "@example.com", "a@@example.com", "a b@example.com", "a@example."] {
            assert!(SendEmail.execute(&ctx(bad)).await.is_err(), "{bad}");
        }
    }
}
