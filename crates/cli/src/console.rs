//! Interactive line-oriented console.
//!
//! Each input line is fed to [`Console::handle_line`], which returns the text
//! to print. `schedule` is a small dialogue: after the command the console
//! asks for an action choice and then (for most actions) a payload.

use std::{fmt::Write as _, sync::Arc};

use {
    cadence_actions::{CALL_API, COUNTDOWN, INSERT_LOG, PRINT_MESSAGE, SEND_EMAIL, WRITE_FILE},
    cadence_scheduler::{
        engine::SchedulerEngine,
        parse::format_time_ms,
        types::{Job, JobCreate, JobPatch},
    },
    tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt},
};

const HELP: &str = "\
Console CLI: available commands:
  list                          -> list all jobs
  schedule <name> <cron>        -> schedule job with name and cron (then choose action)
  reschedule <jobId> <cron>     -> change a job's cron expression
  run <jobId>                   -> fire a job now
  pause <jobId>                 -> pause job
  resume <jobId>                -> resume job
  delete <jobId>                -> delete job
  logs <jobId>                  -> show last logs for job
  status                        -> scheduler summary
  help                          -> show this help
  quit                          -> stop the scheduler and exit
";

const ACTION_MENU: &str = "\
Select an action for this job:
  1. Print a custom message
  2. Run a countdown timer
  3. Call an external API and log the response
  4. Write a message to a file
  5. Insert a log entry
  6. Send a fake 'email' notification
";

/// Number of log entries shown by `logs`.
const LOG_LIMIT: usize = 20;

/// Text produced for one input line.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub quit: bool,
}

impl Reply {
    fn line(text: impl Into<String>) -> Self {
        let mut text = text.into();
        text.push('\n');
        Self { text, quit: false }
    }

    fn prompt(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            quit: false,
        }
    }
}

enum Stage {
    ChooseAction,
    EnterPayload { action: &'static str },
}

struct PendingSchedule {
    name: String,
    cron: String,
    stage: Stage,
}

pub struct Console {
    engine: Arc<SchedulerEngine>,
    pending: Option<PendingSchedule>,
}

impl Console {
    pub fn new(engine: Arc<SchedulerEngine>) -> Self {
        Self {
            engine,
            pending: None,
        }
    }

    /// Read commands until `quit` or end of input.
    pub async fn run<R, W>(mut self, reader: R, mut writer: W) -> anyhow::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        writer.write_all(HELP.as_bytes()).await?;
        writer.flush().await?;

        let mut lines = reader.lines();
        while let Some(line) = lines.next_line().await? {
            let reply = self.handle_line(&line).await;
            writer.write_all(reply.text.as_bytes()).await?;
            writer.flush().await?;
            if reply.quit {
                break;
            }
        }
        Ok(())
    }

    pub async fn handle_line(&mut self, line: &str) -> Reply {
        let input = line.trim();
        if let Some(pending) = self.pending.take() {
            return self.continue_schedule(pending, input).await;
        }
        if input.is_empty() {
            return Reply::default();
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        let cmd = parts[0].to_ascii_lowercase();
        let args = &parts[1..];

        match cmd.as_str() {
            "list" => self.list().await,
            "schedule" => self.begin_schedule(args),
            "reschedule" => self.reschedule(args).await,
            "run" | "pause" | "resume" | "delete" => self.job_op(&cmd, args).await,
            "logs" => self.logs(args).await,
            "status" => self.status().await,
            "help" => Reply::prompt(HELP),
            "quit" | "exit" => Reply {
                text: "Shutting down.\n".into(),
                quit: true,
            },
            _ => Reply::line(format!("Unknown command: {}. Type 'help'", parts[0])),
        }
    }

    // ── Commands ────────────────────────────────────────────────────────────

    async fn list(&self) -> Reply {
        let jobs = self.engine.list_jobs().await;
        if jobs.is_empty() {
            return Reply::line("No jobs.");
        }
        let mut text = String::new();
        for job in &jobs {
            let _ = writeln!(text, "{}", job_line(job));
        }
        Reply::prompt(text)
    }

    fn begin_schedule(&mut self, args: &[&str]) -> Reply {
        if args.len() < 2 {
            return Reply::line("Usage: schedule <name> <cronExpression>");
        }
        let name = args[0].to_string();
        let cron = args[1..].join(" ");
        if !self.engine.clock().is_valid(&cron) {
            return Reply::line(format!("Invalid cron expression: {cron}"));
        }
        self.pending = Some(PendingSchedule {
            name,
            cron,
            stage: Stage::ChooseAction,
        });
        Reply::prompt(ACTION_MENU)
    }

    async fn continue_schedule(&mut self, mut pending: PendingSchedule, input: &str) -> Reply {
        match pending.stage {
            Stage::ChooseAction => {
                let (action, prompt) = match input {
                    "1" => (PRINT_MESSAGE, "Enter message: "),
                    "2" => (COUNTDOWN, "Enter countdown start number: "),
                    "3" => (CALL_API, "Enter API URL: "),
                    "4" => (WRITE_FILE, "Enter file path: "),
                    "5" => {
                        let payload = format!("Insert log for job {}", pending.name);
                        return self.finish_schedule(pending, INSERT_LOG, payload).await;
                    },
                    "6" => (SEND_EMAIL, "Enter fake recipient email: "),
                    _ => {
                        let payload = format!("Hello from {}", pending.name);
                        let mut reply = self.finish_schedule(pending, PRINT_MESSAGE, payload).await;
                        reply.text.insert_str(0, "Invalid choice. Defaulting to print_message.\n");
                        return reply;
                    },
                };
                pending.stage = Stage::EnterPayload { action };
                self.pending = Some(pending);
                Reply::prompt(prompt)
            },
            Stage::EnterPayload { action } => {
                self.finish_schedule(pending, action, input.to_string()).await
            },
        }
    }

    async fn finish_schedule(
        &self,
        pending: PendingSchedule,
        action: &str,
        payload: String,
    ) -> Reply {
        let create = JobCreate::new(pending.name, pending.cron, action, payload);
        match self.engine.submit(create).await {
            Ok(job) => Reply::line(format!(
                "Scheduled job id={} with action={} (next run {})",
                job.id,
                job.action,
                job.next_fire_at_ms.map_or_else(|| "-".to_string(), format_time_ms)
            )),
            Err(e) => Reply::line(format!("Error: {e}")),
        }
    }

    async fn reschedule(&self, args: &[&str]) -> Reply {
        if args.len() < 2 {
            return Reply::line("Usage: reschedule <jobId> <cronExpression>");
        }
        let patch = JobPatch {
            cron_expression: Some(args[1..].join(" ")),
            ..Default::default()
        };
        match self.engine.reschedule(args[0], patch).await {
            Ok(Some(job)) => Reply::line(format!("Rescheduled. {}", job_line(&job))),
            Ok(None) => Reply::line("Failed to reschedule."),
            Err(e) => Reply::line(format!("Error: {e}")),
        }
    }

    async fn job_op(&self, cmd: &str, args: &[&str]) -> Reply {
        let Some(id) = args.first() else {
            return Reply::line(format!("Usage: {cmd} <jobId>"));
        };
        let (result, done, refused) = match cmd {
            "pause" => (self.engine.pause(id).await, "Paused.", "Failed to pause."),
            "resume" => (self.engine.resume(id).await, "Resumed.", "Failed to resume."),
            "delete" => (self.engine.delete(id).await, "Deleted.", "Failed to delete."),
            _ => (Ok(self.engine.run_now(id).await), "Triggered.", "Failed to trigger."),
        };
        match result {
            Ok(true) => Reply::line(done),
            Ok(false) => Reply::line(refused),
            Err(e) => Reply::line(format!("Error: {e}")),
        }
    }

    async fn logs(&self, args: &[&str]) -> Reply {
        let Some(id) = args.first() else {
            return Reply::line("Usage: logs <jobId>");
        };
        let records = match self.engine.get_logs(id).await {
            Ok(records) => records,
            Err(e) => return Reply::line(format!("Error: {e}")),
        };
        if records.is_empty() {
            return Reply::line("No logs.");
        }
        let mut text = String::new();
        for r in records.iter().take(LOG_LIMIT) {
            let _ = writeln!(
                text,
                "{} | attempt {} | {} | {} ({} ms)",
                format_time_ms(r.timestamp_ms),
                r.attempt,
                r.outcome,
                r.message,
                r.duration_ms
            );
        }
        Reply::prompt(text)
    }

    async fn status(&self) -> Reply {
        let s = self.engine.status().await;
        Reply::line(format!(
            "running={} jobs={} paused={} failed={} pending_triggers={} in_flight={} next={} tz={}",
            s.running,
            s.job_count,
            s.paused_count,
            s.failed_count,
            s.pending_triggers,
            s.in_flight,
            s.next_fire_at_ms.map_or_else(|| "-".to_string(), format_time_ms),
            self.engine.clock().timezone_name(),
        ))
    }
}

fn job_line(job: &Job) -> String {
    format!(
        "{} | {} | {} | {} | action={} | next={}",
        job.id,
        job.name,
        job.status,
        job.cron_expression,
        job.action,
        job.next_fire_at_ms.map_or_else(|| "-".to_string(), format_time_ms)
    )
}
