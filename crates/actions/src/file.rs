//! `write_file`: append a timestamped line to the file named in the payload.

use std::path::{Path, PathBuf};

use {
    anyhow::{Context, bail},
    async_trait::async_trait,
    cadence_config::ActionsConfig,
    cadence_scheduler::action::{ActionContext, ActionHandler, ActionOutcome},
    tokio::io::AsyncWriteExt,
    tracing::debug,
};

pub struct WriteFile {
    base_dir: Option<PathBuf>,
}

impl WriteFile {
    pub fn from_config(config: &ActionsConfig) -> Self {
        Self {
            base_dir: config.write_file_dir.clone(),
        }
    }

    fn resolve(&self, raw: &str) -> anyhow::Result<PathBuf> {
        let raw = raw.trim();
        if raw.is_empty() {
            bail!("write_file needs a file path in the payload");
        }
        let path = Path::new(raw);
        Ok(match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        })
    }
}

#[async_trait]
impl ActionHandler for WriteFile {
    async fn execute(&self, ctx: &ActionContext) -> anyhow::Result<ActionOutcome> {
        let path = self.resolve(&ctx.payload)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let line = format!(
            "Log from job {} at {}\n",
            ctx.job_name,
            chrono::Utc::now().to_rfc3339()
        );
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        debug!(job = %ctx.job_name, path = %path.display(), "appended to file");
        Ok(ActionOutcome::ok(format!("File write successful: {}", path.display())))
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(payload: &str) -> ActionContext {
        ActionContext {
            job_id: "j1".into(),
            job_name: "audit".into(),
            attempt: 1,
            payload: payload.into(),
        }
    }

    #[tokio::test]
    async fn appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        let handler = WriteFile { base_dir: None };

        for _ in 0..2 {
            let out = handler.execute(&ctx(path.to_str().unwrap())).await.unwrap();
            assert!(out.ok);
        }

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.starts_with("Log from job audit at ")));
    }

    #[tokio::test]
    async fn relative_paths_resolve_against_base_dir() {
        let dir = tempfile::tempdir().unwrap();
        let handler = WriteFile::from_config(&ActionsConfig {
            write_file_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        });

        handler.execute(&ctx("nested/run.log")).await.unwrap();
        assert!(dir.path().join("nested/run.log").exists());
    }

    #[tokio::test]
    async fn empty_payload_is_error() {
        let handler = WriteFile { base_dir: None };
        assert!(handler.execute(&ctx("  ")).await.is_err());
    }
}
