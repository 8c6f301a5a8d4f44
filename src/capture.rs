use crate::screenshots::Screenshot;
use crate::state::SettingsStore;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::process::Command;
use tracing::{debug, warn};

const PATH_PLACEHOLDER: &str = "{path}";

#[async_trait]
pub trait ScreenCapture: Send + Sync {
    /// Grab the screen as PNG. `None` when nothing could be captured.
    async fn capture(&self) -> Option<Screenshot>;
}

/// Runs an external screenshot program from the current settings.
///
/// If the argv contains `{path}` it is replaced with a temporary file that
/// is read back afterwards, otherwise the PNG is taken from stdout.
#[derive(Clone)]
pub struct CommandCapture {
    settings: SettingsStore,
}

static CAPTURE_SEQ: AtomicU64 = AtomicU64::new(0);

impl CommandCapture {
    pub fn new(settings: SettingsStore) -> Self {
        Self { settings }
    }

    fn temp_path() -> PathBuf {
        let seq = CAPTURE_SEQ.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!(
            "snapsolve-{}-{}.png",
            std::process::id(),
            seq
        ))
    }

    async fn run(argv: &[String]) -> anyhow::Result<Vec<u8>> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow::anyhow!("capture command is empty"))?;

        let uses_file = args.iter().any(|a| a.contains(PATH_PLACEHOLDER));
        let path = Self::temp_path();
        let path_str = path.to_string_lossy().to_string();
        let args: Vec<String> = args
            .iter()
            .map(|a| a.replace(PATH_PLACEHOLDER, &path_str))
            .collect();

        debug!("Running capture command: {} {:?}", program, args);
        let output = Command::new(program).args(&args).output().await?;

        if !output.status.success() {
            let _ = tokio::fs::remove_file(&path).await;
            return Err(anyhow::anyhow!(
                "{} exited with {}: {}",
                program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let bytes = if uses_file {
            let bytes = tokio::fs::read(&path).await?;
            let _ = tokio::fs::remove_file(&path).await;
            bytes
        } else {
            output.stdout
        };

        if bytes.is_empty() {
            return Err(anyhow::anyhow!("{} produced no image data", program));
        }
        Ok(bytes)
    }
}

#[async_trait]
impl ScreenCapture for CommandCapture {
    async fn capture(&self) -> Option<Screenshot> {
        let argv = self.settings.snapshot().capture_command;
        match Self::run(&argv).await {
            Ok(bytes) => Some(Screenshot::from_base64(STANDARD.encode(bytes))),
            Err(e) => {
                warn!("Screen capture failed: {}", e);
                None
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::config::Config;

    fn capture_with(argv: &[&str]) -> CommandCapture {
        let config = Config {
            capture_command: argv.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        };
        CommandCapture::new(SettingsStore::new(config))
    }

    #[tokio::test]
    async fn test_reads_from_stdout() {
        let shot = capture_with(&["printf", "png-bytes"]).capture().await;
        assert_eq!(shot, Some(Screenshot::from_base64(STANDARD.encode("png-bytes"))));
    }

    #[tokio::test]
    async fn test_reads_from_placeholder_path() {
        let shot = capture_with(&["sh", "-c", "printf abc > \"$0\"", "{path}"])
            .capture()
            .await;
        assert_eq!(shot, Some(Screenshot::from_base64("YWJj")));
    }

    #[tokio::test]
    async fn test_failure_yields_none() {
        assert_eq!(capture_with(&["false"]).capture().await, None);
        assert_eq!(capture_with(&[]).capture().await, None);
        assert_eq!(
            capture_with(&["snapsolve-no-such-program"]).capture().await,
            None
        );
    }
}
