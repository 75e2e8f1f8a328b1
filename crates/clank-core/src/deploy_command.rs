//! A [`TokenDeployer`] that delegates to an external command.
//!
//! The command receives the [`DeployConfig`] as JSON on stdin and must print a
//! [`DeployOutcome`] JSON object on stdout. Anything else is reported as a
//! failed deploy.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use clank_proto::{DeployConfig, DeployOutcome, TokenDeployer};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{info, warn};

/// Runs `program args...` once per deploy.
#[derive(Debug, Clone)]
pub struct CommandDeployer {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandDeployer {
    /// Returns `None` when `command` is empty.
    pub fn from_command(command: &[String], timeout: Duration) -> Option<Self> {
        let (program, args) = command.split_first()?;
        Some(Self {
            program: program.clone(),
            args: args.to_vec(),
            timeout,
        })
    }

    async fn run(&self, config: &DeployConfig) -> anyhow::Result<DeployOutcome> {
        let input = serde_json::to_vec(config)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(&input).await?;
            drop(stdin); // EOF
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| anyhow::anyhow!("deploy command timed out after {:?}", self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let detail = stderr.lines().last().unwrap_or("").trim();
            anyhow::bail!("deploy command exited with {}: {detail}", output.status);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        // Tools often log before the result; the outcome is the last JSON line.
        let line = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|l| l.starts_with('{'))
            .ok_or_else(|| anyhow::anyhow!("deploy command printed no JSON outcome"))?;
        Ok(serde_json::from_str(line)?)
    }
}

#[async_trait]
impl TokenDeployer for CommandDeployer {
    async fn deploy(&self, config: &DeployConfig) -> DeployOutcome {
        info!(program = %self.program, symbol = %config.symbol, "Running deploy command");
        match self.run(config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "Deploy command failed");
                DeployOutcome::failed(e.to_string())
            }
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use clank_proto::{DraftContext, Fees};
    use std::collections::BTreeMap;

    fn config() -> DeployConfig {
        DeployConfig {
            name: "Moon Cat".to_string(),
            symbol: "MCAT".to_string(),
            image: None,
            description: None,
            token_admin: "0x1111111111111111111111111111111111111111".to_string(),
            fees: Fees::default(),
            context: DraftContext::default(),
            socials: BTreeMap::new(),
            spoof_to: None,
        }
    }

    fn sh(script: &str) -> CommandDeployer {
        CommandDeployer::from_command(
            &["sh".to_string(), "-c".to_string(), script.to_string()],
            Duration::from_secs(10),
        )
        .unwrap()
    }

    #[test]
    fn empty_command_is_none() {
        assert!(CommandDeployer::from_command(&[], Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn parses_outcome_after_log_lines() {
        let deployer = sh(
            r#"cat > /dev/null; echo "deploying..."; echo '{"success":true,"address":"0xabc","txHash":"0xdef"}'"#,
        );
        let outcome = deployer.deploy(&config()).await;
        assert!(outcome.success);
        assert_eq!(outcome.address.as_deref(), Some("0xabc"));
        assert_eq!(outcome.tx_hash.as_deref(), Some("0xdef"));
    }

    #[tokio::test]
    async fn config_is_sent_on_stdin() {
        // Echo the symbol back through the outcome's address field.
        let deployer = sh(
            r#"sym=$(sed -n 's/.*"symbol":"\([A-Z]*\)".*/\1/p'); echo "{\"success\":true,\"address\":\"$sym\"}""#,
        );
        let outcome = deployer.deploy(&config()).await;
        assert_eq!(outcome.address.as_deref(), Some("MCAT"));
    }

    #[tokio::test]
    async fn non_zero_exit_is_a_failed_outcome() {
        let deployer = sh("cat > /dev/null; echo 'rpc unavailable' >&2; exit 3");
        let outcome = deployer.deploy(&config()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("rpc unavailable"));
    }

    #[tokio::test]
    async fn missing_json_is_a_failed_outcome() {
        let deployer = sh("cat > /dev/null; echo done");
        let outcome = deployer.deploy(&config()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("no JSON outcome"));
    }

    #[tokio::test]
    async fn timeout_is_a_failed_outcome() {
        let deployer = CommandDeployer::from_command(
            &["sh".to_string(), "-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        )
        .unwrap();
        let outcome = deployer.deploy(&config()).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
    }
}
