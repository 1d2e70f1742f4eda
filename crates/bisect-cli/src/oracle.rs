//! Works/doesn't-work verdicts between probes.

use async_trait::async_trait;
use npm_bisect_common::Result;
use tracing::debug;

use crate::driver::Oracle;
use crate::prompt;

/// Runs a user-supplied shell command; exit code zero means "works".
pub struct CommandOracle {
    command: String,
}

impl CommandOracle {
    pub fn new(command: String) -> Self {
        Self { command }
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    async fn works(&mut self) -> Result<bool> {
        debug!("Oracle exec: {}", self.command);
        let status = tokio::process::Command::new("sh")
            .args(["-c", &self.command])
            .status()
            .await?;
        Ok(status.success())
    }
}

/// Asks the user directly.
pub struct PromptOracle;

#[async_trait]
impl Oracle for PromptOracle {
    async fn works(&mut self) -> Result<bool> {
        prompt::confirm("Does the project work now?")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_command_oracle_exit_codes() {
        let mut works = CommandOracle::new("exit 0".to_string());
        assert!(works.works().await.unwrap());

        let mut broken = CommandOracle::new("exit 3".to_string());
        assert!(!broken.works().await.unwrap());
    }
}
