//! nginx binary adapter.

use async_trait::async_trait;

use crate::control::command::run;
use crate::control::{CommandError, ProxyControl};

#[derive(Debug, Clone)]
pub struct NginxCommand {
    binary: String,
}

impl NginxCommand {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for NginxCommand {
    fn default() -> Self {
        Self::new("nginx")
    }
}

#[async_trait]
impl ProxyControl for NginxCommand {
    async fn test_config(&self) -> Result<(), CommandError> {
        run(&self.binary, &["-t"], None).await?;
        Ok(())
    }

    async fn reload(&self) -> Result<(), CommandError> {
        run(&self.binary, &["-s", "reload"], None).await?;
        Ok(())
    }
}
