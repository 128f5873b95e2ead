//! `wg` / `wg-quick` adapter.

use async_trait::async_trait;

use crate::control::command::{run, run_shell};
use crate::control::{CommandError, WgControl};

#[derive(Debug, Default, Clone)]
pub struct WgCommand;

impl WgCommand {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WgControl for WgCommand {
    async fn gen_private_key(&self) -> Result<String, CommandError> {
        run("wg", &["genkey"], None).await
    }

    async fn public_key(&self, private_key: &str) -> Result<String, CommandError> {
        run("wg", &["pubkey"], Some(private_key.as_bytes())).await
    }

    async fn gen_preshared_key(&self) -> Result<String, CommandError> {
        run("wg", &["genpsk"], None).await
    }

    async fn sync_conf(&self, interface: &str) -> Result<(), CommandError> {
        run_shell(&format!("wg syncconf {0} <(wg-quick strip {0})", interface)).await?;
        Ok(())
    }

    async fn quick_up(&self, interface: &str) -> Result<(), CommandError> {
        run("wg-quick", &["up", interface], None).await?;
        Ok(())
    }

    async fn quick_down(&self, interface: &str) -> Result<(), CommandError> {
        run("wg-quick", &["down", interface], None).await?;
        Ok(())
    }

    async fn dump(&self, interface: &str) -> Result<String, CommandError> {
        run("wg", &["show", interface, "dump"], None).await
    }
}
