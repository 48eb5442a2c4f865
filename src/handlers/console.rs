//! Log events instead of delivering them anywhere.

use async_trait::async_trait;
use tracing::error;

use super::{Event, Handler};
use crate::error::Result;

pub struct ConsoleHandler;

#[async_trait]
impl Handler for ConsoleHandler {
    fn name(&self) -> &'static str {
        "console"
    }

    async fn handle(&self, event: Event) -> Result<()> {
        error!(
            namespace = %event.namespace,
            pod = %event.name,
            container = %event.container,
            reason = %event.reason,
            message = %event.message,
            logs = ?event.logs,
            "{}",
            event.summary()
        );
        Ok(())
    }
}
