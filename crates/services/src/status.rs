use std::sync::Arc;

use domains::{Result, ServiceStatus, StatusRepository};
use tracing::{info, instrument};

pub struct StatusService {
    status: Arc<dyn StatusRepository>,
}

impl StatusService {
    pub fn new(status: Arc<dyn StatusRepository>) -> Self {
        Self { status }
    }

    #[instrument(skip(self))]
    pub async fn status(&self) -> Result<ServiceStatus> {
        Ok(self.status.status().await?)
    }

    /// Drops every user, forum, thread, vote and post.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.status.clear().await?;
        info!("all data cleared");
        Ok(())
    }
}
