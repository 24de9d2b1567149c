//! Shared state for the API router.

use std::sync::Arc;

use rusqlite::Connection;

use crate::config::AppConfig;
use crate::db::{open_database, DatabaseError};
use crate::pipeline::analysis::ConversationAnalyzer;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub config: Arc<AppConfig>,
    pub analyzer: Arc<ConversationAnalyzer>,
}

impl ApiContext {
    pub fn new(config: AppConfig, analyzer: ConversationAnalyzer) -> Self {
        Self {
            config: Arc::new(config),
            analyzer: Arc::new(analyzer),
        }
    }

    /// Open a connection to the configured database. One per request.
    pub fn open_db(&self) -> Result<Connection, DatabaseError> {
        open_database(&self.config.database_path)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::pipeline::analysis::{LlmClient, MockLlmClient};
    use std::path::Path;

    /// Context backed by a database file under `dir` and a mock model that
    /// always answers `response`.
    pub(crate) fn test_context(dir: &Path, response: &str) -> ApiContext {
        test_context_with(dir, MockLlmClient::new(response))
    }

    pub(crate) fn test_context_with<C>(dir: &Path, llm: C) -> ApiContext
    where
        C: LlmClient + Send + Sync + 'static,
    {
        let db_path = dir.join("emr.db").to_string_lossy().into_owned();
        let config = AppConfig::from_lookup(|key| match key {
            "AZURE_API_KEY" => Some("test-key".into()),
            "AZURE_ENDPOINT" => Some("http://127.0.0.1:1".into()),
            "AZURE_API_VERSION" => Some("2024-02-01".into()),
            "AZURE_DEPLOYMENT_NAME" => Some("test-deployment".into()),
            "DATABASE_PATH" => Some(db_path.clone()),
            _ => None,
        })
        .unwrap();
        ApiContext::new(
            config,
            ConversationAnalyzer::new(Box::new(llm), "test-deployment"),
        )
    }
}
