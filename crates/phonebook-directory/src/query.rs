//! Query Engine
//!
//! bind → search → normalize → release → sort, raced against a request
//! deadline. Sorting only happens once the full result set is in.

use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::collation::sort_records;
use crate::entry::normalize;
use crate::error::{DirectoryResult, Operation};
use crate::filter::build_filter;
use crate::record::DirectoryRecord;
use crate::session::{with_deadline, Directory, SearchRequest};

/// Read path over the directory.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    directory: Directory,
}

impl QueryEngine {
    pub fn new(directory: Directory) -> Self {
        Self { directory }
    }

    /// Search with the configured request deadline.
    pub async fn query(&self, free_text: Option<&str>) -> DirectoryResult<Vec<DirectoryRecord>> {
        self.query_within(free_text, self.directory.config().request_timeout())
            .await
    }

    /// Search, failing with a request timeout once `deadline` elapses.
    ///
    /// A session still open at the deadline is closed before returning.
    #[instrument(skip(self), fields(deadline_ms = deadline.as_millis() as u64))]
    pub async fn query_within(
        &self,
        free_text: Option<&str>,
        deadline: Duration,
    ) -> DirectoryResult<Vec<DirectoryRecord>> {
        let result = with_deadline(Operation::Request, deadline, self.collect(free_text)).await;
        match &result {
            Ok(records) => info!(count = records.len(), "Directory query completed"),
            Err(e) => warn!(error = %e, code = e.error_code(), "Directory query failed"),
        }
        result
    }

    /// The search request a query runs.
    pub fn search_request(&self, free_text: Option<&str>) -> SearchRequest {
        let config = self.directory.config();
        SearchRequest {
            base_dn: config.search_base().to_string(),
            filter: build_filter(&config.base_filter, free_text),
            scope: config.search_scope,
            attributes: config.search_attributes(),
            timeout: config.operation_timeout(),
            page_size: config.connection.page_size,
        }
    }

    async fn collect(&self, free_text: Option<&str>) -> DirectoryResult<Vec<DirectoryRecord>> {
        let request = self.search_request(free_text);
        let mut session = self.directory.open().await?;
        let entries = session.search(&request).await;
        session.release().await;

        let mut records: Vec<DirectoryRecord> = entries?.iter().map(normalize).collect();
        sort_records(&mut records);
        Ok(records)
    }
}
