//! Request executor
//!
//! Owns the one authenticated spreadsheet handle of a session and runs every
//! remote call through the retry policy. Nothing above this layer retries.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use sheetdrive_core::auth::CredentialSources;
//! use sheetdrive_core::executor::{RequestExecutor, ServiceAccountConnector};
//! use sheetdrive_core::Config;
//!
//! # async fn run() -> sheetdrive_core::Result<()> {
//! let config = Config::load()?;
//! let connector = ServiceAccountConnector::new(
//!     &CredentialSources::from_config(&config.auth),
//!     "1AbCdEf",
//!     &config,
//! )?;
//! let executor = RequestExecutor::new(Arc::new(connector), config.retry.policy());
//! let tabs = executor.list_sheets().await?;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::OnceCell;

use crate::auth::{self, Credential, CredentialSources};
use crate::codec::{
    filter_records, grid_to_records, A1Range, Condition, MatchMode, Record, WriteData,
};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::retry::{with_retry, RetryPolicy};
use crate::sheets::{Grid, HttpSheets, RemoteResult, SheetInfo, SheetRequest, SheetsApi};

/// Produces the authenticated handle for a session.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Arc<dyn SheetsApi>>;

    /// Identity the spreadsheet must be shared with, for permission hints.
    fn principal(&self) -> Option<String> {
        None
    }
}

/// Hands out an existing handle.
pub struct StaticConnector {
    api: Arc<dyn SheetsApi>,
    principal: Option<String>,
}

impl StaticConnector {
    pub fn new(api: Arc<dyn SheetsApi>) -> Self {
        Self {
            api,
            principal: None,
        }
    }

    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }
}

#[async_trait]
impl Connector for StaticConnector {
    async fn connect(&self) -> Result<Arc<dyn SheetsApi>> {
        Ok(Arc::clone(&self.api))
    }

    fn principal(&self) -> Option<String> {
        self.principal.clone()
    }
}

/// Authenticates as a service account and talks HTTP.
pub struct ServiceAccountConnector {
    credential: Credential,
    spreadsheet_id: String,
    endpoint: String,
    timeout: Duration,
    policy: RetryPolicy,
}

impl ServiceAccountConnector {
    /// Resolve the credential now, so a missing or malformed one fails
    /// before any network traffic.
    pub fn new(sources: &CredentialSources, spreadsheet_id: &str, config: &Config) -> Result<Self> {
        if spreadsheet_id.trim().is_empty() {
            return Err(Error::validation(
                "no spreadsheet id given",
                "pass --spreadsheet or set sheets.spreadsheet_id in config.toml",
            ));
        }
        let credential = auth::resolve_credential(sources)?;
        tracing::debug!(principal = %credential.client_email, "Resolved credential");

        Ok(Self {
            credential,
            spreadsheet_id: spreadsheet_id.to_string(),
            endpoint: config.sheets.endpoint.clone(),
            timeout: Duration::from_secs(config.sheets.timeout_secs),
            policy: config.retry.policy(),
        })
    }
}

#[async_trait]
impl Connector for ServiceAccountConnector {
    async fn connect(&self) -> Result<Arc<dyn SheetsApi>> {
        let assertion = auth::build_assertion(&self.credential, Utc::now())?;
        let http_client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        let principal = self.credential.client_email.as_str();
        let token = with_retry(&self.policy, "token", Some(principal), || {
            auth::request_token(&http_client, &self.credential, &assertion)
        })
        .await
        .map_err(|e| match e {
            // A refused grant is a credential problem, whatever the status.
            Error::Permission { message, .. } | Error::Validation { message, .. } => {
                Error::Auth(message)
            }
            other => other,
        })?;

        tracing::info!(
            principal,
            expires_at = %token.expires_at,
            "Authenticated with spreadsheet service"
        );
        let sheets = HttpSheets::new(
            &self.endpoint,
            &self.spreadsheet_id,
            &token.token,
            self.timeout,
        )?;
        Ok(Arc::new(sheets))
    }

    fn principal(&self) -> Option<String> {
        Some(self.credential.client_email.clone())
    }
}

/// Retry boundary over a lazily authenticated handle.
pub struct RequestExecutor {
    connector: Arc<dyn Connector>,
    policy: RetryPolicy,
    handle: OnceCell<Arc<dyn SheetsApi>>,
}

impl RequestExecutor {
    pub fn new(connector: Arc<dyn Connector>, policy: RetryPolicy) -> Self {
        Self {
            connector,
            policy,
            handle: OnceCell::new(),
        }
    }

    /// Executor over an already-built handle.
    pub fn from_api(api: Arc<dyn SheetsApi>, policy: RetryPolicy) -> Self {
        Self::new(Arc::new(StaticConnector::new(api)), policy)
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The authenticated handle. Concurrent first callers share a single
    /// connect; a failed connect is not memoized.
    pub async fn client(&self) -> Result<Arc<dyn SheetsApi>> {
        let handle = self
            .handle
            .get_or_try_init(|| async {
                tracing::debug!("Connecting to spreadsheet service");
                self.connector.connect().await
            })
            .await?;
        Ok(Arc::clone(handle))
    }

    /// Run `op` against the handle under the retry policy.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn SheetsApi>) -> Fut,
        Fut: Future<Output = RemoteResult<T>>,
    {
        let client = self.client().await?;
        let principal = self.connector.principal();
        with_retry(&self.policy, label, principal.as_deref(), || {
            op(Arc::clone(&client))
        })
        .await
    }

    pub async fn list_sheets(&self) -> Result<Vec<SheetInfo>> {
        self.execute("sheets", |api| async move { api.sheets().await })
            .await
    }

    pub async fn read_range(&self, range: &A1Range) -> Result<Grid> {
        self.execute("get_values", |api| {
            let range = range.clone();
            async move { api.get_values(&range).await }
        })
        .await
    }

    /// Read a range whose first row is a header row.
    pub async fn read_records(&self, range: &A1Range) -> Result<(Vec<String>, Vec<Record>)> {
        let grid = self.read_range(range).await?;
        Ok(grid_to_records(&grid))
    }

    /// Records of a header-row range that satisfy every condition.
    pub async fn find_records(
        &self,
        range: &A1Range,
        conditions: &[Condition],
        mode: MatchMode,
    ) -> Result<Vec<Record>> {
        let (_, records) = self.read_records(range).await?;
        Ok(filter_records(&records, conditions, mode)
            .into_iter()
            .cloned()
            .collect())
    }

    /// Overwrite cells starting at the range's top-left corner.
    pub async fn write_range(&self, range: &A1Range, data: WriteData) -> Result<()> {
        let rows = data.into_rows();
        self.execute("update_values", |api| {
            let range = range.clone();
            let rows = rows.clone();
            async move { api.update_values(&range, rows).await }
        })
        .await
    }

    pub async fn append_range(&self, range: &A1Range, data: WriteData) -> Result<()> {
        let rows = data.into_rows();
        self.execute("append_values", |api| {
            let range = range.clone();
            let rows = rows.clone();
            async move { api.append_values(&range, rows).await }
        })
        .await
    }

    pub async fn clear_range(&self, range: &A1Range) -> Result<()> {
        self.execute("clear_values", |api| {
            let range = range.clone();
            async move { api.clear_values(&range).await }
        })
        .await
    }

    pub async fn batch_update(&self, requests: Vec<SheetRequest>) -> Result<()> {
        self.execute("batch_update", |api| {
            let requests = requests.clone();
            async move { api.batch_update(requests).await }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::CellValue;
    use crate::sheets::{MemorySheets, RemoteError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingConnector {
        api: Arc<MemorySheets>,
        connects: AtomicUsize,
        fail_first: bool,
    }

    #[async_trait]
    impl Connector for CountingConnector {
        async fn connect(&self) -> Result<Arc<dyn SheetsApi>> {
            let n = self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_first && n == 0 {
                return Err(Error::Auth("token exchange rejected".to_string()));
            }
            Ok(self.api.clone())
        }
    }

    fn counting(fail_first: bool) -> Arc<CountingConnector> {
        Arc::new(CountingConnector {
            api: Arc::new(MemorySheets::new().with_sheet("Data")),
            connects: AtomicUsize::new(0),
            fail_first,
        })
    }

    #[tokio::test]
    async fn test_concurrent_first_use_connects_once() {
        let connector = counting(false);
        let executor = RequestExecutor::new(connector.clone(), RetryPolicy::immediate(3));

        let (a, b, c) = tokio::join!(executor.client(), executor.client(), executor.list_sheets());
        assert!(a.is_ok() && b.is_ok() && c.is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_memoized() {
        let connector = counting(true);
        let executor = RequestExecutor::new(connector.clone(), RetryPolicy::immediate(3));

        assert!(matches!(executor.client().await, Err(Error::Auth(_))));
        assert!(executor.client().await.is_ok());
        assert_eq!(connector.connects.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_write_records_then_filter() {
        let api = Arc::new(MemorySheets::new().with_sheet("People"));
        let executor = RequestExecutor::from_api(api.clone(), RetryPolicy::immediate(2));

        let mut alice = Record::new();
        alice.insert("name".into(), CellValue::text("Alice"));
        alice.insert("score".into(), CellValue::Number(0.0));
        let mut bob = Record::new();
        bob.insert("name".into(), CellValue::text("Bob"));
        bob.insert("score".into(), CellValue::Number(7.0));

        let range = A1Range::parse("People!A1").unwrap();
        executor
            .write_range(&range, WriteData::records(vec![alice, bob]))
            .await
            .unwrap();

        let whole = A1Range::sheet("People");
        let found = executor
            .find_records(&whole, &[Condition::new("name", "ali")], MatchMode::Loose)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["score"], CellValue::Number(0.0));

        let strict = executor
            .find_records(&whole, &[Condition::new("score", "")], MatchMode::Strict)
            .await
            .unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried_through_executor() {
        let api = Arc::new(MemorySheets::new().with_sheet("Data"));
        api.fail_times(2, RemoteError::status(429, "rate limited"));
        let executor = RequestExecutor::from_api(api.clone(), RetryPolicy::immediate(3));

        let tabs = executor.list_sheets().await.unwrap();
        assert_eq!(tabs[0].title, "Data");
        assert_eq!(api.calls(), 3);
    }

    #[tokio::test]
    async fn test_permission_hint_names_principal() {
        let api = Arc::new(MemorySheets::new().with_sheet("Data"));
        api.fail_next(RemoteError::status(403, "The caller does not have permission"));
        let connector = StaticConnector::new(api.clone()).with_principal("bot@demo.iam");
        let executor = RequestExecutor::new(Arc::new(connector), RetryPolicy::immediate(3));

        let err = executor.list_sheets().await.unwrap_err();
        assert!(err.hint().unwrap().contains("bot@demo.iam"));
        assert_eq!(api.calls(), 1);
    }
}
