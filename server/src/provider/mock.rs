//! Mock Provider Client
//!
//! Scriptable [`ProviderClient`] for integration tests and local development.
//! Defaults to the happy path; individual operations can be made to fail, and
//! call counts are recorded for assertions.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{Duration, Utc};

use super::{ProviderClient, ProviderError, RefreshGrant, TokenGrant};

struct MockBehavior {
    exchange: Result<TokenGrant, ProviderError>,
    refresh: Result<RefreshGrant, ProviderError>,
    subscribe: Result<(), ProviderError>,
}

pub struct MockProviderClient {
    behavior: Mutex<MockBehavior>,
    pub exchange_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    pub subscribe_calls: AtomicUsize,
}

impl MockProviderClient {
    #[must_use]
    pub fn new() -> Self {
        Self {
            behavior: Mutex::new(MockBehavior {
                exchange: Ok(Self::grant("page-1001", "Acme Careers", 60)),
                refresh: Ok(RefreshGrant {
                    access_token: "refreshed-access-token".to_string(),
                    expires_at: Utc::now() + Duration::days(60),
                }),
                subscribe: Ok(()),
            }),
            exchange_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            subscribe_calls: AtomicUsize::new(0),
        }
    }

    /// A grant for the given page, valid for `valid_days` from now.
    #[must_use]
    pub fn grant(external_page_id: &str, page_name: &str, valid_days: i64) -> TokenGrant {
        TokenGrant {
            access_token: format!("mock-token-{external_page_id}"),
            expires_at: Utc::now() + Duration::days(valid_days),
            external_page_id: external_page_id.to_string(),
            page_name: page_name.to_string(),
        }
    }

    pub fn set_exchange(&self, result: Result<TokenGrant, ProviderError>) {
        self.lock().exchange = result;
    }

    pub fn set_refresh(&self, result: Result<RefreshGrant, ProviderError>) {
        self.lock().refresh = result;
    }

    pub fn set_subscribe(&self, result: Result<(), ProviderError>) {
        self.lock().subscribe = result;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockBehavior> {
        match self.behavior.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for MockProviderClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProviderClient for MockProviderClient {
    fn authorize_url(&self, state: &str, nonce: &str) -> String {
        format!("https://pages.example.com/oauth/authorize?state={state}&nonce={nonce}")
    }

    async fn exchange_code(&self, _code: &str) -> Result<TokenGrant, ProviderError> {
        self.exchange_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().exchange.clone()
    }

    async fn refresh_token(&self, _current_token: &str) -> Result<RefreshGrant, ProviderError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().refresh.clone()
    }

    async fn subscribe_webhooks(
        &self,
        _external_page_id: &str,
        _access_token: &str,
    ) -> Result<(), ProviderError> {
        self.subscribe_calls.fetch_add(1, Ordering::SeqCst);
        self.lock().subscribe
    }
}
