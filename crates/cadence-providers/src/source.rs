//! The fetch side of the provider boundary.
//!
//! An [`EventSource`] returns native events for one connection, one page at a
//! time. The transport (HTTP client, CalDAV REPORT, token header) lives in
//! the implementation; the reconciler only sees pages of [`NativeEvent`]s.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use cadence_core::TimeWindow;

use crate::connection::{AccessToken, CalendarConnection, ProviderKind};
use crate::error::{ProviderError, ProviderResult};
use crate::native::NativeEvent;

/// A boxed future for the async trait methods of this crate.
///
/// Keeps the traits object-safe so sources can be stored as `Arc<dyn _>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Options for one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOptions {
    /// Only events overlapping this window are requested.
    pub window: TimeWindow,
    /// Upper bound on events per page.
    pub page_size: usize,
}

impl FetchOptions {
    pub fn new(window: TimeWindow) -> Self {
        Self {
            window,
            page_size: 250,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }
}

/// One page of native events.
#[derive(Debug, Clone, Default)]
pub struct FetchPage {
    pub events: Vec<NativeEvent>,
    /// Token for the next page, `None` on the last page.
    pub next_page_token: Option<String>,
}

impl FetchPage {
    pub fn last(events: Vec<NativeEvent>) -> Self {
        Self {
            events,
            next_page_token: None,
        }
    }

    pub fn with_next_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }
}

/// Fetches native events from an external calendar.
///
/// # Example Implementation
///
/// ```ignore
/// struct GoogleSource { client: reqwest::Client }
///
/// impl EventSource for GoogleSource {
///     fn name(&self) -> &str { "google" }
///
///     fn fetch_page<'a>(&'a self, connection: &'a CalendarConnection, token: &'a AccessToken,
///         options: FetchOptions, page_token: Option<String>,
///     ) -> BoxFuture<'a, ProviderResult<FetchPage>> {
///         Box::pin(async move {
///             // GET /calendars/{calendar_id}/events?timeMin=..&timeMax=..&pageToken=..
///             Ok(FetchPage::last(events))
///         })
///     }
/// }
/// ```
pub trait EventSource: Send + Sync {
    /// Name used in logs and errors (e.g. "google").
    fn name(&self) -> &str;

    /// Fetches the page identified by `page_token`, or the first page.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError`] on transport, authentication or response
    /// failures. The token is never refreshed here.
    fn fetch_page<'a>(
        &'a self,
        connection: &'a CalendarConnection,
        token: &'a AccessToken,
        options: FetchOptions,
        page_token: Option<String>,
    ) -> BoxFuture<'a, ProviderResult<FetchPage>>;
}

/// A source serving a fixed list of native events, paged by `page_size`.
///
/// Used for offline reconciliation of exported events and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    name: String,
    events: Vec<NativeEvent>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, events: Vec<NativeEvent>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }
}

impl EventSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page<'a>(
        &'a self,
        _connection: &'a CalendarConnection,
        _token: &'a AccessToken,
        options: FetchOptions,
        page_token: Option<String>,
    ) -> BoxFuture<'a, ProviderResult<FetchPage>> {
        Box::pin(async move {
            let offset = match page_token {
                None => 0,
                Some(token) => token.parse::<usize>().map_err(|_| {
                    ProviderError::invalid_response(format!("bad page token: {token}"))
                        .with_provider(&self.name)
                })?,
            };
            let end = (offset + options.page_size.max(1)).min(self.events.len());
            let events = self.events.get(offset..end).unwrap_or_default().to_vec();
            let page = FetchPage::last(events);
            Ok(if end < self.events.len() {
                page.with_next_page_token(end.to_string())
            } else {
                page
            })
        })
    }
}

/// A source that always fails with the same error.
#[derive(Debug)]
pub struct ErrorSource {
    name: String,
    error: ProviderError,
}

impl ErrorSource {
    pub fn new(name: impl Into<String>, error: ProviderError) -> Self {
        Self {
            name: name.into(),
            error,
        }
    }
}

impl EventSource for ErrorSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch_page<'a>(
        &'a self,
        _connection: &'a CalendarConnection,
        _token: &'a AccessToken,
        _options: FetchOptions,
        _page_token: Option<String>,
    ) -> BoxFuture<'a, ProviderResult<FetchPage>> {
        let error = self.error.detached().with_provider(&self.name);
        Box::pin(async move { Err(error) })
    }
}

/// Sources looked up per connection, falling back to one per provider.
#[derive(Clone, Default)]
pub struct SourceRegistry {
    by_connection: HashMap<String, Arc<dyn EventSource>>,
    by_provider: HashMap<ProviderKind, Arc<dyn EventSource>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serves `connection_id` from `source`.
    pub fn with_connection(
        mut self,
        connection_id: impl Into<String>,
        source: Arc<dyn EventSource>,
    ) -> Self {
        self.by_connection.insert(connection_id.into(), source);
        self
    }

    /// Serves every connection of `provider` without a dedicated source.
    pub fn with_provider(mut self, provider: ProviderKind, source: Arc<dyn EventSource>) -> Self {
        self.by_provider.insert(provider, source);
        self
    }

    pub fn get(&self, connection: &CalendarConnection) -> Option<Arc<dyn EventSource>> {
        self.by_connection
            .get(&connection.id)
            .or_else(|| self.by_provider.get(&connection.provider))
            .cloned()
    }
}

impl std::fmt::Debug for SourceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceRegistry")
            .field("connections", &self.by_connection.len())
            .field("providers", &self.by_provider.len())
            .finish()
    }
}
