//! Provider boundary: fetching and normalizing external calendar events.
//!
//! - [`EventSource`] - fetches pages of provider-native events for a connection
//! - [`ProviderAdapter`] - normalizes one [`NativeEvent`] into a unified event
//! - [`AdapterRegistry`] - selects the adapter from the connection's provider
//! - [`ProviderError`] / [`NormalizationError`] - fetch and per-event failures
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  ┌──────────────┐  ┌──────────────┐
//! │ Google API   │  │ Graph API    │  │ CalDAV server│
//! └──────┬───────┘  └──────┬───────┘  └──────┬───────┘
//!        │     EventSource::fetch_page        │
//!        └────────────────┬───────────────────┘
//!                         ▼
//!                  ┌─────────────┐
//!                  │ NativeEvent │
//!                  └──────┬──────┘
//!                         ▼ ProviderAdapter::normalize()
//!              ┌──────────────────────┐
//!              │ UnifiedCalendarEvent │
//!              └──────────────────────┘
//! ```

pub mod adapter;
#[cfg(feature = "caldav")]
pub mod caldav;
pub mod connection;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
#[cfg(feature = "microsoft")]
pub mod microsoft;
pub mod native;
mod normalize;
pub mod source;

pub use adapter::{AdapterRegistry, ProviderAdapter};
pub use connection::{AccessToken, CalendarConnection, ProviderKind};
pub use error::{NormalizationError, ProviderError, ProviderErrorCode, ProviderResult};
pub use native::NativeEvent;
pub use source::{
    BoxFuture, ErrorSource, EventSource, FetchOptions, FetchPage, SourceRegistry, StaticSource,
};
