//! The normalization capability and the registry selecting it per provider.

use std::collections::HashMap;
use std::sync::Arc;

use cadence_core::UnifiedCalendarEvent;

use crate::connection::{CalendarConnection, ProviderKind};
use crate::error::NormalizationError;
use crate::native::NativeEvent;

/// Turns one provider-native event into a [`UnifiedCalendarEvent`].
///
/// Implementations are pure: no I/O, no clock. Attendee responses the
/// provider reports with an unrecognized value map to
/// [`cadence_core::AttendeeStatus::Pending`] rather than failing.
pub trait ProviderAdapter: Send + Sync {
    /// The provider this adapter understands.
    fn provider(&self) -> ProviderKind;

    /// Normalizes `native`, fetched through `connection`.
    ///
    /// # Errors
    ///
    /// Returns [`NormalizationError`] when the payload lacks a required field
    /// or carries a value that cannot be interpreted.
    fn normalize(
        &self,
        native: &NativeEvent,
        connection: &CalendarConnection,
    ) -> Result<UnifiedCalendarEvent, NormalizationError>;
}

/// Adapters keyed by the provider they handle.
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    adapters: HashMap<ProviderKind, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with every adapter compiled into this crate.
    pub fn with_defaults() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::new();
        #[cfg(feature = "google")]
        registry.register(crate::google::GoogleAdapter);
        #[cfg(feature = "microsoft")]
        registry.register(crate::microsoft::MicrosoftAdapter);
        #[cfg(feature = "caldav")]
        registry.register(crate::caldav::CalDavAdapter);
        registry
    }

    /// Adds `adapter`, replacing any adapter for the same provider.
    pub fn register(&mut self, adapter: impl ProviderAdapter + 'static) -> &mut Self {
        self.adapters.insert(adapter.provider(), Arc::new(adapter));
        self
    }

    pub fn get(&self, provider: ProviderKind) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }

    pub fn providers(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<_> = self.adapters.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("providers", &self.providers())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    struct FixedAdapter;

    impl ProviderAdapter for FixedAdapter {
        fn provider(&self) -> ProviderKind {
            ProviderKind::Google
        }

        fn normalize(
            &self,
            _native: &NativeEvent,
            connection: &CalendarConnection,
        ) -> Result<UnifiedCalendarEvent, NormalizationError> {
            let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
            Ok(UnifiedCalendarEvent::new(
                cadence_core::NaturalKey::new(&connection.workspace_id, "fixed", &connection.calendar_id),
                &connection.id,
                "fixed",
                at,
                at,
            ))
        }
    }

    #[test]
    fn register_replaces_same_provider() {
        let mut registry = AdapterRegistry::with_defaults();
        registry.register(FixedAdapter);

        let conn = CalendarConnection::new("c", "ws", ProviderKind::Google, "cal");
        let adapter = registry.get(ProviderKind::Google).unwrap();
        let event = adapter.normalize(&NativeEvent::ical(""), &conn).unwrap();
        assert_eq!(event.title, "fixed");
    }

    #[test]
    fn defaults_cover_all_providers() {
        let registry = AdapterRegistry::with_defaults();
        assert_eq!(
            registry.providers(),
            vec![ProviderKind::Google, ProviderKind::Microsoft, ProviderKind::CalDav]
        );
        assert!(AdapterRegistry::new().get(ProviderKind::CalDav).is_none());
    }
}
