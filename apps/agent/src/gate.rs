//! Push notification gate.
//!
//! Every push is relayed to open pages regardless of preferences; the gate
//! only decides whether a *system* notification is shown on top. The
//! preference snapshot lives in the agent's durable store so the decision
//! works while no page is open.

use log::{debug, warn};
use std::sync::Arc;

use fieldops_core::push::{should_display, PushPayload};
use fieldops_storage_sqlite::PushPreferenceRepository;

use crate::bus::{AgentBus, AgentMessage};

/// What the platform should do with an incoming push.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationDecision {
    /// Show a system notification with this payload.
    Displayed(PushPayload),
    /// A page is focused or preferences turned it off; relay only.
    Suppressed(PushPayload),
}

/// Where a notification tap should land.
#[derive(Debug, Clone, PartialEq)]
pub enum ActivationTarget {
    /// An open page took the navigation.
    ExistingPage,
    /// No page is open; the platform should open one at this route.
    OpenNewPage(String),
}

pub struct PushGate {
    preferences: Arc<PushPreferenceRepository>,
    bus: AgentBus,
}

impl PushGate {
    pub fn new(preferences: Arc<PushPreferenceRepository>, bus: AgentBus) -> Self {
        Self { preferences, bus }
    }

    /// Handle a raw push message from the platform.
    ///
    /// The payload is always relayed to pages first. A system notification
    /// is then shown unless a page is focused or an explicit preference
    /// turns this event type or level off.
    pub fn handle_push(&self, raw: &serde_json::Value, any_page_focused: bool) -> NotificationDecision {
        let payload = PushPayload::normalize(raw);
        self.bus.publish(AgentMessage::PushReceived(payload.clone()));

        if any_page_focused {
            debug!("push relayed only, a page is focused: {}", payload.event_type);
            return NotificationDecision::Suppressed(payload);
        }

        // An unreadable snapshot must not swallow notifications.
        let snapshot = match self.preferences.load() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!("push preferences unavailable, allowing notification: {err}");
                None
            }
        };
        if should_display(snapshot.as_ref(), &payload) {
            NotificationDecision::Displayed(payload)
        } else {
            debug!("push suppressed by preference: {}", payload.event_type);
            NotificationDecision::Suppressed(payload)
        }
    }

    /// Handle a notification tap: route an open page there, or ask the
    /// platform for a new one.
    pub fn handle_activation(&self, route: impl Into<String>) -> ActivationTarget {
        let route = route.into();
        let reached = self.bus.publish(AgentMessage::PushNavigate(route.clone()));
        if reached > 0 {
            ActivationTarget::ExistingPage
        } else {
            ActivationTarget::OpenNewPage(route)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    use fieldops_core::push::PushPreferenceSnapshot;
    use fieldops_storage_sqlite::db::write_actor::spawn_writer;
    use fieldops_storage_sqlite::db::{create_pool, init, run_migrations};

    fn build_gate() -> (PushGate, AgentBus) {
        let app_data = tempdir()
            .expect("tempdir")
            .keep()
            .to_string_lossy()
            .to_string();
        let db_path = init(&app_data).expect("init db");
        run_migrations(&db_path).expect("migrate db");
        let pool = create_pool(&db_path).expect("create pool");
        let writer = spawn_writer(pool.as_ref().clone());
        let preferences = Arc::new(PushPreferenceRepository::new(pool, writer));
        let (bus, _page_rx) = AgentBus::new(8);
        (PushGate::new(preferences, bus.clone()), bus)
    }

    fn status_change() -> serde_json::Value {
        json!({
            "title": "Quote updated",
            "body": "Quote #18 moved to approved",
            "eventType": "status_change",
            "route": "/quotes/18"
        })
    }

    #[tokio::test]
    async fn unfocused_push_with_no_preferences_displays() {
        let (gate, _bus) = build_gate();
        let decision = gate.handle_push(&status_change(), false);
        assert!(matches!(decision, NotificationDecision::Displayed(_)));
    }

    #[tokio::test]
    async fn focused_page_suppresses_but_still_relays() {
        let (gate, bus) = build_gate();
        let mut page = bus.subscribe();

        let decision = gate.handle_push(&status_change(), true);
        assert!(matches!(decision, NotificationDecision::Suppressed(_)));

        // The page got the payload even though no notification was shown.
        match page.recv().await.expect("recv") {
            AgentMessage::PushReceived(payload) => {
                assert_eq!(payload.event_type, "status_change")
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn explicit_preference_off_suppresses_but_still_relays() {
        let (gate, bus) = build_gate();
        gate.preferences
            .save(PushPreferenceSnapshot::default().set("notify_status_change", false))
            .await
            .expect("save");
        let mut page = bus.subscribe();

        let decision = gate.handle_push(&status_change(), false);
        assert!(matches!(decision, NotificationDecision::Suppressed(_)));
        assert!(matches!(
            page.recv().await.expect("recv"),
            AgentMessage::PushReceived(_)
        ));
    }

    #[tokio::test]
    async fn unlisted_event_type_defaults_to_allowed() {
        let (gate, _bus) = build_gate();
        gate.preferences
            .save(PushPreferenceSnapshot::default().set("notify_new_message", false))
            .await
            .expect("save");

        let decision = gate.handle_push(&status_change(), false);
        assert!(matches!(decision, NotificationDecision::Displayed(_)));
    }

    #[tokio::test]
    async fn activation_routes_an_open_page() {
        let (gate, bus) = build_gate();
        let mut page = bus.subscribe();

        assert_eq!(gate.handle_activation("/quotes/18"), ActivationTarget::ExistingPage);
        assert_eq!(
            page.recv().await.expect("recv"),
            AgentMessage::PushNavigate("/quotes/18".into())
        );
    }

    #[tokio::test]
    async fn activation_without_pages_asks_for_a_new_one() {
        let (gate, _bus) = build_gate();
        assert_eq!(
            gate.handle_activation("/quotes/18"),
            ActivationTarget::OpenNewPage("/quotes/18".into())
        );
    }
}
