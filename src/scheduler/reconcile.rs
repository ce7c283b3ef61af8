//! Message reconciliation: edit the posted status message or create it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::discord::{ChatClient, MessageHandle};
use crate::presentation::RenderedPayload;

/// What happened to one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Created(MessageHandle),
    Edited(MessageHandle),
    DestinationUnavailable { reason: String },
    DeliveryFailed { reason: String },
}

impl ReconcileOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, ReconcileOutcome::Created(_) | ReconcileOutcome::Edited(_))
    }
}

/// Tracks the one live status message per destination.
pub struct MessageReconciler {
    client: Arc<dyn ChatClient>,
    handles: Mutex<HashMap<String, MessageHandle>>,
}

impl MessageReconciler {
    pub fn new(client: Arc<dyn ChatClient>) -> Self {
        Self {
            client,
            handles: Mutex::new(HashMap::new()),
        }
    }

    pub fn client(&self) -> &Arc<dyn ChatClient> {
        &self.client
    }

    /// Current handle for `destination_id`, if a message was posted.
    pub fn handle(&self, destination_id: &str) -> Option<MessageHandle> {
        self.lock().get(destination_id).cloned()
    }

    pub fn handle_count(&self) -> usize {
        self.lock().len()
    }

    /// Deliver `payload` to `destination_id`, editing the tracked message if any.
    ///
    /// A failed edit is not retried as a create, so a transient error never
    /// leaves two status messages in one channel.
    pub async fn reconcile(&self, destination_id: &str, payload: &RenderedPayload) -> ReconcileOutcome {
        let destination = match self.client.resolve(destination_id).await {
            Ok(Some(d)) => d,
            Ok(None) => {
                tracing::warn!("Destination {} not found, skipping delivery", destination_id);
                return ReconcileOutcome::DestinationUnavailable {
                    reason: "destination not found".to_string(),
                };
            }
            Err(e) => {
                tracing::warn!("Failed to resolve destination {}: {}", destination_id, e);
                return ReconcileOutcome::DestinationUnavailable { reason: e.to_string() };
            }
        };

        if let Some(handle) = self.handle(destination_id) {
            return match self.client.edit(&handle, payload).await {
                Ok(()) => {
                    tracing::debug!("Edited message {} in {}", handle.message_id, destination_id);
                    ReconcileOutcome::Edited(handle)
                }
                Err(e) => {
                    tracing::error!("Failed to edit message {} in {}: {}", handle.message_id, destination_id, e);
                    ReconcileOutcome::DeliveryFailed { reason: e.to_string() }
                }
            };
        }

        match self.client.send(&destination, payload).await {
            Ok(handle) => {
                tracing::info!("Posted status message {} in {}", handle.message_id, destination_id);
                self.lock().insert(destination_id.to_string(), handle.clone());
                ReconcileOutcome::Created(handle)
            }
            Err(e) => {
                tracing::error!("Failed to post message in {}: {}", destination_id, e);
                ReconcileOutcome::DeliveryFailed { reason: e.to_string() }
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MessageHandle>> {
        self.handles.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::discord::{ChatError, Destination};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory chat platform.
    #[derive(Default)]
    pub(crate) struct FakeChat {
        pub missing: HashSet<String>,
        pub fail_edit: bool,
        pub fail_send: bool,
        pub next_id: AtomicUsize,
        pub sent: Mutex<Vec<(String, RenderedPayload)>>,
        pub edited: Mutex<Vec<(MessageHandle, RenderedPayload)>>,
    }

    impl FakeChat {
        pub fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }

        pub fn edited_count(&self) -> usize {
            self.edited.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatClient for FakeChat {
        async fn resolve(&self, channel_id: &str) -> Result<Option<Destination>, ChatError> {
            if self.missing.contains(channel_id) {
                return Ok(None);
            }
            Ok(Some(Destination {
                channel_id: channel_id.to_string(),
                name: None,
            }))
        }

        async fn send(&self, destination: &Destination, payload: &RenderedPayload) -> Result<MessageHandle, ChatError> {
            if self.fail_send {
                return Err(ChatError::Api {
                    status: 500,
                    body: "send failed".to_string(),
                });
            }
            let id = self.next_id.fetch_add(1, Ordering::SeqCst);
            self.sent
                .lock()
                .unwrap()
                .push((destination.channel_id.clone(), payload.clone()));
            Ok(MessageHandle {
                channel_id: destination.channel_id.clone(),
                message_id: format!("m{}", id),
            })
        }

        async fn edit(&self, handle: &MessageHandle, payload: &RenderedPayload) -> Result<(), ChatError> {
            if self.fail_edit {
                return Err(ChatError::Api {
                    status: 404,
                    body: "Unknown Message".to_string(),
                });
            }
            self.edited.lock().unwrap().push((handle.clone(), payload.clone()));
            Ok(())
        }
    }

    pub(crate) fn payload(title: &str) -> RenderedPayload {
        RenderedPayload {
            heading: String::new(),
            title: title.to_string(),
            status_line: String::new(),
            color: 0,
            fields: Vec::new(),
            footer: None,
            timestamp: Utc::now(),
            image: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_edit() {
        let chat = Arc::new(FakeChat::default());
        let reconciler = MessageReconciler::new(chat.clone());

        let first = reconciler.reconcile("c1", &payload("a")).await;
        let handle = match first {
            ReconcileOutcome::Created(h) => h,
            other => panic!("expected create, got {:?}", other),
        };
        assert_eq!(reconciler.handle("c1"), Some(handle.clone()));

        let second = reconciler.reconcile("c1", &payload("b")).await;
        assert_eq!(second, ReconcileOutcome::Edited(handle));
        assert_eq!(chat.sent_count(), 1);
        assert_eq!(chat.edited_count(), 1);
    }

    #[tokio::test]
    async fn test_handle_cardinality() {
        let chat = Arc::new(FakeChat::default());
        let reconciler = MessageReconciler::new(chat.clone());

        for _ in 0..5 {
            assert!(reconciler.reconcile("c1", &payload("x")).await.is_delivered());
            assert!(reconciler.reconcile("c2", &payload("y")).await.is_delivered());
        }
        assert_eq!(reconciler.handle_count(), 2);
        assert_eq!(chat.sent_count(), 2);
    }

    #[tokio::test]
    async fn test_edit_failure_does_not_create() {
        let chat = Arc::new(FakeChat::default());
        let reconciler = MessageReconciler::new(chat.clone());
        reconciler.reconcile("c1", &payload("a")).await;
        let handle = reconciler.handle("c1");

        let failing = Arc::new(FakeChat {
            fail_edit: true,
            ..Default::default()
        });
        let reconciler = MessageReconciler {
            client: failing.clone(),
            handles: Mutex::new(reconciler.lock().clone()),
        };

        let outcome = reconciler.reconcile("c1", &payload("b")).await;
        assert!(matches!(outcome, ReconcileOutcome::DeliveryFailed { .. }));
        assert_eq!(failing.sent_count(), 0);
        assert_eq!(reconciler.handle("c1"), handle);
    }

    #[tokio::test]
    async fn test_missing_destination() {
        let chat = Arc::new(FakeChat {
            missing: HashSet::from(["gone".to_string()]),
            ..Default::default()
        });
        let reconciler = MessageReconciler::new(chat.clone());

        let outcome = reconciler.reconcile("gone", &payload("a")).await;
        assert!(matches!(outcome, ReconcileOutcome::DestinationUnavailable { .. }));
        assert!(reconciler.handle("gone").is_none());
        assert_eq!(chat.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_send_failure_leaves_handle_unset() {
        let chat = Arc::new(FakeChat {
            fail_send: true,
            ..Default::default()
        });
        let reconciler = MessageReconciler::new(chat);

        let outcome = reconciler.reconcile("c1", &payload("a")).await;
        assert!(matches!(outcome, ReconcileOutcome::DeliveryFailed { .. }));
        assert_eq!(reconciler.handle_count(), 0);
    }
}
