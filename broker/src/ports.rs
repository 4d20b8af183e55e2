//! External Ports (C10): typed capability interfaces injected into the orchestrator. The core
//! never imports concrete adapters for copy rendering, notification delivery, checkout-session
//! creation, or mirror sinks, per §9 "Late-bound notifier / copy source / sink".

use async_trait::async_trait;
use serde_json::Value;
use time::OffsetDateTime;

/// Sends a free-form or templated message to a recipient and reports delivery status, consumed
/// from the Outbox (C3) per §6 "Outbound delivery".
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        to: &str,
        free_form: Option<&str>,
        template_name: Option<&str>,
    ) -> anyhow::Result<DeliveryReceipt>;

    async fn notify_operator(&self, message: &str) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
}

/// Renders templated copy deterministically per lead; the core treats copy as an external
/// collaborator (§1).
pub trait CopyRenderer: Send + Sync {
    fn render(&self, message_key: &str, lead_id: i32, params: &Value) -> String;
}

/// Creates a hosted checkout session for the locked deposit amount.
#[async_trait]
pub trait CheckoutSessionCreator: Send + Sync {
    async fn create_session(
        &self,
        lead_id: i32,
        amount_pence: i64,
        deposit_rule_version: &str,
    ) -> anyhow::Result<CheckoutSession>;
}

#[derive(Debug, Clone)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
    pub expires_at: OffsetDateTime,
}

/// Mirrors a lead snapshot to an external spreadsheet/CRM sink; fire-and-forget, best-effort.
#[async_trait]
pub trait MirrorSink: Send + Sync {
    async fn mirror(&self, lead_id: i32, snapshot: Value) -> anyhow::Result<()>;
}

/// Supplies caller-defined candidate booking slots; calendar availability computation beyond
/// consuming this list is out of scope (§1 Non-goals).
pub trait SlotProvider: Send + Sync {
    fn suggested_slots(&self, lead_id: i32) -> Vec<Slot>;
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Slot {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

/// No-op adapters used by tests and local/dry-run deployments (`whatsapp_dry_run`).
pub mod noop {
    use super::*;

    pub struct LoggingNotifier;

    #[async_trait]
    impl Notifier for LoggingNotifier {
        async fn send(
            &self,
            to: &str,
            free_form: Option<&str>,
            template_name: Option<&str>,
        ) -> anyhow::Result<DeliveryReceipt> {
            tracing::info!(to, free_form, template_name, "dry-run send");
            Ok(DeliveryReceipt { message_id: None })
        }

        async fn notify_operator(&self, message: &str) -> anyhow::Result<()> {
            tracing::info!(message, "dry-run operator notification");
            Ok(())
        }
    }

    /// Echoes the message key back verbatim; real copy is sourced externally (§1), this only
    /// keeps dev/dry-run deployments functional without one.
    pub struct EchoCopyRenderer;

    impl CopyRenderer for EchoCopyRenderer {
        fn render(&self, message_key: &str, _lead_id: i32, _params: &Value) -> String {
            message_key.to_string()
        }
    }

    pub struct NullMirrorSink;

    #[async_trait]
    impl MirrorSink for NullMirrorSink {
        async fn mirror(&self, _lead_id: i32, _snapshot: Value) -> anyhow::Result<()> {
            Ok(())
        }
    }

    pub struct EmptySlotProvider;

    impl SlotProvider for EmptySlotProvider {
        fn suggested_slots(&self, _lead_id: i32) -> Vec<Slot> {
            Vec::new()
        }
    }

    /// Issues a fake session id without talking to a payment provider; for dev/dry-run only.
    pub struct StubCheckoutSessionCreator;

    #[async_trait]
    impl CheckoutSessionCreator for StubCheckoutSessionCreator {
        async fn create_session(
            &self,
            lead_id: i32,
            amount_pence: i64,
            deposit_rule_version: &str,
        ) -> anyhow::Result<CheckoutSession> {
            let session_id = format!("cs_stub_{lead_id}_{deposit_rule_version}");
            tracing::info!(lead_id, amount_pence, %session_id, "dry-run checkout session created");
            Ok(CheckoutSession {
                session_id,
                url: format!("https://example.invalid/checkout/{lead_id}"),
                expires_at: OffsetDateTime::now_utc() + time::Duration::hours(24),
            })
        }
    }
}
