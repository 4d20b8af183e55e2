use crate::db::outbox_messages::NewOutboxMessage;
use crate::db::outbox_messages::OutboxMessage;
use crate::ports::Notifier;
use anyhow::Result;
use diesel::PgConnection;
use serde_json::json;
use time::OffsetDateTime;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OutboundPayload {
    pub to: String,
    pub free_form: Option<String>,
    pub template_name: Option<String>,
    pub template_params: Option<serde_json::Value>,
}

impl OutboundPayload {
    fn to_json(&self) -> serde_json::Value {
        json!({
            "to": self.to,
            "free_form": self.free_form,
            "template_name": self.template_name,
            "template_params": self.template_params,
        })
    }
}

/// `enqueue(lead_id?, channel, payload) -> row`. Per §4.3 the orchestrator MUST call this before
/// attempting delivery when the outbox is enabled.
pub fn enqueue(
    conn: &mut PgConnection,
    lead_id: Option<i32>,
    channel: &str,
    payload: &OutboundPayload,
) -> Result<OutboxMessage> {
    let row = OutboxMessage::enqueue(
        conn,
        NewOutboxMessage {
            lead_id,
            channel: channel.to_string(),
            payload: payload.to_json(),
        },
    )?;
    Ok(row)
}

/// Direct-send fallback for `outbox_enabled = false` (§4.3): skips the durable queue and attempts
/// delivery inline, blocking the calling thread on the async send. Only safe to call from a
/// dedicated blocking thread (e.g. inside `spawn_blocking`) — calling this from a normal async
/// task would panic trying to block its own executor.
pub fn send_direct(notifier: &dyn Notifier, payload: &OutboundPayload) -> Result<bool> {
    let result = tokio::runtime::Handle::current().block_on(notifier.send(
        &payload.to,
        payload.free_form.as_deref(),
        payload.template_name.as_deref(),
    ));
    match result {
        Ok(_) => Ok(true),
        Err(e) => {
            tracing::warn!(to = %payload.to, error = %e, "direct send failed");
            Ok(false)
        }
    }
}

/// Async counterpart of `send_direct` for callers already running inside an async task.
pub async fn enqueue_or_send(
    conn: &mut PgConnection,
    lead_id: Option<i32>,
    channel: &str,
    payload: &OutboundPayload,
    outbox_enabled: bool,
    notifier: &dyn Notifier,
) -> Result<bool> {
    if outbox_enabled {
        enqueue(conn, lead_id, channel, payload)?;
        return Ok(true);
    }
    match notifier
        .send(&payload.to, payload.free_form.as_deref(), payload.template_name.as_deref())
        .await
    {
        Ok(_) => Ok(true),
        Err(e) => {
            tracing::warn!(to = %payload.to, error = %e, "direct send failed");
            Ok(false)
        }
    }
}

/// Attempts delivery of an enqueued row and updates it by primary key, per §4.3.
pub async fn attempt_delivery(
    conn: &mut PgConnection,
    row: &OutboxMessage,
    notifier: &dyn Notifier,
) -> Result<()> {
    let payload: OutboundPayload = serde_json::from_value(row.payload.clone())
        .map_err(|e| anyhow::anyhow!("malformed outbox payload {}: {e:#}", row.id))?;

    match notifier
        .send(&payload.to, payload.free_form.as_deref(), payload.template_name.as_deref())
        .await
    {
        Ok(_) => {
            OutboxMessage::mark_sent(conn, row.id)?;
        }
        Err(e) => {
            OutboxMessage::mark_failed(conn, row.id, row.attempts, &e.to_string(), OffsetDateTime::now_utc())?;
        }
    }
    Ok(())
}

pub async fn retry_due(
    conn: &mut PgConnection,
    notifier: &dyn Notifier,
    now: OffsetDateTime,
    limit: i64,
) -> Result<usize> {
    let due = OutboxMessage::due_for_retry(conn, now, limit)?;
    let count = due.len();
    for row in &due {
        attempt_delivery(conn, row, notifier).await?;
    }
    Ok(count)
}
