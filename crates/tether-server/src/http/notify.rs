//! `POST /notify`: classify, fan out, report counts.

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::HeaderMap;
use serde_json::{Value, json};
use tether_core::delivery::DeliveryResult;
use tracing::instrument;

use super::{ApiError, AppState};
use crate::gateway::{EventKind, NotificationEvent};

/// Handle a notify request.
///
/// Responses by kind:
/// - direct: `{ ok, delivered }`
/// - presence: `{ ok, delivered, connections }`
/// - community: `{ ok, delivered, totalMembers, connectedMembers }`
#[instrument(skip_all, fields(method = "notify"))]
pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Value>, ApiError> {
    let gateway = state
        .gateway
        .as_ref()
        .ok_or_else(|| ApiError::internal("gateway not running"))?;
    let verified = state.auth.verify(&headers)?;
    let Json(body) = body?;

    let mut event = NotificationEvent::from_body(body)?;
    if let Some(identity) = verified {
        event = event.with_sender(identity);
    }
    let kind = event.kind();
    let result = gateway.handle(event).await?;
    Ok(Json(notify_response(kind, result)))
}

fn notify_response(kind: EventKind, r: DeliveryResult) -> Value {
    match kind {
        EventKind::Direct => json!({ "ok": true, "delivered": r.delivered }),
        EventKind::PresenceBroadcast => json!({
            "ok": true,
            "delivered": r.delivered,
            "connections": r.total_connected,
        }),
        EventKind::CommunityBroadcast => json!({
            "ok": true,
            "delivered": r.delivered,
            "totalMembers": r.total_targets,
            "connectedMembers": r.total_connected,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn community_response_shape() {
        let v = notify_response(
            EventKind::CommunityBroadcast,
            DeliveryResult { delivered: 1, total_targets: 4, total_connected: 2 },
        );
        assert_eq!(v, json!({"ok": true, "delivered": 1, "totalMembers": 4, "connectedMembers": 2}));
    }

    #[test]
    fn presence_response_shape() {
        let v = notify_response(
            EventKind::PresenceBroadcast,
            DeliveryResult { delivered: 3, total_targets: 3, total_connected: 3 },
        );
        assert_eq!(v["connections"], 3);
    }

    #[test]
    fn direct_response_shape() {
        let v = notify_response(EventKind::Direct, DeliveryResult::EMPTY);
        assert_eq!(v, json!({"ok": true, "delivered": 0}));
    }
}
