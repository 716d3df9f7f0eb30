use axum::{extract::State, http::StatusCode, Json};
use common_auth::AuthContext;
use tracing::{info, warn};

use crate::activity::Activity;
use crate::app_state::AppState;

/// Accepts an activity from the channel. Conversation logic is not hosted here,
/// so the activity is only recorded and acknowledged.
///
/// `caller` is `None` only when anonymous access let the request through.
pub async fn handle_activity(
    State(state): State<AppState>,
    caller: Option<AuthContext>,
    Json(activity): Json<Activity>,
) -> StatusCode {
    let kind = activity.kind();
    state.metrics.record_activity(kind);

    if let (Some(context), Some(activity_url)) = (&caller, activity.service_url.as_deref()) {
        if context.service_url().is_some_and(|token_url| token_url != activity_url) {
            warn!(
                token_service_url = context.service_url().unwrap_or("-"),
                activity_service_url = activity_url,
                "Activity serviceUrl differs from the token's serviceurl claim"
            );
        }
    }
    let caller = caller
        .as_ref()
        .and_then(AuthContext::app_id)
        .unwrap_or("anonymous");

    match kind {
        "message" => info!(
            caller,
            activity_id = activity.id.as_deref().unwrap_or("-"),
            channel = activity.channel_id.as_deref().unwrap_or("-"),
            "Message activity received"
        ),
        "conversationUpdate" => info!(
            caller,
            joined = activity.joined_members().count(),
            "Conversation update received"
        ),
        _ => info!(caller, activity_type = %activity.activity_type, "Activity received"),
    }

    StatusCode::ACCEPTED
}
