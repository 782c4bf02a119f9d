use axum::{
    extract::{rejection::JsonRejection, State},
    Json,
};
use tracing::{info, warn};

use crate::api::AppState;
use crate::services::callback_verifier::{CallbackAck, CallbackPayload};

/// POST /api/payment/update-booking
///
/// The gateway reads the acknowledgement from the body, so every outcome is
/// answered with 200 and a `return_code`.
pub async fn payment_callback(
    State(state): State<AppState>,
    payload: Result<Json<CallbackPayload>, JsonRejection>,
) -> Json<CallbackAck> {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e.body_text(), "unparseable payment callback");
            return Json(CallbackAck::invalid());
        }
    };

    let ack = state.callbacks.handle_callback(&payload).await;
    info!(
        return_code = ack.return_code,
        callback_type = ?payload.callback_type,
        "payment callback acknowledged"
    );
    Json(ack)
}
