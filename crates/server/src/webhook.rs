//! Provider webhook surface.
//!
//! One route: `POST /webhook/sms/{business_id}`. Replies are always HTTP 200
//! TwiML; a failed signature check acknowledges with an empty document
//! instead of an error status, so the provider never retries or shows the
//! sender a delivery failure.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Form, Router};
use textback_core::domain::workflow::BusinessId;
use textback_sms::{mask_phone, twiml, InboundSms, SignatureValidator};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use uuid::Uuid;

use crate::orchestrator::{ReplyOrchestrator, TurnRequest};

#[derive(Clone)]
pub struct WebhookState {
    pub orchestrator: Arc<ReplyOrchestrator>,
    pub signature: Option<Arc<SignatureValidator>>,
    pub public_base_url: Option<String>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhook/sms/{business_id}", post(receive_sms))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn receive_sms(
    State(state): State<WebhookState>,
    Path(business_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Form(params): Form<Vec<(String, String)>>,
) -> Response {
    let correlation_id = Uuid::new_v4();

    if let Some(validator) = &state.signature {
        let signature = headers
            .get("X-Twilio-Signature")
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let url = public_url(state.public_base_url.as_deref(), &uri);
        if !validator.is_valid(&url, &params, signature) {
            warn!(
                event_name = "sms.signature_rejected",
                correlation_id = %correlation_id,
                business_id = %business_id,
                conversation_id = "unknown",
                url = %url,
                "webhook signature rejected; acknowledging without a reply"
            );
            return xml_response(twiml::empty_response());
        }
    }

    let inbound = InboundSms::from_pairs(&params);
    let request = TurnRequest {
        business_id: BusinessId(business_id),
        from: inbound.from_number().to_string(),
        body: inbound.body.clone(),
        correlation_id,
    };

    info!(
        event_name = "sms.webhook_received",
        correlation_id = %correlation_id,
        business_id = %request.business_id,
        conversation_id = "unknown",
        from = %mask_phone(&request.from),
        message_sid = inbound.message_sid.as_deref().unwrap_or("unknown"),
        body_chars = request.body.chars().count(),
        "inbound sms webhook received"
    );

    let outcome = state.orchestrator.handle_turn(&request).await;

    info!(
        event_name = "sms.reply_rendered",
        correlation_id = %correlation_id,
        business_id = %request.business_id,
        conversation_id = "unknown",
        from = %mask_phone(&request.from),
        disposition = outcome.disposition.as_str(),
        reply_chars = outcome.reply.chars().count(),
        "twiml reply rendered"
    );

    xml_response(twiml::message_response(&outcome.reply))
}

/// The URL the provider signed. Providers sign the public URL they were
/// configured with, not whatever host the request reached us on.
fn public_url(base: Option<&str>, uri: &Uri) -> String {
    let path = uri
        .path_and_query()
        .map_or_else(|| uri.path().to_string(), |path_and_query| path_and_query.as_str().to_string());
    match base {
        Some(base) => format!("{}{path}", base.trim_end_matches('/')),
        None => path,
    }
}

fn xml_response(document: String) -> Response {
    ([(header::CONTENT_TYPE, "text/xml")], document).into_response()
}
