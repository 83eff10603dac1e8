use crate::error::AppError;
use crate::state::AppState;
use crate::transport::SessionDescription;
use actix_web::{web, HttpResponse};

/// `POST /offer`
///
/// Request and response share one shape:
/// ```json
/// { "sdp": "v=0\r\n...", "type": "offer" }
/// ```
/// Negotiation failures answer `500 {"error": "..."}`.
pub async fn offer(
    state: web::Data<AppState>,
    body: web::Json<SessionDescription>,
) -> Result<HttpResponse, AppError> {
    let answer = state.negotiator.handle_offer(body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(answer))
}
