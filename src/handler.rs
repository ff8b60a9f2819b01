use std::time::{Duration, Instant};

use actix_web::{Error, HttpRequest, HttpResponse, ResponseError, web};
use actix_ws::{AggregatedMessage, Session};
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::auth::Identity;
use crate::chat_server::ChatServerHandle;
use crate::events::{ClientEvent, ServerEvent, UserId};
use crate::presence::ConnId;

// WebSocket connection constants
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);
const OUTBOUND_QUEUE: usize = 100;
const MAX_FRAME_SIZE: usize = 64 * 1024;

// WebSocket connection handler endpoint
pub async fn ws_connect(
    req: HttpRequest,
    body: web::Payload,
    chat_handle: web::Data<ChatServerHandle>,
) -> Result<HttpResponse, Error> {
    let user_id = match Identity::from_request_token(&req) {
        Ok(Identity(claims)) => claims.sub,
        Err(err) => return Ok(err.error_response()),
    };

    let (response, session, msg_stream) = actix_ws::handle(&req, body)?;
    let msg_stream = msg_stream
        .max_frame_size(MAX_FRAME_SIZE)
        .aggregate_continuations();

    actix_web::rt::spawn(websocket_handler(
        session,
        msg_stream,
        chat_handle.get_ref().clone(),
        user_id,
    ));

    Ok(response)
}

async fn websocket_handler(
    mut session: Session,
    mut msg_stream: actix_ws::AggregatedMessageStream,
    chat_handle: ChatServerHandle,
    user_id: UserId,
) {
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(OUTBOUND_QUEUE);

    let conn_id = match chat_handle.connect(user_id.clone(), event_tx).await {
        Ok(conn_id) => conn_id,
        Err(err) => {
            log::error!("Failed to connect to chat server: {}", err);
            let _ = session
                .close(Some(actix_ws::CloseReason {
                    code: actix_ws::CloseCode::Error,
                    description: Some(err.to_string()),
                }))
                .await;
            return;
        }
    };
    log::info!("WebSocket opened for user {} as connection {}", user_id, conn_id);

    let mut heartbeat = interval(HEARTBEAT_INTERVAL);
    let mut last_heartbeat = Instant::now();

    let close_reason = loop {
        tokio::select! {
            // Event from the chat server
            Some(event) = event_rx.recv() => {
                if send_event(&mut session, &event).await.is_err() {
                    break None;
                }
            }

            // Frame from the client
            frame = msg_stream.next() => {
                match frame {
                    Some(Ok(AggregatedMessage::Text(text))) => {
                        if handle_text(&mut session, &chat_handle, conn_id, &user_id, &text).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(AggregatedMessage::Ping(bytes))) => {
                        last_heartbeat = Instant::now();
                        if session.pong(&bytes).await.is_err() {
                            break None;
                        }
                    }
                    Some(Ok(AggregatedMessage::Pong(_))) => {
                        last_heartbeat = Instant::now();
                    }
                    Some(Ok(AggregatedMessage::Close(reason))) => break reason,
                    Some(Ok(AggregatedMessage::Binary(_))) => {
                        log::debug!("Ignoring binary frame on connection {}", conn_id);
                    }
                    Some(Err(err)) => {
                        log::warn!("WebSocket error on connection {}: {}", conn_id, err);
                        break None;
                    }
                    None => break None,
                }
            }

            // Heartbeat tick
            _ = heartbeat.tick() => {
                if Instant::now().duration_since(last_heartbeat) > CLIENT_TIMEOUT {
                    log::info!("Client heartbeat timeout on connection {}", conn_id);
                    break None;
                }
                if session.ping(b"").await.is_err() {
                    break None;
                }
            }
        }
    };

    if let Err(err) = chat_handle.disconnect(conn_id) {
        log::warn!("Failed to disconnect {}: {}", conn_id, err);
    }
    let _ = session.close(close_reason).await;

    log::info!("WebSocket connection {} closed for user {}", conn_id, user_id);
}

/// Parses an inbound frame; malformed frames turn into the `error` reply for the sender.
fn inbound(text: &str) -> Result<ClientEvent, ServerEvent> {
    ClientEvent::parse(text).map_err(|err| ServerEvent::Error {
        message: err.to_string(),
    })
}

async fn handle_text(
    session: &mut Session,
    chat_handle: &ChatServerHandle,
    conn_id: ConnId,
    user_id: &UserId,
    text: &str,
) -> Result<(), actix_ws::Closed> {
    let event = match inbound(text) {
        Ok(event) => event,
        Err(reply) => return send_event(session, &reply).await,
    };

    if let Err(err) = chat_handle.relay(conn_id, user_id.clone(), event) {
        log::error!("Dropping event from {}: {}", user_id, err);
        return send_event(
            session,
            &ServerEvent::Error {
                message: err.to_string(),
            },
        )
        .await;
    }
    Ok(())
}

async fn send_event(session: &mut Session, event: &ServerEvent) -> Result<(), actix_ws::Closed> {
    match serde_json::to_string(event) {
        Ok(json) => session.text(json).await,
        Err(err) => {
            log::error!("Failed to encode {}: {}", event.name(), err);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenVerifier;
    use crate::auth::tests::{SECRET, token_for};
    use crate::chat_server::ChatServer;
    use actix_web::http::{StatusCode, header};
    use actix_web::{App, test};

    fn upgrade(uri: &str) -> test::TestRequest {
        test::TestRequest::get()
            .uri(uri)
            .insert_header((header::CONNECTION, "upgrade"))
            .insert_header((header::UPGRADE, "websocket"))
            .insert_header((header::SEC_WEBSOCKET_VERSION, "13"))
            .insert_header((header::SEC_WEBSOCKET_KEY, "dGhlIHNhbXBsZSBub25jZQ=="))
    }

    macro_rules! app {
        ($handle:expr) => {
            test::init_service(
                App::new()
                    .app_data(web::Data::new(TokenVerifier::from_secret(SECRET)))
                    .app_data(web::Data::new($handle))
                    .route("/api/ws", web::get().to(ws_connect)),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn upgrade_without_token_is_unauthorized() {
        let (_server, handle) = ChatServer::new();
        let app = app!(handle);

        let resp = test::call_service(&app, upgrade("/api/ws").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn upgrade_with_bad_token_is_unauthorized() {
        let (_server, handle) = ChatServer::new();
        let app = app!(handle);

        let req = upgrade("/api/ws?token=not.a.token").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let expired = format!("/api/ws?token={}", token_for("ada", -3600));
        let resp = test::call_service(&app, upgrade(&expired).to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["success"], false);
    }

    #[actix_web::test]
    async fn query_token_upgrades_the_connection() {
        let (_server, handle) = ChatServer::new();
        let app = app!(handle);

        let uri = format!("/api/ws?token={}", token_for("ada", 3600));
        let resp = test::call_service(&app, upgrade(&uri).to_request()).await;
        assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
    }

    #[actix_web::test]
    async fn bearer_header_upgrades_the_connection() {
        let (_server, handle) = ChatServer::new();
        let app = app!(handle);

        let req = upgrade("/api/ws")
            .insert_header((
                header::AUTHORIZATION,
                format!("Bearer {}", token_for("ada", 3600)),
            ))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::SWITCHING_PROTOCOLS);
    }

    #[actix_web::test]
    async fn malformed_frames_get_an_error_event() {
        for frame in ["not json", r#"{"event":"teleport"}"#, r#"{"event":"message:send","data":7}"#] {
            let reply = inbound(frame).unwrap_err();
            let value = serde_json::to_value(&reply).unwrap();
            assert_eq!(value["event"], "error", "{}", frame);
            assert!(value["data"]["message"].as_str().is_some_and(|m| !m.is_empty()));
        }
        assert_eq!(inbound(r#"{"event":"ping"}"#).unwrap(), ClientEvent::Ping);
    }
}
