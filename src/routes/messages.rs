use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use mongodb::bson::doc;
use serde_json::json;

use super::{created, list, message_only, ok};
use crate::auth::AuthUser;
use crate::db::{Database, MessageStore};
use crate::error::{AppError, Result};
use crate::models::{Message, MessageView, SendMessageRequest};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(send_message))
        .route("/unread/count", web::get().to(unread_count))
        .route("/read/{other_user_id}", web::put().to(mark_as_read))
        .route("/{other_user_id}", web::get().to(get_conversation));
}

fn other_user(path: web::Path<String>) -> Result<String> {
    let other = path.into_inner().trim().to_string();
    if other.is_empty() {
        return Err(AppError::bad_request("Other user id is required"));
    }
    Ok(other)
}

/// GET /api/messages/{otherUserId} - both directions, oldest first
pub async fn get_conversation(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let other = other_user(path)?;
    let messages: Vec<_> = db
        .messages()
        .find(doc! {
            "$or": [
                { "senderId": &user.uid, "receiverId": &other },
                { "senderId": &other, "receiverId": &user.uid },
            ]
        })
        .sort(doc! { "timestamp": 1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(messages.into_iter().map(MessageView::from).collect()))
}

/// POST /api/messages - stored only; live delivery goes through the socket
pub async fn send_message(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<SendMessageRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let message = Message::compose(&user.uid, &body.receiver_id, &body.content, body.message_type)?;
    let message = db.insert(message).await?;

    Ok(created("Message sent successfully", MessageView::from(message)))
}

pub async fn mark_as_read(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let other = other_user(path)?;
    let modified = db.mark_read(&other, &user.uid).await?;
    log::debug!("Marked {} messages from {} to {} as read", modified, other, user.uid);

    Ok(message_only("Messages marked as read"))
}

pub async fn unread_count(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    let count = db
        .messages()
        .count_documents(doc! { "receiverId": &user.uid, "read": false })
        .await?;

    Ok(ok(json!({ "unreadCount": count })))
}
