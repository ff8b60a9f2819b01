use std::collections::HashSet;

use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use mongodb::bson::{DateTime, doc};
use mongodb::options::ReturnDocument;

use super::{created, list, ok, ok_with_message};
use crate::auth::{AuthUser, Identity};
use crate::chat_server::ChatServerHandle;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{
    CreateUserRequest, PublicUser, Role, UpdateProfileRequest, UserView, required_text,
};

const PUBLIC_DIRECTORY_LIMIT: i64 = 100;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(create_user))
        .route("", web::get().to(get_all_users))
        .route("/profile", web::get().to(get_profile))
        .route("/profile", web::put().to(update_profile))
        .route("/public", web::get().to(get_public_users));
}

/// POST /api/users - registers the caller after identity-provider signup
pub async fn create_user(
    identity: Identity,
    db: web::Data<Database>,
    body: web::Json<CreateUserRequest>,
) -> Result<HttpResponse> {
    let uid = identity.0.sub;
    let users = db.users();

    if users.find_one(doc! { "uid": &uid }).await?.is_some() {
        return Err(AppError::bad_request("User already exists"));
    }

    let mut user = body.into_inner().into_user(&uid)?;
    let result = users.insert_one(&user).await?;
    user.id = result.inserted_id.as_object_id();

    log::info!("Registered user {} as {}", uid, user.role);
    Ok(created("User created successfully", UserView::from(user)))
}

/// GET /api/users/profile
pub async fn get_profile(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    let profile = db
        .users()
        .find_one(doc! { "uid": &user.uid })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(ok(UserView::from(profile)))
}

/// PUT /api/users/profile - only the display name and photo are editable
pub async fn update_profile(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<UpdateProfileRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let mut set = doc! { "updatedAt": DateTime::now() };
    if let Some(name) = body.display_name {
        set.insert("displayName", required_text(&name, "Display name", 100)?);
    }
    if let Some(photo) = body.photo_url {
        set.insert("photoURL", photo.trim());
    }

    let updated = db
        .users()
        .find_one_and_update(doc! { "uid": &user.uid }, doc! { "$set": set })
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    Ok(ok_with_message("Profile updated successfully", UserView::from(updated)))
}

/// GET /api/users/public - chat directory, flagged with live presence
pub async fn get_public_users(
    _user: AuthUser,
    db: web::Data<Database>,
    chat_handle: web::Data<ChatServerHandle>,
) -> Result<HttpResponse> {
    let users: Vec<_> = db
        .users()
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .limit(PUBLIC_DIRECTORY_LIMIT)
        .await?
        .try_collect()
        .await?;

    let online: HashSet<String> = match chat_handle.online_users().await {
        Ok(online) => online.into_iter().collect(),
        Err(err) => {
            log::warn!("Presence unavailable: {}", err);
            HashSet::new()
        }
    };

    let directory = users
        .into_iter()
        .map(|u| {
            let is_online = online.contains(&u.uid);
            PublicUser::new(u, is_online)
        })
        .collect();
    Ok(list::<PublicUser>(directory))
}

/// GET /api/users - admin only
pub async fn get_all_users(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;

    let users: Vec<_> = db
        .users()
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(users.into_iter().map(UserView::from).collect()))
}
