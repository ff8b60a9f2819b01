use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use mongodb::bson::{DateTime, doc};
use mongodb::options::ReturnDocument;

use super::{created, expert_view, expert_views, list, ok, ok_with_message};
use crate::auth::AuthUser;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CreateExpertRequest, Expert, Role, UpdateExpertRequest, parse_object_id};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(get_experts))
        .route("", web::post().to(create_expert))
        .route("/{id}", web::get().to(get_expert))
        .route("/{id}", web::put().to(update_expert));
}

/// Only the profile owner or an admin may edit an expert profile.
fn ensure_can_edit(expert: &Expert, user: &AuthUser) -> Result<()> {
    if expert.user_id == user.id || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Not authorized to update this profile"))
    }
}

pub async fn get_experts(db: web::Data<Database>) -> Result<HttpResponse> {
    let experts: Vec<_> = db
        .experts()
        .find(doc! {})
        .sort(doc! { "rating": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(expert_views(&db, experts).await?))
}

pub async fn get_expert(db: web::Data<Database>, path: web::Path<String>) -> Result<HttpResponse> {
    let id = parse_object_id(&path, "expert")?;
    let expert = db
        .experts()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Expert not found"))?;

    Ok(ok(expert_view(&db, expert).await?))
}

pub async fn create_expert(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<CreateExpertRequest>,
) -> Result<HttpResponse> {
    if db.experts().find_one(doc! { "userId": user.id }).await?.is_some() {
        return Err(AppError::bad_request("Expert profile already exists"));
    }

    let mut expert = body.into_inner().into_expert(user.id)?;
    let result = db.experts().insert_one(&expert).await?;
    expert.id = result.inserted_id.as_object_id();

    // Admins keep their role.
    if user.role == Role::User {
        db.users()
            .update_one(
                doc! { "_id": user.id },
                doc! { "$set": { "role": Role::Expert.as_str(), "updatedAt": DateTime::now() } },
            )
            .await?;
    }

    log::info!("User {} created an expert profile", user.uid);
    Ok(created(
        "Expert profile created successfully",
        expert_view(&db, expert).await?,
    ))
}

pub async fn update_expert(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    body: web::Json<UpdateExpertRequest>,
) -> Result<HttpResponse> {
    let id = parse_object_id(&path, "expert")?;
    let expert = db
        .experts()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Expert not found"))?;
    ensure_can_edit(&expert, &user)?;

    let update = body.into_inner().into_update()?;
    let updated = db
        .experts()
        .find_one_and_update(doc! { "_id": id }, update)
        .return_document(ReturnDocument::After)
        .await?
        .ok_or_else(|| AppError::not_found("Expert not found"))?;

    Ok(ok_with_message(
        "Expert profile updated successfully",
        expert_view(&db, updated).await?,
    ))
}
