use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use mongodb::bson::doc;

use super::{created, list, ok_with_message, project_view, project_views};
use crate::auth::AuthUser;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{CreateProjectRequest, parse_object_id};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::get().to(get_projects))
        .route("", web::post().to(create_project))
        .route("/{id}/join", web::put().to(join_project));
}

pub async fn get_projects(_user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    let projects: Vec<_> = db
        .projects()
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(project_views(&db, projects).await?))
}

pub async fn create_project(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<CreateProjectRequest>,
) -> Result<HttpResponse> {
    let mut project = body.into_inner().into_project(user.id)?;
    let result = db.projects().insert_one(&project).await?;
    project.id = result.inserted_id.as_object_id();

    log::info!("User {} created project {:?}", user.uid, project.title);
    Ok(created(
        "Project created successfully",
        project_view(&db, project).await?,
    ))
}

pub async fn join_project(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let id = parse_object_id(&path, "project")?;
    let mut project = db
        .projects()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Project not found"))?;

    project.add_member(user.id)?;
    db.projects()
        .update_one(doc! { "_id": id }, doc! { "$addToSet": { "members": user.id } })
        .await?;

    Ok(ok_with_message(
        "Joined project successfully",
        project_view(&db, project).await?,
    ))
}
