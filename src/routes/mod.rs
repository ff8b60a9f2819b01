pub mod admin;
pub mod bookings;
pub mod experts;
pub mod health;
pub mod messages;
pub mod projects;
pub mod users;

use std::collections::{HashMap, HashSet};

use actix_web::HttpResponse;
use futures::TryStreamExt;
use mongodb::bson::doc;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;
use serde_json::json;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Booking, BookingView, Expert, ExpertView, Project, ProjectView, UserSummary};

pub fn ok<T: Serialize>(data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "data": data }))
}

pub fn ok_with_message<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message, "data": data }))
}

pub fn message_only(message: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "message": message }))
}

pub fn created<T: Serialize>(message: &str, data: T) -> HttpResponse {
    HttpResponse::Created().json(json!({ "success": true, "message": message, "data": data }))
}

pub fn list<T: Serialize>(items: Vec<T>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "success": true, "count": items.len(), "data": items }))
}

fn single<T>(views: Vec<T>) -> Result<T> {
    views
        .into_iter()
        .next()
        .ok_or_else(|| AppError::Internal("Nothing to render".to_string()))
}

async fn user_summaries(
    db: &Database,
    ids: HashSet<ObjectId>,
) -> Result<HashMap<ObjectId, UserSummary>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    let ids: Vec<ObjectId> = ids.into_iter().collect();
    let users: Vec<_> = db
        .users()
        .find(doc! { "_id": { "$in": ids } })
        .await?
        .try_collect()
        .await?;

    Ok(users
        .iter()
        .filter_map(|user| user.id.map(|id| (id, UserSummary::from(user))))
        .collect())
}

pub async fn expert_views(db: &Database, experts: Vec<Expert>) -> Result<Vec<ExpertView>> {
    let users = user_summaries(db, experts.iter().map(|e| e.user_id).collect()).await?;
    Ok(experts
        .into_iter()
        .map(|expert| {
            let user = users.get(&expert.user_id).cloned();
            ExpertView::new(expert, user)
        })
        .collect())
}

pub async fn expert_view(db: &Database, expert: Expert) -> Result<ExpertView> {
    let views = expert_views(db, vec![expert]).await?;
    single(views)
}

pub async fn booking_views(db: &Database, bookings: Vec<Booking>) -> Result<Vec<BookingView>> {
    let expert_ids: Vec<ObjectId> = bookings
        .iter()
        .map(|b| b.expert_id)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    let experts: Vec<Expert> = if expert_ids.is_empty() {
        Vec::new()
    } else {
        db.experts()
            .find(doc! { "_id": { "$in": expert_ids } })
            .await?
            .try_collect()
            .await?
    };

    let experts: HashMap<ObjectId, ExpertView> = expert_views(db, experts)
        .await?
        .into_iter()
        .filter_map(|view| ObjectId::parse_str(&view.id).ok().map(|id| (id, view)))
        .collect();
    let users = user_summaries(db, bookings.iter().map(|b| b.user_id).collect()).await?;

    Ok(bookings
        .into_iter()
        .map(|booking| {
            let user = users.get(&booking.user_id).cloned();
            let expert = experts.get(&booking.expert_id).cloned();
            BookingView::new(booking, user, expert)
        })
        .collect())
}

pub async fn booking_view(db: &Database, booking: Booking) -> Result<BookingView> {
    let views = booking_views(db, vec![booking]).await?;
    single(views)
}

pub async fn project_views(db: &Database, projects: Vec<Project>) -> Result<Vec<ProjectView>> {
    let ids = projects
        .iter()
        .flat_map(|p| std::iter::once(p.owner).chain(p.members.iter().copied()))
        .collect();
    let users = user_summaries(db, ids).await?;

    Ok(projects
        .into_iter()
        .map(|project| ProjectView::new(project, |id| users.get(id).cloned()))
        .collect())
}

pub async fn project_view(db: &Database, project: Project) -> Result<ProjectView> {
    let views = project_views(db, vec![project]).await?;
    single(views)
}
