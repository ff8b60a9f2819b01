use std::collections::BTreeMap;

use actix_web::{HttpResponse, web};
use chrono::{Duration, Utc};
use futures::TryStreamExt;
use mongodb::bson::{Bson, DateTime, Document, doc};
use serde::Deserialize;
use serde_json::json;

use super::bookings::all_bookings;
use super::{message_only, ok, ok_with_message};
use crate::auth::AuthUser;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Role, UserView, parse_object_id};

const DEFAULT_PAGE: u64 = 1;
const DEFAULT_LIMIT: u64 = 50;
const RECENT_WINDOW_DAYS: i64 = 7;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/stats", web::get().to(get_stats))
        .route("/users", web::get().to(get_users))
        .route("/users/{id}", web::delete().to(delete_user))
        .route("/users/{id}/toggle-status", web::put().to(toggle_user_status))
        .route("/bookings", web::get().to(get_bookings));
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    page: Option<u64>,
    limit: Option<u64>,
}

impl PageQuery {
    /// `(page, limit)`, with zero or missing values replaced by the defaults.
    fn resolve(&self) -> (u64, u64) {
        let page = self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE);
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIMIT);
        (page, limit)
    }
}

fn page_count(total: u64, limit: u64) -> u64 {
    total.div_ceil(limit)
}

fn window_start(now: chrono::DateTime<Utc>) -> DateTime {
    DateTime::from_millis((now - Duration::days(RECENT_WINDOW_DAYS)).timestamp_millis())
}

/// Folds `{_id, count}` group results into a name -> count map.
fn group_counts(groups: &[Document]) -> BTreeMap<String, i64> {
    groups
        .iter()
        .map(|group| {
            let key = match group.get("_id") {
                Some(Bson::String(name)) => name.clone(),
                Some(Bson::Null) | None => "unknown".to_string(),
                Some(other) => other.to_string(),
            };
            let count = match group.get("count") {
                Some(Bson::Int32(n)) => i64::from(*n),
                Some(Bson::Int64(n)) => *n,
                _ => 0,
            };
            (key, count)
        })
        .collect()
}

fn count_by(field: &str) -> Vec<Document> {
    vec![doc! { "$group": { "_id": format!("${}", field), "count": { "$sum": 1 } } }]
}

pub async fn get_stats(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;

    let (users, experts, bookings, messages) =
        (db.users(), db.experts(), db.bookings(), db.messages());
    let recent = doc! { "createdAt": { "$gte": window_start(Utc::now()) } };
    let (total_users, total_experts, total_bookings, total_messages, recent_bookings) = futures::try_join!(
        users.count_documents(doc! {}).into_future(),
        experts.count_documents(doc! {}).into_future(),
        bookings.count_documents(doc! {}).into_future(),
        messages.count_documents(doc! {}).into_future(),
        bookings.count_documents(recent).into_future(),
    )?;

    let bookings_by_status: Vec<Document> = bookings
        .aggregate(count_by("status"))
        .await?
        .try_collect()
        .await?;
    let users_by_role: Vec<Document> = users
        .aggregate(count_by("role"))
        .await?
        .try_collect()
        .await?;

    Ok(ok(json!({
        "overview": {
            "totalUsers": total_users,
            "totalExperts": total_experts,
            "totalBookings": total_bookings,
            "totalMessages": total_messages,
            "recentBookings": recent_bookings,
        },
        "bookingsByStatus": group_counts(&bookings_by_status),
        "usersByRole": group_counts(&users_by_role),
    })))
}

pub async fn get_users(
    user: AuthUser,
    db: web::Data<Database>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;

    let (page, limit) = query.resolve();
    let users: Vec<_> = db
        .users()
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .skip((page - 1).saturating_mul(limit))
        .limit(i64::try_from(limit).unwrap_or(i64::MAX))
        .await?
        .try_collect()
        .await?;
    let total = db.users().count_documents(doc! {}).await?;

    let users: Vec<UserView> = users.into_iter().map(UserView::from).collect();
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "data": users,
        "pagination": {
            "page": page,
            "limit": limit,
            "total": total,
            "pages": page_count(total, limit),
        },
    })))
}

pub async fn delete_user(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;

    let id = parse_object_id(&path, "user")?;
    let deleted = db
        .users()
        .find_one_and_delete(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;
    db.experts().delete_one(doc! { "userId": id }).await?;

    log::info!("Admin {} deleted user {}", user.uid, deleted.uid);
    Ok(message_only("User deleted successfully"))
}

pub async fn toggle_user_status(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;

    let id = parse_object_id(&path, "user")?;
    let mut target = db
        .users()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("User not found"))?;

    target.is_active = !target.is_active;
    target.updated_at = DateTime::now();
    db.users()
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "isActive": target.is_active, "updatedAt": target.updated_at } },
        )
        .await?;

    let verb = if target.is_active { "activated" } else { "deactivated" };
    log::info!("Admin {} {} user {}", user.uid, verb, target.uid);
    Ok(ok_with_message(
        &format!("User {} successfully", verb),
        UserView::from(target),
    ))
}

pub async fn get_bookings(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;
    all_bookings(&db).await
}
