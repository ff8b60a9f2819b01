use actix_web::{HttpResponse, web};
use futures::TryStreamExt;
use mongodb::bson::{DateTime, doc};

use super::{booking_view, booking_views, created, list, ok_with_message};
use crate::auth::AuthUser;
use crate::db::Database;
use crate::error::{AppError, Result, is_duplicate_key};
use crate::models::booking::SLOT_TAKEN;
use crate::models::{
    Booking, BookingStatus, CreateBookingRequest, Expert, Role, UpdateBookingRequest,
    parse_object_id,
};

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("", web::post().to(create_booking))
        .route("", web::get().to(get_my_bookings))
        .route("/expert", web::get().to(get_expert_bookings))
        .route("/all", web::get().to(get_all_bookings))
        .route("/{id}", web::put().to(update_booking));
}

/// The booker, the booked expert, or an admin may update a booking.
fn ensure_can_update(booking: &Booking, expert: Option<&Expert>, user: &AuthUser) -> Result<()> {
    let is_booker = booking.user_id == user.id;
    let is_expert = expert.is_some_and(|e| e.user_id == user.id);
    if is_booker || is_expert || user.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Not authorized to update this booking"))
    }
}

/// The unique active-slot index settles races the lookup above cannot see.
fn slot_conflict(err: mongodb::error::Error) -> AppError {
    if is_duplicate_key(&err) {
        AppError::bad_request(SLOT_TAKEN)
    } else {
        err.into()
    }
}

/// A session counts once, when the booking first moves into `completed`.
fn completes_session(before: BookingStatus, after: BookingStatus) -> bool {
    before != BookingStatus::Completed && after == BookingStatus::Completed
}

pub async fn create_booking(
    user: AuthUser,
    db: web::Data<Database>,
    body: web::Json<CreateBookingRequest>,
) -> Result<HttpResponse> {
    let body = body.into_inner();
    let expert_id = parse_object_id(&body.expert_id, "expert")?;
    if db.experts().find_one(doc! { "_id": expert_id }).await?.is_none() {
        return Err(AppError::not_found("Expert not found"));
    }

    let mut booking = body.into_booking(user.id, expert_id)?;
    let existing = db
        .bookings()
        .find_one(Booking::active_slot_filter(
            expert_id,
            booking.date,
            &booking.time_slot,
        ))
        .await?;
    Booking::ensure_slot_free(existing.as_ref())?;

    let result = db
        .bookings()
        .insert_one(&booking)
        .await
        .map_err(slot_conflict)?;
    booking.id = result.inserted_id.as_object_id();

    log::info!(
        "User {} booked expert {} at {}",
        user.uid,
        expert_id,
        booking.time_slot
    );
    Ok(created(
        "Booking created successfully",
        booking_view(&db, booking).await?,
    ))
}

pub async fn get_my_bookings(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    let bookings: Vec<_> = db
        .bookings()
        .find(doc! { "userId": user.id })
        .sort(doc! { "date": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(booking_views(&db, bookings).await?))
}

pub async fn get_expert_bookings(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    user.require_role(&[Role::Expert, Role::Admin])?;

    let expert = db
        .experts()
        .find_one(doc! { "userId": user.id })
        .await?
        .ok_or_else(|| AppError::not_found("Expert profile not found"))?;
    let expert_id = expert
        .id
        .ok_or_else(|| AppError::Internal("Expert record has no id".to_string()))?;

    let bookings: Vec<_> = db
        .bookings()
        .find(doc! { "expertId": expert_id })
        .sort(doc! { "date": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(booking_views(&db, bookings).await?))
}

pub async fn get_all_bookings(user: AuthUser, db: web::Data<Database>) -> Result<HttpResponse> {
    user.require_role(&[Role::Admin])?;
    all_bookings(&db).await
}

pub(super) async fn all_bookings(db: &Database) -> Result<HttpResponse> {
    let bookings: Vec<_> = db
        .bookings()
        .find(doc! {})
        .sort(doc! { "createdAt": -1 })
        .await?
        .try_collect()
        .await?;

    Ok(list(booking_views(db, bookings).await?))
}

pub async fn update_booking(
    user: AuthUser,
    db: web::Data<Database>,
    path: web::Path<String>,
    body: web::Json<UpdateBookingRequest>,
) -> Result<HttpResponse> {
    let id = parse_object_id(&path, "booking")?;
    let mut booking = db
        .bookings()
        .find_one(doc! { "_id": id })
        .await?
        .ok_or_else(|| AppError::not_found("Booking not found"))?;
    let expert = db.experts().find_one(doc! { "_id": booking.expert_id }).await?;
    ensure_can_update(&booking, expert.as_ref(), &user)?;

    let before = booking.status;
    body.into_inner().apply(&mut booking)?;
    db.bookings()
        .update_one(
            doc! { "_id": id },
            doc! { "$set": {
                "status": booking.status.as_str(),
                "meetingLink": &booking.meeting_link,
                "notes": &booking.notes,
                "cancellationReason": &booking.cancellation_reason,
                "updatedAt": booking.updated_at,
            } },
        )
        .await
        .map_err(slot_conflict)?;

    if completes_session(before, booking.status) {
        db.experts()
            .update_one(
                doc! { "_id": booking.expert_id },
                doc! { "$inc": { "totalSessions": 1 }, "$set": { "updatedAt": DateTime::now() } },
            )
            .await?;
    }

    log::info!("Booking {} is now {}", id, booking.status.as_str());
    Ok(ok_with_message(
        "Booking updated successfully",
        booking_view(&db, booking).await?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::oid::ObjectId;

    fn caller(role: Role) -> AuthUser {
        AuthUser {
            id: ObjectId::new(),
            uid: "uid".to_string(),
            role,
        }
    }

    fn booking_by(user_id: ObjectId, expert_id: ObjectId) -> Booking {
        CreateBookingRequest {
            expert_id: expert_id.to_hex(),
            date: "2025-03-14".to_string(),
            time_slot: "10:00-11:00".to_string(),
            topic: "Ownership".to_string(),
        }
        .into_booking(user_id, expert_id)
        .unwrap()
    }

    fn expert_for(user_id: ObjectId) -> Expert {
        crate::models::CreateExpertRequest {
            bio: "Mentor".to_string(),
            expertise: vec!["rust".to_string()],
            hourly_rate: 10.0,
            availability: vec![],
            years_of_experience: None,
            linkedin_url: None,
            github_url: None,
        }
        .into_expert(user_id)
        .unwrap()
    }

    #[test]
    fn booker_expert_and_admin_may_update() {
        let booker = caller(Role::User);
        let mentor = caller(Role::Expert);
        let expert = expert_for(mentor.id);
        let booking = booking_by(booker.id, ObjectId::new());

        assert!(ensure_can_update(&booking, Some(&expert), &booker).is_ok());
        assert!(ensure_can_update(&booking, Some(&expert), &mentor).is_ok());
        assert!(ensure_can_update(&booking, None, &caller(Role::Admin)).is_ok());
    }

    #[test]
    fn others_may_not_update() {
        let booking = booking_by(ObjectId::new(), ObjectId::new());
        let expert = expert_for(ObjectId::new());
        let err = ensure_can_update(&booking, Some(&expert), &caller(Role::User)).unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[test]
    fn sessions_count_once_on_completion() {
        assert!(completes_session(BookingStatus::Confirmed, BookingStatus::Completed));
        assert!(!completes_session(BookingStatus::Completed, BookingStatus::Completed));
        assert!(!completes_session(BookingStatus::Pending, BookingStatus::Cancelled));
    }
}
