use chrono::{NaiveDate, Utc};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use super::{ExpertView, Ref, UserSummary, id_hex, required_text, rfc3339};
use crate::error::{AppError, Result};

pub const MAX_TOPIC_LEN: usize = 300;
pub const SLOT_TAKEN: &str = "This time slot is already booked";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Active bookings hold their expert/date/slot.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// `pending -> confirmed | cancelled`, `confirmed -> completed | cancelled`.
    /// Re-setting the current status is allowed and changes nothing.
    pub fn can_become(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, Confirmed) | (Pending, Cancelled) | (Confirmed, Completed) | (Confirmed, Cancelled)
            )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub expert_id: ObjectId,
    pub date: DateTime,
    pub time_slot: String,
    pub topic: String,
    #[serde(default)]
    pub status: BookingStatus,
    #[serde(default)]
    pub meeting_link: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub cancellation_reason: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl Booking {
    /// Matches active bookings occupying the given expert/date/slot.
    pub fn active_slot_filter(expert_id: ObjectId, date: DateTime, time_slot: &str) -> Document {
        doc! {
            "expertId": expert_id,
            "date": date,
            "timeSlot": time_slot,
            "status": {
                "$in": [BookingStatus::Pending.as_str(), BookingStatus::Confirmed.as_str()]
            },
        }
    }

    pub fn ensure_slot_free(existing: Option<&Booking>) -> Result<()> {
        match existing {
            Some(booking) if booking.status.is_active() => {
                Err(AppError::bad_request(SLOT_TAKEN))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub expert_id: String,
    pub date: String,
    pub time_slot: String,
    pub topic: String,
}

impl CreateBookingRequest {
    pub fn into_booking(self, user_id: ObjectId, expert_id: ObjectId) -> Result<Booking> {
        let now = DateTime::now();
        Ok(Booking {
            id: None,
            user_id,
            expert_id,
            date: parse_booking_date(&self.date)?,
            time_slot: required_text(&self.time_slot, "Time slot", 50)?,
            topic: required_text(&self.topic, "Topic", MAX_TOPIC_LEN)?,
            status: BookingStatus::Pending,
            meeting_link: String::new(),
            notes: String::new(),
            cancellation_reason: String::new(),
            created_at: now,
            updated_at: now,
        })
    }
}

/// Accepts a calendar date (`2025-03-14`, taken as UTC midnight) or an RFC 3339 timestamp.
pub fn parse_booking_date(raw: &str) -> Result<DateTime> {
    let raw = raw.trim();
    let millis = if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        date.and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
    } else {
        chrono::DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
    };

    millis
        .map(DateTime::from_millis)
        .ok_or_else(|| AppError::bad_request("Invalid booking date"))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBookingRequest {
    pub status: Option<BookingStatus>,
    pub meeting_link: Option<String>,
    pub notes: Option<String>,
    pub cancellation_reason: Option<String>,
}

impl UpdateBookingRequest {
    /// Rejects a status change outside the booking lifecycle before touching anything.
    pub fn apply(self, booking: &mut Booking) -> Result<()> {
        if let Some(status) = self.status {
            if !booking.status.can_become(status) {
                return Err(AppError::bad_request(format!(
                    "Cannot change booking status from {} to {}",
                    booking.status.as_str(),
                    status.as_str()
                )));
            }
            booking.status = status;
        }
        if let Some(link) = self.meeting_link.filter(|v| !v.is_empty()) {
            booking.meeting_link = link;
        }
        if let Some(notes) = self.notes.filter(|v| !v.is_empty()) {
            booking.notes = notes;
        }
        if let Some(reason) = self.cancellation_reason.filter(|v| !v.is_empty()) {
            booking.cancellation_reason = reason;
        }
        booking.updated_at = DateTime::now();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: Ref<UserSummary>,
    pub expert_id: Ref<ExpertView>,
    pub date: String,
    pub time_slot: String,
    pub topic: String,
    pub status: BookingStatus,
    pub meeting_link: String,
    pub notes: String,
    pub cancellation_reason: String,
    pub created_at: String,
    pub updated_at: String,
}

impl BookingView {
    pub fn new(booking: Booking, user: Option<UserSummary>, expert: Option<ExpertView>) -> Self {
        BookingView {
            id: id_hex(&booking.id),
            user_id: Ref::resolve(&booking.user_id, user),
            expert_id: Ref::resolve(&booking.expert_id, expert),
            date: rfc3339(&booking.date),
            time_slot: booking.time_slot,
            topic: booking.topic,
            status: booking.status,
            meeting_link: booking.meeting_link,
            notes: booking.notes,
            cancellation_reason: booking.cancellation_reason,
            created_at: rfc3339(&booking.created_at),
            updated_at: rfc3339(&booking.updated_at),
        }
    }
}
