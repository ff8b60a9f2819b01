pub mod booking;
pub mod expert;
pub mod message;
pub mod project;
pub mod user;

pub use booking::{Booking, BookingStatus, BookingView, CreateBookingRequest, UpdateBookingRequest};
pub use expert::{CreateExpertRequest, Expert, ExpertView, UpdateExpertRequest};
pub use message::{Message, MessageType, MessageView, SendMessageRequest};
pub use project::{CreateProjectRequest, Project, ProjectView};
pub use user::{CreateUserRequest, PublicUser, Role, UpdateProfileRequest, User, UserSummary, UserView};

use mongodb::bson::DateTime;
use mongodb::bson::oid::ObjectId;
use serde::Serialize;

use crate::error::{AppError, Result};

/// A reference that is either resolved to the referenced document or left as its id.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Ref<T> {
    Populated(T),
    Id(String),
}

impl<T> Ref<T> {
    pub fn resolve(id: &ObjectId, found: Option<T>) -> Self {
        match found {
            Some(value) => Ref::Populated(value),
            None => Ref::Id(id.to_hex()),
        }
    }
}

pub fn parse_object_id(raw: &str, what: &str) -> Result<ObjectId> {
    ObjectId::parse_str(raw.trim()).map_err(|_| AppError::bad_request(format!("Invalid {} id", what)))
}

pub fn id_hex(id: &Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

pub fn rfc3339(dt: &DateTime) -> String {
    dt.try_to_rfc3339_string().unwrap_or_default()
}

/// Trims `value` and checks it is non-empty and at most `max` characters.
pub fn required_text(value: &str, field: &str, max: usize) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", field)));
    }
    if trimmed.chars().count() > max {
        return Err(AppError::bad_request(format!(
            "{} cannot be more than {} characters",
            field, max
        )));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_trims_and_bounds() {
        assert_eq!(required_text("  hi ", "Title", 10).unwrap(), "hi");
        assert!(required_text("   ", "Title", 10).is_err());
        assert!(required_text("abcdefghijk", "Title", 10).is_err());
    }

    #[test]
    fn unresolved_refs_fall_back_to_id() {
        let id = ObjectId::new();
        let r: Ref<String> = Ref::resolve(&id, None);
        assert_eq!(r, Ref::Id(id.to_hex()));
        assert_eq!(
            serde_json::to_value(&r).unwrap(),
            serde_json::Value::String(id.to_hex())
        );
    }

    #[test]
    fn rejects_malformed_object_id() {
        assert!(parse_object_id("not-an-id", "expert").is_err());
        assert!(parse_object_id(&ObjectId::new().to_hex(), "expert").is_ok());
    }
}
