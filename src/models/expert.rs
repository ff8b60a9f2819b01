use mongodb::bson::oid::ObjectId;
use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};

use super::{Ref, UserSummary, id_hex, required_text, rfc3339};
use crate::error::{AppError, Result};

pub const MAX_BIO_LEN: usize = 500;
pub const MAX_RATING: f64 = 5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expert {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub bio: String,
    pub expertise: Vec<String>,
    pub hourly_rate: f64,
    #[serde(default)]
    pub availability: Vec<String>,
    #[serde(default)]
    pub rating: f64,
    #[serde(default)]
    pub total_reviews: i64,
    #[serde(default)]
    pub total_sessions: i64,
    #[serde(default)]
    pub years_of_experience: i64,
    #[serde(default)]
    pub linkedin_url: String,
    #[serde(default)]
    pub github_url: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateExpertRequest {
    pub bio: String,
    pub expertise: Vec<String>,
    pub hourly_rate: f64,
    #[serde(default)]
    pub availability: Vec<String>,
    #[serde(default)]
    pub years_of_experience: Option<i64>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
}

impl CreateExpertRequest {
    pub fn into_expert(self, user_id: ObjectId) -> Result<Expert> {
        let years = self.years_of_experience.unwrap_or(0);
        if years < 0 {
            return Err(AppError::bad_request("Years of experience cannot be negative"));
        }

        let now = DateTime::now();
        Ok(Expert {
            id: None,
            user_id,
            bio: required_text(&self.bio, "Bio", MAX_BIO_LEN)?,
            expertise: expertise_tags(self.expertise)?,
            hourly_rate: hourly_rate(self.hourly_rate)?,
            availability: trimmed_list(self.availability),
            rating: 0.0,
            total_reviews: 0,
            total_sessions: 0,
            years_of_experience: years,
            linkedin_url: self.linkedin_url.unwrap_or_default(),
            github_url: self.github_url.unwrap_or_default(),
            created_at: now,
            updated_at: now,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateExpertRequest {
    pub bio: Option<String>,
    pub expertise: Option<Vec<String>>,
    pub hourly_rate: Option<f64>,
    pub availability: Option<Vec<String>>,
    pub years_of_experience: Option<i64>,
    pub linkedin_url: Option<String>,
    pub github_url: Option<String>,
}

impl UpdateExpertRequest {
    /// Validated `$set` document holding only the supplied fields.
    pub fn into_update(self) -> Result<Document> {
        let mut set = doc! { "updatedAt": DateTime::now() };

        if let Some(bio) = self.bio {
            set.insert("bio", required_text(&bio, "Bio", MAX_BIO_LEN)?);
        }
        if let Some(expertise) = self.expertise {
            set.insert("expertise", expertise_tags(expertise)?);
        }
        if let Some(rate) = self.hourly_rate {
            set.insert("hourlyRate", hourly_rate(rate)?);
        }
        if let Some(availability) = self.availability {
            set.insert("availability", trimmed_list(availability));
        }
        if let Some(years) = self.years_of_experience {
            if years < 0 {
                return Err(AppError::bad_request("Years of experience cannot be negative"));
            }
            set.insert("yearsOfExperience", years);
        }
        if let Some(url) = self.linkedin_url {
            set.insert("linkedinUrl", url.trim());
        }
        if let Some(url) = self.github_url {
            set.insert("githubUrl", url.trim());
        }

        Ok(doc! { "$set": set })
    }
}

fn expertise_tags(tags: Vec<String>) -> Result<Vec<String>> {
    let tags = trimmed_list(tags);
    if tags.is_empty() {
        return Err(AppError::bad_request("At least one expertise area is required"));
    }
    Ok(tags)
}

fn hourly_rate(rate: f64) -> Result<f64> {
    if !rate.is_finite() || rate < 0.0 {
        return Err(AppError::bad_request("Hourly rate must be zero or more"));
    }
    Ok(rate)
}

fn trimmed_list(values: Vec<String>) -> Vec<String> {
    values
        .into_iter()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpertView {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: Ref<UserSummary>,
    pub bio: String,
    pub expertise: Vec<String>,
    pub hourly_rate: f64,
    pub availability: Vec<String>,
    pub rating: f64,
    pub total_reviews: i64,
    pub total_sessions: i64,
    pub years_of_experience: i64,
    pub linkedin_url: String,
    pub github_url: String,
    pub created_at: String,
    pub updated_at: String,
}

impl ExpertView {
    pub fn new(expert: Expert, user: Option<UserSummary>) -> Self {
        ExpertView {
            id: id_hex(&expert.id),
            user_id: Ref::resolve(&expert.user_id, user),
            bio: expert.bio,
            expertise: expert.expertise,
            hourly_rate: expert.hourly_rate,
            availability: expert.availability,
            rating: expert.rating.clamp(0.0, MAX_RATING),
            total_reviews: expert.total_reviews,
            total_sessions: expert.total_sessions,
            years_of_experience: expert.years_of_experience,
            linkedin_url: expert.linkedin_url,
            github_url: expert.github_url,
            created_at: rfc3339(&expert.created_at),
            updated_at: rfc3339(&expert.updated_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateExpertRequest {
        CreateExpertRequest {
            bio: "Backend engineer".to_string(),
            expertise: vec![" Rust ".to_string(), "".to_string(), "MongoDB".to_string()],
            hourly_rate: 40.0,
            availability: vec!["Monday 9-12".to_string()],
            years_of_experience: None,
            linkedin_url: None,
            github_url: None,
        }
    }

    #[test]
    fn builds_expert_with_clean_tags() {
        let user_id = ObjectId::new();
        let expert = request().into_expert(user_id).unwrap();
        assert_eq!(expert.user_id, user_id);
        assert_eq!(expert.expertise, vec!["Rust", "MongoDB"]);
        assert_eq!(expert.total_sessions, 0);
    }

    #[test]
    fn requires_some_expertise() {
        let mut req = request();
        req.expertise = vec!["  ".to_string()];
        assert!(req.into_expert(ObjectId::new()).is_err());
    }

    #[test]
    fn rejects_negative_rate() {
        let mut req = request();
        req.hourly_rate = -1.0;
        assert!(req.into_expert(ObjectId::new()).is_err());
    }

    #[test]
    fn update_sets_only_supplied_fields() {
        let update = UpdateExpertRequest {
            hourly_rate: Some(55.0),
            ..Default::default()
        }
        .into_update()
        .unwrap();

        let set = update.get_document("$set").unwrap();
        assert_eq!(set.get_f64("hourlyRate").unwrap(), 55.0);
        assert!(set.get("bio").is_none());
        assert!(set.contains_key("updatedAt"));
    }
}
