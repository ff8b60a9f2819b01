use mongodb::bson::DateTime;
use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use super::{Ref, UserSummary, id_hex, required_text, rfc3339};
use crate::error::{AppError, Result};

pub const MAX_TITLE_LEN: usize = 100;
pub const MAX_DESCRIPTION_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    #[default]
    Beginner,
    Intermediate,
    Advanced,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectStatus {
    #[default]
    Open,
    #[serde(rename = "In Progress")]
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tech: Vec<String>,
    pub owner: ObjectId,
    #[serde(default)]
    pub members: Vec<ObjectId>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    pub created_at: DateTime,
}

impl Project {
    pub fn is_member(&self, user_id: &ObjectId) -> bool {
        self.owner == *user_id || self.members.contains(user_id)
    }

    pub fn add_member(&mut self, user_id: ObjectId) -> Result<()> {
        if self.is_member(&user_id) {
            return Err(AppError::bad_request("You are already a member of this project"));
        }
        self.members.push(user_id);
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub tech: Vec<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub github_url: Option<String>,
}

impl CreateProjectRequest {
    /// The owner is always the first member.
    pub fn into_project(self, owner: ObjectId) -> Result<Project> {
        let github_url = match self.github_url.map(|u| u.trim().to_string()) {
            Some(url) if url.is_empty() => None,
            Some(url) if !is_github_repo_url(&url) => {
                return Err(AppError::bad_request("Please provide a valid GitHub URL"));
            }
            other => other,
        };

        Ok(Project {
            id: None,
            title: required_text(&self.title, "Title", MAX_TITLE_LEN)?,
            description: required_text(&self.description, "Description", MAX_DESCRIPTION_LEN)?,
            tech: self
                .tech
                .into_iter()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect(),
            owner,
            members: vec![owner],
            difficulty: self.difficulty,
            status: ProjectStatus::Open,
            github_url,
            created_at: DateTime::now(),
        })
    }
}

/// `[http[s]://][www.]github.com/<owner>/<repo>`
pub fn is_github_repo_url(url: &str) -> bool {
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    let rest = rest.strip_prefix("www.").unwrap_or(rest);
    let Some(path) = rest.strip_prefix("github.com/") else {
        return false;
    };

    let segments: Vec<&str> = path.split('/').collect();
    segments.len() == 2
        && segments.iter().all(|s| {
            !s.is_empty()
                && s.chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectView {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub tech: Vec<String>,
    pub owner: Ref<UserSummary>,
    pub members: Vec<Ref<UserSummary>>,
    pub difficulty: Difficulty,
    pub status: ProjectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_url: Option<String>,
    pub created_at: String,
}

impl ProjectView {
    pub fn new<F>(project: Project, lookup: F) -> Self
    where
        F: Fn(&ObjectId) -> Option<UserSummary>,
    {
        ProjectView {
            id: id_hex(&project.id),
            owner: Ref::resolve(&project.owner, lookup(&project.owner)),
            members: project
                .members
                .iter()
                .map(|id| Ref::resolve(id, lookup(id)))
                .collect(),
            title: project.title,
            description: project.description,
            tech: project.tech,
            difficulty: project.difficulty,
            status: project.status,
            github_url: project.github_url,
            created_at: rfc3339(&project.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CreateProjectRequest {
        CreateProjectRequest {
            title: "  SquadUp bot ".to_string(),
            description: "A Discord bot".to_string(),
            tech: vec![" rust".to_string(), " ".to_string()],
            difficulty: Difficulty::Intermediate,
            github_url: Some("https://github.com/squad/bot".to_string()),
        }
    }

    #[test]
    fn owner_is_first_member() {
        let owner = ObjectId::new();
        let project = request().into_project(owner).unwrap();
        assert_eq!(project.members, vec![owner]);
        assert_eq!(project.title, "SquadUp bot");
        assert_eq!(project.tech, vec!["rust"]);
        assert_eq!(project.status, ProjectStatus::Open);
    }

    #[test]
    fn joining_twice_is_rejected() {
        let owner = ObjectId::new();
        let mut project = request().into_project(owner).unwrap();
        let member = ObjectId::new();

        project.add_member(member).unwrap();
        assert!(project.add_member(member).is_err());
        assert!(project.add_member(owner).is_err());
        assert_eq!(project.members.len(), 2);
    }

    #[test]
    fn validates_github_urls() {
        assert!(is_github_repo_url("github.com/a/b"));
        assert!(is_github_repo_url("http://www.github.com/a-1/b_2"));
        assert!(!is_github_repo_url("https://gitlab.com/a/b"));
        assert!(!is_github_repo_url("https://github.com/a"));
        assert!(!is_github_repo_url("https://github.com/a/b/c"));

        let mut req = request();
        req.github_url = Some("https://example.com".to_string());
        assert!(req.into_project(ObjectId::new()).is_err());
    }

    #[test]
    fn status_wire_names() {
        assert_eq!(
            serde_json::to_value(ProjectStatus::InProgress).unwrap(),
            "In Progress"
        );
        let d: Difficulty = serde_json::from_str("\"Advanced\"").unwrap();
        assert_eq!(d, Difficulty::Advanced);
    }
}
