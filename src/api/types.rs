//! Wire types shared by the client and the development backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` the same as a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Auth
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub is_verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Email or username.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyEmailRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendCodeRequest {
    pub email: String,
}

/// Successful sign-in, verification or registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    pub user: User,
    pub token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResponse {
    pub user: User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    pub refresh_token: String,
}

/// Error body: `{message}` plus optional hints.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub needs_verification: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub portfolio_id: Option<String>,
}

impl ErrorBody {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// Portfolio records
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EducationEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub degree: String,
    #[serde(deserialize_with = "null_as_default")]
    pub institution: String,
    #[serde(deserialize_with = "null_as_default")]
    pub years: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub technologies: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub image_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub live_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub repo_url: String,
    #[serde(deserialize_with = "null_as_default")]
    pub featured: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    #[serde(deserialize_with = "null_as_default")]
    pub email_address: String,
    #[serde(deserialize_with = "null_as_default")]
    pub phone_number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SocialLinkEntry {
    #[serde(deserialize_with = "null_as_default")]
    pub platform: String,
    #[serde(deserialize_with = "null_as_default")]
    pub icon: String,
    #[serde(deserialize_with = "null_as_default")]
    pub url: String,
}

/// Content of a portfolio in the backend's persistence shape.
///
/// Every field tolerates being missing or `null`, so partially written
/// records still decode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PortfolioInput {
    #[serde(deserialize_with = "null_as_default")]
    pub template_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_url: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub brand_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub hero_image: String,
    #[serde(deserialize_with = "null_as_default")]
    pub companies: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub section_about: String,
    #[serde(deserialize_with = "null_as_default")]
    pub section_subtitle: String,
    #[serde(deserialize_with = "null_as_default")]
    pub about_me_description: String,
    #[serde(deserialize_with = "null_as_default")]
    pub skills: Vec<SkillEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub education: Vec<EducationEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub projects: Vec<ProjectEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub contact_info: Vec<ContactInfo>,
    #[serde(deserialize_with = "null_as_default")]
    pub social_links: Vec<SocialLinkEntry>,
    #[serde(deserialize_with = "null_as_default")]
    pub is_public: bool,
    #[serde(deserialize_with = "null_as_default")]
    pub tags: Vec<String>,
}

/// A stored portfolio as returned by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioRecord {
    #[serde(rename = "_id", alias = "id", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(flatten)]
    pub content: PortfolioInput,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// `{portfolio: {...}}` wrapper used by create and update responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioEnvelope {
    pub portfolio: PortfolioRecord,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomUrlRequest {
    pub template_type: String,
    pub custom_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomUrlResponse {
    pub available: bool,
    pub custom_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub url: String,
    pub secure_url: String,
    pub filename: String,
    pub size: usize,
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_decodes_with_missing_and_null_arrays() {
        let json = r#"{"_id":"abc123","brandName":"Jane","skills":null,"templateType":"template1"}"#;
        let record: PortfolioRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.id, "abc123");
        assert_eq!(record.content.brand_name, "Jane");
        assert!(record.content.skills.is_empty());
        assert!(record.content.contact_info.is_empty());
    }

    #[test]
    fn test_record_decodes_with_nulls_inside_entries() {
        let json = r#"{
            "_id": "a",
            "isPublic": null,
            "projects": [{"name": null, "description": "Site", "featured": null, "technologies": null}],
            "education": [{"degree": null, "years": "2020"}],
            "skills": [{"name": null, "level": null}],
            "contactInfo": [{"emailAddress": null, "phoneNumber": "555"}],
            "socialLinks": [{"platform": "github", "url": null}]
        }"#;
        let record: PortfolioRecord = serde_json::from_str(json).unwrap();
        let content = &record.content;
        assert!(!content.is_public);
        assert_eq!(content.projects[0].name, "");
        assert_eq!(content.projects[0].description, "Site");
        assert!(!content.projects[0].featured);
        assert!(content.projects[0].technologies.is_empty());
        assert_eq!(content.education[0].degree, "");
        assert_eq!(content.skills[0].name, "");
        assert_eq!(content.contact_info[0].email_address, "");
        assert_eq!(content.contact_info[0].phone_number, "555");
        assert_eq!(content.social_links[0].url, "");

        let null_id: PortfolioRecord = serde_json::from_str(r#"{"_id":null}"#).unwrap();
        assert!(null_id.id.is_empty());
    }

    #[test]
    fn test_record_accepts_plain_id() {
        let record: PortfolioRecord = serde_json::from_str(r#"{"id":"x1"}"#).unwrap();
        assert_eq!(record.id, "x1");
    }

    #[test]
    fn test_input_serializes_camel_case() {
        let input = PortfolioInput {
            section_about: "About".into(),
            contact_info: vec![ContactInfo {
                email_address: "a@b.c".into(),
                phone_number: String::new(),
            }],
            ..PortfolioInput::default()
        };
        let value = serde_json::to_value(&input).unwrap();
        assert_eq!(value["sectionAbout"], "About");
        assert_eq!(value["contactInfo"][0]["emailAddress"], "a@b.c");
        assert!(value.get("customUrl").is_none());
    }
}
