//! Articles written on this side, before the server has given them an id.

use serde::{Deserialize, Serialize};

use crate::error::{ClientError, ClientResult};

/// An article to publish, on its own or into a community.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub description: String,
    pub content: String,
    /// Image URL (or data URL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub categories: Vec<String>,
}

impl ArticleDraft {
    pub fn new(title: impl Into<String>, description: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: description.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = Some(image.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        let category = category.into();
        if !self.categories.contains(&category) {
            self.categories.push(category);
        }
        self
    }

    pub fn validate(&self) -> ClientResult<()> {
        for (field, value) in [
            ("title", &self.title),
            ("description", &self.description),
            ("content", &self.content),
        ] {
            if value.trim().is_empty() {
                return Err(ClientError::InvalidForm(format!("{field} is required")));
            }
        }
        Ok(())
    }
}

/// Body of a community post: the draft plus the community it goes to.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommunityPost<'a> {
    pub community_id: &'a str,
    #[serde(flatten)]
    pub draft: &'a ArticleDraft,
}
