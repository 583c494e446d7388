//! Post and section records exchanged with the backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque identifier of a persisted post.
pub type PostId = String;

/// Serialized rich-text body of a post.
///
/// `category` duplicates the owning section inside the content blob. Older
/// records only carry the section here, so it is still written, but the
/// `section_id` column is authoritative: see [`Post::effective_section`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostContent {
    #[serde(default)]
    pub html: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl PostContent {
    pub fn new<S: Into<String>>(html: S) -> Self {
        Self {
            html: html.into(),
            category: None,
        }
    }

    pub fn with_category<S: Into<String>>(mut self, category: S) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// A post as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub title: String,
    pub slug: String,
    pub content: PostContent,
    pub section_id: Option<String>,
    pub user_id: Option<String>,
    pub cover_image_url: Option<String>,
    pub excerpt: Option<String>,
    pub is_published: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Post {
    /// Section the post belongs to, reconciling the duplicated field.
    ///
    /// The column wins; the copy inside the content blob is only consulted
    /// when the column is empty.
    ///
    /// # Example
    ///
    /// ```rust
    /// use scriptorium_api::{NewPost, PostContent};
    ///
    /// let mut post = NewPost::draft("Title", "title", PostContent::new("").with_category("poetry"))
    ///     .into_post("1".to_string(), chrono::Utc::now());
    /// assert_eq!(post.effective_section(), Some("poetry"));
    ///
    /// post.section_id = Some("prophecy".to_string());
    /// assert_eq!(post.effective_section(), Some("prophecy"));
    /// ```
    pub fn effective_section(&self) -> Option<&str> {
        self.section_id
            .as_deref()
            .filter(|s| !s.is_empty())
            .or_else(|| self.content.category.as_deref().filter(|s| !s.is_empty()))
    }
}

/// Fields sent when inserting a post. The server assigns id and timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPost {
    pub title: String,
    pub slug: String,
    pub content: PostContent,
    pub section_id: Option<String>,
    pub user_id: Option<String>,
    pub cover_image_url: Option<String>,
    pub excerpt: Option<String>,
    pub is_published: bool,
}

impl NewPost {
    /// An unpublished post with only the editor's core fields set.
    pub fn draft<T: Into<String>, S: Into<String>>(title: T, slug: S, content: PostContent) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            content,
            section_id: None,
            user_id: None,
            cover_image_url: None,
            excerpt: None,
            is_published: false,
        }
    }

    /// Materialize the record a backend would store for this insert.
    pub fn into_post(self, id: PostId, now: DateTime<Utc>) -> Post {
        Post {
            id,
            title: self.title,
            slug: self.slug,
            content: self.content,
            section_id: self.section_id,
            user_id: self.user_id,
            cover_image_url: self.cover_image_url,
            excerpt: self.excerpt,
            is_published: self.is_published,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a post. `None` leaves the column untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostUpdate {
    pub title: Option<String>,
    pub slug: Option<String>,
    pub content: Option<PostContent>,
    pub section_id: Option<String>,
    pub cover_image_url: Option<String>,
    pub excerpt: Option<String>,
    pub is_published: Option<bool>,
}

impl PostUpdate {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Apply the update to a stored record, stamping `updated_at`.
    pub fn apply_to(self, post: &mut Post, now: DateTime<Utc>) {
        if let Some(title) = self.title {
            post.title = title;
        }
        if let Some(slug) = self.slug {
            post.slug = slug;
        }
        if let Some(content) = self.content {
            post.content = content;
        }
        if let Some(section_id) = self.section_id {
            post.section_id = Some(section_id);
        }
        if let Some(url) = self.cover_image_url {
            post.cover_image_url = Some(url);
        }
        if let Some(excerpt) = self.excerpt {
            post.excerpt = Some(excerpt);
        }
        if let Some(published) = self.is_published {
            post.is_published = published;
        }
        post.updated_at = now;
    }
}

/// A section of the site; the editor's category selector lists these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub position: i32,
}

/// Filter for [`list_posts`](crate::PostBackend::list_posts).
///
/// Every field that is set must match. `text` is a case-insensitive
/// substring match against the title, the html body and the excerpt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostFilter {
    pub user_id: Option<String>,
    pub section_id: Option<String>,
    pub title: Option<String>,
    pub is_published: Option<bool>,
    pub text: Option<String>,
}

impl PostFilter {
    pub fn for_user<S: Into<String>>(user_id: S) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ..Self::default()
        }
    }

    pub fn published() -> Self {
        Self {
            is_published: Some(true),
            ..Self::default()
        }
    }

    pub fn with_title<S: Into<String>>(mut self, title: S) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_section<S: Into<String>>(mut self, section_id: S) -> Self {
        self.section_id = Some(section_id.into());
        self
    }

    pub fn with_published(mut self, published: bool) -> Self {
        self.is_published = Some(published);
        self
    }

    pub fn with_text<S: Into<String>>(mut self, text: S) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Whether a stored post satisfies the filter.
    pub fn matches(&self, post: &Post) -> bool {
        if let Some(user_id) = &self.user_id {
            if post.user_id.as_deref() != Some(user_id.as_str()) {
                return false;
            }
        }
        if let Some(section_id) = &self.section_id {
            if post.section_id.as_deref() != Some(section_id.as_str()) {
                return false;
            }
        }
        if let Some(title) = &self.title {
            if &post.title != title {
                return false;
            }
        }
        if let Some(published) = self.is_published {
            if post.is_published != published {
                return false;
            }
        }
        if let Some(text) = &self.text {
            let needle = text.to_lowercase();
            let hit = post.title.to_lowercase().contains(&needle)
                || post.content.html.to_lowercase().contains(&needle)
                || post
                    .excerpt
                    .as_deref()
                    .is_some_and(|e| e.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        true
    }
}

/// Ordering for listed posts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PostOrder {
    #[default]
    UpdatedDesc,
    CreatedDesc,
    TitleAsc,
}

impl PostOrder {
    pub fn sort(&self, posts: &mut [Post]) {
        match self {
            PostOrder::UpdatedDesc => posts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
            PostOrder::CreatedDesc => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            PostOrder::TitleAsc => posts.sort_by(|a, b| a.title.cmp(&b.title)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Post {
        let mut new = NewPost::draft("Night Songs", "night-songs", PostContent::new("<p>Under the moon</p>"));
        new.section_id = Some("poetry".to_string());
        new.user_id = Some("u1".to_string());
        new.excerpt = Some("A quiet piece".to_string());
        new.into_post("p1".to_string(), Utc::now())
    }

    #[test]
    fn test_filter_matching() {
        let post = sample();
        assert!(PostFilter::for_user("u1").matches(&post));
        assert!(!PostFilter::for_user("u2").matches(&post));
        assert!(PostFilter::default().with_section("poetry").matches(&post));
        assert!(PostFilter::default().with_title("Night Songs").matches(&post));
        assert!(!PostFilter::published().matches(&post));
        assert!(PostFilter::default().with_text("MOON").matches(&post));
        assert!(PostFilter::default().with_text("quiet").matches(&post));
        assert!(!PostFilter::default().with_text("sun").matches(&post));
    }

    #[test]
    fn test_update_applies_only_set_fields() {
        let mut post = sample();
        let before = post.updated_at;
        let update = PostUpdate {
            is_published: Some(true),
            ..PostUpdate::default()
        };
        assert!(!update.is_empty());
        update.apply_to(&mut post, before + chrono::Duration::seconds(5));

        assert!(post.is_published);
        assert_eq!(post.title, "Night Songs");
        assert!(post.updated_at > before);
    }

    #[test]
    fn test_effective_section_prefers_column() {
        let mut post = sample();
        post.content.category = Some("parables".to_string());
        assert_eq!(post.effective_section(), Some("poetry"));

        post.section_id = Some(String::new());
        assert_eq!(post.effective_section(), Some("parables"));
    }

    #[test]
    fn test_content_serialization_skips_missing_category() {
        let json = serde_json::to_string(&PostContent::new("<p>x</p>")).unwrap();
        assert_eq!(json, r#"{"html":"<p>x</p>"}"#);

        let parsed: PostContent = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, PostContent::default());
    }

    #[test]
    fn test_order_sort() {
        let mut a = sample();
        let mut b = sample();
        a.title = "B".into();
        b.title = "A".into();
        b.updated_at = a.updated_at + chrono::Duration::seconds(1);

        let mut posts = vec![a, b];
        PostOrder::UpdatedDesc.sort(&mut posts);
        assert_eq!(posts[0].title, "A");
        PostOrder::TitleAsc.sort(&mut posts);
        assert_eq!(posts[0].title, "A");
    }
}
