//! Authors and their content sources (books).
//!
//! Both are read-only to the runtime; they are written by provisioning.

use serde::{Deserialize, Serialize};

/// One unit of author-authored material whose full text is submitted to
/// the generation engine on every query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentSource {
    /// Unique per author
    pub title: String,

    /// Full text
    pub content: String,

    /// Owning author's name
    pub author: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publication_year: Option<i32>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl ContentSource {
    pub fn new(
        author: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            author: author.into(),
            publication_year: None,
            metadata: serde_json::Map::new(),
        }
    }
}

/// An author persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Primary key
    pub name: String,

    /// Messaging address the persona answers on (e.g. a WhatsApp number)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,

    /// Ordered sources. Filled by catalog listings, empty on `get_author`
    #[serde(default)]
    pub sources: Vec<ContentSource>,

    /// Free-form description of how the author talks
    #[serde(default)]
    pub conversation_style: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Author {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            contact: None,
            sources: Vec::new(),
            conversation_style: serde_json::Value::Null,
            bio: None,
            metadata: serde_json::Map::new(),
        }
    }

    /// A copy of the persona fields, leaving `sources` empty.
    pub fn profile(&self) -> Self {
        Self {
            name: self.name.clone(),
            contact: self.contact.clone(),
            sources: Vec::new(),
            conversation_style: self.conversation_style.clone(),
            bio: self.bio.clone(),
            metadata: self.metadata.clone(),
        }
    }

    /// Whether `identifier` names this author, by name or by contact.
    pub fn answers_to(&self, identifier: &str) -> bool {
        self.name == identifier || self.contact.as_deref() == Some(identifier)
    }

    /// Render the conversation style descriptor as prompt text.
    pub fn style_text(&self) -> Option<String> {
        match &self.conversation_style {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.trim().is_empty() => None,
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(map) if map.is_empty() => None,
            serde_json::Value::Object(map) => Some(
                map.iter()
                    .map(|(k, v)| match v {
                        serde_json::Value::String(s) => format!("- {k}: {s}"),
                        other => format!("- {k}: {other}"),
                    })
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            other => Some(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn author_answers_to_name_or_contact() {
        let mut author = Author::new("Slavoj Zizek");
        author.contact = Some("+14155238886".into());
        assert!(author.answers_to("Slavoj Zizek"));
        assert!(author.answers_to("+14155238886"));
        assert!(!author.answers_to("+10000000000"));
    }

    #[test]
    fn style_text_from_object() {
        let mut author = Author::new("A");
        author.conversation_style = serde_json::json!({
            "tone": "provocative",
            "digressions": true
        });
        let text = author.style_text().unwrap();
        assert!(text.contains("- tone: provocative"));
        assert!(text.contains("- digressions: true"));
    }

    #[test]
    fn empty_style_is_none() {
        let mut author = Author::new("A");
        assert!(author.style_text().is_none());
        author.conversation_style = serde_json::json!({});
        assert!(author.style_text().is_none());
    }

    #[test]
    fn content_source_deserializes_without_optionals() {
        let src: ContentSource = serde_json::from_str(
            r#"{"title":"Book1","content":"text","author":"A"}"#,
        )
        .unwrap();
        assert_eq!(src.publication_year, None);
        assert!(src.metadata.is_empty());
    }
}
