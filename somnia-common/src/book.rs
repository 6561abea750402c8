//! Dream book data model
//!
//! A `Book` is an ordered sequence of pages, loaded once when a reading
//! session mounts and treated as immutable for the life of that session.
//! Insertion order is reading order; page indices are stable.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of a dream book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page {
    /// Narration text for this page
    pub text: String,

    /// Opaque reference to the page illustration (not interpreted by the
    /// playback engine; carried for clients)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_ref: Option<String>,

    /// Pre-resolved ambient sound URL for this page, if any.
    /// Absent URL means no ambient channel activity for the page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_sound_url: Option<String>,
}

/// A complete dream book
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    /// Book identifier
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Display title
    #[serde(default)]
    pub title: String,

    /// Pages in reading order
    pub pages: Vec<Page>,
}

impl Book {
    /// Validate a book for mounting.
    ///
    /// A book must have at least one page, and every page must carry
    /// narration text (an empty page cannot be narrated).
    pub fn validate(&self) -> Result<()> {
        if self.pages.is_empty() {
            return Err(Error::InvalidInput("book has no pages".to_string()));
        }
        for (index, page) in self.pages.iter().enumerate() {
            if page.text.trim().is_empty() {
                return Err(Error::InvalidInput(format!(
                    "page {} has no narration text",
                    index
                )));
            }
        }
        Ok(())
    }

    /// Number of pages
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Page by index
    pub fn page(&self, index: usize) -> Option<&Page> {
        self.pages.get(index)
    }

    /// Index of the last page
    pub fn last_page(&self) -> usize {
        self.pages.len().saturating_sub(1)
    }
}
