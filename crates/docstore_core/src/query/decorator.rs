//! Projection requests recorded by decorator options.

use serde::{Deserialize, Serialize};

/// Optional document field a caller may ask to have populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Content,
    Labels,
}

/// Target that decorator options write their requests into.
pub trait DocumentDecorator {
    fn request(&mut self, field: Field);
}

/// Set of fields to populate when loading documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Projection {
    pub content: bool,
    pub labels: bool,
}

impl Projection {
    pub fn includes(&self, field: Field) -> bool {
        match field {
            Field::Content => self.content,
            Field::Labels => self.labels,
        }
    }
}

impl DocumentDecorator for Projection {
    fn request(&mut self, field: Field) {
        match field {
            Field::Content => self.content = true,
            Field::Labels => self.labels = true,
        }
    }
}
