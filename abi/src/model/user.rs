use serde::{Deserialize, Serialize};

use crate::errors::Error;
use crate::model::document::{DocPath, Document, FieldValue, Fields};

pub const DISPLAY_NAME: &str = "displayName";
pub const EMAIL: &str = "email";

/// Profile record owned by the auth/profile side, read-only for friendships.
#[derive(Clone, Serialize, Default, Deserialize, Debug, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl User {
    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        email: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            email: email.into(),
        }
    }

    pub fn path(&self) -> Result<DocPath, Error> {
        DocPath::user(&self.id)
    }

    pub fn fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert(
            DISPLAY_NAME.to_string(),
            FieldValue::from(self.display_name.as_str()),
        );
        fields.insert(EMAIL.to_string(), FieldValue::from(self.email.as_str()));
        fields
    }
}

// profiles written by older clients may lack either field
impl From<&Document> for User {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id().to_string(),
            display_name: doc
                .opt_str_field(DISPLAY_NAME)
                .unwrap_or_default()
                .to_string(),
            email: doc.opt_str_field(EMAIL).unwrap_or_default().to_string(),
        }
    }
}
