//! Paginated history responses.

use serde::{Deserialize, Serialize};

use crate::{
    Message,
    errors::{ProtocolError, Result},
};

/// One page of message history.
///
/// Returned by `GET /messages`. Messages are ordered oldest to newest.
/// `next_cursor` identifies the oldest message boundary for the next backward
/// fetch; `None` means there is no further history.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePage {
    /// Messages, oldest first.
    pub messages: Vec<Message>,
    /// Server has older messages beyond this page.
    pub has_more: bool,
    /// Opaque cursor for the next backward fetch.
    #[serde(default)]
    pub next_cursor: Option<String>,
}

impl MessagePage {
    /// Decode a history response body.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` if the body is not a page object
    pub fn decode(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| ProtocolError::decode("message page", &e))
    }

    /// Page with no messages and no further history.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Newest message in the page. `None` if empty.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_camel_case_fields() {
        let body = r#"{
            "messages": [
                {"id":1,"body":"a","timestamp":"2024-01-01T00:00:00Z","user_id":1,"user_email":"a@x","attachments":[]},
                {"id":2,"body":"b","timestamp":"2024-01-01T00:01:00Z","user_id":2,"user_email":"b@x","attachments":[]}
            ],
            "hasMore": true,
            "nextCursor": "1"
        }"#;
        let page = MessagePage::decode(body).unwrap();
        assert_eq!(page.messages.len(), 2);
        assert!(page.has_more);
        assert_eq!(page.next_cursor.as_deref(), Some("1"));
        assert_eq!(page.newest().map(|m| m.id), Some(2));
    }

    #[test]
    fn null_cursor_means_no_more_history() {
        let page = MessagePage::decode(r#"{"messages":[],"hasMore":false,"nextCursor":null}"#)
            .unwrap();
        assert_eq!(page, MessagePage::empty());
    }
}
