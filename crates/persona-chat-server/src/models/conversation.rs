use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Model,
}

/// Reference to content already uploaded to the analysis service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileData {
    pub mime_type: String,
    pub file_uri: String,
}

/// One content fragment of a turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    File { file_data: FileData },
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text { text: text.into() }
    }

    pub fn file(mime_type: impl Into<String>, file_uri: impl Into<String>) -> Self {
        Part::File {
            file_data: FileData {
                mime_type: mime_type.into(),
                file_uri: file_uri.into(),
            },
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Part::Text { text } => Some(text),
            Part::File { .. } => None,
        }
    }
}

/// One role-tagged exchange unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl ConversationTurn {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    /// Concatenated text parts, file references skipped
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(Part::as_text)
            .collect::<Vec<_>>()
            .join("")
    }
}

/// Ordered, append-only turn sequence of one session
pub type History = Vec<ConversationTurn>;

/// Greeting used for both seed turns
pub const SEED_GREETING: &str = "👋";

/// The two turns every session starts with: the user hands over the
/// transcript, the model acknowledges.
pub fn seed_history(file: FileData) -> History {
    vec![
        ConversationTurn::user(vec![
            Part::text(SEED_GREETING),
            Part::File { file_data: file },
        ]),
        ConversationTurn::model(vec![Part::text(SEED_GREETING)]),
    ]
}

/// Last text sent by each role
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LatestExchange {
    pub user: String,
    pub model: String,
}

impl LatestExchange {
    pub fn from_history(history: &[ConversationTurn]) -> Self {
        let last_of = |role: Role| {
            history
                .iter()
                .rev()
                .find(|turn| turn.role == role)
                .map(|turn| turn.text().trim().replace('\n', "<br>"))
                .unwrap_or_default()
        };

        Self {
            user: last_of(Role::User),
            model: last_of(Role::Model),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seed_history_shape() {
        let history = seed_history(FileData {
            mime_type: "text/plain".into(),
            file_uri: "https://example.test/files/abc".into(),
        });

        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert!(matches!(history[0].parts[1], Part::File { .. }));
        assert_eq!(history[1].role, Role::Model);
    }

    #[test]
    fn test_part_wire_shape() {
        let json = serde_json::to_value(Part::file("text/plain", "uri://x")).unwrap();
        assert_eq!(json["file_data"]["file_uri"], "uri://x");

        let json = serde_json::to_value(Part::text("hi")).unwrap();
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn test_latest_exchange_picks_last_turns() {
        let history = vec![
            ConversationTurn::user(vec![Part::text("first")]),
            ConversationTurn::model(vec![Part::text("one")]),
            ConversationTurn::user(vec![Part::text("second")]),
            ConversationTurn::model(vec![Part::text("line\nbreak")]),
        ];

        let latest = LatestExchange::from_history(&history);
        assert_eq!(latest.user, "second");
        assert_eq!(latest.model, "line<br>break");
    }
}
