//! Request actions and the lane each one is routed to.

/// Lane a request is processed on.
///
/// `Chat` and `Search` are sequential, `Generation` runs up to the
/// endpoint pool size concurrently, and `Inline` requests are answered
/// on the connection's receive path without touching any queue.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Lane {
    Chat,
    Search,
    Generation,
    Inline,
}

impl Lane {
    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Chat => "chat",
            Lane::Search => "search",
            Lane::Generation => "generation",
            Lane::Inline => "inline",
        }
    }
}

/// A recognised client action.
///
/// Anything a client sends that does not parse into one of these is
/// carried as `RequestBody::Unknown` and answered inline with an
/// "Unknown action" error.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Action {
    Heartbeat,
    GenerateCaption,
    GenerateThumbnail,
    Search,
    GenerateVideo,
    JoinChat,
    ChatMessage,
    LeaveChat,
}

impl Action {
    pub const ALL: [Action; 8] = [
        Action::Heartbeat,
        Action::GenerateCaption,
        Action::GenerateThumbnail,
        Action::Search,
        Action::GenerateVideo,
        Action::JoinChat,
        Action::ChatMessage,
        Action::LeaveChat,
    ];

    /// Wire name, as sent in the `action` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Heartbeat => "heartbeat",
            Action::GenerateCaption => "generate_caption",
            Action::GenerateThumbnail => "generate_thumbnail",
            Action::Search => "search",
            Action::GenerateVideo => "generate_video",
            Action::JoinChat => "join_chat",
            Action::ChatMessage => "chat_message",
            Action::LeaveChat => "leave_chat",
        }
    }

    /// Parse a wire name (case-sensitive).
    pub fn parse(name: &str) -> Option<Self> {
        Action::ALL.into_iter().find(|a| a.as_str() == name)
    }

    /// Lane classification. Stateless; every action maps to exactly one lane.
    pub fn lane(self) -> Lane {
        match self {
            Action::JoinChat | Action::ChatMessage | Action::LeaveChat => Lane::Chat,
            Action::Search => Lane::Search,
            Action::GenerateVideo => Lane::Generation,
            Action::Heartbeat | Action::GenerateCaption | Action::GenerateThumbnail => Lane::Inline,
        }
    }

    /// Prefix used when a collaborator failure is reported to the client.
    pub fn failure_label(self) -> &'static str {
        match self {
            Action::Heartbeat => "Heartbeat error",
            Action::GenerateCaption => "Caption error",
            Action::GenerateThumbnail => "Thumbnail error",
            Action::Search => "Search error",
            Action::GenerateVideo => "Video generation error",
            Action::JoinChat | Action::ChatMessage | Action::LeaveChat => "Chat error",
        }
    }
}
