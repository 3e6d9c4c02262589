use std::fmt;

/// Channel namespace for room membership. Every room a socket can join maps
/// to one of these, rendered as `user:<id>`, `classroom:<id>` or
/// `document:<id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChannelName {
    User(String),
    Classroom(String),
    Document(String),
}

impl ChannelName {
    pub fn user(id: impl Into<String>) -> Self {
        ChannelName::User(id.into())
    }

    pub fn classroom(id: impl Into<String>) -> Self {
        ChannelName::Classroom(id.into())
    }

    pub fn document(id: impl Into<String>) -> Self {
        ChannelName::Document(id.into())
    }

    /// Parses a client-supplied room id. Unprefixed ids are classroom rooms.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        match trimmed.split_once(':') {
            Some(("user", id)) if !id.is_empty() => Some(ChannelName::User(id.to_string())),
            Some(("classroom", id)) if !id.is_empty() => {
                Some(ChannelName::Classroom(id.to_string()))
            }
            Some(("document", id)) if !id.is_empty() => Some(ChannelName::Document(id.to_string())),
            Some(_) => None,
            None => Some(ChannelName::Classroom(trimmed.to_string())),
        }
    }

    /// Personal channels may only be joined by their owner.
    pub fn is_foreign_personal(&self, user_id: &str) -> bool {
        matches!(self, ChannelName::User(owner) if owner != user_id)
    }

    /// True for the given user's own personal channel.
    pub fn is_personal_for(&self, user_id: &str) -> bool {
        matches!(self, ChannelName::User(owner) if owner == user_id)
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ChannelName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelName::User(id) => write!(f, "user:{id}"),
            ChannelName::Classroom(id) => write!(f, "classroom:{id}"),
            ChannelName::Document(id) => write!(f, "document:{id}"),
        }
    }
}
