use serde::{Deserialize, Serialize};

/// Application-level identity a client claims when it registers.
///
/// `id` is chosen by the client and is the only key the relay routes on.
/// It never changes for the lifetime of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity {
    pub id: String,
    pub name: String,
}

impl ClientIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}
