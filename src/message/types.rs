/// Event name the envelopes travel under unless configured otherwise
pub const MESSAGE_EVENT: &str = "message";
/// Event a transport delivers when its connection comes up
pub const CONNECT_EVENT: &str = "connect";
/// Event a transport delivers when its connection goes away
pub const DISCONNECT_EVENT: &str = "disconnect";

pub const RESERVED_EVENTS: [&str; 3] = [MESSAGE_EVENT, CONNECT_EVENT, DISCONNECT_EVENT];

/// Correlates an `invoke` request with its reply.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResponseId(String);

impl ResponseId {
    /// 32 lowercase hex characters from a random v4 UUID.
    pub fn new() -> Self {
        ResponseId(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn from_raw(id: impl Into<String>) -> Self {
        ResponseId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl Default for ResponseId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ResponseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Whether `name` is one of the event names the router interprets itself.
pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}
