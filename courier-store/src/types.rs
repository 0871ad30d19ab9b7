/// Identifier for a stored queue entry
///
/// A globally unique identifier (ULID) that serves as both the tracking ID
/// and the leaf node name for persisted entries. ULIDs are lexicographically
/// sortable by creation time and collision-resistant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    id: ulid::Ulid,
}

impl EntryId {
    /// Parse an entry ID from a node name like `01ARYZ6S41.rec`
    ///
    /// Validates that the name is a valid ULID to prevent path traversal.
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \)
    /// - Directory traversal patterns (..)
    /// - Invalid ULID format
    pub fn from_node_name(name: &str) -> Option<Self> {
        if name.contains('/') || name.contains('\\') {
            return None;
        }

        if name.contains("..") {
            return None;
        }

        let stem = name.strip_suffix(".rec").unwrap_or(name);

        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// Create an entry ID from a ULID
    #[must_use]
    pub const fn new(id: ulid::Ulid) -> Self {
        Self { id }
    }

    /// Generate a new unique entry ID
    #[must_use]
    pub fn generate() -> Self {
        Self {
            id: ulid::Ulid::new(),
        }
    }

    /// Get the underlying ULID
    #[must_use]
    pub const fn ulid(&self) -> ulid::Ulid {
        self.id
    }

    /// Get the timestamp (milliseconds since Unix epoch) encoded in this ULID
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for EntryId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for EntryId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}

/// Durable location an entry lives in.
///
/// `Queue` holds live entries; the remaining folders are outcome-specific
/// archive locations terminal entries are relocated to when the cleanup
/// policy says to keep them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Folder {
    Queue,
    Sent,
    Failed,
    Cancelled,
    Error,
}

impl Folder {
    /// All folders, queue first.
    pub const ALL: [Self; 5] = [
        Self::Queue,
        Self::Sent,
        Self::Failed,
        Self::Cancelled,
        Self::Error,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Sent => "archive/sent",
            Self::Failed => "archive/failed",
            Self::Cancelled => "archive/cancelled",
            Self::Error => "archive/error",
        }
    }
}

impl std::fmt::Display for Folder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
