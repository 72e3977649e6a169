use std::fmt;

/// Opaque library namespace defined by the external indexing server.
///
/// Carried verbatim from the indexer's `/library/sections` response through
/// to every `Dispatcher::scan` call; the core never interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SectionId(pub i64);

impl fmt::Display for SectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for SectionId {
    fn from(value: i64) -> Self {
        SectionId(value)
    }
}
