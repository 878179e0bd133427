use std::fmt;

/// Tables the bridge may read and write. Anything else is rejected before
/// any upstream call is made.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TableId {
    VideoPosts,
    Subscribers,
}

impl TableId {
    pub const ALL: [TableId; 2] = [TableId::VideoPosts, TableId::Subscribers];

    /// Looks up an allow-listed table by its exact upstream name.
    pub fn from_name(name: &str) -> Option<TableId> {
        TableId::ALL.into_iter().find(|table| table.name() == name)
    }

    pub const fn name(&self) -> &'static str {
        match self {
            TableId::VideoPosts => "Video posts",
            TableId::Subscribers => "Subscribers",
        }
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist() {
        assert_eq!(TableId::from_name("Video posts"), Some(TableId::VideoPosts));
        assert_eq!(TableId::from_name("Subscribers"), Some(TableId::Subscribers));
        assert_eq!(TableId::from_name("video posts"), None);
        assert_eq!(TableId::from_name("Invoices"), None);
        assert_eq!(TableId::from_name(""), None);
    }
}
