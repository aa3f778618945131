//! Mailbox state and hierarchy types.

use std::collections::BTreeMap;

/// Snapshot of the currently selected mailbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxState {
    /// Mailbox name as sent in SELECT/EXAMINE, or as reported by STATUS.
    pub name: String,
    /// Whether the mailbox was opened read-only.
    pub read_only: bool,
    /// Flags defined for this mailbox, as sent.
    pub flags: Vec<String>,
    /// System flags that can be stored permanently, backslash stripped.
    pub permanent_flags: Vec<String>,
    /// Keywords that can be stored permanently.
    pub keywords: Vec<String>,
    /// Whether new keywords may be created (`\*`).
    pub allows_new_keywords: bool,
    /// UIDVALIDITY value.
    pub uid_validity: Option<u64>,
    /// Next UID to be assigned.
    pub uid_next: Option<u64>,
    /// Highest mod-sequence (CONDSTORE).
    pub highest_modseq: Option<String>,
    /// Whether UIDs persist across sessions.
    pub persistent_uids: bool,
    /// Whether the server keeps mod-sequences for this mailbox.
    pub no_modseq: bool,
    /// Number of messages.
    pub total: u32,
    /// Number of new messages since the last observation.
    pub new: u32,
    /// Number of unseen messages (STATUS) or first unseen sequence (SELECT).
    pub unseen: Option<u32>,
}

impl MailboxState {
    /// Creates an empty state for `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            read_only: false,
            flags: Vec::new(),
            permanent_flags: Vec::new(),
            keywords: Vec::new(),
            allows_new_keywords: false,
            uid_validity: None,
            uid_next: None,
            highest_modseq: None,
            persistent_uids: true,
            no_modseq: false,
            total: 0,
            new: 0,
            unseen: None,
        }
    }

    /// Applies a PERMANENTFLAGS list.
    ///
    /// `\*` enables keyword creation, non-backslash tokens become keywords,
    /// and the remaining system flags are stored without their backslash.
    pub fn apply_permanent_flags(&mut self, raw: &[String]) {
        self.allows_new_keywords = false;
        self.keywords.clear();
        self.permanent_flags.clear();
        for flag in raw {
            if flag == "\\*" {
                self.allows_new_keywords = true;
            } else if let Some(system) = flag.strip_prefix('\\') {
                self.permanent_flags.push(system.to_string());
            } else {
                self.keywords.push(flag.clone());
            }
        }
    }

    /// Records an EXISTS count, returning how many messages were added.
    ///
    /// A growing count also becomes the new-message count.
    pub fn apply_exists(&mut self, count: u32) -> Option<u32> {
        let previous = self.total;
        self.total = count;
        let added = count.checked_sub(previous).filter(|&n| n > 0)?;
        self.new = added;
        Some(added)
    }

    /// Records one EXPUNGE.
    pub fn apply_expunge(&mut self) {
        self.total = self.total.saturating_sub(1);
    }
}

/// Standard mailbox roles (RFC 6154, RFC 8457).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialUse {
    /// All messages (virtual mailbox).
    All,
    /// Mailbox is the archive folder.
    Archive,
    /// Mailbox is the drafts folder.
    Drafts,
    /// Flagged/starred messages (virtual mailbox).
    Flagged,
    /// Important messages.
    Important,
    /// Mailbox is the junk/spam folder.
    Junk,
    /// Mailbox is the sent folder.
    Sent,
    /// Mailbox is the trash folder.
    Trash,
}

impl SpecialUse {
    /// Parses a LIST attribute, with or without its backslash.
    #[must_use]
    pub fn parse(attribute: &str) -> Option<Self> {
        let name = attribute.strip_prefix('\\').unwrap_or(attribute);
        match name.to_ascii_uppercase().as_str() {
            "ALL" => Some(Self::All),
            "ARCHIVE" => Some(Self::Archive),
            "DRAFTS" => Some(Self::Drafts),
            "FLAGGED" => Some(Self::Flagged),
            "IMPORTANT" => Some(Self::Important),
            "JUNK" | "SPAM" => Some(Self::Junk),
            "SENT" => Some(Self::Sent),
            "TRASH" => Some(Self::Trash),
            _ => None,
        }
    }
}

/// One node of the mailbox hierarchy built from LIST/LSUB/XLIST.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxNode {
    /// Full server-side name; empty for placeholders never listed themselves.
    pub name: String,
    /// Attributes, backslash stripped and uppercased, `HASNOCHILDREN` dropped.
    pub attributes: Vec<String>,
    /// Hierarchy delimiter.
    pub delimiter: Option<String>,
    /// Special-use role, if any attribute names one.
    pub special_use: Option<SpecialUse>,
    /// Child mailboxes keyed by their last path segment.
    pub children: BTreeMap<String, MailboxNode>,
}

impl MailboxNode {
    /// Returns true if the node has the given attribute (case-insensitive,
    /// backslash optional).
    #[must_use]
    pub fn has_attribute(&self, attribute: &str) -> bool {
        let wanted = attribute.strip_prefix('\\').unwrap_or(attribute);
        self.attributes.iter().any(|a| a.eq_ignore_ascii_case(wanted))
    }
}

/// Mailbox hierarchy keyed by top-level name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailboxTree {
    /// Top-level mailboxes.
    pub roots: BTreeMap<String, MailboxNode>,
}

impl MailboxTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a listed mailbox, creating placeholder parents as needed.
    ///
    /// Children already attached to the node are kept.
    pub fn insert(
        &mut self,
        name: &str,
        delimiter: Option<&str>,
        attributes: Vec<String>,
        special_use: Option<SpecialUse>,
    ) {
        let segments: Vec<&str> = match delimiter {
            Some(d) if !d.is_empty() => name.split(d).collect(),
            _ => vec![name],
        };

        let Some((leaf, parents)) = segments.split_last() else {
            return;
        };
        let mut level = &mut self.roots;
        for segment in parents {
            let node = level.entry((*segment).to_string()).or_default();
            if node.delimiter.is_none() {
                node.delimiter = delimiter.map(str::to_string);
            }
            level = &mut node.children;
        }

        let node = level.entry((*leaf).to_string()).or_default();
        node.name = name.to_string();
        node.attributes = attributes;
        node.delimiter = delimiter.map(str::to_string);
        node.special_use = special_use;
    }

    /// Looks up a node by path segments.
    #[must_use]
    pub fn get(&self, path: &[&str]) -> Option<&MailboxNode> {
        let (first, rest) = path.split_first()?;
        let mut node = self.roots.get(*first)?;
        for segment in rest {
            node = node.children.get(*segment)?;
        }
        Some(node)
    }

    /// Returns the number of top-level mailboxes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.roots.len()
    }

    /// Returns true if nothing was listed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_permanent_flags_split() {
        let mut state = MailboxState::new("INBOX");
        let raw: Vec<String> = ["\\Seen", "\\Deleted", "$Forwarded", "\\*"]
            .iter()
            .map(ToString::to_string)
            .collect();
        state.apply_permanent_flags(&raw);
        assert_eq!(state.permanent_flags, ["Seen", "Deleted"]);
        assert_eq!(state.keywords, ["$Forwarded"]);
        assert!(state.allows_new_keywords);
    }

    #[test]
    fn test_exists_and_expunge() {
        let mut state = MailboxState::new("INBOX");
        assert_eq!(state.apply_exists(3), Some(3));
        assert_eq!(state.new, 3);
        assert_eq!(state.apply_exists(3), None);
        assert_eq!(state.new, 3);
        assert_eq!(state.apply_exists(5), Some(2));
        assert_eq!(state.new, 2);
        state.apply_expunge();
        assert_eq!(state.total, 4);

        let mut empty = MailboxState::new("INBOX");
        empty.apply_expunge();
        assert_eq!(empty.total, 0);
    }

    #[test]
    fn test_special_use_parse() {
        assert_eq!(SpecialUse::parse("\\Sent"), Some(SpecialUse::Sent));
        assert_eq!(SpecialUse::parse("SPAM"), Some(SpecialUse::Junk));
        assert_eq!(SpecialUse::parse("\\HasChildren"), None);
    }

    #[test]
    fn test_tree_nesting() {
        let mut tree = MailboxTree::new();
        tree.insert("Work/Projects/Rust", Some("/"), vec!["MARKED".to_string()], None);
        tree.insert("Work", Some("/"), vec!["HASCHILDREN".to_string()], None);
        tree.insert("INBOX", Some("/"), Vec::new(), None);

        assert_eq!(tree.len(), 2);
        let work = tree.get(&["Work"]).unwrap();
        assert!(work.has_attribute("\\HasChildren"));
        assert_eq!(work.name, "Work");

        let projects = tree.get(&["Work", "Projects"]).unwrap();
        assert_eq!(projects.name, "");
        let rust = tree.get(&["Work", "Projects", "Rust"]).unwrap();
        assert_eq!(rust.name, "Work/Projects/Rust");
        assert!(rust.has_attribute("marked"));
    }

    #[test]
    fn test_tree_without_delimiter() {
        let mut tree = MailboxTree::new();
        tree.insert("a.b", None, Vec::new(), Some(SpecialUse::Trash));
        assert_eq!(tree.get(&["a.b"]).unwrap().special_use, Some(SpecialUse::Trash));
    }
}
