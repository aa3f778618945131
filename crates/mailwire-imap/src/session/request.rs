//! Pending requests and their results.

use std::collections::{BTreeMap, VecDeque};

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::command::{Authenticator, CommandKind, RequestParts};
use crate::parser::{ESearchData, Namespaces, Quota, QuotaRoot, SearchData, UntaggedResponse, Value};
use crate::types::{CapabilitySet, MailboxState, MailboxTree, ResponseCode, Tag};
use crate::{Error, Result};

use super::fetch::FetchMultiplexer;

/// Identifies an enqueued request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

impl RequestId {
    /// Returns the numeric id.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

/// Result data of a completed command, by command family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandData {
    /// Nothing beyond the completion itself.
    None,
    /// CAPABILITY: the set in force after the command.
    Capability(CapabilitySet),
    /// SEARCH results; empty for a UID SEARCH that matched nothing.
    Search(SearchData),
    /// SORT results.
    Sort(Vec<u64>),
    /// THREAD results, nested lists as sent.
    Thread(Vec<Value>),
    /// SEARCH or SORT answered with ESEARCH.
    ESearch(ESearchData),
    /// LIST/LSUB/XLIST hierarchy.
    List(MailboxTree),
    /// STATUS snapshots.
    Status(Vec<MailboxState>),
    /// SELECT/EXAMINE snapshot.
    Select(MailboxState),
    /// FETCH: number of messages reported; zero for a UID FETCH that
    /// matched nothing.
    Fetch {
        /// Messages signaled complete.
        messages: usize,
    },
    /// NAMESPACE.
    Namespace(Namespaces),
    /// GETQUOTA.
    Quota(Vec<Quota>),
    /// GETQUOTAROOT.
    QuotaRoot {
        /// Roots of the mailbox.
        roots: Vec<QuotaRoot>,
        /// Quotas of those roots.
        quotas: Vec<Quota>,
    },
    /// ID; `None` when the server answered NIL.
    Id(Option<BTreeMap<String, Option<String>>>),
    /// ENABLE: capabilities the server enabled.
    Enabled(Vec<String>),
}

/// A successful tagged completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    /// Tag the command was sent with.
    pub tag: Tag,
    /// Response code of the tagged OK.
    pub code: Option<ResponseCode>,
    /// Text of the tagged OK.
    pub text: String,
    /// Data gathered while the command ran.
    pub data: CommandData,
}

/// Untagged data gathered for the in-flight request.
#[derive(Debug)]
pub enum Accumulator {
    None,
    Capability,
    Search(SearchData),
    Sort(Vec<u64>),
    Thread(Vec<Value>),
    ESearch(ESearchData),
    List(MailboxTree),
    Status(Vec<MailboxState>),
    Select,
    Fetch(FetchMultiplexer),
    Namespace(Namespaces),
    Quota(Vec<Quota>),
    QuotaRoot(Vec<QuotaRoot>, Vec<Quota>),
    Id(Option<BTreeMap<String, Option<String>>>),
    Enabled(Vec<String>),
}

impl Accumulator {
    fn for_parts(parts: &mut RequestParts) -> Self {
        match parts.kind {
            CommandKind::Capability => Self::Capability,
            CommandKind::Search => Self::Search(SearchData::default()),
            CommandKind::Sort => Self::Sort(Vec::new()),
            CommandKind::Thread => Self::Thread(Vec::new()),
            CommandKind::List | CommandKind::Lsub | CommandKind::Xlist => Self::List(MailboxTree::new()),
            CommandKind::Status => Self::Status(Vec::new()),
            CommandKind::Select | CommandKind::Examine => Self::Select,
            CommandKind::Fetch => Self::Fetch(FetchMultiplexer::new(
                std::mem::take(&mut parts.expected),
                parts.observer.take(),
            )),
            CommandKind::Namespace => Self::Namespace(Namespaces::default()),
            CommandKind::GetQuota => Self::Quota(Vec::new()),
            CommandKind::GetQuotaRoot => Self::QuotaRoot(Vec::new(), Vec::new()),
            CommandKind::Id => Self::Id(None),
            CommandKind::Enable => Self::Enabled(Vec::new()),
            _ => Self::None,
        }
    }

    /// Takes an untagged response if it belongs to this request; hands it
    /// back otherwise.
    pub fn accept(&mut self, response: UntaggedResponse) -> std::result::Result<(), UntaggedResponse> {
        match (self, response) {
            (Self::Search(acc), UntaggedResponse::Search(data)) => {
                acc.ids.extend(data.ids);
                if data.modseq.is_some() {
                    acc.modseq = data.modseq;
                }
            }
            (acc @ (Self::Search(_) | Self::Sort(_)), UntaggedResponse::ESearch(data)) => {
                *acc = Self::ESearch(data);
            }
            (Self::Sort(acc), UntaggedResponse::Sort(ids)) => acc.extend(ids),
            (Self::Thread(acc), UntaggedResponse::Thread(threads)) => acc.extend(threads),
            (Self::List(tree), UntaggedResponse::List(entry)) => tree.insert(
                &entry.name,
                entry.delimiter.as_deref(),
                entry.attributes,
                entry.special_use,
            ),
            (Self::Status(acc), UntaggedResponse::Status(status)) => acc.push(status.to_mailbox()),
            (Self::Fetch(mux), UntaggedResponse::Fetch(data)) => mux.on_fetch(data),
            (Self::Namespace(acc), UntaggedResponse::Namespace(ns)) => *acc = ns,
            (Self::Quota(acc) | Self::QuotaRoot(_, acc), UntaggedResponse::Quota(quota)) => acc.push(quota),
            (Self::QuotaRoot(acc, _), UntaggedResponse::QuotaRoot(root)) => acc.push(root),
            (Self::Id(acc), UntaggedResponse::Id(id)) => *acc = id,
            (Self::Enabled(acc), UntaggedResponse::Enabled(caps)) => acc.extend(caps),
            (_, response) => return Err(response),
        }
        Ok(())
    }

    /// Builds the completion data. `capabilities` and `mailbox` are the
    /// engine's view at completion time.
    pub fn into_data(self, capabilities: &CapabilitySet, mailbox: Option<&MailboxState>) -> CommandData {
        match self {
            Self::None => CommandData::None,
            Self::Capability => CommandData::Capability(capabilities.clone()),
            Self::Search(data) => CommandData::Search(data),
            Self::Sort(ids) => CommandData::Sort(ids),
            Self::Thread(threads) => CommandData::Thread(threads),
            Self::ESearch(data) => CommandData::ESearch(data),
            Self::List(tree) => CommandData::List(tree),
            Self::Status(boxes) => CommandData::Status(boxes),
            Self::Select => mailbox.map_or(CommandData::None, |m| CommandData::Select(m.clone())),
            Self::Fetch(mut mux) => CommandData::Fetch {
                messages: mux.finish(),
            },
            Self::Namespace(ns) => CommandData::Namespace(ns),
            Self::Quota(quotas) => CommandData::Quota(quotas),
            Self::QuotaRoot(roots, quotas) => CommandData::QuotaRoot { roots, quotas },
            Self::Id(id) => CommandData::Id(id),
            Self::Enabled(caps) => CommandData::Enabled(caps),
        }
    }
}

/// A request waiting in the queue or in flight.
pub struct PendingRequest {
    pub id: RequestId,
    pub tag: Option<Tag>,
    pub kind: CommandKind,
    pub uid: bool,
    pub text: String,
    /// Command text still to write, one segment per continuation.
    pub segments: VecDeque<Bytes>,
    pub payload: Option<Bytes>,
    pub accumulator: Accumulator,
    /// SELECT/EXAMINE target.
    pub mailbox: Option<String>,
    /// Failure recorded before the tagged completion arrived.
    pub error: Option<Error>,
    /// Answers SASL challenges.
    pub authenticator: Option<Box<dyn Authenticator>>,
    pub completion: Option<oneshot::Sender<Result<Completion>>>,
}

impl std::fmt::Debug for PendingRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingRequest")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("kind", &self.kind)
            .field("text", &self.text)
            .field("segments", &self.segments.len())
            .field("error", &self.error)
            .field("authenticator", &self.authenticator.is_some())
            .finish_non_exhaustive()
    }
}

impl PendingRequest {
    /// Builds a request from its parts.
    pub fn new(
        id: RequestId,
        mut parts: RequestParts,
        completion: Option<oneshot::Sender<Result<Completion>>>,
    ) -> Self {
        let accumulator = Accumulator::for_parts(&mut parts);
        Self {
            id,
            tag: None,
            kind: parts.kind,
            uid: parts.uid,
            text: parts.text,
            segments: parts.segments,
            payload: parts.payload,
            accumulator,
            mailbox: parts.mailbox,
            error: None,
            authenticator: parts.authenticator,
            completion,
        }
    }

    /// Returns true for requests the engine issued on its own.
    pub const fn is_internal(&self) -> bool {
        self.completion.is_none()
    }

    /// Delivers the outcome. A dropped receiver is ignored.
    pub fn resolve(&mut self, outcome: Result<Completion>) {
        match self.completion.take() {
            Some(tx) => {
                let _ = tx.send(outcome);
            }
            None => {
                if let Err(err) = outcome {
                    tracing::debug!(command = %self.text, error = %err, "internal command failed");
                }
            }
        }
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
    use crate::command::CommandRequest;
    use crate::parser::{LiteralQueue, Response, decode_response};

    fn request(text: &str) -> PendingRequest {
        PendingRequest::new(RequestId(1), CommandRequest::new(text).into_parts(), None)
    }

    fn untagged(line: &str) -> UntaggedResponse {
        match decode_response(line, &mut LiteralQueue::new()) {
            Response::Untagged(untagged) => untagged,
            other => panic!("expected untagged, got {other:?}"),
        }
    }

    fn data(req: PendingRequest) -> CommandData {
        req.accumulator.into_data(&CapabilitySet::new(), None)
    }

    #[test]
    fn test_search_accumulates() {
        let mut req = request("UID SEARCH UNSEEN");
        req.accumulator.accept(untagged("* SEARCH 1 2")).unwrap();
        req.accumulator.accept(untagged("* SEARCH 3")).unwrap();
        assert!(req.accumulator.accept(untagged("* 4 EXISTS")).is_err());
        assert_eq!(
            data(req),
            CommandData::Search(SearchData {
                ids: vec![1, 2, 3],
                modseq: None
            })
        );
    }

    #[test]
    fn test_uid_search_without_results_is_empty() {
        let req = request("UID SEARCH UID 999999");
        assert_eq!(data(req), CommandData::Search(SearchData::default()));
    }

    #[test]
    fn test_esearch_replaces_search() {
        let mut req = request("SEARCH RETURN (COUNT) ALL");
        req.accumulator.accept(untagged("* ESEARCH (TAG \"A0001\") COUNT 3")).unwrap();
        match data(req) {
            CommandData::ESearch(esearch) => assert_eq!(esearch.count, Some(3)),
            other => panic!("expected esearch, got {other:?}"),
        }
    }

    #[test]
    fn test_list_builds_tree() {
        let mut req = request("LIST \"\" *");
        req.accumulator.accept(untagged("* LIST (\\HasChildren) \".\" INBOX")).unwrap();
        req.accumulator.accept(untagged("* LIST (\\HasNoChildren) \".\" INBOX.Sent")).unwrap();
        match data(req) {
            CommandData::List(tree) => {
                let sent = tree.get(&["INBOX", "Sent"]).unwrap();
                assert_eq!(sent.name, "INBOX.Sent");
                assert!(sent.attributes.is_empty());
            }
            other => panic!("expected list, got {other:?}"),
        }
    }

    #[test]
    fn test_status_snapshots() {
        let mut req = request("STATUS INBOX (MESSAGES UNSEEN)");
        req.accumulator.accept(untagged("* STATUS INBOX (MESSAGES 12 UNSEEN 2)")).unwrap();
        match data(req) {
            CommandData::Status(boxes) => {
                assert_eq!(boxes[0].total, 12);
                assert_eq!(boxes[0].unseen, Some(2));
            }
            other => panic!("expected status, got {other:?}"),
        }
    }

    #[test]
    fn test_quota_root_collects_both() {
        let mut req = request("GETQUOTAROOT INBOX");
        req.accumulator.accept(untagged("* QUOTAROOT INBOX \"\"")).unwrap();
        req.accumulator.accept(untagged("* QUOTA \"\" (STORAGE 10 512)")).unwrap();
        match data(req) {
            CommandData::QuotaRoot { roots, quotas } => {
                assert_eq!(roots[0].mailbox, "INBOX");
                assert_eq!(quotas[0].resources["storage"].limit, 512);
            }
            other => panic!("expected quota root, got {other:?}"),
        }
    }

    #[test]
    fn test_fetch_counts_messages() {
        let mut req = request("UID FETCH 1:* (FLAGS)");
        req.accumulator.accept(untagged("* 1 FETCH (UID 5 FLAGS ())")).unwrap();
        assert_eq!(data(req), CommandData::Fetch { messages: 1 });

        let req = request("UID FETCH 99999 (FLAGS)");
        assert_eq!(data(req), CommandData::Fetch { messages: 0 });
    }

    #[test]
    fn test_resolve_ignores_dropped_receiver() {
        let (tx, rx) = oneshot::channel();
        let mut req = PendingRequest::new(RequestId(2), CommandRequest::new("NOOP").into_parts(), Some(tx));
        assert!(!req.is_internal());
        drop(rx);
        req.resolve(Err(Error::ConnectionClosed));
        assert!(req.completion.is_none());
    }
}
