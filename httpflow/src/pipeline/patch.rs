//! Bulk pipeline reconciliation.
//!
//! [`HttpPipeline::new_patched_pipeline`] walks a private copy of the chain
//! and asks a [`PatchPolicies`] callback what to do at every original node.
//! Entries whose name is already taken are reported through
//! [`PatchPolicies::on_conflict`] and skipped; the rest of the batch still
//! applies. Passes repeat while the callback asks for a rerun, up to the
//! pipeline's pass cap.

use super::http_pipeline::HttpPipeline;
use crate::chain::{NodeId, PolicyChain};
use crate::errors::PipelineError;
use crate::events::{event_types, EventSink};
use crate::policy::{Policy, PolicyEntry};
use serde_json::json;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// What to do with the node a patch pass is visiting.
#[derive(Debug, Clone, Default)]
pub enum PatchAction {
    /// Leave the node alone.
    #[default]
    Keep,
    /// Put these entries where the node was and drop the node.
    Replace(Vec<PolicyEntry>),
    /// Drop the node and free its name.
    Remove,
    /// Insert these entries right before the node.
    InsertBefore(Vec<PolicyEntry>),
    /// Insert these entries right after the node.
    InsertAfter(Vec<PolicyEntry>),
}

/// Why a patch entry was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchFailure {
    /// The entry's name is already used by another policy.
    NameConflict,
}

impl PatchFailure {
    /// Returns the failure as a stable string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameConflict => "NAME_CONFLICT",
        }
    }
}

impl fmt::Display for PatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback driving a bulk patch.
///
/// Every method has a no-op default, so an implementation only overrides
/// what it needs.
pub trait PatchPolicies {
    /// Called once per node that existed when the pass started.
    fn on_next(&mut self, name: &str, policy: &Arc<dyn Policy>) -> PatchAction {
        let _ = (name, policy);
        PatchAction::Keep
    }

    /// Called for each entry that could not be applied.
    fn on_conflict(&mut self, failure: PatchFailure, name: &str) {
        let _ = (failure, name);
    }

    /// Entries to put at the front after the walk, in order.
    fn head_entries(&mut self) -> Vec<PolicyEntry> {
        Vec::new()
    }

    /// Entries to put at the back after the walk, in order.
    fn tail_entries(&mut self) -> Vec<PolicyEntry> {
        Vec::new()
    }

    /// Asked after each pass; `true` runs another one.
    fn require_rerun(&mut self) -> bool {
        false
    }
}

struct Patcher<'a, P: ?Sized> {
    chain: PolicyChain,
    seen: HashSet<String>,
    callback: &'a mut P,
    event_sink: &'a Arc<dyn EventSink>,
}

impl<P: PatchPolicies + ?Sized> Patcher<'_, P> {
    fn run_pass(&mut self) {
        let original: Vec<NodeId> = self.chain.ids().collect();

        for id in original {
            let (Some(name), Some(policy)) = (self.chain.name(id), self.chain.policy(id)) else {
                continue;
            };
            let name = name.to_string();

            match self.callback.on_next(&name, &policy) {
                PatchAction::Keep => {}
                PatchAction::InsertBefore(entries) => {
                    let anchor = self.chain.prev(id);
                    self.insert_run(anchor, entries);
                }
                PatchAction::InsertAfter(entries) => {
                    self.insert_run(Some(id), entries);
                }
                PatchAction::Replace(entries) => {
                    let anchor = self.chain.prev(id);
                    self.remove(id, &name);
                    self.insert_run(anchor, entries);
                }
                PatchAction::Remove => self.remove(id, &name),
            }
        }

        let head = self.callback.head_entries();
        self.insert_run(None, head);
        let tail = self.callback.tail_entries();
        let anchor = self.chain.tail();
        self.insert_run(anchor, tail);
    }

    /// Inserts entries in order after `anchor`, or at the front when
    /// `anchor` is `None`.
    fn insert_run(&mut self, mut anchor: Option<NodeId>, entries: Vec<PolicyEntry>) {
        for entry in entries {
            if !self.admit(&entry.name) {
                continue;
            }
            let id = match anchor {
                Some(anchor) => self.chain.insert_after(anchor, entry),
                None => self.chain.push_front(entry),
            };
            anchor = Some(id);
        }
    }

    fn remove(&mut self, id: NodeId, name: &str) {
        self.seen.remove(&name.to_lowercase());
        self.chain.remove(id);
    }

    fn admit(&mut self, name: &str) -> bool {
        if self.seen.insert(name.to_lowercase()) {
            return true;
        }
        warn!(policy = name, "Skipping patch entry with a conflicting name");
        self.event_sink.try_emit(
            event_types::PATCH_CONFLICT,
            Some(json!({
                "policy": name,
                "failure": PatchFailure::NameConflict.as_str(),
            })),
        );
        self.callback.on_conflict(PatchFailure::NameConflict, name);
        false
    }
}

/// One entry-level edit for [`HttpPipeline::patch_entries`].
#[derive(Debug, Clone)]
pub struct PolicyPatch {
    /// Name of the policy to set or remove.
    pub name: String,
    /// The replacement, or `None` to remove.
    pub policy: Option<Arc<dyn Policy>>,
}

impl PolicyPatch {
    /// Replaces the same-named policy in place, or appends if absent.
    pub fn set(name: impl Into<String>, policy: Arc<dyn Policy>) -> Self {
        Self {
            name: name.into(),
            policy: Some(policy),
        }
    }

    /// Removes the same-named policy if present.
    pub fn remove(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            policy: None,
        }
    }
}

struct EntryPatches {
    patches: Vec<(PolicyPatch, bool)>,
}

impl PatchPolicies for EntryPatches {
    fn on_next(&mut self, name: &str, _policy: &Arc<dyn Policy>) -> PatchAction {
        let key = name.to_lowercase();
        let Some((patch, applied)) = self
            .patches
            .iter_mut()
            .find(|(patch, applied)| !*applied && patch.name.to_lowercase() == key)
        else {
            return PatchAction::Keep;
        };

        *applied = true;
        match &patch.policy {
            Some(policy) => {
                PatchAction::Replace(vec![PolicyEntry::new(patch.name.clone(), Arc::clone(policy))])
            }
            None => PatchAction::Remove,
        }
    }

    fn tail_entries(&mut self) -> Vec<PolicyEntry> {
        self.patches
            .iter_mut()
            .filter(|(_, applied)| !*applied)
            .filter_map(|(patch, applied)| {
                *applied = true;
                let policy = patch.policy.as_ref()?;
                Some(PolicyEntry::new(patch.name.clone(), Arc::clone(policy)))
            })
            .collect()
    }
}

impl HttpPipeline {
    /// Builds a new pipeline by applying `patcher` to a copy of this one.
    ///
    /// The new pipeline shares this one's transport, event sink and pass
    /// cap. This pipeline is left untouched.
    ///
    /// # Errors
    ///
    /// Returns `PatchDiverged` if the callback still asks for a rerun after
    /// the pass cap.
    pub fn new_patched_pipeline<P>(&self, patcher: &mut P) -> Result<Self, PipelineError>
    where
        P: PatchPolicies + ?Sized,
    {
        let chain = (*self.chain).clone();
        let mut state = Patcher {
            seen: chain.name_keys(),
            chain,
            callback: patcher,
            event_sink: &self.event_sink,
        };

        let mut passes = 0;
        loop {
            state.run_pass();
            passes += 1;
            debug!(pass = passes, policies = ?state.chain, "Patch pass finished");

            if !state.callback.require_rerun() {
                break;
            }
            if passes >= self.max_patch_passes {
                warn!(passes, "Patch did not converge");
                return Err(PipelineError::PatchDiverged { passes });
            }
        }

        Ok(Self::from_chain(
            state.chain,
            Arc::clone(&self.transport),
            Arc::clone(&self.event_sink),
            self.max_patch_passes,
        ))
    }

    /// Builds a new pipeline from entry-level edits.
    ///
    /// A patch with a policy replaces the same-named policy in place, or is
    /// appended at the tail when no policy has that name. A patch without a
    /// policy removes the same-named policy.
    ///
    /// # Errors
    ///
    /// Never diverges; errors only as [`HttpPipeline::new_patched_pipeline`].
    pub fn patch_entries(&self, patches: Vec<PolicyPatch>) -> Result<Self, PipelineError> {
        let mut patcher = EntryPatches {
            patches: patches.into_iter().map(|p| (p, false)).collect(),
        };
        self.new_patched_pipeline(&mut patcher)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{test_pipeline, test_request, CallLog, MockTransport, RecordingPolicy};
    use pretty_assertions::assert_eq;

    fn entry(name: &str, log: &CallLog) -> PolicyEntry {
        PolicyEntry::new(name, RecordingPolicy::shared(name, log))
    }

    fn base(log: &CallLog) -> HttpPipeline {
        test_pipeline(&["a", "b", "c"], log, Arc::new(MockTransport::ok().with_log(log, "t")))
    }

    /// Applies one action to the node with a given name.
    struct At {
        target: &'static str,
        action: Option<PatchAction>,
        conflicts: Vec<String>,
    }

    impl At {
        fn new(target: &'static str, action: PatchAction) -> Self {
            Self {
                target,
                action: Some(action),
                conflicts: Vec::new(),
            }
        }
    }

    impl PatchPolicies for At {
        fn on_next(&mut self, name: &str, _policy: &Arc<dyn Policy>) -> PatchAction {
            if name == self.target {
                self.action.take().unwrap_or_default()
            } else {
                PatchAction::Keep
            }
        }

        fn on_conflict(&mut self, failure: PatchFailure, name: &str) {
            assert_eq!(failure, PatchFailure::NameConflict);
            self.conflicts.push(name.to_string());
        }
    }

    #[tokio::test]
    async fn test_keep_everything_is_identity() {
        struct KeepAll;
        impl PatchPolicies for KeepAll {}

        let log = CallLog::new();
        let original = base(&log);
        let patched = original.new_patched_pipeline(&mut KeepAll).unwrap();

        assert_eq!(patched.policy_names(), original.policy_names());
        patched.send(test_request()).await.unwrap();
        assert_eq!(log.entries(), vec!["a", "b", "c", "t"]);
    }

    #[test]
    fn test_insert_after_and_before() {
        let log = CallLog::new();
        let pipeline = base(&log);

        let mut after = At::new("b", PatchAction::InsertAfter(vec![entry("x", &log), entry("y", &log)]));
        let patched = pipeline.new_patched_pipeline(&mut after).unwrap();
        assert_eq!(patched.policy_names(), vec!["a", "b", "x", "y", "c"]);

        let mut before = At::new("a", PatchAction::InsertBefore(vec![entry("x", &log), entry("y", &log)]));
        let patched = pipeline.new_patched_pipeline(&mut before).unwrap();
        assert_eq!(patched.policy_names(), vec!["x", "y", "a", "b", "c"]);

        assert_eq!(pipeline.policy_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_replace_head_and_same_name() {
        let log = CallLog::new();
        let pipeline = base(&log);

        let mut replace = At::new("a", PatchAction::Replace(vec![entry("z", &log), entry("A", &log)]));
        let patched = pipeline.new_patched_pipeline(&mut replace).unwrap();

        assert_eq!(patched.policy_names(), vec!["z", "A", "b", "c"]);
        assert!(replace.conflicts.is_empty());
    }

    #[test]
    fn test_conflicting_entries_are_skipped() {
        let log = CallLog::new();
        let pipeline = base(&log);

        let mut insert = At::new(
            "a",
            PatchAction::InsertAfter(vec![entry("x", &log), entry("C", &log), entry("y", &log)]),
        );
        let patched = pipeline.new_patched_pipeline(&mut insert).unwrap();

        assert_eq!(patched.policy_names(), vec!["a", "x", "y", "b", "c"]);
        assert_eq!(insert.conflicts, vec!["C"]);
    }

    #[test]
    fn test_remove_frees_name() {
        struct RemoveThenReAdd;
        impl PatchPolicies for RemoveThenReAdd {
            fn on_next(&mut self, name: &str, _policy: &Arc<dyn Policy>) -> PatchAction {
                if name == "b" {
                    PatchAction::Remove
                } else {
                    PatchAction::Keep
                }
            }

            fn tail_entries(&mut self) -> Vec<PolicyEntry> {
                vec![entry("b", &CallLog::new())]
            }
        }

        let pipeline = base(&CallLog::new());
        let patched = pipeline.new_patched_pipeline(&mut RemoveThenReAdd).unwrap();
        assert_eq!(patched.policy_names(), vec!["a", "c", "b"]);
    }

    #[test]
    fn test_head_and_tail_entries() {
        struct Edges {
            conflicts: usize,
        }
        impl PatchPolicies for Edges {
            fn on_conflict(&mut self, _failure: PatchFailure, _name: &str) {
                self.conflicts += 1;
            }
            fn head_entries(&mut self) -> Vec<PolicyEntry> {
                let log = CallLog::new();
                vec![entry("h1", &log), entry("h2", &log), entry("a", &log)]
            }
            fn tail_entries(&mut self) -> Vec<PolicyEntry> {
                vec![entry("t1", &CallLog::new())]
            }
        }

        let mut edges = Edges { conflicts: 0 };
        let patched = base(&CallLog::new()).new_patched_pipeline(&mut edges).unwrap();

        assert_eq!(patched.policy_names(), vec!["h1", "h2", "a", "b", "c", "t1"]);
        assert_eq!(edges.conflicts, 1);
    }

    #[test]
    fn test_nodes_inserted_mid_pass_are_not_visited() {
        struct Counter {
            visited: Vec<String>,
        }
        impl PatchPolicies for Counter {
            fn on_next(&mut self, name: &str, _policy: &Arc<dyn Policy>) -> PatchAction {
                self.visited.push(name.to_string());
                if name == "a" {
                    PatchAction::InsertAfter(vec![entry("new", &CallLog::new())])
                } else {
                    PatchAction::Keep
                }
            }
        }

        let mut counter = Counter { visited: Vec::new() };
        let patched = base(&CallLog::new()).new_patched_pipeline(&mut counter).unwrap();

        assert_eq!(counter.visited, vec!["a", "b", "c"]);
        assert_eq!(patched.policy_names(), vec!["a", "new", "b", "c"]);
    }

    #[test]
    fn test_rerun_converges() {
        /// Moves "c" to the front, then asks for one more pass.
        struct Bubble {
            moved: bool,
            names: Vec<String>,
        }
        impl PatchPolicies for Bubble {
            fn on_next(&mut self, name: &str, policy: &Arc<dyn Policy>) -> PatchAction {
                self.names.push(name.to_string());
                if name == "c" && self.names.len() > 1 && !self.moved {
                    self.moved = true;
                    return PatchAction::Remove;
                }
                let _ = policy;
                PatchAction::Keep
            }
            fn head_entries(&mut self) -> Vec<PolicyEntry> {
                if self.moved {
                    vec![entry("c", &CallLog::new())]
                } else {
                    Vec::new()
                }
            }
            fn require_rerun(&mut self) -> bool {
                let rerun = self.moved;
                self.moved = false;
                self.names.clear();
                rerun
            }
        }

        let mut bubble = Bubble { moved: false, names: Vec::new() };
        let patched = base(&CallLog::new()).new_patched_pipeline(&mut bubble).unwrap();
        assert_eq!(patched.policy_names(), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_rerun_forever_diverges() {
        struct Forever;
        impl PatchPolicies for Forever {
            fn require_rerun(&mut self) -> bool {
                true
            }
        }

        let pipeline = base(&CallLog::new()).with_max_patch_passes(3);
        let err = pipeline.new_patched_pipeline(&mut Forever).unwrap_err();
        assert!(matches!(err, PipelineError::PatchDiverged { passes: 3 }));
    }

    #[tokio::test]
    async fn test_patch_entries() {
        let log = CallLog::new();
        let pipeline = base(&log);

        let patched = pipeline
            .patch_entries(vec![
                PolicyPatch::set("B", RecordingPolicy::shared("B2", &log)),
                PolicyPatch::remove("c"),
                PolicyPatch::set("d", RecordingPolicy::shared("d", &log)),
                PolicyPatch::remove("missing"),
            ])
            .unwrap();

        assert_eq!(patched.policy_names(), vec!["a", "B", "d"]);
        patched.send(test_request()).await.unwrap();
        assert_eq!(log.entries(), vec!["a", "B2", "d", "t"]);
    }
}
