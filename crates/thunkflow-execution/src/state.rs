// Copyright 2025 DataStax Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not use this file except
// in compliance with the License. You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software distributed under the License
// is distributed on an "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express
// or implied. See the License for the specific language governing permissions and limitations under
// the License.

//! The scheduler's state store.
//!
//! [`SchedState`] holds every bookkeeping collection of a run: the interned
//! thunks, the waiting/waiting-data back-reference maps, the dependents edge
//! set, the ready queue, the running/finished/errored sets, the result cache,
//! the registered futures, and the halt latch.
//!
//! Every thunk is in exactly one of ready, running, finished, errored, or
//! waiting. `waiting` and `waiting_data` mirror each other: `t` is in
//! `waiting[c]` iff `c` is in `waiting_data[t]`. `dependents` is the full
//! downstream edge set and outlives completion of the producer, which is what
//! failure propagation and DAG snapshots walk.
//!
//! The store is exclusively owned by the scheduler loop; every mutation
//! (completions, dispatch, control commands) happens on the loop task.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use thunkflow_core::api::{ControlError, DagIds};
use thunkflow_core::chunk::Chunk;
use thunkflow_core::descriptor::ProcessorId;
use thunkflow_core::func::ThunkArg;
use thunkflow_core::future::{ThunkFuture, ThunkSlot, thunk_future};
use thunkflow_core::result::{CacheEntry, ThunkError, ThunkFailed};
use thunkflow_core::thunk::{Thunk, ThunkId, ThunkInput};
use thunkflow_core::values::ValueRef;

pub(crate) struct SchedState {
    thunk_dict: HashMap<ThunkId, Arc<Thunk>>,
    /// Unresolved input thunks per consumer.
    waiting: HashMap<ThunkId, HashSet<ThunkId>>,
    /// Inverse of `waiting`: consumers awaiting each producer.
    waiting_data: HashMap<ThunkId, HashSet<ThunkId>>,
    /// Full downstream edge set; persists after the producer finishes.
    dependents: HashMap<ThunkId, HashSet<ThunkId>>,
    /// All inputs resolved, not yet dispatched. Drained FIFO.
    ready: VecDeque<ThunkId>,
    running: HashSet<ThunkId>,
    finished: HashSet<ThunkId>,
    errored: HashSet<ThunkId>,
    cache: HashMap<ThunkId, CacheEntry>,
    /// Pending external awaiters, fanned out and removed at completion.
    futures: HashMap<ThunkId, Vec<ThunkSlot>>,
    /// Monotonic: once set, never reset for this run.
    halt: bool,
}

impl SchedState {
    pub fn new() -> Self {
        Self {
            thunk_dict: HashMap::new(),
            waiting: HashMap::new(),
            waiting_data: HashMap::new(),
            dependents: HashMap::new(),
            ready: VecDeque::new(),
            running: HashSet::new(),
            finished: HashSet::new(),
            errored: HashSet::new(),
            cache: HashMap::new(),
            futures: HashMap::new(),
            halt: false,
        }
    }

    pub fn thunk(&self, id: ThunkId) -> Option<&Arc<Thunk>> {
        self.thunk_dict.get(&id)
    }

    /// Intern a thunk and its transitive inputs, inserting reverse edges in
    /// `dependents`.
    pub fn intern(&mut self, thunk: &Arc<Thunk>) {
        if self.thunk_dict.contains_key(&thunk.id()) {
            return;
        }
        self.thunk_dict.insert(thunk.id(), thunk.clone());
        for input in thunk.inputs() {
            if let ThunkInput::Thunk(producer) = input {
                self.intern(producer);
                self.dependents
                    .entry(producer.id())
                    .or_default()
                    .insert(thunk.id());
            }
        }
    }

    fn is_ready(&self, id: ThunkId) -> bool {
        self.ready.contains(&id)
    }

    /// Whether the thunk is already tracked in one of the lifecycle states.
    fn placed(&self, id: ThunkId) -> bool {
        self.running.contains(&id)
            || self.finished.contains(&id)
            || self.errored.contains(&id)
            || self.is_ready(id)
            || self.waiting.contains_key(&id)
    }

    /// Resolve a consumer's inputs, recursively scheduling unfinished
    /// producers.
    ///
    /// Returns whether any work became newly schedulable. If an input is
    /// already errored, the consumer is failed with that input's origin and
    /// the traversal of this consumer stops.
    pub fn reschedule_inputs(&mut self, id: ThunkId) -> bool {
        if self.placed(id) {
            return false;
        }
        let Some(thunk) = self.thunk_dict.get(&id).cloned() else {
            log::warn!("reschedule_inputs called for uninterned thunk {id}");
            return false;
        };

        let mut newly = false;
        let mut waits: HashSet<ThunkId> = HashSet::new();
        let mut failed_input: Option<ThunkFailed> = None;

        for input in thunk.input_ids() {
            self.dependents.entry(input).or_default().insert(id);

            if !self.errored.contains(&input) && !self.cache.contains_key(&input) {
                if !self.placed(input) {
                    newly |= self.reschedule_inputs(input);
                }
            }

            if self.errored.contains(&input) {
                failed_input = Some(self.failure_of(input));
                break;
            }
            if self.cache.contains_key(&input) {
                continue;
            }
            waits.insert(input);
            self.waiting_data.entry(input).or_default().insert(id);
        }

        if let Some(origin) = failed_input {
            // First-error policy: unlink the edges recorded so far and fail
            // the consumer with the single origin.
            self.unlink_waits(id, &waits);
            self.fail_thunk(id, &origin);
            return newly;
        }

        if waits.is_empty() {
            self.ready.push_back(id);
            newly = true;
        } else {
            self.waiting.insert(id, waits);
        }
        newly
    }

    /// The failure record of an errored thunk.
    fn failure_of(&self, id: ThunkId) -> ThunkFailed {
        self.cache
            .get(&id)
            .and_then(CacheEntry::failure)
            .cloned()
            .unwrap_or_else(|| {
                ThunkFailed::new(id, id, ThunkError::message("errored without cache entry"))
            })
    }

    fn unlink_waits(&mut self, consumer: ThunkId, waits: &HashSet<ThunkId>) {
        for producer in waits {
            if let Some(consumers) = self.waiting_data.get_mut(producer) {
                consumers.remove(&consumer);
                if consumers.is_empty() {
                    self.waiting_data.remove(producer);
                }
            }
        }
    }

    /// Pop the next ready thunk and mark it running.
    pub fn pop_ready(&mut self) -> Option<ThunkId> {
        let id = self.ready.pop_front()?;
        self.running.insert(id);
        Some(id)
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    pub fn is_quiescent(&self) -> bool {
        self.running.is_empty() && self.ready.is_empty()
    }

    /// Admit a worker completion.
    ///
    /// A completion for a thunk that is not running is rejected without
    /// state change; this makes duplicate and post-halt completions
    /// harmless. Returns the consumers that became newly ready.
    pub fn admit_completion(
        &mut self,
        id: ThunkId,
        result: Result<ValueRef, ThunkError>,
        processor: ProcessorId,
    ) -> Vec<ThunkId> {
        if !self.running.remove(&id) {
            log::warn!("ignoring completion for thunk {id} that is not running");
            return Vec::new();
        }
        match result {
            Ok(value) => self.finish_thunk(id, value, processor),
            Err(error) => {
                self.fail_thunk(id, &ThunkFailed::new(id, id, error));
                Vec::new()
            }
        }
    }

    fn finish_thunk(
        &mut self,
        id: ThunkId,
        value: ValueRef,
        processor: ProcessorId,
    ) -> Vec<ThunkId> {
        self.finished.insert(id);

        let get_result = self
            .thunk_dict
            .get(&id)
            .is_some_and(|t| t.options().get_result);
        let entry = if get_result {
            CacheEntry::Inline(value.clone())
        } else {
            CacheEntry::Chunk(Chunk::new(processor, value.clone()))
        };
        self.cache.insert(id, entry);

        if let Some(slots) = self.futures.remove(&id) {
            for slot in slots {
                slot.deliver(Ok(value.clone()));
            }
        }

        // Promote consumers whose waiting set drains empty.
        let mut newly_ready = Vec::new();
        if let Some(consumers) = self.waiting_data.remove(&id) {
            for consumer in consumers {
                let Some(waits) = self.waiting.get_mut(&consumer) else {
                    continue;
                };
                waits.remove(&id);
                if waits.is_empty() {
                    self.waiting.remove(&consumer);
                    if !self.errored.contains(&consumer) {
                        self.ready.push_back(consumer);
                        newly_ready.push(consumer);
                    }
                }
            }
        }
        newly_ready
    }

    /// Mark a thunk errored and propagate transitively along `dependents`.
    ///
    /// The failure is stored in the cache with `origin`'s origin, pending
    /// futures are fulfilled with the error, and the thunk is removed from
    /// `ready` if present. Already-errored thunks are skipped.
    pub fn fail_thunk(&mut self, id: ThunkId, origin: &ThunkFailed) {
        if self.errored.contains(&id) || self.finished.contains(&id) {
            return;
        }
        self.running.remove(&id);
        if let Some(position) = self.ready.iter().position(|ready| *ready == id) {
            self.ready.remove(position);
        }
        if let Some(waits) = self.waiting.remove(&id) {
            self.unlink_waits(id, &waits);
        }

        self.errored.insert(id);
        let failed = origin.propagate_to(id);
        if let Some(slots) = self.futures.remove(&id) {
            for slot in slots {
                slot.deliver(Err(failed.clone()));
            }
        }
        self.cache.insert(id, CacheEntry::Failed(failed));
        self.waiting_data.remove(&id);

        let downstream: Vec<ThunkId> = self
            .dependents
            .get(&id)
            .map(|deps| deps.iter().copied().collect())
            .unwrap_or_default();
        for dependent in downstream {
            self.fail_thunk(dependent, origin);
        }
    }

    /// Register a one-shot future for `target`.
    ///
    /// Completed targets are fulfilled immediately from the cache. Fails
    /// with a dominator-guard error when the target transitively depends on
    /// the requester: the requester's completion is upstream of the target,
    /// so waiting would deadlock.
    pub fn register_future(
        &mut self,
        requester: Option<ThunkId>,
        target: ThunkId,
    ) -> Result<ThunkFuture, ControlError> {
        if !self.thunk_dict.contains_key(&target) {
            return Err(ControlError::UnknownThunk(target));
        }
        if let Some(requester) = requester
            && self.depends_on(target, requester)
        {
            return Err(ControlError::DominatorViolation { requester, target });
        }

        let (slot, future) = thunk_future(target);
        if let Some(entry) = self.cache.get(&target) {
            let payload = match entry {
                CacheEntry::Failed(failed) => Err(failed.clone()),
                resolved => Ok(resolved.value().cloned().unwrap_or_default()),
            };
            slot.deliver(payload);
            return Ok(future);
        }
        self.futures.entry(target).or_default().push(slot);
        Ok(future)
    }

    /// Whether `thunk` transitively depends on `on` via input edges.
    ///
    /// A thunk depends on itself.
    pub fn depends_on(&self, thunk: ThunkId, on: ThunkId) -> bool {
        let mut stack = vec![thunk];
        let mut seen = HashSet::new();
        while let Some(current) = stack.pop() {
            if current == on {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(current) = self.thunk_dict.get(&current) {
                stack.extend(current.input_ids());
            }
        }
        false
    }

    /// Snapshot the DAG as id -> direct dependents, both sorted by id.
    pub fn dag_ids(&self) -> DagIds {
        let mut ids: Vec<ThunkId> = self.thunk_dict.keys().copied().collect();
        ids.sort_unstable();

        let mut snapshot = DagIds::new();
        for id in ids {
            let mut dependents: Vec<ThunkId> = self
                .dependents
                .get(&id)
                .map(|deps| deps.iter().copied().collect())
                .unwrap_or_default();
            dependents.sort_unstable();
            snapshot.insert(id, dependents);
        }
        snapshot
    }

    /// Build the invocation arguments for a ready thunk from literals and
    /// cached producer results. Movement and `meta` handling happen at
    /// dispatch.
    pub fn invocation_args(&self, id: ThunkId) -> Result<Vec<ThunkArg>, ThunkError> {
        let Some(thunk) = self.thunk_dict.get(&id) else {
            return Err(ThunkError::message(format!("thunk {id} is not interned")));
        };
        let mut args = Vec::with_capacity(thunk.inputs().len());
        for input in thunk.inputs() {
            match input {
                ThunkInput::Literal(value) => args.push(ThunkArg::Inline(value.clone())),
                ThunkInput::Thunk(producer) => match self.cache.get(&producer.id()) {
                    Some(CacheEntry::Inline(value)) => args.push(ThunkArg::Inline(value.clone())),
                    Some(CacheEntry::Chunk(chunk)) => args.push(ThunkArg::Chunk(chunk.clone())),
                    Some(CacheEntry::Failed(failed)) => return Err(failed.error.clone()),
                    None => {
                        return Err(ThunkError::message(format!(
                            "input {} of thunk {id} has no result",
                            producer.id()
                        )));
                    }
                },
            }
        }
        Ok(args)
    }

    pub fn set_halt(&mut self) {
        self.halt = true;
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    /// Drop every pending future; their receivers observe a halted
    /// indication. Returns how many were abandoned.
    pub fn abandon_futures(&mut self) -> usize {
        let abandoned = self.futures.values().map(Vec::len).sum();
        self.futures.clear();
        abandoned
    }

    pub fn finished_count(&self) -> u64 {
        self.finished.len() as u64
    }

    pub fn errored_count(&self) -> u64 {
        self.errored.len() as u64
    }

    /// Cache entries whose thunks asked for retention past state teardown.
    pub fn retained_count(&self) -> u64 {
        self.cache
            .keys()
            .filter(|id| {
                self.thunk_dict
                    .get(id)
                    .is_some_and(|t| t.options().retained())
            })
            .count() as u64
    }

    /// Check the store's invariants. Test-only.
    #[cfg(test)]
    pub fn verify_invariants(&self) {
        // I1: every finished or errored thunk has a cache entry.
        for id in self.finished.iter().chain(self.errored.iter()) {
            assert!(self.cache.contains_key(id), "no cache entry for {id}");
        }
        // I2: lifecycle states are mutually exclusive.
        for id in &self.finished {
            assert!(!self.errored.contains(id), "{id} finished and errored");
            assert!(!self.running.contains(id), "{id} finished and running");
            assert!(!self.is_ready(*id), "{id} finished and ready");
        }
        for id in &self.errored {
            assert!(!self.running.contains(id), "{id} errored and running");
            assert!(!self.is_ready(*id), "{id} errored and ready");
            assert!(!self.waiting.contains_key(id), "{id} errored and waiting");
        }
        for id in &self.running {
            assert!(!self.is_ready(*id), "{id} running and ready");
        }
        // I3: waiting and waiting_data mirror each other.
        for (consumer, waits) in &self.waiting {
            for producer in waits {
                assert!(
                    self.waiting_data
                        .get(producer)
                        .is_some_and(|c| c.contains(consumer)),
                    "waiting edge {producer} -> {consumer} missing from waiting_data"
                );
            }
        }
        for (producer, consumers) in &self.waiting_data {
            for consumer in consumers {
                assert!(
                    self.waiting
                        .get(consumer)
                        .is_some_and(|w| w.contains(producer)),
                    "waiting_data edge {producer} -> {consumer} missing from waiting"
                );
            }
        }
        // I4: errored thunks have fully errored downstream cones.
        for id in &self.errored {
            if let Some(deps) = self.dependents.get(id) {
                for dependent in deps {
                    assert!(
                        self.errored.contains(dependent),
                        "dependent {dependent} of errored {id} is not errored"
                    );
                }
            }
        }
        // I5: no futures remain registered on completed thunks.
        for id in self.finished.iter().chain(self.errored.iter()) {
            assert!(
                !self.futures.contains_key(id),
                "futures left registered on completed {id}"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{constant, failing, inc};
    use serde_json::json;
    use thunkflow_core::descriptor::{ProcessId, ProcessorId};
    use thunkflow_core::options::ThunkOptions;

    fn proc_id() -> ProcessorId {
        ProcessorId::new(ProcessId::local(), 1)
    }

    fn ok(value: i64) -> Result<ValueRef, ThunkError> {
        Ok(ValueRef::new(json!(value)))
    }

    /// a -> b -> c, interned and rescheduled from the root.
    fn chain() -> (SchedState, Arc<Thunk>, Arc<Thunk>, Arc<Thunk>) {
        let a = Arc::new(Thunk::new(constant(1), vec![]));
        let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
        let c = Arc::new(Thunk::builder(inc()).thunk_arg(&b).build());
        let mut state = SchedState::new();
        state.intern(&c);
        state.reschedule_inputs(c.id());
        (state, a, b, c)
    }

    #[test]
    fn test_reschedule_seeds_ready_and_waiting() {
        let (state, a, b, c) = chain();
        state.verify_invariants();

        // Only the leaf is ready; b and c wait on their producers.
        assert_eq!(state.ready, VecDeque::from([a.id()]));
        assert_eq!(state.waiting[&b.id()], HashSet::from([a.id()]));
        assert_eq!(state.waiting[&c.id()], HashSet::from([b.id()]));
        assert!(state.dependents[&a.id()].contains(&b.id()));
    }

    #[test]
    fn test_completion_promotes_consumers() {
        let (mut state, a, b, c) = chain();

        assert_eq!(state.pop_ready(), Some(a.id()));
        let newly = state.admit_completion(a.id(), ok(1), proc_id());
        state.verify_invariants();
        assert_eq!(newly, vec![b.id()]);

        assert_eq!(state.pop_ready(), Some(b.id()));
        let newly = state.admit_completion(b.id(), ok(2), proc_id());
        state.verify_invariants();
        assert_eq!(newly, vec![c.id()]);

        assert_eq!(state.pop_ready(), Some(c.id()));
        let newly = state.admit_completion(c.id(), ok(3), proc_id());
        state.verify_invariants();
        assert!(newly.is_empty());
        assert!(state.is_quiescent());
        assert_eq!(state.finished_count(), 3);
    }

    #[test]
    fn test_duplicate_completion_is_rejected() {
        let (mut state, a, ..) = chain();
        state.pop_ready();
        state.admit_completion(a.id(), ok(1), proc_id());
        let finished = state.finished_count();

        // Second completion for the same thunk: no state change.
        let newly = state.admit_completion(a.id(), ok(99), proc_id());
        state.verify_invariants();
        assert!(newly.is_empty());
        assert_eq!(state.finished_count(), finished);
        assert_eq!(
            state.cache[&a.id()].value().unwrap().value(),
            &json!(1),
            "duplicate completion must not overwrite the cache"
        );
    }

    #[test]
    fn test_failure_propagates_to_dependents() {
        let (mut state, a, b, c) = chain();
        state.pop_ready();
        state.admit_completion(a.id(), Err(ThunkError::message("x")), proc_id());
        state.verify_invariants();

        assert!(state.errored.contains(&a.id()));
        assert!(state.errored.contains(&b.id()));
        assert!(state.errored.contains(&c.id()));
        let failed = state.cache[&c.id()].failure().unwrap();
        assert_eq!(failed.origin, a.id());
        assert_eq!(failed.thunk, c.id());
        assert!(state.is_quiescent());
    }

    #[test]
    fn test_reschedule_onto_errored_input_fails_consumer() {
        let a = Arc::new(Thunk::new(failing("x"), vec![]));
        let mut state = SchedState::new();
        state.intern(&a);
        state.reschedule_inputs(a.id());
        state.pop_ready();
        state.admit_completion(a.id(), Err(ThunkError::message("x")), proc_id());

        // A consumer added after the failure inherits the origin.
        let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
        state.intern(&b);
        state.reschedule_inputs(b.id());
        state.verify_invariants();
        assert!(state.errored.contains(&b.id()));
        assert_eq!(state.cache[&b.id()].failure().unwrap().origin, a.id());
    }

    #[test]
    fn test_register_future_immediate_and_pending() {
        let (mut state, a, b, _c) = chain();

        let pending = state.register_future(None, b.id()).unwrap();
        state.pop_ready();
        state.admit_completion(a.id(), ok(1), proc_id());
        state.pop_ready();
        state.admit_completion(b.id(), ok(2), proc_id());
        state.verify_invariants();

        let immediate = state.register_future(None, b.id()).unwrap();
        let pending = block_on(pending.fetch()).unwrap();
        let immediate = block_on(immediate.fetch()).unwrap();
        assert_eq!(pending.value(), &json!(2));
        assert_eq!(immediate.value(), &json!(2));
    }

    #[test]
    fn test_register_future_unknown_thunk() {
        let mut state = SchedState::new();
        let missing = ThunkId::fresh();
        assert_eq!(
            state.register_future(None, missing).unwrap_err(),
            ControlError::UnknownThunk(missing)
        );
    }

    #[test]
    fn test_dominator_guard() {
        let (mut state, a, _b, c) = chain();

        // c depends on a: registering from a against c would deadlock.
        let error = state.register_future(Some(a.id()), c.id()).unwrap_err();
        assert_eq!(
            error,
            ControlError::DominatorViolation {
                requester: a.id(),
                target: c.id(),
            }
        );
        // The other direction is fine: a does not depend on c.
        assert!(state.register_future(Some(c.id()), a.id()).is_ok());
        // A thunk depends on itself.
        assert!(state.depends_on(a.id(), a.id()));
    }

    #[test]
    fn test_get_result_stores_inline_entry() {
        let a = Arc::new(
            Thunk::builder(constant(5))
                .options(ThunkOptions {
                    get_result: true,
                    ..Default::default()
                })
                .build(),
        );
        let plain = Arc::new(Thunk::new(constant(6), vec![]));
        let mut state = SchedState::new();
        state.intern(&a);
        state.intern(&plain);
        state.reschedule_inputs(a.id());
        state.reschedule_inputs(plain.id());

        state.pop_ready();
        state.pop_ready();
        state.admit_completion(a.id(), ok(5), proc_id());
        state.admit_completion(plain.id(), ok(6), proc_id());

        assert!(matches!(state.cache[&a.id()], CacheEntry::Inline(_)));
        assert!(matches!(state.cache[&plain.id()], CacheEntry::Chunk(_)));
    }

    #[test]
    fn test_dag_ids_snapshot() {
        let (state, a, b, c) = chain();
        let dag = state.dag_ids();
        assert_eq!(dag.len(), 3);
        assert_eq!(dag[&a.id()], vec![b.id()]);
        assert_eq!(dag[&b.id()], vec![c.id()]);
        assert_eq!(dag[&c.id()], Vec::<ThunkId>::new());
    }

    #[test]
    fn test_halt_latch_is_monotonic() {
        let mut state = SchedState::new();
        assert!(!state.halted());
        state.set_halt();
        state.set_halt();
        assert!(state.halted());
    }

    #[test]
    fn test_abandon_futures_resolves_receivers_as_halted() {
        let (mut state, a, ..) = chain();
        let future = state.register_future(None, a.id()).unwrap();
        assert_eq!(state.abandon_futures(), 1);
        assert_eq!(
            block_on(future.fetch()).unwrap_err(),
            ControlError::Halted
        );
    }

    /// Block on a future from a sync test.
    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }
}
