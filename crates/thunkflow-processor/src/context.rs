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

//! The run context: the mutable set of processors considered for dispatch.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use thunkflow_core::descriptor::{ProcessId, ProcessorId};

use crate::event::SchedulerEvent;
use crate::process::ProcessNode;
use crate::processor::Processor;
use crate::registry::{cached_leaves, clear_processor_cache};

struct ContextInner {
    /// Root processors registered for this context.
    procs: Vec<Arc<dyn Processor>>,
    /// Round-robin queue of dispatch leaves. Rebuilt when the topology
    /// changes; rotated by one on each selection for fairness.
    round_robin: VecDeque<Arc<dyn Processor>>,
}

impl ContextInner {
    fn rebuild_round_robin(&mut self) {
        self.round_robin = self
            .procs
            .iter()
            .flat_map(|root| cached_leaves(root).iter().cloned().collect::<Vec<_>>())
            .collect();
    }
}

/// The mutable set of processors available for a run.
///
/// The processor list and the round-robin selection queue are guarded by a
/// single lock; mutation is thread-safe. Events emitted by the scheduler are
/// written through [`write_event`](Self::write_event).
pub struct Context {
    inner: Mutex<ContextInner>,
}

impl Context {
    pub fn new(procs: Vec<Arc<dyn Processor>>) -> Self {
        let mut inner = ContextInner {
            procs,
            round_robin: VecDeque::new(),
        };
        inner.rebuild_round_robin();
        Self {
            inner: Mutex::new(inner),
        }
    }

    /// A context with a single local process exposing `threads` thread
    /// processors.
    pub fn with_local_threads(threads: usize) -> Self {
        Self::new(vec![Arc::new(ProcessNode::with_threads(
            ProcessId::local(),
            threads,
        )) as Arc<dyn Processor>])
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ContextInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of the registered root processors.
    pub fn procs(&self) -> Vec<Arc<dyn Processor>> {
        self.lock().procs.clone()
    }

    /// Run `body` with exclusive access to the processor list.
    ///
    /// The round-robin queue and the processor cache are rebuilt afterwards,
    /// since `body` may have changed the topology.
    pub fn with_procs<R>(&self, body: impl FnOnce(&mut Vec<Arc<dyn Processor>>) -> R) -> R {
        let mut inner = self.lock();
        let result = body(&mut inner.procs);
        clear_processor_cache();
        inner.rebuild_round_robin();
        result
    }

    pub fn add_procs(&self, procs: Vec<Arc<dyn Processor>>) {
        self.with_procs(|registered| registered.extend(procs));
    }

    /// Remove root processors by id. Unknown ids are ignored.
    pub fn rm_procs(&self, ids: &[ProcessorId]) {
        self.with_procs(|registered| {
            registered.retain(|proc| !ids.contains(&proc.descriptor().id));
        });
    }

    /// Number of dispatch leaves currently registered.
    pub fn leaf_count(&self) -> usize {
        self.lock().round_robin.len()
    }

    /// The distinct processes owning the registered processors.
    pub fn processes(&self) -> Vec<ProcessId> {
        let inner = self.lock();
        let mut processes: Vec<ProcessId> = inner
            .procs
            .iter()
            .map(|proc| proc.descriptor().id.process)
            .collect();
        processes.sort_unstable();
        processes.dedup();
        processes
    }

    /// Snapshot the dispatch leaves in round-robin order, advancing the
    /// queue by one so consecutive selections start from different leaves.
    pub fn round_robin_candidates(&self) -> Vec<Arc<dyn Processor>> {
        let mut inner = self.lock();
        let candidates: Vec<_> = inner.round_robin.iter().cloned().collect();
        if let Some(front) = inner.round_robin.pop_front() {
            inner.round_robin.push_back(front);
        }
        candidates
    }

    /// Write a scheduler event to the context's sink.
    ///
    /// The default sink serializes the event onto the `log` facade under the
    /// `thunkflow::event` target.
    pub fn write_event(&self, event: &SchedulerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => log::debug!(target: "thunkflow::event", "{json}"),
            Err(_) => log::debug!(target: "thunkflow::event", "{event:?}"),
        }
    }
}

impl Default for Context {
    /// A context with one thread processor per available CPU.
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::with_local_threads(threads)
    }
}
