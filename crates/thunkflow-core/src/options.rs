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

//! Per-thunk scheduling options.

use std::sync::Arc;

use crate::descriptor::{ProcessId, ProcessorDescriptor, ProcessorKind};

/// Predicate over processor descriptors, used by [`ProcList::Predicate`].
pub type ProcPredicate = Arc<dyn Fn(&ProcessorDescriptor) -> bool + Send + Sync>;

/// Restriction on which processors a thunk may be dispatched to.
#[derive(Clone, Default)]
pub enum ProcList {
    /// No restriction: any compatible processor with `default_enabled` set.
    #[default]
    Any,
    /// First compatible processor whose descriptor satisfies the predicate.
    Predicate(ProcPredicate),
    /// First compatible processor of one of these kinds.
    Kinds(Vec<ProcessorKind>),
}

impl ProcList {
    /// Whether the restriction admits the given processor.
    ///
    /// Compatibility is tested separately; this only encodes the
    /// `proclist` policy from the thunk's options.
    pub fn admits(&self, descriptor: &ProcessorDescriptor) -> bool {
        match self {
            Self::Any => descriptor.default_enabled,
            Self::Predicate(predicate) => predicate(descriptor),
            Self::Kinds(kinds) => kinds.contains(&descriptor.kind),
        }
    }
}

impl std::fmt::Debug for ProcList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => f.write_str("Any"),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
            Self::Kinds(kinds) => f.debug_tuple("Kinds").field(kinds).finish(),
        }
    }
}

/// Options recognized on a thunk.
///
/// Options only influence scheduling and result handling; they never change
/// the meaning of the thunk's function.
#[derive(Debug, Clone, Default)]
pub struct ThunkOptions {
    /// Pin dispatch to processors of a specific process.
    pub single: Option<ProcessId>,
    /// Restrict the processors considered for dispatch.
    pub proclist: ProcList,
    /// Store the result inline in the scheduler's cache instead of as a
    /// chunk on the executing processor.
    pub get_result: bool,
    /// Pass chunk arguments to the function without moving the data.
    pub meta: bool,
    /// Retain the cache entry when the run's state is torn down.
    pub persist: bool,
    /// Like `persist`, and additionally reuse the entry if the thunk is
    /// resubmitted within the run.
    pub cache: bool,
}

impl ThunkOptions {
    /// Whether the cache entry should outlive the run's state teardown.
    pub fn retained(&self) -> bool {
        self.persist || self.cache
    }
}
