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

//! Thunks: deferred units of work.
//!
//! A [`Thunk`] pairs a [`ThunkFunc`] with an ordered list of inputs, each a
//! literal value or another thunk. Thunks are immutable after creation and
//! identified by a process-unique monotonic [`ThunkId`]; equality and hashing
//! are by id.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::descriptor::ProcessId;
use crate::func::ThunkFunc;
use crate::options::{ProcList, ThunkOptions};
use crate::values::ValueRef;

static NEXT_THUNK_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a thunk.
///
/// Ids are process-unique and monotonic, and safe to send across the control
/// channel as a lightweight handle to the thunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThunkId(u64);

impl ThunkId {
    /// Allocate the next id.
    pub fn fresh() -> Self {
        Self(NEXT_THUNK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn id(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ThunkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// An input of a thunk: a literal value or the result of another thunk.
#[derive(Debug, Clone)]
pub enum ThunkInput {
    Literal(ValueRef),
    Thunk(Arc<Thunk>),
}

impl ThunkInput {
    pub fn as_thunk(&self) -> Option<&Arc<Thunk>> {
        match self {
            Self::Literal(_) => None,
            Self::Thunk(thunk) => Some(thunk),
        }
    }
}

impl From<ValueRef> for ThunkInput {
    fn from(value: ValueRef) -> Self {
        Self::Literal(value)
    }
}

impl From<Arc<Thunk>> for ThunkInput {
    fn from(thunk: Arc<Thunk>) -> Self {
        Self::Thunk(thunk)
    }
}

impl From<&Arc<Thunk>> for ThunkInput {
    fn from(thunk: &Arc<Thunk>) -> Self {
        Self::Thunk(thunk.clone())
    }
}

/// A deferred unit of work: a function applied to literal and thunk inputs.
///
/// The descriptor is immutable; all execution bookkeeping lives in the
/// scheduler's state store, keyed by the thunk's id.
#[derive(Clone)]
pub struct Thunk {
    id: ThunkId,
    func: ThunkFunc,
    inputs: Vec<ThunkInput>,
    options: ThunkOptions,
}

impl Thunk {
    /// Create a thunk with default options.
    pub fn new(func: ThunkFunc, inputs: Vec<ThunkInput>) -> Self {
        Self::with_options(func, inputs, ThunkOptions::default())
    }

    pub fn with_options(func: ThunkFunc, inputs: Vec<ThunkInput>, options: ThunkOptions) -> Self {
        Self {
            id: ThunkId::fresh(),
            func,
            inputs,
            options,
        }
    }

    pub fn builder(func: ThunkFunc) -> ThunkBuilder {
        ThunkBuilder::new(func)
    }

    pub fn id(&self) -> ThunkId {
        self.id
    }

    pub fn func(&self) -> &ThunkFunc {
        &self.func
    }

    pub fn inputs(&self) -> &[ThunkInput] {
        &self.inputs
    }

    pub fn options(&self) -> &ThunkOptions {
        &self.options
    }

    /// Replace the options before submission, keeping the id.
    pub fn override_options(mut self, options: ThunkOptions) -> Self {
        self.options = options;
        self
    }

    /// Ids of the thunk inputs, in argument order.
    pub fn input_ids(&self) -> impl Iterator<Item = ThunkId> + '_ {
        self.inputs
            .iter()
            .filter_map(|input| input.as_thunk().map(|t| t.id))
    }
}

impl PartialEq for Thunk {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Thunk {}

impl std::hash::Hash for Thunk {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Debug for Thunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Thunk")
            .field("id", &self.id)
            .field("func", &self.func.name())
            .field("inputs", &self.inputs.len())
            .finish_non_exhaustive()
    }
}

/// Builder for thunks and their options.
pub struct ThunkBuilder {
    func: ThunkFunc,
    inputs: Vec<ThunkInput>,
    options: ThunkOptions,
}

impl ThunkBuilder {
    pub fn new(func: ThunkFunc) -> Self {
        Self {
            func,
            inputs: Vec::new(),
            options: ThunkOptions::default(),
        }
    }

    /// Append a literal argument.
    pub fn arg(mut self, value: impl Into<ValueRef>) -> Self {
        self.inputs.push(ThunkInput::Literal(value.into()));
        self
    }

    /// Append the result of another thunk as an argument.
    pub fn thunk_arg(mut self, thunk: impl Into<ThunkInput>) -> Self {
        self.inputs.push(thunk.into());
        self
    }

    pub fn single(mut self, process: ProcessId) -> Self {
        self.options.single = Some(process);
        self
    }

    pub fn proclist(mut self, proclist: ProcList) -> Self {
        self.options.proclist = proclist;
        self
    }

    pub fn get_result(mut self, get_result: bool) -> Self {
        self.options.get_result = get_result;
        self
    }

    pub fn meta(mut self, meta: bool) -> Self {
        self.options.meta = meta;
        self
    }

    pub fn persist(mut self, persist: bool) -> Self {
        self.options.persist = persist;
        self
    }

    pub fn cache(mut self, cache: bool) -> Self {
        self.options.cache = cache;
        self
    }

    pub fn options(mut self, options: ThunkOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> Thunk {
        Thunk::with_options(self.func, self.inputs, self.options)
    }
}
