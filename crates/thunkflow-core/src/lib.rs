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

//! Core task-graph model for thunkflow.
//!
//! This crate defines the vocabulary shared by the processor layer and the
//! scheduling kernel:
//!
//! - [`Thunk`] / [`ThunkId`] - deferred units of work and their stable ids
//! - [`ThunkFunc`] / [`ThunkArg`] - type-erased async functions and the
//!   arguments a worker invocation receives
//! - [`ValueRef`] - cheap-to-clone shared JSON values
//! - [`Chunk`] - a materialized result living on some processor
//! - [`ThunkError`] / [`ThunkFailed`] - user failures and their propagated form
//! - [`SchedulerApi`] - the handle an executing thunk uses to call back into
//!   the scheduler (add thunks, fetch results, halt)
//! - [`ThunkFuture`] - one-shot result delivery slots

pub mod api;
pub mod chunk;
pub mod descriptor;
pub mod func;
pub mod future;
pub mod options;
pub mod result;
pub mod thunk;
pub mod values;

// Re-export commonly used types
pub use api::{ControlError, DagIds, DynamicInput, SchedulerApi};
pub use chunk::Chunk;
pub use descriptor::{ProcessId, ProcessorDescriptor, ProcessorId, ProcessorKind};
pub use func::{ThunkArg, ThunkFunc, ThunkOutput};
pub use future::{ThunkFuture, ThunkPayload, ThunkSlot, thunk_future};
pub use options::{ProcList, ThunkOptions};
pub use result::{CacheEntry, ThunkError, ThunkFailed};
pub use thunk::{Thunk, ThunkBuilder, ThunkId, ThunkInput};
pub use values::ValueRef;
