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

//! Processor abstraction for thunkflow.
//!
//! Processors are the compute resources thunks are dispatched to. They form
//! a tree per cluster process: a root [`ProcessNode`] enumerates child
//! processors such as [`ThreadProcessor`]s or third-party accelerators.
//!
//! - [`Processor`] - the plug-in trait (capability vtable): compatibility
//!   tests, data movement, execution, tree navigation
//! - [`Context`] - the mutable set of processors available for a run, with
//!   the round-robin selection queue and the event sink
//! - [`select_processor`] - the dispatch-time selection policy
//! - a per-process cache of flattened leaf processors, torn down whenever
//!   the processor topology changes

mod context;
mod error;
mod event;
mod process;
mod processor;
mod registry;
mod select;
mod thread;

#[cfg(test)]
pub(crate) mod testing;

pub use context::Context;
pub use error::{ProcessorError, Result};
pub use event::{EventKind, SchedulerEvent};
pub use process::ProcessNode;
pub use processor::{Invocation, Processor, is_compatible, leaves};
pub use registry::{cached_leaves, clear_processor_cache};
pub use select::select_processor;
pub use thread::ThreadProcessor;
