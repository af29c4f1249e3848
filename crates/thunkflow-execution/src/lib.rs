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

//! Scheduling kernel for thunkflow.
//!
//! This crate drives thunk DAGs to completion:
//!
//! - [`compute`] - execute a DAG and return the root's result
//! - the state store - dependency tracking, ready-queue maintenance, the
//!   result cache, and failure propagation
//! - the control plane - per-worker channels through which executing thunks
//!   add thunks, fetch results, snapshot the DAG, or halt the run
//!
//! The kernel is single-writer: the scheduler loop exclusively owns the run
//! state and serializes worker completions and control commands. Workers run
//! as spawned tasks on the processors selected from the
//! [`Context`](thunkflow_processor::Context).

mod control;
mod error;
mod scheduler;
mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{Result, SchedulerError};
pub use scheduler::{ComputeOptions, compute};
