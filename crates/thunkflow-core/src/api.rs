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

//! The scheduler API available to executing thunks.
//!
//! Every worker invocation receives an `Arc<dyn SchedulerApi>` bound to the
//! executing thunk. Commands sent through it travel the worker's control
//! channel to the scheduler loop, which processes them in arrival order and
//! replies on the command's one-shot reply slot.

use async_trait::async_trait;
use indexmap::IndexMap;
use thiserror::Error;

use crate::func::ThunkFunc;
use crate::future::ThunkFuture;
use crate::options::ThunkOptions;
use crate::result::ThunkFailed;
use crate::thunk::ThunkId;
use crate::values::ValueRef;

/// Snapshot of the DAG: each known thunk id mapped to its direct dependents.
pub type DagIds = IndexMap<ThunkId, Vec<ThunkId>>;

/// An input passed to `add_thunk` from a running thunk.
///
/// Unlike [`ThunkInput`](crate::thunk::ThunkInput), thunk references are by
/// id: the referenced thunks already live in the scheduler's state, and ids
/// are what is safe to send across the control channel.
#[derive(Debug, Clone)]
pub enum DynamicInput {
    Literal(ValueRef),
    Thunk(ThunkId),
}

impl From<ValueRef> for DynamicInput {
    fn from(value: ValueRef) -> Self {
        Self::Literal(value)
    }
}

impl From<ThunkId> for DynamicInput {
    fn from(id: ThunkId) -> Self {
        Self::Thunk(id)
    }
}

/// Failure of a control command, surfaced on the calling thunk's stack.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ControlError {
    /// The scheduler halted (or the control channel closed mid-command).
    #[error("scheduler halted")]
    Halted,
    #[error("unknown thunk {0}")]
    UnknownThunk(ThunkId),
    /// The target transitively depends on the requester; waiting on it from
    /// the requester would deadlock.
    #[error("thunk {target} transitively depends on requesting thunk {requester}")]
    DominatorViolation { requester: ThunkId, target: ThunkId },
    /// The fetched thunk failed.
    #[error(transparent)]
    Failed(#[from] ThunkFailed),
    /// A command handler failed; the captured message is returned verbatim.
    #[error("control command failed: {0}")]
    Handler(String),
}

impl From<ControlError> for crate::result::ThunkError {
    /// Lets a dynamic thunk propagate control failures with `?`.
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::Failed(failed) => failed.error,
            other => crate::result::ThunkError::message(other.to_string()),
        }
    }
}

/// Handle through which an executing thunk talks to the scheduler.
///
/// All methods suspend on the control channel round-trip. Per worker,
/// commands are processed in FIFO order.
#[async_trait]
pub trait SchedulerApi: Send + Sync {
    /// Id of the thunk this handle is bound to.
    fn thunk_id(&self) -> ThunkId;

    /// Add a new thunk to the running DAG and return its id.
    ///
    /// Inputs may reference existing thunks by id; the new thunk becomes
    /// ready once those inputs resolve.
    async fn add_thunk(
        &self,
        func: ThunkFunc,
        inputs: Vec<DynamicInput>,
        options: ThunkOptions,
    ) -> Result<ThunkId, ControlError>;

    /// Register a one-shot future for the target's result.
    ///
    /// Fails with [`ControlError::DominatorViolation`] if the target
    /// transitively depends on this thunk.
    async fn register_future(&self, target: ThunkId) -> Result<ThunkFuture, ControlError>;

    /// Fetch the target's result, suspending until it completes.
    async fn fetch(&self, target: ThunkId) -> Result<ValueRef, ControlError>;

    /// Wait for the target to complete, discarding its value.
    async fn wait(&self, target: ThunkId) -> Result<(), ControlError>;

    /// Set the scheduler-wide halt latch.
    async fn halt(&self) -> Result<(), ControlError>;

    /// Snapshot the DAG as id -> direct dependents.
    async fn dag_ids(&self) -> Result<DagIds, ControlError>;
}
