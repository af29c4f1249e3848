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

//! Scheduler lifecycle events.
//!
//! Events are written through [`Context::write_event`](crate::Context::write_event)
//! as the scheduler makes progress. The default sink serializes them onto the
//! `log` facade; dedicated sinks are outside the core's scope.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thunkflow_core::descriptor::ProcessorId;
use thunkflow_core::thunk::ThunkId;
use uuid::Uuid;

/// A timestamped event in a scheduler run.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerEvent {
    /// The run this event belongs to.
    pub run: Uuid,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SchedulerEvent {
    pub fn new(run: Uuid, kind: EventKind) -> Self {
        Self {
            run,
            at: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted {
        root: ThunkId,
    },
    ThunkDispatched {
        thunk: ThunkId,
        processor: ProcessorId,
    },
    ThunkFinished {
        thunk: ThunkId,
    },
    ThunkErrored {
        thunk: ThunkId,
        origin: ThunkId,
    },
    /// A running thunk added a new thunk through the control plane.
    ThunkAdded {
        thunk: ThunkId,
        by: ThunkId,
    },
    Halted,
    RunFinished {
        dispatched: u64,
        finished: u64,
        errored: u64,
        /// Cache entries retained past state teardown (persist/cache).
        retained: u64,
    },
}
