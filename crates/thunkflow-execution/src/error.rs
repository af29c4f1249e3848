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

use thiserror::Error;
use thunkflow_core::api::ControlError;
use thunkflow_core::result::ThunkFailed;
use thunkflow_core::thunk::ThunkId;

#[derive(Error, Debug)]
pub enum SchedulerError {
    /// The run was halted through the control plane.
    #[error("scheduler halted")]
    Halted,
    /// The root thunk (or a fetched thunk) failed.
    #[error("{0}")]
    Failed(ThunkFailed),
    #[error("unknown thunk {0}")]
    UnknownThunk(ThunkId),
    #[error("thunk {target} transitively depends on requesting thunk {requester}")]
    DominatorViolation { requester: ThunkId, target: ThunkId },
    #[error("internal error: {0}")]
    Internal(String),
}

impl SchedulerError {
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}

impl From<ControlError> for SchedulerError {
    fn from(error: ControlError) -> Self {
        match error {
            ControlError::Halted => Self::Halted,
            ControlError::UnknownThunk(id) => Self::UnknownThunk(id),
            ControlError::DominatorViolation { requester, target } => {
                Self::DominatorViolation { requester, target }
            }
            ControlError::Failed(failed) => Self::Failed(failed),
            ControlError::Handler(message) => Self::Internal(message),
        }
    }
}

pub type Result<T, E = error_stack::Report<SchedulerError>> = std::result::Result<T, E>;
