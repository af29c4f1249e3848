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
use thunkflow_core::descriptor::ProcessorDescriptor;
use thunkflow_core::result::{THUNK_ERROR_SELECTION, ThunkError};

#[derive(Error, Debug)]
pub enum ProcessorError {
    /// No processor in the context was compatible with the thunk.
    ///
    /// Carries the descriptors of every processor surveyed during selection.
    #[error("processor selection exhausted; surveyed {} processors", surveyed.len())]
    SelectionExhausted { surveyed: Vec<ProcessorDescriptor> },
}

impl ProcessorError {
    /// Convert into the thunk-failure shape reported for the affected thunk.
    pub fn to_thunk_error(&self) -> ThunkError {
        match self {
            Self::SelectionExhausted { surveyed } => {
                let listed = surveyed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                let error = ThunkError::new(
                    THUNK_ERROR_SELECTION,
                    format!("no compatible processor; surveyed: [{listed}]"),
                );
                error.clone().with_data(surveyed).unwrap_or(error)
            }
        }
    }
}

pub type Result<T, E = error_stack::Report<ProcessorError>> = std::result::Result<T, E>;
