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

use serde::{Deserialize, Serialize};

use crate::descriptor::ProcessorId;
use crate::values::ValueRef;

/// A materialized thunk result living on some processor.
///
/// A chunk carries enough metadata to move the result between processors.
/// The scheduler stores chunks in its cache and resolves them to inline
/// values when dispatching a consumer (unless the consumer asked for chunk
/// metadata via the `meta` option).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// The processor the result was produced on.
    pub processor: ProcessorId,
    pub value: ValueRef,
}

impl Chunk {
    pub fn new(processor: ProcessorId, value: ValueRef) -> Self {
        Self { processor, value }
    }
}

impl std::fmt::Display for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "chunk@{}", self.processor)
    }
}
