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

//! Test helpers for processor tests.

use std::sync::Arc;

use async_trait::async_trait;
use thunkflow_core::api::{ControlError, DagIds, DynamicInput, SchedulerApi};
use thunkflow_core::func::ThunkFunc;
use thunkflow_core::future::ThunkFuture;
use thunkflow_core::options::ThunkOptions;
use thunkflow_core::thunk::ThunkId;
use thunkflow_core::values::ValueRef;

/// A scheduler handle stub for invoking functions outside a run; every
/// command fails with [`ControlError::Halted`].
pub(crate) fn noop_api() -> Arc<dyn SchedulerApi> {
    Arc::new(NoopApi {
        thunk: ThunkId::fresh(),
    })
}

struct NoopApi {
    thunk: ThunkId,
}

#[async_trait]
impl SchedulerApi for NoopApi {
    fn thunk_id(&self) -> ThunkId {
        self.thunk
    }

    async fn add_thunk(
        &self,
        _func: ThunkFunc,
        _inputs: Vec<DynamicInput>,
        _options: ThunkOptions,
    ) -> Result<ThunkId, ControlError> {
        Err(ControlError::Halted)
    }

    async fn register_future(&self, _target: ThunkId) -> Result<ThunkFuture, ControlError> {
        Err(ControlError::Halted)
    }

    async fn fetch(&self, _target: ThunkId) -> Result<ValueRef, ControlError> {
        Err(ControlError::Halted)
    }

    async fn wait(&self, _target: ThunkId) -> Result<(), ControlError> {
        Err(ControlError::Halted)
    }

    async fn halt(&self) -> Result<(), ControlError> {
        Ok(())
    }

    async fn dag_ids(&self) -> Result<DagIds, ControlError> {
        Err(ControlError::Halted)
    }
}
