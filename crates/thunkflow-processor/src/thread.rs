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

use async_trait::async_trait;
use thunkflow_core::descriptor::{ProcessorDescriptor, ProcessorId, ProcessorKind};
use thunkflow_core::func::{ThunkArg, ThunkFunc, ThunkOutput};
use thunkflow_core::options::ThunkOptions;

use crate::processor::{Invocation, Processor};

/// A thread of a cluster process.
///
/// Thread processors run thunk functions on the runtime's worker threads and
/// are compatible with every function and argument, enabled by default.
pub struct ThreadProcessor {
    id: ProcessorId,
    parent: ProcessorId,
}

impl ThreadProcessor {
    pub fn new(id: ProcessorId, parent: ProcessorId) -> Self {
        Self { id, parent }
    }
}

#[async_trait]
impl Processor for ThreadProcessor {
    fn descriptor(&self) -> ProcessorDescriptor {
        ProcessorDescriptor {
            id: self.id,
            kind: ProcessorKind::THREAD,
            default_enabled: true,
        }
    }

    fn parent(&self) -> Option<ProcessorId> {
        Some(self.parent)
    }

    fn is_compatible_func(&self, _options: &ThunkOptions, _func: &ThunkFunc) -> bool {
        true
    }

    fn is_compatible_arg(&self, _options: &ThunkOptions, _arg: &ThunkArg) -> bool {
        true
    }

    async fn execute(&self, invocation: Invocation) -> ThunkOutput {
        log::trace!(
            "executing thunk {} ({}) on {}",
            invocation.thunk,
            invocation.func.name(),
            self.id
        );
        invocation.func.invoke(invocation.api, invocation.args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thunkflow_core::descriptor::ProcessId;
    use thunkflow_core::values::ValueRef;

    fn thread() -> ThreadProcessor {
        let process = ProcessId::local();
        ThreadProcessor::new(
            ProcessorId::new(process, 1),
            ProcessorId::new(process, 0),
        )
    }

    #[test]
    fn test_compatible_by_default() {
        let proc = thread();
        let func = ThunkFunc::pure("noop", |_| Ok(Default::default()));
        let options = ThunkOptions::default();
        assert!(proc.is_compatible_func(&options, &func));
        assert!(proc.is_compatible_arg(&options, &ThunkArg::Inline(ValueRef::new(json!(1)))));
        assert!(proc.default_enabled());
    }

    #[tokio::test]
    async fn test_execute_invokes_function() {
        let proc = thread();
        let func = ThunkFunc::pure("double", |args| {
            let x = args[0].value().as_i64().unwrap_or(0);
            Ok(ValueRef::new(json!(x * 2)))
        });
        let result = proc
            .execute(Invocation {
                thunk: thunkflow_core::thunk::ThunkId::fresh(),
                func,
                args: vec![ThunkArg::Inline(ValueRef::new(json!(21)))],
                api: crate::testing::noop_api(),
            })
            .await
            .unwrap();
        assert_eq!(result.value(), &json!(42));
    }
}
