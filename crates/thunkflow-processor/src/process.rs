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

use std::sync::Arc;

use async_trait::async_trait;
use thunkflow_core::descriptor::{
    ProcessId, ProcessorDescriptor, ProcessorId, ProcessorKind,
};
use thunkflow_core::func::ThunkOutput;
use thunkflow_core::result::{THUNK_ERROR_NOT_EXECUTABLE, ThunkError};

use crate::processor::{Invocation, Processor};
use crate::thread::ThreadProcessor;

/// The root processor of a cluster process.
///
/// A process node only enumerates its children (threads, accelerators); it is
/// never selected for dispatch itself. Its processor id is local index 0 of
/// its process.
pub struct ProcessNode {
    id: ProcessorId,
    children: Vec<Arc<dyn Processor>>,
}

impl ProcessNode {
    pub fn new(process: ProcessId, children: Vec<Arc<dyn Processor>>) -> Self {
        Self {
            id: ProcessorId::new(process, 0),
            children,
        }
    }

    /// A process node with `threads` thread processors as children.
    pub fn with_threads(process: ProcessId, threads: usize) -> Self {
        let parent = ProcessorId::new(process, 0);
        let children = (1..=threads)
            .map(|i| {
                Arc::new(ThreadProcessor::new(
                    ProcessorId::new(process, i as u32),
                    parent,
                )) as Arc<dyn Processor>
            })
            .collect();
        Self::new(process, children)
    }

    pub fn process(&self) -> ProcessId {
        self.id.process
    }
}

#[async_trait]
impl Processor for ProcessNode {
    fn descriptor(&self) -> ProcessorDescriptor {
        ProcessorDescriptor {
            id: self.id,
            kind: ProcessorKind::PROCESS,
            default_enabled: false,
        }
    }

    fn children(&self) -> Vec<Arc<dyn Processor>> {
        self.children.clone()
    }

    async fn execute(&self, invocation: Invocation) -> ThunkOutput {
        Err(ThunkError::new(
            THUNK_ERROR_NOT_EXECUTABLE,
            format!(
                "process processor {} cannot execute thunk {} directly",
                self.id, invocation.thunk
            ),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunkflow_core::func::ThunkFunc;
    use thunkflow_core::options::ThunkOptions;

    #[test]
    fn test_process_node_is_not_directly_dispatchable() {
        let node = ProcessNode::with_threads(ProcessId::local(), 2);
        let func = ThunkFunc::pure("noop", |_| Ok(Default::default()));
        assert!(!node.default_enabled());
        assert!(!node.is_compatible_func(&ThunkOptions::default(), &func));
        assert_eq!(node.children().len(), 2);
    }
}
