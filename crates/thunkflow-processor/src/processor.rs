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

//! The processor plug-in trait.

use std::sync::Arc;

use async_trait::async_trait;
use thunkflow_core::api::SchedulerApi;
use thunkflow_core::descriptor::{ProcessorDescriptor, ProcessorId};
use thunkflow_core::func::{ThunkArg, ThunkFunc, ThunkOutput};
use thunkflow_core::options::ThunkOptions;
use thunkflow_core::thunk::ThunkId;

/// A prepared worker invocation: the function, its moved arguments, and the
/// scheduler handle bound to the executing thunk.
pub struct Invocation {
    pub thunk: ThunkId,
    pub func: ThunkFunc,
    pub args: Vec<ThunkArg>,
    pub api: Arc<dyn SchedulerApi>,
}

/// An abstract compute resource.
///
/// Implementations supply the capability table consulted at dispatch:
/// compatibility tests, the data-movement hook, execution, and tree
/// navigation. The provided compatibility implementations return `false`, so
/// every concrete processor type must opt in to the functions and argument
/// shapes it can handle.
///
/// Instances must be value-comparable through their [`descriptor`]
/// (descriptors are serializable and transportable across the cluster).
///
/// [`descriptor`]: Processor::descriptor
#[async_trait]
pub trait Processor: Send + Sync {
    fn descriptor(&self) -> ProcessorDescriptor;

    /// Child processors. A processor with no children is a dispatch leaf.
    fn children(&self) -> Vec<Arc<dyn Processor>> {
        Vec::new()
    }

    fn parent(&self) -> Option<ProcessorId> {
        None
    }

    /// Whether this processor participates in dispatch when the thunk does
    /// not restrict processor kinds.
    fn default_enabled(&self) -> bool {
        self.descriptor().default_enabled
    }

    fn is_compatible_func(&self, _options: &ThunkOptions, _func: &ThunkFunc) -> bool {
        false
    }

    fn is_compatible_arg(&self, _options: &ThunkOptions, _arg: &ThunkArg) -> bool {
        false
    }

    /// Move an argument produced on another processor onto this one.
    ///
    /// The default resolves chunk references to inline values, which is the
    /// correct movement for processors sharing the scheduler's address
    /// space. Remote processor kinds override this with real transfers.
    fn move_in(&self, from: Option<ProcessorId>, arg: ThunkArg) -> ThunkArg {
        match arg {
            ThunkArg::Chunk(chunk) => {
                log::debug!(
                    "moving chunk from {:?} to {}",
                    from,
                    self.descriptor().id
                );
                ThunkArg::Inline(chunk.value)
            }
            inline => inline,
        }
    }

    /// Execute the invocation and produce the thunk's result.
    async fn execute(&self, invocation: Invocation) -> ThunkOutput;
}

/// Conjunction of the function and per-argument compatibility tests.
pub fn is_compatible(
    processor: &dyn Processor,
    options: &ThunkOptions,
    func: &ThunkFunc,
    args: &[ThunkArg],
) -> bool {
    processor.is_compatible_func(options, func)
        && args
            .iter()
            .all(|arg| processor.is_compatible_arg(options, arg))
}

/// Flatten a processor tree into its dispatch leaves.
///
/// A childless processor is itself a leaf.
pub fn leaves(root: Arc<dyn Processor>) -> Vec<Arc<dyn Processor>> {
    let children = root.children();
    if children.is_empty() {
        return vec![root];
    }
    children.into_iter().flat_map(leaves).collect()
}
