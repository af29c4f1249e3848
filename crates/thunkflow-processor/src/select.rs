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

//! Dispatch-time processor selection.

use std::sync::Arc;

use error_stack::report;
use thunkflow_core::func::{ThunkArg, ThunkFunc};
use thunkflow_core::options::ThunkOptions;

use crate::context::Context;
use crate::error::{ProcessorError, Result};
use crate::processor::{Processor, is_compatible};

/// Select a processor for a thunk.
///
/// Candidates are surveyed in round-robin order. A candidate is selected when
/// it is compatible with the function and every argument, and it is admitted
/// by the thunk's `proclist` policy. The `single` option restricts the survey
/// to processors of the pinned process.
///
/// When no candidate is selected the error lists every surveyed descriptor.
pub fn select_processor(
    ctx: &Context,
    options: &ThunkOptions,
    func: &ThunkFunc,
    args: &[ThunkArg],
) -> Result<Arc<dyn Processor>> {
    let mut surveyed = Vec::new();
    for processor in ctx.round_robin_candidates() {
        let descriptor = processor.descriptor();
        if let Some(process) = options.single
            && descriptor.id.process != process
        {
            continue;
        }
        if is_compatible(processor.as_ref(), options, func, args)
            && options.proclist.admits(&descriptor)
        {
            log::trace!("selected {} for {}", descriptor, func.name());
            return Ok(processor);
        }
        surveyed.push(descriptor);
    }
    Err(report!(ProcessorError::SelectionExhausted { surveyed }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use thunkflow_core::descriptor::{ProcessId, ProcessorKind};
    use thunkflow_core::options::ProcList;

    fn noop_func() -> ThunkFunc {
        ThunkFunc::pure("noop", |_| Ok(Default::default()))
    }

    #[test]
    fn test_selects_default_enabled_thread() {
        let ctx = Context::with_local_threads(2);
        let selected =
            select_processor(&ctx, &ThunkOptions::default(), &noop_func(), &[]).unwrap();
        assert_eq!(selected.descriptor().kind, ProcessorKind::THREAD);
    }

    #[test]
    fn test_round_robin_spreads_selections() {
        let ctx = Context::with_local_threads(2);
        let options = ThunkOptions::default();
        let first = select_processor(&ctx, &options, &noop_func(), &[]).unwrap();
        let second = select_processor(&ctx, &options, &noop_func(), &[]).unwrap();
        assert_ne!(first.descriptor().id, second.descriptor().id);
    }

    #[test]
    fn test_kind_restriction_exhausts_on_cpu_only_context() {
        let ctx = Context::with_local_threads(2);
        let options = ThunkOptions {
            proclist: ProcList::Kinds(vec![ProcessorKind::new("gpu")]),
            ..Default::default()
        };
        let error = select_processor(&ctx, &options, &noop_func(), &[]).err().unwrap();
        match error.current_context() {
            ProcessorError::SelectionExhausted { surveyed } => {
                assert_eq!(surveyed.len(), 2);
                assert!(surveyed.iter().all(|d| d.kind == ProcessorKind::THREAD));
            }
        }
    }

    #[test]
    fn test_single_pin_filters_processes() {
        let ctx = Context::with_local_threads(2);
        let options = ThunkOptions {
            single: Some(ProcessId::new(9)),
            ..Default::default()
        };
        // No processor on process 9: the pinned survey is empty.
        let error = select_processor(&ctx, &options, &noop_func(), &[]).err().unwrap();
        match error.current_context() {
            ProcessorError::SelectionExhausted { surveyed } => assert!(surveyed.is_empty()),
        }

        let options = ThunkOptions {
            single: Some(ProcessId::local()),
            ..Default::default()
        };
        assert!(select_processor(&ctx, &options, &noop_func(), &[]).is_ok());
    }

    #[test]
    fn test_predicate_proclist() {
        let ctx = Context::with_local_threads(3);
        let options = ThunkOptions {
            proclist: ProcList::Predicate(Arc::new(|d| d.id.local == 2)),
            ..Default::default()
        };
        let selected = select_processor(&ctx, &options, &noop_func(), &[]).unwrap();
        assert_eq!(selected.descriptor().id.local, 2);
    }
}
