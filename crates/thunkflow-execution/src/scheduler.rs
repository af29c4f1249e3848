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

//! The scheduler loop.
//!
//! [`compute`] seeds the state store from the root thunk's transitive input
//! set, spawns one control listener per worker, and drives the loop: dispatch
//! ready thunks to selected processors, admit completions, and handle
//! control commands, until the run is quiescent or halted.
//!
//! The loop is single-threaded with respect to state mutation: it exclusively
//! owns the [`SchedState`] and serializes completions and control commands
//! through `tokio::select!`. Worker-side executions run in parallel as
//! spawned tasks and interact with the scheduler only through channels.

use std::collections::HashMap;
use std::sync::Arc;

use error_stack::report;
use tokio::sync::mpsc;
use uuid::Uuid;

use thunkflow_core::api::{ControlError, DynamicInput, SchedulerApi};
use thunkflow_core::descriptor::{ProcessId, ProcessorId};
use thunkflow_core::func::{ThunkArg, ThunkFunc};
use thunkflow_core::options::ThunkOptions;
use thunkflow_core::result::{ThunkError, ThunkFailed};
use thunkflow_core::thunk::{Thunk, ThunkId, ThunkInput};
use thunkflow_core::values::ValueRef;
use thunkflow_processor::{Context, EventKind, Invocation, SchedulerEvent, select_processor};

use crate::control::{
    ControlCommand, ControlReply, ControlRequest, SchHandle, spawn_worker_listener,
};
use crate::error::{Result, SchedulerError};
use crate::state::SchedState;

/// Per-run options for [`compute`].
#[derive(Debug, Default)]
pub struct ComputeOptions {
    /// Maximum in-flight dispatches. Defaults to the context's leaf count.
    pub capacity: Option<usize>,
    /// Replace the root thunk's options for this run.
    pub options: Option<ThunkOptions>,
}

/// A message on the completion channel.
enum Completion {
    /// A worker finished executing a thunk (successfully or not).
    Done {
        thunk: ThunkId,
        result: Result<ValueRef, ThunkError>,
        processor: ProcessorId,
    },
    /// Synthetic completion posted by the halt handler to wake the loop.
    Halted,
}

/// Execute a thunk DAG to completion and return the root's result.
///
/// Dependencies are resolved from the root's transitive input set; ready
/// thunks are dispatched to compatible processors from `ctx`. The call
/// returns when the root's result is available, the run halts, or the root
/// fails (directly or by propagation).
pub async fn compute(ctx: &Context, root: Thunk, options: ComputeOptions) -> Result<ValueRef> {
    let run = Uuid::now_v7();
    let capacity = options.capacity.unwrap_or_else(|| ctx.leaf_count()).max(1);
    let root = match options.options {
        Some(opts) => Arc::new(root.override_options(opts)),
        None => Arc::new(root),
    };
    ctx.write_event(&SchedulerEvent::new(
        run,
        EventKind::RunStarted { root: root.id() },
    ));
    log::info!(
        "starting run {run}: root {} ({}), capacity {capacity}",
        root.id(),
        root.func().name()
    );

    let (completion_tx, completion_rx) = mpsc::unbounded_channel();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    // One channel pair and listener task per worker process.
    let mut worker_chans = HashMap::new();
    for process in ctx.processes() {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        spawn_worker_listener(process, inbound_rx, control_tx.clone());
        worker_chans.insert(process, inbound_tx);
    }
    drop(control_tx);

    let mut state = SchedState::new();
    state.intern(&root);
    state.reschedule_inputs(root.id());
    let root_future = state
        .register_future(None, root.id())
        .map_err(|error| report!(SchedulerError::from(error)))?;

    let mut driver = SchedulerLoop {
        ctx,
        run,
        state,
        capacity,
        completion_tx,
        completion_rx,
        control_rx,
        worker_chans,
        dispatched: 0,
    };
    driver.run().await?;

    root_future.fetch().await.map_err(|error| match error {
        ControlError::Failed(failed) => report!(SchedulerError::Failed(failed)),
        other => report!(SchedulerError::from(other)),
    })
}

struct SchedulerLoop<'a> {
    ctx: &'a Context,
    run: Uuid,
    state: SchedState,
    capacity: usize,
    completion_tx: mpsc::UnboundedSender<Completion>,
    completion_rx: mpsc::UnboundedReceiver<Completion>,
    control_rx: mpsc::UnboundedReceiver<ControlRequest>,
    worker_chans: HashMap<ProcessId, mpsc::UnboundedSender<ControlRequest>>,
    dispatched: u64,
}

impl SchedulerLoop<'_> {
    async fn run(&mut self) -> Result<()> {
        loop {
            self.dispatch_ready();

            // Safepoint: observe the halt latch after dispatch decisions.
            if self.state.halted() {
                return self.finalize_halted();
            }

            if self.state.is_quiescent() {
                // Nothing is running, so only messages already queued can
                // change the picture; drain them without blocking.
                if let Ok(request) = self.control_rx.try_recv() {
                    self.handle_control(request);
                    continue;
                }
                if let Ok(completion) = self.completion_rx.try_recv() {
                    self.handle_completion(completion);
                    continue;
                }
                break;
            }

            tokio::select! {
                Some(completion) = self.completion_rx.recv() => self.handle_completion(completion),
                Some(request) = self.control_rx.recv() => self.handle_control(request),
            }
        }

        self.finalize();
        Ok(())
    }

    /// Dispatch ready thunks up to capacity.
    ///
    /// At least one dispatch is always allowed: a running thunk waiting on
    /// dynamically added work must not be able to starve that work of
    /// capacity, or the run would deadlock.
    fn dispatch_ready(&mut self) {
        let max_to_start = self
            .capacity
            .saturating_sub(self.state.running_count())
            .max(1);
        for _ in 0..max_to_start {
            let Some(id) = self.state.pop_ready() else {
                break;
            };
            self.dispatch(id);
        }
    }

    fn dispatch(&mut self, id: ThunkId) {
        let Some(thunk) = self.state.thunk(id).cloned() else {
            log::error!("ready thunk {id} missing from thunk_dict");
            return;
        };

        let args = match self.state.invocation_args(id) {
            Ok(args) => args,
            Err(error) => {
                self.fail_dispatch(id, error);
                return;
            }
        };

        let processor = match select_processor(self.ctx, thunk.options(), thunk.func(), &args) {
            Ok(processor) => processor,
            Err(error) => {
                // Selection exhaustion is reported in the same shape as a
                // thunk failure.
                self.fail_dispatch(id, error.current_context().to_thunk_error());
                return;
            }
        };
        let descriptor = processor.descriptor();

        // Move arguments onto the selected processor, unless the thunk asked
        // for chunk metadata.
        let args: Vec<ThunkArg> = if thunk.options().meta {
            args
        } else {
            args.into_iter()
                .map(|arg| match arg {
                    ThunkArg::Chunk(chunk) => {
                        let from = chunk.processor;
                        processor.move_in(Some(from), ThunkArg::Chunk(chunk))
                    }
                    inline => inline,
                })
                .collect()
        };

        let Some(inbound) = self.worker_chans.get(&descriptor.id.process) else {
            self.fail_dispatch(
                id,
                ThunkError::message(format!(
                    "no control channel for process {}",
                    descriptor.id.process
                )),
            );
            return;
        };
        let api: Arc<dyn SchedulerApi> = Arc::new(SchHandle::new(id, inbound.clone()));

        self.ctx.write_event(&SchedulerEvent::new(
            self.run,
            EventKind::ThunkDispatched {
                thunk: id,
                processor: descriptor.id,
            },
        ));
        self.dispatched += 1;
        log::debug!("dispatching {id} ({}) to {descriptor}", thunk.func().name());

        let invocation = Invocation {
            thunk: id,
            func: thunk.func().clone(),
            args,
            api,
        };
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result = processor.execute(invocation).await;
            // The loop may already have finalized; a dropped receiver is the
            // halt-class signal to discard this completion.
            let _ = completion_tx.send(Completion::Done {
                thunk: id,
                result,
                processor: descriptor.id,
            });
        });
    }

    /// Fail a thunk during dispatch and emit the errored event.
    fn fail_dispatch(&mut self, id: ThunkId, error: ThunkError) {
        self.state.fail_thunk(id, &ThunkFailed::new(id, id, error));
        self.ctx.write_event(&SchedulerEvent::new(
            self.run,
            EventKind::ThunkErrored {
                thunk: id,
                origin: id,
            },
        ));
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Halted => {
                // Latch was set by the control handler; observed at the next
                // safepoint.
            }
            Completion::Done {
                thunk,
                result,
                processor,
            } => {
                let errored = result.is_err();
                let newly_ready = self.state.admit_completion(thunk, result, processor);
                let kind = if errored {
                    EventKind::ThunkErrored {
                        thunk,
                        origin: thunk,
                    }
                } else {
                    EventKind::ThunkFinished { thunk }
                };
                self.ctx.write_event(&SchedulerEvent::new(self.run, kind));
                log::debug!(
                    "completed {thunk} (errored={errored}), {} newly ready",
                    newly_ready.len()
                );
            }
        }
    }

    fn handle_control(&mut self, request: ControlRequest) {
        let ControlRequest {
            from,
            command,
            reply,
        } = request;
        let result = match command {
            ControlCommand::Halt => {
                log::info!("halt requested by {from}");
                self.state.set_halt();
                self.ctx
                    .write_event(&SchedulerEvent::new(self.run, EventKind::Halted));
                let _ = self.completion_tx.send(Completion::Halted);
                Ok(ControlReply::Unit)
            }
            ControlCommand::RegisterFuture { target } => self
                .state
                .register_future(Some(from), target)
                .map(ControlReply::Future),
            ControlCommand::AddThunk {
                func,
                inputs,
                options,
            } => self
                .add_thunk(from, func, inputs, options)
                .map(ControlReply::Added),
            ControlCommand::GetDagIds => Ok(ControlReply::Dag(self.state.dag_ids())),
        };
        if reply.send(result).is_err() {
            log::debug!("dropping control reply; worker for thunk {from} is gone");
        }
    }

    fn add_thunk(
        &mut self,
        from: ThunkId,
        func: ThunkFunc,
        inputs: Vec<DynamicInput>,
        options: ThunkOptions,
    ) -> Result<ThunkId, ControlError> {
        let mut resolved = Vec::with_capacity(inputs.len());
        for input in inputs {
            match input {
                DynamicInput::Literal(value) => resolved.push(ThunkInput::Literal(value)),
                DynamicInput::Thunk(id) => {
                    let thunk = self
                        .state
                        .thunk(id)
                        .ok_or(ControlError::UnknownThunk(id))?
                        .clone();
                    resolved.push(ThunkInput::Thunk(thunk));
                }
            }
        }

        let thunk = Arc::new(Thunk::with_options(func, resolved, options));
        let id = thunk.id();
        self.state.intern(&thunk);
        self.state.reschedule_inputs(id);
        self.ctx.write_event(&SchedulerEvent::new(
            self.run,
            EventKind::ThunkAdded { thunk: id, by: from },
        ));
        log::debug!("thunk {id} added dynamically by {from}");
        Ok(id)
    }

    /// Terminate a halted run: close the worker channels, resolve pending
    /// futures with the halted indication, and surface the halt.
    fn finalize_halted(&mut self) -> Result<()> {
        self.worker_chans.clear();
        let abandoned = self.state.abandon_futures();
        if abandoned > 0 {
            log::debug!("{abandoned} pending futures resolved as halted");
        }
        self.emit_summary();
        Err(report!(SchedulerError::Halted))
    }

    fn finalize(&mut self) {
        self.worker_chans.clear();
        self.emit_summary();
    }

    fn emit_summary(&self) {
        let finished = self.state.finished_count();
        let errored = self.state.errored_count();
        let retained = self.state.retained_count();
        self.ctx.write_event(&SchedulerEvent::new(
            self.run,
            EventKind::RunFinished {
                dispatched: self.dispatched,
                finished,
                errored,
                retained,
            },
        ));
        log::info!(
            "run {} finished: dispatched={}, finished={finished}, errored={errored}, retained={retained}",
            self.run,
            self.dispatched
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{as_i64, constant, failing, inc};
    use serde_json::json;
    use std::sync::OnceLock;
    use thunkflow_core::descriptor::ProcessorKind;
    use thunkflow_core::options::ProcList;
    use thunkflow_core::result::THUNK_ERROR_SELECTION;

    fn ctx() -> Context {
        Context::with_local_threads(2)
    }

    #[tokio::test]
    async fn test_linear_chain() {
        let a = Arc::new(Thunk::new(constant(1), vec![]));
        let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
        let c = Thunk::builder(ThunkFunc::pure("double", |args| {
            Ok(ValueRef::new(json!(args[0].value().as_i64().unwrap_or(0) * 2)))
        }))
        .thunk_arg(&b)
        .build();

        let result = compute(&ctx(), c, ComputeOptions::default()).await.unwrap();
        assert_eq!(as_i64(&result), 4);
    }

    #[tokio::test]
    async fn test_diamond() {
        let a = Arc::new(Thunk::new(constant(10), vec![]));
        let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
        let c = Arc::new(
            Thunk::builder(ThunkFunc::pure("add_two", |args| {
                Ok(ValueRef::new(json!(args[0].value().as_i64().unwrap_or(0) + 2)))
            }))
            .thunk_arg(&a)
            .build(),
        );
        let d = Thunk::builder(ThunkFunc::pure("mul", |args| {
            let x = args[0].value().as_i64().unwrap_or(0);
            let y = args[1].value().as_i64().unwrap_or(0);
            Ok(ValueRef::new(json!(x * y)))
        }))
        .thunk_arg(&b)
        .thunk_arg(&c)
        .build();

        let result = compute(&ctx(), d, ComputeOptions::default()).await.unwrap();
        assert_eq!(as_i64(&result), 132);
    }

    #[tokio::test]
    async fn test_determinism_across_capacities() {
        for capacity in [1, 4] {
            let a = Arc::new(Thunk::new(constant(10), vec![]));
            let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
            let c = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
            let d = Thunk::builder(ThunkFunc::pure("mul", |args| {
                let x = args[0].value().as_i64().unwrap_or(0);
                let y = args[1].value().as_i64().unwrap_or(0);
                Ok(ValueRef::new(json!(x * y)))
            }))
            .thunk_arg(&b)
            .thunk_arg(&c)
            .build();

            let result = compute(
                &Context::with_local_threads(4),
                d,
                ComputeOptions {
                    capacity: Some(capacity),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
            assert_eq!(as_i64(&result), 121, "capacity {capacity}");
        }
    }

    #[tokio::test]
    async fn test_failure_propagates_with_origin() {
        let a = Arc::new(Thunk::new(failing("x"), vec![]));
        let b = Arc::new(Thunk::builder(inc()).thunk_arg(&a).build());
        let c = Thunk::builder(inc()).thunk_arg(&b).build();
        let c_id = c.id();

        let error = compute(&ctx(), c, ComputeOptions::default())
            .await
            .unwrap_err();
        match error.current_context() {
            SchedulerError::Failed(failed) => {
                assert_eq!(failed.origin, a.id());
                assert_eq!(failed.thunk, c_id);
                assert!(failed.error.message.contains('x'));
            }
            other => panic!("expected thunk failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_dynamic_add_and_fetch() {
        let root = Thunk::new(
            ThunkFunc::new("dynamic", |api, _args| async move {
                let id = api
                    .add_thunk(constant(7), Vec::new(), ThunkOptions::default())
                    .await?;
                let value = api.fetch(id).await?;
                Ok(value)
            }),
            vec![],
        );

        let result = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(as_i64(&result), 7);
    }

    #[tokio::test]
    async fn test_dynamic_add_with_thunk_reference() {
        let a = Arc::new(Thunk::new(constant(10), vec![]));
        let a_id = a.id();
        let root = Thunk::builder(ThunkFunc::new("extend", move |api, _args| async move {
            let id = api
                .add_thunk(
                    inc(),
                    vec![DynamicInput::Thunk(a_id)],
                    ThunkOptions::default(),
                )
                .await?;
            api.fetch(id).await.map_err(Into::into)
        }))
        .thunk_arg(&a)
        .build();

        let result = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(as_i64(&result), 11);
    }

    #[tokio::test]
    async fn test_wait_and_dag_ids() {
        let root = Thunk::new(
            ThunkFunc::new("inspect", |api, _args| async move {
                let id = api
                    .add_thunk(constant(1), Vec::new(), ThunkOptions::default())
                    .await?;
                api.wait(id).await?;
                let dag = api.dag_ids().await?;
                // Root and the added thunk are both known.
                Ok(ValueRef::new(json!(dag.len())))
            }),
            vec![],
        );

        let result = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(as_i64(&result), 2);
    }

    #[tokio::test]
    async fn test_halt_surfaces_and_resolves_futures() {
        let root = Thunk::new(
            ThunkFunc::new("halter", |api, _args| async move {
                api.halt().await?;
                Ok(ValueRef::default())
            }),
            vec![],
        );

        let error = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            error.current_context(),
            SchedulerError::Halted
        ));
    }

    #[tokio::test]
    async fn test_selection_exhausted_reports_survey() {
        let root = Thunk::builder(constant(1))
            .proclist(ProcList::Kinds(vec![ProcessorKind::new("gpu")]))
            .build();

        let error = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap_err();
        match error.current_context() {
            SchedulerError::Failed(failed) => {
                assert_eq!(failed.error.code, THUNK_ERROR_SELECTION);
                assert!(failed.error.message.contains("thread"));
            }
            other => panic!("expected selection failure, got {other}"),
        }
    }

    #[tokio::test]
    async fn test_dominator_guard_on_fetch() {
        // a's function fetches its own consumer: the guard must fail the
        // command instead of deadlocking the run.
        let consumer_id: Arc<OnceLock<ThunkId>> = Arc::new(OnceLock::new());
        let shared = consumer_id.clone();
        let a = Arc::new(Thunk::new(
            ThunkFunc::new("greedy", move |api, _args| {
                let shared = shared.clone();
                async move {
                    let target = *shared.get().expect("consumer id set before run");
                    match api.fetch(target).await {
                        Err(ControlError::DominatorViolation { .. }) => {
                            Ok(ValueRef::new(json!(1)))
                        }
                        Ok(_) => Err(ThunkError::message("fetch unexpectedly succeeded")),
                        Err(other) => Err(other.into()),
                    }
                }
            }),
            vec![],
        ));
        let root = Thunk::builder(inc()).thunk_arg(&a).build();
        consumer_id.set(root.id()).expect("unset");

        let result = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(as_i64(&result), 2);
    }

    #[tokio::test]
    async fn test_meta_passes_chunks_unmoved() {
        let a = Arc::new(Thunk::new(constant(5), vec![]));
        let meta_root = Thunk::builder(ThunkFunc::new("inspect_meta", |_api, args| async move {
            Ok(ValueRef::new(json!(args[0].chunk().is_some())))
        }))
        .thunk_arg(&a)
        .meta(true)
        .build();
        let result = compute(&ctx(), meta_root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(result.value(), &json!(true));

        let b = Arc::new(Thunk::new(constant(5), vec![]));
        let plain_root = Thunk::builder(ThunkFunc::new("inspect_plain", |_api, args| async move {
            Ok(ValueRef::new(json!(args[0].chunk().is_some())))
        }))
        .thunk_arg(&b)
        .build();
        let result = compute(&ctx(), plain_root, ComputeOptions::default())
            .await
            .unwrap();
        assert_eq!(result.value(), &json!(false));
    }

    #[tokio::test]
    async fn test_single_pin_to_unknown_process_fails_selection() {
        let root = Thunk::builder(constant(1))
            .single(thunkflow_core::descriptor::ProcessId::new(9))
            .build();
        let error = compute(&ctx(), root, ComputeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(
            error.current_context(),
            SchedulerError::Failed(failed) if failed.error.code == THUNK_ERROR_SELECTION
        ));
    }

    #[tokio::test]
    async fn test_compute_options_override_root_options() {
        let root = Thunk::new(constant(3), vec![]);
        let error = compute(
            &ctx(),
            root,
            ComputeOptions {
                options: Some(ThunkOptions {
                    proclist: ProcList::Kinds(vec![ProcessorKind::new("gpu")]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            error.current_context(),
            SchedulerError::Failed(failed) if failed.error.code == THUNK_ERROR_SELECTION
        ));
    }
}
