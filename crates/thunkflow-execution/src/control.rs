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

//! The worker/scheduler control plane.
//!
//! Each worker has a channel pair: an inbound channel carrying
//! [`ControlRequest`]s to the scheduler, and, per request, a one-shot reply
//! slot realizing the outbound direction. A listener task per worker forwards
//! inbound requests onto the scheduler loop, which processes them in arrival
//! order - so commands from one worker are handled and answered in FIFO
//! order, while ordering across workers is undefined.
//!
//! [`SchHandle`] is the [`SchedulerApi`] implementation bound to each
//! executing thunk.

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use thunkflow_core::api::{ControlError, DagIds, DynamicInput, SchedulerApi};
use thunkflow_core::descriptor::ProcessId;
use thunkflow_core::func::ThunkFunc;
use thunkflow_core::future::ThunkFuture;
use thunkflow_core::options::ThunkOptions;
use thunkflow_core::thunk::ThunkId;
use thunkflow_core::values::ValueRef;

/// A command sent from a worker to the scheduler.
#[derive(Debug)]
pub(crate) enum ControlCommand {
    /// Set the halt latch and wake the loop with a synthetic completion.
    Halt,
    /// Register a one-shot future for the target's result.
    RegisterFuture { target: ThunkId },
    /// Add a thunk to the running DAG.
    AddThunk {
        func: ThunkFunc,
        inputs: Vec<DynamicInput>,
        options: ThunkOptions,
    },
    /// Snapshot the DAG as id -> direct dependents.
    GetDagIds,
}

/// A successful control reply.
#[derive(Debug)]
pub(crate) enum ControlReply {
    Unit,
    Added(ThunkId),
    Future(ThunkFuture),
    Dag(DagIds),
}

/// A control command plus its reply slot, as carried on a worker's inbound
/// channel.
#[derive(Debug)]
pub(crate) struct ControlRequest {
    /// The thunk the command was issued from.
    pub from: ThunkId,
    pub command: ControlCommand,
    pub reply: oneshot::Sender<Result<ControlReply, ControlError>>,
}

/// Spawn the listener task for one worker channel pair.
///
/// The task reads the worker's inbound channel until it closes and forwards
/// each request to the scheduler loop. A closed scheduler side is a
/// halt-class condition and is observed silently.
pub(crate) fn spawn_worker_listener(
    process: ProcessId,
    mut inbound: mpsc::UnboundedReceiver<ControlRequest>,
    scheduler: mpsc::UnboundedSender<ControlRequest>,
) {
    tokio::spawn(async move {
        while let Some(request) = inbound.recv().await {
            if scheduler.send(request).is_err() {
                log::debug!("control listener for {process} exiting: scheduler is gone");
                return;
            }
        }
        log::trace!("control listener for {process} exiting: worker channel closed");
    });
}

/// The scheduler handle bound to one executing thunk.
///
/// Cloning is cheap; the handle is the thunk's id plus the worker's inbound
/// channel endpoint.
#[derive(Clone)]
pub(crate) struct SchHandle {
    thunk: ThunkId,
    inbound: mpsc::UnboundedSender<ControlRequest>,
}

impl SchHandle {
    pub fn new(thunk: ThunkId, inbound: mpsc::UnboundedSender<ControlRequest>) -> Self {
        Self { thunk, inbound }
    }

    /// Submit a command and await its reply.
    ///
    /// A closed channel in either direction reads as [`ControlError::Halted`].
    async fn exec(&self, command: ControlCommand) -> Result<ControlReply, ControlError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.inbound
            .send(ControlRequest {
                from: self.thunk,
                command,
                reply: reply_tx,
            })
            .map_err(|_| ControlError::Halted)?;
        reply_rx.await.map_err(|_| ControlError::Halted)?
    }
}

#[async_trait]
impl SchedulerApi for SchHandle {
    fn thunk_id(&self) -> ThunkId {
        self.thunk
    }

    async fn add_thunk(
        &self,
        func: ThunkFunc,
        inputs: Vec<DynamicInput>,
        options: ThunkOptions,
    ) -> Result<ThunkId, ControlError> {
        match self
            .exec(ControlCommand::AddThunk {
                func,
                inputs,
                options,
            })
            .await?
        {
            ControlReply::Added(id) => Ok(id),
            reply => Err(ControlError::Handler(format!(
                "unexpected reply to add_thunk: {reply:?}"
            ))),
        }
    }

    async fn register_future(&self, target: ThunkId) -> Result<ThunkFuture, ControlError> {
        match self.exec(ControlCommand::RegisterFuture { target }).await? {
            ControlReply::Future(future) => Ok(future),
            reply => Err(ControlError::Handler(format!(
                "unexpected reply to register_future: {reply:?}"
            ))),
        }
    }

    async fn fetch(&self, target: ThunkId) -> Result<ValueRef, ControlError> {
        self.register_future(target).await?.fetch().await
    }

    async fn wait(&self, target: ThunkId) -> Result<(), ControlError> {
        self.register_future(target).await?.wait().await
    }

    async fn halt(&self) -> Result<(), ControlError> {
        self.exec(ControlCommand::Halt).await.map(|_| ())
    }

    async fn dag_ids(&self) -> Result<DagIds, ControlError> {
        match self.exec(ControlCommand::GetDagIds).await? {
            ControlReply::Dag(dag) => Ok(dag),
            reply => Err(ControlError::Handler(format!(
                "unexpected reply to dag_ids: {reply:?}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_handle_reads_closed_channel_as_halted() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let handle = SchHandle::new(ThunkId::fresh(), tx);
        assert_eq!(handle.halt().await, Err(ControlError::Halted));
    }

    #[tokio::test]
    async fn test_listener_forwards_in_order() {
        let (worker_tx, worker_rx) = mpsc::unbounded_channel();
        let (sched_tx, mut sched_rx) = mpsc::unbounded_channel();
        spawn_worker_listener(ProcessId::local(), worker_rx, sched_tx);

        let thunk = ThunkId::fresh();
        for _ in 0..3 {
            let (reply, _rx) = oneshot::channel();
            worker_tx
                .send(ControlRequest {
                    from: thunk,
                    command: ControlCommand::GetDagIds,
                    reply,
                })
                .unwrap();
        }
        for _ in 0..3 {
            let forwarded = sched_rx.recv().await.unwrap();
            assert_eq!(forwarded.from, thunk);
        }
    }
}
