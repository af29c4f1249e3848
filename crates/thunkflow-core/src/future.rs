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

//! One-shot result delivery slots.
//!
//! A [`ThunkFuture`] is the awaiting half of a registration against a thunk's
//! completion; the scheduler keeps the matching [`ThunkSlot`] and delivers
//! exactly once at fan-out. Multiple futures may be registered against the
//! same thunk; all receive the same payload.

use tokio::sync::oneshot;

use crate::api::ControlError;
use crate::result::ThunkFailed;
use crate::thunk::ThunkId;
use crate::values::ValueRef;

/// What a future is fulfilled with: the thunk's value, or its failure.
pub type ThunkPayload = Result<ValueRef, ThunkFailed>;

/// Create a connected slot/future pair for the given target thunk.
pub fn thunk_future(target: ThunkId) -> (ThunkSlot, ThunkFuture) {
    let (tx, rx) = oneshot::channel();
    (ThunkSlot { target, tx }, ThunkFuture { target, rx })
}

/// The delivering half, held by the scheduler until the target completes.
///
/// Dropping the slot without delivering resolves the future with a halted
/// indication; this is how pending futures are resolved when the scheduler
/// halts.
#[derive(Debug)]
pub struct ThunkSlot {
    target: ThunkId,
    tx: oneshot::Sender<ThunkPayload>,
}

impl ThunkSlot {
    pub fn target(&self) -> ThunkId {
        self.target
    }

    /// Deliver the payload. A receiver that has gone away is ignored.
    pub fn deliver(self, payload: ThunkPayload) {
        let _ = self.tx.send(payload);
    }
}

/// The awaiting half of a registration against a thunk's completion.
#[derive(Debug)]
pub struct ThunkFuture {
    target: ThunkId,
    rx: oneshot::Receiver<ThunkPayload>,
}

impl ThunkFuture {
    pub fn target(&self) -> ThunkId {
        self.target
    }

    /// Await delivery and return the value; a failure payload or an
    /// abandoned slot surface as errors.
    pub async fn fetch(self) -> Result<ValueRef, ControlError> {
        match self.rx.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failed)) => Err(ControlError::Failed(failed)),
            Err(_) => Err(ControlError::Halted),
        }
    }

    /// Await completion, discarding the value.
    pub async fn wait(self) -> Result<(), ControlError> {
        self.fetch().await.map(|_| ())
    }
}
