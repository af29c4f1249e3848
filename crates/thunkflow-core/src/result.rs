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

//! Thunk results and failures.
//!
//! A thunk's function either produces a [`ValueRef`] or raises a
//! [`ThunkError`]. The scheduler records failures as [`ThunkFailed`] entries
//! that remember the origin thunk, and propagates them along the DAG's
//! dependent edges. The cache maps every completed thunk to a [`CacheEntry`].

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::thunk::ThunkId;
use crate::values::ValueRef;

/// Error code for a failure raised by a user function.
pub const THUNK_ERROR_USER: i64 = 1;
/// Error code for processor selection exhaustion.
pub const THUNK_ERROR_SELECTION: i64 = 2;
/// Error code for a processor that cannot execute thunks directly.
pub const THUNK_ERROR_NOT_EXECUTABLE: i64 = 3;

/// An error raised from within a thunk's function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThunkError {
    pub code: i64,
    pub message: Cow<'static, str>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<ValueRef>,
}

impl ThunkError {
    pub fn new(code: i64, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// A user failure with the default code.
    pub fn message(message: impl Into<Cow<'static, str>>) -> Self {
        Self::new(THUNK_ERROR_USER, message)
    }

    pub fn with_data<D: Serialize>(self, data: D) -> Result<Self, serde_json::Error> {
        let data = serde_json::to_value(data)?.into();
        Ok(Self {
            data: Some(data),
            ..self
        })
    }
}

impl std::fmt::Display for ThunkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "error({}): {}", self.code, self.message)
    }
}

impl std::error::Error for ThunkError {}

/// The failure record stored for an errored thunk.
///
/// `origin` is the thunk whose function actually raised; for thunks failed by
/// propagation it differs from `thunk`. The error payload is shared by the
/// whole downstream cone of the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThunkFailed {
    pub thunk: ThunkId,
    pub origin: ThunkId,
    pub error: ThunkError,
}

impl ThunkFailed {
    pub fn new(thunk: ThunkId, origin: ThunkId, error: ThunkError) -> Self {
        Self {
            thunk,
            origin,
            error,
        }
    }

    /// Re-root this failure onto a downstream thunk, keeping the origin.
    pub fn propagate_to(&self, thunk: ThunkId) -> Self {
        Self {
            thunk,
            origin: self.origin,
            error: self.error.clone(),
        }
    }
}

impl std::fmt::Display for ThunkFailed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.thunk == self.origin {
            write!(f, "thunk {} failed: {}", self.thunk, self.error)
        } else {
            write!(
                f,
                "thunk {} failed (origin {}): {}",
                self.thunk, self.origin, self.error
            )
        }
    }
}

impl std::error::Error for ThunkFailed {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// A completed thunk's cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    /// The result value, held by the scheduler itself.
    Inline(ValueRef),
    /// A reference to the result on the processor that produced it.
    Chunk(Chunk),
    /// The thunk failed (directly or by propagation).
    Failed(ThunkFailed),
}

impl CacheEntry {
    /// The result value, if the thunk succeeded.
    pub fn value(&self) -> Option<&ValueRef> {
        match self {
            Self::Inline(value) => Some(value),
            Self::Chunk(chunk) => Some(&chunk.value),
            Self::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&ThunkFailed> {
        match self {
            Self::Failed(failed) => Some(failed),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
