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

//! Thunk functions and invocation arguments.
//!
//! A [`ThunkFunc`] is a named, type-erased async function. It receives the
//! scheduler handle (so dynamic thunks can add work, fetch results, or halt)
//! and the resolved arguments, and produces a value or raises a
//! [`ThunkError`](crate::result::ThunkError).

use std::borrow::Cow;
use std::sync::Arc;

use futures::FutureExt as _;
use futures::future::BoxFuture;

use crate::api::SchedulerApi;
use crate::chunk::Chunk;
use crate::result::ThunkError;
use crate::values::ValueRef;

/// The outcome of invoking a thunk's function.
pub type ThunkOutput = Result<ValueRef, ThunkError>;

type ThunkFnInner =
    dyn Fn(Arc<dyn SchedulerApi>, Vec<ThunkArg>) -> BoxFuture<'static, ThunkOutput> + Send + Sync;

/// An argument handed to a worker invocation.
///
/// Literal inputs and moved results arrive as `Inline`; when the thunk's
/// `meta` option is set, upstream results arrive as un-moved `Chunk`s.
#[derive(Debug, Clone)]
pub enum ThunkArg {
    Inline(ValueRef),
    Chunk(Chunk),
}

impl ThunkArg {
    /// The argument's value. For chunk arguments this reads the chunk's
    /// payload without recording a move.
    pub fn value(&self) -> &ValueRef {
        match self {
            Self::Inline(value) => value,
            Self::Chunk(chunk) => &chunk.value,
        }
    }

    pub fn into_value(self) -> ValueRef {
        match self {
            Self::Inline(value) => value,
            Self::Chunk(chunk) => chunk.value,
        }
    }

    pub fn chunk(&self) -> Option<&Chunk> {
        match self {
            Self::Inline(_) => None,
            Self::Chunk(chunk) => Some(chunk),
        }
    }
}

/// A named, type-erased async thunk function.
///
/// Cloning is cheap; the closure is shared behind an `Arc`.
#[derive(Clone)]
pub struct ThunkFunc {
    name: Cow<'static, str>,
    f: Arc<ThunkFnInner>,
}

impl ThunkFunc {
    /// Create a function that receives the scheduler handle.
    ///
    /// This is the full form used by dynamic thunks. Functions that do not
    /// talk back to the scheduler are simpler to write with [`pure`](Self::pure).
    pub fn new<F, Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Arc<dyn SchedulerApi>, Vec<ThunkArg>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ThunkOutput> + Send + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |api, args| f(api, args).boxed()),
        }
    }

    /// Create a function from a plain value function.
    ///
    /// The scheduler handle is ignored and chunk arguments are unwrapped to
    /// their values.
    pub fn pure<F>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(&[ValueRef]) -> ThunkOutput + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            f: Arc::new(move |_api, args| {
                let values: Vec<ValueRef> = args.into_iter().map(ThunkArg::into_value).collect();
                futures::future::ready(f(&values)).boxed()
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Invoke the function with the given handle and arguments.
    pub fn invoke(
        &self,
        api: Arc<dyn SchedulerApi>,
        args: Vec<ThunkArg>,
    ) -> BoxFuture<'static, ThunkOutput> {
        (self.f)(api, args)
    }
}

impl std::fmt::Debug for ThunkFunc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThunkFunc")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pure_unwraps_args() {
        let func = ThunkFunc::pure("sum", |args| {
            let total: i64 = args.iter().filter_map(|v| v.value().as_i64()).sum();
            Ok(ValueRef::new(json!(total)))
        });
        assert_eq!(func.name(), "sum");

        let args = vec![
            ThunkArg::Inline(ValueRef::new(json!(1))),
            ThunkArg::Inline(ValueRef::new(json!(2))),
        ];
        let api = crate::api::testing::noop_api();
        let result = futures::executor::block_on(func.invoke(api, args)).unwrap();
        assert_eq!(result.value(), &json!(3));
    }

    #[test]
    fn test_arg_value_reads_chunk_payload() {
        use crate::descriptor::{ProcessId, ProcessorId};

        let chunk = Chunk::new(
            ProcessorId::new(ProcessId::local(), 0),
            ValueRef::new(json!("payload")),
        );
        let arg = ThunkArg::Chunk(chunk);
        assert_eq!(arg.value().value(), &json!("payload"));
        assert!(arg.chunk().is_some());
    }
}
