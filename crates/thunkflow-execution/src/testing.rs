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

//! Shared helpers for kernel tests.

use serde_json::json;
use thunkflow_core::func::ThunkFunc;
use thunkflow_core::result::ThunkError;
use thunkflow_core::values::ValueRef;

/// A function producing a constant integer.
pub(crate) fn constant(value: i64) -> ThunkFunc {
    ThunkFunc::pure("constant", move |_| Ok(ValueRef::new(json!(value))))
}

/// A function adding one to its first argument.
pub(crate) fn inc() -> ThunkFunc {
    ThunkFunc::pure("inc", |args| {
        let x = args
            .first()
            .and_then(|v| v.value().as_i64())
            .ok_or_else(|| ThunkError::message("inc expects an integer argument"))?;
        Ok(ValueRef::new(json!(x + 1)))
    })
}

/// A function that always fails with the given message.
pub(crate) fn failing(message: &'static str) -> ThunkFunc {
    ThunkFunc::pure("failing", move |_| Err(ThunkError::message(message)))
}

pub(crate) fn as_i64(value: &ValueRef) -> i64 {
    value.value().as_i64().expect("integer result")
}
