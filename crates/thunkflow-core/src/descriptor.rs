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

//! Processor identity and descriptors.
//!
//! Processors form a tree per cluster process: a root "process" processor
//! enumerates child processors (threads, accelerators). The scheduling kernel
//! never holds processor trait objects in its state; it works with the value
//! types here, which are comparable and transportable across the cluster.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Identifier of a process in the cluster fabric.
///
/// The in-process fabric used by tests and single-machine runs has a single
/// process whose id is [`ProcessId::local`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u32);

impl ProcessId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// The id of the current process, as reported by the fabric.
    pub const fn local() -> Self {
        Self(1)
    }

    pub const fn id(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Identifier of a single processor: the owning process plus a process-local
/// index assigned by the processor tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessorId {
    pub process: ProcessId,
    pub local: u32,
}

impl ProcessorId {
    pub const fn new(process: ProcessId, local: u32) -> Self {
        Self { process, local }
    }
}

impl std::fmt::Display for ProcessorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.process, self.local)
    }
}

/// The kind of a processor ("process", "thread", or a third-party kind).
///
/// Kinds are open-ended: plug-in processors introduce their own kind strings,
/// and thunk options may restrict dispatch to a list of kinds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessorKind(Cow<'static, str>);

impl ProcessorKind {
    pub const PROCESS: ProcessorKind = ProcessorKind(Cow::Borrowed("process"));
    pub const THREAD: ProcessorKind = ProcessorKind(Cow::Borrowed("thread"));

    pub fn new(kind: impl Into<Cow<'static, str>>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ProcessorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value-level description of a processor.
///
/// Descriptors are what selection surveys, what errors report, and what
/// predicates in [`crate::options::ProcList`] inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorDescriptor {
    pub id: ProcessorId,
    pub kind: ProcessorKind,
    /// Whether this processor participates in dispatch when the thunk does
    /// not restrict processor kinds (opt-out semantics).
    pub default_enabled: bool,
}

impl std::fmt::Display for ProcessorDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}
