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

//! Per-process cache of flattened processor trees.
//!
//! Flattening a processor tree into leaves walks `children()` recursively,
//! which third-party processors may make expensive (device enumeration,
//! remote calls). The cache memoizes the flattening per root processor and
//! is torn down whenever the processor registration changes.

use std::sync::{Arc, LazyLock};

use dashmap::DashMap;
use thunkflow_core::descriptor::ProcessorId;

use crate::processor::{Processor, leaves};

static PROCESSOR_CACHE: LazyLock<DashMap<ProcessorId, Arc<Vec<Arc<dyn Processor>>>>> =
    LazyLock::new(DashMap::new);

/// The leaves of `root`, memoized per root processor id.
pub fn cached_leaves(root: &Arc<dyn Processor>) -> Arc<Vec<Arc<dyn Processor>>> {
    let key = root.descriptor().id;
    if let Some(cached) = PROCESSOR_CACHE.get(&key) {
        return cached.value().clone();
    }
    let flattened = Arc::new(leaves(root.clone()));
    PROCESSOR_CACHE.insert(key, flattened.clone());
    flattened
}

/// Tear the cache down. Invoked when processor registration changes.
pub fn clear_processor_cache() {
    PROCESSOR_CACHE.clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::ProcessNode;
    use thunkflow_core::descriptor::ProcessId;

    #[test]
    fn test_cache_roundtrip() {
        clear_processor_cache();
        let root: Arc<dyn Processor> = Arc::new(ProcessNode::with_threads(ProcessId::local(), 2));
        let first = cached_leaves(&root);
        let second = cached_leaves(&root);
        assert_eq!(first.len(), 2);
        // Second lookup returns the memoized flattening.
        assert!(Arc::ptr_eq(&first, &second));

        clear_processor_cache();
        let third = cached_leaves(&root);
        assert!(!Arc::ptr_eq(&first, &third));
    }
}
