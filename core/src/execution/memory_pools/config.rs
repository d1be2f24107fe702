// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

use std::collections::HashMap;

use crate::errors::{CometError, CometResult};

/// Config key for the kind of memory pool backing the merge reservations.
pub const MEMORY_POOL_TYPE_KEY: &str = "memory_pool_type";
/// Config key for the pool size in bytes.
pub const MEMORY_LIMIT_KEY: &str = "memory_limit";
/// Config key enabling logging of every reservation change.
pub const DEBUG_MEMORY_KEY: &str = "debug_memory";

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MemoryPoolType {
    Greedy,
    FairSpill,
    Unbounded,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemoryPoolConfig {
    pub pool_type: MemoryPoolType,
    pub pool_size: usize,
    /// Wrap the pool so that every grow and shrink is logged
    pub debug: bool,
}

impl MemoryPoolConfig {
    pub fn new(pool_type: MemoryPoolType, pool_size: usize) -> Self {
        Self {
            pool_type,
            pool_size,
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }
}

impl Default for MemoryPoolConfig {
    fn default() -> Self {
        Self::new(MemoryPoolType::Unbounded, 0)
    }
}

/// Parses the memory pool settings out of a flat config map.
///
/// Bounded pools (`greedy`, `fair_spill`) require `memory_limit`. When no pool type is set,
/// a `greedy` pool is used if a limit is present and an unbounded pool otherwise.
pub fn parse_memory_pool_config(conf: &HashMap<String, String>) -> CometResult<MemoryPoolConfig> {
    let memory_limit = conf
        .get(MEMORY_LIMIT_KEY)
        .map(|v| {
            v.parse::<usize>().map_err(|e| {
                CometError::Config(format!("Failed to parse config {MEMORY_LIMIT_KEY}: {e}"))
            })
        })
        .transpose()?;

    let default_type = if memory_limit.is_some() {
        "greedy"
    } else {
        "unbounded"
    };
    let memory_pool_type = conf
        .get(MEMORY_POOL_TYPE_KEY)
        .map(String::as_str)
        .unwrap_or(default_type);

    let bounded = |pool_type: MemoryPoolType| -> CometResult<MemoryPoolConfig> {
        match memory_limit {
            Some(limit) if limit > 0 => Ok(MemoryPoolConfig::new(pool_type, limit)),
            _ => Err(CometError::Config(format!(
                "Memory pool type {memory_pool_type} requires a positive {MEMORY_LIMIT_KEY}"
            ))),
        }
    };

    let memory_pool_config = match memory_pool_type {
        "default" | "greedy" => bounded(MemoryPoolType::Greedy)?,
        "fair_spill" => bounded(MemoryPoolType::FairSpill)?,
        "unbounded" => MemoryPoolConfig::new(MemoryPoolType::Unbounded, 0),
        _ => {
            return Err(CometError::Config(format!(
                "Unsupported memory pool type: {memory_pool_type}"
            )))
        }
    };
    Ok(memory_pool_config.with_debug(parse_bool(conf, DEBUG_MEMORY_KEY)?))
}

pub(crate) fn parse_bool(conf: &HashMap<String, String>, name: &str) -> CometResult<bool> {
    conf.get(name)
        .map(String::as_str)
        .unwrap_or("false")
        .parse::<bool>()
        .map_err(|e| CometError::Config(format!("Failed to parse boolean config {name}: {e}")))
}
