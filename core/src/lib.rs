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

//! Attaches replicated partition value columns to scanned batches without letting any
//! single column grow past the size a native column can address.
//!
//! Entry points are [`add_partition_values`] and [`add_single_partition_value`], which
//! return a lazy [`PartitionValuesIterator`] of output batches.

// The clippy throws an error if the reference clone not wrapped into `Arc::clone`
// The lint makes easier for code reader/reviewer separate references clones from more heavyweight ones
#![deny(clippy::clone_on_ref_ptr)]

use log::{info, LevelFilter};
use log4rs::{
    append::console::{ConsoleAppender, Target},
    config::{load_config_file, Appender, Deserializers, Root},
    encode::pattern::PatternEncoder,
    Config,
};

#[macro_use]
mod errors;
pub mod execution;

pub use errors::{CometError, CometResult};
pub use execution::memory_pools::{create_memory_pool, MemoryPoolConfig, MemoryPoolType};
pub use execution::partition_values::{
    add_partition_values, add_single_partition_value, BatchWithPartitionData, HalveByRows,
    MergeOutcome, PartitionRowData, PartitionValuesConfig, PartitionValuesIterator,
    SpillableBatch, SplitPolicy, PLATFORM_MAX_COLUMN_SIZE_BYTES,
};

/// Initializes logging. An empty `log_conf_path` installs the default console logger,
/// otherwise the log4rs configuration file at that path is loaded.
pub fn init_logging(log_conf_path: &str) -> CometResult<()> {
    let log_config = if log_conf_path.is_empty() {
        default_logger_config()
    } else {
        load_config_file(log_conf_path, Deserializers::default())
            .map_err(|err| CometError::Config(err.to_string()))
    };

    log4rs::init_config(log_config?).map_err(|err| CometError::Config(err.to_string()))?;

    info!(
        "Comet partition values library version {} initialized",
        env!("CARGO_PKG_VERSION")
    );
    Ok(())
}

const LOG_PATTERN: &str = "{d(%y/%m/%d %H:%M:%S)} {l} {f}: {m}{n}";

// Creates a default log4rs config, which logs to console with `INFO` level.
fn default_logger_config() -> CometResult<Config> {
    let console_append = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(LOG_PATTERN)))
        .build();
    let appender = Appender::builder().build("console", Box::new(console_append));
    let root = Root::builder().appender("console").build(LevelFilter::Info);
    Config::builder()
        .appender(appender)
        .build(root)
        .map_err(|err| CometError::Config(err.to_string()))
}
