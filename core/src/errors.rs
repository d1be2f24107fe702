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

//! Common errors and macros.

use arrow::error::ArrowError;
use datafusion::common::DataFusionError;

use std::result;

#[derive(thiserror::Error, Debug)]
pub enum CometError {
    /// Invalid input or limits supplied by the caller. Never retried.
    #[error("Configuration Error: {0}")]
    Config(String),

    /// A broken invariant inside the crate, e.g. a row count that does not add up.
    #[error("Comet Internal Error: {0}")]
    Internal(String),

    /// The memory pool (or the allocator) refused to hold a result of the attempted size.
    /// Recovered by retrying the work in smaller pieces.
    #[error("Resources exhausted: {0}")]
    ResourcesExhausted(String),

    /// Resources were still exhausted when the work could not be split any further.
    #[error("Cannot split {rows} row(s) any further: {msg}")]
    Irreducible { rows: usize, msg: String },

    #[error(transparent)]
    Arrow {
        #[from]
        source: ArrowError,
    },

    #[error("{msg}")]
    DataFusion {
        msg: String,
        #[source]
        source: DataFusionError,
    },
}

impl CometError {
    /// Whether the failed work may succeed if it is retried with less data.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CometError::ResourcesExhausted(_))
    }

    /// Classifies an arrow error, treating allocation failures as transient.
    pub(crate) fn from_arrow(err: ArrowError) -> Self {
        match err {
            ArrowError::MemoryError(msg) => CometError::ResourcesExhausted(msg),
            other => CometError::Arrow { source: other },
        }
    }
}

impl From<DataFusionError> for CometError {
    fn from(value: DataFusionError) -> Self {
        // The memory pool reports refusals as `ResourcesExhausted`, possibly wrapped in context
        match value.find_root() {
            DataFusionError::ResourcesExhausted(msg) => {
                return CometError::ResourcesExhausted(msg.clone())
            }
            // allocation failures while building arrays
            DataFusionError::ArrowError(err, _) => {
                if let ArrowError::MemoryError(msg) = err.as_ref() {
                    return CometError::ResourcesExhausted(msg.clone());
                }
            }
            _ => {}
        }
        CometError::DataFusion {
            msg: value.message().to_string(),
            source: value,
        }
    }
}

impl From<CometError> for DataFusionError {
    fn from(value: CometError) -> Self {
        match value {
            CometError::DataFusion { msg: _, source } => source,
            CometError::ResourcesExhausted(msg) => DataFusionError::ResourcesExhausted(msg),
            CometError::Arrow { source } => DataFusionError::ArrowError(Box::new(source), None),
            _ => DataFusionError::Execution(value.to_string()),
        }
    }
}

/// A specialized `Result` for Comet errors.
pub type CometResult<T> = result::Result<T, CometError>;

// ----------------------------------------------------------------------
// Convenient macros for different errors

macro_rules! config_err {
    ($($args:tt)*) => {
        crate::errors::CometError::Config(format!($($args)*))
    };
}

macro_rules! internal_err {
    ($($args:tt)*) => {
        crate::errors::CometError::Internal(format!($($args)*))
    };
}
