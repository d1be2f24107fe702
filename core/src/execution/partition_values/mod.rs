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

//! Appends partition value columns to scanned batches.
//!
//! A scanned batch arrives together with a list of partition rows, each one a set of
//! partition values and the number of consecutive batch rows they apply to. The rows are
//! planned into groups whose replicated partition columns stay under the column size
//! limit, the batch is cut along the group boundaries, and every piece is merged lazily
//! when the consumer pulls the next output batch.

mod batch;
mod iterator;
mod metrics;
mod planner;
mod row_data;
mod size;
mod spillable;
mod split;
mod splitter;

use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::RecordBatch;
use arrow::datatypes::{Field, Schema, SchemaRef};
use datafusion::common::ScalarValue;
use datafusion::execution::memory_pool::MemoryPool;
use log::debug;

pub use batch::{BatchWithPartitionData, MergeOutcome};
pub use iterator::PartitionValuesIterator;
pub use row_data::{PartitionGroup, PartitionRowData};
pub use size::{estimate_partition_bytes, max_rows_fitting, value_byte_cost};
pub use spillable::SpillableBatch;
pub use split::{HalveByRows, SplitPolicy};

use crate::errors::CometResult;
use planner::plan_groups;
use splitter::split_batch_by_groups;

/// Largest number of bytes a single variable width column may hold. Offsets of the
/// default string and binary layouts are 32-bit signed integers.
pub const PLATFORM_MAX_COLUMN_SIZE_BYTES: usize = i32::MAX as usize;

pub const MAX_COLUMN_SIZE_BYTES_KEY: &str = "partition_values.max_column_size_bytes";

/// Limits applied when building partition columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartitionValuesConfig {
    max_column_size_bytes: Option<usize>,
}

impl PartitionValuesConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers the column size limit below [`PLATFORM_MAX_COLUMN_SIZE_BYTES`]. Larger
    /// values are capped at the platform maximum.
    pub fn with_max_column_size_bytes(mut self, max_column_size_bytes: usize) -> Self {
        self.max_column_size_bytes = Some(max_column_size_bytes);
        self
    }

    /// Reads the limit from a string key/value configuration.
    pub fn from_conf(conf: &HashMap<String, String>) -> CometResult<Self> {
        let Some(value) = conf.get(MAX_COLUMN_SIZE_BYTES_KEY) else {
            return Ok(Self::default());
        };
        let max_column_size_bytes = value.trim().parse::<usize>().map_err(|e| {
            config_err!("Invalid value '{value}' for {MAX_COLUMN_SIZE_BYTES_KEY}: {e}")
        })?;
        let config = Self::default().with_max_column_size_bytes(max_column_size_bytes);
        config.effective_limit()?;
        Ok(config)
    }

    /// The column size limit actually enforced.
    pub fn effective_limit(&self) -> CometResult<usize> {
        match self.max_column_size_bytes {
            Some(0) => Err(config_err!(
                "{MAX_COLUMN_SIZE_BYTES_KEY} must be greater than 0"
            )),
            Some(limit) => Ok(limit.min(PLATFORM_MAX_COLUMN_SIZE_BYTES)),
            None => Ok(PLATFORM_MAX_COLUMN_SIZE_BYTES),
        }
    }
}

/// Attaches partition values to `batch`.
///
/// `row_counts[i]` consecutive rows of `batch` take the values in `partition_values[i]`,
/// one value per field of `partition_schema`. The returned iterator produces batches with
/// the data columns followed by the partition columns, in the row order of `batch`. No
/// partition column of an output batch holds more variable width bytes than the limit in
/// `config`.
///
/// All arguments are validated before any work is done. Ownership of `batch` moves to the
/// iterator, and its memory is tracked in `pool` until the last piece is merged or the
/// iterator is closed.
pub fn add_partition_values(
    batch: RecordBatch,
    row_counts: &[i64],
    partition_values: Vec<Vec<ScalarValue>>,
    partition_schema: SchemaRef,
    config: &PartitionValuesConfig,
    pool: &Arc<dyn MemoryPool>,
) -> CometResult<PartitionValuesIterator> {
    let limit = config.effective_limit()?;
    let rows = partition_rows(&batch, row_counts, partition_values, &partition_schema)?;

    if partition_schema.fields().is_empty() {
        let schema = batch.schema();
        let num_rows = batch.num_rows();
        let unit = BatchWithPartitionData::try_new(
            SpillableBatch::new(batch, pool),
            vec![PartitionRowData::new(vec![], num_rows)],
            partition_schema,
            Arc::clone(&schema),
        )?;
        return Ok(PartitionValuesIterator::new(
            vec![unit],
            Arc::clone(pool),
            schema,
            0,
        ));
    }

    let output_schema = output_schema(&batch.schema(), &partition_schema);
    let groups = plan_groups(&rows, &partition_schema, limit)?;
    debug!(
        "Planned {} partition groups for {} rows and {} partition entries",
        groups.len(),
        batch.num_rows(),
        rows.len()
    );
    let units = split_batch_by_groups(
        SpillableBatch::new(batch, pool),
        groups,
        &partition_schema,
        &output_schema,
    )?;
    Ok(PartitionValuesIterator::new(
        units,
        Arc::clone(pool),
        output_schema,
        partition_schema.fields().len(),
    ))
}

/// Attaches the same partition values to every row of `batch`.
pub fn add_single_partition_value(
    batch: RecordBatch,
    partition_values: Vec<ScalarValue>,
    partition_schema: SchemaRef,
    config: &PartitionValuesConfig,
    pool: &Arc<dyn MemoryPool>,
) -> CometResult<PartitionValuesIterator> {
    let row_counts = [batch.num_rows() as i64];
    add_partition_values(
        batch,
        &row_counts,
        vec![partition_values],
        partition_schema,
        config,
        pool,
    )
}

fn output_schema(data_schema: &Schema, partition_schema: &Schema) -> SchemaRef {
    let fields = data_schema
        .fields()
        .iter()
        .chain(partition_schema.fields().iter())
        .cloned()
        .collect::<Vec<_>>();
    Arc::new(Schema::new_with_metadata(
        fields,
        data_schema.metadata().clone(),
    ))
}

/// Checks the caller supplied partition rows against the batch and the schema.
fn partition_rows(
    batch: &RecordBatch,
    row_counts: &[i64],
    partition_values: Vec<Vec<ScalarValue>>,
    partition_schema: &Schema,
) -> CometResult<Vec<PartitionRowData>> {
    if row_counts.len() != partition_values.len() {
        return Err(config_err!(
            "Got {} row counts but {} sets of partition values",
            row_counts.len(),
            partition_values.len()
        ));
    }
    if row_counts.is_empty() && partition_schema.fields().is_empty() {
        return Ok(vec![]);
    }
    if row_counts.is_empty() {
        return Err(config_err!(
            "No partition values given for a partition schema of {} fields",
            partition_schema.fields().len()
        ));
    }

    let rows = row_counts
        .iter()
        .zip(partition_values)
        .map(|(count, values)| {
            let count = usize::try_from(*count)
                .map_err(|_| config_err!("Negative partition row count {count}"))?;
            let values = normalize_values(values, partition_schema)?;
            Ok(PartitionRowData::new(values, count))
        })
        .collect::<CometResult<Vec<_>>>()?;

    let total = rows
        .iter()
        .try_fold(0usize, |total, row| total.checked_add(row.row_count()))
        .ok_or_else(|| config_err!("Partition row counts overflow when added up"))?;
    if total != batch.num_rows() {
        return Err(config_err!(
            "Partition row counts add up to {total} but the batch has {} rows",
            batch.num_rows()
        ));
    }
    Ok(rows)
}

fn normalize_values(
    values: Vec<ScalarValue>,
    partition_schema: &Schema,
) -> CometResult<Vec<ScalarValue>> {
    let fields = partition_schema.fields();
    if values.len() != fields.len() {
        return Err(config_err!(
            "Got {} partition values for a partition schema of {} fields",
            values.len(),
            fields.len()
        ));
    }
    values
        .into_iter()
        .zip(fields.iter())
        .map(|(value, field)| normalize_value(value, field))
        .collect()
}

fn normalize_value(value: ScalarValue, field: &Field) -> CometResult<ScalarValue> {
    // an untyped null takes the type of its column
    let value = match value {
        ScalarValue::Null => ScalarValue::try_from(field.data_type())?,
        value => value,
    };
    if value.is_null() && !field.is_nullable() {
        return Err(config_err!(
            "Null value for non-nullable partition column {}",
            field.name()
        ));
    }
    if &value.data_type() != field.data_type() {
        return Err(config_err!(
            "Partition column {} expects {} but got a value of type {}",
            field.name(),
            field.data_type(),
            value.data_type()
        ));
    }
    Ok(value)
}
