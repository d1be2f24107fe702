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

use std::sync::Arc;

use arrow::array::{Array, ArrayRef, RecordBatch, RecordBatchOptions};
use arrow::compute::concat;
use arrow::datatypes::{Field, SchemaRef};
use datafusion::execution::memory_pool::{MemoryConsumer, MemoryPool};
use log::debug;

use super::row_data::{split_rows_at, total_rows, PartitionGroup, PartitionRowData};
use super::size::estimate_partition_bytes;
use super::spillable::SpillableBatch;
use crate::errors::{CometError, CometResult};

/// Result of [`BatchWithPartitionData::merge`].
#[derive(Debug)]
pub enum MergeOutcome {
    /// The data columns followed by the partition columns.
    Merged(RecordBatch),
    /// Not enough memory to build the output at this size. The unit comes back untouched
    /// so it can be split and retried.
    Retry {
        unit: BatchWithPartitionData,
        cause: CometError,
    },
}

/// A fragment of the scanned batch together with the partition rows that belong to it.
///
/// The partition rows always add up to the number of rows in the fragment. A unit is
/// consumed exactly once, either by `merge` or by being split into smaller units.
#[derive(Debug)]
pub struct BatchWithPartitionData {
    batch: SpillableBatch,
    partition_rows: PartitionGroup,
    partition_schema: SchemaRef,
    output_schema: SchemaRef,
}

impl BatchWithPartitionData {
    pub fn try_new(
        batch: SpillableBatch,
        partition_rows: PartitionGroup,
        partition_schema: SchemaRef,
        output_schema: SchemaRef,
    ) -> CometResult<Self> {
        let partition_row_count = total_rows(&partition_rows);
        if partition_row_count != batch.num_rows() {
            return Err(internal_err!(
                "Partition rows cover {partition_row_count} rows but the batch has {}",
                batch.num_rows()
            ));
        }
        Ok(Self {
            batch,
            partition_rows,
            partition_schema,
            output_schema,
        })
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn partition_rows(&self) -> &[PartitionRowData] {
        &self.partition_rows
    }

    pub fn batch(&self) -> &SpillableBatch {
        &self.batch
    }

    /// Bytes the partition columns of this unit are expected to take once built.
    pub fn estimated_partition_bytes(&self) -> usize {
        self.partition_rows
            .iter()
            .map(|row| {
                self.partition_schema
                    .fields()
                    .iter()
                    .zip(row.values())
                    .map(|(field, value)| {
                        estimate_partition_bytes(value, field.data_type(), row.row_count())
                    })
                    .sum::<usize>()
            })
            .sum()
    }

    /// Builds the partition columns and appends them to the data columns.
    ///
    /// Memory for the partition columns is reserved from `pool` first. If the pool refuses,
    /// or building the columns runs out of memory, the unit is handed back in
    /// [`MergeOutcome::Retry`]. Any other failure is returned as an error.
    pub fn merge(self, pool: &Arc<dyn MemoryPool>) -> CometResult<MergeOutcome> {
        if self.partition_schema.fields().is_empty() {
            return Ok(MergeOutcome::Merged(self.batch.into_inner()));
        }

        let estimated_bytes = self.estimated_partition_bytes();
        let mut reservation = MemoryConsumer::new("PartitionValuesMerge").register(pool);
        // empty units always fit
        if self.num_rows() > 0 {
            if let Err(e) = reservation.try_grow(estimated_bytes) {
                return self.retry_or_fail(e.into());
            }
        }

        let merged = self
            .build_partition_columns()
            .and_then(|columns| self.combine(columns));
        match merged {
            Ok(batch) => {
                debug!(
                    "Merged {} rows with {} partition entries, reserved {estimated_bytes} bytes",
                    batch.num_rows(),
                    self.partition_rows.len()
                );
                Ok(MergeOutcome::Merged(batch))
            }
            Err(e) => self.retry_or_fail(e),
        }
    }

    fn retry_or_fail(self, cause: CometError) -> CometResult<MergeOutcome> {
        if cause.is_retryable() {
            Ok(MergeOutcome::Retry { unit: self, cause })
        } else {
            Err(cause)
        }
    }

    fn build_partition_columns(&self) -> CometResult<Vec<ArrayRef>> {
        self.partition_schema
            .fields()
            .iter()
            .enumerate()
            .map(|(index, field)| self.build_partition_column(index, field))
            .collect()
    }

    fn build_partition_column(&self, index: usize, field: &Field) -> CometResult<ArrayRef> {
        let mut arrays = self
            .partition_rows
            .iter()
            .map(|row| Ok(row.values()[index].to_array_of_size(row.row_count())?))
            .collect::<CometResult<Vec<ArrayRef>>>()?;

        let column = if arrays.len() == 1 {
            arrays.remove(0)
        } else {
            let refs = arrays.iter().map(|a| a.as_ref()).collect::<Vec<&dyn Array>>();
            concat(&refs).map_err(CometError::from_arrow)?
        };

        if column.len() != self.num_rows() {
            return Err(internal_err!(
                "Partition column {} has {} rows but the batch has {}",
                field.name(),
                column.len(),
                self.num_rows()
            ));
        }
        Ok(column)
    }

    fn combine(&self, partition_columns: Vec<ArrayRef>) -> CometResult<RecordBatch> {
        let mut columns = self.batch.batch().columns().to_vec();
        columns.extend(partition_columns);
        let options = RecordBatchOptions::new().with_row_count(Some(self.num_rows()));
        RecordBatch::try_new_with_options(Arc::clone(&self.output_schema), columns, &options)
            .map_err(CometError::from_arrow)
    }

    /// Splits this unit into two at `row`, dividing both the batch and the partition rows.
    pub fn split_at_row(self, row: usize) -> CometResult<(Self, Self)> {
        let Self {
            batch,
            partition_rows,
            partition_schema,
            output_schema,
        } = self;
        let mut fragments = batch.split_at(&[row])?.into_iter();
        let (left_rows, right_rows) = split_rows_at(partition_rows, row);
        match (fragments.next(), fragments.next()) {
            (Some(left), Some(right)) => Ok((
                Self::try_new(
                    left,
                    left_rows,
                    Arc::clone(&partition_schema),
                    Arc::clone(&output_schema),
                )?,
                Self::try_new(right, right_rows, partition_schema, output_schema)?,
            )),
            _ => Err(internal_err!("Splitting at row {row} did not produce two fragments")),
        }
    }
}
