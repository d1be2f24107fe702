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

use std::collections::VecDeque;
use std::iter::FusedIterator;
use std::sync::Arc;

use arrow::array::{Array, RecordBatch};
use arrow::datatypes::SchemaRef;
use datafusion::common::DataFusionError;
use datafusion::execution::memory_pool::MemoryPool;
use datafusion::physical_plan::metrics::{ExecutionPlanMetricsSet, MetricsSet};
use datafusion::physical_plan::stream::RecordBatchStreamAdapter;
use datafusion::physical_plan::SendableRecordBatchStream;
use log::{debug, info, warn};

use super::batch::{BatchWithPartitionData, MergeOutcome};
use super::metrics::PartitionValuesMetrics;
use super::split::{HalveByRows, SplitPolicy};
use crate::errors::{CometError, CometResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// More units may be merged
    Ready,
    /// All units are merged, or a fatal error ended the iteration
    Done,
}

/// Lazily merges partition values into one unit at a time.
///
/// Nothing is merged until the consumer asks for the next batch. When a merge runs out of
/// memory the unit is split by the [`SplitPolicy`] and the pieces are retried before any
/// later unit, so output batches keep the row order of the input. A fatal error disposes
/// every unit that has not been merged yet and ends the iteration.
#[derive(Debug)]
pub struct PartitionValuesIterator {
    pending: VecDeque<BatchWithPartitionData>,
    pool: Arc<dyn MemoryPool>,
    split_policy: Arc<dyn SplitPolicy>,
    schema: SchemaRef,
    num_partition_columns: usize,
    metrics_set: ExecutionPlanMetricsSet,
    metrics: PartitionValuesMetrics,
    state: State,
}

impl PartitionValuesIterator {
    pub(super) fn new(
        units: Vec<BatchWithPartitionData>,
        pool: Arc<dyn MemoryPool>,
        schema: SchemaRef,
        num_partition_columns: usize,
    ) -> Self {
        let metrics_set = ExecutionPlanMetricsSet::new();
        let metrics = PartitionValuesMetrics::new(&metrics_set, 0);
        metrics.input_batches.add(1);
        Self {
            pending: units.into(),
            pool,
            split_policy: Arc::new(HalveByRows),
            schema,
            num_partition_columns,
            metrics_set,
            metrics,
            state: State::Ready,
        }
    }

    /// Replaces the default [`HalveByRows`] policy.
    pub fn with_split_policy(mut self, split_policy: Arc<dyn SplitPolicy>) -> Self {
        self.split_policy = split_policy;
        self
    }

    /// Schema of the output batches: data columns followed by partition columns.
    pub fn schema(&self) -> SchemaRef {
        Arc::clone(&self.schema)
    }

    /// Number of units waiting to be merged.
    pub fn pending_units(&self) -> usize {
        self.pending.len()
    }

    pub fn metrics(&self) -> MetricsSet {
        self.metrics_set.clone_inner()
    }

    /// Disposes all units that have not been merged yet. Calling this more than once is
    /// harmless, and no merge is attempted afterwards.
    pub fn close(&mut self) {
        if self.state == State::Done {
            return;
        }
        let disposed = self.pending.len();
        self.pending.clear();
        self.state = State::Done;
        self.metrics.baseline.done();
        if disposed > 0 {
            debug!("Disposed {disposed} unmerged partition value units");
        }
    }

    /// Adapts the iterator to a DataFusion record batch stream.
    pub fn into_stream(self) -> SendableRecordBatchStream {
        let schema = self.schema();
        let batches = self.map(|result| result.map_err(DataFusionError::from));
        Box::pin(RecordBatchStreamAdapter::new(
            schema,
            futures::stream::iter(batches),
        ))
    }

    fn split_and_requeue(
        &mut self,
        unit: BatchWithPartitionData,
        cause: CometError,
    ) -> CometResult<()> {
        let rows = unit.num_rows();
        info!("Could not merge partition values into {rows} rows ({cause}), splitting");
        let pieces = self.split_policy.split(unit, cause)?;
        let split_rows: usize = pieces.iter().map(BatchWithPartitionData::num_rows).sum();
        if pieces.len() < 2 || split_rows != rows {
            return Err(internal_err!(
                "Splitting {rows} rows produced {} units holding {split_rows} rows",
                pieces.len()
            ));
        }
        self.metrics.split_retries.add(1);
        for piece in pieces.into_iter().rev() {
            self.pending.push_front(piece);
        }
        Ok(())
    }

    fn fail(&mut self, err: CometError) -> CometError {
        if !self.pending.is_empty() {
            warn!(
                "Disposing {} unmerged partition value units after error: {err}",
                self.pending.len()
            );
        }
        self.close();
        err
    }

    fn record_output(&self, batch: &RecordBatch) {
        let first_partition_column = batch.num_columns() - self.num_partition_columns;
        let partition_bytes: usize = batch.columns()[first_partition_column..]
            .iter()
            .map(|column| column.get_array_memory_size())
            .sum();
        self.metrics.partition_bytes.add(partition_bytes);
        self.metrics.output_batches.add(1);
        self.metrics.baseline.record_output(batch.num_rows());
    }
}

impl Iterator for PartitionValuesIterator {
    type Item = CometResult<RecordBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        while self.state == State::Ready {
            let Some(unit) = self.pending.pop_front() else {
                self.close();
                break;
            };

            let outcome = {
                let _timer = self.metrics.baseline.elapsed_compute().timer();
                unit.merge(&self.pool)
            };

            match outcome {
                Ok(MergeOutcome::Merged(batch)) => {
                    self.record_output(&batch);
                    return Some(Ok(batch));
                }
                Ok(MergeOutcome::Retry { unit, cause }) => {
                    if let Err(e) = self.split_and_requeue(unit, cause) {
                        return Some(Err(self.fail(e)));
                    }
                }
                Err(e) => return Some(Err(self.fail(e))),
            }
        }
        None
    }
}

impl FusedIterator for PartitionValuesIterator {}

impl Drop for PartitionValuesIterator {
    fn drop(&mut self) {
        self.close();
    }
}
