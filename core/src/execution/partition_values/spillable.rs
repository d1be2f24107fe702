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

use arrow::array::RecordBatch;
use arrow::datatypes::SchemaRef;
use datafusion::execution::memory_pool::{MemoryConsumer, MemoryPool, MemoryReservation};

use crate::errors::CometResult;

/// A record batch whose memory is accounted for in a [`MemoryPool`].
///
/// The batch has exactly one owner. Splitting consumes it and hands each piece its share
/// of the reservation; dropping it returns the reservation to the pool.
#[derive(Debug)]
pub struct SpillableBatch {
    batch: RecordBatch,
    reservation: MemoryReservation,
}

impl SpillableBatch {
    /// Starts tracking a batch that is already resident in memory.
    pub fn new(batch: RecordBatch, pool: &Arc<dyn MemoryPool>) -> Self {
        // already resident and cannot be spilled from here
        let mut reservation = MemoryConsumer::new("PartitionValuesInput").register(pool);
        reservation.grow(batch.get_array_memory_size());
        Self { batch, reservation }
    }

    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn batch(&self) -> &RecordBatch {
        &self.batch
    }

    /// Bytes this fragment holds in the memory pool.
    pub fn reserved_bytes(&self) -> usize {
        self.reservation.size()
    }

    /// Releases the reservation and returns the batch.
    pub fn into_inner(self) -> RecordBatch {
        let Self { batch, reservation } = self;
        drop(reservation);
        batch
    }

    /// Cuts the batch into contiguous fragments at the given row boundaries.
    ///
    /// `boundaries` must be strictly increasing and lie strictly between 0 and
    /// `num_rows()`; `n` boundaries give `n + 1` fragments. The reservation is divided in
    /// proportion to the rows of each fragment.
    pub fn split_at(self, boundaries: &[usize]) -> CometResult<Vec<SpillableBatch>> {
        let num_rows = self.num_rows();
        let mut start = 0;
        for &boundary in boundaries {
            if boundary <= start || boundary >= num_rows {
                return Err(internal_err!(
                    "Invalid split boundaries {boundaries:?} for a batch of {num_rows} rows"
                ));
            }
            start = boundary;
        }

        let Self {
            batch,
            mut reservation,
        } = self;
        let total_bytes = reservation.size();
        let mut fragments = Vec::with_capacity(boundaries.len() + 1);
        let mut start = 0;
        for &end in boundaries {
            let len = end - start;
            let bytes = (total_bytes as u128 * len as u128 / num_rows as u128) as usize;
            fragments.push(SpillableBatch {
                batch: batch.slice(start, len),
                reservation: reservation.split(bytes),
            });
            start = end;
        }
        fragments.push(SpillableBatch {
            batch: batch.slice(start, num_rows - start),
            reservation,
        });
        Ok(fragments)
    }
}
