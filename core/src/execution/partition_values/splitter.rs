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

use arrow::datatypes::SchemaRef;
use log::debug;

use super::batch::BatchWithPartitionData;
use super::row_data::{total_rows, PartitionGroup};
use super::spillable::SpillableBatch;
use crate::errors::CometResult;

/// Cuts `batch` into one fragment per group and pairs each fragment with its group.
///
/// A single group takes the whole batch without slicing it.
pub(crate) fn split_batch_by_groups(
    batch: SpillableBatch,
    groups: Vec<PartitionGroup>,
    partition_schema: &SchemaRef,
    output_schema: &SchemaRef,
) -> CometResult<Vec<BatchWithPartitionData>> {
    let group_rows = groups.iter().map(|g| total_rows(g)).collect::<Vec<_>>();
    let planned_rows: usize = group_rows.iter().sum();
    if planned_rows != batch.num_rows() {
        return Err(internal_err!(
            "Partition groups cover {planned_rows} rows but the batch has {}",
            batch.num_rows()
        ));
    }

    let fragments = if groups.len() == 1 {
        vec![batch]
    } else {
        // cumulative row counts, without the leading 0 and the trailing total
        let boundaries = group_rows
            .iter()
            .take(group_rows.len().saturating_sub(1))
            .scan(0, |end, rows| {
                *end += rows;
                Some(*end)
            })
            .collect::<Vec<_>>();
        debug!(
            "Splitting a batch of {} rows at {boundaries:?}",
            batch.num_rows()
        );
        batch.split_at(&boundaries)?
    };

    fragments
        .into_iter()
        .zip(groups)
        .map(|(fragment, group)| {
            BatchWithPartitionData::try_new(
                fragment,
                group,
                Arc::clone(partition_schema),
                Arc::clone(output_schema),
            )
        })
        .collect()
}
