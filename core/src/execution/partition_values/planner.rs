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

use arrow::datatypes::Schema;
use log::debug;

use super::row_data::{PartitionGroup, PartitionRowData};
use super::size::{max_rows_fitting, value_byte_cost};
use crate::errors::CometResult;

/// Greedily packs `rows` into groups so that no partition column of a group holds more
/// than `limit` bytes once materialized.
///
/// Rows keep their order, and a row whose count does not fit into the open group is
/// split: the part that fits closes the group and the rest starts the next one.
/// Concatenating the returned groups gives back `rows` (with split entries divided).
pub(crate) fn plan_groups(
    rows: &[PartitionRowData],
    partition_schema: &Schema,
    limit: usize,
) -> CometResult<Vec<PartitionGroup>> {
    let fields = partition_schema.fields();
    let mut groups = Vec::new();
    let mut current: PartitionGroup = Vec::new();
    let mut bytes_used = vec![0usize; fields.len()];

    for row in rows {
        let mut pending = row.row_count();
        loop {
            let fitting = fields
                .iter()
                .zip(row.values())
                .zip(&bytes_used)
                .filter_map(|((field, value), used)| {
                    max_rows_fitting(value, field.data_type(), *used, limit)
                })
                .min();

            match fitting {
                Some(fit) if fit < pending => {
                    // an empty budget on a fresh group will not get any better
                    if fit == 0 && bytes_used.iter().all(|used| *used == 0) {
                        return Err(config_err!(
                            "A single row of partition values needs more than the column \
                             size limit of {limit} bytes: {:?}",
                            row.values()
                        ));
                    }
                    if fit > 0 {
                        add_rows(&mut current, &mut bytes_used, row, fit, partition_schema);
                        pending -= fit;
                    }
                    debug!(
                        "Closing partition group of {} entries, {} rows still pending",
                        current.len(),
                        pending
                    );
                    groups.push(std::mem::take(&mut current));
                    bytes_used.iter_mut().for_each(|used| *used = 0);
                }
                _ => {
                    add_rows(&mut current, &mut bytes_used, row, pending, partition_schema);
                    break;
                }
            }
        }
    }

    if !current.is_empty() {
        groups.push(current);
    }
    Ok(groups)
}

fn add_rows(
    group: &mut PartitionGroup,
    bytes_used: &mut [usize],
    row: &PartitionRowData,
    count: usize,
    partition_schema: &Schema,
) {
    for ((used, field), value) in bytes_used
        .iter_mut()
        .zip(partition_schema.fields())
        .zip(row.values())
    {
        *used += value_byte_cost(value, field.data_type()) * count;
    }
    group.push(row.with_row_count(count));
}
