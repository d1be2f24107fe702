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

use datafusion::common::ScalarValue;

/// One row of partition values, holding one value per partition column, together with the
/// number of consecutive output rows that carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionRowData {
    values: Vec<ScalarValue>,
    row_count: usize,
}

impl PartitionRowData {
    pub fn new(values: Vec<ScalarValue>, row_count: usize) -> Self {
        Self { values, row_count }
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    /// Same values, different number of rows.
    pub fn with_row_count(&self, row_count: usize) -> Self {
        Self {
            values: self.values.clone(),
            row_count,
        }
    }
}

/// A run of partition rows that is materialized into one output batch.
pub type PartitionGroup = Vec<PartitionRowData>;

pub(crate) fn total_rows(rows: &[PartitionRowData]) -> usize {
    rows.iter().map(PartitionRowData::row_count).sum()
}

/// Splits `rows` so that the first half carries exactly `at` rows. An entry straddling the
/// boundary is divided between both halves.
pub(crate) fn split_rows_at(
    rows: Vec<PartitionRowData>,
    at: usize,
) -> (PartitionGroup, PartitionGroup) {
    let mut left = Vec::new();
    let mut right = Vec::new();
    let mut remaining = at;
    for row in rows {
        if remaining >= row.row_count {
            remaining -= row.row_count;
            left.push(row);
        } else if remaining > 0 {
            left.push(row.with_row_count(remaining));
            right.push(row.with_row_count(row.row_count - remaining));
            remaining = 0;
        } else {
            right.push(row);
        }
    }
    (left, right)
}
