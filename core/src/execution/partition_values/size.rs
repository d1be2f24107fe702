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

//! Byte accounting for replicated partition values.
//!
//! Only variable width columns are sized against the column limit. A fixed width column
//! needs `i32::MAX / width` rows before it gets near the limit, far more than any batch
//! this is used with, so those columns report a cost of zero and never cap a group.

use arrow::datatypes::DataType;
use datafusion::common::ScalarValue;

fn is_variable_width(data_type: &DataType) -> bool {
    matches!(
        data_type,
        DataType::Utf8
            | DataType::LargeUtf8
            | DataType::Utf8View
            | DataType::Binary
            | DataType::LargeBinary
            | DataType::BinaryView
    )
}

/// Bytes one row of `value` adds to the value buffer of a column of type `data_type`.
///
/// A broadcast dictionary stores its value once and only grows by fixed width keys, so
/// dictionary columns cost nothing per row.
pub fn value_byte_cost(value: &ScalarValue, data_type: &DataType) -> usize {
    if matches!(data_type, DataType::Dictionary(_, _)) {
        return 0;
    }
    value_bytes(value, data_type)
}

/// Encoded length of a single `value`, looking through dictionaries.
fn value_bytes(value: &ScalarValue, data_type: &DataType) -> usize {
    if let DataType::Dictionary(_, value_type) = data_type {
        return match value {
            ScalarValue::Dictionary(_, inner) => value_bytes(inner, value_type),
            other => value_bytes(other, value_type),
        };
    }
    if !is_variable_width(data_type) {
        return 0;
    }
    match value {
        ScalarValue::Utf8(Some(s))
        | ScalarValue::LargeUtf8(Some(s))
        | ScalarValue::Utf8View(Some(s)) => s.len(),
        ScalarValue::Binary(Some(b))
        | ScalarValue::LargeBinary(Some(b))
        | ScalarValue::BinaryView(Some(b)) => b.len(),
        _ => 0,
    }
}

/// How many more rows of `value` fit into a column already holding `bytes_used` bytes
/// without exceeding `limit`. `None` means the value places no cap on the row count.
pub fn max_rows_fitting(
    value: &ScalarValue,
    data_type: &DataType,
    bytes_used: usize,
    limit: usize,
) -> Option<usize> {
    match value_byte_cost(value, data_type) {
        0 => None,
        cost => Some(limit.saturating_sub(bytes_used) / cost),
    }
}

/// Approximate bytes needed to materialize `rows` copies of `value` as an arrow array.
pub fn estimate_partition_bytes(value: &ScalarValue, data_type: &DataType, rows: usize) -> usize {
    let offsets = match data_type {
        DataType::Utf8 | DataType::Binary => (rows + 1) * 4,
        DataType::LargeUtf8 | DataType::LargeBinary => (rows + 1) * 8,
        // views are 16 bytes each
        DataType::Utf8View | DataType::BinaryView => rows * 16,
        DataType::Boolean => rows.div_ceil(8),
        // keys only, the dictionary holds a single value
        DataType::Dictionary(key_type, _) => {
            return key_type.primitive_width().unwrap_or(0) * rows + value_bytes(value, data_type)
        }
        other => other.primitive_width().unwrap_or(0) * rows,
    };
    let validity = if value.is_null() { rows.div_ceil(8) } else { 0 };
    offsets + validity + value_byte_cost(value, data_type).saturating_mul(rows)
}
