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

use std::fmt::Debug;

use log::debug;

use super::batch::BatchWithPartitionData;
use crate::errors::{CometError, CometResult};

/// Decides how a unit that could not be merged is broken into smaller units.
pub trait SplitPolicy: Debug + Send + Sync {
    /// Returns at least two units that together hold exactly the rows of `unit`, in order.
    /// `cause` is the failure that triggered the split.
    fn split(
        &self,
        unit: BatchWithPartitionData,
        cause: CometError,
    ) -> CometResult<Vec<BatchWithPartitionData>>;
}

/// Splits a unit in two by row count. The first half gets `rows / 2` rows, the second the
/// rest, regardless of where the partition entries begin and end.
#[derive(Debug, Default, Clone, Copy)]
pub struct HalveByRows;

impl SplitPolicy for HalveByRows {
    fn split(
        &self,
        unit: BatchWithPartitionData,
        cause: CometError,
    ) -> CometResult<Vec<BatchWithPartitionData>> {
        let rows = unit.num_rows();
        if rows <= 1 {
            return Err(CometError::Irreducible {
                rows,
                msg: cause.to_string(),
            });
        }
        debug!("Halving a unit of {rows} rows after: {cause}");
        let (left, right) = unit.split_at_row(rows / 2)?;
        Ok(vec![left, right])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::partition_values::row_data::PartitionRowData;
    use crate::execution::partition_values::spillable::SpillableBatch;
    use arrow::array::{Int32Array, RecordBatch};
    use arrow::datatypes::{DataType, Field, Schema};
    use datafusion::common::ScalarValue;
    use datafusion::execution::memory_pool::{MemoryPool, UnboundedMemoryPool};
    use std::sync::Arc;

    fn unit(num_rows: usize, counts: &[usize]) -> BatchWithPartitionData {
        let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
        let data_schema = Arc::new(Schema::new(vec![Field::new("a", DataType::Int32, false)]));
        let data = RecordBatch::try_new(
            Arc::clone(&data_schema),
            vec![Arc::new(Int32Array::from_iter_values(0..num_rows as i32))],
        )
        .unwrap();
        let partition_schema = Arc::new(Schema::new(vec![Field::new("p", DataType::Utf8, true)]));
        let output_schema = Arc::new(Schema::new(vec![
            Field::new("a", DataType::Int32, false),
            Field::new("p", DataType::Utf8, true),
        ]));
        let rows = counts
            .iter()
            .enumerate()
            .map(|(i, c)| PartitionRowData::new(vec![ScalarValue::Utf8(Some(i.to_string()))], *c))
            .collect();
        BatchWithPartitionData::try_new(
            SpillableBatch::new(data, &pool),
            rows,
            partition_schema,
            output_schema,
        )
        .unwrap()
    }

    fn exhausted() -> CometError {
        CometError::ResourcesExhausted("test".to_string())
    }

    #[test]
    fn halves_odd_row_count() {
        let pieces = HalveByRows.split(unit(9, &[9]), exhausted()).unwrap();
        assert_eq!(
            pieces.iter().map(|u| u.num_rows()).collect::<Vec<_>>(),
            vec![4, 5]
        );
        assert_eq!(pieces[0].partition_rows()[0].row_count(), 4);
        assert_eq!(pieces[1].partition_rows()[0].row_count(), 5);
    }

    #[test]
    fn halves_across_entries() {
        let pieces = HalveByRows.split(unit(6, &[1, 1, 4]), exhausted()).unwrap();
        let counts = pieces
            .iter()
            .map(|u| {
                u.partition_rows()
                    .iter()
                    .map(|r| r.row_count())
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();
        assert_eq!(counts, vec![vec![1, 1, 1], vec![3]]);
    }

    #[test]
    fn single_row_is_irreducible() {
        let err = HalveByRows.split(unit(1, &[1]), exhausted()).unwrap_err();
        assert!(matches!(err, CometError::Irreducible { rows: 1, .. }));
        assert!(err.to_string().contains("Resources exhausted: test"));
    }
}
