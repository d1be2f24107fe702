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

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use arrow::array::{Array, AsArray, Int32Array, RecordBatch};
use arrow::compute::concat_batches;
use arrow::datatypes::{DataType, Field, Int32Type, Schema, SchemaRef};
use comet_partition_values::{
    add_partition_values, add_single_partition_value, CometError, CometResult,
    PartitionValuesConfig, PartitionValuesIterator,
};
use datafusion::common::{DataFusionError, Result, ScalarValue};
use datafusion::execution::memory_pool::{MemoryPool, MemoryReservation, UnboundedMemoryPool};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Refuses the first `failures` reservations that may fail, then behaves like an
/// unbounded pool.
#[derive(Debug)]
struct FailingPool {
    inner: UnboundedMemoryPool,
    failures: AtomicUsize,
    refused: AtomicUsize,
}

impl FailingPool {
    fn new(failures: usize) -> Self {
        Self {
            inner: UnboundedMemoryPool::default(),
            failures: AtomicUsize::new(failures),
            refused: AtomicUsize::new(0),
        }
    }
}

impl MemoryPool for FailingPool {
    fn grow(&self, reservation: &MemoryReservation, additional: usize) {
        self.inner.grow(reservation, additional)
    }

    fn shrink(&self, reservation: &MemoryReservation, shrink: usize) {
        self.inner.shrink(reservation, shrink)
    }

    fn try_grow(&self, reservation: &MemoryReservation, additional: usize) -> Result<()> {
        let refuse = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refuse {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(DataFusionError::ResourcesExhausted(format!(
                "refused {additional} bytes"
            )));
        }
        self.inner.try_grow(reservation, additional)
    }

    fn reserved(&self) -> usize {
        self.inner.reserved()
    }
}

/// Refuses any single reservation larger than `max_reservation` bytes.
#[derive(Debug)]
struct CappedPool {
    inner: UnboundedMemoryPool,
    max_reservation: usize,
}

impl MemoryPool for CappedPool {
    fn grow(&self, reservation: &MemoryReservation, additional: usize) {
        self.inner.grow(reservation, additional)
    }

    fn shrink(&self, reservation: &MemoryReservation, shrink: usize) {
        self.inner.shrink(reservation, shrink)
    }

    fn try_grow(&self, reservation: &MemoryReservation, additional: usize) -> Result<()> {
        if additional > self.max_reservation {
            return Err(DataFusionError::ResourcesExhausted(format!(
                "{additional} bytes is over the cap of {}",
                self.max_reservation
            )));
        }
        self.inner.try_grow(reservation, additional)
    }

    fn reserved(&self) -> usize {
        self.inner.reserved()
    }
}

fn data_batch(num_rows: usize) -> RecordBatch {
    let schema = Arc::new(Schema::new(vec![Field::new("id", DataType::Int32, false)]));
    RecordBatch::try_new(
        schema,
        vec![Arc::new(Int32Array::from_iter_values(0..num_rows as i32))],
    )
    .unwrap()
}

fn string_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![Field::new("part", DataType::Utf8, true)]))
}

fn utf8(value: &str) -> Vec<ScalarValue> {
    vec![ScalarValue::Utf8(Some(value.to_string()))]
}

fn collect(iter: PartitionValuesIterator) -> Vec<RecordBatch> {
    iter.collect::<CometResult<Vec<_>>>().unwrap()
}

fn row_counts(batches: &[RecordBatch]) -> Vec<usize> {
    batches.iter().map(RecordBatch::num_rows).collect()
}

/// The ids and partition strings of all output rows, in order.
fn flatten(batches: &[RecordBatch]) -> Vec<(i32, Option<String>)> {
    batches
        .iter()
        .flat_map(|batch| {
            let ids = batch.column(0).as_primitive::<Int32Type>().clone();
            let parts = batch.column(1).as_string::<i32>().clone();
            (0..batch.num_rows())
                .map(move |i| {
                    let part = parts.is_valid(i).then(|| parts.value(i).to_string());
                    (ids.value(i), part)
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

fn expected_rows(counts: &[usize], values: &[Option<String>]) -> Vec<(i32, Option<String>)> {
    counts
        .iter()
        .zip(values)
        .flat_map(|(count, value)| std::iter::repeat_n(value.clone(), *count))
        .enumerate()
        .map(|(i, value)| (i as i32, value))
        .collect()
}

fn partition_column_bytes(batch: &RecordBatch) -> usize {
    let parts = batch.column(1).as_string::<i32>();
    parts.iter().map(|v| v.map_or(0, str::len)).sum()
}

#[test]
fn groups_follow_column_size_limit() {
    let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
    let counts = [10usize, 40, 70, 10, 11];
    let values = ["abc", "def", "ghi", "jkl", "mno"];
    let iter = add_partition_values(
        data_batch(141),
        &counts.map(|c| c as i64),
        values.iter().map(|v| utf8(v)).collect(),
        string_schema(),
        &PartitionValuesConfig::new().with_max_column_size_bytes(300),
        &pool,
    )
    .unwrap();
    assert_eq!(iter.pending_units(), 2);

    let batches = collect(iter);
    assert_eq!(row_counts(&batches), vec![100, 41]);
    let expected = expected_rows(
        &counts,
        &values.map(|v| Some(v.to_string())),
    );
    assert_eq!(flatten(&batches), expected);
    assert_eq!(pool.reserved(), 0);
}

#[test]
fn batch_under_limit_is_not_sliced() {
    let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
    let input = data_batch(20);
    let input_column = Arc::clone(input.column(0));
    let mut iter = add_partition_values(
        input,
        &[5, 15],
        vec![utf8("2024-01-01"), utf8("2024-01-02")],
        string_schema(),
        &PartitionValuesConfig::new(),
        &pool,
    )
    .unwrap();
    assert_eq!(iter.pending_units(), 1);
    let batch = iter.next().unwrap().unwrap();
    assert!(Arc::ptr_eq(batch.column(0), &input_column));
    assert!(iter.next().is_none());
}

#[test]
fn transient_failure_halves_and_keeps_order() {
    let pool: Arc<dyn MemoryPool> = Arc::new(FailingPool::new(1));
    let iter = add_single_partition_value(
        data_batch(9),
        utf8("p"),
        string_schema(),
        &PartitionValuesConfig::new(),
        &pool,
    )
    .unwrap();
    let batches = collect(iter);
    assert_eq!(row_counts(&batches), vec![4, 5]);
    assert_eq!(
        flatten(&batches),
        expected_rows(&[9], &[Some("p".to_string())])
    );

    let merged = concat_batches(&batches[0].schema(), &batches).unwrap();
    let unsplit = collect(
        add_single_partition_value(
            data_batch(9),
            utf8("p"),
            string_schema(),
            &PartitionValuesConfig::new(),
            &(Arc::new(UnboundedMemoryPool::default()) as Arc<dyn MemoryPool>),
        )
        .unwrap(),
    );
    assert_eq!(merged, unsplit[0]);
    assert_eq!(pool.reserved(), 0);
}

#[test]
fn repeated_failures_split_down_to_single_rows() {
    // refused at 4 rows and again at the first 2, then every piece merges
    let pool: Arc<dyn MemoryPool> = Arc::new(FailingPool::new(2));
    let iter = add_partition_values(
        data_batch(4),
        &[1, 3],
        vec![utf8("a"), utf8("b")],
        string_schema(),
        &PartitionValuesConfig::new(),
        &pool,
    )
    .unwrap();
    let batches = collect(iter);
    assert_eq!(row_counts(&batches), vec![1, 1, 2]);
    assert_eq!(
        flatten(&batches),
        expected_rows(&[1, 3], &[Some("a".to_string()), Some("b".to_string())])
    );
}

#[test]
fn single_row_failure_is_irreducible() {
    let pool = Arc::new(FailingPool::new(usize::MAX));
    let dyn_pool: Arc<dyn MemoryPool> = Arc::clone(&pool) as Arc<dyn MemoryPool>;
    let mut iter = add_partition_values(
        data_batch(3),
        &[1, 2],
        vec![utf8("a"), utf8("b")],
        string_schema(),
        &PartitionValuesConfig::new().with_max_column_size_bytes(1),
        &dyn_pool,
    )
    .unwrap();
    assert_eq!(iter.pending_units(), 3);

    let err = iter.next().unwrap().unwrap_err();
    assert!(matches!(err, CometError::Irreducible { rows: 1, .. }));
    assert!(err.to_string().contains("refused"));
    assert!(iter.next().is_none());
    assert_eq!(iter.pending_units(), 0);
    assert_eq!(pool.refused.load(Ordering::SeqCst), 1);
    assert_eq!(dyn_pool.reserved(), 0);
}

#[test]
fn abandoning_iterator_releases_memory() {
    let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
    let mut iter = add_partition_values(
        data_batch(30),
        &[10, 10, 10],
        vec![utf8("aaaa"), utf8("bbbb"), utf8("cccc")],
        string_schema(),
        &PartitionValuesConfig::new().with_max_column_size_bytes(40),
        &pool,
    )
    .unwrap();
    assert_eq!(iter.pending_units(), 3);
    let first = iter.next().unwrap().unwrap();
    assert_eq!(first.num_rows(), 10);
    assert!(pool.reserved() > 0);

    drop(iter);
    assert_eq!(pool.reserved(), 0);
}

#[test]
fn invalid_input_fails_before_any_work() {
    let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
    let result = add_partition_values(
        data_batch(10),
        &[4, 4],
        vec![utf8("a"), utf8("b")],
        string_schema(),
        &PartitionValuesConfig::new(),
        &pool,
    );
    assert!(matches!(result, Err(CometError::Config(_))));
    assert_eq!(pool.reserved(), 0);
}

#[test]
fn null_partition_values() {
    let pool: Arc<dyn MemoryPool> = Arc::new(UnboundedMemoryPool::default());
    let iter = add_partition_values(
        data_batch(6),
        &[2, 2, 2],
        vec![
            utf8("x"),
            vec![ScalarValue::Utf8(None)],
            vec![ScalarValue::Null],
        ],
        string_schema(),
        &PartitionValuesConfig::new(),
        &pool,
    )
    .unwrap();
    let batches = collect(iter);
    assert_eq!(
        flatten(&batches),
        expected_rows(&[2, 2, 2], &[Some("x".to_string()), None, None])
    );
}

#[test]
fn random_inputs_conserve_rows_and_respect_limit() {
    let mut rng = StdRng::seed_from_u64(42);
    for _ in 0..50 {
        let num_entries = rng.random_range(1..20);
        let counts = (0..num_entries)
            .map(|_| rng.random_range(0..200))
            .collect::<Vec<usize>>();
        let values = (0..num_entries)
            .map(|_| {
                if rng.random_bool(0.1) {
                    None
                } else {
                    let len = rng.random_range(0..12);
                    Some((0..len).map(|_| rng.random_range('a'..='z')).collect::<String>())
                }
            })
            .collect::<Vec<_>>();
        let limit = rng.random_range(11..2000);
        let total: usize = counts.iter().sum();

        // a single row never needs more than 20 bytes
        let pool: Arc<dyn MemoryPool> = Arc::new(CappedPool {
            inner: UnboundedMemoryPool::default(),
            max_reservation: rng.random_range(64..4096),
        });
        let iter = add_partition_values(
            data_batch(total),
            &counts.iter().map(|c| *c as i64).collect::<Vec<_>>(),
            values
                .iter()
                .map(|v| vec![ScalarValue::Utf8(v.clone())])
                .collect(),
            string_schema(),
            &PartitionValuesConfig::new().with_max_column_size_bytes(limit),
            &pool,
        )
        .unwrap();
        let batches = collect(iter);

        assert_eq!(flatten(&batches), expected_rows(&counts, &values));
        for batch in &batches {
            assert!(partition_column_bytes(batch) <= limit);
        }
        assert_eq!(pool.reserved(), 0);
    }
}
