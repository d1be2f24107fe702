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

use datafusion::physical_plan::metrics::{
    BaselineMetrics, Count, ExecutionPlanMetricsSet, MetricBuilder,
};

#[derive(Debug)]
pub(super) struct PartitionValuesMetrics {
    /// metrics
    pub(super) baseline: BaselineMetrics,

    /// Number of input batches
    pub(super) input_batches: Count,

    /// Number of output batches
    pub(super) output_batches: Count,

    /// Number of units handed to the split policy after running out of memory
    pub(super) split_retries: Count,

    /// Bytes of partition columns materialized into output batches
    pub(super) partition_bytes: Count,
}

impl PartitionValuesMetrics {
    pub(super) fn new(metrics: &ExecutionPlanMetricsSet, partition: usize) -> Self {
        Self {
            baseline: BaselineMetrics::new(metrics, partition),
            input_batches: MetricBuilder::new(metrics).counter("input_batches", partition),
            output_batches: MetricBuilder::new(metrics).counter("output_batches", partition),
            split_retries: MetricBuilder::new(metrics).counter("split_retries", partition),
            partition_bytes: MetricBuilder::new(metrics).counter("partition_bytes", partition),
        }
    }
}
