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

use datafusion::execution::memory_pool::{MemoryConsumer, MemoryPool, MemoryReservation};
use log::debug;
use std::sync::Arc;

/// Forwards to an inner pool and logs every reservation change at debug level.
#[derive(Debug)]
pub(crate) struct LoggingPool {
    pool: Arc<dyn MemoryPool>,
}

impl LoggingPool {
    pub fn new(pool: Arc<dyn MemoryPool>) -> Self {
        Self { pool }
    }
}

impl MemoryPool for LoggingPool {
    fn register(&self, consumer: &MemoryConsumer) {
        debug!("MemoryPool[{}].register", consumer.name());
        self.pool.register(consumer);
    }

    fn unregister(&self, consumer: &MemoryConsumer) {
        debug!("MemoryPool[{}].unregister", consumer.name());
        self.pool.unregister(consumer);
    }

    fn grow(&self, reservation: &MemoryReservation, additional: usize) {
        self.pool.grow(reservation, additional);
        debug!(
            "MemoryPool[{}].grow(+{additional}), pool reserved {}",
            reservation.consumer().name(),
            self.pool.reserved()
        );
    }

    fn shrink(&self, reservation: &MemoryReservation, shrink: usize) {
        self.pool.shrink(reservation, shrink);
        debug!(
            "MemoryPool[{}].shrink(-{shrink}), pool reserved {}",
            reservation.consumer().name(),
            self.pool.reserved()
        );
    }

    fn try_grow(
        &self,
        reservation: &MemoryReservation,
        additional: usize,
    ) -> datafusion::common::Result<()> {
        let result = self.pool.try_grow(reservation, additional);
        debug!(
            "MemoryPool[{}].try_grow(+{additional}) returning {}, pool reserved {}",
            reservation.consumer().name(),
            if result.is_ok() { "Ok" } else { "Err" },
            self.pool.reserved()
        );
        result
    }

    fn reserved(&self) -> usize {
        self.pool.reserved()
    }
}
