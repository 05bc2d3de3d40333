// Copyright 2025 Flamestore (https://github.com/flamestore)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Prometheus metrics for the storage orchestrator
//!
//! Metrics are registered on a caller-supplied [`Registry`], so several
//! storages can live in one process.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};

/// Orchestrator-level counters and latencies
#[derive(Clone)]
pub struct StorageMetrics {
    pub puts: IntCounter,
    pub put_errors: IntCounter,
    pub app_deletes: IntCounter,
    pub gets: IntCounter,
    pub put_duration: Histogram,
    cache_lookups: IntCounterVec,
    cache_evictions: IntCounterVec,
}

impl StorageMetrics {
    pub fn new(registry: &Registry) -> Result<Self, prometheus::Error> {
        let puts = IntCounter::new("flamestore_puts_total", "Total put operations")?;
        let put_errors = IntCounter::new("flamestore_put_errors_total", "Failed put operations")?;
        let app_deletes =
            IntCounter::new("flamestore_app_deletes_total", "Total application deletions")?;
        let gets = IntCounter::new("flamestore_gets_total", "Total range queries")?;
        let put_duration = Histogram::with_opts(
            HistogramOpts::new("flamestore_put_duration_seconds", "Put latency in seconds")
                .buckets(vec![0.0001, 0.001, 0.01, 0.1, 0.5, 1.0]),
        )?;
        let cache_lookups = IntCounterVec::new(
            Opts::new("flamestore_cache_lookups_total", "Cache lookups by result"),
            &["cache", "result"],
        )?;
        let cache_evictions = IntCounterVec::new(
            Opts::new("flamestore_cache_evictions_total", "Entries evicted by capacity"),
            &["cache"],
        )?;

        registry.register(Box::new(puts.clone()))?;
        registry.register(Box::new(put_errors.clone()))?;
        registry.register(Box::new(app_deletes.clone()))?;
        registry.register(Box::new(gets.clone()))?;
        registry.register(Box::new(put_duration.clone()))?;
        registry.register(Box::new(cache_lookups.clone()))?;
        registry.register(Box::new(cache_evictions.clone()))?;

        Ok(Self {
            puts,
            put_errors,
            app_deletes,
            gets,
            put_duration,
            cache_lookups,
            cache_evictions,
        })
    }

    /// Counters for one named cache
    pub fn cache(&self, name: &str) -> CacheMetrics {
        CacheMetrics {
            hits: self.cache_lookups.with_label_values(&[name, "hit"]),
            misses: self.cache_lookups.with_label_values(&[name, "miss"]),
            evictions: self.cache_evictions.with_label_values(&[name]),
        }
    }
}

#[derive(Clone)]
pub struct CacheMetrics {
    pub hits: IntCounter,
    pub misses: IntCounter,
    pub evictions: IntCounter,
}
