//! Query coordinator
//!
//! The dispatching core of the engine: validates a query batch, decides
//! between the flat and IVF paths, drives the scan engine inline or through
//! the worker pool, applies attribute filtering, and merges partial top-k
//! buffers into the final ranked result.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::unbounded;
use metrics::{counter, histogram};
use tracing::debug;

use crate::attrs::AttributeTable;
use crate::config::CoordinatorConfig;
use crate::index::FlatIndex;
use crate::partition::PartitionStore;
use crate::query::scan::ScanContext;
use crate::query::topk::TopKBuffer;
use crate::query::worker::{run_job, JobRequest, ScanJob, WorkerPool};
use crate::query::{FilterStrategy, SearchParams, SearchResult};
use crate::types::{DistanceMetric, PartitionId, TimingInfo, VectorId, NO_ID, NO_PARTITION};
use crate::{Error, Result};

/// Coordinates partition selection, scanning, filtering, and top-k merging
/// for a two-level (IVF) vector index.
///
/// Holds non-owning shared handles to its collaborators; all of them are
/// read-only snapshots for the duration of a `search` call. The worker pool
/// is owned by the coordinator and drained on drop.
pub struct QueryCoordinator {
    parent: Option<Arc<FlatIndex>>,
    partitions: Option<Arc<PartitionStore>>,
    attributes: Option<Arc<AttributeTable>>,
    metric: DistanceMetric,
    config: CoordinatorConfig,
    pool: WorkerPool,
}

impl QueryCoordinator {
    /// Build a coordinator. A `None` parent selects the flat path where the
    /// whole corpus is treated as a single implicit partition. `num_workers`
    /// of zero runs every scan inline on the caller thread.
    pub fn new(
        parent: Option<Arc<FlatIndex>>,
        partitions: Option<Arc<PartitionStore>>,
        attributes: Option<Arc<AttributeTable>>,
        metric: DistanceMetric,
        num_workers: usize,
    ) -> Result<Self> {
        Self::with_config(
            parent,
            partitions,
            attributes,
            metric,
            CoordinatorConfig::with_workers(num_workers),
        )
    }

    pub fn with_config(
        parent: Option<Arc<FlatIndex>>,
        partitions: Option<Arc<PartitionStore>>,
        attributes: Option<Arc<AttributeTable>>,
        metric: DistanceMetric,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        if config.overfetch_factor == 0 {
            return Err(Error::invalid_input("overfetch_factor must be positive"));
        }
        if let (Some(parent), Some(store)) = (&parent, &partitions) {
            if parent.dim() != store.dim() {
                return Err(Error::invalid_input(format!(
                    "parent index dim {} did not match partition store dim {}",
                    parent.dim(),
                    store.dim()
                )));
            }
        }

        let pool = WorkerPool::new(config.queue_capacity);
        if config.num_workers > 0 {
            pool.initialize(config.num_workers)?;
        }

        Ok(Self {
            parent,
            partitions,
            attributes,
            metric,
            config,
            pool,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Whether the worker pool is currently accepting jobs.
    pub fn workers_initialized(&self) -> bool {
        self.pool.is_running()
    }

    /// Spawn `num_workers` scan workers. Fails if workers are already up.
    pub fn initialize_workers(&self, num_workers: usize) -> Result<()> {
        self.pool.initialize(num_workers)
    }

    /// Drain and join the worker pool. Subsequent searches run inline until
    /// [`initialize_workers`](Self::initialize_workers) is called again.
    pub fn shutdown_workers(&self) {
        self.pool.shutdown();
    }

    /// Top-k search over the index.
    ///
    /// `queries` is a dense row-major `N×d` buffer. With a parent index the
    /// top-`nprobe` partitions are selected per query; without one every
    /// live partition is scanned and `batched_scan` is forced on, since
    /// serial scanning degenerates over a single conceptual partition.
    pub fn search(&self, queries: &[f32], params: &SearchParams) -> Result<SearchResult> {
        let start = Instant::now();
        let store = self.store()?;
        let dim = store.dim();
        validate_inputs(queries, dim, params)?;

        let num_queries = queries.len() / dim;
        if num_queries == 0 {
            return Ok(SearchResult::empty(params.k));
        }

        let mut timing = TimingInfo::default();
        let (assignment, width, batched) = match &self.parent {
            Some(parent) => {
                // Unset or zero nprobe falls back to a single probe.
                let nprobe = params.nprobe.filter(|&n| n > 0).unwrap_or(1);
                let parent_start = Instant::now();
                let (_, partition_ids) = parent
                    .search(queries, nprobe)
                    .map_err(|err| Error::backend(format!("parent index search failed: {err}")))?;
                timing.parent = Some(Box::new(TimingInfo {
                    total_ns: elapsed_ns(parent_start),
                    ..TimingInfo::default()
                }));
                debug!(num_queries, nprobe, "selected partitions through parent index");
                (partition_ids, nprobe, params.batched_scan)
            }
            None => {
                // Flat path: every query scans all live partitions.
                let partition_ids = store.partition_ids();
                let width = partition_ids.len();
                let mut assignment = Vec::with_capacity(num_queries * width);
                for _ in 0..num_queries {
                    assignment.extend_from_slice(&partition_ids);
                }
                if !params.batched_scan {
                    debug!("null parent forces batched_scan = true");
                }
                (assignment, width, true)
            }
        };

        let mut result =
            self.execute_scan(store, queries, num_queries, &assignment, width, params, batched, timing)?;
        result.timing.total_ns = elapsed_ns(start);
        counter!("quiver_search_requests_total", 1);
        histogram!(
            "quiver_search_latency_seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    /// Lower-level entry that skips the partition selector and scans a
    /// caller-supplied `N×P` partition assignment. `-1` entries are no-op
    /// slots; `P` may be zero, in which case every rank comes back as a
    /// sentinel.
    pub fn scan_partitions(
        &self,
        queries: &[f32],
        partition_ids: &[PartitionId],
        params: &SearchParams,
    ) -> Result<SearchResult> {
        let start = Instant::now();
        let store = self.store()?;
        let dim = store.dim();
        validate_inputs(queries, dim, params)?;

        let num_queries = queries.len() / dim;
        if num_queries == 0 {
            return Ok(SearchResult::empty(params.k));
        }
        if partition_ids.len() % num_queries != 0 {
            return Err(Error::invalid_input(format!(
                "partition assignment length {} is not a multiple of {num_queries} queries",
                partition_ids.len()
            )));
        }
        let width = partition_ids.len() / num_queries;

        let mut result = self.execute_scan(
            store,
            queries,
            num_queries,
            partition_ids,
            width,
            params,
            params.batched_scan,
            TimingInfo::default(),
        )?;
        result.timing.total_ns = elapsed_ns(start);
        counter!("quiver_search_requests_total", 1);
        histogram!(
            "quiver_search_latency_seconds",
            start.elapsed().as_secs_f64()
        );
        Ok(result)
    }

    fn store(&self) -> Result<Arc<PartitionStore>> {
        self.partitions
            .clone()
            .ok_or_else(|| Error::invalid_state("partition store is not attached"))
    }

    /// Shared tail of `search` and `scan_partitions`: build the filter
    /// state, run the scan jobs inline or on the pool, merge partials, and
    /// assemble the ranked result.
    #[allow(clippy::too_many_arguments)]
    fn execute_scan(
        &self,
        store: Arc<PartitionStore>,
        queries: &[f32],
        num_queries: usize,
        assignment: &[PartitionId],
        width: usize,
        params: &SearchParams,
        batched: bool,
        mut timing: TimingInfo,
    ) -> Result<SearchResult> {
        let mut prefilter: Option<Arc<HashSet<VectorId>>> = None;
        let mut postfilter: Option<HashSet<VectorId>> = None;
        if let Some(filter) = &params.filter {
            let table = self.attributes.as_ref().ok_or_else(|| {
                Error::invalid_state("filtering requires an attribute table")
            })?;
            let passing = table.passing_ids(&filter.column, filter.op, &filter.value)?;
            match filter.strategy {
                FilterStrategy::Pre => prefilter = Some(Arc::new(passing)),
                FilterStrategy::Post => postfilter = Some(passing),
            }
        }
        let fetch_k = if postfilter.is_some() {
            params.k.saturating_mul(self.config.overfetch_factor)
        } else {
            params.k
        };

        let buffer_start = Instant::now();
        let mut buffers: Vec<TopKBuffer> = (0..num_queries)
            .map(|_| TopKBuffer::new(fetch_k, self.metric))
            .collect();
        timing.buffer_init_ns = elapsed_ns(buffer_start);

        let jobs = build_jobs(assignment, width, num_queries, batched);
        debug!(
            num_queries,
            batched,
            num_jobs = jobs.len(),
            fetch_k,
            "dispatching scan jobs"
        );

        let ctx = Arc::new(ScanContext {
            queries: Arc::new(queries.to_vec()),
            dim: store.dim(),
            fetch_k,
            metric: self.metric,
            store,
            mask: prefilter,
        });

        if self.pool.is_running() {
            self.run_pooled(&ctx, jobs, &mut buffers, &mut timing)?;
        } else {
            for job in jobs {
                for (query, partial) in run_job(&ctx, job)? {
                    buffers[query].merge(partial);
                }
            }
        }

        let aggregate_start = Instant::now();
        let k = params.k;
        let sentinel = self.metric.sentinel();
        let mut ids = Vec::with_capacity(num_queries * k);
        let mut distances = Vec::with_capacity(num_queries * k);
        for buffer in buffers {
            let ranked = buffer.into_ranked();
            match &postfilter {
                Some(passing) => {
                    let mut kept = 0;
                    for (distance, id) in ranked {
                        if kept == k {
                            break;
                        }
                        if id != NO_ID && passing.contains(&id) {
                            distances.push(distance);
                            ids.push(id);
                            kept += 1;
                        }
                    }
                    for _ in kept..k {
                        distances.push(sentinel);
                        ids.push(NO_ID);
                    }
                }
                None => {
                    for (distance, id) in ranked {
                        distances.push(distance);
                        ids.push(id);
                    }
                }
            }
        }
        timing.result_aggregate_ns += elapsed_ns(aggregate_start);

        Ok(SearchResult {
            num_queries,
            k,
            ids,
            distances,
            timing,
        })
    }

    /// Fan scan jobs out to the worker pool and merge the partial buffers.
    ///
    /// The reply channel is the completion latch: exactly one reply arrives
    /// per enqueued job, errors included, so waiting for `enqueued` replies
    /// guarantees no job is left mid-state before an error is re-raised.
    fn run_pooled(
        &self,
        ctx: &Arc<ScanContext>,
        jobs: Vec<ScanJob>,
        buffers: &mut [TopKBuffer],
        timing: &mut TimingInfo,
    ) -> Result<()> {
        let sender = self.pool.job_sender()?;
        let (reply_tx, reply_rx) = unbounded();

        let enqueue_start = Instant::now();
        let mut enqueued = 0usize;
        let mut submit_error: Option<Error> = None;
        for job in jobs {
            let request = JobRequest {
                ctx: Arc::clone(ctx),
                job,
                reply: reply_tx.clone(),
            };
            if sender.send(request).is_err() {
                submit_error = Some(Error::cancelled(
                    "worker pool shut down while enqueueing scan jobs",
                ));
                break;
            }
            enqueued += 1;
        }
        drop(reply_tx);
        timing.job_enqueue_ns = elapsed_ns(enqueue_start);

        let wait_start = Instant::now();
        let mut job_error: Option<Error> = None;
        for _ in 0..enqueued {
            match reply_rx.recv() {
                Ok(reply) => match reply.partials {
                    Ok(partials) => {
                        for (query, partial) in partials {
                            buffers[query].merge(partial);
                        }
                    }
                    Err(err) => {
                        if job_error.is_none() {
                            job_error = Some(err);
                        }
                    }
                },
                Err(_) => {
                    if job_error.is_none() {
                        job_error = Some(Error::backend(
                            "scan workers exited before all jobs completed",
                        ));
                    }
                    break;
                }
            }
        }
        timing.job_wait_ns = elapsed_ns(wait_start);

        match job_error.or(submit_error) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn validate_inputs(queries: &[f32], dim: usize, params: &SearchParams) -> Result<()> {
    if params.k == 0 {
        return Err(Error::invalid_input("k must be positive"));
    }
    if queries.len() % dim != 0 {
        return Err(Error::invalid_input(format!(
            "query buffer length {} is not a multiple of dim {dim}",
            queries.len()
        )));
    }
    Ok(())
}

/// Turn the `N×width` partition assignment into scan jobs. Batched jobs are
/// keyed by partition and carry every query routed to it; serial jobs keep
/// the per-query selector order. `-1` slots and repeated assignments are
/// dropped.
fn build_jobs(
    assignment: &[PartitionId],
    width: usize,
    num_queries: usize,
    batched: bool,
) -> Vec<ScanJob> {
    let row = |q: usize| &assignment[q * width..(q + 1) * width];

    if batched {
        let mut routed: BTreeMap<PartitionId, Vec<usize>> = BTreeMap::new();
        for query in 0..num_queries {
            for &partition in row(query) {
                if partition == NO_PARTITION {
                    continue;
                }
                let queries = routed.entry(partition).or_default();
                if queries.last() != Some(&query) {
                    queries.push(query);
                }
            }
        }
        routed
            .into_iter()
            .map(|(partition, queries)| ScanJob::Batched { partition, queries })
            .collect()
    } else {
        let mut jobs = Vec::new();
        for query in 0..num_queries {
            let mut seen: Vec<PartitionId> = Vec::with_capacity(width);
            for &partition in row(query) {
                if partition == NO_PARTITION || seen.contains(&partition) {
                    continue;
                }
                seen.push(partition);
                jobs.push(ScanJob::Serial { query, partition });
            }
        }
        jobs
    }
}

fn elapsed_ns(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_nanos()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batched_jobs_group_queries_by_partition() {
        // Two queries probing overlapping partitions.
        let assignment = [0, 2, 2, 1];
        let jobs = build_jobs(&assignment, 2, 2, true);
        assert_eq!(jobs.len(), 3);
        match &jobs[0] {
            ScanJob::Batched { partition, queries } => {
                assert_eq!(*partition, 0);
                assert_eq!(queries, &[0]);
            }
            other => panic!("unexpected job {other:?}"),
        }
        match &jobs[2] {
            ScanJob::Batched { partition, queries } => {
                assert_eq!(*partition, 2);
                assert_eq!(queries, &[0, 1]);
            }
            other => panic!("unexpected job {other:?}"),
        }
    }

    #[test]
    fn sentinel_slots_produce_no_jobs() {
        let assignment = [NO_PARTITION, NO_PARTITION];
        assert!(build_jobs(&assignment, 1, 2, true).is_empty());
        assert!(build_jobs(&assignment, 1, 2, false).is_empty());
    }

    #[test]
    fn serial_jobs_preserve_selector_order() {
        let assignment = [3, 1, 3];
        let jobs = build_jobs(&assignment, 3, 1, false);
        let partitions: Vec<PartitionId> = jobs
            .iter()
            .map(|job| match job {
                ScanJob::Serial { partition, .. } => *partition,
                other => panic!("unexpected job {other:?}"),
            })
            .collect();
        // Duplicate probe of partition 3 collapses, order kept.
        assert_eq!(partitions, vec![3, 1]);
    }
}
