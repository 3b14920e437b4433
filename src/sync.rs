// ⚡ Parallel Sync Executor - shard, classify, batch-write, aggregate
//
// Candidates are split into ceil(N / P) contiguous shards. Each shard runs on
// its own scoped thread: point lookup per entity, one batched write per
// shard. Shards own disjoint identifiers, so the only shared mutable state is
// the pair of atomic counters.
//
// A failing shard is retried on its own and then reported; healthy shards
// keep their committed writes.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use tracing::{debug, info, warn};

use crate::change::{ChangeDetector, ChangeKind};
use crate::context::RunContext;
use crate::entities::{CanonicalEntity, DataSource};
use crate::error::{CommittedCounts, SyncError};
use crate::filter::last_wins;
use crate::retry::RetryPolicy;
use crate::store::{find_entity, EntityStore, WriteOp};

/// Hardware parallelism, never below 1.
pub fn default_parallelism() -> usize {
    num_cpus::get().max(1)
}

/// Shard length for `count` entities over `parallelism` workers.
pub fn shard_size(count: usize, parallelism: usize) -> usize {
    let workers = parallelism.max(1);
    count.div_ceil(workers).max(1)
}

/// Candidates with an identifier, one per identifier (last wins), plus the
/// number dropped as invalid and as duplicates.
fn unique_candidates<E: CanonicalEntity>(entities: &[E]) -> (Vec<&E>, usize, usize) {
    let with_identifier: Vec<&E> = entities.iter().filter(|e| !e.identifier().is_empty()).collect();
    let invalid = entities.len() - with_identifier.len();
    let (unique, duplicates) = last_wins(with_identifier, |e| e.identifier().to_string());
    (unique, invalid, duplicates)
}

// ============================================================================
// REPORTING
// ============================================================================

#[derive(Debug)]
pub struct ShardFailure {
    pub shard: usize,
    pub entities: usize,
    pub error: SyncError,
}

#[derive(Debug, Serialize)]
pub struct SyncReport {
    pub entity_type: &'static str,
    pub candidates: usize,
    pub inserts: u64,
    pub updates: u64,
    pub noops: u64,

    /// Candidates dropped for having an empty identifier
    pub skipped_invalid: usize,

    /// Earlier candidates replaced by a later one with the same identifier
    pub skipped_duplicates: usize,

    #[serde(skip)]
    pub failed_shards: Vec<ShardFailure>,
}

impl SyncReport {
    /// Report with no work done yet
    pub fn new(entity_type: &'static str, candidates: usize) -> Self {
        SyncReport {
            entity_type,
            candidates,
            inserts: 0,
            updates: 0,
            noops: 0,
            skipped_invalid: 0,
            skipped_duplicates: 0,
            failed_shards: Vec::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed_shards.is_empty()
    }

    /// Writes committed by this run.
    pub fn committed(&self) -> CommittedCounts {
        CommittedCounts {
            entity_type: self.entity_type,
            inserts: self.inserts,
            updates: self.updates,
        }
    }

    /// Collapse shard failures into one error. Cancellation and deadline take
    /// precedence over backend failures so callers see why the run stopped;
    /// every variant carries the counts committed before the failure.
    pub fn into_result(self) -> Result<SyncReport, SyncError> {
        if self.failed_shards.is_empty() {
            return Ok(self);
        }

        let failed = |wanted: &SyncError| {
            self.failed_shards
                .iter()
                .any(|f| std::mem::discriminant(&f.error) == std::mem::discriminant(wanted))
        };
        let reason = [SyncError::Cancelled, SyncError::DeadlineExceeded]
            .into_iter()
            .find(|reason| failed(reason));

        if let Some(reason) = reason {
            return Err(SyncError::Interrupted {
                committed: self.committed(),
                reason: Box::new(reason),
            });
        }

        Err(SyncError::PartialFailure {
            entity_type: self.entity_type,
            inserts: self.inserts,
            updates: self.updates,
            failed_shards: self.failed_shards.len(),
        })
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct ShardOutcome {
    inserts: u64,
    updates: u64,
    noops: u64,
}

// ============================================================================
// EXECUTOR
// ============================================================================

pub struct SyncExecutor<'s> {
    store: &'s dyn EntityStore,
    parallelism: usize,
    retry: RetryPolicy,
    ctx: RunContext,
}

impl<'s> SyncExecutor<'s> {
    pub fn new(store: &'s dyn EntityStore) -> Self {
        SyncExecutor {
            store,
            parallelism: default_parallelism(),
            retry: RetryPolicy::default(),
            ctx: RunContext::new(),
        }
    }

    /// Worker count; 0 means hardware parallelism.
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = if parallelism == 0 {
            default_parallelism()
        } else {
            parallelism
        };
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_context(mut self, ctx: RunContext) -> Self {
        self.ctx = ctx;
        self
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    /// Synchronize one entity type, stamping writes with the current time.
    pub fn sync<E: CanonicalEntity>(&self, entities: &[E], datasource: &DataSource) -> SyncReport {
        self.sync_at(entities, datasource, Utc::now())
    }

    /// Synchronize one entity type with an explicit run timestamp.
    pub fn sync_at<E: CanonicalEntity>(
        &self,
        entities: &[E],
        datasource: &DataSource,
        now: DateTime<Utc>,
    ) -> SyncReport {
        let mut report = SyncReport::new(E::ENTITY_TYPE, entities.len());

        let (valid, skipped_invalid, skipped_duplicates) = unique_candidates(entities);
        report.skipped_invalid = skipped_invalid;
        report.skipped_duplicates = skipped_duplicates;
        if skipped_invalid > 0 {
            warn!(
                entity_type = E::ENTITY_TYPE,
                skipped = skipped_invalid,
                "dropping candidates without an identifier"
            );
        }
        if skipped_duplicates > 0 {
            warn!(
                entity_type = E::ENTITY_TYPE,
                duplicates = skipped_duplicates,
                "duplicate identifiers, keeping the last candidate"
            );
        }

        if valid.is_empty() {
            info!(entity_type = E::ENTITY_TYPE, "nothing to sync");
            return report;
        }

        let chunk = shard_size(valid.len(), self.parallelism);
        let shards: Vec<&[&E]> = valid.chunks(chunk).collect();
        info!(
            entity_type = E::ENTITY_TYPE,
            candidates = valid.len(),
            shards = shards.len(),
            shard_size = chunk,
            "starting sync"
        );

        let detector = ChangeDetector::new(datasource.clone(), now);
        let inserts = AtomicU64::new(0);
        let updates = AtomicU64::new(0);
        let noops = AtomicU64::new(0);

        let failures: Vec<ShardFailure> = thread::scope(|scope| {
            let handles: Vec<_> = shards
                .iter()
                .enumerate()
                .map(|(index, shard)| {
                    let detector = &detector;
                    let (inserts, updates, noops) = (&inserts, &updates, &noops);
                    let handle = scope.spawn(move || {
                        let outcome = self.retry.run(
                            &self.ctx,
                            E::ENTITY_TYPE,
                            |attempt| {
                                debug!(entity_type = E::ENTITY_TYPE, shard = index, attempt, "running shard");
                                self.run_shard(shard, detector)
                            },
                            SyncError::is_retryable,
                        )?;

                        inserts.fetch_add(outcome.inserts, Ordering::Relaxed);
                        updates.fetch_add(outcome.updates, Ordering::Relaxed);
                        noops.fetch_add(outcome.noops, Ordering::Relaxed);
                        Ok::<(), SyncError>(())
                    });
                    (index, shard.len(), handle)
                })
                .collect();

            handles
                .into_iter()
                .filter_map(|(shard, entities, handle)| {
                    let error = match handle.join() {
                        Ok(Ok(())) => return None,
                        Ok(Err(error)) => error,
                        Err(_) => SyncError::WorkerPanicked(shard),
                    };
                    Some(ShardFailure {
                        shard,
                        entities,
                        error,
                    })
                })
                .collect()
        });

        report.inserts = inserts.load(Ordering::Relaxed);
        report.updates = updates.load(Ordering::Relaxed);
        report.noops = noops.load(Ordering::Relaxed);

        for failure in &failures {
            warn!(
                entity_type = E::ENTITY_TYPE,
                shard = failure.shard,
                entities = failure.entities,
                error = %failure.error,
                "shard failed"
            );
        }
        report.failed_shards = failures;

        info!(
            entity_type = E::ENTITY_TYPE,
            inserts = report.inserts,
            updates = report.updates,
            noops = report.noops,
            failed_shards = report.failed_shards.len(),
            "sync complete"
        );

        report
    }

    /// One attempt at one shard: lookups, classification, one batched write.
    fn run_shard<E: CanonicalEntity>(
        &self,
        shard: &[&E],
        detector: &ChangeDetector,
    ) -> Result<ShardOutcome, SyncError> {
        let mut outcome = ShardOutcome::default();
        let mut ops: Vec<WriteOp> = Vec::new();

        for candidate in shard {
            self.ctx.check()?;
            let persisted: Option<E> = find_entity(self.store, candidate.identifier())?;

            let change = detector.detect(persisted.as_ref(), *candidate)?;
            match change.kind() {
                ChangeKind::Create => outcome.inserts += 1,
                ChangeKind::Update => outcome.updates += 1,
                ChangeKind::NoOp => outcome.noops += 1,
            }
            if let Some(op) = change.into_write() {
                ops.push(op);
            }
        }

        if !ops.is_empty() {
            self.ctx.check()?;
            self.store.bulk_write(E::COLLECTION, &ops)?;
        }

        Ok(outcome)
    }

    /// Classify every candidate without writing anything.
    pub fn plan<E: CanonicalEntity>(
        &self,
        entities: &[E],
    ) -> Result<BTreeMap<String, ChangeKind>, SyncError> {
        let (valid, _, _) = unique_candidates(entities);
        if valid.is_empty() {
            return Ok(BTreeMap::new());
        }

        let chunk = shard_size(valid.len(), self.parallelism);

        thread::scope(|scope| {
            let handles: Vec<_> = valid
                .chunks(chunk)
                .enumerate()
                .map(|(index, shard)| {
                    let handle = scope.spawn(move || {
                        let mut planned = Vec::with_capacity(shard.len());
                        for candidate in shard {
                            self.ctx.check()?;
                            let persisted: Option<E> =
                                find_entity(self.store, candidate.identifier())?;
                            planned.push((
                                candidate.identifier().to_string(),
                                crate::change::classify(persisted.as_ref(), *candidate),
                            ));
                        }
                        Ok::<_, SyncError>(planned)
                    });
                    (index, handle)
                })
                .collect();

            let mut plan = BTreeMap::new();
            for (index, handle) in handles {
                let planned = handle.join().map_err(|_| SyncError::WorkerPanicked(index))??;
                plan.extend(planned);
            }
            Ok(plan)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::Operator;
    use crate::store::SqliteStore;
    use chrono::TimeZone;

    fn datasource() -> DataSource {
        DataSource::new("traveline-noc", "Traveline", "NOC")
    }

    fn operators(n: usize) -> Vec<Operator> {
        (0..n)
            .map(|i| Operator::new(&format!("GB:NOC:OP{i:03}"), &format!("Operator {i}")))
            .collect()
    }

    fn store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store.ensure_index(crate::store::Collection::Operators).unwrap();
        store
    }

    #[test]
    fn test_shard_size() {
        assert_eq!(shard_size(10, 4), 3);
        assert_eq!(shard_size(8, 4), 2);
        assert_eq!(shard_size(3, 8), 1);
        assert_eq!(shard_size(5, 0), 5);
        assert_eq!(shard_size(0, 4), 1);
    }

    #[test]
    fn test_never_more_shards_than_entities() {
        let n = 3;
        let shards = (0..n).collect::<Vec<_>>().chunks(shard_size(n, 16)).count();
        assert_eq!(shards, n);
    }

    #[test]
    fn test_second_run_is_idempotent() {
        let store = store();
        let executor = SyncExecutor::new(&store).with_parallelism(4);
        let candidates = operators(25);

        let first = executor.sync(&candidates, &datasource());
        assert_eq!((first.inserts, first.updates), (25, 0));

        let second = executor.sync(&candidates, &datasource());
        assert_eq!((second.inserts, second.updates, second.noops), (0, 0, 25));
        assert!(second.is_success());

        println!("✅ Idempotent sync test PASSED");
    }

    #[test]
    fn test_update_preserves_creation_time() {
        let store = store();
        let executor = SyncExecutor::new(&store).with_parallelism(2);
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 8, 0, 0, 0).unwrap();

        let mut candidates = operators(3);
        executor.sync_at(&candidates, &datasource(), t0);

        candidates[1].licence = "PB0001234".to_string();
        let report = executor.sync_at(&candidates, &datasource(), t1);
        assert_eq!((report.inserts, report.updates, report.noops), (0, 1, 2));

        let stored: Operator = find_entity(&store, "GB:NOC:OP001").unwrap().unwrap();
        assert_eq!(stored.creation_date_time, Some(t0));
        assert_eq!(stored.modification_date_time, Some(t1));

        let untouched: Operator = find_entity(&store, "GB:NOC:OP000").unwrap().unwrap();
        assert_eq!(untouched.modification_date_time, Some(t0));
    }

    #[test]
    fn test_empty_identifiers_are_skipped() {
        let store = store();
        let mut candidates = operators(2);
        candidates.push(Operator::default());

        let report = SyncExecutor::new(&store).sync(&candidates, &datasource());

        assert_eq!(report.skipped_invalid, 1);
        assert_eq!(report.inserts, 2);
    }

    #[test]
    fn test_plan_is_partition_invariant() {
        let store = store();
        let mut seeded = operators(40);
        SyncExecutor::new(&store)
            .with_parallelism(1)
            .sync(&seeded[..20], &datasource());

        // 10 unchanged, 10 changed, 20 new
        for op in seeded.iter_mut().skip(10).take(10) {
            op.website = "https://example.com".to_string();
        }

        let reference = SyncExecutor::new(&store).with_parallelism(1).plan(&seeded).unwrap();
        for parallelism in [4, seeded.len()] {
            let plan = SyncExecutor::new(&store)
                .with_parallelism(parallelism)
                .plan(&seeded)
                .unwrap();
            assert_eq!(plan, reference, "parallelism {parallelism}");
        }

        let creates = reference.values().filter(|k| **k == ChangeKind::Create).count();
        let updates = reference.values().filter(|k| **k == ChangeKind::Update).count();
        assert_eq!((creates, updates), (20, 10));
    }

    #[test]
    fn test_cancelled_run_reports_cancellation() {
        let store = store();
        let ctx = RunContext::new();
        ctx.cancel();

        let report = SyncExecutor::new(&store)
            .with_context(ctx)
            .sync(&operators(5), &datasource());

        assert!(!report.is_success());
        match report.into_result() {
            Err(SyncError::Interrupted { committed, reason }) => {
                assert!(matches!(*reason, SyncError::Cancelled));
                assert_eq!((committed.inserts, committed.updates), (0, 0));
            }
            other => panic!("expected interrupted run, got {:?}", other),
        }
        assert_eq!(store.count(crate::store::Collection::Operators).unwrap(), 0);
    }

    #[test]
    fn test_stopped_run_keeps_committed_counts() {
        let mut report = SyncReport::new(Operator::ENTITY_TYPE, 10);
        report.inserts = 5;
        report.updates = 2;
        report.failed_shards = vec![
            ShardFailure {
                shard: 2,
                entities: 3,
                error: SyncError::DeadlineExceeded,
            },
            ShardFailure {
                shard: 1,
                entities: 2,
                error: SyncError::Cancelled,
            },
        ];

        let err = report.into_result().unwrap_err();

        assert!(err.is_stop());
        match err {
            SyncError::Interrupted { committed, reason } => {
                assert_eq!(committed.entity_type, Operator::ENTITY_TYPE);
                assert_eq!((committed.inserts, committed.updates), (5, 2));
                assert!(matches!(*reason, SyncError::Cancelled));
            }
            other => panic!("expected interrupted run, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_candidates_do_not_poison_a_shard() {
        let store = store();
        let mut candidates = operators(4);
        let mut renamed = candidates[0].clone();
        renamed.primary_name = "Renamed".to_string();
        candidates.push(renamed);

        // One shard holds every candidate, duplicate included
        let report = SyncExecutor::new(&store)
            .with_parallelism(1)
            .sync(&candidates, &datasource());

        assert!(report.is_success());
        assert_eq!(report.inserts, 4);
        assert_eq!(report.skipped_duplicates, 1);

        let stored: Operator = find_entity(&store, "GB:NOC:OP000").unwrap().unwrap();
        assert_eq!(stored.primary_name, "Renamed");
    }
}
