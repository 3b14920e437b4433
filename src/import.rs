// 📥 Import Pipeline - resolve → filter → sync → notify
//
// Entity types are synced one after another (operators, then groups) so the
// second run sees identifiers written by the first. A notification is sent
// for every run that gets as far as syncing, partial ones included.

use serde_json::json;
use tracing::info;

use crate::context::RunContext;
use crate::contact::ContactClassifier;
use crate::entities::{CanonicalEntity, DataSource, OperatorGroup, Stop};
use crate::error::{StoreError, SyncError};
use crate::notify::{send_best_effort, Notifier};
use crate::retry::RetryPolicy;
use crate::sources::NocTables;
use crate::store::{Collection, EntityStore};
use crate::sync::{default_parallelism, SyncExecutor, SyncReport};

pub const NOC_IMPORT_TOPIC: &str = "transit-sync/traveline/import";
pub const STOPS_IMPORT_TOPIC: &str = "transit-sync/naptan/import";

#[derive(Debug)]
pub struct NocImportSummary {
    pub operators: SyncReport,
    pub operator_groups: SyncReport,
}

pub struct ImportPipeline<'a> {
    store: &'a dyn EntityStore,
    notifier: &'a dyn Notifier,
    classifier: ContactClassifier,
    parallelism: usize,
    retry: RetryPolicy,
    ctx: RunContext,
}

impl<'a> ImportPipeline<'a> {
    pub fn new(store: &'a dyn EntityStore, notifier: &'a dyn Notifier) -> Self {
        ImportPipeline {
            store,
            notifier,
            classifier: ContactClassifier::default(),
            parallelism: default_parallelism(),
            retry: RetryPolicy::default(),
            ctx: RunContext::new(),
        }
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
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

    pub fn with_classifier(mut self, classifier: ContactClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    fn executor(&self) -> SyncExecutor<'a> {
        SyncExecutor::new(self.store)
            .with_parallelism(self.parallelism)
            .with_retry(self.retry.clone())
            .with_context(self.ctx.clone())
    }

    /// Create identifier indices for every collection.
    pub fn ensure_indexes(&self) -> Result<(), StoreError> {
        for collection in Collection::ALL {
            self.store.ensure_index(collection)?;
        }
        Ok(())
    }

    pub fn import_noc(&self, tables: &NocTables, dataset: &str) -> Result<NocImportSummary, SyncError> {
        let datasource = tables.datasource(dataset);
        self.store.ensure_index(Collection::Operators)?;
        self.store.ensure_index(Collection::OperatorGroups)?;

        info!(run = %datasource.identifier, "converting NOC tables");
        let (operators, operator_groups) = tables.resolve(&self.classifier);
        info!(
            operators = operators.len(),
            operator_groups = operator_groups.len(),
            "resolved canonical entities"
        );

        let executor = self.executor();
        let operators = executor.sync(&operators, &datasource);

        // A cancelled run stops before the next entity type
        let stopped = self.ctx.check().err();
        let operator_groups = match stopped {
            None => executor.sync(&operator_groups, &datasource),
            Some(_) => SyncReport::new(OperatorGroup::ENTITY_TYPE, operator_groups.len()),
        };

        send_best_effort(
            self.notifier,
            NOC_IMPORT_TOPIC,
            &json!({
                "Operators": {
                    "Inserts": operators.inserts,
                    "Updates": operators.updates,
                },
                "Operator_Groups": {
                    "Inserts": operator_groups.inserts,
                    "Updates": operator_groups.updates,
                },
            }),
        );

        let operators = operators.into_result()?;
        let after_operators = |source: SyncError| SyncError::ImportIncomplete {
            committed: vec![operators.committed()],
            source: Box::new(source),
        };
        if let Some(stop) = stopped {
            return Err(after_operators(stop));
        }
        let operator_groups = operator_groups.into_result().map_err(after_operators)?;

        let summary = NocImportSummary {
            operators,
            operator_groups,
        };
        info!("successfully imported NOC dataset");
        Ok(summary)
    }

    pub fn import_stops(&self, stops: &[Stop], datasource: &DataSource) -> Result<SyncReport, SyncError> {
        self.store.ensure_index(Collection::Stops)?;

        let report = self.executor().sync(stops, datasource);

        send_best_effort(
            self.notifier,
            STOPS_IMPORT_TOPIC,
            &json!({
                "Stops": {
                    "Inserts": report.inserts,
                    "Updates": report.updates,
                },
            }),
        );

        report.into_result()
    }
}
