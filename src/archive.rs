// 🗃️ Archival Pipeline - roll aged real-time journeys into cold storage
//
// Per journey: Selected → Snapshotted → {WrittenIndividually?, AppendedToBundle?} → Done
// Source records are only read. Deleting them belongs to a separate retention
// process.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::context::RunContext;
use crate::entities::{
    ArchivedJourney, ArchivedJourneyStop, Journey, RealtimeJourney, Service,
};
use crate::error::{ArchiveError, StoreError, SyncError};
use crate::hashing::ContentHasher;
use crate::object_store::ObjectStore;
use crate::retry::RetryPolicy;
use crate::store::{find_entity, Collection, EntityStore};

/// Permission bits for synthetic bundle entries
pub const BUNDLE_ENTRY_MODE: u32 = 0o644;

// ============================================================================
// OPTIONS
// ============================================================================

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub output_directory: PathBuf,

    /// Journeys untouched for longer than this are archived
    pub window: Duration,

    pub write_individual_files: bool,
    pub write_bundle: bool,

    pub cloud_upload: bool,
    pub bucket_name: String,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        ArchiveOptions {
            output_directory: PathBuf::from("archive"),
            window: Duration::hours(24),
            write_individual_files: false,
            write_bundle: true,
            cloud_upload: false,
            bucket_name: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ArchiveReport {
    pub run_started: Option<DateTime<Utc>>,
    pub cutoff: Option<DateTime<Utc>>,

    /// Journeys selected and snapshotted
    pub records: usize,

    /// Documents that could not be decoded
    pub skipped: usize,

    pub individual_files: usize,
    pub individual_file_errors: usize,

    pub bundle_path: Option<PathBuf>,
    pub bundle_entries: usize,

    /// Set when the bundle could not be completed; no upload happens then
    pub bundle_error: Option<String>,

    pub uploaded: bool,
}

// ============================================================================
// NAMING
// ============================================================================

/// `now - window`; only journeys modified strictly before it are selected.
pub fn retention_cutoff(now: DateTime<Utc>, window: Duration) -> DateTime<Utc> {
    now - window
}

/// Bundle filename for a run, e.g. `2024-01-02T00:00:00Z.tar.gz`.
pub fn bundle_filename(run_started: DateTime<Utc>) -> String {
    format!(
        "{}.tar.gz",
        run_started.to_rfc3339_opts(SecondsFormat::Secs, true)
    )
}

/// Per-journey filename with path-unsafe characters replaced by `_`.
pub fn archive_filename(primary_identifier: &str) -> String {
    let safe: String = primary_identifier
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    format!("{}.json", safe)
}

/// Filename for an identifier whose sanitized name is already taken in this
/// run, e.g. `A:B` after `A/B`. The suffix is the head of a digest of the raw
/// identifier, so the same journey always lands on the same name.
pub fn disambiguated_filename(primary_identifier: &str) -> String {
    let plain = archive_filename(primary_identifier);
    let stem = plain.trim_end_matches(".json");
    let digest = ContentHasher::new("archive")
        .field("PrimaryIdentifier", primary_identifier)
        .finish();
    format!("{}-{}.json", stem, &digest[..8])
}

// ============================================================================
// SNAPSHOT
// ============================================================================

/// Join a real-time journey against its timetable.
///
/// With a scheduled journey, stops follow timetable order and always carry
/// expected times. Without one, the observed stops are ordered by arrival and
/// expected times are absent.
pub fn to_archived_journey(
    realtime: &RealtimeJourney,
    journey: Option<&Journey>,
    service: Option<&Service>,
) -> ArchivedJourney {
    let stops = match journey {
        Some(journey) => journey
            .flatten_stops()
            .into_iter()
            .map(|visit| {
                let observed = realtime.stops.get(&visit.stop_ref);
                ArchivedJourneyStop {
                    stop_ref: visit.stop_ref,
                    expected_arrival_time: Some(visit.arrival_time),
                    expected_departure_time: Some(visit.departure_time),
                    has_actual_data: observed.is_some(),
                    actual_arrival_time: observed.map(|s| s.arrival_time),
                    actual_departure_time: observed.map(|s| s.departure_time),
                }
            })
            .collect(),
        None => {
            let mut observed: Vec<_> = realtime.stops.values().collect();
            observed.sort_by_key(|s| s.arrival_time);
            observed
                .into_iter()
                .map(|s| ArchivedJourneyStop {
                    stop_ref: s.stop_ref.clone(),
                    expected_arrival_time: None,
                    expected_departure_time: None,
                    has_actual_data: true,
                    actual_arrival_time: Some(s.arrival_time),
                    actual_departure_time: Some(s.departure_time),
                })
                .collect()
        }
    };

    ArchivedJourney {
        primary_identifier: realtime.primary_identifier.clone(),
        journey_ref: realtime.journey_ref.clone(),
        service_ref: journey.map(|j| j.service_ref.clone()).unwrap_or_default(),
        service_name: service.map(|s| s.service_name.clone()).unwrap_or_default(),
        operator_ref: journey.map(|j| j.operator_ref.clone()).unwrap_or_default(),
        creation_date_time: realtime.creation_date_time,
        modification_date_time: realtime.modification_date_time,
        data_source: realtime.data_source.clone(),
        stops,
        reliability: realtime.reliability,
        vehicle_ref: realtime.vehicle_ref.clone(),
    }
}

// ============================================================================
// BUNDLE WRITER
// ============================================================================

/// Streaming `.tar.gz` writer for in-memory entries.
pub struct BundleWriter {
    path: PathBuf,
    builder: tar::Builder<GzEncoder<BufWriter<File>>>,
    mtime: u64,
    entries: usize,
}

impl BundleWriter {
    pub fn create(path: &Path, run_started: DateTime<Utc>) -> io::Result<Self> {
        let file = File::create(path)?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());

        Ok(BundleWriter {
            path: path.to_path_buf(),
            builder: tar::Builder::new(encoder),
            mtime: run_started.timestamp().max(0) as u64,
            entries: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> usize {
        self.entries
    }

    /// Append one entry: fixed mode, size = payload length, mtime = run start.
    pub fn append(&mut self, name: &str, payload: &[u8]) -> io::Result<()> {
        let mut header = tar::Header::new_gnu();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(payload.len() as u64);
        header.set_mode(BUNDLE_ENTRY_MODE);
        header.set_mtime(self.mtime);

        self.builder.append_data(&mut header, name, payload)?;
        self.entries += 1;
        Ok(())
    }

    /// Write the tar trailer, flush the gzip stream and sync to disk.
    pub fn finish(self) -> io::Result<PathBuf> {
        let encoder = self.builder.into_inner()?;
        let writer = encoder.finish()?;
        let file = writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(self.path)
    }
}

// ============================================================================
// ARCHIVER
// ============================================================================

pub struct Archiver<'a> {
    store: &'a dyn EntityStore,
    object_store: Option<&'a dyn ObjectStore>,
    options: ArchiveOptions,
    retry: RetryPolicy,
    ctx: RunContext,
}

impl<'a> Archiver<'a> {
    pub fn new(store: &'a dyn EntityStore, options: ArchiveOptions) -> Self {
        Archiver {
            store,
            object_store: None,
            options,
            retry: RetryPolicy::default(),
            ctx: RunContext::new(),
        }
    }

    pub fn with_object_store(mut self, object_store: &'a dyn ObjectStore) -> Self {
        self.object_store = Some(object_store);
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

    pub fn perform(&self) -> Result<ArchiveReport, ArchiveError> {
        self.perform_at(Utc::now())
    }

    pub fn perform_at(&self, now: DateTime<Utc>) -> Result<ArchiveReport, ArchiveError> {
        let options = &self.options;
        let cutoff = retention_cutoff(now, options.window);
        info!(
            output_directory = %options.output_directory.display(),
            individual_files = options.write_individual_files,
            bundle = options.write_bundle,
            cutoff = %cutoff,
            "running archive process"
        );

        fs::create_dir_all(&options.output_directory).map_err(|source| ArchiveError::Io {
            path: options.output_directory.clone(),
            source,
        })?;

        let mut report = ArchiveReport {
            run_started: Some(now),
            cutoff: Some(cutoff),
            ..Default::default()
        };

        let mut bundle = if options.write_bundle {
            let path = options.output_directory.join(bundle_filename(now));
            match BundleWriter::create(&path, now) {
                Ok(writer) => Some(writer),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to create bundle");
                    report.bundle_error = Some(e.to_string());
                    None
                }
            }
        } else {
            None
        };

        let mut services: HashMap<String, Option<Service>> = HashMap::new();
        let mut used_filenames: HashSet<String> = HashSet::new();
        let mut interrupted: Option<SyncError> = None;

        let cursor = self.store.for_each_modified_before(
            Collection::RealtimeJourneys,
            cutoff,
            &mut |document| {
                if let Err(stop) = self.ctx.check() {
                    interrupted = Some(stop);
                    return Err(StoreError::Visitor("archive run interrupted".to_string()));
                }

                let realtime: RealtimeJourney = match serde_json::from_value(document) {
                    Ok(realtime) => realtime,
                    Err(e) => {
                        error!(error = %e, "failed to decode realtime journey");
                        report.skipped += 1;
                        return Ok(());
                    }
                };

                let archived = self.snapshot(&realtime, &mut services)?;
                let payload = serde_json::to_vec(&archived)?;
                let mut filename = archive_filename(&archived.primary_identifier);
                if !used_filenames.insert(filename.clone()) {
                    let renamed = disambiguated_filename(&archived.primary_identifier);
                    warn!(
                        id = %archived.primary_identifier,
                        taken = %filename,
                        renamed = %renamed,
                        "archive filename collision"
                    );
                    used_filenames.insert(renamed.clone());
                    filename = renamed;
                }

                if options.write_individual_files {
                    let path = options.output_directory.join(&filename);
                    match fs::write(&path, &payload) {
                        Ok(()) => report.individual_files += 1,
                        Err(e) => {
                            error!(path = %path.display(), error = %e, "failed to write archive file");
                            report.individual_file_errors += 1;
                        }
                    }
                }

                if let Some(writer) = bundle.as_mut() {
                    if let Err(e) = writer.append(&filename, &payload) {
                        error!(entry = %filename, error = %e, "failed to append to bundle");
                        report.bundle_error = Some(e.to_string());
                        bundle = None;
                    }
                }

                report.records += 1;
                Ok(())
            },
        );

        // Close the bundle before surfacing cursor errors so what was written stays readable
        if let Some(writer) = bundle.take() {
            report.bundle_entries = writer.entries();
            let path = writer.path().to_path_buf();
            match writer.finish() {
                Ok(path) => report.bundle_path = Some(path),
                Err(e) => {
                    error!(path = %path.display(), error = %e, "failed to finish bundle");
                    report.bundle_error = Some(e.to_string());
                }
            }
        }

        if let Some(stop) = interrupted {
            warn!(records = report.records, "archive run interrupted");
            return Err(ArchiveError::Interrupted(stop));
        }
        cursor?;

        info!(
            record_count = report.records,
            skipped = report.skipped,
            "archive document generation complete"
        );

        if options.cloud_upload {
            self.upload(&mut report)?;
        }

        Ok(report)
    }

    fn snapshot(
        &self,
        realtime: &RealtimeJourney,
        services: &mut HashMap<String, Option<Service>>,
    ) -> Result<ArchivedJourney, StoreError> {
        let journey: Option<Journey> = if realtime.journey_ref.is_empty() {
            None
        } else {
            find_entity(self.store, &realtime.journey_ref)?
        };

        if journey.is_none() {
            warn!(
                realtime_journey = %realtime.primary_identifier,
                journey_ref = %realtime.journey_ref,
                "scheduled journey not found, archiving observed stops only"
            );
        }

        let service = match &journey {
            Some(journey) if !journey.service_ref.is_empty() => {
                if !services.contains_key(&journey.service_ref) {
                    let found: Option<Service> = find_entity(self.store, &journey.service_ref)?;
                    services.insert(journey.service_ref.clone(), found);
                }
                services.get(&journey.service_ref).cloned().flatten()
            }
            _ => None,
        };

        Ok(to_archived_journey(realtime, journey.as_ref(), service.as_ref()))
    }

    fn upload(&self, report: &mut ArchiveReport) -> Result<(), ArchiveError> {
        let Some(path) = report.bundle_path.clone() else {
            warn!("cloud upload enabled but no complete bundle was produced, skipping");
            return Ok(());
        };
        let Some(object_store) = self.object_store else {
            warn!("cloud upload enabled but no object store configured, skipping");
            return Ok(());
        };

        let key = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let bucket = &self.options.bucket_name;

        self.retry.run(
            &self.ctx,
            "bundle upload",
            |_| {
                object_store
                    .put_file(bucket, &key, &path)
                    .map_err(ArchiveError::from)
            },
            |e| matches!(e, ArchiveError::Upload(_)),
        )?;

        info!(bucket = %bucket, key = %key, "written bundle to bucket");
        report.uploaded = true;
        Ok(())
    }
}
