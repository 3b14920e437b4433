// 🗃️ Archive Integration Tests - retention boundary, bundle layout, upload

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use std::collections::{BTreeMap, HashSet};
use std::fs::File;
use std::io::Read;
use tempfile::TempDir;

use transit_sync::archive::{bundle_filename, BUNDLE_ENTRY_MODE};
use transit_sync::entities::{JourneyPathItem, RealtimeJourneyStop, RealtimeJourneyStopTimeType};
use transit_sync::store::insert_entities;
use transit_sync::{
    ArchiveOptions, ArchivedJourney, Archiver, Journey, LocalDirObjectStore, RealtimeJourney,
    RetryPolicy, Service, SqliteStore,
};

fn run_started() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

fn realtime(id: &str, journey_ref: &str, modified: DateTime<Utc>) -> RealtimeJourney {
    let mut stops = BTreeMap::new();
    stops.insert(
        "UKA".to_string(),
        RealtimeJourneyStop {
            stop_ref: "UKA".to_string(),
            arrival_time: Utc.with_ymd_and_hms(2023, 12, 31, 9, 1, 0).unwrap(),
            departure_time: Utc.with_ymd_and_hms(2023, 12, 31, 9, 2, 0).unwrap(),
            time_type: RealtimeJourneyStopTimeType::Actual,
        },
    );

    RealtimeJourney {
        primary_identifier: id.to_string(),
        journey_ref: journey_ref.to_string(),
        stops,
        vehicle_ref: "BUS-1".to_string(),
        creation_date_time: Some(modified),
        modification_date_time: Some(modified),
        ..Default::default()
    }
}

fn seed_timetable(store: &SqliteStore) {
    let t = |h, m| NaiveTime::from_hms_opt(h, m, 0).unwrap();
    let journey = Journey {
        primary_identifier: "J1".to_string(),
        service_ref: "S1".to_string(),
        operator_ref: "GB:NOC:ABCD".to_string(),
        path: vec![JourneyPathItem {
            origin_stop_ref: "UKA".to_string(),
            destination_stop_ref: "UKB".to_string(),
            origin_arrival_time: t(9, 0),
            origin_departure_time: t(9, 0),
            destination_arrival_time: t(9, 10),
            destination_departure_time: t(9, 10),
        }],
        ..Default::default()
    };
    let service = Service {
        primary_identifier: "S1".to_string(),
        service_name: "42".to_string(),
        operator_ref: "GB:NOC:ABCD".to_string(),
        ..Default::default()
    };

    insert_entities(store, &[journey], run_started()).unwrap();
    insert_entities(store, &[service], run_started()).unwrap();
}

fn seed_realtime(store: &SqliteStore) {
    let journeys = vec![
        // 23h59m59s old: still inside the window
        realtime("RT-RECENT", "J1", Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap()),
        // 24h00m01s old: aged out
        realtime("RT-OLD", "J1", Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()),
        realtime("RT:ORPHAN/1", "", Utc.with_ymd_and_hms(2023, 12, 30, 12, 0, 0).unwrap()),
    ];
    insert_entities(store, &journeys, run_started()).unwrap();
}

fn bundle_entries(path: &std::path::Path) -> Vec<(String, u32, u64, u64, Vec<u8>)> {
    let mut archive = tar::Archive::new(GzDecoder::new(File::open(path).unwrap()));
    archive
        .entries()
        .unwrap()
        .map(|entry| {
            let mut entry = entry.unwrap();
            let header = entry.header().clone();
            let name = entry.path().unwrap().to_string_lossy().into_owned();
            let mut payload = Vec::new();
            entry.read_to_end(&mut payload).unwrap();
            (
                name,
                header.mode().unwrap(),
                header.size().unwrap(),
                header.mtime().unwrap(),
                payload,
            )
        })
        .collect()
}

#[test]
fn test_retention_boundary_and_bundle_layout() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    seed_timetable(&store);
    seed_realtime(&store);

    let options = ArchiveOptions {
        output_directory: dir.path().join("out"),
        window: Duration::hours(24),
        write_individual_files: true,
        write_bundle: true,
        ..Default::default()
    };
    let report = Archiver::new(&store, options).perform_at(run_started()).unwrap();

    assert_eq!(report.records, 2);
    assert_eq!(report.individual_files, 2);
    assert_eq!(report.bundle_entries, 2);
    assert!(report.bundle_error.is_none());

    let bundle_path = report.bundle_path.unwrap();
    assert_eq!(
        bundle_path.file_name().unwrap().to_string_lossy(),
        "2024-01-02T00:00:00Z.tar.gz"
    );
    assert_eq!(
        bundle_path.file_name().unwrap().to_string_lossy(),
        bundle_filename(run_started())
    );

    let mut entries = bundle_entries(&bundle_path);
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    let names: Vec<&str> = entries.iter().map(|e| e.0.as_str()).collect();
    assert_eq!(names, vec!["RT-OLD.json", "RT_ORPHAN_1.json"]);

    for (_, mode, size, mtime, payload) in &entries {
        assert_eq!(*mode, BUNDLE_ENTRY_MODE);
        assert_eq!(*size, payload.len() as u64);
        assert_eq!(*mtime, run_started().timestamp() as u64);
    }

    // Bundle payloads match the individual files byte for byte
    let individual = std::fs::read(dir.path().join("out").join("RT-OLD.json")).unwrap();
    assert_eq!(entries[0].4, individual);

    let archived: ArchivedJourney = serde_json::from_slice(&individual).unwrap();
    assert_eq!(archived.service_name, "42");
    assert_eq!(archived.operator_ref, "GB:NOC:ABCD");
    assert_eq!(archived.stops.len(), 2);
    assert!(archived.stops[0].has_actual_data);
    assert!(!archived.stops[1].has_actual_data);

    let orphan: ArchivedJourney = serde_json::from_slice(&entries[1].4).unwrap();
    assert!(orphan.service_ref.is_empty());
    assert_eq!(orphan.stops.len(), 1);
    assert!(orphan.stops[0].expected_arrival_time.is_none());

    println!("✅ Retention boundary and bundle layout PASSED");
}

#[test]
fn test_source_records_are_not_modified() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    seed_realtime(&store);

    let options = ArchiveOptions {
        output_directory: dir.path().to_path_buf(),
        ..Default::default()
    };
    let archiver = Archiver::new(&store, options);

    let first = archiver.perform_at(run_started()).unwrap();
    let later = run_started() + Duration::seconds(1);
    let second = archiver.perform_at(later).unwrap();

    // Records are re-selected on every run until something else deletes them
    assert_eq!(first.records, 2);
    assert_eq!(second.records, 2);
    assert_ne!(first.bundle_path, second.bundle_path);
}

#[test]
fn test_bundle_disabled_writes_only_files() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    seed_realtime(&store);

    let options = ArchiveOptions {
        output_directory: dir.path().to_path_buf(),
        write_individual_files: true,
        write_bundle: false,
        ..Default::default()
    };
    let report = Archiver::new(&store, options).perform_at(run_started()).unwrap();

    assert_eq!(report.individual_files, 2);
    assert!(report.bundle_path.is_none());
    assert!(!dir.path().join(bundle_filename(run_started())).exists());
}

#[test]
fn test_upload_to_local_object_store() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    seed_realtime(&store);

    let object_store = LocalDirObjectStore::new(dir.path().join("objects"));
    let options = ArchiveOptions {
        output_directory: dir.path().join("out"),
        cloud_upload: true,
        bucket_name: "journey-history".to_string(),
        ..Default::default()
    };
    let report = Archiver::new(&store, options)
        .with_object_store(&object_store)
        .with_retry(RetryPolicy::none())
        .perform_at(run_started())
        .unwrap();

    assert!(report.uploaded);
    let uploaded = object_store.object_path("journey-history", &bundle_filename(run_started()));
    assert!(uploaded.exists());
    assert_eq!(
        std::fs::read(&uploaded).unwrap(),
        std::fs::read(report.bundle_path.unwrap()).unwrap()
    );
}

#[test]
fn test_empty_selection_still_produces_valid_bundle() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();

    let options = ArchiveOptions {
        output_directory: dir.path().to_path_buf(),
        ..Default::default()
    };
    let report = Archiver::new(&store, options).perform_at(run_started()).unwrap();

    assert_eq!(report.records, 0);
    assert!(bundle_entries(&report.bundle_path.unwrap()).is_empty());
}

#[test]
fn test_colliding_filenames_keep_both_journeys() {
    let dir = TempDir::new().unwrap();
    let store = SqliteStore::open_in_memory().unwrap();
    let old = Utc.with_ymd_and_hms(2023, 12, 30, 12, 0, 0).unwrap();
    let journeys = vec![realtime("RT:A/B", "", old), realtime("RT/A:B", "", old)];
    insert_entities(&store, &journeys, run_started()).unwrap();

    let out = dir.path().join("out");
    let options = ArchiveOptions {
        output_directory: out.clone(),
        write_individual_files: true,
        write_bundle: true,
        ..Default::default()
    };
    let report = Archiver::new(&store, options).perform_at(run_started()).unwrap();

    assert_eq!(report.individual_files, 2);
    assert_eq!(report.bundle_entries, 2);

    let mut names: Vec<String> = bundle_entries(&report.bundle_path.unwrap())
        .into_iter()
        .map(|e| e.0)
        .collect();
    names.sort();
    assert!(names[0].starts_with("RT_A_B-"));
    assert_eq!(names[1], "RT_A_B.json");

    // Each file on disk holds a different journey
    let ids: HashSet<String> = names
        .iter()
        .map(|name| {
            let archived: ArchivedJourney =
                serde_json::from_slice(&std::fs::read(out.join(name)).unwrap()).unwrap();
            archived.primary_identifier
        })
        .collect();
    assert_eq!(ids.len(), 2);
}
