use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use camwatch_node::core::CameraId;
use camwatch_node::recorder::footage;
use camwatch_node::recorder::{
    FsRetention, OpenClipMarker, RecorderSettings, RetentionPolicy, RollingRecorder, SweepReport,
};
use camwatch_node::testing::ManualClock;
use camwatch_node::testing::mocks::solid_frame;

const DAY: Duration = Duration::from_secs(24 * 3600);

fn clip_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".mjpeg"))
        .collect();
    names.sort();
    names
}

fn touch(path: &Path, age: Duration) {
    fs::write(path, b"x").unwrap();
    File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

#[test]
fn test_recorder_rotates_on_clip_length() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());
    let rec = RollingRecorder::new(
        CameraId(0),
        RecorderSettings {
            enabled: true,
            clip_length: Duration::from_secs(60),
            storage_path: dir.path().to_path_buf(),
            retention_days: 0,
            ..RecorderSettings::default()
        },
        clock.clone(),
    );

    // 150 s Material in 10-s-Schritten -> drei Clips
    for _ in 0..15 {
        rec.write(&solid_frame(16, 12, 80));
        clock.advance(Duration::from_secs(10));
    }
    let open = rec.open_clip_path().expect("clip open while recording");
    rec.stop();

    let names = clip_files(dir.path());
    assert_eq!(names.len(), 3, "{:?}", names);
    assert!(names.iter().all(|n| n.starts_with("cam0_")));
    assert!(rec.open_clip_path().is_none());

    // Clip enthält aneinandergereihte JPEGs
    let bytes = fs::read(&open).unwrap();
    assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
}

#[test]
fn test_recorded_clips_show_up_in_footage_index() {
    let dir = tempfile::tempdir().unwrap();
    let clock = Arc::new(ManualClock::default());
    let rec = RollingRecorder::new(
        CameraId(3),
        RecorderSettings {
            enabled: true,
            clip_length: Duration::from_secs(60),
            storage_path: dir.path().to_path_buf(),
            retention_days: 0,
            ..RecorderSettings::default()
        },
        clock.clone(),
    );
    rec.write_encoded(b"jpeg");
    clock.advance(Duration::from_secs(61));
    rec.write_encoded(b"jpeg");
    rec.stop();

    let index = footage::scan(dir.path());
    let cam = index.get("cam3").expect("cam3 footage");
    assert_eq!(cam.clips.len(), 2);
    assert!(cam.snapshots.is_empty());
}

#[test]
fn test_retention_deletes_only_old_clips_of_own_camera() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("cam0_20240101_000000.mjpeg");
    let fresh = dir.path().join("cam0_20240301_000000.mjpeg");
    let other_cam = dir.path().join("cam1_20240101_000000.mjpeg");
    let not_a_clip = dir.path().join("cam0_notes.txt");
    touch(&old, 10 * DAY);
    touch(&fresh, DAY);
    touch(&other_cam, 10 * DAY);
    touch(&not_a_clip, 10 * DAY);

    let mut policy = FsRetention::new(
        CameraId(0),
        dir.path().to_path_buf(),
        7,
        OpenClipMarker::default(),
    );
    let report = policy.run(SystemTime::now());

    assert_eq!(report.deleted, vec![old.clone()]);
    assert_eq!(report.failed, 0);
    assert!(!old.exists());
    assert!(fresh.exists() && other_cam.exists() && not_a_clip.exists());
}

#[test]
fn test_retention_spares_open_clip() {
    let dir = tempfile::tempdir().unwrap();
    let open = dir.path().join("cam0_20240101_000000.mjpeg");
    touch(&open, 30 * DAY);

    let marker = OpenClipMarker::default();
    marker.set(Some(open.clone()));
    let mut policy = FsRetention::new(CameraId(0), dir.path().to_path_buf(), 1, marker);
    assert!(policy.run(SystemTime::now()).deleted.is_empty());
    assert!(open.exists());
}

#[test]
fn test_retention_disabled_for_non_positive_days() {
    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("cam0_20200101_000000.mjpeg");
    touch(&old, 400 * DAY);

    for days in [0, -3] {
        let mut policy = FsRetention::new(
            CameraId(0),
            dir.path().to_path_buf(),
            days,
            OpenClipMarker::default(),
        );
        assert!(!policy.is_enabled());
        assert!(policy.run(SystemTime::now()).deleted.is_empty());
    }
    assert!(old.exists());
}

#[test]
fn test_retention_on_missing_directory_is_quiet() {
    let dir = tempfile::tempdir().unwrap();
    let mut policy = FsRetention::new(
        CameraId(0),
        dir.path().join("nope"),
        7,
        OpenClipMarker::default(),
    );
    assert_eq!(policy.run(SystemTime::now()), SweepReport::default());
}
