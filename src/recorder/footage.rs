// src/recorder/footage.rs
//! Index of recorded clips and snapshots, grouped by camera.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use serde::Serialize;

use crate::core::timestamp::parse_file_stamp;

use super::{CLIP_EXTENSION, SNAPSHOT_DIR};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MediaFile {
    pub filename: String,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CameraFootage {
    pub clips: Vec<MediaFile>,
    pub snapshots: Vec<MediaFile>,
}

/// Keyed by camera name (`cam0`, `cam1`, ...).
pub type FootageIndex = BTreeMap<String, CameraFootage>;

/// Splits `camX_YYYYMMDD_HHMMSS.ext` into camera name and timestamp.
pub fn parse_media_name(name: &str) -> Option<(String, NaiveDateTime)> {
    let (base, _ext) = name.rsplit_once('.')?;
    let (camera, stamp) = base.split_once('_')?;
    if !camera.starts_with("cam") {
        return None;
    }
    Some((camera.to_string(), parse_file_stamp(stamp)?))
}

fn scan_dir(dir: &Path, ext: &str) -> BTreeMap<String, Vec<MediaFile>> {
    let mut by_camera: BTreeMap<String, Vec<MediaFile>> = BTreeMap::new();
    let Ok(entries) = fs::read_dir(dir) else {
        return by_camera;
    };

    for entry in entries.flatten() {
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if !name.starts_with("cam") || !name.ends_with(&format!(".{}", ext)) {
            continue;
        }
        match parse_media_name(&name) {
            Some((camera, timestamp)) => by_camera.entry(camera).or_default().push(MediaFile {
                filename: name,
                timestamp,
            }),
            None => log::debug!("[footage] skipping {}", name),
        }
    }

    for files in by_camera.values_mut() {
        files.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }
    by_camera
}

/// Clips in `storage_path`, snapshots in `storage_path/snapshots`, newest first.
pub fn scan(storage_path: &Path) -> FootageIndex {
    let clips = scan_dir(storage_path, CLIP_EXTENSION);
    let snapshots = scan_dir(&storage_path.join(SNAPSHOT_DIR), "jpg");

    let mut index = FootageIndex::new();
    for (camera, files) in clips {
        index.entry(camera).or_default().clips = files;
    }
    for (camera, files) in snapshots {
        index.entry(camera).or_default().snapshots = files;
    }
    index
}
