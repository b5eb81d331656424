use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use mediascan_core::{
    FileInfo, MountPoint, ScanError, ScanEvent, ScanOptions, ScanState, WarningKind,
};
use mediascan_probe::{MediaProbe, ProbeError, Prober, fixtures};
use mediascan_scan::{MediaScanner, VolumeError, VolumeResolver};
use tempfile::TempDir;

/// Puts every path on one fixed volume and counts capacity queries.
#[derive(Clone, Default)]
struct FixedVolume {
    capacity_calls: Arc<AtomicUsize>,
}

impl VolumeResolver for FixedVolume {
    fn volume_root(&self, _path: &Path) -> Result<PathBuf, VolumeError> {
        Ok(PathBuf::from("/data"))
    }

    fn capacity(&self, root: &Path) -> Result<MountPoint, VolumeError> {
        self.capacity_calls.fetch_add(1, Ordering::SeqCst);
        Ok(MountPoint::new(root, 1000, 400))
    }
}

/// One volume per top-level directory under the scan root.
struct PerDirectory {
    base: PathBuf,
}

impl VolumeResolver for PerDirectory {
    fn volume_root(&self, path: &Path) -> Result<PathBuf, VolumeError> {
        let rel = path
            .strip_prefix(&self.base)
            .map_err(|e| VolumeError::unavailable(path, e))?;
        let first = rel
            .components()
            .next()
            .ok_or_else(|| VolumeError::unavailable(path, "at base"))?;
        Ok(self.base.join(first))
    }

    fn capacity(&self, root: &Path) -> Result<MountPoint, VolumeError> {
        if root.ends_with("offline") {
            return Err(VolumeError::unavailable(root, "statvfs failed"));
        }
        Ok(MountPoint::new(root, 500, 100))
    }
}

/// Stalls on `.mp4` files before probing them.
struct SlowProbe {
    delay: Duration,
}

impl MediaProbe for SlowProbe {
    fn probe(&self, path: &Path) -> Result<FileInfo, ProbeError> {
        if path.extension().is_some_and(|ext| ext == "mp4") {
            std::thread::sleep(self.delay);
        }
        Prober::new().probe(path)
    }
}

fn media_dir() -> TempDir {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.mp4"), fixtures::mp4_video(1920, 1080, 12.5)).unwrap();
    std::fs::write(temp.path().join("b.txt"), b"0123456789").unwrap();
    temp
}

fn canonical(temp: &TempDir) -> PathBuf {
    temp.path().canonicalize().unwrap()
}

#[tokio::test]
async fn test_scan_scenario() {
    let temp = media_dir();
    let root = canonical(&temp);
    let resolver = FixedVolume::default();
    let scanner = MediaScanner::with_resolver(resolver.clone());

    let report = scanner
        .scan([temp.path()], &ScanOptions::default())
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.state(), ScanState::Completed);
    assert_eq!(report.files.len(), 2);
    assert!(report.warnings.is_empty());

    let a = report.file(&root.join("a.mp4")).unwrap().clone();
    assert_eq!(a.codec, "h264");
    assert_eq!((a.width, a.height), (1920, 1080));
    assert_eq!(a.duration, 12.5);

    let b = report.file(&root.join("b.txt")).unwrap();
    assert_eq!(b.size, 10);
    assert_eq!(b.format, "");
    assert_eq!(b.codec, "");
    assert_eq!((b.width, b.height, b.duration), (0, 0, 0.0));

    assert_eq!(report.mounts, vec![MountPoint::new("/data", 1000, 400)]);
    assert_eq!(report.mounts[0].used, 600);
    assert_eq!(resolver.capacity_calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.mount_for(&root.join("a.mp4")).map(|m| m.path.clone()),
        Some(PathBuf::from("/data"))
    );

    let summary = report.summary.clone().unwrap();
    assert_eq!((summary.files, summary.mounts, summary.warnings), (2, 1, 0));
    assert_eq!(summary.bytes, a.size + 10);
}

#[tokio::test]
async fn test_mount_precedes_its_files() {
    let temp = media_dir();
    let mut handle = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &ScanOptions::default())
        .unwrap();

    let mut mount_seen = false;
    while let Some(event) = handle.recv().await {
        match event {
            ScanEvent::MountPointReady { .. } => mount_seen = true,
            ScanEvent::FileInfoReady { .. } => assert!(mount_seen),
            _ => {}
        }
    }
    assert!(mount_seen);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_file_deleted_before_probe() {
    let temp = TempDir::new().unwrap();
    std::fs::write(temp.path().join("a.mp4"), fixtures::mp4_video(640, 360, 1.0)).unwrap();
    std::fs::write(temp.path().join("b.mp4"), fixtures::mp4_video(640, 360, 1.0)).unwrap();
    let root = canonical(&temp);

    // One worker and one event slot: the worker stalls on a.mp4's record
    // while b.mp4 sits in the dispatch queue.
    let options = ScanOptions::builder()
        .max_concurrency(1usize)
        .event_buffer(1usize)
        .build()
        .unwrap();
    let handle = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &options)
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    std::fs::remove_file(temp.path().join("b.mp4")).unwrap();

    let report = handle.collect().await;
    assert_eq!(report.state(), ScanState::Completed);
    assert!(report.file(&root.join("a.mp4")).is_some());
    assert!(report.file(&root.join("b.mp4")).is_none());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::Unreadable);
    assert_eq!(report.warnings[0].path, root.join("b.mp4"));
}

#[tokio::test]
async fn test_overlapping_roots_report_each_file_once() {
    let temp = media_dir();
    std::fs::create_dir(temp.path().join("sub")).unwrap();
    std::fs::write(temp.path().join("sub/c.wav"), fixtures::wav(8_000, 1, 16, 16_000)).unwrap();

    let report = MediaScanner::with_resolver(FixedVolume::default())
        .scan(
            [temp.path().to_path_buf(), temp.path().join("sub"), temp.path().to_path_buf()],
            &ScanOptions::default(),
        )
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.state(), ScanState::Completed);
    let mut paths: Vec<_> = report.files.iter().map(|f| f.path.clone()).collect();
    paths.sort();
    paths.dedup();
    assert_eq!(paths.len(), 3);
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.mounts.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_one_mount_per_volume() {
    let temp = TempDir::new().unwrap();
    let base = canonical(&temp);
    for dir in ["disk1", "disk2", "offline"] {
        std::fs::create_dir(base.join(dir)).unwrap();
        for i in 0..10 {
            let path = base.join(dir).join(format!("{i}.flac"));
            std::fs::write(path, fixtures::flac(44_100, 44_100)).unwrap();
        }
    }

    let options = ScanOptions::builder().max_concurrency(8usize).build().unwrap();
    let report = MediaScanner::with_resolver(PerDirectory { base: base.clone() })
        .scan([&base], &options)
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.state(), ScanState::Completed);
    assert_eq!(report.files.len(), 30);

    let mut roots: Vec<_> = report.mounts.iter().map(|m| m.path.clone()).collect();
    roots.sort();
    assert_eq!(roots, vec![base.join("disk1"), base.join("disk2"), base.join("offline")]);

    // Capacity failure degrades the mount, never the files
    let offline = report.mount_for(&base.join("offline/0.flac")).unwrap();
    assert_eq!((offline.total, offline.available, offline.used), (0, 0, 0));
    let unavailable: Vec<_> = report
        .warnings
        .iter()
        .filter(|w| w.kind == WarningKind::VolumeUnavailable)
        .collect();
    assert_eq!(unavailable.len(), 1);
    assert_eq!(unavailable[0].path, base.join("offline"));
}

#[tokio::test]
async fn test_rescan_is_idempotent() {
    let temp = media_dir();
    let scanner = MediaScanner::with_resolver(FixedVolume::default());

    let mut first = scanner
        .scan([temp.path()], &ScanOptions::default())
        .unwrap()
        .collect()
        .await;
    let mut second = scanner
        .scan([temp.path()], &ScanOptions::default())
        .unwrap()
        .collect()
        .await;

    first.files.sort_by(|a, b| a.path.cmp(&b.path));
    second.files.sort_by(|a, b| a.path.cmp(&b.path));
    assert_eq!(first.files, second.files);
    assert_eq!(first.mounts, second.mounts);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_mid_scan() {
    let temp = TempDir::new().unwrap();
    for i in 0..200 {
        let path = temp.path().join(format!("{i:03}.mp3"));
        std::fs::write(path, fixtures::mp3_cbr(4, false)).unwrap();
    }

    let options = ScanOptions::builder()
        .max_concurrency(1usize)
        .event_buffer(1usize)
        .build()
        .unwrap();
    let mut handle = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &options)
        .unwrap();

    loop {
        match handle.recv().await {
            Some(ScanEvent::FileInfoReady { .. }) => break,
            Some(_) => {}
            None => panic!("stream ended before any file"),
        }
    }
    handle.cancel();

    let mut files_after_cancel = 0;
    let terminal = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match handle.recv().await {
                Some(ScanEvent::FileInfoReady { .. }) => files_after_cancel += 1,
                Some(event) if event.is_terminal() => break event,
                Some(_) => {}
                None => panic!("stream ended without a terminal event"),
            }
        }
    })
    .await
    .expect("cancellation within grace period");

    // Only what was already buffered when cancel was requested
    assert!(files_after_cancel <= options.event_buffer);
    assert!(matches!(terminal, ScanEvent::Cancelled { .. }));
    assert_eq!(terminal.summary().unwrap().state, ScanState::Cancelled);
    assert!(terminal.summary().unwrap().files < 200);
    assert_eq!(handle.state(), ScanState::Cancelled);
    assert!(handle.recv().await.is_none());
}

#[tokio::test]
async fn test_no_valid_roots() {
    let temp = TempDir::new().unwrap();
    let result = MediaScanner::with_resolver(FixedVolume::default()).scan(
        [temp.path().join("missing"), temp.path().join("also-missing")],
        &ScanOptions::default(),
    );
    assert!(matches!(result, Err(ScanError::NoValidRoots { attempted: 2 })));

    let empty: [&Path; 0] = [];
    let result =
        MediaScanner::with_resolver(FixedVolume::default()).scan(empty, &ScanOptions::default());
    assert!(matches!(result, Err(ScanError::NoValidRoots { attempted: 0 })));
}

#[tokio::test]
async fn test_missing_root_among_valid_ones_warns() {
    let temp = media_dir();
    let missing = temp.path().join("missing");
    let mut handle = MediaScanner::with_resolver(FixedVolume::default())
        .scan([missing.clone(), temp.path().to_path_buf()], &ScanOptions::default())
        .unwrap();

    match handle.recv().await {
        Some(ScanEvent::Warning { warning }) => {
            assert_eq!(warning.kind, WarningKind::Unreadable);
            assert_eq!(warning.path, missing);
        }
        other => panic!("expected a warning first, got {other:?}"),
    }

    let report = handle.collect().await;
    assert_eq!(report.state(), ScanState::Completed);
    assert_eq!(report.files.len(), 2);
    assert_eq!(report.summary.unwrap().warnings, 1);
}

#[tokio::test]
async fn test_invalid_config() {
    let temp = media_dir();
    let scanner = MediaScanner::with_resolver(FixedVolume::default());

    let options = ScanOptions {
        event_buffer: 0,
        ..ScanOptions::default()
    };
    assert!(matches!(
        scanner.scan([temp.path()], &options),
        Err(ScanError::InvalidConfig { .. })
    ));

    let options = ScanOptions::builder()
        .ignore_patterns(vec!["[".to_string()])
        .build()
        .unwrap();
    assert!(matches!(
        scanner.scan([temp.path()], &options),
        Err(ScanError::InvalidConfig { .. })
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_cycle_does_not_stop_scan() {
    let temp = media_dir();
    std::fs::create_dir(temp.path().join("nested")).unwrap();
    std::os::unix::fs::symlink(temp.path(), temp.path().join("nested/back")).unwrap();

    let options = ScanOptions::builder().follow_symlinks(true).build().unwrap();
    let report = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &options)
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.state(), ScanState::Completed);
    assert_eq!(report.files.len(), 2);
    assert!(
        report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::SymlinkCycle)
    );
}

#[tokio::test]
async fn test_truncated_file_still_reported() {
    let temp = TempDir::new().unwrap();
    let data = fixtures::mp4_video(1280, 720, 4.0);
    std::fs::write(temp.path().join("cut.mp4"), &data[..data.len() / 2]).unwrap();

    let report = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &ScanOptions::default())
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.files.len(), 1);
    assert_eq!(report.files[0].format, "mp4");
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::Truncated);
}

#[tokio::test]
async fn test_dropping_handle_cancels() {
    let temp = media_dir();
    let handle = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &ScanOptions::default())
        .unwrap();
    let token = handle.cancellation_token();
    drop(handle);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn test_probe_timeout_skips_file() {
    let temp = media_dir();
    let root = canonical(&temp);
    let options = ScanOptions::builder()
        .probe_timeout(Some(Duration::from_millis(50)))
        .build()
        .unwrap();

    let report = MediaScanner::with_resolver(FixedVolume::default())
        .with_prober(SlowProbe {
            delay: Duration::from_secs(1),
        })
        .scan([temp.path()], &options)
        .unwrap()
        .collect()
        .await;

    assert_eq!(report.state(), ScanState::Completed);
    assert!(report.file(&root.join("a.mp4")).is_none());
    assert!(report.file(&root.join("b.txt")).is_some());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::Unreadable);
    assert_eq!(report.warnings[0].path, root.join("a.mp4"));
    assert!(report.warnings[0].message.contains("timed out"));
    assert_eq!(report.summary.as_ref().map(|s| s.warnings), Some(1));
}

#[cfg(unix)]
#[tokio::test]
async fn test_unreadable_directory_is_skipped() {
    use std::os::unix::fs::PermissionsExt;

    let temp = media_dir();
    let root = canonical(&temp);
    let locked = temp.path().join("locked");
    std::fs::create_dir(&locked).unwrap();
    std::fs::write(locked.join("c.mp4"), fixtures::mp4_video(320, 240, 1.0)).unwrap();
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

    // Permission bits do not restrict root
    if std::fs::read_dir(&locked).is_ok() {
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let report = MediaScanner::with_resolver(FixedVolume::default())
        .scan([temp.path()], &ScanOptions::default())
        .unwrap()
        .collect()
        .await;
    std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();

    assert_eq!(report.state(), ScanState::Completed);
    assert_eq!(report.files.len(), 2);
    assert!(report.file(&root.join("a.mp4")).is_some());
    assert!(report.file(&root.join("b.txt")).is_some());
    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.warnings[0].kind, WarningKind::PermissionDenied);
    assert_eq!(report.warnings[0].path, root.join("locked"));
}
