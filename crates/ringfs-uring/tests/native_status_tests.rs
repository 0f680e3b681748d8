//! End-to-end checks of the native status conventions

use ringfs_uring::{directory, file, metadata, status};
use tempfile::TempDir;

#[compio::test]
async fn test_file_lifecycle_statuses() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().join("work");
    let path = dir.join("data.bin");

    assert_eq!(directory::mkdir(&dir, 0o755).await, 0);

    let fd = file::open(&path, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL, 0o600).await;
    assert!(fd >= 0, "open failed: {}", status::strerror(fd));
    assert_eq!(file::write(fd, b"status".to_vec(), 0).await, 6);
    assert_eq!(metadata::fstat(fd).await.unwrap().size, 6);
    assert_eq!(file::close(fd).await, 0);
    assert_eq!(file::close(fd).await, -libc::EBADF);

    let again = file::open(&path, libc::O_RDWR | libc::O_CREAT | libc::O_EXCL, 0o600).await;
    assert_eq!(again, -libc::EEXIST);

    let (count, names) = directory::scandir(&dir).await;
    assert_eq!((count, names), (1, vec!["data.bin".to_string()]));

    assert_eq!(directory::rmdir(&dir).await, -libc::ENOTEMPTY);
    assert_eq!(directory::unlink(&path).await, 0);
    assert_eq!(directory::rmdir(&dir).await, 0);
}

#[compio::test]
async fn test_stat_reports_kind_and_permissions() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("mode.txt");
    std::fs::write(&path, b"abc").unwrap();

    assert_eq!(metadata::chmod(&path, 0o640).await, 0);
    let record = metadata::stat(&path).await.unwrap();
    assert!(record.is_file());
    assert_eq!(record.permissions(), 0o640);
    assert_eq!(record.get("size"), Some(3));

    let dir_record = metadata::stat(temp_dir.path()).await.unwrap();
    assert!(dir_record.is_dir());
    assert_eq!(
        metadata::stat(&temp_dir.path().join("none")).await,
        Err(-libc::ENOENT)
    );
}
