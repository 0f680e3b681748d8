//! Filesystem primitives against a real directory through io_uring

mod common;

use anyhow::Result;
use common::{init_tracing, test_timeout_guard, Scratch};
use ringfs::{CompioLoop, Descriptor, Filesystem, OpenFlags, EOF};
use rstest::rstest;
use std::os::unix::fs::PermissionsExt;
use std::time::Duration;

/// Longest any single test may wait on its completions
const TEST_TIMEOUT: Duration = Duration::from_secs(30);

fn filesystem() -> Filesystem<CompioLoop> {
    init_tracing();
    Filesystem::new(CompioLoop::new())
}

fn mode_of(path: &std::path::Path) -> u32 {
    std::fs::metadata(path).unwrap().permissions().mode() & 0o7777
}

#[compio::test]
async fn test_mkdir_creates_directory() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let dir = scratch.join("made");

    assert_eq!(fs.mkdir(&dir).await?, dir);
    assert!(dir.is_dir());
    Ok(())
}

#[compio::test]
async fn test_mkdir_existing_rejects() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();

    let error = fs.mkdir(scratch.path()).await.unwrap_err();
    assert_eq!(error.status(), -libc::EEXIST);
    assert_eq!(error.message(), "File exists");
    Ok(())
}

#[compio::test]
async fn test_rmdir() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let dir = scratch.join("empty");
    std::fs::create_dir(&dir)?;

    assert_eq!(fs.rmdir(&dir).await?, dir);
    assert!(!dir.exists());
    assert_eq!(fs.rmdir(&dir).await.unwrap_err().status(), -libc::ENOENT);
    Ok(())
}

#[compio::test]
async fn test_open_write_close() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("out.txt");

    let fd = fs
        .open_with(&path, OpenFlags::WRITE_ONLY | OpenFlags::CREATE, 0o644)
        .await?;
    assert_eq!(fs.write(fd, "hello io_uring").await?, 14);
    assert_eq!(fs.close(fd).await?, 0);

    assert_eq!(std::fs::read(&path)?, b"hello io_uring");
    Ok(())
}

#[compio::test]
async fn test_write_through_read_only_descriptor() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("ro.txt");
    std::fs::write(&path, b"original")?;

    let fd = fs.open(&path).await?;
    assert_eq!(fs.write(fd, "clobber").await.unwrap_err().status(), -libc::EBADF);
    fs.close(fd).await?;

    assert_eq!(std::fs::read(&path)?, b"original");
    Ok(())
}

#[compio::test]
async fn test_read_then_eof() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("in.txt");
    std::fs::write(&path, b"0123456789")?;

    let fd = fs.open(&path).await?;
    assert_eq!(fs.read(fd, 4).await?, b"0123");
    assert_eq!(fs.read(fd, 100).await?, b"456789");

    let error = fs.read(fd, 100).await.unwrap_err();
    assert_eq!(error.status(), EOF);
    assert_eq!(error.to_string(), "end of file");
    fs.close(fd).await?;
    Ok(())
}

#[compio::test]
async fn test_read_file_and_write_file() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("round.txt");
    let body = "x".repeat(64 * 1024);

    assert_eq!(fs.write_file(&path, body.as_bytes()).await?, body.len());
    assert_eq!(mode_of(&path) & !0o644, 0);
    assert_eq!(fs.read_file(&path).await?, body.as_bytes());
    Ok(())
}

#[compio::test]
async fn test_read_file_missing() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();

    let error = fs.read_file(scratch.join("none")).await.unwrap_err();
    assert_eq!(error.status(), -libc::ENOENT);
    Ok(())
}

#[compio::test]
async fn test_read_file_empty() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("empty");
    std::fs::write(&path, b"")?;

    assert!(fs.read_file(&path).await?.is_empty());
    Ok(())
}

#[compio::test]
async fn test_read_file_directory_rejects() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    std::fs::create_dir(scratch.join("sub"))?;

    let error = fs.read_file(scratch.join("sub")).await.unwrap_err();
    assert_eq!(error.status(), -libc::EISDIR);
    Ok(())
}

#[compio::test]
async fn test_rename() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let from = scratch.join("from.txt");
    let to = scratch.join("to.txt");
    std::fs::write(&from, b"moving")?;

    assert_eq!(fs.rename(&from, &to).await?, to);
    assert!(!from.exists());
    assert_eq!(std::fs::read(&to)?, b"moving");

    let error = fs.rename(&from, scratch.join("again")).await.unwrap_err();
    assert_eq!(error.status(), -libc::ENOENT);
    Ok(())
}

#[compio::test]
async fn test_chmod_sets_exact_mode() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("perm.txt");
    std::fs::write(&path, b"")?;

    for mode in [0o600, 0o751, 0o444] {
        assert_eq!(fs.chmod(&path, mode).await?, path);
        assert_eq!(fs.stat(&path).await?.permissions(), mode);
    }
    Ok(())
}

#[compio::test]
async fn test_chown_to_current_owner() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("owned.txt");
    std::fs::write(&path, b"")?;
    let before = fs.stat(&path).await?;

    assert_eq!(fs.chown(&path, before.uid, before.gid).await?, path);
    let after = fs.stat(&path).await?;
    assert_eq!((after.uid, after.gid), (before.uid, before.gid));
    Ok(())
}

#[compio::test]
async fn test_unlink() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("gone.txt");
    std::fs::write(&path, b"bye")?;

    assert_eq!(fs.unlink(&path).await?, path);
    assert!(!path.exists());
    assert!(fs.unlink(&path).await.is_err());
    Ok(())
}

#[compio::test]
async fn test_truncate_returns_descriptor() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("trunc.txt");
    std::fs::write(&path, b"0123456789")?;

    let fd = fs.open_with(&path, OpenFlags::WRITE_ONLY, 0).await?;
    assert_eq!(fs.truncate(fd, 3).await?, fd);
    assert_eq!(fs.fstat(fd).await?.size, 3);
    fs.close(fd).await?;
    Ok(())
}

#[compio::test]
async fn test_stat_and_fstat() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("sized.bin");
    std::fs::write(&path, vec![0u8; 1234])?;

    let record = fs.stat(&path).await?;
    assert_eq!(record.size, 1234);
    assert_eq!(record.get("size"), Some(1234));
    assert!(record.is_file());

    let fd = fs.open(&path).await?;
    let by_fd = fs.fstat(fd).await?;
    assert_eq!((by_fd.ino, by_fd.size), (record.ino, record.size));
    fs.close(fd).await?;

    assert!(fs.stat(scratch.join("missing")).await.is_err());
    assert_eq!(
        fs.fstat(Descriptor::from_raw(-4)).await.unwrap_err().status(),
        -libc::EBADF
    );
    Ok(())
}

#[compio::test]
async fn test_scandir() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    std::fs::write(scratch.join("b"), b"")?;
    std::fs::write(scratch.join("a"), b"")?;
    std::fs::create_dir(scratch.join("c"))?;

    assert_eq!(fs.scandir(scratch.path()).await?, vec!["a", "b", "c"]);
    assert!(fs.scandir(scratch.join("missing")).await.is_err());
    Ok(())
}

#[compio::test]
async fn test_sendfile() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let source = scratch.join("source");
    let target = scratch.join("target");
    std::fs::write(&source, b"abcdefghij")?;

    let input = fs.open(&source).await?;
    let output = fs
        .open_with(&target, OpenFlags::WRITE_ONLY | OpenFlags::CREATE, 0o644)
        .await?;
    assert_eq!(fs.sendfile(input, output, 2, 5).await?, 5);
    fs.close(input).await?;
    fs.close(output).await?;

    assert_eq!(std::fs::read(&target)?, b"cdefg");
    Ok(())
}

#[rstest]
#[case(0o755)]
#[case(0o555)]
#[case(0o111)]
fn test_open_create_honours_mode(#[case] mode: u32) {
    let runtime = compio::runtime::Runtime::new().unwrap();
    runtime.block_on(async {
        let _timeout = test_timeout_guard(TEST_TIMEOUT);
        let scratch = Scratch::new();
        let fs = filesystem();
        let path = scratch.join("created");

        let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
        let fd = fs.open_with(&path, flags, mode).await.unwrap();
        fs.close(fd).await.unwrap();

        // Only bits the process umask clears may differ
        let umask_cleared = mode & !mode_of(&path);
        assert_eq!(umask_cleared & !0o077, 0, "mode {mode:o} became {:o}", mode_of(&path));
        assert_eq!(mode_of(&path) & !mode, 0);
    });
}

#[compio::test]
async fn test_open_exclusive_existing_rejects() -> Result<()> {
    let _timeout = test_timeout_guard(TEST_TIMEOUT);
    let scratch = Scratch::new();
    let fs = filesystem();
    let path = scratch.join("exists");
    std::fs::write(&path, b"")?;

    let flags = OpenFlags::WRITE_ONLY | OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
    let error = fs.open_with(&path, flags, 0o644).await.unwrap_err();
    assert_eq!(error.status(), -libc::EEXIST);
    Ok(())
}
