#![cfg(unix)]

use std::fs;
use std::io;
use std::mem;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Result, bail};
use futures_util::future;
use futures_util::stream::{self, StreamExt};
use sheaf_dest::fs::{Fault, FsOp};
use sheaf_dest::{
    Contents, DestError, DestResult, Destination, DestinationConfig, FileDescriptor, FileStat,
    PathSpec, RecordingFs,
};
use sheaf_telemetry::{LogFormat, LoggingConfig, Metrics, init_logging};
use sheaf_test_support::fixtures::{SAMPLE_SOURCE, Workspace};
use sheaf_test_support::inspect::{masked_by_umask, real_mode, snapshot_tree};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt, ReadBuf};

fn source(ws: &Workspace) -> FileDescriptor {
    FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("test.coffee"))
}

fn out_config(ws: &Workspace) -> DestinationConfig {
    DestinationConfig::new("./out-fixtures/").with_cwd(ws.root())
}

fn install_logging() {
    let _ = init_logging(&LoggingConfig {
        level: "warn",
        format: LogFormat::Pretty,
    });
}

async fn run(
    destination: &Destination,
    files: Vec<FileDescriptor>,
) -> Vec<DestResult<FileDescriptor>> {
    install_logging();
    destination.pipe(stream::iter(files)).collect().await
}

async fn run_one(destination: &Destination, file: FileDescriptor) -> Result<FileDescriptor> {
    let mut results = run(destination, vec![file]).await;
    assert_eq!(results.len(), 1);
    Ok(results.remove(0)?)
}

async fn drain(contents: &mut Contents) -> Result<Vec<u8>> {
    match mem::take(contents) {
        Contents::Buffer(bytes) => Ok(bytes),
        Contents::Stream(mut reader) => {
            let mut body = Vec::new();
            reader.read_to_end(&mut body).await?;
            Ok(body)
        }
        Contents::Null => bail!("descriptor has no contents"),
    }
}

/// Reader whose every read fails.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("source stream broke")))
    }
}

fn recording_destination(
    config: DestinationConfig,
) -> Result<(Destination, Arc<RecordingFs>)> {
    let backend = Arc::new(RecordingFs::local());
    let destination = Destination::with_backend(config, backend.clone())?;
    Ok((destination, backend))
}

#[test]
fn empty_folder_is_rejected_at_construction() {
    let err = Destination::new(DestinationConfig::new("")).unwrap_err();
    assert!(err.is_configuration());
    let err = Destination::new(DestinationConfig::new(PathBuf::new())).unwrap_err();
    assert!(matches!(err, DestError::Configuration { field: "folder", .. }));
}

#[tokio::test]
async fn computed_empty_folder_ends_the_stream() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(
        DestinationConfig::new(PathSpec::computed(|_| PathBuf::from("")))
            .with_cwd(ws.root())
            .with_concurrency(1),
    )?;
    let files = vec![
        source(&ws).with_contents(SAMPLE_SOURCE),
        source(&ws).with_contents(SAMPLE_SOURCE),
    ];
    let results = run(&destination, files).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].as_ref().is_err_and(DestError::is_configuration));
    assert!(!ws.out_dir().exists());
    Ok(())
}

#[tokio::test]
async fn passes_through_null_files_with_cwd() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let file = FileDescriptor::in_cwd(ws.root(), ws.fixture("test.coffee"));

    let written = run_one(&destination, file).await?;
    assert_eq!(written.cwd, ws.root());
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(written.path, ws.output("fixtures/test.coffee"));
    assert!(written.is_null());
    Ok(())
}

#[tokio::test]
async fn passes_through_with_default_cwd() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(DestinationConfig::new(ws.out_dir()))?;
    let file = FileDescriptor::in_cwd(ws.root(), ws.fixture("test.coffee"));

    let written = run_one(&destination, file).await?;
    assert_eq!(written.cwd, std::env::current_dir()?);
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(written.path, ws.output("fixtures/test.coffee"));
    Ok(())
}

#[tokio::test]
async fn does_not_write_null_files() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;

    let written = run_one(&destination, source(&ws)).await?;
    assert_eq!(written.cwd, ws.root());
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(written.path, ws.output("test.coffee"));
    assert!(!written.path.exists());
    Ok(())
}

#[tokio::test]
async fn writes_buffers_with_relative_cwd() -> Result<()> {
    let ws = Workspace::new()?;
    let process_cwd = std::env::current_dir()?;
    let mut relative: PathBuf = process_cwd.components().skip(1).map(|_| "..").collect();
    relative.push(ws.root().strip_prefix("/")?);

    let destination =
        Destination::new(DestinationConfig::new("./out-fixtures/").with_cwd(&relative))?;
    let written = run_one(&destination, source(&ws).with_contents(SAMPLE_SOURCE)).await?;
    assert_eq!(written.path, ws.output("test.coffee"));
    assert_eq!(fs::read(ws.output("test.coffee"))?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn writes_buffers_with_computed_folder() -> Result<()> {
    let ws = Workspace::new()?;
    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let destination = Destination::new(
        DestinationConfig::new(PathSpec::computed(move |file: &FileDescriptor| {
            counter.fetch_add(1, Ordering::SeqCst);
            assert!(file.path.ends_with("test.coffee"));
            PathBuf::from("./out-fixtures/")
        }))
        .with_cwd(ws.root()),
    )?;

    let written = run_one(&destination, source(&ws).with_contents(SAMPLE_SOURCE)).await?;
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(fs::read(&written.path)?, SAMPLE_SOURCE);
    assert_eq!(seen.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn writes_buffer_files_with_their_mode() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o655)));

    let written = run_one(&destination, file).await?;
    assert_eq!(written.cwd, ws.root());
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(written.path, ws.output("test.coffee"));
    assert_eq!(fs::read(&written.path)?, SAMPLE_SOURCE);
    assert_eq!(real_mode(&written.path)?, 0o655);
    Ok(())
}

#[tokio::test]
async fn writes_streaming_files_once_the_stream_drains() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let (reader, mut writer) = tokio::io::duplex(16);
    let producer = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        writer.write_all(SAMPLE_SOURCE).await?;
        writer.shutdown().await
    });
    let file = source(&ws)
        .with_contents(Contents::stream(reader))
        .with_stat(FileStat::file(Some(0o655)));

    let mut written = run_one(&destination, file).await?;
    producer.await??;
    assert_eq!(written.path, ws.output("test.coffee"));
    assert_eq!(fs::read(&written.path)?, SAMPLE_SOURCE);
    assert_eq!(real_mode(&written.path)?, 0o655);
    assert!(written.contents.is_stream());
    assert_eq!(drain(&mut written.contents).await?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn writes_directories() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let file = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("test"))
        .with_stat(FileStat::directory(Some(0o655)));

    let written = run_one(&destination, file).await?;
    assert_eq!(written.base, ws.out_dir());
    assert_eq!(written.path, ws.output("test"));
    assert!(fs::symlink_metadata(&written.path)?.is_dir());
    assert_eq!(real_mode(&written.path)?, 0o655);
    Ok(())
}

#[tokio::test]
async fn chains_destinations_with_buffers() -> Result<()> {
    let ws = Workspace::new()?;
    let first_path = ws.output("multiple-first");
    let second_path = ws.output("multiple-second");
    let first = Destination::new(out_config(&ws))?;
    let second = Destination::new(out_config(&ws))?;

    let file = FileDescriptor::new(ws.root(), ws.out_dir(), &first_path).with_contents(SAMPLE_SOURCE);
    let expected_first = first_path.clone();
    let renamed = second_path.clone();
    let chained = first
        .pipe(stream::iter(vec![file]))
        .filter_map(|result| future::ready(result.ok()))
        .map(move |mut file| {
            assert_eq!(file.path, expected_first);
            file.path.clone_from(&renamed);
            file
        });
    let results: Vec<_> = second.pipe(chained).collect().await;

    assert_eq!(results.len(), 1);
    let Some(Ok(emitted)) = results.first() else {
        bail!("chained destination did not emit");
    };
    assert_eq!(emitted.path, second_path);
    assert_eq!(fs::read(&first_path)?, SAMPLE_SOURCE);
    assert_eq!(fs::read(&second_path)?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn chains_destinations_with_streams() -> Result<()> {
    let ws = Workspace::new()?;
    let first = Destination::new(out_config(&ws))?;
    let second = Destination::new(out_config(&ws))?;
    let file = FileDescriptor::new(ws.root(), ws.out_dir(), ws.output("stream-first"))
        .with_contents(Contents::stream(SAMPLE_SOURCE));

    let mut once = first.write(file).await?;
    once.path = ws.output("nested/stream-second");
    let mut twice = second.write(once).await?;

    assert_eq!(fs::read(ws.output("stream-first"))?, SAMPLE_SOURCE);
    assert_eq!(fs::read(ws.output("nested/stream-second"))?, SAMPLE_SOURCE);
    assert_eq!(drain(&mut twice.contents).await?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn new_files_get_the_default_user_mode() -> Result<()> {
    let ws = Workspace::new()?;
    let (destination, fs) = recording_destination(out_config(&ws))?;

    let written = run_one(&destination, source(&ws).with_contents(SAMPLE_SOURCE)).await?;
    assert_eq!(real_mode(&written.path)?, masked_by_umask(0o666));
    assert_eq!(fs.count(FsOp::Chmod, None), 0);
    assert_eq!(written.stat, None);
    Ok(())
}

#[tokio::test]
async fn new_files_get_the_configured_mode() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws).with_mode(0o744))?;

    let written = run_one(&destination, source(&ws).with_contents(SAMPLE_SOURCE)).await?;
    assert_eq!(real_mode(&written.path)?, 0o744);
    assert_eq!(written.stat_mode(), Some(0o744));
    Ok(())
}

#[tokio::test]
async fn updates_existing_file_mode_to_match() -> Result<()> {
    let ws = Workspace::new()?;
    let existing = ws.write_output("test.coffee", b"")?;
    fs::set_permissions(&existing, std::os::unix::fs::PermissionsExt::from_mode(0o655))?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    run_one(&destination, file).await?;
    assert!(backend.count(FsOp::Chmod, Some(existing.as_path())) >= 1);
    assert_eq!(real_mode(&existing)?, 0o722);
    Ok(())
}

#[tokio::test]
async fn updates_directory_mode_to_match() -> Result<()> {
    let ws = Workspace::new()?;
    fs::create_dir_all(ws.fixture("wow"))?;
    fs::create_dir_all(ws.out_dir())?;
    let start = FileStat::from_metadata(&fs::metadata(ws.fixture("wow"))?);
    let destination = Destination::new(out_config(&ws).with_concurrency(1))?;

    let first = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.output("wow"))
        .with_stat(start);
    let second = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.output("wow"))
        .with_stat(FileStat::directory(Some(0o727)));

    let results = run(&destination, vec![first, second]).await;
    assert_eq!(results.len(), 2);
    for result in &results {
        let Ok(file) = result else {
            bail!("directory descriptor failed: {result:?}");
        };
        assert_eq!(file.cwd, ws.root());
        assert_eq!(file.base, ws.out_dir());
        assert_eq!(file.path, ws.output("wow"));
    }
    assert_eq!(real_mode(&ws.output("wow"))?, 0o727);
    Ok(())
}

#[tokio::test]
async fn uses_separate_modes_for_files_and_directories() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(
        out_config(&ws)
            .with_mode(0o655)
            .with_dir_mode(0o755),
    )?;
    let file = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("wow/suchempty"))
        .with_stat(FileStat::file(None));

    let written = run_one(&destination, file).await?;
    assert_eq!(real_mode(&ws.output("wow"))?, masked_by_umask(0o755));
    assert_eq!(written.stat_mode(), Some(0o655));
    Ok(())
}

#[tokio::test]
async fn base_override_as_literal() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws).with_base(ws.fixtures_dir()))?;
    let file = FileDescriptor::in_cwd(ws.root(), ws.fixture("wow/suchempty"));

    let written = run_one(&destination, file).await?;
    assert_eq!(written.base, ws.fixtures_dir());
    Ok(())
}

#[tokio::test]
async fn base_override_as_function() -> Result<()> {
    let ws = Workspace::new()?;
    let input_path = ws.fixture("wow/suchempty");
    let expected_input = input_path.clone();
    let base = ws.fixtures_dir();
    let destination = Destination::new(out_config(&ws).with_base(PathSpec::computed(
        move |file: &FileDescriptor| {
            assert_eq!(file.path, expected_input);
            base.clone()
        },
    )))?;

    let written = run_one(&destination, FileDescriptor::in_cwd(ws.root(), input_path)).await?;
    assert_eq!(written.base, ws.fixtures_dir());
    Ok(())
}

#[tokio::test]
async fn reports_io_errors_with_their_code() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.output("test.coffee");
    let (destination, backend) = recording_destination(out_config(&ws))?;
    backend.fail(FsOp::WriteFile, Some(target.as_path()), Fault::Os(13));
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    let err = run_one(&destination, file).await.unwrap_err();
    let err = err.downcast::<DestError>()?;
    assert!(matches!(err, DestError::Write { .. }));
    assert_eq!(err.raw_os_error(), Some(13));
    assert_eq!(err.path(), Some(target.as_path()));
    Ok(())
}

#[tokio::test]
async fn reports_stat_errors_verbatim() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"")?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    backend.fail(
        FsOp::Stat,
        Some(target.as_path()),
        Fault::Message("stat error".to_string()),
    );
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    let results = run(&destination, vec![file]).await;
    let Some(Err(err)) = results.first() else {
        bail!("expected a stat failure");
    };
    assert!(matches!(err, DestError::Stat { .. }));
    assert_eq!(
        err.io_error().map(ToString::to_string).as_deref(),
        Some("stat error")
    );
    Ok(())
}

#[tokio::test]
async fn reports_chmod_errors_verbatim() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"")?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    backend.fail(
        FsOp::Chmod,
        Some(target.as_path()),
        Fault::Message("chmod error".to_string()),
    );
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    let results = run(&destination, vec![file]).await;
    let Some(Err(err)) = results.first() else {
        bail!("expected a chmod failure");
    };
    assert!(matches!(err, DestError::Chmod { mode: 0o722, .. }));
    assert_eq!(
        err.io_error().map(ToString::to_string).as_deref(),
        Some("chmod error")
    );
    Ok(())
}

#[tokio::test]
async fn does_not_chmod_a_matching_file() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"")?;
    fs::set_permissions(&target, std::os::unix::fs::PermissionsExt::from_mode(0o722))?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    run_one(&destination, file).await?;
    assert_eq!(backend.count(FsOp::Stat, Some(target.as_path())), 1);
    assert_eq!(backend.count(FsOp::Chmod, None), 0);
    assert_eq!(real_mode(&target)?, 0o722);
    Ok(())
}

#[tokio::test]
async fn special_bits_on_disk_count_as_matching() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"")?;
    fs::set_permissions(&target, std::os::unix::fs::PermissionsExt::from_mode(0o3722))?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    let file = source(&ws)
        .with_contents(SAMPLE_SOURCE)
        .with_stat(FileStat::file(Some(0o722)));

    run_one(&destination, file).await?;
    assert_eq!(backend.count(FsOp::Stat, Some(target.as_path())), 1);
    assert_eq!(backend.count(FsOp::Chmod, None), 0);
    Ok(())
}

#[tokio::test]
async fn second_run_issues_no_chmod() -> Result<()> {
    let ws = Workspace::new()?;
    let (destination, backend) = recording_destination(out_config(&ws))?;
    let make = || {
        source(&ws)
            .with_contents(SAMPLE_SOURCE)
            .with_stat(FileStat::file(Some(0o711)))
    };

    run_one(&destination, make()).await?;
    let first_chmods = backend.count(FsOp::Chmod, None);
    assert!(first_chmods <= 1);
    backend.reset();
    run_one(&destination, make()).await?;
    assert_eq!(backend.count(FsOp::Chmod, None), 0);
    assert_eq!(real_mode(&ws.output("test.coffee"))?, 0o711);
    Ok(())
}

#[tokio::test]
async fn overwrite_disabled_keeps_existing_content() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"Lorem Ipsum")?;
    let destination = Destination::new(out_config(&ws).with_overwrite(false))?;

    let results = run(&destination, vec![source(&ws).with_contents(SAMPLE_SOURCE)]).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(fs::read(&target)?, b"Lorem Ipsum");
    Ok(())
}

#[tokio::test]
async fn overwrite_enabled_replaces_existing_content() -> Result<()> {
    let ws = Workspace::new()?;
    let target = ws.write_output("test.coffee", b"Lorem Ipsum")?;
    let destination = Destination::new(out_config(&ws).with_overwrite(true))?;

    let results = run(&destination, vec![source(&ws).with_contents(SAMPLE_SOURCE)]).await;
    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(fs::read(&target)?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn creates_symlinks_for_symlink_descriptors() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let file = FileDescriptor::new(
        ws.root(),
        ws.fixtures_dir(),
        ws.fixture("test-create-dir-symlink"),
    )
    .with_symlink("wow");

    let written = run_one(&destination, file).await?;
    assert_eq!(written.path, ws.output("test-create-dir-symlink"));
    assert_eq!(written.symlink.as_deref(), Some(Path::new("wow")));
    assert_eq!(fs::read_link(&written.path)?, PathBuf::from("wow"));
    Ok(())
}

#[tokio::test]
async fn rerunning_symlink_descriptor_keeps_link() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let make = || {
        FileDescriptor::new(
            ws.root(),
            ws.fixtures_dir(),
            ws.fixture("test-create-dir-symlink"),
        )
        .with_symlink("wow")
    };

    let results = run(&destination, vec![make(), make()]).await;
    assert_eq!(results.len(), 2);
    for result in &results {
        assert!(result.is_ok(), "symlink rerun failed: {result:?}");
    }
    let link = ws.output("test-create-dir-symlink");
    assert_eq!(fs::read_link(&link)?, PathBuf::from("wow"));

    let retarget = make().with_symlink("elsewhere");
    run_one(&destination, retarget).await?;
    assert_eq!(fs::read_link(&link)?, PathBuf::from("elsewhere"));
    Ok(())
}

#[tokio::test]
async fn symlink_over_directory_fails() -> Result<()> {
    let ws = Workspace::new()?;
    let occupied = ws.output("test-create-dir-symlink");
    fs::create_dir_all(&occupied)?;
    let destination = Destination::new(out_config(&ws))?;
    let file = FileDescriptor::new(
        ws.root(),
        ws.fixtures_dir(),
        ws.fixture("test-create-dir-symlink"),
    )
    .with_symlink("wow");

    let results = run(&destination, vec![file]).await;
    assert_eq!(results.len(), 1);
    let Err(err) = &results[0] else {
        bail!("expected a conflict with the existing directory");
    };
    assert!(matches!(err, DestError::Write { operation: "symlink", .. }));
    assert_eq!(
        err.io_error().map(io::Error::kind),
        Some(io::ErrorKind::AlreadyExists)
    );
    assert!(fs::symlink_metadata(&occupied)?.is_dir());
    Ok(())
}

#[tokio::test]
async fn failing_source_stream_ends_only_its_descriptor() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let broken = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("broken.txt"))
        .with_contents(Contents::stream(
            AsyncReadExt::chain(&b"partial"[..], BrokenReader),
        ));
    let healthy = FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("healthy.txt"))
        .with_contents(b"healthy".as_slice());

    let results = run(&destination, vec![broken, healthy]).await;
    assert_eq!(results.len(), 2);
    let Err(err) = &results[0] else {
        bail!("expected the broken stream to fail");
    };
    assert!(matches!(err, DestError::Write { operation: "write.stream", .. }));
    assert_eq!(
        err.io_error().map(ToString::to_string).as_deref(),
        Some("source stream broke")
    );
    assert_eq!(err.path(), Some(ws.output("broken.txt").as_path()));

    let Ok(written) = &results[1] else {
        bail!("healthy descriptor failed: {:?}", results[1]);
    };
    assert_eq!(written.path, ws.output("healthy.txt"));
    assert_eq!(fs::read(ws.output("healthy.txt"))?, b"healthy");
    Ok(())
}

#[tokio::test]
async fn spawned_destination_finishes_after_input_closes() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws))?;
    let handle = destination.spawn();

    handle
        .input
        .send(source(&ws).with_contents(SAMPLE_SOURCE))
        .await?;
    drop(handle.input);
    let results: Vec<_> = handle.output.collect().await;
    handle.task.await?;

    assert_eq!(results.len(), 1);
    assert!(results[0].is_ok());
    assert_eq!(fs::read(ws.output("test.coffee"))?, SAMPLE_SOURCE);
    Ok(())
}

#[tokio::test]
async fn failures_do_not_abort_sibling_descriptors() -> Result<()> {
    let ws = Workspace::new()?;
    let bad = ws.output("bad.txt");
    let (destination, backend) = recording_destination(out_config(&ws))?;
    backend.fail(FsOp::WriteFile, Some(bad.as_path()), Fault::Os(13));

    let files = ["a.txt", "bad.txt", "b.txt"]
        .into_iter()
        .map(|name| {
            FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture(name))
                .with_contents(name.as_bytes())
        })
        .collect();
    let results = run(&destination, files).await;

    assert_eq!(results.len(), 3);
    assert!(results[0].is_ok());
    assert!(results[1].as_ref().is_err_and(|err| err.raw_os_error() == Some(13)));
    assert!(results[2].is_ok());
    assert_eq!(fs::read(ws.output("a.txt"))?, b"a.txt");
    assert_eq!(fs::read(ws.output("b.txt"))?, b"b.txt");
    Ok(())
}

#[tokio::test]
async fn concurrent_descriptors_share_new_ancestors() -> Result<()> {
    let ws = Workspace::new()?;
    let destination = Destination::new(out_config(&ws).with_concurrency(8))?;
    let files = (0..24)
        .map(|i| {
            let relative = format!("deep/shared/tree/{}/file-{i}.txt", i % 3);
            FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture(&relative))
                .with_contents(relative.into_bytes())
        })
        .collect();

    let results = run(&destination, files).await;
    assert_eq!(results.len(), 24);
    for (i, result) in results.iter().enumerate() {
        let Ok(file) = result else {
            bail!("descriptor {i} failed: {result:?}");
        };
        assert!(file.path.ends_with(format!("file-{i}.txt")));
    }
    let tree = snapshot_tree(&ws.out_dir())?;
    assert_eq!(tree.iter().filter(|entry| entry.extension().is_some()).count(), 24);
    Ok(())
}

#[tokio::test]
async fn metrics_track_descriptor_outcomes() -> Result<()> {
    let ws = Workspace::new()?;
    let metrics = Metrics::new()?;
    let backend = Arc::new(RecordingFs::local());
    let destination =
        Destination::with_backend(out_config(&ws).with_mode(0o600), backend.clone())?
            .with_metrics(metrics.clone());
    let bad = ws.output("bad.txt");
    backend.fail(FsOp::WriteFile, Some(bad.as_path()), Fault::Os(13));

    let files = vec![
        FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("good.txt"))
            .with_contents(b"12345".as_slice()),
        FileDescriptor::new(ws.root(), ws.fixtures_dir(), ws.fixture("bad.txt"))
            .with_contents(b"x".as_slice()),
    ];
    run(&destination, files).await;

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.descriptors_emitted, 1);
    assert_eq!(snapshot.descriptors_failed, 1);
    assert_eq!(snapshot.bytes_written_total, 5);
    assert_eq!(metrics.step_count("write_content", "failed"), 1);
    let rendered = metrics.render()?;
    assert!(rendered.contains("dest_steps_total"));
    Ok(())
}

#[tokio::test]
async fn settings_document_drives_a_destination() -> Result<()> {
    let ws = Workspace::new()?;
    let document = format!(
        r#"{{"folder": "./out-fixtures/", "cwd": "{}", "mode": "0640", "overwrite": false}}"#,
        ws.root().display()
    );
    let settings = sheaf_config::parse_settings(&document)?;
    let destination = Destination::new(DestinationConfig::from_settings(&settings))?;
    assert!(!destination.config().overwrite);

    let written = run_one(&destination, source(&ws).with_contents(SAMPLE_SOURCE)).await?;
    assert_eq!(written.path, ws.output("test.coffee"));
    assert_eq!(real_mode(&written.path)?, 0o640);
    Ok(())
}
