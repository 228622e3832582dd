// tests/scenarios.rs

//! End-to-end transaction scenarios driven through the front-end functions
//! and the coordinator, each against a fresh temp directory.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use filesafe::{create_file, delete_file, file_exists, open_file, rename_file, txn, Error};
use tempfile::TempDir;

fn backup(target: &Path) -> PathBuf {
    let mut name = target.as_os_str().to_os_string();
    name.push(".filesafe");
    PathBuf::from(name)
}

/// A temp dir with a `work/` target area and a `staging/` area on the same
/// filesystem
struct Fixture {
    _dir: TempDir,
    work: PathBuf,
    staging: PathBuf,
}

impl Fixture {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let work = dir.path().join("work");
        let staging = dir.path().join("staging");
        fs::create_dir_all(&work).unwrap();
        fs::create_dir_all(&staging).unwrap();
        Self {
            _dir: dir,
            work,
            staging,
        }
    }

    fn target(&self, name: &str) -> PathBuf {
        self.work.join(name)
    }

    fn staged_count(&self) -> usize {
        fs::read_dir(&self.staging).unwrap().count()
    }
}

#[test]
fn new_file_commit() {
    let fx = Fixture::new();
    let target = fx.target("greeting");

    txn::begin();
    let mut handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"Hello, World!").unwrap();
    drop(handle);

    assert!(!target.exists());
    txn::commit().unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "Hello, World!");
    assert!(!backup(&target).exists());
    assert_eq!(fx.staged_count(), 0);
}

#[test]
fn overwrite_with_abort() {
    let fx = Fixture::new();
    let target = fx.target("g");
    fs::write(&target, "...---...").unwrap();

    txn::begin();
    let mut handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"new").unwrap();
    drop(handle);
    txn::abort();

    assert_eq!(fs::read_to_string(&target).unwrap(), "...---...");
    assert!(!backup(&target).exists());
    assert_eq!(fx.staged_count(), 0);
}

#[test]
fn overwrite_abort_after_prepare_restores_original() {
    // Same as overwrite_with_abort, but the failure strikes after the
    // prepare phase already moved the staged file into place.
    let fx = Fixture::new();
    let target = fx.target("g");
    fs::write(&target, "...---...").unwrap();
    let poison = fx.target("poison");

    txn::begin();
    let mut handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"new").unwrap();
    drop(handle);
    // A delete whose file vanishes before commit forces a prepare error
    // in the same transaction.
    fs::write(&poison, "").unwrap();
    delete_file(&poison).unwrap();
    fs::remove_file(&poison).unwrap();

    assert!(txn::commit().is_err());

    assert_eq!(fs::read_to_string(&target).unwrap(), "...---...");
    assert!(!backup(&target).exists());
}

#[test]
fn rename_with_commit() {
    let fx = Fixture::new();
    let foo = fx.target("foo");
    let bar = fx.target("bar");
    fs::write(&foo, "...---...").unwrap();

    txn::begin();
    rename_file(&foo, &bar, false).unwrap();
    assert!(foo.exists());
    assert!(!bar.exists());
    txn::commit().unwrap();

    assert!(!foo.exists());
    assert_eq!(fs::read_to_string(&bar).unwrap(), "...---...");
    assert!(!backup(&bar).exists());
}

#[test]
fn rename_with_abort() {
    let fx = Fixture::new();
    let foo = fx.target("foo");
    let bar = fx.target("bar");
    fs::write(&foo, "...---...").unwrap();

    txn::begin();
    rename_file(&foo, &bar, false).unwrap();
    txn::abort();

    assert_eq!(fs::read_to_string(&foo).unwrap(), "...---...");
    assert!(!bar.exists());
}

#[test]
fn recursive_rename_commit() {
    let fx = Fixture::new();
    let foo = fx.target("foo");
    let bar = fx.work.join("a").join("b").join("bar");
    fs::write(&foo, "payload").unwrap();

    txn::begin();
    rename_file(&foo, &bar, true).unwrap();
    txn::commit().unwrap();

    assert_eq!(fs::read_to_string(&bar).unwrap(), "payload");
    assert!(!foo.exists());
}

#[test]
fn delete_and_recreate_committed() {
    let fx = Fixture::new();
    let target = fx.target("g");
    fs::write(&target, "a").unwrap();

    txn::begin();
    delete_file(&target).unwrap();
    let mut handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"b").unwrap();
    drop(handle);
    txn::commit().unwrap();

    assert_eq!(fs::read_to_string(&target).unwrap(), "b");
    assert!(!backup(&target).exists());
}

#[test]
fn delete_committed() {
    let fx = Fixture::new();
    let target = fx.target("g");
    fs::write(&target, "gone soon").unwrap();

    txn::begin();
    delete_file(&target).unwrap();
    assert!(!file_exists(&target).unwrap());
    txn::commit().unwrap();

    assert!(!target.exists());
    assert!(!backup(&target).exists());
}

#[test]
fn double_create_rejected() {
    let fx = Fixture::new();
    let target = fx.target("t");

    txn::begin();
    let first = create_file(&target, "w", Some(&fx.staging)).unwrap();
    drop(first);
    let err = create_file(&target, "w", None).err().unwrap();
    assert!(matches!(err, Error::AlreadyStaged(_)));

    // The first staged file stays put until the transaction ends.
    assert_eq!(fx.staged_count(), 1);
    txn::abort();
    assert_eq!(fx.staged_count(), 0);
    assert!(!target.exists());
}

#[test]
fn read_after_write_within_transaction() {
    let fx = Fixture::new();
    let target = fx.target("t");

    txn::begin();
    let mut handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"staged content").unwrap();
    drop(handle);

    let mut reader = open_file(&target, "r").unwrap();
    let mut contents = String::new();
    std::io::Read::read_to_string(&mut reader, &mut contents).unwrap();
    assert_eq!(contents, "staged content");
    txn::abort();
}

#[test]
fn multi_target_commit_is_atomic() {
    let fx = Fixture::new();
    let one = fx.target("one");
    let two = fx.target("two");
    let three = fx.target("three");
    fs::write(&two, "old two").unwrap();
    fs::write(&three, "old three").unwrap();

    txn::begin();
    let mut handle = create_file(&one, "w", Some(&fx.staging)).unwrap();
    handle.write_all(b"new one").unwrap();
    drop(handle);
    let mut handle = create_file(&two, "w", None).unwrap();
    handle.write_all(b"new two").unwrap();
    drop(handle);
    delete_file(&three).unwrap();
    txn::commit().unwrap();

    assert_eq!(fs::read_to_string(&one).unwrap(), "new one");
    assert_eq!(fs::read_to_string(&two).unwrap(), "new two");
    assert!(!three.exists());
    assert!(!backup(&one).exists());
    assert!(!backup(&two).exists());
    assert!(!backup(&three).exists());
}

#[test]
fn multi_target_abort_restores_everything() {
    let fx = Fixture::new();
    let one = fx.target("one");
    let two = fx.target("two");
    let three = fx.target("three");
    fs::write(&two, "old two").unwrap();
    fs::write(&three, "old three").unwrap();

    txn::begin();
    let handle = create_file(&one, "w", Some(&fx.staging)).unwrap();
    drop(handle);
    let mut handle = create_file(&two, "w", None).unwrap();
    handle.write_all(b"new two").unwrap();
    drop(handle);
    delete_file(&three).unwrap();
    txn::abort();

    assert!(!one.exists());
    assert_eq!(fs::read_to_string(&two).unwrap(), "old two");
    assert_eq!(fs::read_to_string(&three).unwrap(), "old three");
}

#[test]
fn abort_tolerates_externally_deleted_staged_files() {
    let fx = Fixture::new();
    let target = fx.target("g");

    txn::begin();
    let handle = create_file(&target, "w", Some(&fx.staging)).unwrap();
    drop(handle);
    // Someone cleans the staging area behind the manager's back; abort
    // must still finish quietly.
    for entry in fs::read_dir(&fx.staging).unwrap() {
        fs::remove_file(entry.unwrap().path()).unwrap();
    }
    txn::abort();

    assert!(!target.exists());
    assert!(matches!(
        file_exists(&target).unwrap_err(),
        Error::NoActiveTransaction
    ));
}

#[test]
fn exists_tracks_pending_state() {
    let fx = Fixture::new();
    let created = fx.target("created");
    let doomed = fx.target("doomed");
    let renamed_src = fx.target("renamed-src");
    let renamed_dst = fx.target("renamed-dst");
    fs::write(&doomed, "").unwrap();
    fs::write(&renamed_src, "").unwrap();

    txn::begin();
    let handle = create_file(&created, "w", Some(&fx.staging)).unwrap();
    drop(handle);
    delete_file(&doomed).unwrap();
    rename_file(&renamed_src, &renamed_dst, false).unwrap();

    assert!(file_exists(&created).unwrap());
    assert!(!file_exists(&doomed).unwrap());
    assert!(file_exists(&renamed_dst).unwrap());
    assert!(!file_exists(&fx.target("absent")).unwrap());
    txn::abort();
}
