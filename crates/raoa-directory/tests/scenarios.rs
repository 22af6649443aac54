//! End-to-end scenarios over an on-disk storage root.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use raoa_directory::{AlbumImporter, ImportResult, RepositoryDirectory, StorageConfig};
use raoa_repo::{CommitOutcome, PathFilter, RepositoryAccess, StagedChange};

fn open(root: &std::path::Path) -> RepositoryDirectory {
    RepositoryDirectory::open(&StorageConfig::with_root(root)).unwrap()
}

async fn paths(access: &RepositoryAccess) -> Vec<String> {
    access
        .list_files(PathFilter::All)
        .await
        .unwrap()
        .collect_all()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.path)
        .filter(|p| !p.starts_with('.'))
        .collect()
}

#[tokio::test]
async fn batch_swaps_files_on_top_of_previous_commit() {
    let dir = tempfile::tempdir().unwrap();
    let directory = open(dir.path());
    let id = directory.create_album(&["scenario"]).await.unwrap();
    let access = directory.get_album(&id).await.unwrap().unwrap();

    access
        .apply_with_retry(
            &[
                StagedChange::put("a.jpg", b"a".to_vec()),
                StagedChange::put("b.jpg", b"b".to_vec()),
            ],
            &access.commit_context("seed"),
        )
        .await
        .unwrap();
    let c1 = access.current_version().await.unwrap().unwrap();

    let mut builder = access.create_builder().await.unwrap();
    builder.import_bytes("c.jpg", b"c".to_vec(), false).await.unwrap();
    assert!(builder.remove_file("b.jpg").unwrap());
    let outcome = builder
        .commit(&access.commit_context("update"))
        .await
        .unwrap();
    let c2 = outcome.commit().unwrap();

    assert_eq!(paths(&access).await, vec!["a.jpg", "c.jpg"]);
    let repo = access.repository().await.unwrap();
    let commit = repo.read_commit(&c2).unwrap();
    assert_eq!(commit.parent, Some(c1));
    assert_eq!(commit.message, "update");
    assert_eq!(commit.author.name, "raoa-importer");
}

#[tokio::test]
async fn two_processes_race_on_one_album() {
    let dir = tempfile::tempdir().unwrap();
    let first = open(dir.path());
    let id = first.create_album(&["shared"]).await.unwrap();
    // A second directory over the same root stands in for another process.
    let second = open(dir.path());

    let left = first.get_album(&id).await.unwrap().unwrap();
    let right = second.get_album(&id).await.unwrap().unwrap();

    let mut a = left.create_builder().await.unwrap();
    let mut b = right.create_builder().await.unwrap();
    a.import_bytes("left.jpg", b"l".to_vec(), false).await.unwrap();
    b.import_bytes("right.jpg", b"r".to_vec(), false).await.unwrap();

    let a_outcome = a.commit(&left.commit_context("left")).await.unwrap();
    let b_outcome = b.commit(&right.commit_context("right")).await.unwrap();
    assert!(a_outcome.commit().is_some());
    assert!(matches!(b_outcome, CommitOutcome::Conflict { .. }));

    right
        .apply_with_retry(
            &[StagedChange::put("right.jpg", b"r".to_vec())],
            &right.commit_context("right, again"),
        )
        .await
        .unwrap();
    left.invalidate_snapshot();
    assert_eq!(paths(&left).await, vec!["left.jpg", "right.jpg"]);
}

#[tokio::test]
async fn autoadd_routing_scenario() {
    let dir = tempfile::tempdir().unwrap();
    let directory = open(dir.path());
    let album_a = directory.create_album(&["2023", "A"]).await.unwrap();
    let album_b = directory.create_album(&["2023", "B"]).await.unwrap();

    let jan = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let jun = Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap();
    for (id, marker) in [(album_a, jan), (album_b, jun)] {
        let access = directory.get_album(&id).await.unwrap().unwrap();
        access
            .update_autoadd(&[marker], &access.commit_context("autoadd"))
            .await
            .unwrap();
    }
    directory.reset_cache();

    let resolve = |t| directory.resolve_album_for_timestamp(t);
    assert_eq!(
        resolve(Utc.with_ymd_and_hms(2023, 3, 15, 0, 0, 0).unwrap()).await.unwrap(),
        Some(album_a)
    );
    assert_eq!(
        resolve(Utc.with_ymd_and_hms(2022, 12, 31, 0, 0, 0).unwrap()).await.unwrap(),
        None
    );
    assert_eq!(resolve(jun).await.unwrap(), Some(album_b));
}

#[tokio::test]
async fn import_then_reimport_across_batches() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("albums");
    let directory = Arc::new(open(&root));
    let id = directory.create_album(&["Everything"]).await.unwrap();
    let access = directory.get_album(&id).await.unwrap().unwrap();
    access
        .update_autoadd(
            &[Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()],
            &access.commit_context("autoadd"),
        )
        .await
        .unwrap();
    directory.reset_cache();

    let photo = dir.path().join("DSC_0001.NEF");
    std::fs::write(&photo, vec![7u8; 4096]).unwrap();
    let captured = Utc.with_ymd_and_hms(2024, 8, 9, 10, 11, 12).unwrap();
    let context = access.commit_context("import");

    for round in 0..2 {
        let mut importer = AlbumImporter::new(Arc::clone(&directory));
        let result = importer.import_file(&photo, captured).await.unwrap();
        let expected_path = "2024-08-09-10-11-12-DSC_0001.NEF".to_string();
        if round == 0 {
            assert_eq!(result, ImportResult::Imported { album: id, path: expected_path });
        } else {
            assert_eq!(result, ImportResult::AlreadyPresent { album: id, path: expected_path });
        }
        importer.commit_all(&context).await;
    }
    assert_eq!(paths(&access).await, vec!["2024-08-09-10-11-12-DSC_0001.NEF"]);
}
