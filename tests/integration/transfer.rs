use std::sync::Arc;

use pump_core::partition::{plan, Partition, PartitionStyle};
use pump_services::{BlockTransfer, Credentials, RangeDownloader};

use crate::*;

const FILE_SIZE: usize = 10_000;
const CHUNK: i64 = 1024;

// ══════════════════════════════════════════════════════════════════════════════
//  Block fetches into one shared file
// ══════════════════════════════════════════════════════════════════════════════

/// Blocks fetched straight into a pre-sized file, in any arrival order,
/// rebuild the source byte for byte.
#[tokio::test]
async fn test_direct_fetches_rebuild_file_in_any_order() {
    let body = pattern(FILE_SIZE);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("direct");
    let downloader = RangeDownloader::new(&settings(dir.clone())).unwrap();
    let blocks = plan(FILE_SIZE as u64, CHUNK, PartitionStyle::Inplace);
    assert_eq!(blocks.len(), 10);

    for (n, order) in permutations(blocks.len() as u64).into_iter().enumerate() {
        let target = dir.join(format!("direct-{n}.bin"));
        std::fs::File::create(&target)
            .unwrap()
            .set_len(FILE_SIZE as u64)
            .unwrap();

        for index in order {
            let block = blocks[index as usize];
            let span = block.span();
            let outcome = downloader
                .fetch(&format!("{}data/f.bin", origin.base_url), None, &block, &target, span.offset)
                .await;
            assert!(outcome.is_success(), "block {index}: {outcome:?}");
            assert_eq!(outcome.bytes, span.length);
        }

        assert_eq!(std::fs::read(&target).unwrap(), body, "arrival order #{n}");
    }
    cleanup(&dir).unwrap();
}

/// Inplace announcements through the transfer layer: the file is grown on
/// first contact and reported complete only once every block is in.
#[tokio::test]
async fn test_inplace_transfer_reports_completion_once() {
    let body = pattern(FILE_SIZE);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("inplace");
    let blocks = plan(FILE_SIZE as u64, CHUNK, PartitionStyle::Inplace);

    for (n, order) in permutations(blocks.len() as u64).into_iter().enumerate() {
        let transfer = BlockTransfer::new(&settings(dir.clone())).unwrap();
        let rel = format!("/in/{n}/obs file.bin");
        let last = *order.last().unwrap();

        for index in order {
            let msg = announce(&origin, &rel, blocks[index as usize]);
            let report = transfer.run(&msg, None).await.unwrap();
            assert!(report.outcome.is_success());
            assert_eq!(report.complete, index == last, "block {index} of order #{n}");
            assert_eq!(
                std::fs::metadata(&report.path).unwrap().len(),
                FILE_SIZE as u64
            );
        }

        let target = dir.join(format!("in/{n}/obs file.bin"));
        assert_eq!(std::fs::read(&target).unwrap(), body);
    }
    cleanup(&dir).unwrap();
}

/// Partitioned announcements land in segment files that are stitched
/// together and removed when the last one arrives.
#[tokio::test]
async fn test_partitioned_segments_reassemble() {
    let body = pattern(FILE_SIZE + 17);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("segments");
    let mut s = settings(dir.clone());
    s.inplace = false;
    let transfer = BlockTransfer::new(&s).unwrap();
    let blocks = plan(body.len() as u64, CHUNK, PartitionStyle::Partitioned);
    assert_eq!(blocks.len(), 10);
    assert_eq!(blocks[9].span().length, 801);

    let order = &permutations(blocks.len() as u64)[2];
    let target = dir.join("seg.bin");
    for (seen, &index) in order.iter().enumerate() {
        let report = transfer
            .run(&announce(&origin, "seg.bin", blocks[index as usize]), None)
            .await
            .unwrap();
        assert!(report.outcome.is_success());
        let finished = seen + 1 == order.len();
        assert_eq!(report.complete, finished);
        if !finished {
            assert!(!target.exists());
            assert!(pump_services::transfer::segment_path(&target, index).exists());
        }
    }

    assert_eq!(std::fs::read(&target).unwrap(), body);
    for index in 0..blocks.len() as u64 {
        assert!(!pump_services::transfer::segment_path(&target, index).exists());
    }
    cleanup(&dir).unwrap();
}

/// Separate downloaders writing disjoint ranges of one file at the same time
/// need no coordination.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_disjoint_writers() {
    let body = pattern(64 * 1024 + 5);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("concurrent");
    let target = Arc::new(dir.join("shared.bin"));
    std::fs::File::create(target.as_path())
        .unwrap()
        .set_len(body.len() as u64)
        .unwrap();

    let downloader = RangeDownloader::new(&settings(dir.clone())).unwrap();
    let url = format!("{}shared.bin", origin.base_url);
    let mut tasks = Vec::new();
    for block in plan(body.len() as u64, 4096, PartitionStyle::Inplace) {
        let downloader = downloader.clone();
        let target = Arc::clone(&target);
        let url = url.clone();
        tasks.push(tokio::spawn(async move {
            downloader
                .fetch(&url, None, &block, &target, block.span().offset)
                .await
        }));
    }
    assert_eq!(tasks.len(), 17);
    for task in tasks {
        assert!(task.await.unwrap().is_success());
    }

    assert_eq!(std::fs::read(target.as_path()).unwrap(), body);
    cleanup(&dir).unwrap();
}

// ══════════════════════════════════════════════════════════════════════════════
//  Outcomes
// ══════════════════════════════════════════════════════════════════════════════

/// Fetching the same block twice leaves the same bytes behind.
#[tokio::test]
async fn test_refetch_is_idempotent() {
    let body = pattern(3000);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("refetch");
    let transfer = BlockTransfer::new(&settings(dir.clone())).unwrap();
    let blocks = plan(3000, 1000, PartitionStyle::Inplace);

    for index in [1, 1, 0, 2, 2] {
        let report = transfer
            .run(&announce(&origin, "r.bin", blocks[index]), None)
            .await
            .unwrap();
        assert!(report.outcome.is_success());
    }
    assert_eq!(std::fs::read(dir.join("r.bin")).unwrap(), body);
    assert_eq!(origin.hits(), 5);
    cleanup(&dir).unwrap();
}

/// A whole-file fetch over a longer stale copy leaves exactly the new body.
#[tokio::test]
async fn test_whole_file_replaces_stale_copy() {
    let body = pattern(500);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("whole");
    std::fs::write(dir.join("w.bin"), vec![0xffu8; 2000]).unwrap();

    let transfer = BlockTransfer::new(&settings(dir.clone())).unwrap();
    let mut msg = announce(&origin, "w.bin", Partition::whole(500));
    msg.partition = None;
    msg.size = Some(500);
    let report = transfer.run(&msg, None).await.unwrap();

    assert!(report.complete);
    assert_eq!(report.outcome.code, 201);
    assert_eq!(report.outcome.message, "Downloaded");
    assert_eq!(std::fs::read(dir.join("w.bin")).unwrap(), body);
    cleanup(&dir).unwrap();
}

/// A server that ignores the Range header must not get its full body written
/// at a block offset.
#[tokio::test]
async fn test_unhonoured_range_is_a_failure() {
    let body = pattern(4000);
    let options = OriginOptions {
        ignore_ranges: true,
        ..OriginOptions::default()
    };
    let origin = serve(body, options).await.unwrap();
    let dir = scratch("norange");
    let target = dir.join("n.bin");
    std::fs::write(&target, vec![0u8; 4000]).unwrap();

    let downloader = RangeDownloader::new(&settings(dir.clone())).unwrap();
    let block = plan(4000, 1000, PartitionStyle::Inplace)[2];
    let outcome = downloader
        .fetch(&format!("{}n.bin", origin.base_url), None, &block, &target, 2000)
        .await;

    assert_eq!(outcome.code, 499);
    assert_eq!(std::fs::read(&target).unwrap(), vec![0u8; 4000]);
    cleanup(&dir).unwrap();
}

#[tokio::test]
async fn test_basic_auth_sources() {
    let body = pattern(64);
    let options = OriginOptions {
        auth: Some(("alice".into(), "s3cret".into())),
        ..OriginOptions::default()
    };
    let origin = serve(body.clone(), options).await.unwrap();
    let dir = scratch("auth");
    let downloader = RangeDownloader::new(&settings(dir.clone())).unwrap();
    let whole = Partition::whole(64);
    let target = dir.join("a.bin");

    let anonymous = downloader
        .fetch(&format!("{}a.bin", origin.base_url), None, &whole, &target, 0)
        .await;
    assert_eq!(anonymous.code, 499);

    let embedded = format!("http://alice:s3cret@{}/a.bin", origin.addr);
    assert!(downloader.fetch(&embedded, None, &whole, &target, 0).await.is_success());

    let explicit = Credentials::new("alice", Some("s3cret".into()));
    let outcome = downloader
        .fetch(&format!("{}a.bin", origin.base_url), Some(&explicit), &whole, &target, 0)
        .await;
    assert!(outcome.is_success());

    let mut s = settings(dir.clone());
    s.user = Some("alice".into());
    s.password = Some("s3cret".into());
    let configured = RangeDownloader::new(&s).unwrap();
    assert!(configured
        .fetch(&format!("{}a.bin", origin.base_url), None, &whole, &target, 0)
        .await
        .is_success());

    assert_eq!(std::fs::read(&target).unwrap(), body);
    cleanup(&dir).unwrap();
}

#[tokio::test]
async fn test_unreachable_host_returns_499() {
    let dir = scratch("unreachable");
    let downloader = RangeDownloader::new(&settings(dir.clone())).unwrap();
    let outcome = downloader
        .fetch("http://127.0.0.1:1/x", None, &Partition::whole(1), &dir.join("x"), 0)
        .await;
    assert_eq!(outcome.code, 499);
    assert_eq!(outcome.message, "http download problem");
    cleanup(&dir).unwrap();
}
