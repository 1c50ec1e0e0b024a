use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;

use pump_core::integrity::{Integrity, IntegrityMethod};
use pump_core::partition::{plan, PartitionStyle};
use pump_core::translate::{to_current, to_legacy, LegacyAnnouncement, LegacyHeaders};
use pump_core::wire::Generation;
use pump_services::BlockTransfer;

use crate::*;

fn legacy(topic: &str, body: &str, headers: &[(&str, String)]) -> LegacyAnnouncement {
    LegacyAnnouncement {
        topic: topic.into(),
        body: body.into(),
        headers: headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect(),
    }
}

// ══════════════════════════════════════════════════════════════════════════════
//  Legacy announcements end to end
// ══════════════════════════════════════════════════════════════════════════════

/// Legacy announcements for every block of a file, translated and fetched,
/// produce the file.
#[tokio::test]
async fn test_legacy_announcements_fetch_whole_file() {
    let body = pattern(5000);
    let origin = serve(body.clone(), OriginOptions::default()).await.unwrap();
    let dir = scratch("legacy-e2e");
    let transfer = BlockTransfer::new(&settings(dir.clone())).unwrap();
    let digest = hex_digest(&body);

    let blocks = plan(5000, 1200, PartitionStyle::Inplace);
    assert_eq!(blocks.len(), 5);
    let mut complete = false;
    for block in blocks.iter().rev() {
        let envelope = legacy(
            "v02.post.obs",
            &format!("20240102030405.5 {} /obs/day%201/f#2.dat", origin.base_url),
            &[("parts", block.encode()), ("sum", format!("d,{digest}"))],
        );
        let msg = envelope.to_current().unwrap();
        assert_eq!(msg.rel_path, "/obs/day 1/f#2.dat");
        let report = transfer.run(&msg, None).await.unwrap();
        assert!(report.outcome.is_success());
        complete = report.complete;
    }

    assert!(complete);
    assert_eq!(
        std::fs::read(dir.join("obs/day 1/f#2.dat")).unwrap(),
        body
    );
    cleanup(&dir).unwrap();
}

/// Credentials carried in a legacy base URL reach the origin.
#[tokio::test]
async fn test_legacy_base_url_credentials() {
    let body = pattern(300);
    let options = OriginOptions {
        auth: Some(("feed".into(), "pw".into())),
        ..OriginOptions::default()
    };
    let origin = serve(body.clone(), options).await.unwrap();
    let dir = scratch("legacy-auth");
    let transfer = BlockTransfer::new(&settings(dir.clone())).unwrap();

    let envelope = legacy(
        "v02.post.p",
        &format!("20240102030405 http://feed:pw@{}/ p.bin", origin.addr),
        &[("parts", "1,300,1,0,0".to_string())],
    );
    let report = transfer.run(&envelope.to_current().unwrap(), None).await.unwrap();
    assert!(report.complete);
    assert_eq!(std::fs::read(dir.join("p.bin")).unwrap(), body);
    cleanup(&dir).unwrap();
}

// ══════════════════════════════════════════════════════════════════════════════
//  Round trips
// ══════════════════════════════════════════════════════════════════════════════

/// Every planned descriptor and every integrity method survives
/// legacy → current → legacy with equal decoded values.
#[test]
fn test_round_trip_preserves_semantic_fields() {
    let values: Vec<Integrity> = IntegrityMethod::ALL
        .iter()
        .map(|&method| match method {
            IntegrityMethod::Random => Integrity::random("8f2a"),
            IntegrityMethod::Cod => Integrity::cod(IntegrityMethod::Sha512),
            m => Integrity::digest(m, vec![0xde, 0xad, 0xbe, 0xef, 0x01]).unwrap(),
        })
        .collect();

    let mut descriptors = plan(3001, 1000, PartitionStyle::Partitioned);
    descriptors.extend(plan(3000, 1000, PartitionStyle::Inplace));
    descriptors.extend(plan(500, 1, PartitionStyle::Inplace));
    assert_eq!(descriptors.len(), 8);

    for integrity in &values {
        for block in &descriptors {
            let mut headers = LegacyHeaders::new();
            headers.insert("sum".into(), integrity.encode(Generation::Legacy));
            headers.insert("parts".into(), block.encode());
            headers.insert("mtime".into(), "20231231235959.123".into());
            let body = "20240102030405.000001 https://dd.example.org/ /x/y%20z.txt";

            let msg = to_current(body, &headers, "v02.post.x").unwrap();
            assert_eq!(msg.integrity.as_ref(), Some(integrity));
            assert_eq!(msg.file_size(), Some(block.file_size()));
            assert_eq!(msg.headers["mtime"], "20231231T235959.123");

            let back = to_legacy(&msg);
            assert_eq!(back.body, body);
            assert_eq!(back.headers, headers);
        }
    }
}

/// Digest text changes encoding across generations; the bytes do not.
#[test]
fn test_digest_encoding_follows_generation() {
    let bytes = [0x12u8, 0x34, 0x56, 0x78, 0x9a];
    let integrity = Integrity::digest(IntegrityMethod::Sha512, bytes.to_vec()).unwrap();

    let legacy_text = integrity.encode(Generation::Legacy);
    let current_text = integrity.encode(Generation::Current);
    assert_eq!(legacy_text, "s,123456789a");
    assert_eq!(current_text, format!("s,{}", BASE64.encode(bytes)));

    let mut headers = LegacyHeaders::new();
    headers.insert("sum".into(), legacy_text);
    let msg = to_current("20240102030405 http://h/ f", &headers, "t").unwrap();
    let json: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(json["integrity"]["method"], "sha512");
    assert_eq!(json["integrity"]["value"], BASE64.encode(bytes));
}

/// Stand-in digest text; content verification is outside the transfer path.
fn hex_digest(body: &[u8]) -> String {
    let folded = body
        .chunks(16)
        .fold([0u8; 16], |mut acc, chunk| {
            for (a, b) in acc.iter_mut().zip(chunk) {
                *a ^= b;
            }
            acc
        });
    hex::encode(folded)
}
