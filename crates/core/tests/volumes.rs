//! Behaviour shared by every driver, exercised through the registry.

use std::collections::BTreeSet;
use std::sync::Arc;

use futures::TryStreamExt;
use tempfile::TempDir;

use volumes_core::client::{MemoryClient, shared_factory};
use volumes_core::config::{ObjectStoreDefaults, S3Settings, VolumeDefinition};
use volumes_core::path::{KeyPrefix, RootedPath};
use volumes_core::{
    Content, CopyOptions, MoveOptions, ReadOptions, RequestParams, Volume, VolumeManager,
    WriteOptions,
};

struct Fixture {
    manager: VolumeManager,
    client: Arc<MemoryClient>,
    _dir: TempDir,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let client = Arc::new(MemoryClient::new("uploads"));
    let manager = VolumeManager::with_client_factory(
        ObjectStoreDefaults {
            bucket: Some("uploads".into()),
            ..Default::default()
        },
        shared_factory(client.clone()),
    );
    manager.add_volume("fs", VolumeDefinition::local(dir.path().join("fs")), true);
    manager.add_volume(
        "s3",
        VolumeDefinition::S3(S3Settings {
            root: Some("/volume/".into()),
            max_keys: Some(2),
            ..Default::default()
        }),
        true,
    );
    Fixture {
        manager,
        client,
        _dir: dir,
    }
}

fn volumes(fixture: &Fixture) -> Vec<Arc<dyn Volume>> {
    ["fs", "s3"]
        .into_iter()
        .map(|name| fixture.manager.volume(Some(name)).unwrap())
        .collect()
}

async fn read_text(volume: &dyn Volume, path: &str) -> String {
    let entry = volume.read(path, ReadOptions::default()).await.unwrap();
    assert_eq!(entry.path, path);
    entry.content.unwrap().as_text().unwrap().to_string()
}

async fn listed(volume: &dyn Volume, prefix: &str) -> Vec<String> {
    volume
        .list(prefix, RequestParams::default())
        .map_ok(|entry| entry.path)
        .try_collect()
        .await
        .unwrap()
}

#[tokio::test]
async fn write_then_read_returns_same_content() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        assert!(!volume.exists("notes/a.txt", RequestParams::default()).await.unwrap().exists);

        volume
            .write("notes/a.txt", Content::from("héllo"), WriteOptions::default())
            .await
            .unwrap();
        assert!(volume.exists("notes/a.txt", RequestParams::default()).await.unwrap().exists);
        assert_eq!(read_text(volume, "notes/a.txt").await, "héllo");

        let bytes = vec![0u8, 159, 146, 150, 255];
        volume
            .write("blob.bin", Content::from(bytes.clone()), WriteOptions::default())
            .await
            .unwrap();
        let entry = volume.read("blob.bin", ReadOptions::bytes()).await.unwrap();
        assert_eq!(entry.content.unwrap().as_bytes(), bytes.as_slice());

        let err = volume
            .read("blob.bin", ReadOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_UNKNOWN", "{}", volume.protocol());
    }
}

#[tokio::test]
async fn streamed_writes_are_readable() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let reader = std::io::Cursor::new(b"streamed body".to_vec());
        volume
            .write("in/stream.txt", Content::stream(reader), WriteOptions::default())
            .await
            .unwrap();
        assert_eq!(read_text(volume.as_ref(), "in/stream.txt").await, "streamed body");
    }
}

#[tokio::test]
async fn remove_of_missing_path_does_not_fail() {
    let fixture = fixture();
    let fs = fixture.manager.volume(Some("fs")).unwrap();
    let s3 = fixture.manager.volume(Some("s3")).unwrap();

    assert_eq!(fs.remove("never.txt", RequestParams::default()).await.unwrap().deleted, Some(false));
    assert_eq!(s3.remove("never.txt", RequestParams::default()).await.unwrap().deleted, None);

    for volume in [fs, s3] {
        let err = volume.remove("", RequestParams::default()).await.unwrap_err();
        assert_eq!(err.code(), "ERR_MISSING_ARGUMENT");
    }
}

#[tokio::test]
async fn copy_leaves_source_untouched() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        volume
            .write("a.txt", Content::from("original"), WriteOptions::default())
            .await
            .unwrap();
        let before = read_text(volume, "a.txt").await;

        volume
            .copy("a.txt", "b.txt", CopyOptions::default())
            .await
            .unwrap();
        assert_eq!(read_text(volume, "b.txt").await, before);
        assert_eq!(read_text(volume, "a.txt").await, before);

        let err = volume
            .copy("a.txt", "b.txt", CopyOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_OPERATION_NOT_PERMITTED");
        assert!(err.to_string().contains("Use overwrite option."));
    }
}

#[tokio::test]
async fn move_relocates_content() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        volume
            .write("from.txt", Content::from("payload"), WriteOptions::default())
            .await
            .unwrap();
        volume
            .rename("from.txt", "to/here.txt", MoveOptions::default())
            .await
            .unwrap();
        assert!(!volume.exists("from.txt", RequestParams::default()).await.unwrap().exists);
        assert_eq!(read_text(volume, "to/here.txt").await, "payload");
    }
}

#[tokio::test]
async fn move_onto_itself_keeps_content() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        volume
            .write("same.txt", Content::from("keep me"), WriteOptions::default())
            .await
            .unwrap();
        volume
            .rename("same.txt", "./same.txt", MoveOptions::default())
            .await
            .unwrap();
        assert_eq!(read_text(volume, "same.txt").await, "keep me", "{}", volume.protocol());
    }
}

#[tokio::test]
async fn request_params_pass_through_the_registry() {
    let fixture = fixture();
    let volume = fixture.manager.volume(Some("s3")).unwrap();
    let params = RequestParams::default().with_header("x-amz-storage-class", "STANDARD_IA");
    volume
        .write(
            "tagged.txt",
            Content::from("t"),
            WriteOptions {
                params: params.clone(),
                ..WriteOptions::default()
            },
        )
        .await
        .unwrap();

    let requests = fixture.client.requests();
    let put = requests.last().unwrap();
    assert_eq!((put.operation, put.key.as_str()), ("put_object", "volume/tagged.txt"));
    assert_eq!(put.params, params);

    // The filesystem driver has no request to extend and ignores them.
    let fs = fixture.manager.volume(Some("fs")).unwrap();
    fs.write(
        "tagged.txt",
        Content::from("t"),
        WriteOptions {
            params,
            ..WriteOptions::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(read_text(fs.as_ref(), "tagged.txt").await, "t");
}

#[tokio::test]
async fn listing_yields_files_only_once() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        for path in ["a/x.txt", "a/b/y.txt", "z.txt"] {
            volume
                .write(path, Content::from(path), WriteOptions::default())
                .await
                .unwrap();
        }

        let all = listed(volume, "").await;
        assert_eq!(all.len(), 3, "{}: {all:?}", volume.protocol());
        let all: BTreeSet<_> = all.into_iter().collect();
        let expected: BTreeSet<String> = ["a/x.txt", "a/b/y.txt", "z.txt"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(all, expected);

        let nested: BTreeSet<_> = listed(volume, "a/").await.into_iter().collect();
        let expected: BTreeSet<String> = ["a/x.txt", "a/b/y.txt"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(nested, expected);

        assert!(listed(volume, "missing/").await.is_empty());
    }
}

#[tokio::test]
async fn object_keys_stay_under_root_prefix() {
    let fixture = fixture();
    let s3 = fixture.manager.volume(Some("s3")).unwrap();
    s3.write("docs/readme.md", Content::from("# hi"), WriteOptions::default())
        .await
        .unwrap();
    assert_eq!(
        fixture.client.keys().await,
        vec!["volume/docs/readme.md".to_string()]
    );
}

#[tokio::test]
async fn scenario_round_trip() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let volume = volume.as_ref();
        volume
            .write("testing.txt", Content::from("hello"), WriteOptions::default())
            .await
            .unwrap();
        assert!(volume.exists("testing.txt", RequestParams::default()).await.unwrap().exists);
        assert_eq!(read_text(volume, "testing.txt").await, "hello");

        volume
            .copy("testing.txt", "dup.txt", CopyOptions::default())
            .await
            .unwrap();
        assert_eq!(read_text(volume, "dup.txt").await, "hello");

        volume.remove("testing.txt", RequestParams::default()).await.unwrap();
        assert!(!volume.exists("testing.txt", RequestParams::default()).await.unwrap().exists);
        assert!(volume.exists("dup.txt", RequestParams::default()).await.unwrap().exists);
    }
}

#[tokio::test]
async fn traversal_cannot_leave_the_volume() {
    let fixture = fixture();
    for volume in volumes(&fixture) {
        let err = volume
            .write("../outside.txt", Content::from("x"), WriteOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ERR_OPERATION_NOT_PERMITTED");
        assert_eq!(err.status(), 403);
    }
}

#[test]
fn normalize_and_denormalize_are_inverse() {
    let dir = tempfile::tempdir().unwrap();
    let rooted = RootedPath::new(dir.path()).unwrap();
    let keys = KeyPrefix::new("/media/");

    for path in ["a.txt", "a/b/c.txt", "with space/ü.txt", "deep/er/still/x"] {
        let full = rooted.normalize(path).unwrap();
        assert!(full.starts_with(rooted.root()));
        assert_eq!(rooted.denormalize(&full).as_deref(), Some(path));

        let key = keys.normalize(path).unwrap();
        assert!(key.starts_with("media/"));
        assert_eq!(keys.denormalize(&key), path);
    }
}

#[test]
fn errors_serialize_to_plain_reports() {
    let fixture = fixture();
    let err = fixture.manager.volume(Some("nope")).err().unwrap();
    let json: serde_json::Value =
        serde_json::from_str(&err.report(false).to_json().unwrap()).unwrap();
    assert_eq!(json["code"], "ERR_UNKNOWN_VOLUME");
    assert_eq!(json["status"], 404);
    assert_eq!(json["data"]["volume"], "nope");
    assert!(json.get("trace").is_none());
}
