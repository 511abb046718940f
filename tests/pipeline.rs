use std::{
    io::Cursor,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use bytes::Bytes;
use edge_image_derive::{
    store::ObjectHead, BodyEncoding, DeriveError, EdgeEvent, EdgeRequest, EdgeResponse,
    ImageDeriver, ImageDeriverBuilder, MemoryStore, ObjectStore, ParamsError, StoreError,
    StoredObject, TransformError,
};
use http::{header, StatusCode};
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use tower::ServiceExt;

fn encoded_image(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let image = DynamicImage::ImageRgb8(ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
    }));
    let mut buf = Cursor::new(Vec::new());
    image.write_to(&mut buf, format).unwrap();
    buf.into_inner()
}

fn deriver(store: &Arc<MemoryStore>) -> ImageDeriver<MemoryStore> {
    ImageDeriverBuilder::from_shared(Arc::clone(store)).build()
}

fn event(uri: &str, query: &str) -> EdgeEvent {
    EdgeEvent::from_request(EdgeRequest::new(uri, query))
}

async fn call<S: ObjectStore + 'static>(
    deriver: &ImageDeriver<S>,
    uri: &str,
    query: &str,
) -> Result<EdgeResponse, DeriveError> {
    deriver.clone().oneshot(event(uri, query)).await
}

fn decode_inline(response: &EdgeResponse) -> DynamicImage {
    assert_eq!(response.body_encoding, Some(BodyEncoding::Base64));
    let bytes = STANDARD.decode(response.body.as_deref().unwrap()).unwrap();
    image::load_from_memory(&bytes).unwrap()
}

#[tokio::test]
async fn derives_inline_then_redirects_once_cached() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "albums/photo.jpg",
        encoded_image(800, 600, ImageFormat::Jpeg),
        "image/jpeg",
    );
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_store_inline_results(true)
        .build();

    let first = call(&deriver, "/albums/photo.jpg", "w=400&q=60").await.unwrap();
    assert_eq!(first.status, StatusCode::OK);
    assert_eq!(first.header(&header::CONTENT_TYPE), Some("image/jpeg"));

    let derived = decode_inline(&first);
    assert_eq!((derived.width(), derived.height()), (399, 299));

    let cached = store.get("albums/w400q60_photo.jpg").unwrap();
    assert_eq!(cached.content_type, "image/jpeg");

    let second = call(&deriver, "/albums/photo.jpg", "w=400&q=60").await.unwrap();
    assert_eq!(second.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(
        second.header(&header::LOCATION),
        Some("/albums/w400q60_photo.jpg")
    );
}

#[tokio::test]
async fn inline_results_are_not_stored_by_default() {
    let store = Arc::new(MemoryStore::new());
    store.insert("photo.jpg", encoded_image(120, 80, ImageFormat::Jpeg), "image/jpeg");

    let response = call(&deriver(&store), "/photo.jpg", "s=s").await.unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(store.len(), 1);
}

#[tokio::test]
async fn large_results_are_stored_and_redirected() {
    let store = Arc::new(MemoryStore::new());
    store.insert("big/pic.png", encoded_image(64, 64, ImageFormat::Png), "image/png");
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_inline_limit(16)
        .build();

    let response = call(&deriver, "/big/pic.png", "h=32").await.unwrap();
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.header(&header::LOCATION), Some("/big/h32q75_pic.png"));
    assert!(response.body.is_none());

    let stored = store.get("big/h32q75_pic.png").unwrap();
    assert_eq!(stored.content_type, "image/png");
    let image = image::load_from_memory_with_format(&stored.body, ImageFormat::Png).unwrap();
    assert_eq!((image.width(), image.height()), (31, 31));
}

#[tokio::test]
async fn cache_hit_skips_transform_work() {
    // Only the derivative exists: touching the original would fail the call.
    let store = Arc::new(MemoryStore::new());
    store.insert("a/h10w10q75_b.jpg", &b"cached"[..], "image/jpeg");

    let response = call(&deriver(&store), "/a/b.jpg", "w=10&h=10").await.unwrap();
    assert_eq!(response.status, StatusCode::MOVED_PERMANENTLY);
    assert_eq!(response.header(&header::LOCATION), Some("/a/h10w10q75_b.jpg"));
}

#[tokio::test]
async fn empty_query_passes_request_headers_through() {
    let store = Arc::new(MemoryStore::new());
    let mut request = EdgeRequest::new("/a/b.jpg", "");
    request.headers.insert(
        "host".to_owned(),
        vec![edge_image_derive::envelope::HeaderEntry {
            key: "Host".to_owned(),
            value: "img.example.com".to_owned(),
        }],
    );

    let response = deriver(&store)
        .oneshot(EdgeEvent::from_request(request.clone()))
        .await
        .unwrap();
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers, request.headers);
    assert!(response.body.is_none());
}

#[tokio::test]
async fn unsupported_content_type_is_passed_through() {
    let store = Arc::new(MemoryStore::new());
    store.insert("docs/readme.txt", &b"plain text"[..], "text/plain");
    store.insert("anim/cat.gif", &b"GIF89a\x00\xff"[..], "image/gif");
    let deriver = deriver(&store);

    let text = call(&deriver, "/docs/readme.txt", "w=100").await.unwrap();
    assert_eq!(text.status, StatusCode::OK);
    assert_eq!(text.body.as_deref(), Some("plain text"));
    assert_eq!(text.body_encoding, Some(BodyEncoding::Text));
    assert_eq!(text.header(&header::CONTENT_TYPE), Some("text/plain"));

    let gif = call(&deriver, "/anim/cat.gif", "w=100").await.unwrap();
    assert_eq!(gif.body_encoding, Some(BodyEncoding::Base64));
    assert_eq!(gif.header(&header::CONTENT_TYPE), Some("image/gif"));

    assert_eq!(store.len(), 2);
}

#[tokio::test]
async fn percent_encoded_paths_are_decoded_for_the_store() {
    let store = Arc::new(MemoryStore::new());
    store.insert(
        "my photos/a b.png",
        encoded_image(40, 20, ImageFormat::Png),
        "image/png",
    );
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_inline_limit(0)
        .build();

    let response = call(&deriver, "/my%20photos/a%20b.png", "w=20").await.unwrap();
    assert_eq!(
        response.header(&header::LOCATION),
        Some("/my%20photos/w20q75_a%20b.png")
    );
    assert!(store.contains("my photos/w20q75_a b.png"));
}

#[tokio::test]
async fn missing_records_is_bad_request() {
    let store = Arc::new(MemoryStore::new());
    let event = EdgeEvent::from_json(r#"{"foo": "bar"}"#).unwrap();

    let response = deriver(&store).oneshot(event).await.unwrap();
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.status_description, "Bad Request");
    assert_eq!(response.header(&header::CONTENT_TYPE), Some("text/plain"));
}

#[tokio::test]
async fn malformed_query_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let err = call(&deriver(&store), "/a.jpg", "w=wide").await.unwrap_err();
    assert!(matches!(err, DeriveError::Query(ParamsError::MalformedInteger { .. })));
}

#[tokio::test]
async fn oversized_quality_saturates() {
    let store = Arc::new(MemoryStore::new());
    store.insert("q.jpg", encoded_image(60, 40, ImageFormat::Jpeg), "image/jpeg");
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_inline_limit(0)
        .build();

    let response = call(&deriver, "/q.jpg", "w=30&q=99999999999999999999")
        .await
        .unwrap();
    assert_eq!(response.header(&header::LOCATION), Some("/w30q95_q.jpg"));
}

#[tokio::test]
async fn missing_original_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    let err = call(&deriver(&store), "/gone.jpg", "w=10").await.unwrap_err();
    assert!(matches!(err, DeriveError::OriginalNotFound { ref key } if key == "gone.jpg"));
}

#[tokio::test]
async fn corrupt_image_is_fatal() {
    let store = Arc::new(MemoryStore::new());
    store.insert("broken.jpg", &b"\xff\xd8 truncated"[..], "image/jpeg");

    let err = call(&deriver(&store), "/broken.jpg", "w=10").await.unwrap_err();
    assert!(matches!(err, DeriveError::Transform(TransformError::Image(_))));
    assert_eq!(store.len(), 1);
}

/// Store whose every operation fails, counting how often it was asked.
#[derive(Debug, Default)]
struct FailingStore {
    heads: AtomicUsize,
    puts: AtomicUsize,
    original: Option<StoredObject>,
}

fn throttled(key: &str) -> StoreError {
    StoreError::UnexpectedStatus {
        key: key.to_owned(),
        status: StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[async_trait]
impl ObjectStore for FailingStore {
    async fn head_object(&self, key: &str) -> Result<Option<ObjectHead>, StoreError> {
        self.heads.fetch_add(1, Ordering::SeqCst);
        match self.original {
            // Pretend the head works so that the pipeline reaches the write.
            Some(_) => Ok(None),
            None => Err(throttled(key)),
        }
    }

    async fn get_object(&self, _key: &str) -> Result<Option<StoredObject>, StoreError> {
        Ok(self.original.clone())
    }

    async fn put_object(
        &self,
        key: &str,
        _body: Bytes,
        _content_type: &str,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        Err(throttled(key))
    }
}

#[tokio::test]
async fn head_failure_is_not_a_cache_miss() {
    let store = Arc::new(FailingStore::default());
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store)).build();

    let err = call(&deriver, "/a.jpg", "w=10").await.unwrap_err();
    assert!(matches!(
        err,
        DeriveError::Store(StoreError::UnexpectedStatus { .. })
    ));
    assert_eq!(store.heads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn store_write_failure_is_fatal() {
    let store = Arc::new(FailingStore {
        original: Some(StoredObject {
            body: Bytes::from(encoded_image(50, 50, ImageFormat::Png)),
            content_type: "image/png".to_owned(),
        }),
        ..FailingStore::default()
    });
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_inline_limit(1)
        .build();

    let err = call(&deriver, "/a.png", "w=10").await.unwrap_err();
    assert!(matches!(err, DeriveError::Store(_)));
    assert_eq!(store.puts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn concurrent_misses_write_identical_objects() {
    let store = Arc::new(MemoryStore::new());
    store.insert("race.png", encoded_image(90, 60, ImageFormat::Png), "image/png");
    let deriver = ImageDeriverBuilder::from_shared(Arc::clone(&store))
        .set_inline_limit(0)
        .build();

    let (a, b) = tokio::join!(
        call(&deriver, "/race.png", "w=30"),
        call(&deriver, "/race.png", "w=30"),
    );
    assert_eq!(a.unwrap(), b.unwrap());
    assert_eq!(store.len(), 2);
    assert!(store.contains("w30q75_race.png"));
}
