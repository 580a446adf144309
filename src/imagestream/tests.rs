use super::*;
use crate::{
    errors::StatusError,
    memory::{MemoryClient, Operation},
    metadata::NamedTagEventList,
};
use chrono::Utc;
use tokio::runtime::Runtime;

const REGISTRY: &str = "registry.svc:5000";
const A: &str = "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
const B: &str = "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

fn digest(s: &str) -> ContentDigest {
    ContentDigest::parse(s).unwrap()
}

fn image(digest: &str) -> Image {
    let mut image = Image::default();
    image.metadata.name = digest.to_owned();
    image.docker_image_reference = format!("{}/team/app@{}", REGISTRY, digest);
    image
}

fn client() -> Arc<MemoryClient> {
    let _ = env_logger::builder().is_test(true).try_init();
    let client = Arc::new(MemoryClient::new(REGISTRY));
    let mut stream = metadata::ImageStream::default();
    stream.metadata.namespace = "team".to_owned();
    stream.metadata.name = "app".to_owned();
    stream.status.tags.push(NamedTagEventList {
        tag: "latest".to_owned(),
        items: vec![
            TagEvent {
                created: Utc::now(),
                docker_image_reference: format!("quay.io/upstream/app@{}", A),
                image: A.to_owned(),
                generation: 2,
            },
            TagEvent {
                created: Utc::now(),
                docker_image_reference: format!("quay.io/upstream/app@{}", B),
                image: B.to_owned(),
                generation: 1,
            },
        ],
    });
    client.add_image_stream(stream);
    client.add_image(image(A));
    client
}

fn facade(client: &Arc<MemoryClient>) -> ImageStream {
    ImageStream::new("team", "app", client.clone(), RequestContext::new())
}

#[test]
fn image_fetched_once_per_request() {
    let client = client();
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        let first = is.get_image_of_image_stream(&digest(A)).await.unwrap();
        let second = is.get_image_of_image_stream(&digest(A)).await.unwrap();
        assert_eq!(first, second);
    });
    assert_eq!(client.calls(Operation::GetImage), 1);
    assert_eq!(client.calls(Operation::GetImageStream), 1);
}

#[test]
fn image_failure_fetched_once_per_request() {
    let client = client();
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        let first = is.get_image_of_image_stream(&digest(B)).await.unwrap_err();
        let second = is.get_image_of_image_stream(&digest(B)).await.unwrap_err();
        assert_eq!(first.code(), ErrorCode::ImageNotFound);
        assert_eq!(first.to_string(), second.to_string());
    });
    assert_eq!(client.calls(Operation::GetImage), 1);
}

#[test]
fn layers_are_fetched_lazily() {
    let client = client();
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        assert!(is.exists().await.unwrap());
        is.tags().await.unwrap();
        is.tag_is_insecure(None, &digest(A)).await.unwrap();
        is.remote_repositories_for_manifest(&digest(A)).await.unwrap();
        assert_eq!(client.calls(Operation::GetImageStreamLayers), 0);

        is.remote_repositories_for_blob(&digest(A)).await.unwrap();
        is.has_blob(&digest(A)).await;
    });
    assert_eq!(client.calls(Operation::GetImageStream), 1);
    assert_eq!(client.calls(Operation::GetImageStreamLayers), 1);
}

#[test]
fn clone_for_starts_fresh() {
    let client = client();
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        assert!(is.exists().await.unwrap());
        let mut other = is.clone_for("team", "other");
        assert_eq!(other.reference(), "team/other");
        assert!(!other.exists().await.unwrap());
        let mut same = is.clone_for("team", "app");
        assert!(same.exists().await.unwrap());
    });
    assert_eq!(client.calls(Operation::GetImageStream), 3);
}

#[test]
fn cancelled_request_fails_without_caching() {
    let client = client();
    let context = RequestContext::new();
    context.cancel_token().cancel();
    let mut is = ImageStream::new("team", "app", client.clone(), context);
    Runtime::new().unwrap().block_on(async {
        assert_eq!(is.exists().await.unwrap_err().code(), ErrorCode::Unknown);
        assert_eq!(is.tags().await.unwrap_err().code(), ErrorCode::Unknown);
    });
    assert_eq!(client.calls(Operation::GetImageStream), 0);
}

#[test]
fn getter_failures_are_translated() {
    let client = client();
    client.fail_next(
        Operation::GetImageStream,
        StatusError::forbidden("imagestreams", "app", "denied"),
    );
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        let err = is.tags().await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Forbidden);
        assert_eq!(err.message(), "tags: failed to get image stream team/app");
        assert!(std::error::Error::source(&err).is_some());
        // the failure is remembered for the rest of the request
        assert_eq!(is.exists().await.unwrap_err().code(), ErrorCode::Forbidden);
    });

    client.fail_next(
        Operation::GetImageStream,
        StatusError::unauthorized("token expired"),
    );
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        assert_eq!(is.exists().await.unwrap_err().code(), ErrorCode::Unknown);
    });

    let mut is = is.clone_for("team", "missing");
    Runtime::new().unwrap().block_on(async {
        assert_eq!(is.tags().await.unwrap_err().code(), ErrorCode::NotFound);
    });
}

#[test]
fn provisioned_stream_is_cached() {
    let client = Arc::new(MemoryClient::new(REGISTRY));
    client.add_namespace("team");
    let mut is = facade(&client);
    Runtime::new().unwrap().block_on(async {
        is.create_image_stream_mapping(&*client, "latest", &image(A))
            .await
            .unwrap();
        assert!(is.exists().await.unwrap());
    });
    assert_eq!(client.calls(Operation::GetImageStream), 0);
    assert_eq!(client.calls(Operation::CreateImageStream), 1);
    assert_eq!(client.calls(Operation::CreateImageStreamMapping), 2);
}
