use super::*;

#[test]
fn parse_image_reference() {
    assert!(ImageReference::parse("app").is_ok());
    assert!(ImageReference::parse("app/").is_err());
    assert!(ImageReference::parse("/app").is_err());
    assert!(ImageReference::parse("").is_err());
    assert!(ImageReference::parse(" app").is_err());
    assert!(ImageReference::parse("team/app:").is_err());
    assert!(ImageReference::parse("team//app").is_err());
    assert!(ImageReference::parse("quay.io:/team/app").is_err());

    let r = ImageReference::parse("app").unwrap();
    assert_eq!(r.registry(), None);
    assert_eq!(r.namespace(), None);
    assert_eq!(r.name(), "app");

    let r = ImageReference::parse("team/app:latest").unwrap();
    assert_eq!(r.registry(), None);
    assert_eq!(r.namespace(), Some("team"));
    assert_eq!(r.name(), "app");
    assert_eq!(r.tag(), Some("latest"));

    let r = ImageReference::parse("localhost/team/app").unwrap();
    assert_eq!(r.registry(), Some("localhost"));
    assert_eq!(r.namespace(), Some("team"));

    let r = ImageReference::parse(
        "registry.svc:5000/team/app@sha256:00112233445566778899aabbccddeeff",
    )
    .unwrap();
    assert_eq!(r.registry(), Some("registry.svc:5000"));
    assert_eq!(r.namespace(), Some("team"));
    assert_eq!(r.name(), "app");
    assert_eq!(r.tag(), None);
    assert_eq!(
        r.digest().map(|d| d.as_str()),
        Some("sha256:00112233445566778899aabbccddeeff")
    );

    let r = ImageReference::parse("docker.io/library/deep/path/app:1.0").unwrap();
    assert_eq!(r.namespace(), Some("library"));
    assert_eq!(r.name(), "deep/path/app");
}

#[test]
fn image_reference_as_repository() {
    let r = ImageReference::parse(
        "quay.io/team/app:v2@sha256:00112233445566778899aabbccddeeff",
    )
    .unwrap();
    let repo = r.as_repository();
    assert_eq!(repo.as_str(), "quay.io/team/app");
    assert_eq!(repo.tag(), None);
    assert_eq!(repo.digest(), None);
    assert_eq!(repo.namespace(), Some("team"));
}

#[test]
fn image_reference_from_parts() {
    let digest = ContentDigest::parse("sha256:00112233445566778899aabbccddeeff").unwrap();
    let r = ImageReference::from_parts(Some("quay.io"), Some("team"), "app", None, Some(&digest))
        .unwrap();
    assert_eq!(
        r.as_str(),
        "quay.io/team/app@sha256:00112233445566778899aabbccddeeff"
    );
    assert!(ImageReference::from_parts(None, Some("quay.io"), "app", None, None).is_err());
    assert!(ImageReference::from_parts(Some("quay.io"), None, "App", None, None).is_err());
}

#[test]
fn parse_content_digest() {
    assert!(ContentDigest::parse("sha256").is_err());
    assert!(ContentDigest::parse("sha256:0123456789abcdef0123456789abcdef").is_ok());
    assert!(ContentDigest::parse("-sha256:0123456789abcdef0123456789abcdef").is_err());
    assert!(ContentDigest::parse("sha256:0123456789abcdef0123456789abcde").is_err());
    assert!(ContentDigest::parse("sha256:0123456789abcdef0123456789abcdeg").is_err());
    assert!(ContentDigest::parse("sha256:0123456789ABCDEF0123456789abcdef").is_err());
    assert!(ContentDigest::parse("tarsum.v1+sha256:0123456789abcdef0123456789abcdef").is_ok());
    assert!(ContentDigest::parse("9:0123456789abcdef0123456789abcdef").is_err());
    assert!(ContentDigest::parse(" sha256:0123456789abcdef0123456789abcdef").is_err());

    let d = ContentDigest::parse("tarsum.v1+sha256:0123456789abcdef0123456789abcdef").unwrap();
    assert_eq!(d.algorithm(), "tarsum.v1+sha256");
    assert_eq!(d.hex(), "0123456789abcdef0123456789abcdef");
}

#[test]
fn content_digest_from_content() {
    let d = ContentDigest::from_content(b"cat");
    assert_eq!(d.algorithm(), "sha256");
    assert_eq!(ContentDigest::parse(d.as_str()).unwrap(), d);
}
