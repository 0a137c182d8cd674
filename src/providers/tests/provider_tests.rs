// src/providers/tests/provider_tests.rs

use std::sync::Arc;

use bytes::Bytes;

use crate::core::tests::fakes::FakePlatform;
use crate::error::GenerationError;
use crate::providers::{ClientRegistry, GeneratedImage};

#[test]
fn test_generated_image_parse() {
    assert_eq!(
        GeneratedImage::parse("\"https://img.example/a.png\"").unwrap(),
        GeneratedImage::Url("https://img.example/a.png".to_string())
    );
    assert_eq!(
        GeneratedImage::parse("data:image/png;base64,aGVsbG8=").unwrap(),
        GeneratedImage::Data(Bytes::from_static(b"hello"))
    );
    assert_eq!(
        GeneratedImage::parse("aGVsbG8=").unwrap(),
        GeneratedImage::Data(Bytes::from_static(b"hello"))
    );
}

#[test]
fn test_generated_image_parse_rejects_garbage() {
    assert!(matches!(
        GeneratedImage::parse("data:image/png,plain"),
        Err(GenerationError::InvalidImageData(_))
    ));
    assert!(matches!(
        GeneratedImage::parse("not base64 !!"),
        Err(GenerationError::InvalidImageData(_))
    ));
    assert!(matches!(
        GeneratedImage::parse("  "),
        Err(GenerationError::InvalidImageData(_))
    ));
}

#[tokio::test]
async fn test_registry_returns_one_handle_per_account() {
    let mut registry = ClientRegistry::new();
    let first = registry.register("agentbot", Arc::new(FakePlatform::default()));
    let second = registry.register("agentbot", Arc::new(FakePlatform::default()));

    assert!(Arc::ptr_eq(&first, &second));
    assert!(registry.get("agentbot").is_some());
    assert!(registry.get("someone-else").is_none());
}
