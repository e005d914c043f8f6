use std::path::Path;

use aws_sdk_s3::config::{Credentials, Region};
use testcontainers_modules::{minio::MinIO, testcontainers::runners::AsyncRunner};

use s3::S3Client;

async fn client_against(endpoint: &str) -> S3Client {
    let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .endpoint_url(endpoint)
        .region(Region::new("us-east-1"))
        .credentials_provider(Credentials::new("minioadmin", "minioadmin", None, None, "test"))
        .load()
        .await;

    let raw = aws_sdk_s3::Client::from_conf(
        aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build(),
    );
    raw.create_bucket().bucket("jobs").send().await.unwrap();
    S3Client::new(raw, "jobs")
}

#[tokio::test]
async fn round_trips_bytes_and_honors_prefix_delete() {
    let container = MinIO::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(9000).await.unwrap();
    let endpoint = format!("http://127.0.0.1:{port}");

    let client = client_against(&endpoint).await;

    client
        .upload_bytes(b"hello".to_vec(), "clean/job-1/audio.wav")
        .await
        .unwrap();

    let files = client.list_files("clean/job-1/").await.unwrap();
    assert_eq!(files, vec!["clean/job-1/audio.wav".to_string()]);

    let text = client.read_text("clean/job-1/audio.wav").await.unwrap();
    assert_eq!(text.as_deref(), Some("hello"));

    assert!(client.read_text("clean/job-1/missing.wav").await.unwrap().is_none());

    client.delete_folder("clean/job-1/").await.unwrap();
    assert!(client.list_files("clean/job-1/").await.unwrap().is_empty());
}

#[tokio::test]
async fn presigned_url_targets_requested_key() {
    let container = MinIO::default().start().await.unwrap();
    let port = container.get_host_port_ipv4(9000).await.unwrap();
    let endpoint = format!("http://127.0.0.1:{port}");

    let client = client_against(&endpoint).await;
    let url = client
        .generate_presigned_url("raw/2026-01-01/job-2/input.wav", "audio/wav")
        .await
        .unwrap();

    assert!(url.contains("raw/2026-01-01/job-2/input.wav"));
    let _ = Path::new(&url);
}
