use auris_tools::{app_state::AppState, config::AwsConfig, models::item::Value, util};
use serde_json::json;

fn required_env(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} must be set for this test"))
}

/// Integration test: storage, database and OCR against a live account
///
/// Requires AWS credentials plus:
/// - `AURIS_TEST_BUCKET`: writable bucket
/// - `AURIS_TEST_TABLE`: table with a string partition key named `id`
/// - `AURIS_TEST_DOCUMENT`: key of a scanned document in the bucket
///
/// Set `AWS_ENDPOINT_URL` to run storage and database against LocalStack.
#[tokio::test]
#[ignore] // Run with: cargo test --test aws_integration -- --ignored
async fn test_live_aws_round_trip() {
    dotenvy::dotenv().ok();
    let bucket = required_env("AURIS_TEST_BUCKET");
    let table = required_env("AURIS_TEST_TABLE");

    let config = AwsConfig::from_env().expect("Failed to load AWS config");
    let state = AppState::from_config(&config, &table)
        .await
        .expect("Failed to initialize clients");

    // 1. Storage
    let key = format!("auris-test/{}.txt", util::generate_uuid());
    assert!(state.storage.upload_bytes(b"hello from auris", &bucket, &key).await);
    assert!(state.storage.check_file_exists(&bucket, &key).await);
    assert_eq!(state.storage.check_file_size(&bucket, &key).await, Some(16));
    assert!(state
        .storage
        .list_files(&bucket, Some("auris-test/"))
        .await
        .contains(&key));
    assert!(state.storage.delete_file(&bucket, &key).await);
    assert!(!state.storage.check_file_exists(&bucket, &key).await);

    // 2. Database
    let id = util::generate_uuid();
    state
        .database
        .insert_item(
            &table,
            json!({
                "id": id,
                "created_at": util::collect_timestamp(),
                "score": 0.75,
                "nested": {"flags": [true, false], "note": null}
            }),
        )
        .await
        .expect("Insert failed");

    let item = state
        .database
        .get_item(&table, json!({"id": id}))
        .await
        .expect("Get failed")
        .expect("Item missing after insert");
    assert_eq!(item["id"], Value::from(id.as_str()));

    assert!(state.database.delete_item(&table, json!({"id": id})).await);
    assert!(state
        .database
        .get_item(&table, json!({"id": id}))
        .await
        .expect("Get failed")
        .is_none());
}

#[tokio::test]
#[ignore] // Run with: cargo test --test aws_integration -- --ignored
async fn test_live_text_detection() {
    dotenvy::dotenv().ok();
    let bucket = required_env("AURIS_TEST_BUCKET");
    let document = required_env("AURIS_TEST_DOCUMENT");

    let config = AwsConfig::from_env().expect("Failed to load AWS config");
    let state = AppState::from_config(&config, "unused")
        .await
        .expect("Failed to initialize clients");

    let job = state.ocr.submit(&bucket, &document).await.expect("Submit failed");
    assert!(!job.job_id.is_empty());

    let status = state
        .ocr
        .await_completion(&job.job_id)
        .await
        .expect("Polling failed");
    assert!(status.is_terminal());

    let pages = state
        .ocr
        .fetch_all_results(&job.job_id)
        .await
        .expect("Fetching results failed");
    assert!(!pages.is_empty());
    assert!(!auris_tools::services::ocr::full_text(&pages).is_empty());
}
