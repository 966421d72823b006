//! S3 client integration tests
//!
//! Runs the S3 client and the store adapter against a wiremock S3 endpoint.
//!
//! ## Test Coverage
//!
//! - Requests are path-style and SigV4 signed
//! - Multipart create / upload part / complete / abort wire formats
//! - Error documents, including errors embedded in a 200 response
//! - `EntityTooSmall` surfaces as `StoreError::TooSmall`
//! - Request timeout surfaces as an ordinary store error
//! - A full session through the real adapter

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use std::sync::Arc;
    use std::time::Duration;
    use stream_uploadr::s3::{
        Credentials, S3Client, S3ClientConfig, S3ClientError, S3CompletedPart,
    };
    use stream_uploadr::upload::{
        CompletedPart, ObjectStore, S3ObjectStore, SessionState, StoreError, UploadSession,
    };
    use wiremock::matchers::{
        body_string, body_string_contains, header, header_exists, method, path, query_param,
    };
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const KEY: &str = "audio/take-1.wav";
    const OBJECT_PATH: &str = "/test-bucket/audio/take-1.wav";

    /// Helper function to create an S3 client pointing to a mock server
    fn create_test_s3_client(mock_server: &MockServer, timeout: Option<Duration>) -> S3Client {
        S3Client::new(S3ClientConfig {
            bucket: "test-bucket".to_string(),
            region: "us-east-1".to_string(),
            endpoint: Some(mock_server.uri()),
            credentials: Credentials::new("test-access", "test-secret"),
            timeout,
        })
        .unwrap()
    }

    fn initiate_response(upload_id: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_string(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <InitiateMultipartUploadResult>
                <Bucket>test-bucket</Bucket>
                <Key>{}</Key>
                <UploadId>{}</UploadId>
            </InitiateMultipartUploadResult>"#,
            KEY, upload_id
        ))
    }

    fn error_response(status: u16, code: &str, message: &str) -> ResponseTemplate {
        ResponseTemplate::new(status).set_body_string(format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
            <Error><Code>{}</Code><Message>{}</Message><RequestId>4442587FB7D0A2F9</RequestId></Error>"#,
            code, message
        ))
    }

    // ========================================================================
    // Client wire format
    // ========================================================================

    #[tokio::test]
    async fn test_create_multipart_upload_returns_upload_id() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploads", ""))
            .and(header_exists("authorization"))
            .and(header_exists("x-amz-date"))
            .and(header_exists("x-amz-content-sha256"))
            .respond_with(initiate_response("upload-abc"))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let response = client.create_multipart_upload(KEY).await.unwrap();

        assert_eq!(response.upload_id, "upload-abc");
    }

    #[tokio::test]
    async fn test_upload_part_returns_etag() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(query_param("partNumber", "3"))
            .and(query_param("uploadId", "upload-abc"))
            .and(body_string("part-bytes"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"etag-3\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let response = client
            .upload_part(KEY, "upload-abc", 3, Bytes::from_static(b"part-bytes"))
            .await
            .unwrap();

        assert_eq!(response.etag, "\"etag-3\"");
    }

    #[tokio::test]
    async fn test_upload_part_without_etag_is_an_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .respond_with(ResponseTemplate::new(200))
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let err = client
            .upload_part(KEY, "upload-abc", 1, Bytes::from_static(b"x"))
            .await
            .unwrap_err();

        assert!(matches!(err, S3ClientError::ResponseError(_)));
    }

    #[tokio::test]
    async fn test_complete_sends_part_list() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-abc"))
            .and(body_string_contains("<PartNumber>1</PartNumber>"))
            .and(body_string_contains("<PartNumber>2</PartNumber>"))
            .and(body_string_contains("etag-2"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<?xml version="1.0" encoding="UTF-8"?>
                <CompleteMultipartUploadResult>
                    <Location>http://localhost/test-bucket/audio/take-1.wav</Location>
                    <Bucket>test-bucket</Bucket>
                    <Key>audio/take-1.wav</Key>
                    <ETag>"final-etag-2"</ETag>
                </CompleteMultipartUploadResult>"#,
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let parts = vec![
            S3CompletedPart {
                part_number: 1,
                etag: "\"etag-1\"".into(),
            },
            S3CompletedPart {
                part_number: 2,
                etag: "\"etag-2\"".into(),
            },
        ];
        let response = client
            .complete_multipart_upload(KEY, "upload-abc", &parts)
            .await
            .unwrap();

        assert_eq!(response.etag, "\"final-etag-2\"");
    }

    #[tokio::test]
    async fn test_complete_detects_error_in_200_body() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-abc"))
            .respond_with(error_response(200, "InternalError", "We encountered an internal error"))
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let err = client
            .complete_multipart_upload(KEY, "upload-abc", &[])
            .await
            .unwrap_err();

        assert_eq!(err.code(), Some("InternalError"));
    }

    #[tokio::test]
    async fn test_abort_multipart_upload() {
        let mock_server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-abc"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        client.abort_multipart_upload(KEY, "upload-abc").await.unwrap();
    }

    #[tokio::test]
    async fn test_put_object_sends_content_type() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(header("content-type", "audio/wav"))
            .and(body_string("0123456789"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"whole\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let response = client
            .put_object(KEY, Bytes::from_static(b"0123456789"), Some("audio/wav"))
            .await
            .unwrap();

        assert_eq!(response.etag, "\"whole\"");
    }

    #[tokio::test]
    async fn test_service_error_is_parsed() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .respond_with(error_response(403, "AccessDenied", "Access Denied"))
            .mount(&mock_server)
            .await;

        let client = create_test_s3_client(&mock_server, None);
        let err = client.create_multipart_upload(KEY).await.unwrap_err();

        match err {
            S3ClientError::ServiceError {
                status,
                code,
                message,
            } => {
                assert_eq!(status, 403);
                assert_eq!(code, "AccessDenied");
                assert_eq!(message, "Access Denied");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    // ========================================================================
    // Store adapter
    // ========================================================================

    #[tokio::test]
    async fn test_entity_too_small_maps_to_too_small() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-abc"))
            .respond_with(error_response(
                400,
                "EntityTooSmall",
                "Your proposed upload is smaller than the minimum allowed object size.",
            ))
            .mount(&mock_server)
            .await;

        let store = S3ObjectStore::new(create_test_s3_client(&mock_server, None));
        let parts = [CompletedPart {
            part_number: 1,
            etag: "\"etag-1\"".into(),
        }];
        let err = store
            .complete_upload("upload-abc", KEY, &parts)
            .await
            .unwrap_err();

        assert!(err.is_too_small());
    }

    #[tokio::test]
    async fn test_timeout_is_an_ordinary_store_error() {
        let mock_server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("ETag", "\"late\"")
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let store = S3ObjectStore::new(create_test_s3_client(
            &mock_server,
            Some(Duration::from_millis(200)),
        ));
        let err = store
            .upload_part("upload-abc", KEY, 1, Bytes::from_static(b"slow"))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Other(_)));
    }

    #[tokio::test]
    async fn test_small_stream_through_real_adapter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploads", ""))
            .respond_with(initiate_response("upload-xyz"))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("DELETE"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-xyz"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(body_string("0123456789"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"whole\""))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = Arc::new(
            S3ObjectStore::new(create_test_s3_client(&mock_server, None))
                .with_content_type("audio/wav"),
        );
        let mut session = UploadSession::new(store, KEY, 5 * 1024 * 1024);
        session.start().await.unwrap();
        session.ingest(Bytes::from_static(b"01234")).await.unwrap();
        session.ingest(Bytes::from_static(b"56789")).await.unwrap();
        let report = session.finalize().await;

        assert_eq!(report.state, SessionState::FallbackCompleted);
        assert_eq!(report.bytes_received, 10);
    }

    #[tokio::test]
    async fn test_multipart_stream_through_real_adapter() {
        let mock_server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploads", ""))
            .respond_with(initiate_response("upload-mp"))
            .expect(1)
            .mount(&mock_server)
            .await;

        Mock::given(method("PUT"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-mp"))
            .respond_with(ResponseTemplate::new(200).insert_header("ETag", "\"part\""))
            .expect(2)
            .mount(&mock_server)
            .await;

        Mock::given(method("POST"))
            .and(path(OBJECT_PATH))
            .and(query_param("uploadId", "upload-mp"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                "<CompleteMultipartUploadResult><ETag>\"done\"</ETag></CompleteMultipartUploadResult>",
            ))
            .expect(1)
            .mount(&mock_server)
            .await;

        let store = Arc::new(S3ObjectStore::new(create_test_s3_client(&mock_server, None)));
        let mut session = UploadSession::new(store, KEY, 8);
        session.start().await.unwrap();
        session
            .ingest(Bytes::from_static(b"0123456789abc"))
            .await
            .unwrap();
        let report = session.finalize().await;

        assert_eq!(report.state, SessionState::Completed);
        assert_eq!(report.parts, 2);
    }
}
