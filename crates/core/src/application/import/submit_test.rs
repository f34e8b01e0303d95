//! Unit tests for submit validation and the submit use case

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::application::registry::RetentionPolicy;
    use crate::domain::{JobStatus, ProgressUpdate};
    use crate::error::AppError;
    use crate::port::id_provider::mocks::SequentialIdProvider;
    use crate::port::job_queue::mocks::InMemoryJobQueue;
    use crate::port::QueueError;
    use crate::port::time_provider::mocks::ManualTimeProvider;
    use std::time::Duration;

    fn service() -> (ImportService, Arc<JobRegistry>, Arc<InMemoryJobQueue>) {
        let registry = Arc::new(JobRegistry::new(
            Arc::new(SequentialIdProvider::default()),
            Arc::new(ManualTimeProvider::new(1_000)),
            RetentionPolicy::default(),
        ));
        let queue = Arc::new(InMemoryJobQueue::new());
        let service = ImportService::new(registry.clone(), queue.clone());
        (service, registry, queue)
    }

    #[test]
    fn test_validate_empty_url() {
        let result = validate_request(&ImportRequest::new("   "));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("empty"));
    }

    #[test]
    fn test_validate_url_too_long() {
        let url = format!("https://example.com/{}", "a".repeat(MAX_PLAYLIST_URL_LEN));
        let result = validate_request(&ImportRequest::new(url));
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("too long"));
    }

    #[test]
    fn test_validate_scheme() {
        for bad in ["ftp://example.com/list", "example.com/list", "javascript:alert(1)"] {
            let result = validate_request(&ImportRequest::new(bad));
            assert!(
                result.unwrap_err().to_string().contains("http or https"),
                "{}",
                bad
            );
        }
        assert!(validate_request(&ImportRequest::new("https://")).is_err());
    }

    #[test]
    fn test_validate_accepts_http_and_https() {
        let youtube = ImportRequest::new("https://www.youtube.com/playlist?list=PL1");
        assert!(validate_request(&youtube).is_ok());
        assert!(validate_request(&ImportRequest::new("HTTP://example.com/p")).is_ok());
    }

    #[tokio::test]
    async fn test_submit_creates_queued_job_and_enqueues() {
        let (service, registry, queue) = service();

        let job = service
            .submit(ImportRequest::new("  https://example.com/p  "))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, ProgressUpdate::default());
        assert_eq!(registry.len(), 1);
        assert_eq!(queue.pending_len(), 1);

        let delivery = queue.dequeue(Duration::from_millis(10)).await.unwrap().unwrap();
        assert_eq!(delivery.message.job_id, job.id);
        assert_eq!(delivery.message.payload.playlist_url, "https://example.com/p");
    }

    #[tokio::test]
    async fn test_submit_invalid_request_creates_nothing() {
        let (service, registry, queue) = service();

        let err = service.submit(ImportRequest::new("")).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(registry.is_empty());
        assert_eq!(queue.pending_len(), 0);
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue_fails_job() {
        let (service, registry, queue) = service();
        queue.close().await.unwrap();

        let err = service
            .submit(ImportRequest::new("https://example.com/p"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Queue(QueueError::Closed)));

        let job = registry.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().contains("closed"));
    }

    #[tokio::test]
    async fn test_submit_broker_failure_fails_job() {
        let (service, registry, queue) = service();
        queue.set_fail_enqueue(true);

        let err = service
            .submit(ImportRequest::new("https://example.com/p"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Queue(QueueError::Broker(_))));

        let job = registry.get("job-1").unwrap();
        assert_eq!(job.status, JobStatus::Error);
        assert!(job.error.unwrap().starts_with("Failed to enqueue job"));
        assert_eq!(queue.pending_len(), 0);

        // The queue recovering does not resurrect the failed job
        queue.set_fail_enqueue(false);
        let next = service
            .submit(ImportRequest::new("https://example.com/p"))
            .await
            .unwrap();
        assert_eq!(next.id, "job-2");
        assert_eq!(registry.get("job-1").unwrap().status, JobStatus::Error);
    }

    #[tokio::test]
    async fn test_status_distinguishes_absent() {
        let (service, _, _) = service();
        assert!(service.status("missing").is_none());

        let job = service
            .submit(ImportRequest::new("https://example.com/p"))
            .await
            .unwrap();
        assert_eq!(service.status(&job.id).unwrap().status, JobStatus::Queued);
    }
}
