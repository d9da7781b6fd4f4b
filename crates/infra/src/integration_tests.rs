//! End-to-end tests of the worker pipeline with in-memory adapters.
//!
//! Tests: queue -> QueueConsumer -> RequestLifecycle -> store / job queue / mailer
//!
//! Verifies:
//! - An upload notification starts the conversion and enqueues exactly one job
//! - A conversion result finishes the request and mails the owner once
//! - Malformed and unmatched messages are acknowledged without side effects
//! - Both consumers run side by side on one shared lifecycle

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use frameshot_core::RequestId;
    use frameshot_events::{ConversionJob, EventMessage};
    use frameshot_requests::{Request, RequestStatus, Upload};

    use crate::dispatch::{OutboundDispatcher, RecordingMailer};
    use crate::lifecycle::{CreateRequest, RequestLifecycle};
    use crate::queue::{InMemoryQueue, MessageQueue};
    use crate::storage::InMemoryObjectStorage;
    use crate::store::InMemoryRequestStore;
    use crate::workers::{ConsumerConfig, ConsumerHandle, ConsumerStats, QueueConsumer};

    struct Pipeline {
        store: Arc<InMemoryRequestStore>,
        mailer: Arc<RecordingMailer>,
        uploads: Arc<InMemoryQueue>,
        outputs: Arc<InMemoryQueue>,
        jobs: Arc<InMemoryQueue>,
        lifecycle: RequestLifecycle,
    }

    fn pipeline() -> Pipeline {
        let store = InMemoryRequestStore::arc();
        let mailer = Arc::new(RecordingMailer::new());
        let jobs = InMemoryQueue::arc("conversion-jobs");
        let dispatcher = Arc::new(OutboundDispatcher::new(jobs.clone(), mailer.clone()));
        let storage = Arc::new(
            InMemoryObjectStorage::new().with_base_url("https://frameshot.s3.us-east-1.amazonaws.com"),
        );
        let lifecycle = RequestLifecycle::new(store.clone(), dispatcher, storage);

        Pipeline {
            store,
            mailer,
            uploads: InMemoryQueue::arc("uploads"),
            outputs: InMemoryQueue::arc("conversion-output"),
            jobs,
            lifecycle,
        }
    }

    fn config(name: &str) -> ConsumerConfig {
        ConsumerConfig::default()
            .with_name(name)
            .with_wait_time(Duration::from_millis(10))
            .with_retry_delay(Duration::from_millis(10))
    }

    fn start(p: &Pipeline) -> (ConsumerHandle, ConsumerHandle) {
        let lifecycle = p.lifecycle.clone();
        let uploads = QueueConsumer::new(
            p.uploads.clone(),
            move |message: EventMessage| {
                let lifecycle = lifecycle.clone();
                async move { lifecycle.handle_upload_notification(&message).await }
            },
            config("uploads"),
        )
        .spawn();

        let lifecycle = p.lifecycle.clone();
        let outputs = QueueConsumer::new(
            p.outputs.clone(),
            move |message: EventMessage| {
                let lifecycle = lifecycle.clone();
                async move { lifecycle.handle_conversion_output(&message).await }
            },
            config("conversion-output"),
        )
        .spawn();

        (uploads, outputs)
    }

    async fn wait_for(handle: &ConsumerHandle, done: impl Fn(&ConsumerStats) -> bool) {
        for _ in 0..300 {
            if done(&handle.stats()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("{} never reached the expected state: {:?}", handle.name(), handle.stats());
    }

    async fn create(p: &Pipeline, user: &str) -> Request {
        p.lifecycle
            .create_at(
                CreateRequest {
                    user_id: user.to_string(),
                    user_email: format!("{user}@example.com"),
                    upload: Upload::new("holiday.mp4", 10 * 1024 * 1000),
                    content: Vec::new(),
                },
                Utc.with_ymd_and_hms(2025, 1, 23, 20, 38, 8).unwrap(),
            )
            .await
            .unwrap()
    }

    fn upload_notification(key: &str) -> String {
        format!(
            r#"{{"Records":[{{"s3":{{"configurationId":"VideoUploaded","bucket":{{"name":"frameshot"}},"object":{{"key":"{key}","size":10240000}}}}}}]}}"#
        )
    }

    #[tokio::test]
    async fn upload_then_successful_conversion() {
        let p = pipeline();
        let request = create(&p, "u1").await;
        let (uploads, outputs) = start(&p);

        p.uploads.send(&upload_notification(&request.video_key)).await.unwrap();
        wait_for(&uploads, |s| s.messages_deleted == 1).await;

        assert_eq!(p.store.snapshot(request.id).unwrap().status, RequestStatus::InProgress);
        let job_bodies = p.jobs.ready_bodies();
        assert_eq!(job_bodies.len(), 1);
        let job: ConversionJob = serde_json::from_str(&job_bodies[0]).unwrap();
        assert_eq!(job.id, request.id);
        assert_eq!(job.s3_file_key, request.video_key);
        assert_eq!(job.id_user, "u1");

        let output = format!(
            r#"{{"id":{},"id_user":"u1","status":"OK","s3_zip_file_key":"videos_output/{}.zip","creation_date":"2025-01-23T20:38:08.792075","finished_date":"2025-01-23T20:40:00.000000"}}"#,
            request.id, request.id
        );
        p.outputs.send(&output).await.unwrap();
        wait_for(&outputs, |s| s.messages_deleted == 1).await;

        let finished = p.store.snapshot(request.id).unwrap();
        assert_eq!(finished.status, RequestStatus::Completed);
        assert!(finished.finished_at.is_some());
        assert_eq!(
            finished.zip_output_key.as_deref(),
            Some(format!("https://frameshot.s3.us-east-1.amazonaws.com/videos_output/{}.zip", request.id).as_str())
        );
        assert_eq!(p.mailer.sent(), vec![(request.id, "sucesso".to_string())]);

        uploads.shutdown().await;
        outputs.shutdown().await;
    }

    #[tokio::test]
    async fn failed_conversion_mails_error() {
        let p = pipeline();
        let request = create(&p, "u1").await;
        let (uploads, outputs) = start(&p);

        p.uploads.send(&upload_notification(&request.video_key)).await.unwrap();
        wait_for(&uploads, |s| s.messages_deleted == 1).await;
        p.outputs
            .send(&format!(r#"{{"id":{},"status":"ERROR"}}"#, request.id))
            .await
            .unwrap();
        wait_for(&outputs, |s| s.messages_deleted == 1).await;

        let finished = p.store.snapshot(request.id).unwrap();
        assert_eq!(finished.status, RequestStatus::Failed);
        assert!(finished.zip_output_key.is_none());
        assert_eq!(p.mailer.sent(), vec![(request.id, "erro".to_string())]);

        uploads.shutdown().await;
        outputs.shutdown().await;
    }

    #[tokio::test]
    async fn malformed_and_unmatched_messages_are_acknowledged_silently() {
        let p = pipeline();
        let request = create(&p, "u1").await;
        let baseline = p.store.stats();
        let (uploads, outputs) = start(&p);

        p.uploads.send("{not json").await.unwrap();
        p.uploads.send(&upload_notification("videos_input/nobody.mp4")).await.unwrap();
        p.outputs.send("[1,2,3]").await.unwrap();
        p.outputs.send(r#"{"id":999,"status":"OK"}"#).await.unwrap();

        wait_for(&uploads, |s| s.messages_deleted == 2).await;
        wait_for(&outputs, |s| s.messages_deleted == 2).await;

        assert_eq!(p.store.stats().writes, baseline.writes);
        assert_eq!(p.store.snapshot(request.id).unwrap().status, RequestStatus::Pending);
        assert_eq!(p.jobs.ready_len(), 0);
        assert!(p.mailer.sent().is_empty());
        assert_eq!(p.uploads.in_flight_len(), 0);
        assert_eq!(p.outputs.in_flight_len(), 0);

        uploads.shutdown().await;
        outputs.shutdown().await;
    }

    #[tokio::test]
    async fn consumer_recovers_after_receive_outage() {
        let p = pipeline();
        let request = create(&p, "u1").await;
        p.uploads.fail_next_receives(2);
        p.uploads.send(&upload_notification(&request.video_key)).await.unwrap();

        let (uploads, outputs) = start(&p);
        wait_for(&uploads, |s| s.messages_deleted == 1).await;

        assert_eq!(uploads.stats().receive_errors, 2);
        assert_eq!(p.store.snapshot(request.id).unwrap().status, RequestStatus::InProgress);

        uploads.shutdown().await;
        outputs.shutdown().await;
    }

    #[tokio::test]
    async fn redelivered_upload_is_applied_twice() {
        let p = pipeline();
        let request = create(&p, "u1").await;
        let body = upload_notification(&request.video_key);
        let (uploads, outputs) = start(&p);

        p.uploads.send(&body).await.unwrap();
        p.uploads.send(&body).await.unwrap();
        wait_for(&uploads, |s| s.messages_deleted == 2).await;

        assert_eq!(p.jobs.ready_len(), 2);

        uploads.shutdown().await;
        outputs.shutdown().await;
    }

    #[tokio::test]
    async fn requests_of_different_users_progress_independently() {
        let p = pipeline();
        let first = create(&p, "alice").await;
        let second = create(&p, "bob").await;
        let (uploads, outputs) = start(&p);

        p.uploads.send(&upload_notification(&second.video_key)).await.unwrap();
        wait_for(&uploads, |s| s.messages_deleted == 1).await;

        assert_eq!(p.store.snapshot(first.id).unwrap().status, RequestStatus::Pending);
        assert_eq!(p.store.snapshot(second.id).unwrap().status, RequestStatus::InProgress);
        assert_eq!(p.lifecycle.list("alice").await.unwrap(), vec![first]);
        assert!(p.lifecycle.get(RequestId::new(99)).await.is_err());

        uploads.shutdown().await;
        outputs.shutdown().await;
    }
}
