use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    storage::{
        registry::TaskRegistry,
        types::ingestion_task::{
            IngestionTask, MediaKind, NewTask, ReplaceOutcome, StageKind, TaskStatus,
        },
    },
};
use futures::{
    channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender},
    stream::BoxStream,
    StreamExt,
};
use serde_json::json;
use tokio::{
    sync::{Mutex, Notify},
    time::{sleep, timeout},
};

use super::{
    config::{IngestionConfig, IngestionTuning},
    services::{
        ConflictPolicy, ContentCache, IngestionServices, PipelineApi, SourceFile,
        StorageUploader, UpdateChannel,
    },
    IngestionOrchestrator, LOST_CONNECTION_MESSAGE, MISSING_REFERENCE_MESSAGE,
    STREAM_ERROR_MESSAGE,
};
use crate::types::{
    backend::{
        BeginIndexingRequest, IndexingVariant, PipelineAccepted, ProcessDocumentRequest,
        ProcessMultimediaRequest, ProcessUrlRequest,
    },
    status_event::StatusEvent,
};

const PROCESSING_JOB: &str = "J1";
const INDEXING_JOB: &str = "J2";
const WAIT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct MockApi {
    fail_processing: bool,
    fail_indexing: bool,
    fail_delete: bool,
    indexing_gate: Option<Arc<Notify>>,
    calls: Mutex<Vec<&'static str>>,
    indexing_variants: Mutex<Vec<IndexingVariant>>,
}

impl MockApi {
    async fn record(&self, call: &'static str) {
        self.calls.lock().await.push(call);
    }

    async fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    fn accepted(job_id: &str) -> PipelineAccepted {
        PipelineAccepted {
            task_identifier: job_id.to_string(),
            reference_id: None,
            message: None,
        }
    }

    fn processing_result(&self) -> Result<PipelineAccepted, AppError> {
        if self.fail_processing {
            Err(AppError::Api {
                status: 500,
                body: "processing unavailable".into(),
            })
        } else {
            Ok(Self::accepted(PROCESSING_JOB))
        }
    }
}

#[async_trait]
impl PipelineApi for MockApi {
    async fn process_document(
        &self,
        _request: ProcessDocumentRequest,
    ) -> Result<PipelineAccepted, AppError> {
        self.record("process_document").await;
        self.processing_result()
    }

    async fn process_url(&self, _request: ProcessUrlRequest) -> Result<PipelineAccepted, AppError> {
        self.record("process_url").await;
        self.processing_result()
    }

    async fn process_multimedia(
        &self,
        request: ProcessMultimediaRequest,
    ) -> Result<PipelineAccepted, AppError> {
        self.record("process_multimedia").await;
        assert_eq!(request.media_type, "video");
        self.processing_result()
    }

    async fn begin_indexing(
        &self,
        _request: BeginIndexingRequest,
        variant: IndexingVariant,
    ) -> Result<PipelineAccepted, AppError> {
        self.record("begin_indexing").await;
        self.indexing_variants.lock().await.push(variant);
        if let Some(gate) = &self.indexing_gate {
            gate.notified().await;
        }
        if self.fail_indexing {
            Err(AppError::Api {
                status: 503,
                body: "indexer offline".into(),
            })
        } else {
            Ok(Self::accepted(INDEXING_JOB))
        }
    }

    async fn delete_content_source(
        &self,
        _chatbot_id: &str,
        _source_id: &str,
    ) -> Result<(), AppError> {
        self.record("delete_content_source").await;
        if self.fail_delete {
            Err(AppError::Api {
                status: 404,
                body: "source not found".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[derive(Default)]
struct MockUploader {
    fail: bool,
    uploads: Mutex<Vec<String>>,
}

#[async_trait]
impl StorageUploader for MockUploader {
    async fn upload(
        &self,
        chatbot_id: &str,
        file: &SourceFile,
        _policy: &ConflictPolicy,
    ) -> Result<String, AppError> {
        if self.fail {
            return Err(AppError::InternalError("quota exceeded".into()));
        }
        let path = format!("{chatbot_id}/{}", file.name);
        self.uploads.lock().await.push(path.clone());
        Ok(path)
    }
}

type EventSender = UnboundedSender<Result<StatusEvent, AppError>>;
type EventReceiver = UnboundedReceiver<Result<StatusEvent, AppError>>;

/// Per-job event queues, created on first use so events can be emitted before subscribing.
#[derive(Default)]
struct MockChannel {
    jobs: std::sync::Mutex<HashMap<String, (Option<EventSender>, Option<EventReceiver>)>>,
    subscriptions: std::sync::Mutex<Vec<String>>,
}

impl MockChannel {
    fn with_job<R>(
        &self,
        job_id: &str,
        f: impl FnOnce(&mut (Option<EventSender>, Option<EventReceiver>)) -> R,
    ) -> R {
        let mut jobs = self.jobs.lock().expect("jobs lock");
        let entry = jobs.entry(job_id.to_string()).or_insert_with(|| {
            let (sender, receiver) = unbounded();
            (Some(sender), Some(receiver))
        });
        f(entry)
    }

    fn emit(&self, job_id: &str, event: StatusEvent) {
        self.push(job_id, Ok(event));
    }

    fn emit_failure(&self, job_id: &str, err: AppError) {
        self.push(job_id, Err(err));
    }

    fn push(&self, job_id: &str, item: Result<StatusEvent, AppError>) {
        self.with_job(job_id, |(sender, _)| {
            // A closed subscription drops its receiver; late events go nowhere.
            if let Some(sender) = sender {
                let _ = sender.unbounded_send(item);
            }
        });
    }

    /// Ends the job's stream without a terminal event.
    fn finish(&self, job_id: &str) {
        self.with_job(job_id, |(sender, _)| {
            sender.take();
        });
    }

    fn subscriptions(&self) -> Vec<String> {
        self.subscriptions.lock().expect("subscriptions lock").clone()
    }
}

#[async_trait]
impl UpdateChannel for MockChannel {
    async fn subscribe(
        &self,
        job_id: &str,
    ) -> Result<BoxStream<'static, Result<StatusEvent, AppError>>, AppError> {
        self.subscriptions
            .lock()
            .expect("subscriptions lock")
            .push(job_id.to_string());
        let receiver = self
            .with_job(job_id, |(_, receiver)| receiver.take())
            .ok_or_else(|| AppError::Channel(format!("{job_id} already subscribed")))?;
        Ok(receiver.boxed())
    }
}

#[derive(Default)]
struct MockCache {
    invalidations: AtomicUsize,
}

impl ContentCache for MockCache {
    fn invalidate(&self, chatbot_id: &str) {
        assert_eq!(chatbot_id, "bot-1");
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

struct Harness {
    orchestrator: Arc<IngestionOrchestrator>,
    api: Arc<MockApi>,
    uploader: Arc<MockUploader>,
    channel: Arc<MockChannel>,
    cache: Arc<MockCache>,
}

impl Harness {
    fn new(api: MockApi, uploader: MockUploader) -> Self {
        Self::with_tuning(api, uploader, IngestionTuning::default())
    }

    fn with_tuning(api: MockApi, uploader: MockUploader, tuning: IngestionTuning) -> Self {
        let api = Arc::new(api);
        let uploader = Arc::new(uploader);
        let channel = Arc::new(MockChannel::default());
        let cache = Arc::new(MockCache::default());
        let services = IngestionServices {
            uploader: Arc::clone(&uploader) as Arc<dyn StorageUploader>,
            api: Arc::clone(&api) as Arc<dyn PipelineApi>,
            channel: Arc::clone(&channel) as Arc<dyn UpdateChannel>,
            cache: Arc::clone(&cache) as Arc<dyn ContentCache>,
        };
        let config = IngestionConfig {
            chatbot_id: "bot-1".into(),
            user_id: "user-1".into(),
            max_upload_bytes: 1024,
            tuning,
        };
        let orchestrator =
            IngestionOrchestrator::start(Arc::new(TaskRegistry::new()), services, config);

        Self {
            orchestrator,
            api,
            uploader,
            channel,
            cache,
        }
    }

    async fn wait_for(
        &self,
        task_id: &str,
        predicate: impl Fn(&IngestionTask) -> bool,
    ) -> IngestionTask {
        timeout(WAIT, self.orchestrator.wait_for(task_id, predicate))
            .await
            .expect("task reached expected state in time")
            .expect("task still registered")
    }

    async fn wait_status(&self, task_id: &str, status: TaskStatus) -> IngestionTask {
        self.wait_for(task_id, |task| task.status == status).await
    }

    async fn wait_unsubscribed(&self, task_id: &str) {
        timeout(WAIT, async {
            while self.orchestrator.active_subscription(task_id).is_some() {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("subscription closed in time");
    }

    fn invalidations(&self) -> usize {
        self.cache.invalidations.load(Ordering::SeqCst)
    }
}

fn pdf() -> SourceFile {
    SourceFile::new(
        "report.pdf",
        "application/pdf",
        Bytes::from_static(b"%PDF-1.7"),
    )
}

fn event(job_id: &str, status: &str) -> StatusEvent {
    serde_json::from_value(json!({ "task_identifier": job_id, "status": status }))
        .expect("status event")
}

fn progress_event(job_id: &str, status: &str, progress: u8, step: &str) -> StatusEvent {
    serde_json::from_value(json!({
        "task_identifier": job_id,
        "status": status,
        "progress_percentage": progress,
        "current_step_description": step
    }))
    .expect("status event")
}

fn failed_event(job_id: &str, details: &str) -> StatusEvent {
    serde_json::from_value(json!({
        "task_identifier": job_id,
        "status": "FAILED",
        "error_details": details
    }))
    .expect("status event")
}

#[tokio::test]
async fn document_runs_through_every_stage() {
    let h = Harness::new(MockApi::default(), MockUploader::default());

    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");
    assert_eq!(task.status, TaskStatus::ProcessingQueued);
    assert_eq!(task.progress, 0);
    assert_eq!(task.storage_path.as_deref(), Some("bot-1/report.pdf"));
    assert_eq!(task.backend_processing_job_id.as_deref(), Some(PROCESSING_JOB));
    assert!(task.backend_reference_id.is_some());
    assert_eq!(
        h.orchestrator.active_subscription(&task.id),
        Some((PROCESSING_JOB.to_string(), StageKind::Processing))
    );

    h.channel.emit(
        PROCESSING_JOB,
        progress_event(PROCESSING_JOB, "PROCESSING", 40, "Extracting text"),
    );
    let processing = h
        .wait_for(&task.id, |task| {
            task.status == TaskStatus::Processing && task.progress == 40
        })
        .await;
    assert_eq!(processing.stage_message, "Extracting text");

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    let queued = h.wait_status(&task.id, TaskStatus::IndexingQueued).await;
    assert_eq!(queued.progress, 0);
    assert_eq!(queued.backend_indexing_job_id.as_deref(), Some(INDEXING_JOB));
    assert_eq!(h.invalidations(), 1);

    h.channel.emit(
        INDEXING_JOB,
        progress_event(INDEXING_JOB, "PROCESSING", 50, "Embedding chunks"),
    );
    h.wait_status(&task.id, TaskStatus::Indexing).await;

    h.channel.emit(INDEXING_JOB, event(INDEXING_JOB, "COMPLETED"));
    let done = h.wait_status(&task.id, TaskStatus::Completed).await;
    assert_eq!(done.progress, 100);
    assert!(done.error.is_none());
    assert_eq!(h.invalidations(), 2);
    h.wait_unsubscribed(&task.id).await;

    assert_eq!(h.api.calls().await, vec!["process_document", "begin_indexing"]);
    assert_eq!(
        h.channel.subscriptions(),
        vec![PROCESSING_JOB.to_string(), INDEXING_JOB.to_string()]
    );
    assert_eq!(
        *h.api.indexing_variants.lock().await,
        vec![IndexingVariant::Standard]
    );
}

#[tokio::test]
async fn upload_failure_stops_before_the_backend() {
    let uploader = MockUploader {
        fail: true,
        ..Default::default()
    };
    let h = Harness::new(MockApi::default(), uploader);

    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("input is valid");

    assert_eq!(task.status, TaskStatus::UploadFailed);
    assert_eq!(task.error.as_deref(), Some("quota exceeded"));
    assert_eq!(task.stage_message, "Upload failed: quota exceeded");
    assert!(h.api.calls().await.is_empty());
    assert!(h.channel.subscriptions().is_empty());
    assert!(h.orchestrator.active_subscription(&task.id).is_none());
}

#[tokio::test]
async fn processing_failure_event_fails_the_task() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel
        .emit(PROCESSING_JOB, failed_event(PROCESSING_JOB, "corrupt pdf"));
    let failed = h.wait_status(&task.id, TaskStatus::ProcessingFailed).await;

    assert_eq!(failed.error.as_deref(), Some("corrupt pdf"));
    assert_eq!(failed.stage_message, "Error: corrupt pdf");
    h.wait_unsubscribed(&task.id).await;
    assert_eq!(h.api.calls().await, vec!["process_document"]);
    assert_eq!(h.invalidations(), 0);
}

#[tokio::test]
async fn rejected_indexing_never_subscribes() {
    let api = MockApi {
        fail_indexing: true,
        ..Default::default()
    };
    let h = Harness::new(api, MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    let failed = h.wait_status(&task.id, TaskStatus::IndexingFailed).await;

    assert_eq!(failed.error.as_deref(), Some("indexer offline"));
    assert_eq!(
        failed.stage_message,
        "Failed to start indexing: indexer offline"
    );
    assert!(failed.backend_indexing_job_id.is_none());
    assert!(h.orchestrator.active_subscription(&task.id).is_none());
    assert_eq!(h.channel.subscriptions(), vec![PROCESSING_JOB.to_string()]);
}

#[tokio::test]
async fn rejected_processing_marks_processing_failed() {
    let api = MockApi {
        fail_processing: true,
        ..Default::default()
    };
    let h = Harness::new(api, MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    assert_eq!(task.status, TaskStatus::ProcessingFailed);
    assert_eq!(task.error.as_deref(), Some("processing unavailable"));
    assert_eq!(
        task.stage_message,
        "Failed to start processing: processing unavailable"
    );
    assert!(task.backend_processing_job_id.is_none());
    assert!(h.channel.subscriptions().is_empty());
}

#[tokio::test]
async fn url_ingestion_skips_upload_and_completes() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_url_ingestion("  https://example.com/docs ", Some("Example docs".into()))
        .await
        .expect("valid url");

    assert_eq!(task.status, TaskStatus::ProcessingQueued);
    assert_eq!(task.name, "Example docs");
    assert_eq!(task.source_url.as_deref(), Some("https://example.com/docs"));
    assert!(task.backend_reference_id.is_some());
    assert!(h.uploader.uploads.lock().await.is_empty());

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    h.wait_status(&task.id, TaskStatus::IndexingQueued).await;
    h.channel.emit(INDEXING_JOB, event(INDEXING_JOB, "COMPLETED"));
    h.wait_status(&task.id, TaskStatus::Completed).await;

    assert_eq!(h.api.calls().await, vec!["process_url", "begin_indexing"]);
}

#[tokio::test]
async fn multimedia_uses_multimedia_endpoints() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let clip = SourceFile::new("talk.mp4", "video/mp4", Bytes::from_static(b"....ftyp"));

    let task = h
        .orchestrator
        .begin_multimedia_ingestion(clip, ConflictPolicy::Original)
        .await
        .expect("valid media");
    assert_eq!(task.media_kind, Some(MediaKind::Video));
    assert_eq!(task.status, TaskStatus::ProcessingQueued);
    assert_eq!(task.estimated_duration_secs, Some(30));
    assert_eq!(task.storage_path.as_deref(), Some("bot-1/talk.mp4"));

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    h.wait_status(&task.id, TaskStatus::IndexingQueued).await;

    assert_eq!(
        h.api.calls().await,
        vec!["process_multimedia", "begin_indexing"]
    );
    assert_eq!(
        *h.api.indexing_variants.lock().await,
        vec![IndexingVariant::Multimedia]
    );
}

#[tokio::test]
async fn replace_policy_records_outcome() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let policy = ConflictPolicy::Replace {
        existing_source_id: Some("src-1".into()),
    };
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), policy)
        .await
        .expect("valid document");

    assert_eq!(
        task.replace_outcome,
        Some(ReplaceOutcome::Replaced {
            source_id: "src-1".into()
        })
    );
    assert_eq!(
        h.api.calls().await,
        vec!["delete_content_source", "process_document"]
    );
}

#[tokio::test]
async fn failed_delete_does_not_block_replacement_upload() {
    let api = MockApi {
        fail_delete: true,
        ..Default::default()
    };
    let h = Harness::new(api, MockUploader::default());
    let policy = ConflictPolicy::Replace {
        existing_source_id: Some("src-1".into()),
    };
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), policy)
        .await
        .expect("valid document");

    assert_eq!(task.status, TaskStatus::ProcessingQueued);
    match task.replace_outcome {
        Some(ReplaceOutcome::ReplaceSkipped { source_id, reason }) => {
            assert_eq!(source_id, "src-1");
            assert_eq!(reason, "source not found");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    assert_eq!(h.uploader.uploads.lock().await.len(), 1);
}

#[tokio::test]
async fn progress_never_moves_backwards_within_a_stage() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(
        PROCESSING_JOB,
        progress_event(PROCESSING_JOB, "PROCESSING", 60, "step one"),
    );
    h.channel.emit(
        PROCESSING_JOB,
        progress_event(PROCESSING_JOB, "PROCESSING", 30, "step two"),
    );
    let task = h
        .wait_for(&task.id, |task| task.stage_message == "step two")
        .await;
    assert_eq!(task.progress, 60);
    assert_eq!(task.status, TaskStatus::Processing);
}

#[tokio::test]
async fn unknown_backend_status_keeps_current_status() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(
        PROCESSING_JOB,
        progress_event(PROCESSING_JOB, "RETRYING", 10, "Retrying extraction"),
    );
    let task = h
        .wait_for(&task.id, |task| task.stage_message == "Retrying extraction")
        .await;
    assert_eq!(task.status, TaskStatus::ProcessingQueued);
    assert_eq!(task.progress, 10);
}

#[tokio::test]
async fn error_without_details_uses_default_message() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "CANCELLED"));
    let failed = h.wait_status(&task.id, TaskStatus::ProcessingFailed).await;
    assert_eq!(failed.error.as_deref(), Some(STREAM_ERROR_MESSAGE));
}

#[tokio::test]
async fn transport_failure_fails_the_current_stage() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    h.wait_status(&task.id, TaskStatus::IndexingQueued).await;
    h.channel.emit_failure(
        INDEXING_JOB,
        AppError::Channel("connection reset".into()),
    );

    let failed = h.wait_status(&task.id, TaskStatus::IndexingFailed).await;
    assert_eq!(failed.error.as_deref(), Some("connection reset"));
}

#[tokio::test]
async fn cancel_closes_subscription_and_ignores_late_events() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    let cancelled = h.orchestrator.cancel(&task.id).expect("cancel");
    assert_eq!(cancelled.status, TaskStatus::Cancelled);
    assert!(h.orchestrator.active_subscription(&task.id).is_none());

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    sleep(Duration::from_millis(50)).await;

    let stored = h.orchestrator.registry().get(&task.id).expect("task");
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert_eq!(h.api.calls().await, vec!["process_document"]);
    assert!(matches!(
        h.orchestrator.cancel(&task.id),
        Err(AppError::TaskTerminal(_))
    ));
}

#[tokio::test]
async fn cancel_during_indexing_request_discards_the_response() {
    let gate = Arc::new(Notify::new());
    let api = MockApi {
        indexing_gate: Some(Arc::clone(&gate)),
        ..Default::default()
    };
    let h = Harness::new(api, MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.emit(PROCESSING_JOB, event(PROCESSING_JOB, "COMPLETED"));
    h.wait_for(&task.id, |task| {
        task.stage_message == "Processing complete, starting indexing..."
    })
    .await;

    h.orchestrator.cancel(&task.id).expect("cancel");
    gate.notify_one();
    sleep(Duration::from_millis(50)).await;

    let stored = h.orchestrator.registry().get(&task.id).expect("task");
    assert_eq!(stored.status, TaskStatus::Cancelled);
    assert!(stored.backend_indexing_job_id.is_none());
    assert!(h.orchestrator.active_subscription(&task.id).is_none());
    assert_eq!(h.channel.subscriptions(), vec![PROCESSING_JOB.to_string()]);
}

#[tokio::test]
async fn stream_close_without_terminal_event_only_logs() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.finish(PROCESSING_JOB);
    h.wait_unsubscribed(&task.id).await;
    sleep(Duration::from_millis(20)).await;

    let stored = h.orchestrator.registry().get(&task.id).expect("task");
    assert_eq!(stored.status, TaskStatus::ProcessingQueued);
    assert!(stored.error.is_none());
}

#[tokio::test]
async fn silent_task_fails_after_close_grace() {
    let tuning = IngestionTuning {
        close_grace: Some(Duration::from_millis(30)),
    };
    let h = Harness::with_tuning(MockApi::default(), MockUploader::default(), tuning);
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    h.channel.finish(PROCESSING_JOB);
    let failed = h.wait_status(&task.id, TaskStatus::FailedPermanently).await;
    assert_eq!(failed.error.as_deref(), Some(LOST_CONNECTION_MESSAGE));
    assert_eq!(
        failed.stage_message,
        format!("Error: {LOST_CONNECTION_MESSAGE}")
    );
}

#[tokio::test]
async fn missing_reference_id_fails_processing() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .registry()
        .add(NewTask::url("https://example.com", None));
    h.orchestrator
        .multiplexer
        .open(&task.id, "J9", StageKind::Processing);

    h.channel.emit("J9", event("J9", "COMPLETED"));
    let failed = h.wait_status(&task.id, TaskStatus::ProcessingFailed).await;

    assert_eq!(failed.error.as_deref(), Some(MISSING_REFERENCE_MESSAGE));
    assert!(h.api.calls().await.is_empty());
}

#[tokio::test]
async fn invalid_input_creates_no_task() {
    let h = Harness::new(MockApi::default(), MockUploader::default());

    let unnamed = SourceFile::new(" ", "application/pdf", Bytes::from_static(b"x"));
    let oversized = SourceFile::new(
        "huge.pdf",
        "application/pdf",
        Bytes::from(vec![0_u8; 2048]),
    );

    assert!(matches!(
        h.orchestrator
            .begin_document_ingestion(unnamed, ConflictPolicy::Original)
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.orchestrator
            .begin_multimedia_ingestion(oversized, ConflictPolicy::Original)
            .await,
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        h.orchestrator.begin_url_ingestion("not a url", None).await,
        Err(AppError::Validation(_))
    ));
    assert!(h.orchestrator.registry().is_empty());
}

#[tokio::test]
async fn dismiss_only_removes_finished_tasks() {
    let h = Harness::new(MockApi::default(), MockUploader::default());
    let task = h
        .orchestrator
        .begin_document_ingestion(pdf(), ConflictPolicy::Original)
        .await
        .expect("valid document");

    assert!(matches!(
        h.orchestrator.dismiss(&task.id),
        Err(AppError::Validation(_))
    ));
    h.orchestrator.cancel(&task.id).expect("cancel");
    let removed = h.orchestrator.dismiss(&task.id).expect("dismiss");
    assert_eq!(removed.id, task.id);
    assert!(h.orchestrator.registry().is_empty());
    assert!(matches!(
        h.orchestrator.dismiss(&task.id),
        Err(AppError::NotFound(_))
    ));
}
