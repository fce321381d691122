use std::mem;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use http::StatusCode;
use reqwest::header;
use serde::Serialize;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use crate::config::{Config, DEFAULT_HOST, MIN_FLUSH_INTERVAL};
use crate::error::{ClientError, DeliveryError};
use crate::message::TypedMessage;
use crate::retry::RetryPolicy;

/// Messages whose serialized form exceeds this are rejected without being sent.
pub const MAX_MESSAGE_SIZE: usize = 32 * 1024;

pub const LIBRARY_NAME: &str = "analytics-rust";

const IMPORT_PATH: &str = "v1/import/";

/// Notified exactly once for every message handed to a `DeliveryClient`.
/// Called from the client's background task, so implementations must be thread safe.
pub trait Callback: Send + Sync {
    fn success(&self, message: &TypedMessage);
    fn failure(&self, message: &TypedMessage, error: &DeliveryError);
}

/// A callback that ignores every outcome.
pub struct NoopCallback;

impl Callback for NoopCallback {
    fn success(&self, _message: &TypedMessage) {}
    fn failure(&self, _message: &TypedMessage, _error: &DeliveryError) {}
}

/// Anything that can deliver messages in the background and report back through a `Callback`.
#[async_trait]
pub trait DeliveryClient: Send + Sync {
    /// Queue a message for delivery. Never blocks; the outcome arrives through the callback.
    fn enqueue(&self, message: TypedMessage);
    /// Wait until every message enqueued before this call has been attempted.
    async fn flush(&self);
    /// Deliver what is left and release the background task. Later enqueues fail.
    async fn shutdown(&self);
}

enum Command {
    Enqueue(TypedMessage),
    Flush(oneshot::Sender<()>),
}

pub struct ClientBuilder {
    write_key: String,
    host: String,
    flush_at: usize,
    flush_interval: Duration,
    request_timeout: Duration,
    retry_policy: RetryPolicy,
    callback: Arc<dyn Callback>,
}

impl ClientBuilder {
    pub fn new(write_key: &str) -> Self {
        Self {
            write_key: write_key.to_owned(),
            host: DEFAULT_HOST.to_owned(),
            flush_at: 20,
            flush_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
            callback: Arc::new(NoopCallback),
        }
    }

    pub fn from_config(write_key: &str, config: &Config) -> Self {
        Self::new(write_key)
            .host(&config.host)
            .flush_at(config.flush_at)
            .flush_interval(config.flush_interval.0)
            .request_timeout(config.request_timeout.0)
            .retry_policy(config.retry_policy())
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_owned();
        self
    }

    /// Number of queued messages that triggers an upload. Zero is treated as one.
    pub fn flush_at(mut self, flush_at: usize) -> Self {
        self.flush_at = flush_at.max(1);
        self
    }

    pub fn flush_interval(mut self, flush_interval: Duration) -> Self {
        self.flush_interval = flush_interval.max(MIN_FLUSH_INTERVAL);
        self
    }

    pub fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.retry_policy = self.retry_policy.with_max_retries(max_retries);
        self
    }

    pub fn callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callback = callback;
        self
    }

    /// Start the background task. Must be called from within a tokio runtime.
    pub fn build(self) -> Result<AnalyticsClient, ClientError> {
        if self.write_key.is_empty() {
            return Err(ClientError::EmptyWriteKey);
        }

        let endpoint = import_url(&self.host)?;
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(format!("{}/{}", LIBRARY_NAME, env!("CARGO_PKG_VERSION")))
            .timeout(self.request_timeout)
            .build()?;

        let (sender, receiver) = mpsc::unbounded_channel();

        let looper = Looper {
            uploader: Uploader {
                http,
                endpoint,
                write_key: self.write_key,
                retry_policy: self.retry_policy,
                callback: self.callback.clone(),
            },
            flush_at: self.flush_at,
            flush_interval: self.flush_interval,
            receiver,
        };

        debug!(
            flush_at = self.flush_at,
            flush_interval_ms = self.flush_interval.as_millis() as u64,
            "starting analytics client"
        );

        Ok(AnalyticsClient {
            sender: Mutex::new(Some(sender)),
            looper: Mutex::new(Some(runtime.spawn(looper.run()))),
            callback: self.callback,
        })
    }
}

fn import_url(host: &str) -> Result<Url, ClientError> {
    let base = if host.ends_with('/') {
        host.to_owned()
    } else {
        format!("{host}/")
    };

    Url::parse(&base)
        .and_then(|base| base.join(IMPORT_PATH))
        .map_err(|error| ClientError::InvalidEndpoint {
            host: host.to_owned(),
            error,
        })
}

/// Batches messages and uploads them to the tracking API's import endpoint.
pub struct AnalyticsClient {
    sender: Mutex<Option<mpsc::UnboundedSender<Command>>>,
    looper: Mutex<Option<JoinHandle<()>>>,
    callback: Arc<dyn Callback>,
}

impl AnalyticsClient {
    pub fn builder(write_key: &str) -> ClientBuilder {
        ClientBuilder::new(write_key)
    }

    fn send(&self, command: Command) -> Result<(), Command> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        match sender.as_ref() {
            Some(sender) => sender.send(command).map_err(|e| e.0),
            None => Err(command),
        }
    }
}

#[async_trait]
impl DeliveryClient for AnalyticsClient {
    fn enqueue(&self, message: TypedMessage) {
        let size = match serde_json::to_vec(&message) {
            Ok(bytes) => bytes.len(),
            Err(e) => {
                self.callback
                    .failure(&message, &DeliveryError::SerializationError(e.to_string()));
                return;
            }
        };

        if size > MAX_MESSAGE_SIZE {
            warn!(message_id = message.message_id(), size, "dropping oversized message");
            self.callback.failure(
                &message,
                &DeliveryError::MessageTooLarge {
                    size,
                    limit: MAX_MESSAGE_SIZE,
                },
            );
            return;
        }

        if let Err(Command::Enqueue(message)) = self.send(Command::Enqueue(message)) {
            debug!(message_id = message.message_id(), "enqueue after shutdown");
            self.callback.failure(&message, &DeliveryError::ShutDown);
            return;
        }

        metrics::counter!("analytics_messages_enqueued_total").increment(1);
    }

    async fn flush(&self) {
        let (done, wait) = oneshot::channel();

        if self.send(Command::Flush(done)).is_err() {
            debug!("flush requested after shutdown");
            return;
        }

        if wait.await.is_err() {
            warn!("analytics client stopped before completing flush");
        }
    }

    async fn shutdown(&self) {
        // Dropping the sender closes the channel, which makes the looper drain and exit.
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );

        let looper = self
            .looper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(looper) = looper {
            if let Err(e) = looper.await {
                error!("analytics client task failed: {}", e);
            }
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Batch<'a> {
    batch: &'a [TypedMessage],
    #[serde(with = "time::serde::rfc3339")]
    sent_at: OffsetDateTime,
    context: Value,
}

impl<'a> Batch<'a> {
    fn new(batch: &'a [TypedMessage]) -> Self {
        Self {
            batch,
            sent_at: OffsetDateTime::now_utc(),
            context: json!({
                "library": {
                    "name": LIBRARY_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        }
    }
}

enum UploadError {
    Retryable {
        error: DeliveryError,
        retry_after: Option<Duration>,
    },
    NonRetryable(DeliveryError),
}

/// Background task owning the queue.
struct Looper {
    uploader: Uploader,
    flush_at: usize,
    flush_interval: Duration,
    receiver: mpsc::UnboundedReceiver<Command>,
}

impl Looper {
    async fn run(self) {
        let Looper {
            uploader,
            flush_at,
            flush_interval,
            mut receiver,
        } = self;

        let mut pending: Vec<TypedMessage> = Vec::with_capacity(flush_at);
        let mut interval = tokio::time::interval(flush_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                command = receiver.recv() => match command {
                    Some(Command::Enqueue(message)) => {
                        pending.push(message);
                        if pending.len() >= flush_at {
                            uploader.upload(mem::take(&mut pending)).await;
                        }
                    }
                    Some(Command::Flush(done)) => {
                        uploader.upload(mem::take(&mut pending)).await;
                        if done.send(()).is_err() {
                            debug!("flush waiter went away");
                        }
                    }
                    None => {
                        uploader.upload(mem::take(&mut pending)).await;
                        debug!("analytics client shut down");
                        return;
                    }
                },
                _ = interval.tick() => {
                    uploader.upload(mem::take(&mut pending)).await;
                }
            }
        }
    }
}

/// Sends batches to the import endpoint and reports the outcome per message.
struct Uploader {
    http: reqwest::Client,
    endpoint: Url,
    write_key: String,
    retry_policy: RetryPolicy,
    callback: Arc<dyn Callback>,
}

impl Uploader {
    /// Upload a batch and report the outcome for each of its messages.
    async fn upload(&self, messages: Vec<TypedMessage>) {
        if messages.is_empty() {
            return;
        }

        debug!("uploading batch with {} message(s)", messages.len());

        match self.send_with_retries(&messages).await {
            Ok(()) => {
                metrics::counter!("analytics_batches_uploaded_total").increment(1);
                for message in &messages {
                    self.callback.success(message);
                }
            }
            Err(e) => {
                metrics::counter!("analytics_batches_failed_total").increment(1);
                error!("could not upload batch of {} message(s): {}", messages.len(), e);
                for message in &messages {
                    self.callback.failure(message, &e);
                }
            }
        }
    }

    async fn send_with_retries(&self, messages: &[TypedMessage]) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(&Batch::new(messages))
            .map_err(|e| DeliveryError::SerializationError(e.to_string()))?;

        let mut attempt = 0;
        loop {
            match self.send_batch(body.clone()).await {
                Ok(()) => return Ok(()),
                Err(UploadError::NonRetryable(error)) => return Err(error),
                Err(UploadError::Retryable { error, retry_after }) => {
                    if !self.retry_policy.should_retry(attempt) {
                        if attempt == 0 {
                            return Err(error);
                        }
                        return Err(DeliveryError::RetriesExhausted {
                            attempts: attempt + 1,
                            last_error: error.to_string(),
                        });
                    }

                    let wait = self.retry_policy.time_until_next_retry(attempt, retry_after);
                    warn!(
                        attempt,
                        wait_ms = wait.as_millis() as u64,
                        "batch upload failed, retrying: {}",
                        error
                    );
                    metrics::counter!("analytics_batch_retries_total").increment(1);

                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn send_batch(&self, body: Vec<u8>) -> Result<(), UploadError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .basic_auth(&self.write_key, Some(""))
            .body(body)
            .send()
            .await
            .map_err(|e| UploadError::Retryable {
                error: DeliveryError::RequestError(e.to_string()),
                retry_after: None,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let retry_after = parse_retry_after_header(response.headers());
        let error = DeliveryError::Rejected {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        };

        if is_retryable_status(status) {
            Err(UploadError::Retryable { error, retry_after })
        } else {
            Err(UploadError::NonRetryable(error))
        }
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

/// Parse a Retry-After header given in seconds. Dates are not supported and yield `None`.
fn parse_retry_after_header(header_map: &header::HeaderMap) -> Option<Duration> {
    header_map
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}
