use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_textract::error::DisplayErrorContext;
use aws_sdk_textract::types::{DocumentLocation as AwsDocumentLocation, S3Object};
use serde::Deserialize;
use tokio::time::sleep;

use crate::models::block::{Block, BlockType, ResultPage};
use crate::models::job::{DocumentLocation, JobStatus, TextDetectionJob};
use crate::util::Stopwatch;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Fixed wait between status checks and between result pages.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// The two backend calls the poller needs.
#[async_trait]
pub trait TextDetectionApi: Send + Sync {
    /// Start a job and return the backend-assigned job id.
    async fn start_document_text_detection(
        &self,
        location: &DocumentLocation,
    ) -> Result<String, BoxError>;

    /// Fetch one result page. `next_token` is `None` for the first page.
    async fn get_document_text_detection(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, BoxError>;
}

/// Timing of the polling loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Status checks allowed before giving up. `None` waits forever.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: POLL_INTERVAL,
            max_attempts: None,
        }
    }
}

/// Submits text detection jobs, waits for them, and collects their pages.
///
/// Every call is awaited in sequence; nothing is spawned and nothing is
/// cached between calls.
#[derive(Clone)]
pub struct TextractHandler {
    api: Arc<dyn TextDetectionApi>,
    policy: PollPolicy,
}

impl TextractHandler {
    pub fn new(api: Arc<dyn TextDetectionApi>) -> Self {
        Self {
            api,
            policy: PollPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> PollPolicy {
        self.policy
    }

    /// Start a job for the document at `bucket`/`key`.
    pub async fn submit(&self, bucket: &str, key: &str) -> Result<TextDetectionJob, OcrError> {
        let source = DocumentLocation::new(bucket, key);
        let job_id = self
            .api
            .start_document_text_detection(&source)
            .await
            .map_err(|source| OcrError::Submission { source })?;

        if job_id.is_empty() {
            return Err(OcrError::MissingJobId);
        }

        tracing::info!(job_id = %job_id, bucket = %bucket, key = %key, "Text detection job started");
        Ok(TextDetectionJob { job_id, source })
    }

    /// One status check. Never blocks and never retries.
    pub async fn poll_status(&self, job_id: &str) -> Result<JobStatus, OcrError> {
        let page = self
            .api
            .get_document_text_detection(job_id, None)
            .await
            .map_err(|source| OcrError::Poll {
                job_id: job_id.to_string(),
                source,
            })?;

        metrics::counter!("ocr_status_checks_total").increment(1);
        tracing::debug!(job_id = %job_id, status = %page.job_status, "Polled job status");
        Ok(page.job_status)
    }

    /// Wait until the job leaves `IN_PROGRESS`, sleeping the poll interval
    /// before each check.
    ///
    /// With the default policy this never gives up.
    pub async fn await_completion(&self, job_id: &str) -> Result<JobStatus, OcrError> {
        let mut attempts: u32 = 0;
        loop {
            sleep(self.policy.interval).await;
            let status = self.poll_status(job_id).await?;
            attempts += 1;

            if status.is_terminal() {
                tracing::info!(job_id = %job_id, status = %status, attempts, "Job finished");
                return Ok(status);
            }

            if let Some(max_attempts) = self.policy.max_attempts {
                if attempts >= max_attempts {
                    tracing::warn!(job_id = %job_id, attempts, "Job still in progress, giving up");
                    return Err(OcrError::Timeout {
                        job_id: job_id.to_string(),
                        attempts,
                    });
                }
            }
        }
    }

    /// Fetch every result page in backend order.
    ///
    /// The first page is requested without a token. Each following page is
    /// requested one interval after the previous one, with its token. Any
    /// failure discards the pages gathered so far.
    pub async fn fetch_all_results(&self, job_id: &str) -> Result<Vec<ResultPage>, OcrError> {
        let mut pages = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = self
                .api
                .get_document_text_detection(job_id, next_token.as_deref())
                .await
                .map_err(|source| OcrError::Fetch {
                    job_id: job_id.to_string(),
                    page: pages.len() + 1,
                    source,
                })?;

            metrics::counter!("ocr_pages_fetched_total").increment(1);
            next_token = page.next_token.clone();
            pages.push(page);

            match next_token {
                Some(_) => sleep(self.policy.interval).await,
                None => break,
            }
        }

        tracing::info!(job_id = %job_id, pages = pages.len(), "Fetched job results");
        Ok(pages)
    }

    /// Submit, wait, fetch and join the recognized lines of one document.
    pub async fn extract_document_text(&self, bucket: &str, key: &str) -> Result<String, OcrError> {
        let watch = Stopwatch::start();
        let job = self.submit(bucket, key).await?;
        let status = self.await_completion(&job.job_id).await?;
        if status == JobStatus::Failed {
            return Err(OcrError::JobFailed { job_id: job.job_id });
        }
        let pages = self.fetch_all_results(&job.job_id).await?;
        let text = full_text(&pages);

        tracing::info!(
            job_id = %job.job_id,
            chars = text.len(),
            elapsed = ?watch.elapsed(),
            "Extracted document text"
        );
        Ok(text)
    }
}

/// Join the text of every `LINE` block, in page order then block order,
/// separated by single spaces.
pub fn full_text(pages: &[ResultPage]) -> String {
    line_texts(pages.iter().flat_map(|page| page.blocks.iter()))
}

/// Same as [`full_text`] over a raw JSON response list.
///
/// Anything that is not a list of pages yields an empty string.
pub fn full_text_from_json(pages: &serde_json::Value) -> String {
    #[derive(Deserialize)]
    struct RawPage {
        #[serde(rename = "Blocks", default)]
        blocks: Vec<Block>,
    }

    match serde_json::from_value::<Vec<RawPage>>(pages.clone()) {
        Ok(pages) => line_texts(pages.iter().flat_map(|page| page.blocks.iter())),
        Err(e) => {
            tracing::warn!(error = %e, "Could not read text detection pages");
            String::new()
        }
    }
}

fn line_texts<'a>(blocks: impl Iterator<Item = &'a Block>) -> String {
    blocks
        .filter(|block| block.block_type == BlockType::Line)
        .filter_map(|block| block.text.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// [`TextDetectionApi`] over the AWS Textract SDK.
pub struct TextractApi {
    client: aws_sdk_textract::Client,
}

impl TextractApi {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_textract::Client::new(config),
        }
    }
}

#[async_trait]
impl TextDetectionApi for TextractApi {
    async fn start_document_text_detection(
        &self,
        location: &DocumentLocation,
    ) -> Result<String, BoxError> {
        let document = AwsDocumentLocation::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&location.bucket)
                    .name(&location.key)
                    .build(),
            )
            .build();

        let output = self
            .client
            .start_document_text_detection()
            .document_location(document)
            .send()
            .await
            .map_err(|e| format!("StartDocumentTextDetection failed: {}", DisplayErrorContext(&e)))?;

        Ok(output.job_id().unwrap_or_default().to_string())
    }

    async fn get_document_text_detection(
        &self,
        job_id: &str,
        next_token: Option<&str>,
    ) -> Result<ResultPage, BoxError> {
        let output = self
            .client
            .get_document_text_detection()
            .job_id(job_id)
            .set_next_token(next_token.map(str::to_owned))
            .send()
            .await
            .map_err(|e| format!("GetDocumentTextDetection failed: {}", DisplayErrorContext(&e)))?;

        let status = output
            .job_status()
            .map(|status| status.as_str())
            .unwrap_or_default();
        let job_status = status
            .parse::<JobStatus>()
            .map_err(|_| OcrError::UnknownStatus(status.to_string()))?;

        let blocks = output
            .blocks()
            .iter()
            .map(|block| Block {
                block_type: block
                    .block_type()
                    .map_or(BlockType::Other, |t| BlockType::from_tag(t.as_str())),
                text: block.text().map(str::to_owned),
                confidence: block.confidence(),
            })
            .collect();

        Ok(ResultPage {
            job_status,
            blocks,
            next_token: output.next_token().map(str::to_owned),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("Failed to submit text detection job: {source}")]
    Submission {
        #[source]
        source: BoxError,
    },

    #[error("Failed to poll status of job {job_id}: {source}")]
    Poll {
        job_id: String,
        #[source]
        source: BoxError,
    },

    #[error("Failed to fetch page {page} of job {job_id}: {source}")]
    Fetch {
        job_id: String,
        page: usize,
        #[source]
        source: BoxError,
    },

    #[error("Backend returned no job id")]
    MissingJobId,

    #[error("Unknown job status: {0:?}")]
    UnknownStatus(String),

    #[error("Job {job_id} still in progress after {attempts} status checks")]
    Timeout { job_id: String, attempts: u32 },

    #[error("Job {job_id} failed")]
    JobFailed { job_id: String },
}
