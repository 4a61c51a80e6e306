//! SNS + SQS channel backend.
//!
//! Requests are plain HTTPS calls signed with SigV4. SQS uses its JSON
//! protocol; SNS uses the query protocol with `ContentType=JSON` so both
//! services answer in JSON. Transient failures are retried with exponential
//! backoff (see [`super::retry`]).

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, instrument};
use url::Url;

use crate::config::AwsCredentials;
use crate::types::ReceiptHandle;

use super::retry::{RetryConfig, RetryPolicy, retry_with_backoff};
use super::{
    ChannelBackend, ChannelError, Envelope, QueueHandle, ReceiveRequest, Result, TopicHandle,
};

pub mod sigv4;
mod sns;
mod sqs;

/// Upper bound on a single HTTP exchange. Must exceed the 20s long-poll wait.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The AWS services this backend calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Service {
    Sqs,
    Sns,
}

impl Service {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Service::Sqs => "sqs",
            Service::Sns => "sns",
        }
    }
}

/// Where to send SQS and SNS requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsEndpoints {
    pub sqs: Url,
    pub sns: Url,
}

impl AwsEndpoints {
    /// The public endpoints for a region.
    pub fn for_region(region: &str) -> Result<Self> {
        Ok(AwsEndpoints {
            sqs: parse_endpoint(&format!("https://sqs.{}.amazonaws.com/", region))?,
            sns: parse_endpoint(&format!("https://sns.{}.amazonaws.com/", region))?,
        })
    }

    /// Sends both services to one base url (a local emulator or mock).
    pub fn single(base: &str) -> Result<Self> {
        let url = parse_endpoint(base)?;
        Ok(AwsEndpoints {
            sqs: url.clone(),
            sns: url,
        })
    }
}

fn parse_endpoint(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| ChannelError::InvalidEndpoint {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// A channel backend on AWS SNS and SQS.
#[derive(Clone)]
pub struct AwsChannel {
    http: reqwest::Client,
    credentials: AwsCredentials,
    endpoints: AwsEndpoints,
    retry: RetryConfig,
    policy: RetryPolicy,
}

impl AwsChannel {
    /// Creates a backend for the region named in `credentials`.
    pub fn new(credentials: &AwsCredentials) -> Result<Self> {
        let endpoints = AwsEndpoints::for_region(&credentials.region)?;
        Self::with_endpoints(credentials, endpoints)
    }

    /// Creates a backend against explicit endpoints.
    pub fn with_endpoints(credentials: &AwsCredentials, endpoints: AwsEndpoints) -> Result<Self> {
        crate::tls::install_crypto_provider();

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| ChannelError::Transport {
                service: "http",
                source,
            })?;

        Ok(AwsChannel {
            http,
            credentials: credentials.clone(),
            endpoints,
            retry: RetryConfig::DEFAULT,
            policy: RetryPolicy::RetryTransient,
        })
    }

    /// Replaces the retry schedule.
    pub fn with_retry(mut self, retry: RetryConfig, policy: RetryPolicy) -> Self {
        self.retry = retry;
        self.policy = policy;
        self
    }

    pub fn endpoints(&self) -> &AwsEndpoints {
        &self.endpoints
    }

    /// Sends one signed POST and returns the status and body text.
    async fn post_signed(
        &self,
        service: Service,
        extra_headers: &[(&str, &str)],
        body: Vec<u8>,
    ) -> Result<(u16, String)> {
        let endpoint = match service {
            Service::Sqs => &self.endpoints.sqs,
            Service::Sns => &self.endpoints.sns,
        };
        let params = sigv4::SigningParams {
            access_key: &self.credentials.key,
            secret_key: &self.credentials.secret,
            region: &self.credentials.region,
            service: service.name(),
            time: Utc::now(),
        };
        let signed = sigv4::sign(&params, "POST", endpoint, extra_headers, &body).map_err(|e| {
            ChannelError::Protocol {
                service: service.name(),
                message: format!("request signing failed: {}", e),
            }
        })?;

        let mut request = self
            .http
            .post(endpoint.clone())
            .header("x-amz-date", signed.amz_date)
            .header(AUTHORIZATION, signed.authorization);
        for (name, value) in extra_headers {
            request = request.header(*name, *value);
        }

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|source| ChannelError::Transport {
                service: service.name(),
                source,
            })?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|source| ChannelError::Transport {
                service: service.name(),
                source,
            })?;
        Ok((status, text))
    }

    async fn with_retry_of<T, F, Fut>(&self, operation: &str, call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        retry_with_backoff(self.retry, self.policy, operation, call).await
    }
}

impl std::fmt::Debug for AwsChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsChannel")
            .field("region", &self.credentials.region)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChannelBackend for AwsChannel {
    #[instrument(skip(self))]
    async fn create_queue(&self, name: &str) -> Result<QueueHandle> {
        let url = self
            .with_retry_of("sqs.CreateQueue", || self.sqs_create_queue(name))
            .await?;
        let arn = self
            .with_retry_of("sqs.GetQueueAttributes", || self.sqs_queue_arn(&url))
            .await?;
        debug!(queue = name, %arn, "Queue ready");
        Ok(QueueHandle {
            name: name.to_string(),
            url,
            arn,
        })
    }

    #[instrument(skip(self))]
    async fn create_topic(&self, name: &str) -> Result<TopicHandle> {
        let arn = self
            .with_retry_of("sns.CreateTopic", || self.sns_create_topic(name))
            .await?;
        debug!(topic = name, %arn, "Topic ready");
        Ok(TopicHandle {
            name: name.to_string(),
            arn,
        })
    }

    #[instrument(skip(self, topic, queue), fields(topic = %topic.name, queue = %queue.name))]
    async fn subscribe(&self, topic: &TopicHandle, queue: &QueueHandle) -> Result<()> {
        self.with_retry_of("sqs.SetQueueAttributes", || {
            self.sqs_allow_topic(queue, topic)
        })
        .await?;
        let subscription = self
            .with_retry_of("sns.Subscribe", || self.sns_subscribe(topic, queue))
            .await?;
        debug!(%subscription, "Queue subscribed to topic");
        Ok(())
    }

    async fn receive(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> Result<Vec<Envelope>> {
        self.with_retry_of("sqs.ReceiveMessage", || self.sqs_receive(queue, request))
            .await
    }

    async fn delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<()> {
        self.with_retry_of("sqs.DeleteMessage", || self.sqs_delete(queue, receipt))
            .await
    }
}
