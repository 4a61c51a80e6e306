//! SQS JSON protocol calls.
//!
//! Each action is a POST of a JSON document with
//! `X-Amz-Target: AmazonSQS.<Action>`. Errors come back as
//! `{"__type": "com.amazonaws.sqs#Code", "message": "..."}`.

use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::types::{MessageId, ReceiptHandle};

use super::{AwsChannel, Service};
use crate::channel::{ChannelError, Envelope, QueueHandle, ReceiveRequest, Result, TopicHandle};

const CONTENT_TYPE: &str = "application/x-amz-json-1.0";

/// SQS caps long polling at 20 seconds.
const MAX_WAIT_SECONDS: u64 = 20;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateQueueResponse {
    queue_url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GetQueueAttributesResponse {
    #[serde(default)]
    attributes: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveMessageResponse {
    #[serde(default)]
    messages: Vec<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawMessage {
    message_id: String,
    receipt_handle: String,
    body: String,
    #[serde(default)]
    message_attributes: HashMap<String, RawAttributeValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttributeValue {
    string_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    error_type: String,
    #[serde(alias = "Message", default)]
    message: String,
}

impl From<RawMessage> for Envelope {
    fn from(raw: RawMessage) -> Self {
        let attributes: BTreeMap<String, String> = raw
            .message_attributes
            .into_iter()
            .filter_map(|(name, value)| value.string_value.map(|v| (name, v)))
            .collect();
        Envelope {
            message_id: MessageId::new(raw.message_id),
            receipt: ReceiptHandle::new(raw.receipt_handle),
            body: raw.body,
            attributes,
        }
    }
}

/// Builds the policy that lets `topic` deliver into `queue`.
pub(super) fn queue_policy(queue: &QueueHandle, topic: &TopicHandle) -> String {
    json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": format!("snooze-{}", topic.name),
            "Effect": "Allow",
            "Principal": {"Service": "sns.amazonaws.com"},
            "Action": "sqs:SendMessage",
            "Resource": queue.arn,
            "Condition": {"ArnEquals": {"aws:SourceArn": topic.arn}}
        }]
    })
    .to_string()
}

fn service_error(status: u16, body: &str) -> ChannelError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(error) => ChannelError::Service {
            service: Service::Sqs.name(),
            status,
            code: error
                .error_type
                .rsplit('#')
                .next()
                .unwrap_or_default()
                .to_string(),
            message: error.message,
        },
        Err(_) => ChannelError::Service {
            service: Service::Sqs.name(),
            status,
            code: "Unknown".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

impl AwsChannel {
    async fn sqs_call<T: DeserializeOwned>(&self, action: &str, payload: &Value) -> Result<T> {
        let target = format!("AmazonSQS.{}", action);
        let headers = [("content-type", CONTENT_TYPE), ("x-amz-target", target.as_str())];
        let body = serde_json::to_vec(payload).map_err(|e| ChannelError::Protocol {
            service: Service::Sqs.name(),
            message: e.to_string(),
        })?;

        let (status, text) = self.post_signed(Service::Sqs, &headers, body).await?;
        if !(200..300).contains(&status) {
            return Err(service_error(status, &text));
        }

        let text = if text.trim().is_empty() { "{}" } else { text.as_str() };
        serde_json::from_str(text).map_err(|e| ChannelError::Protocol {
            service: Service::Sqs.name(),
            message: format!("{} response: {}", action, e),
        })
    }

    pub(super) async fn sqs_create_queue(&self, name: &str) -> Result<String> {
        let response: CreateQueueResponse = self
            .sqs_call("CreateQueue", &json!({"QueueName": name}))
            .await?;
        Ok(response.queue_url)
    }

    pub(super) async fn sqs_queue_arn(&self, queue_url: &str) -> Result<String> {
        let response: GetQueueAttributesResponse = self
            .sqs_call(
                "GetQueueAttributes",
                &json!({"QueueUrl": queue_url, "AttributeNames": ["QueueArn"]}),
            )
            .await?;
        response
            .attributes
            .get("QueueArn")
            .cloned()
            .ok_or_else(|| ChannelError::Protocol {
                service: Service::Sqs.name(),
                message: format!("no QueueArn for {}", queue_url),
            })
    }

    pub(super) async fn sqs_allow_topic(
        &self,
        queue: &QueueHandle,
        topic: &TopicHandle,
    ) -> Result<()> {
        let _: Value = self
            .sqs_call(
                "SetQueueAttributes",
                &json!({
                    "QueueUrl": queue.url,
                    "Attributes": {"Policy": queue_policy(queue, topic)}
                }),
            )
            .await?;
        Ok(())
    }

    pub(super) async fn sqs_receive(
        &self,
        queue: &QueueHandle,
        request: &ReceiveRequest,
    ) -> Result<Vec<Envelope>> {
        let mut payload = json!({
            "QueueUrl": queue.url,
            "MaxNumberOfMessages": request.max_messages.clamp(1, crate::channel::MAX_BATCH),
            "MessageAttributeNames": request.attribute_names,
        });
        if let Some(wait) = request.wait {
            payload["WaitTimeSeconds"] = json!(wait.as_secs().min(MAX_WAIT_SECONDS));
        }

        let response: ReceiveMessageResponse = self.sqs_call("ReceiveMessage", &payload).await?;
        Ok(response.messages.into_iter().map(Envelope::from).collect())
    }

    pub(super) async fn sqs_delete(&self, queue: &QueueHandle, receipt: &ReceiptHandle) -> Result<()> {
        let _: Value = self
            .sqs_call(
                "DeleteMessage",
                &json!({"QueueUrl": queue.url, "ReceiptHandle": receipt.as_str()}),
            )
            .await?;
        Ok(())
    }
}
