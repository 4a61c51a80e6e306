//! SNS query protocol calls.
//!
//! Actions are form-encoded POSTs. Passing `ContentType=JSON` makes SNS
//! answer with `{"<Action>Response": {"<Action>Result": {...}}}` instead of
//! XML; errors arrive as `{"Error": {"Code": ..., "Message": ...}}`.

use serde::Deserialize;
use serde_json::Value;

use super::{AwsChannel, Service};
use crate::channel::{ChannelError, QueueHandle, Result, TopicHandle};

const CONTENT_TYPE: &str = "application/x-www-form-urlencoded; charset=utf-8";
const API_VERSION: &str = "2010-03-31";

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "Error")]
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ErrorDetail {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

fn service_error(status: u16, body: &str) -> ChannelError {
    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(response) => ChannelError::Service {
            service: Service::Sns.name(),
            status,
            code: response.error.code,
            message: response.error.message,
        },
        Err(_) => ChannelError::Service {
            service: Service::Sns.name(),
            status,
            code: "Unknown".to_string(),
            message: body.chars().take(200).collect(),
        },
    }
}

/// Encodes an action and its parameters as a query-protocol form body.
pub(super) fn form_body(action: &str, params: &[(&str, &str)]) -> String {
    let mut form = url::form_urlencoded::Serializer::new(String::new());
    form.append_pair("Action", action);
    for (name, value) in params {
        form.append_pair(name, value);
    }
    form.append_pair("Version", API_VERSION);
    form.append_pair("ContentType", "JSON");
    form.finish()
}

/// Pulls `field` out of `{"<action>Response": {"<action>Result": {field}}}`.
fn result_field(action: &str, response: &Value, field: &str) -> Result<String> {
    response
        .get(format!("{}Response", action))
        .and_then(|r| r.get(format!("{}Result", action)))
        .and_then(|r| r.get(field))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ChannelError::Protocol {
            service: Service::Sns.name(),
            message: format!("{} response has no {}", action, field),
        })
}

impl AwsChannel {
    async fn sns_call(&self, action: &str, params: &[(&str, &str)]) -> Result<Value> {
        let body = form_body(action, params).into_bytes();
        let headers = [("content-type", CONTENT_TYPE)];

        let (status, text) = self.post_signed(Service::Sns, &headers, body).await?;
        if !(200..300).contains(&status) {
            return Err(service_error(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| ChannelError::Protocol {
            service: Service::Sns.name(),
            message: format!("{} response: {}", action, e),
        })
    }

    /// Creates the topic (SNS returns the existing one if present).
    pub(super) async fn sns_create_topic(&self, name: &str) -> Result<String> {
        let response = self.sns_call("CreateTopic", &[("Name", name)]).await?;
        result_field("CreateTopic", &response, "TopicArn")
    }

    /// Subscribes the queue; SNS returns the existing subscription if present.
    pub(super) async fn sns_subscribe(
        &self,
        topic: &TopicHandle,
        queue: &QueueHandle,
    ) -> Result<String> {
        let response = self
            .sns_call(
                "Subscribe",
                &[
                    ("TopicArn", topic.arn.as_str()),
                    ("Protocol", "sqs"),
                    ("Endpoint", queue.arn.as_str()),
                ],
            )
            .await?;
        result_field("Subscribe", &response, "SubscriptionArn")
    }
}
