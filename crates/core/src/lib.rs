pub mod frame;
pub mod store;
pub mod turn;

pub mod llm {
    use std::pin::Pin;

    use futures::Stream;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;
    use tokio_util::sync::CancellationToken;

    use crate::turn::TurnUpdate;

    #[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
    #[serde(rename_all = "lowercase")]
    pub enum Role {
        User,
        Assistant,
    }

    /// Body accepted by the relay and sent by the chat client.
    ///
    /// Only `prompt`, `stream` and `userName` are interpreted; every other
    /// field (model, max_tokens, temperature, ...) rides along in `extra`
    /// and is forwarded upstream untouched.
    #[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
    pub struct ChatRequest {
        #[serde(default)]
        pub prompt: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub stream: Option<bool>,
        #[serde(rename = "userName", default, skip_serializing_if = "Option::is_none")]
        pub user_name: Option<String>,
        #[serde(flatten)]
        pub extra: serde_json::Map<String, serde_json::Value>,
    }

    impl ChatRequest {
        pub fn new<S: Into<String>>(prompt: S) -> Self {
            Self {
                prompt: prompt.into(),
                ..Default::default()
            }
        }

        pub fn with_field<K: Into<String>>(mut self, key: K, value: serde_json::Value) -> Self {
            self.extra.insert(key.into(), value);
            self
        }
    }

    #[derive(Error, Debug)]
    pub enum ChatError {
        #[error("network: {0}")] Network(String),
        #[error("timeout: {0}")] Timeout(String),
        #[error("Upstream error: {status} {body}")] Status { status: u16, body: String },
        #[error("decode: {0}")] Decode(String),
        #[error("other: {0}")] Other(String),
    }

    pub type TurnStream<'a> = Pin<Box<dyn Stream<Item = TurnUpdate> + Send + 'a>>;

    /// A client able to run one chat turn against the relay.
    ///
    /// `stream_turn` never fails up front: every outcome, including
    /// transport errors, arrives as the final `TurnUpdate::Finalized`.
    #[allow(async_fn_in_trait)]
    pub trait ChatClient: Send + Sync {
        async fn complete(&self, req: &ChatRequest) -> Result<serde_json::Value, ChatError>;
        fn stream_turn(&self, req: ChatRequest, cancel: CancellationToken) -> TurnStream<'_>;
    }

}
