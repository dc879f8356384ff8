//! Offline fetch capability answering from a fixture file.
//!
//! ```json
//! {
//!   "requests": { "/telemetry/latest": { "reading": 71.5 } },
//!   "channels": { "boiler/state": [true, false] }
//! }
//! ```
//!
//! Requests are answered by endpoint. Subscribing to a channel delivers its values in
//! order, once.

use anyhow::Context;
use boardkit_core::{
    FetchCapability, FetchError, FetchFuture, FetchRequest, PushSink, SubscribeRequest,
    Unsubscribe,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FixtureFetch {
    requests: BTreeMap<String, Value>,
    channels: BTreeMap<String, Vec<Value>>,
}

impl FixtureFetch {
    /// A capability with no fixtures; every request fails as unavailable.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading fixtures {}", path.display()))?;
        let fixtures: Self = serde_json::from_str(&content)
            .with_context(|| format!("parsing fixtures {}", path.display()))?;
        log::info!(
            "Loaded {} request and {} channel fixtures",
            fixtures.requests.len(),
            fixtures.channels.len()
        );
        Ok(fixtures)
    }

    pub fn with_response(mut self, endpoint: impl Into<String>, value: Value) -> Self {
        self.requests.insert(endpoint.into(), value);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>, values: Vec<Value>) -> Self {
        self.channels.insert(channel.into(), values);
        self
    }
}

impl FetchCapability for FixtureFetch {
    fn request(&self, request: FetchRequest) -> FetchFuture {
        let endpoint = request.descriptor.endpoint;
        let response = self
            .requests
            .get(&endpoint)
            .cloned()
            .ok_or_else(|| FetchError::Unavailable(format!("no fixture for {endpoint}")));
        Box::pin(async move { response })
    }

    fn subscribe(
        &self,
        request: SubscribeRequest,
        sink: PushSink,
    ) -> Result<Box<dyn Unsubscribe>, FetchError> {
        let channel = request.descriptor.channel;
        let values = self
            .channels
            .get(&channel)
            .ok_or_else(|| FetchError::Unavailable(format!("no fixture for channel {channel}")))?;
        for value in values {
            sink.push(value.clone());
        }
        Ok(Box::new(move || {
            log::debug!("Closed fixture channel {}", channel);
        }))
    }
}
