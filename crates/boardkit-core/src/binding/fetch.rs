//! The injected transport capability.

use super::{Aggregation, DataOrigin, RequestDescriptor, SubscriptionDescriptor, TimeRange};
use crate::board::InstanceId;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

/// Transport failures reported by a fetch capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(String),
    #[error("could not decode response: {0}")]
    Decode(String),
    #[error("source unavailable: {0}")]
    Unavailable(String),
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Boxed future returned by [`FetchCapability::request`].
pub type FetchFuture = Pin<Box<dyn Future<Output = FetchResult<Value>> + Send + 'static>>;

/// A request issued on behalf of one field of one instance.
///
/// Origin, time range and aggregation are copied from the instance binding unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchRequest {
    pub instance_id: InstanceId,
    pub field: String,
    pub descriptor: RequestDescriptor,
    pub origin: DataOrigin,
    pub time_range: Option<TimeRange>,
    pub aggregation: Option<Aggregation>,
}

/// A subscription opened on behalf of one field of one instance.
#[derive(Debug, Clone, PartialEq)]
pub struct SubscribeRequest {
    pub instance_id: InstanceId,
    pub field: String,
    pub descriptor: SubscriptionDescriptor,
    pub origin: DataOrigin,
}

/// Handle that closes a push subscription.
pub trait Unsubscribe: Send {
    fn unsubscribe(self: Box<Self>);
}

impl<F: FnOnce() + Send> Unsubscribe for F {
    fn unsubscribe(self: Box<Self>) {
        (*self)()
    }
}

/// Messages flowing back into the binder from spawned work and subscriptions.
#[derive(Debug)]
pub(crate) enum BinderMessage {
    Fetched {
        instance_id: InstanceId,
        field: String,
        token: u64,
        result: FetchResult<Value>,
    },
    Pushed {
        instance_id: InstanceId,
        field: String,
        token: u64,
        result: FetchResult<Value>,
    },
    Tick {
        instance_id: InstanceId,
        token: u64,
    },
}

/// Where a subscription delivers its values.
///
/// Values pushed after the owning instance was torn down are discarded by the binder.
#[derive(Debug, Clone)]
pub struct PushSink {
    tx: UnboundedSender<BinderMessage>,
    instance_id: InstanceId,
    field: String,
    token: u64,
}

impl PushSink {
    pub(crate) fn new(
        tx: UnboundedSender<BinderMessage>,
        instance_id: InstanceId,
        field: String,
        token: u64,
    ) -> Self {
        Self {
            tx,
            instance_id,
            field,
            token,
        }
    }

    /// Deliver a value. Returns false once the binder is gone.
    pub fn push(&self, value: Value) -> bool {
        self.send(Ok(value))
    }

    /// Report a subscription failure for the field.
    pub fn fail(&self, error: FetchError) -> bool {
        self.send(Err(error))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, result: FetchResult<Value>) -> bool {
        self.tx
            .send(BinderMessage::Pushed {
                instance_id: self.instance_id.clone(),
                field: self.field.clone(),
                token: self.token,
                result,
            })
            .is_ok()
    }
}

/// Transport injected into the binder. The engine never retries.
pub trait FetchCapability: Send + Sync {
    /// Issue a one-shot request. The future is polled on a spawned task and dropped if
    /// the owning instance is torn down first.
    fn request(&self, request: FetchRequest) -> FetchFuture;

    /// Open a push subscription delivering into `sink` until the returned handle is
    /// closed.
    fn subscribe(
        &self,
        request: SubscribeRequest,
        sink: PushSink,
    ) -> FetchResult<Box<dyn Unsubscribe>>;
}
