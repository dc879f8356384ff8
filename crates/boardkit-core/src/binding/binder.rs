//! Runtime resolver for instance data bindings.

use super::fetch::BinderMessage;
use super::{
    BindingError, BindingSnapshot, DataBindingStatus, DataSourceConfig, FetchCapability,
    FetchRequest, FieldSource, PushSink, SubscribeRequest, Unsubscribe, select_value,
};
use crate::board::{InstanceId, LayoutItem};
use crate::registry::{ComponentDefinition, DataRequirement};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest interval accepted for periodic refresh.
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// How a field slot is currently sourced.
enum SlotBinding {
    None,
    Static,
    Request {
        request: FetchRequest,
        task: Option<JoinHandle<()>>,
    },
    Push {
        request: SubscribeRequest,
        handle: Option<Box<dyn Unsubscribe>>,
    },
}

struct FieldSlot {
    status: DataBindingStatus,
    binding: SlotBinding,
    /// Changes every time the slot issues new work; stale completions carry an old token.
    token: u64,
}

impl FieldSlot {
    fn new(status: DataBindingStatus, binding: SlotBinding) -> Self {
        Self {
            status,
            binding,
            token: 0,
        }
    }

    /// Abort in-flight work and close subscriptions.
    fn cancel(&mut self) {
        match std::mem::replace(&mut self.binding, SlotBinding::None) {
            SlotBinding::Request { task: Some(task), .. } => task.abort(),
            SlotBinding::Push {
                handle: Some(handle),
                ..
            } => handle.unsubscribe(),
            _ => {}
        }
    }

    fn in_flight(&self) -> bool {
        matches!(self.binding, SlotBinding::Request { task: Some(_), .. })
    }
}

struct ActiveInstance {
    type_id: String,
    config: DataSourceConfig,
    requirements: Vec<DataRequirement>,
    fields: BTreeMap<String, FieldSlot>,
    timer: Option<JoinHandle<()>>,
    timer_token: u64,
    watch_tx: watch::Sender<BindingSnapshot>,
}

impl ActiveInstance {
    fn snapshot(&self) -> BindingSnapshot {
        self.fields
            .iter()
            .map(|(name, slot)| (name.clone(), slot.status.clone()))
            .collect()
    }

    fn publish(&self) {
        self.watch_tx.send_replace(self.snapshot());
    }

    fn stop_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn shutdown(&mut self) {
        self.stop_timer();
        for slot in self.fields.values_mut() {
            slot.cancel();
        }
    }
}

/// Resolves widget data bindings and tracks per-field status.
///
/// All state is owned by the caller's task. Requests run on spawned Tokio tasks and
/// report back over a channel; call [`process_pending`](Self::process_pending) or
/// [`process_next`](Self::process_next) to apply their results. Work belonging to an
/// instance that was torn down, or superseded by a refresh, is discarded on arrival.
pub struct DataBinder {
    fetch: Arc<dyn FetchCapability>,
    instances: HashMap<InstanceId, ActiveInstance>,
    tx: UnboundedSender<BinderMessage>,
    rx: UnboundedReceiver<BinderMessage>,
    next_token: u64,
    min_refresh_interval: Duration,
}

impl DataBinder {
    pub fn new(fetch: Arc<dyn FetchCapability>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            fetch,
            instances: HashMap::new(),
            tx,
            rx,
            next_token: 0,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
        }
    }

    /// Set the shortest accepted refresh interval.
    pub fn with_min_refresh_interval(mut self, interval: Duration) -> Self {
        self.min_refresh_interval = interval;
        self
    }

    fn issue_token(&mut self) -> u64 {
        self.next_token += 1;
        self.next_token
    }

    /// Resolve every declared data field of `item`.
    ///
    /// Static values apply immediately; requests and subscriptions are started.
    /// Resolving an instance that is already active reuses cached request results and
    /// open subscriptions for every field whose mapping did not change.
    pub fn resolve(&mut self, item: &LayoutItem, definition: &ComponentDefinition) {
        let instance_id = item.instance_id.clone();
        let config = item.data_source_config().clone();

        let previous = match self.instances.remove(&instance_id) {
            Some(mut prev) if prev.type_id != definition.type_id => {
                prev.shutdown();
                None
            }
            other => other,
        };

        let (watch_tx, mut old_fields) = match previous {
            Some(mut prev) => {
                prev.stop_timer();
                (prev.watch_tx, std::mem::take(&mut prev.fields))
            }
            None => (watch::channel(BindingSnapshot::new()).0, BTreeMap::new()),
        };

        let mut fields = BTreeMap::new();
        for requirement in &definition.data_source_schema {
            let old = old_fields.remove(&requirement.name);
            let slot = self.resolve_field(&instance_id, &config, requirement, old);
            fields.insert(requirement.name.clone(), slot);
        }
        for (_, mut slot) in old_fields {
            slot.cancel();
        }
        for name in config.field_mapping.keys() {
            if definition.requirement(name).is_none() {
                log::debug!(
                    "Instance {}: ignoring mapping for undeclared field '{}'",
                    instance_id,
                    name
                );
            }
        }

        let mut instance = ActiveInstance {
            type_id: definition.type_id.clone(),
            config,
            requirements: definition.data_source_schema.clone(),
            fields,
            timer: None,
            timer_token: 0,
            watch_tx,
        };
        self.start_timer(&instance_id, &mut instance);
        instance.publish();
        self.instances.insert(instance_id, instance);
    }

    fn resolve_field(
        &mut self,
        instance_id: &InstanceId,
        config: &DataSourceConfig,
        requirement: &DataRequirement,
        old: Option<FieldSlot>,
    ) -> FieldSlot {
        let field = requirement.name.clone();
        let last_value = old
            .as_ref()
            .and_then(|slot| slot.status.current_value.clone())
            .or_else(|| requirement.default.clone());

        let Some(source) = config.source(&field) else {
            if let Some(mut old) = old {
                old.cancel();
            }
            let error = requirement
                .required
                .then(|| BindingError::Unbound { field: field.clone() });
            return FieldSlot::new(
                DataBindingStatus::unbound(last_value, error),
                SlotBinding::None,
            );
        };

        if !requirement.supports(source.kind()) {
            if let Some(mut old) = old {
                old.cancel();
            }
            let mut status = DataBindingStatus::unbound(last_value, None);
            status.is_bound = true;
            status.set_error(BindingError::UnsupportedSource {
                field,
                kind: source.kind(),
            });
            return FieldSlot::new(status, SlotBinding::None);
        }

        match source {
            FieldSource::Static { value } => {
                if let Some(mut old) = old {
                    old.cancel();
                }
                let mut status = DataBindingStatus::unbound(last_value, None);
                status.is_bound = true;
                status.set_value(value.clone());
                FieldSlot::new(status, SlotBinding::Static)
            }
            FieldSource::Request(descriptor) => {
                let request = FetchRequest {
                    instance_id: instance_id.clone(),
                    field: field.clone(),
                    descriptor: descriptor.clone(),
                    origin: config.origin.clone(),
                    time_range: config.time_range.clone(),
                    aggregation: config.aggregation.clone(),
                };
                if let Some(old) = old {
                    if matches!(&old.binding, SlotBinding::Request { request: cached, .. } if *cached == request)
                    {
                        log::debug!("Instance {}: reusing cached '{}'", instance_id, field);
                        return old;
                    }
                    let mut old = old;
                    old.cancel();
                }
                let mut status = DataBindingStatus::unbound(last_value, None);
                status.is_bound = true;
                let mut slot = FieldSlot::new(status, SlotBinding::Request { request, task: None });
                self.spawn_request(&mut slot);
                slot
            }
            FieldSource::Subscription(descriptor) => {
                let request = SubscribeRequest {
                    instance_id: instance_id.clone(),
                    field: field.clone(),
                    descriptor: descriptor.clone(),
                    origin: config.origin.clone(),
                };
                if let Some(old) = old {
                    if matches!(&old.binding, SlotBinding::Push { request: open, .. } if *open == request)
                    {
                        return old;
                    }
                    let mut old = old;
                    old.cancel();
                }
                let mut status = DataBindingStatus::unbound(last_value, None);
                status.is_bound = true;
                let token = self.issue_token();
                let sink = PushSink::new(self.tx.clone(), instance_id.clone(), field.clone(), token);
                let handle = match self.fetch.subscribe(request.clone(), sink) {
                    Ok(handle) => Some(handle),
                    Err(e) => {
                        log::warn!("Instance {}: subscribe for '{}' failed: {}", instance_id, field, e);
                        status.set_error(BindingError::Subscribe {
                            field,
                            message: e.to_string(),
                        });
                        None
                    }
                };
                FieldSlot {
                    status,
                    binding: SlotBinding::Push { request, handle },
                    token,
                }
            }
        }
    }

    /// Start (or restart) the request of a request-bound slot.
    fn spawn_request(&mut self, slot: &mut FieldSlot) {
        let token = self.issue_token();
        let SlotBinding::Request { request, task } = &mut slot.binding else {
            return;
        };
        if let Some(previous) = task.take() {
            previous.abort();
        }
        slot.token = token;

        let field = request.field.clone();
        if tokio::runtime::Handle::try_current().is_err() {
            slot.status.set_error(BindingError::Fetch {
                field,
                message: "no async runtime available".to_string(),
            });
            return;
        }

        let instance_id = request.instance_id.clone();
        let future = self.fetch.request(request.clone());
        let tx = self.tx.clone();
        log::debug!("Instance {}: requesting '{}'", instance_id, field);
        *task = Some(tokio::spawn(async move {
            let result = future.await;
            let _ = tx.send(BinderMessage::Fetched {
                instance_id,
                field,
                token,
                result,
            });
        }));
        slot.status.pending = true;
    }

    fn start_timer(&mut self, instance_id: &InstanceId, instance: &mut ActiveInstance) {
        instance.stop_timer();
        let Some(interval) = instance.config.refresh.as_ref().and_then(|r| r.interval()) else {
            return;
        };
        let has_requests = instance
            .fields
            .values()
            .any(|slot| matches!(slot.binding, SlotBinding::Request { .. }));
        if !has_requests || tokio::runtime::Handle::try_current().is_err() {
            return;
        }

        let interval = interval.max(self.min_refresh_interval);
        let token = self.issue_token();
        let tx = self.tx.clone();
        let id = instance_id.clone();
        instance.timer_token = token;
        instance.timer = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; the initial fetch already happened.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let tick = BinderMessage::Tick {
                    instance_id: id.clone(),
                    token,
                };
                if tx.send(tick).is_err() {
                    break;
                }
            }
        }));
    }

    /// Re-issue every request-based field of an instance.
    ///
    /// In-flight requests are superseded. Push subscriptions are left alone.
    /// Returns the number of requests issued.
    pub fn refresh(&mut self, instance_id: &InstanceId) -> usize {
        let Some(mut instance) = self.instances.remove(instance_id) else {
            return 0;
        };
        let mut issued = 0;
        for slot in instance.fields.values_mut() {
            if matches!(slot.binding, SlotBinding::Request { .. }) {
                self.spawn_request(slot);
                issued += 1;
            }
        }
        instance.publish();
        self.instances.insert(instance_id.clone(), instance);
        issued
    }

    /// Cancel all work of an instance and drop its status.
    ///
    /// Returns false if the instance was not active.
    pub fn teardown(&mut self, instance_id: &InstanceId) -> bool {
        match self.instances.remove(instance_id) {
            Some(mut instance) => {
                instance.shutdown();
                log::debug!("Instance {}: bindings torn down", instance_id);
                true
            }
            None => false,
        }
    }

    /// Tear down every active instance.
    pub fn teardown_all(&mut self) {
        let ids: Vec<InstanceId> = self.instances.keys().cloned().collect();
        for id in ids {
            self.teardown(&id);
        }
    }

    /// Apply every completion that has already arrived. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(message) = self.rx.try_recv() {
            if self.apply(message) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for at least one completion, then apply everything that has arrived.
    ///
    /// Returns how many completions were applied; discarded ones do not count.
    pub async fn process_next(&mut self) -> usize {
        let Some(message) = self.rx.recv().await else {
            return 0;
        };
        let first = usize::from(self.apply(message));
        first + self.process_pending()
    }

    fn apply(&mut self, message: BinderMessage) -> bool {
        match message {
            BinderMessage::Fetched {
                instance_id,
                field,
                token,
                result,
            } => {
                let Some(instance) = self.instances.get_mut(&instance_id) else {
                    log::debug!("Discarding late result for removed instance {}", instance_id);
                    return false;
                };
                let Some(slot) = instance.fields.get_mut(&field) else {
                    return false;
                };
                if slot.token != token {
                    return false;
                }
                let SlotBinding::Request { request, task } = &mut slot.binding else {
                    return false;
                };
                *task = None;
                let pointer = request.descriptor.select.clone();
                match result {
                    Ok(value) => match select_value(value, pointer.as_deref()) {
                        Some(value) => slot.status.set_value(value),
                        None => slot.status.set_error(BindingError::MissingValue {
                            field,
                            pointer: pointer.unwrap_or_default(),
                        }),
                    },
                    Err(e) => {
                        log::warn!("Instance {}: request for '{}' failed: {}", instance_id, field, e);
                        slot.status.set_error(BindingError::Fetch {
                            field,
                            message: e.to_string(),
                        });
                    }
                }
                instance.publish();
                true
            }
            BinderMessage::Pushed {
                instance_id,
                field,
                token,
                result,
            } => {
                let Some(instance) = self.instances.get_mut(&instance_id) else {
                    return false;
                };
                let Some(slot) = instance.fields.get_mut(&field) else {
                    return false;
                };
                if slot.token != token {
                    return false;
                }
                let SlotBinding::Push { request, .. } = &slot.binding else {
                    return false;
                };
                let pointer = request.descriptor.select.clone();
                let mut delivered = false;
                match result {
                    Ok(value) => match select_value(value, pointer.as_deref()) {
                        Some(value) => {
                            slot.status.set_value(value);
                            delivered = true;
                        }
                        None => slot.status.set_error(BindingError::MissingValue {
                            field,
                            pointer: pointer.unwrap_or_default(),
                        }),
                    },
                    Err(e) => slot.status.set_error(BindingError::Subscribe {
                        field,
                        message: e.to_string(),
                    }),
                }
                instance.publish();
                let refresh_on_push = instance.config.refresh.as_ref().is_some_and(|r| r.on_push);
                if delivered && refresh_on_push {
                    self.refresh(&instance_id);
                }
                true
            }
            BinderMessage::Tick { instance_id, token } => {
                match self.instances.get(&instance_id) {
                    Some(instance) if instance.timer_token == token => {
                        self.refresh(&instance_id);
                        true
                    }
                    _ => false,
                }
            }
        }
    }

    /// Observe the field statuses of an instance.
    ///
    /// The channel closes when the instance is torn down.
    pub fn watch(&self, instance_id: &InstanceId) -> Option<watch::Receiver<BindingSnapshot>> {
        self.instances
            .get(instance_id)
            .map(|instance| instance.watch_tx.subscribe())
    }

    /// Status of one field of an active instance.
    pub fn status(&self, instance_id: &InstanceId, field: &str) -> Option<&DataBindingStatus> {
        self.instances
            .get(instance_id)?
            .fields
            .get(field)
            .map(|slot| &slot.status)
    }

    /// All field statuses of an active instance.
    pub fn snapshot(&self, instance_id: &InstanceId) -> Option<BindingSnapshot> {
        self.instances.get(instance_id).map(ActiveInstance::snapshot)
    }

    /// Current value of a field, if any.
    pub fn value(&self, instance_id: &InstanceId, field: &str) -> Option<&Value> {
        self.status(instance_id, field)?.current_value.as_ref()
    }

    /// True if every required field of the instance is mapped and valid.
    pub fn is_fully_bound(&self, instance_id: &InstanceId) -> bool {
        let Some(instance) = self.instances.get(instance_id) else {
            return false;
        };
        instance
            .requirements
            .iter()
            .filter(|r| r.required)
            .all(|r| {
                instance
                    .fields
                    .get(&r.name)
                    .is_some_and(|slot| slot.status.is_bound && slot.status.is_valid)
            })
    }

    pub fn is_active(&self, instance_id: &InstanceId) -> bool {
        self.instances.contains_key(instance_id)
    }

    /// Ids of every active instance.
    pub fn active_instances(&self) -> Vec<InstanceId> {
        self.instances.keys().cloned().collect()
    }

    /// Number of requests in flight for an instance.
    pub fn in_flight(&self, instance_id: &InstanceId) -> usize {
        self.instances
            .get(instance_id)
            .map(|instance| instance.fields.values().filter(|s| s.in_flight()).count())
            .unwrap_or(0)
    }
}

impl Drop for DataBinder {
    fn drop(&mut self) {
        for instance in self.instances.values_mut() {
            instance.shutdown();
        }
    }
}
