//! Guardian notifier: urgency-driven fan-out with per-channel concurrency
//! limits and retry.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use shield_types::{DeliveryMethod, GuardianId, Urgency};
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::channel::{GuardianContact, NotificationChannel};
use crate::config::NotifierConfig;
use crate::error::{NotifyError, NotifyResult};
use crate::retry::RetryPolicy;
use crate::template::{MessageContent, Template, TemplateData};

/// Placeholder filled with each recipient's name.
pub const GUARDIAN_NAME_KEY: &str = "guardianName";

/// Channels attempted for each urgency. Email is always included.
pub fn channels_for(urgency: Urgency) -> &'static [DeliveryMethod] {
    match urgency {
        Urgency::Critical => &[DeliveryMethod::Email, DeliveryMethod::Sms, DeliveryMethod::Push],
        Urgency::High => &[DeliveryMethod::Email, DeliveryMethod::Sms],
        Urgency::Medium | Urgency::Low => &[DeliveryMethod::Email],
    }
}

/// One notification fan-out.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub urgency: Urgency,
    /// Used for email.
    pub template: Template,
    /// Used for SMS and push. Falls back to `template` when absent.
    pub short_template: Option<Template>,
    /// Values shared by every recipient. `guardianName` is filled per recipient.
    pub data: TemplateData,
    pub recipients: Vec<GuardianContact>,
}

/// A channel that did not deliver to a guardian.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub guardian_id: GuardianId,
    pub method: DeliveryMethod,
    pub error: String,
    pub attempts: u32,
}

/// Per-guardian delivery result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianDelivery {
    pub guardian_id: GuardianId,
    pub succeeded: Vec<DeliveryMethod>,
    pub failed: Vec<DeliveryMethod>,
    /// Selected for the urgency, but the guardian has no address for it.
    pub skipped: Vec<DeliveryMethod>,
}

impl GuardianDelivery {
    fn new(guardian_id: GuardianId) -> Self {
        Self {
            guardian_id,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    /// At least one channel got through.
    pub fn reached(&self) -> bool {
        !self.succeeded.is_empty()
    }
}

/// Aggregate result of a fan-out. Channel failures are reported here
/// rather than aborting the batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOutcome {
    /// In recipient order.
    pub deliveries: Vec<GuardianDelivery>,
    /// True when any attempted channel failed.
    pub partial: bool,
    pub failures: Vec<DeliveryFailure>,
}

impl NotificationOutcome {
    pub fn delivery_for(&self, guardian_id: &GuardianId) -> Option<&GuardianDelivery> {
        self.deliveries.iter().find(|d| &d.guardian_id == guardian_id)
    }

    /// No guardian was reached on any channel.
    pub fn nobody_reached(&self) -> bool {
        !self.deliveries.iter().any(GuardianDelivery::reached)
    }
}

struct ChannelSlot {
    channel: Arc<dyn NotificationChannel>,
    permits: Arc<Semaphore>,
    retry: RetryPolicy,
}

/// Fans notifications out to guardians over the registered channels.
pub struct GuardianNotifier {
    config: NotifierConfig,
    slots: BTreeMap<DeliveryMethod, ChannelSlot>,
}

struct Job<'a> {
    recipient: usize,
    method: DeliveryMethod,
    target: &'a str,
    content: &'a MessageContent,
}

impl GuardianNotifier {
    pub fn new(config: NotifierConfig) -> Self {
        Self {
            config,
            slots: BTreeMap::new(),
        }
    }

    /// Register a channel, replacing any previous one for the same method.
    pub fn with_channel(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        let method = channel.method();
        let slot = ChannelSlot {
            channel,
            permits: Arc::new(Semaphore::new(self.config.max_in_flight_per_channel.max(1))),
            retry: self.config.retry_for(method).clone(),
        };
        self.slots.insert(method, slot);
        self
    }

    pub fn has_channel(&self, method: DeliveryMethod) -> bool {
        self.slots.contains_key(&method)
    }

    /// Deliver `request` to every recipient.
    ///
    /// Every message is rendered before anything is sent, so a template
    /// error fails the call without contacting anyone.
    #[instrument(
        skip(self, request),
        fields(urgency = %request.urgency, recipients = request.recipients.len())
    )]
    pub async fn notify_guardians(
        &self,
        request: &NotificationRequest,
    ) -> NotifyResult<NotificationOutcome> {
        let mut rendered = Vec::with_capacity(request.recipients.len());
        for contact in &request.recipients {
            let mut data = request.data.clone();
            data.entry(GUARDIAN_NAME_KEY.to_string())
                .or_insert_with(|| contact.name.clone());
            let full = request.template.render(&data)?;
            let short = match &request.short_template {
                Some(template) => template.render(&data)?,
                None => full.clone(),
            };
            rendered.push((full, short));
        }

        let mut deliveries = request
            .recipients
            .iter()
            .map(|c| GuardianDelivery::new(c.guardian_id.clone()))
            .collect::<Vec<_>>();
        let mut failures = Vec::new();
        let mut jobs = Vec::new();

        for (idx, contact) in request.recipients.iter().enumerate() {
            for &method in channels_for(request.urgency) {
                let Some(target) = contact.target(method) else {
                    if method == DeliveryMethod::Email {
                        deliveries[idx].failed.push(method);
                        failures.push(DeliveryFailure {
                            guardian_id: contact.guardian_id.clone(),
                            method,
                            error: "guardian has no email address".to_string(),
                            attempts: 0,
                        });
                    } else {
                        deliveries[idx].skipped.push(method);
                    }
                    continue;
                };
                if !self.slots.contains_key(&method) {
                    deliveries[idx].failed.push(method);
                    failures.push(DeliveryFailure {
                        guardian_id: contact.guardian_id.clone(),
                        method,
                        error: NotifyError::ChannelNotConfigured(method).to_string(),
                        attempts: 0,
                    });
                    continue;
                }
                let (full, short) = &rendered[idx];
                let content = if method == DeliveryMethod::Email { full } else { short };
                jobs.push(Job {
                    recipient: idx,
                    method,
                    target,
                    content,
                });
            }
        }

        debug!(jobs = jobs.len(), "dispatching deliveries");
        let results = join_all(jobs.into_iter().map(|job| self.deliver(job))).await;

        for (recipient, method, result, attempts) in results {
            let delivery = &mut deliveries[recipient];
            match result {
                Ok(()) => delivery.succeeded.push(method),
                Err(err) => {
                    warn!(
                        guardian_id = %delivery.guardian_id,
                        channel = %method,
                        attempts,
                        error = %err,
                        "guardian notification failed"
                    );
                    delivery.failed.push(method);
                    failures.push(DeliveryFailure {
                        guardian_id: delivery.guardian_id.clone(),
                        method,
                        error: err.to_string(),
                        attempts,
                    });
                }
            }
        }

        for delivery in &mut deliveries {
            delivery.succeeded.sort();
            delivery.failed.sort();
        }

        let outcome = NotificationOutcome {
            partial: !failures.is_empty(),
            deliveries,
            failures,
        };
        info!(
            reached = outcome.deliveries.iter().filter(|d| d.reached()).count(),
            failures = outcome.failures.len(),
            "guardian notification batch complete"
        );
        Ok(outcome)
    }

    async fn deliver(
        &self,
        job: Job<'_>,
    ) -> (usize, DeliveryMethod, NotifyResult<()>, u32) {
        let Some(slot) = self.slots.get(&job.method) else {
            return (
                job.recipient,
                job.method,
                Err(NotifyError::ChannelNotConfigured(job.method)),
                0,
            );
        };

        let (channel, permits) = (&slot.channel, &slot.permits);
        let (method, target, content) = (job.method, job.target, job.content);
        let (result, attempts) = slot
            .retry
            .run(move |_| async move {
                // permit is released between attempts so backoff does not hold a slot
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| NotifyError::permanent(method, "channel closed"))?;
                channel.send(target, content).await
            })
            .await;

        (job.recipient, job.method, result, attempts)
    }
}
