//! Queue-backed mailer.
//!
//! `send` only enqueues a `mail.send` job; delivery happens on a queue
//! worker once the queue is started.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use parking_lot::Mutex;

use crate::config::schema::{MailProvider, MailerSettings};
use crate::subsystem::{Closer, Job, Mail, Mailer, Queue, SubsystemError};

/// Queue topic carrying outgoing mail.
pub const MAIL_TOPIC: &str = "mail.send";

pub struct MemoryMailer {
    queue: Arc<dyn Queue>,
    outbox: Arc<Mutex<Vec<Mail>>>,
    closed: AtomicBool,
}

impl MemoryMailer {
    /// Register the delivery handler on `queue`.
    pub fn new(settings: &MailerSettings, queue: Arc<dyn Queue>) -> Result<Self, SubsystemError> {
        let outbox = Arc::new(Mutex::new(Vec::new()));
        let from = format!("{} <{}>", settings.from_name, settings.from_email);
        let provider = settings.provider;

        let delivered = outbox.clone();
        queue.register(
            MAIL_TOPIC,
            Arc::new(move |job: Job| {
                let delivered = delivered.clone();
                let from = from.clone();
                async move {
                    let mail: Mail = serde_json::from_value(job.payload)
                        .map_err(|e| SubsystemError::Backend(Box::new(e)))?;
                    tracing::info!(
                        provider = provider_name(provider),
                        from = %from,
                        to = ?mail.to,
                        subject = %mail.subject,
                        "Mail delivered"
                    );
                    delivered.lock().push(mail);
                    Ok(())
                }
                .boxed()
            }),
        )?;

        Ok(Self {
            queue,
            outbox,
            closed: AtomicBool::new(false),
        })
    }

    /// Mail handed off by the delivery handler so far.
    pub fn delivered(&self) -> Vec<Mail> {
        self.outbox.lock().clone()
    }
}

fn provider_name(provider: MailProvider) -> &'static str {
    match provider {
        MailProvider::Smtp => "smtp",
        MailProvider::Resend => "resend",
        MailProvider::Ses => "ses",
    }
}

#[async_trait]
impl Mailer for MemoryMailer {
    async fn send(&self, mail: Mail) -> Result<(), SubsystemError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SubsystemError::Closed);
        }
        if mail.to.is_empty() {
            return Err(SubsystemError::Rejected("mail has no recipients".to_string()));
        }
        let payload = serde_json::to_value(&mail).map_err(|e| SubsystemError::Backend(Box::new(e)))?;
        self.queue.enqueue(Job::new(MAIL_TOPIC, payload)).await
    }
}

#[async_trait]
impl Closer for MemoryMailer {
    async fn close(&self) -> Result<(), SubsystemError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}
