use std::sync::Arc;

use chrono::Utc;
use fareflow_core::repository::{NotificationRepository, UserDirectory};
use fareflow_core::{
    ChannelKind, DeliveryStatus, NotificationChannel, NotificationChannels, NotificationRecord,
    OutboundNotification,
};
use tracing::{debug, info, warn};

use crate::push::room_for;
use crate::MonitorResult;

/// Result of one dispatch: the final record and what happened per channel.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub record: NotificationRecord,
    pub delivered: Vec<ChannelKind>,
    pub failed: Vec<(ChannelKind, String)>,
}

impl DispatchOutcome {
    pub fn is_sent(&self) -> bool {
        self.record.delivery_status == DeliveryStatus::Sent
    }
}

/// Channel-gated delivery. Each channel is attempted independently; the record
/// ends `sent` if any channel delivered, `failed` otherwise.
pub struct Dispatcher {
    users: Arc<dyn UserDirectory>,
    notifications: Arc<dyn NotificationRepository>,
    email: Option<Arc<dyn NotificationChannel>>,
    push: Option<Arc<dyn NotificationChannel>>,
}

impl Dispatcher {
    pub fn new(users: Arc<dyn UserDirectory>, notifications: Arc<dyn NotificationRepository>) -> Self {
        Self {
            users,
            notifications,
            email: None,
            push: None,
        }
    }

    pub fn with_email(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.email = Some(channel);
        self
    }

    pub fn with_push(mut self, channel: Arc<dyn NotificationChannel>) -> Self {
        self.push = Some(channel);
        self
    }

    pub fn notifications(&self) -> &Arc<dyn NotificationRepository> {
        &self.notifications
    }

    async fn email_destination(&self, owner_id: &str) -> Result<Option<String>, String> {
        match self.users.email_for(owner_id).await {
            Ok(Some(address)) if is_valid_email(&address) => Ok(Some(address)),
            Ok(Some(address)) => {
                debug!("Owner {} has an unusable email address '{}'", owner_id, address);
                Ok(None)
            }
            Ok(None) => Ok(None),
            Err(e) => Err(format!("user lookup failed: {}", e)),
        }
    }

    pub async fn dispatch(
        &self,
        mut record: NotificationRecord,
        channels: NotificationChannels,
    ) -> MonitorResult<DispatchOutcome> {
        self.notifications.save_notification(&record).await?;

        let mut delivered = Vec::new();
        let mut failed = Vec::new();

        if channels.email {
            if let Some(channel) = &self.email {
                match self.email_destination(&record.owner_id).await {
                    Ok(Some(address)) => {
                        let outbound = OutboundNotification::for_record(&record, address);
                        match channel.deliver(&outbound).await {
                            Ok(()) => delivered.push(ChannelKind::Email),
                            Err(e) => failed.push((ChannelKind::Email, e.to_string())),
                        }
                    }
                    Ok(None) => debug!("No email destination for {}", record.owner_id),
                    Err(reason) => failed.push((ChannelKind::Email, reason)),
                }
            }
        }

        if channels.push {
            if let Some(channel) = &self.push {
                let outbound = OutboundNotification::for_record(&record, room_for(&record.owner_id));
                match channel.deliver(&outbound).await {
                    Ok(()) => delivered.push(ChannelKind::Push),
                    Err(e) => failed.push((ChannelKind::Push, e.to_string())),
                }
            }
        }

        for (kind, reason) in &failed {
            warn!("{} delivery of notification {} failed: {}", kind, record.id, reason);
        }

        if delivered.is_empty() {
            record.mark_failed()?;
        } else {
            record.mark_sent(Utc::now())?;
            info!(
                "Notification {} ({}) sent to {} via {:?}",
                record.id,
                record.trigger_kind.as_str(),
                record.owner_id,
                delivered
            );
        }
        self.notifications.save_notification(&record).await?;

        Ok(DispatchOutcome {
            record,
            delivered,
            failed,
        })
    }
}

/// Loose shape check: one `@`, non-empty local part, dotted domain, no whitespace.
pub fn is_valid_email(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
}
