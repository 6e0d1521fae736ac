//! Fire-and-forget customer and driver notifications.
//!
//! Every send is spawned onto the runtime. A missing device token, a
//! missing contact or a provider failure is logged and swallowed; none of
//! it can fail or roll back the state change that triggered it.

use std::sync::Arc;

use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::services::fcm_service::{PushNotifier, CLICK_ACTION};
use crate::services::sms_service::MessageDispatcher;
use crate::store::UserDirectoryRef;

#[derive(Debug, Clone)]
pub struct PushNotice {
    pub title: String,
    pub body: String,
    pub data: Value,
}

impl PushNotice {
    pub fn new(title: impl Into<String>, body: impl Into<String>, data: Value) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data,
        }
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    push: Arc<dyn PushNotifier>,
    messages: Arc<dyn MessageDispatcher>,
    users: UserDirectoryRef,
}

impl NotificationDispatcher {
    pub fn new(
        push: Arc<dyn PushNotifier>,
        messages: Arc<dyn MessageDispatcher>,
        users: UserDirectoryRef,
    ) -> Self {
        Self {
            push,
            messages,
            users,
        }
    }

    /// Pushes `notice` to the user's registered device, if any.
    pub fn push_to_user(&self, user_id: &str, notice: PushNotice) -> JoinHandle<()> {
        let push = self.push.clone();
        let users = self.users.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let contact = match users.contact(&user_id).await {
                Ok(Some(contact)) => contact,
                Ok(None) => {
                    debug!("No contact record for user {}, skipping push", user_id);
                    return;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Contact lookup failed, skipping push");
                    return;
                }
            };

            let Some(token) = contact.push_token() else {
                debug!("User {} has no device token, skipping push", user_id);
                return;
            };

            match push
                .send_to_device(token, &notice.title, &notice.body, notice.data, CLICK_ACTION)
                .await
            {
                Ok(()) => info!("📲 Push '{}' delivered to user {}", notice.title, user_id),
                Err(e) => warn!(user_id = %user_id, error = %e, "Push delivery failed"),
            }
        })
    }

    /// Texts the user's phone number on record, if any.
    pub fn sms_user(&self, user_id: &str, message: String) -> JoinHandle<()> {
        let messages = self.messages.clone();
        let users = self.users.clone();
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let phone = match users.contact(&user_id).await {
                Ok(Some(contact)) => contact.phone.filter(|p| !p.trim().is_empty()),
                Ok(None) => None,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Contact lookup failed, skipping SMS");
                    return;
                }
            };

            let Some(phone) = phone else {
                debug!("User {} has no phone number, skipping SMS", user_id);
                return;
            };

            if let Err(e) = messages.send_sms(&phone, &message).await {
                warn!(user_id = %user_id, error = %e, "SMS delivery failed");
            }
        })
    }

    pub fn email(&self, to: &str, subject: String, body: String) -> JoinHandle<()> {
        let messages = self.messages.clone();
        let to = to.to_string();

        tokio::spawn(async move {
            match messages.send_email(&to, &subject, &body).await {
                Ok(()) => info!("📧 Email '{}' sent to {}", subject, to),
                Err(e) => warn!(to = %to, error = %e, "Email delivery failed"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AppError, Result};
    use crate::models::user::UserContact;
    use crate::store::in_memory::InMemoryUserDirectory;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        pushes: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PushNotifier for Recorder {
        async fn send_to_device(
            &self,
            token: &str,
            _title: &str,
            _body: &str,
            _data: Value,
            _click_action: &str,
        ) -> Result<()> {
            self.pushes.lock().unwrap().push(token.to_string());
            Ok(())
        }
    }

    struct FailingMessages;

    #[async_trait]
    impl MessageDispatcher for FailingMessages {
        async fn send_sms(&self, _phone: &str, _message: &str) -> Result<()> {
            Err(AppError::gateway("sms down", true))
        }

        async fn send_email(&self, _to: &str, _subject: &str, _body: &str) -> Result<()> {
            Err(AppError::gateway("mail down", true))
        }
    }

    #[tokio::test]
    async fn push_goes_to_the_registered_token_only() {
        let users = Arc::new(InMemoryUserDirectory::new());
        users
            .upsert(UserContact {
                user_id: "u1".into(),
                device_token: Some("tok-1".into()),
                ..Default::default()
            })
            .await;
        users
            .upsert(UserContact {
                user_id: "u2".into(),
                device_token: None,
                ..Default::default()
            })
            .await;

        let recorder = Arc::new(Recorder::default());
        let dispatcher = NotificationDispatcher::new(recorder.clone(), Arc::new(FailingMessages), users);

        dispatcher
            .push_to_user("u1", PushNotice::new("t", "b", json!({})))
            .await
            .unwrap();
        dispatcher
            .push_to_user("u2", PushNotice::new("t", "b", json!({})))
            .await
            .unwrap();
        dispatcher
            .push_to_user("nobody", PushNotice::new("t", "b", json!({})))
            .await
            .unwrap();

        assert_eq!(*recorder.pushes.lock().unwrap(), vec!["tok-1".to_string()]);
    }

    #[tokio::test]
    async fn provider_failures_do_not_panic_the_task() {
        let users = Arc::new(InMemoryUserDirectory::new());
        users
            .upsert(UserContact {
                user_id: "u1".into(),
                phone: Some("0551234567".into()),
                ..Default::default()
            })
            .await;
        let dispatcher =
            NotificationDispatcher::new(Arc::new(Recorder::default()), Arc::new(FailingMessages), users);

        assert!(dispatcher.sms_user("u1", "hello".into()).await.is_ok());
        assert!(dispatcher
            .email("a@example.com", "s".into(), "b".into())
            .await
            .is_ok());
    }
}
