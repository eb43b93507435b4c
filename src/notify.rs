//! Progress notifications to an optional listener.
//!
//! When a notify URL is configured the scraper POSTs a JSON [`Notification`] after each
//! stage. A listener that is configured but not running is reported separately from
//! other failures so callers can downgrade it to an informational message.

use std::error::Error as StdError;

use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("listener is configured but not running")]
    ConfiguredButNotRunning,

    #[error("sending notification: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("listener responded with {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("marshalling message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// What happened
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum NotificationMessage {
    StageUpdated,
}

/// Where the index stood when the message was sent
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationMeta {
    pub chain: String,
    pub head: u64,
    pub unripe_distance: u64,
}

#[derive(Serialize, Debug, Clone)]
pub struct Notification<T> {
    pub msg: NotificationMessage,
    pub meta: NotificationMeta,
    pub payload: T,
}

/// Summary payload sent after a scrape run
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StagePayload {
    pub first_block: u64,
    pub last_block: u64,
    pub ripe_files: usize,
    pub unripe_files: usize,
}

pub struct Notifier {
    client: Client,
    endpoint: Option<String>,
}

impl Notifier {
    #[must_use]
    pub fn new(endpoint: Option<String>) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.filter(|url| !url.is_empty()),
        }
    }

    /// A notifier that never sends anything
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(None)
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.endpoint.is_some()
    }

    /// Posts the notification. Does nothing when no endpoint is configured.
    pub async fn notify<T: Serialize + Sync>(
        &self,
        notification: &Notification<T>,
    ) -> Result<(), NotifyError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Ok(());
        };

        let encoded = serde_json::to_vec(notification)?;
        let response = self
            .client
            .post(endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(encoded)
            .send()
            .await
            .map_err(|e| {
                if is_connection_refused(&e) {
                    NotifyError::ConfiguredButNotRunning
                } else {
                    NotifyError::Transport(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(NotifyError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!("[notify] {:?} delivered to {}", notification.msg, endpoint);
        Ok(())
    }
}

fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn StdError + 'static)> = err.source();
    while let Some(cause) = source {
        if let Some(io) = cause.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::ConnectionRefused {
                return true;
            }
        }
        source = cause.source();
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Router};
    use tokio::net::TcpListener;

    fn sample() -> Notification<StagePayload> {
        Notification {
            msg: NotificationMessage::StageUpdated,
            meta: NotificationMeta {
                chain: "mainnet".to_string(),
                head: 120,
                unripe_distance: 28,
            },
            payload: StagePayload {
                first_block: 100,
                last_block: 120,
                ripe_files: 3,
                unripe_files: 2,
            },
        }
    }

    async fn serve(status: StatusCode) -> String {
        let app = Router::new().route("/", post(move || async move { (status, "nope") }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[test]
    fn test_notification_wire_shape() {
        let value = serde_json::to_value(sample()).unwrap();
        assert_eq!(value["msg"], "stageUpdated");
        assert_eq!(value["meta"]["unripeDistance"], 28);
        assert_eq!(value["payload"]["ripeFiles"], 3);
    }

    #[tokio::test]
    async fn test_unset_url_is_a_no_op() {
        let notifier = Notifier::new(Some(String::new()));
        assert!(!notifier.is_enabled());
        notifier.notify(&sample()).await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_means_not_running() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let notifier = Notifier::new(Some(format!("http://{addr}/")));
        let err = notifier.notify(&sample()).await.unwrap_err();
        assert!(matches!(err, NotifyError::ConfiguredButNotRunning), "{err}");
    }

    #[tokio::test]
    async fn test_non_success_status_is_rejected() {
        let url = serve(StatusCode::INTERNAL_SERVER_ERROR).await;
        let err = Notifier::new(Some(url)).notify(&sample()).await.unwrap_err();
        match err {
            NotifyError::Rejected { status, body } => {
                assert_eq!(status, 500);
                assert_eq!(body, "nope");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_success_status_is_delivered() {
        let url = serve(StatusCode::OK).await;
        Notifier::new(Some(url)).notify(&sample()).await.unwrap();
    }
}
