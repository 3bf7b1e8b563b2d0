use serde::Serialize;

use super::Api;
use crate::error::Result;
use crate::types::{Ack, NotificationPage};

#[derive(Serialize)]
struct Page {
    start: u32,
    limit: u32,
}

impl Api {
    pub async fn fetch_unread_notifications(&self, start: u32, limit: u32) -> Result<NotificationPage> {
        self.read_with_query(
            "fetch_unread_notifications",
            "/notifications/unread",
            &Page { start, limit },
        )
        .await
    }

    pub async fn mark_notification_as_seen(&self, notification_id: i64) -> Result<Ack> {
        let path = format!("/notifications/{notification_id}/seen");
        self.transport.post(&path, &serde_json::json!({})).await
    }
}
