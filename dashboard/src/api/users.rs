use tracing::info;

use super::Api;
use crate::error::Result;
use crate::types::{Ack, UserForm, UserRecord};

impl Api {
    pub async fn fetch_users(&self) -> Result<Vec<UserRecord>> {
        self.read("fetch_users", "/users").await
    }

    pub async fn create_user(&self, form: &UserForm) -> Result<Ack> {
        let ack = self.transport.post("/users", form).await?;
        info!(username = %form.username, role = ?form.role, "User created");
        Ok(ack)
    }

    pub async fn update_user(&self, user_id: i64, form: &UserForm) -> Result<Ack> {
        let ack = self.transport.put(&format!("/users/{user_id}"), form).await?;
        info!(user_id, "User updated");
        Ok(ack)
    }

    pub async fn delete_user(&self, user_id: i64) -> Result<Ack> {
        let ack = self.transport.delete(&format!("/users/{user_id}")).await?;
        info!(user_id, "User deleted");
        Ok(ack)
    }
}
