//! Endpoint surface of the task service.
//!
//! Thin request builders over [`Gateway::send_authorized`]; every body type
//! here mirrors the service schema. The pomodoro-increment call is the only
//! one wrapped in backoff (the timer fires unattended), and logout is the
//! only call whose server-side failure is deliberately swallowed.

use pomokan_types::{
    ApiError, Credential, PasswordChange, RegisterUser, Todo, TodoDraft, TodoId, TodoPatch, User,
};
use serde::Serialize;

use crate::gateway::Gateway;
use crate::retry;

#[derive(Serialize)]
struct BatchDeleteRequest<'a> {
    todo_ids: &'a [TodoId],
}

impl Gateway {
    /// POST `/auth/` - create an account.
    pub async fn register(&self, user: &RegisterUser) -> Result<(), ApiError> {
        let url = self.endpoint("/auth/");
        self.send_plain(|| self.http().post(url.clone()).json(user))
            .await?;
        Ok(())
    }

    /// POST `/auth/token` - log in with form-encoded credentials and store
    /// the returned pair.
    pub async fn login(&self, email: &str, password: &str) -> Result<(), ApiError> {
        let url = self.endpoint("/auth/token");
        let response = self
            .send_plain(|| {
                self.http()
                    .post(url.clone())
                    .form(&[("username", email), ("password", password)])
            })
            .await?;

        #[derive(serde::Deserialize)]
        struct TokenResponse {
            access_token: String,
            refresh_token: String,
        }
        let pair: TokenResponse = response.json().await.map_err(|e| ApiError::Transport {
            message: e.to_string(),
        })?;
        self.mark_logged_in(Credential::new(pair.access_token, pair.refresh_token));
        Ok(())
    }

    /// POST `/auth/logout` - best-effort server notification; the local pair
    /// is cleared no matter what the server says.
    pub async fn logout(&self) {
        let url = self.endpoint("/auth/logout");
        if let Err(err) = self
            .send_authorized(|| self.http().post(url.clone()))
            .await
        {
            tracing::debug!(%err, "Server-side logout failed; clearing local session anyway");
        }
        self.credentials().clear();
    }

    /// GET `/users/me`.
    pub async fn current_user(&self) -> Result<User, ApiError> {
        let url = self.endpoint("/users/me");
        let response = self.send_authorized(|| self.http().get(url.clone())).await?;
        decode(response).await
    }

    /// PUT `/users/change-password`.
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        let url = self.endpoint("/users/change-password");
        self.send_authorized(|| self.http().put(url.clone()).json(change))
            .await?;
        Ok(())
    }

    /// GET `/todos/` - the full collection.
    pub async fn list_todos(&self) -> Result<Vec<Todo>, ApiError> {
        let url = self.endpoint("/todos/");
        let response = self.send_authorized(|| self.http().get(url.clone())).await?;
        decode(response).await
    }

    /// GET `/todos/{id}`.
    pub async fn get_todo(&self, id: TodoId) -> Result<Todo, ApiError> {
        let url = self.endpoint(&format!("/todos/{id}"));
        let response = self.send_authorized(|| self.http().get(url.clone())).await?;
        decode(response).await
    }

    /// POST `/todos/` - returns the server-assigned entity.
    pub async fn create_todo(&self, draft: &TodoDraft) -> Result<Todo, ApiError> {
        let url = self.endpoint("/todos/");
        let response = self
            .send_authorized(|| self.http().post(url.clone()).json(draft))
            .await?;
        decode(response).await
    }

    /// PATCH `/todos/{id}` - partial update; returns the canonical row.
    pub async fn patch_todo(&self, id: TodoId, patch: &TodoPatch) -> Result<Todo, ApiError> {
        let url = self.endpoint(&format!("/todos/{id}"));
        let response = self
            .send_authorized(|| self.http().patch(url.clone()).json(patch))
            .await?;
        decode(response).await
    }

    /// DELETE `/todos/{id}`.
    pub async fn delete_todo(&self, id: TodoId) -> Result<(), ApiError> {
        let url = self.endpoint(&format!("/todos/{id}"));
        self.send_authorized(|| self.http().delete(url.clone()))
            .await?;
        Ok(())
    }

    /// DELETE `/todos/delete-batch` with `{"todo_ids": [...]}`.
    pub async fn delete_batch(&self, ids: &[TodoId]) -> Result<(), ApiError> {
        let url = self.endpoint("/todos/delete-batch");
        self.send_authorized(|| {
            self.http()
                .delete(url.clone())
                .json(&BatchDeleteRequest { todo_ids: ids })
        })
        .await?;
        Ok(())
    }

    /// PUT `/todos/{id}/increment-pomodoro`, retried with exponential backoff
    /// while the service is transiently unavailable.
    pub async fn increment_pomodoro(&self, id: TodoId) -> Result<Todo, ApiError> {
        retry::with_backoff(self.retry_config(), || async move {
            let url = self.endpoint(&format!("/todos/{id}/increment-pomodoro"));
            let response = self.send_authorized(|| self.http().put(url.clone())).await?;
            decode(response).await
        })
        .await
    }

    /// GET `/health/db` - best-effort warm-up issued shortly before a
    /// pomodoro completes, so the increment lands on a live connection.
    pub async fn warm_up(&self) {
        let url = self.endpoint("/health/db");
        if let Err(err) = self.send_plain(|| self.http().get(url.clone())).await {
            tracing::debug!(%err, "Database warm-up failed; increment retry will cover it");
        }
    }
}

async fn decode<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    response.json().await.map_err(|e| ApiError::Transport {
        message: e.to_string(),
    })
}
