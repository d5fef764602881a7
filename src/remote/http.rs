#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    io::Read,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use reqwest::{
    StatusCode,
    blocking::{Client, RequestBuilder, Response, multipart::Form},
};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use super::{AttemptDetail, GradeSubmission, RemoteClient, RemoteError};
use crate::{
    config::Settings,
    gradebook::{Gradebook, GroupMemberships},
};

/// Talks to the platform's JSON endpoints with a bearer token.
pub struct HttpRemote {
    /// Shared blocking client.
    client:   Client,
    /// API root, without trailing slash.
    base_url: String,
    /// Course the endpoints are scoped to.
    course:   String,
    /// Login used for error messages.
    username: String,
    /// Bearer token, if any.
    token:    Option<String>,
    /// Directory receiving unparseable responses.
    dump_dir: PathBuf,
}

impl HttpRemote {
    /// Builds a client for the course and login in `settings`.
    pub fn new(settings: &Settings, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .context("Failed to construct HTTP client")?;
        let dump_dir = settings
            .state_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Ok(Self {
            client,
            base_url: settings.base_url().trim_end_matches('/').to_owned(),
            course: settings.course().to_owned(),
            username: settings.username().to_owned(),
            token,
            dump_dir,
        })
    }

    /// Absolute URL of a course-scoped endpoint.
    fn url(&self, path: &str) -> String {
        format!("{}/courses/{}/{}", self.base_url, self.course, path)
    }

    /// Attaches credentials to a request.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Sends a request and maps connection and status failures.
    fn send(&self, request: RequestBuilder, context: &str) -> Result<Response, RemoteError> {
        let response = self
            .authorize(request)
            .send()
            .map_err(|e| RemoteError::Transport(format!("{context}: {e}")))?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(RemoteError::BadCredentials {
                username: self.username.clone(),
            }),
            status if status.is_success() => Ok(response),
            status => {
                let body = response.text().unwrap_or_default();
                if status.is_server_error() {
                    Err(RemoteError::Transport(format!("{context}: HTTP {status}")))
                } else {
                    Err(self.parse_failure(context, &body))
                }
            }
        }
    }

    /// Fetches and decodes a JSON document.
    fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> Result<T, RemoteError> {
        let request = self.client.get(self.url(path)).query(query);
        let body = self
            .send(request, context)?
            .text()
            .map_err(|e| RemoteError::Transport(format!("{context}: {e}")))?;

        serde_json::from_str(&body).map_err(|e| {
            tracing::debug!("Could not decode response while {context}: {e}");
            self.parse_failure(context, &body)
        })
    }

    /// Saves `body` for offline diagnosis and builds the parse error.
    fn parse_failure(&self, context: &str, body: &str) -> RemoteError {
        let saved = self
            .dump_dir
            .join(format!("remote-error-{}.txt", Uuid::new_v4()));
        if let Err(e) = fs::write(&saved, body) {
            tracing::warn!("Could not save response to {}: {e}", saved.display());
        }
        RemoteError::Parse {
            context: context.to_owned(),
            saved,
        }
    }
}

impl RemoteClient for HttpRemote {
    fn fetch_gradebook(&self) -> Result<Gradebook, RemoteError> {
        self.get_json("gradebook", &[], "fetching the gradebook")
    }

    fn fetch_attempt_detail(
        &self,
        attempt_id: &str,
        group: bool,
    ) -> Result<AttemptDetail, RemoteError> {
        self.get_json(
            &format!("attempts/{attempt_id}"),
            &[("group", group.to_string())],
            &format!("fetching attempt {attempt_id}"),
        )
    }

    fn open_download(&self, link: &str) -> Result<Box<dyn Read + '_>, RemoteError> {
        let response = self.send(self.client.get(link), &format!("downloading {link}"))?;
        Ok(Box::new(response))
    }

    fn submit_grade(&self, submission: &GradeSubmission) -> Result<(), RemoteError> {
        let mut form = Form::new()
            .text("score", submission.score.to_string())
            .text("feedback", submission.feedback.clone())
            .text("group", submission.group.to_string());
        for path in &submission.attachments {
            form = form
                .file("attachments", path)
                .map_err(|source| RemoteError::Attachment {
                    path: path.clone(),
                    source,
                })?;
        }

        let request = self
            .client
            .post(self.url(&format!("attempts/{}/grade", submission.attempt_id)))
            .multipart(form);
        self.send(request, &format!("submitting a grade for {}", submission.attempt_id))?;
        Ok(())
    }

    fn fetch_group_memberships(&self) -> Result<GroupMemberships, RemoteError> {
        self.get_json("groups", &[], "fetching group memberships")
    }
}
