//! Request/response calls against the Chatline HTTP API.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use shared::models::{
    AddMemberRequest, ConversationRef, CreateGroupRequest, ErrorResponse, Group, GroupId, Message,
    MessageBody, MessageId, ReactionRequest, UserId,
};
use tracing::debug;
use url::Url;

use crate::{
    error::{ClientError, ClientResult},
    optimistic::MutationKind,
};

/// Header carrying the caller's identity.
pub const IDENTITY_HEADER: &str = "x-user-id";

/// Chat operations consumed by the session driver.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// History of `conversation`, oldest first.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    async fn history(&self, conversation: ConversationRef) -> ClientResult<Vec<Message>>;

    /// Sends `body` to `conversation` and returns the stored message.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    async fn send(&self, conversation: ConversationRef, body: MessageBody) -> ClientResult<Message>;

    /// Performs `kind` on a message and returns the authoritative snapshot.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    async fn mutate(&self, message: MessageId, kind: &MutationKind) -> ClientResult<Message>;

    /// Groups the caller belongs to.
    ///
    /// # Errors
    /// Returns an error if the request fails.
    async fn list_groups(&self) -> ClientResult<Vec<Group>>;
}

/// [`ChatApi`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpChatApi {
    client: Client,
    base: Url,
    user: UserId,
}

impl HttpChatApi {
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base: Url, user: UserId) -> ClientResult<Self> {
        let client = Client::builder().user_agent("chatline-client").build()?;
        Ok(Self { client, base, user })
    }

    /// Creates a group with the caller as admin.
    ///
    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    pub async fn create_group(&self, name: &str, member_ids: Vec<UserId>) -> ClientResult<Group> {
        let request = CreateGroupRequest {
            name: name.to_owned(),
            member_ids,
        };
        let url = self.endpoint("api/groups")?;
        decode(self.authorized(self.client.post(url)).json(&request)).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    pub async fn add_member(&self, group: GroupId, member_id: UserId) -> ClientResult<Group> {
        let url = self.endpoint(&format!("api/groups/{group}/members"))?;
        let request = AddMemberRequest { member_id };
        decode(self.authorized(self.client.post(url)).json(&request)).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    pub async fn remove_member(&self, group: GroupId, member_id: UserId) -> ClientResult<Group> {
        let url = self.endpoint(&format!("api/groups/{group}/members/{member_id}"))?;
        decode(self.authorized(self.client.delete(url))).await
    }

    /// # Errors
    /// Returns an error if the request fails or the server rejects it.
    pub async fn delete_group(&self, group: GroupId) -> ClientResult<()> {
        let url = self.endpoint(&format!("api/groups/{group}"))?;
        let response = self.authorized(self.client.delete(url)).send().await?;
        check(response).await.map(drop)
    }

    fn endpoint(&self, path: &str) -> ClientResult<Url> {
        Ok(self.base.join(path)?)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header(IDENTITY_HEADER, self.user.to_string())
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn history(&self, conversation: ConversationRef) -> ClientResult<Vec<Message>> {
        let path = match conversation {
            ConversationRef::Direct(peer) => format!("api/messages/{peer}"),
            ConversationRef::Group(group) => format!("api/groups/{group}/messages"),
        };
        debug!(%conversation, "fetching history");
        decode(self.authorized(self.client.get(self.endpoint(&path)?))).await
    }

    async fn send(&self, conversation: ConversationRef, body: MessageBody) -> ClientResult<Message> {
        let path = match conversation {
            ConversationRef::Direct(peer) => format!("api/messages/send/{peer}"),
            ConversationRef::Group(group) => format!("api/groups/{group}/messages"),
        };
        decode(self.authorized(self.client.post(self.endpoint(&path)?)).json(&body)).await
    }

    async fn mutate(&self, message: MessageId, kind: &MutationKind) -> ClientResult<Message> {
        let request = match kind {
            MutationKind::React(emoji) => self
                .client
                .post(self.endpoint(&format!("api/messages/{message}/reactions"))?)
                .json(&ReactionRequest {
                    emoji: emoji.clone(),
                }),
            MutationKind::Unreact => self
                .client
                .delete(self.endpoint(&format!("api/messages/{message}/reactions"))?),
            MutationKind::MarkRead => self
                .client
                .post(self.endpoint(&format!("api/messages/{message}/read"))?),
        };
        decode(self.authorized(request)).await
    }

    async fn list_groups(&self) -> ClientResult<Vec<Group>> {
        decode(self.authorized(self.client.get(self.endpoint("api/groups")?))).await
    }
}

async fn decode<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = check(request.send().await?).await?;
    Ok(response.json().await?)
}

/// Passes successful responses through and turns the rest into [`ClientError`].
async fn check(response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    let problem = serde_json::from_str::<ErrorResponse>(&text).unwrap_or_else(|_| ErrorResponse {
        code: status.as_str().to_owned(),
        message: if text.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_owned()
        } else {
            text
        },
    });
    Err(ClientError::from_problem(status.as_u16(), problem))
}
