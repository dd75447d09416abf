use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::error::{PlannerError, PlannerResult};
use crate::forms::{PlanDraft, PostForm, ProfileForm};
use crate::models::{Comment, Post, Schedule, User, UserSummary};
use crate::session::Session;

#[derive(Debug, Serialize)]
struct LoginRequestDto<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct JoinRequestDto<'a> {
    email: &'a str,
    password: &'a str,
    nick: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyEmailRequestDto<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InviteRequestDto {
    owner_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AcceptInviteRequestDto<'a> {
    invite_code: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdatePostRequestDto<'a> {
    title: &'a str,
    description: &'a str,
    #[serde(rename = "tripId", skip_serializing_if = "Option::is_none")]
    trip_id: Option<i64>,
}

#[derive(Debug, Serialize)]
struct CommentRequestDto<'a> {
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ErrorResponseDto {
    message: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponseDto {
    #[serde(alias = "accessToken", alias = "access_token")]
    token: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponseDto {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InviteResponseDto {
    #[serde(alias = "link", alias = "url")]
    invite_link: String,
}

#[derive(Debug, Deserialize)]
struct AcceptInviteResponseDto {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "trip")]
    plan: Option<ScheduleDto>,
}

#[derive(Debug, Deserialize)]
struct LikeResponseDto {
    #[serde(default)]
    likes: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct UserSummaryDto {
    id: i64,
    nick: String,
    #[serde(default)]
    profile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UserDto {
    id: i64,
    nick: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    profile: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleDto {
    id: i64,
    title: String,
    destination: String,
    #[serde(deserialize_with = "wire_date::deserialize")]
    start_date: DateTime<Utc>,
    #[serde(deserialize_with = "wire_date::deserialize")]
    end_date: DateTime<Utc>,
    #[serde(default)]
    photo_url: Option<String>,
    #[serde(alias = "ownerId")]
    owner: i64,
    #[serde(default)]
    guests: Vec<UserSummaryDto>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostDto {
    id: i64,
    title: String,
    #[serde(alias = "description")]
    content: String,
    author: UserSummaryDto,
    #[serde(deserialize_with = "wire_date::deserialize")]
    created_at: DateTime<Utc>,
    #[serde(default)]
    likes: u32,
    #[serde(default)]
    trip_id: Option<i64>,
    #[serde(default)]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommentDto {
    id: i64,
    content: String,
    author: UserSummaryDto,
    #[serde(deserialize_with = "wire_date::deserialize")]
    created_at: DateTime<Utc>,
}

/// Даты с сервера приходят то как `YYYY-MM-DD`, то как полный timestamp.
pub(crate) mod wire_date {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub(crate) fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(value) = DateTime::parse_from_rfc3339(raw) {
            return Some(value.with_timezone(&Utc));
        }
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(value.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|value| value.and_utc())
    }

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid date '{raw}'")))
    }
}

impl From<UserSummaryDto> for UserSummary {
    fn from(value: UserSummaryDto) -> Self {
        Self {
            id: value.id,
            nick: value.nick,
            profile: value.profile,
        }
    }
}

impl From<UserDto> for User {
    fn from(value: UserDto) -> Self {
        Self {
            id: value.id,
            nick: value.nick,
            email: value.email,
            profile: value.profile,
        }
    }
}

impl From<ScheduleDto> for Schedule {
    fn from(value: ScheduleDto) -> Self {
        Self {
            id: value.id,
            title: value.title,
            destination: value.destination,
            start_date: value.start_date,
            end_date: value.end_date,
            photo_url: value.photo_url,
            owner: value.owner,
            guests: value.guests.into_iter().map(UserSummary::from).collect(),
        }
    }
}

impl From<PostDto> for Post {
    fn from(value: PostDto) -> Self {
        Self {
            id: value.id,
            title: value.title,
            content: value.content,
            author: value.author.into(),
            created_at: value.created_at,
            likes: value.likes,
            trip_id: value.trip_id,
            photo_url: value.photo_url,
        }
    }
}

impl From<CommentDto> for Comment {
    fn from(value: CommentDto) -> Self {
        Self {
            id: value.id,
            content: value.content,
            author: value.author.into(),
            created_at: value.created_at,
        }
    }
}

/// Ответ на принятие приглашения в терминах модели.
pub(crate) struct AcceptedInvite {
    pub(crate) message: Option<String>,
    pub(crate) plan: Option<Schedule>,
}

fn date_field(date: chrono::NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

async fn image_part(path: &Path) -> PlannerResult<Part> {
    let bytes = tokio::fs::read(path).await?;
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let mime = mime_guess::from_path(path).first_or_octet_stream();

    Part::bytes(bytes)
        .file_name(file_name)
        .mime_str(mime.essence_str())
        .map_err(PlannerError::from_reqwest)
}

async fn with_image(form: Form, image: Option<&Path>) -> PlannerResult<Form> {
    match image {
        Some(path) => Ok(form.part("image", image_part(path).await?)),
        None => Ok(form),
    }
}

#[derive(Debug, Clone)]
/// HTTP-клиент REST API планировщика.
///
/// Ко всем запросам добавляется `Authorization: Bearer`, если в сессии есть
/// токен. Ответ 401 на любой запрос сбрасывает сессию.
pub(crate) struct HttpClient {
    base_url: String,
    client: Client,
    session: Arc<Session>,
}

impl HttpClient {
    pub(crate) fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        session: Arc<Session>,
    ) -> PlannerResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(timeout)
            .build()?;

        Ok(Self {
            base_url: base_url.into(),
            client,
            session,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn decode_error(&self, response: Response) -> PlannerError {
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED {
            if let Err(err) = self.session.expire() {
                warn!(error = %err, "failed to clear stored credentials");
            }
            return PlannerError::Unauthorized;
        }

        let message = match response.json::<ErrorResponseDto>().await {
            Ok(body) => body
                .message
                .or(body.error)
                .unwrap_or_else(|| format!("http status {status}")),
            Err(_) => format!("http status {status}"),
        };
        PlannerError::from_http_status(status, Some(message))
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.client.request(method, self.endpoint(path));
        match self.session.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn execute(
        &self,
        method: Method,
        path: &str,
        request: RequestBuilder,
    ) -> PlannerResult<Response> {
        debug!(%method, path, "sending request");

        let response = request.send().await.map_err(PlannerError::from_reqwest)?;
        if !response.status().is_success() {
            let err = self.decode_error(response).await;
            debug!(%method, path, error = %err, "request failed");
            return Err(err);
        }
        Ok(response)
    }

    async fn decode<TRes: DeserializeOwned>(response: Response) -> PlannerResult<TRes> {
        response
            .json::<TRes>()
            .await
            .map_err(PlannerError::from_reqwest)
    }

    async fn get<TRes: DeserializeOwned>(&self, path: &str) -> PlannerResult<TRes> {
        let request = self.request(Method::GET, path);
        let response = self.execute(Method::GET, path, request).await?;
        Self::decode(response).await
    }

    /// универсальный helper для запросов с json-payload
    async fn send_json<TReq, TRes>(
        &self,
        method: Method,
        path: &str,
        body: &TReq,
    ) -> PlannerResult<TRes>
    where
        TReq: Serialize,
        TRes: DeserializeOwned,
    {
        let request = self.request(method.clone(), path).json(body);
        let response = self.execute(method, path, request).await?;
        Self::decode(response).await
    }

    async fn send_multipart<TRes: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        form: Form,
    ) -> PlannerResult<TRes> {
        let request = self.request(method.clone(), path).multipart(form);
        let response = self.execute(method, path, request).await?;
        Self::decode(response).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> PlannerResult<()> {
        let request = self.request(method.clone(), path);
        self.execute(method, path, request).await?;
        Ok(())
    }

    pub(crate) async fn login(&self, email: &str, password: &str) -> PlannerResult<String> {
        let payload = LoginRequestDto { email, password };
        let dto: TokenResponseDto = self.send_json(Method::POST, "/users/login", &payload).await?;
        Ok(dto.token)
    }

    pub(crate) async fn join(
        &self,
        email: &str,
        password: &str,
        nick: &str,
    ) -> PlannerResult<String> {
        let payload = JoinRequestDto {
            email,
            password,
            nick,
        };
        let dto: TokenResponseDto = self.send_json(Method::POST, "/users", &payload).await?;
        Ok(dto.token)
    }

    pub(crate) async fn verify_email(&self, email: &str) -> PlannerResult<Option<String>> {
        let payload = VerifyEmailRequestDto { email };
        let dto: MessageResponseDto = self
            .send_json(Method::POST, "/users/verify-email", &payload)
            .await?;
        Ok(dto.message)
    }

    pub(crate) async fn get_user(&self, id: i64) -> PlannerResult<User> {
        let dto: UserDto = self.get(&format!("/users/{id}")).await?;
        Ok(dto.into())
    }

    pub(crate) async fn update_user(&self, id: i64, form: &ProfileForm) -> PlannerResult<User> {
        let multipart = Form::new().text("nick", form.nick.clone());
        let multipart = with_image(multipart, form.image.as_deref()).await?;
        let dto: UserDto = self
            .send_multipart(Method::PUT, &format!("/users/{id}"), multipart)
            .await?;
        Ok(dto.into())
    }

    pub(crate) async fn list_trips(&self) -> PlannerResult<Vec<Schedule>> {
        let dtos: Vec<ScheduleDto> = self.get("/trips").await?;
        Ok(dtos.into_iter().map(Schedule::from).collect())
    }

    pub(crate) async fn get_trip(&self, id: i64) -> PlannerResult<Schedule> {
        let dto: ScheduleDto = self.get(&format!("/trips/{id}")).await?;
        Ok(dto.into())
    }

    async fn trip_form(draft: &PlanDraft) -> PlannerResult<Form> {
        let form = Form::new()
            .text("title", draft.title.clone())
            .text("destination", draft.destination.clone())
            .text("startDate", date_field(draft.start_date))
            .text("endDate", date_field(draft.end_date));
        with_image(form, draft.image.as_deref()).await
    }

    pub(crate) async fn create_trip(&self, draft: &PlanDraft) -> PlannerResult<Schedule> {
        let form = Self::trip_form(draft).await?;
        let dto: ScheduleDto = self.send_multipart(Method::POST, "/trips", form).await?;
        Ok(dto.into())
    }

    pub(crate) async fn update_trip(&self, id: i64, draft: &PlanDraft) -> PlannerResult<Schedule> {
        let form = Self::trip_form(draft).await?;
        let dto: ScheduleDto = self
            .send_multipart(Method::PUT, &format!("/trips/{id}"), form)
            .await?;
        Ok(dto.into())
    }

    pub(crate) async fn delete_trip(&self, id: i64) -> PlannerResult<()> {
        self.send_empty(Method::DELETE, &format!("/trips/{id}")).await
    }

    pub(crate) async fn list_companions(&self, trip_id: i64) -> PlannerResult<Vec<UserSummary>> {
        let dtos: Vec<UserSummaryDto> = self.get(&format!("/trips/companions/{trip_id}")).await?;
        Ok(dtos.into_iter().map(UserSummary::from).collect())
    }

    pub(crate) async fn create_invite(&self, trip_id: i64, owner_id: i64) -> PlannerResult<String> {
        let payload = InviteRequestDto { owner_id };
        let dto: InviteResponseDto = self
            .send_json(
                Method::POST,
                &format!("/trips/companions/{trip_id}/invite"),
                &payload,
            )
            .await?;
        Ok(dto.invite_link)
    }

    pub(crate) async fn accept_invite(
        &self,
        trip_id: i64,
        code: &str,
    ) -> PlannerResult<AcceptedInvite> {
        let payload = AcceptInviteRequestDto { invite_code: code };
        let dto: AcceptInviteResponseDto = self
            .send_json(Method::POST, &format!("/trips/companions/{trip_id}"), &payload)
            .await?;
        Ok(AcceptedInvite {
            message: dto.message,
            plan: dto.plan.map(Schedule::from),
        })
    }

    pub(crate) async fn leave_trip(&self, trip_id: i64) -> PlannerResult<()> {
        self.send_empty(Method::DELETE, &format!("/trips/companions/{trip_id}"))
            .await
    }

    pub(crate) async fn list_posts(&self) -> PlannerResult<Vec<Post>> {
        let dtos: Vec<PostDto> = self.get("/posts").await?;
        Ok(dtos.into_iter().map(Post::from).collect())
    }

    pub(crate) async fn get_post(&self, id: i64) -> PlannerResult<Post> {
        let dto: PostDto = self.get(&format!("/posts/{id}")).await?;
        Ok(dto.into())
    }

    async fn post_form(form: &PostForm) -> PlannerResult<Form> {
        let mut multipart = Form::new()
            .text("title", form.title.clone())
            .text("description", form.content.clone());
        if let Some(trip_id) = form.trip_id {
            multipart = multipart.text("tripId", trip_id.to_string());
        }
        with_image(multipart, form.image.as_deref()).await
    }

    pub(crate) async fn create_post(&self, form: &PostForm) -> PlannerResult<Post> {
        let multipart = Self::post_form(form).await?;
        let dto: PostDto = self.send_multipart(Method::POST, "/posts", multipart).await?;
        Ok(dto.into())
    }

    /// Без изображения уходит JSON, с изображением multipart.
    pub(crate) async fn update_post(&self, id: i64, form: &PostForm) -> PlannerResult<Post> {
        let path = format!("/posts/{id}");
        let dto: PostDto = if form.image.is_some() {
            let multipart = Self::post_form(form).await?;
            self.send_multipart(Method::PUT, &path, multipart).await?
        } else {
            let payload = UpdatePostRequestDto {
                title: &form.title,
                description: &form.content,
                trip_id: form.trip_id,
            };
            self.send_json(Method::PUT, &path, &payload).await?
        };
        Ok(dto.into())
    }

    pub(crate) async fn delete_post(&self, id: i64) -> PlannerResult<()> {
        self.send_empty(Method::DELETE, &format!("/posts/{id}")).await
    }

    pub(crate) async fn like_post(&self, id: i64) -> PlannerResult<Option<u32>> {
        let path = format!("/posts/{id}/like");
        let request = self.request(Method::POST, &path);
        let response = self.execute(Method::POST, &path, request).await?;

        // Сервер может ответить пустым телом.
        let body = response.bytes().await.map_err(PlannerError::from_reqwest)?;
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let dto: LikeResponseDto = serde_json::from_slice(&body).map_err(|err| {
            PlannerError::InvalidRequest(format!("unexpected like response: {err}"))
        })?;
        Ok(dto.likes)
    }

    pub(crate) async fn list_comments(&self, post_id: i64) -> PlannerResult<Vec<Comment>> {
        let dtos: Vec<CommentDto> = self.get(&format!("/posts/{post_id}/comments")).await?;
        Ok(dtos.into_iter().map(Comment::from).collect())
    }

    pub(crate) async fn add_comment(&self, post_id: i64, content: &str) -> PlannerResult<Comment> {
        let payload = CommentRequestDto { content };
        let dto: CommentDto = self
            .send_json(Method::POST, &format!("/posts/{post_id}/comments"), &payload)
            .await?;
        Ok(dto.into())
    }

    pub(crate) async fn update_comment(
        &self,
        post_id: i64,
        comment_id: i64,
        content: &str,
    ) -> PlannerResult<Comment> {
        let payload = CommentRequestDto { content };
        let dto: CommentDto = self
            .send_json(
                Method::PUT,
                &format!("/posts/{post_id}/comments/{comment_id}"),
                &payload,
            )
            .await?;
        Ok(dto.into())
    }

    pub(crate) async fn delete_comment(&self, post_id: i64, comment_id: i64) -> PlannerResult<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/posts/{post_id}/comments/{comment_id}"),
        )
        .await
    }

    pub(crate) async fn calendar(&self, user_id: i64) -> PlannerResult<Vec<Schedule>> {
        let dtos: Vec<ScheduleDto> = self.get(&format!("/calendar/{user_id}")).await?;
        Ok(dtos.into_iter().map(Schedule::from).collect())
    }
}
