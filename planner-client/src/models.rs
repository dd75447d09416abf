use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Краткие данные пользователя: автор поста, компаньон плана.
pub struct UserSummary {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Никнейм.
    pub nick: String,
    /// URL аватара.
    pub profile: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Публичная модель пользователя (`/users/:id`).
pub struct User {
    /// Идентификатор пользователя.
    pub id: i64,
    /// Никнейм.
    pub nick: String,
    /// Email, если сервер его отдаёт.
    pub email: Option<String>,
    /// URL аватара.
    pub profile: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(value: &User) -> Self {
        Self {
            id: value.id,
            nick: value.nick.clone(),
            profile: value.profile.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// План поездки (schedule).
///
/// `start_date <= end_date` проверяется только формой создания, сама модель
/// этого не гарантирует.
pub struct Schedule {
    /// Идентификатор плана.
    pub id: i64,
    /// Название поездки.
    pub title: String,
    /// Место назначения.
    pub destination: String,
    /// Начало поездки (UTC).
    pub start_date: DateTime<Utc>,
    /// Конец поездки (UTC), включительно.
    pub end_date: DateTime<Utc>,
    /// URL обложки.
    pub photo_url: Option<String>,
    /// Идентификатор владельца.
    pub owner: i64,
    /// Компаньоны.
    pub guests: Vec<UserSummary>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Пост на доске сообщества.
pub struct Post {
    /// Идентификатор поста.
    pub id: i64,
    /// Заголовок.
    pub title: String,
    /// Текст поста.
    pub content: String,
    /// Автор.
    pub author: UserSummary,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
    /// Количество лайков.
    pub likes: u32,
    /// План, к которому привязан пост.
    pub trip_id: Option<i64>,
    /// URL фотографии.
    pub photo_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Комментарий к посту.
pub struct Comment {
    /// Идентификатор комментария.
    pub id: i64,
    /// Текст.
    pub content: String,
    /// Автор.
    pub author: UserSummary,
    /// Дата создания (UTC).
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// Компаньон плана в локальном зеркале `participants`.
pub struct Participant {
    /// План.
    pub plan_id: i64,
    /// Пользователь.
    pub user_id: i64,
    /// Никнейм на момент добавления.
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ответ после успешного входа или регистрации.
pub struct AuthResponse {
    /// JWT access token.
    pub token: String,
    /// Идентификатор пользователя, извлечённый из токена.
    pub user_id: i64,
}
