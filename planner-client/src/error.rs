use thiserror::Error;

use crate::forms::FormErrors;
use crate::storage::StorageError;

#[derive(Debug, Error)]
/// Ошибки клиентской библиотеки `planner-client`.
pub enum PlannerError {
    /// Ошибка HTTP-транспорта (`reqwest`).
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Требуется авторизация: токена нет или сервер ответил 401.
    #[error("unauthorized")]
    Unauthorized,

    /// Сервер запретил операцию (403).
    #[error("forbidden")]
    Forbidden,

    /// Запрошенный ресурс не найден.
    #[error("not found")]
    NotFound,

    /// Некорректный запрос или бизнес-ошибка на стороне сервера.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Форма не прошла локальную валидацию, запрос не отправлялся.
    #[error("form validation failed: {0}")]
    Validation(FormErrors),

    /// Ссылка-приглашение не распознана.
    #[error("invalid invite link: {0}")]
    InvalidInvite(String),

    /// JWT не удалось разобрать.
    #[error("token decode failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    /// Ошибка локального хранилища.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Ошибка чтения файла (например, изображения для загрузки).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Результат операций `planner-client`.
pub type PlannerResult<T> = Result<T, PlannerError>;

impl From<FormErrors> for PlannerError {
    fn from(value: FormErrors) -> Self {
        Self::Validation(value)
    }
}

impl PlannerError {
    pub(crate) fn from_http_status(status: reqwest::StatusCode, message: Option<String>) -> Self {
        match status {
            reqwest::StatusCode::UNAUTHORIZED => Self::Unauthorized,
            reqwest::StatusCode::FORBIDDEN => Self::Forbidden,
            reqwest::StatusCode::NOT_FOUND => Self::NotFound,
            _ => {
                let message = message.unwrap_or_else(|| format!("http status {status}"));
                Self::InvalidRequest(message)
            }
        }
    }

    pub(crate) fn from_reqwest(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            return Self::from_http_status(status, None);
        }
        Self::Http(err)
    }

    /// `true`, если ошибка означает истёкшую или отсутствующую сессию.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_keeps_401_and_403_apart() {
        assert!(matches!(
            PlannerError::from_http_status(reqwest::StatusCode::UNAUTHORIZED, None),
            PlannerError::Unauthorized
        ));
        assert!(matches!(
            PlannerError::from_http_status(reqwest::StatusCode::FORBIDDEN, None),
            PlannerError::Forbidden
        ));
    }

    #[test]
    fn status_mapping_uses_fallback_message() {
        let err = PlannerError::from_http_status(reqwest::StatusCode::CONFLICT, None);
        match err {
            PlannerError::InvalidRequest(message) => assert!(message.contains("409")),
            other => panic!("expected InvalidRequest, got {other:?}"),
        }
    }
}
