//! Сессия пользователя: JWT-токен, `userId` из него и отложенный переход
//! на экран входа после 401.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use jsonwebtoken::{DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;
use tracing::warn;

use crate::error::PlannerResult;
use crate::routes::Route;
use crate::storage::{Storage, TOKEN_KEY, write_json};

#[derive(Debug, Deserialize)]
struct TokenClaims {
    #[serde(rename = "userId", alias = "user_id", alias = "id")]
    user_id: i64,
}

/// Извлекает `userId` из payload JWT.
///
/// Подпись на клиенте не проверяется: ключа у клиента нет, токен проверяет
/// сервер. Поддерживаются HMAC-токены (`HS256/384/512`).
pub fn decode_user_id(token: &str) -> PlannerResult<i64> {
    let header = decode_header(token)?;

    let mut validation = Validation::new(header.alg);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<TokenClaims>(token, &DecodingKey::from_secret(&[]), &validation)?;
    Ok(data.claims.user_id)
}

fn parse_token_content(raw: &str) -> Option<String> {
    let token = serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string());
    let token = token.trim().to_string();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[derive(Debug, Default, Clone)]
struct SessionState {
    token: Option<String>,
    user_id: Option<i64>,
    redirect: Option<Route>,
}

/// Состояние авторизации с единой точкой синхронизации с хранилищем.
pub struct Session {
    storage: Arc<dyn Storage>,
    state: Mutex<SessionState>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("Session")
            .field("authenticated", &state.token.is_some())
            .field("user_id", &state.user_id)
            .field("redirect", &state.redirect)
            .finish()
    }
}

impl Session {
    /// Пустая сессия поверх хранилища (без чтения сохранённого токена).
    pub fn anonymous(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Восстанавливает сессию из хранилища.
    ///
    /// Токен, из которого не удаётся извлечь `userId`, удаляется.
    pub fn load(storage: Arc<dyn Storage>) -> PlannerResult<Self> {
        let session = Self::anonymous(storage);

        let Some(raw) = session.storage.get_item(TOKEN_KEY)? else {
            return Ok(session);
        };
        let Some(token) = parse_token_content(&raw) else {
            return Ok(session);
        };

        match decode_user_id(&token) {
            Ok(user_id) => {
                let mut state = session.lock();
                state.token = Some(token);
                state.user_id = Some(user_id);
            }
            Err(err) => {
                warn!(error = %err, "stored token is unreadable, dropping it");
                session.storage.remove_item(TOKEN_KEY)?;
            }
        }
        Ok(session)
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Текущий токен.
    pub fn token(&self) -> Option<String> {
        self.lock().token.clone()
    }

    /// Идентификатор пользователя из токена.
    pub fn user_id(&self) -> Option<i64> {
        self.lock().user_id
    }

    /// Есть ли активная сессия.
    pub fn is_authenticated(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Сохраняет новый токен и возвращает извлечённый `userId`.
    pub fn sign_in(&self, token: &str) -> PlannerResult<i64> {
        let token = token.trim();
        let user_id = decode_user_id(token)?;
        write_json(self.storage.as_ref(), TOKEN_KEY, &token)?;

        let mut state = self.lock();
        state.token = Some(token.to_string());
        state.user_id = Some(user_id);
        state.redirect = None;
        Ok(user_id)
    }

    /// Явный выход: токен удаляется из памяти и хранилища.
    pub fn sign_out(&self) -> PlannerResult<()> {
        self.storage.remove_item(TOKEN_KEY)?;
        let mut state = self.lock();
        state.token = None;
        state.user_id = None;
        Ok(())
    }

    /// Реакция на 401: сбросить учётные данные и запомнить переход на `/login`.
    pub fn expire(&self) -> PlannerResult<()> {
        warn!("session rejected by server, clearing credentials");
        let removed = self.storage.remove_item(TOKEN_KEY);

        let mut state = self.lock();
        state.token = None;
        state.user_id = None;
        state.redirect = Some(Route::Login);
        drop(state);

        removed.map_err(Into::into)
    }

    /// Запоминает переход на экран входа, не трогая токен.
    pub fn require_login(&self) {
        self.lock().redirect = Some(Route::Login);
    }

    /// Отложенный переход, если он есть.
    pub fn pending_redirect(&self) -> Option<Route> {
        self.lock().redirect
    }

    /// Забирает отложенный переход.
    pub fn take_redirect(&self) -> Option<Route> {
        self.lock().redirect.take()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use jsonwebtoken::{EncodingKey, Header, encode};
    use serde::Serialize;

    use super::*;
    use crate::storage::MemoryStorage;

    #[derive(Serialize)]
    struct Claims {
        #[serde(rename = "userId")]
        user_id: i64,
        exp: i64,
    }

    pub(crate) fn token_for(user_id: i64) -> String {
        encode(
            &Header::default(),
            &Claims {
                user_id,
                exp: 1,
            },
            &EncodingKey::from_secret(b"server-side-secret"),
        )
        .expect("token must encode")
    }

    #[test]
    fn decode_user_id_ignores_signature_and_expiry() {
        assert_eq!(decode_user_id(&token_for(42)).expect("decode"), 42);
    }

    #[test]
    fn decode_user_id_rejects_garbage() {
        assert!(decode_user_id("not-a-jwt").is_err());
    }

    #[test]
    fn sign_in_persists_token_and_load_restores_it() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let session = Session::anonymous(storage.clone());

        let user_id = session.sign_in(&token_for(7)).expect("sign in");
        assert_eq!(user_id, 7);

        let restored = Session::load(storage).expect("load");
        assert!(restored.is_authenticated());
        assert_eq!(restored.user_id(), Some(7));
    }

    #[test]
    fn load_accepts_bare_token_value() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage
            .set_item(TOKEN_KEY, &format!("  {}  ", token_for(3)))
            .expect("set");

        let session = Session::load(storage).expect("load");
        assert_eq!(session.user_id(), Some(3));
    }

    #[test]
    fn load_drops_unreadable_token() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        storage.set_item(TOKEN_KEY, "\"broken\"").expect("set");

        let session = Session::load(storage.clone()).expect("load");
        assert!(!session.is_authenticated());
        assert_eq!(storage.get_item(TOKEN_KEY).expect("get"), None);
    }

    #[test]
    fn expire_clears_token_and_sets_login_redirect() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let session = Session::anonymous(storage.clone());
        session.sign_in(&token_for(1)).expect("sign in");

        session.expire().expect("expire");

        assert!(!session.is_authenticated());
        assert_eq!(session.user_id(), None);
        assert_eq!(storage.get_item(TOKEN_KEY).expect("get"), None);
        assert_eq!(session.take_redirect(), Some(Route::Login));
        assert_eq!(session.take_redirect(), None);
    }
}
