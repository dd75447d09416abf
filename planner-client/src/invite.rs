use reqwest::Url;

use crate::error::{PlannerError, PlannerResult};
use crate::models::Schedule;

const CODE_PARAMS: [&str; 2] = ["code", "inviteCode"];
const PLAN_PARAMS: [&str; 3] = ["tripId", "planId", "id"];

#[derive(Debug, Clone, PartialEq, Eq)]
/// Ссылка-приглашение в план.
pub struct InviteLink {
    /// Исходный URL.
    pub url: String,
    /// Код приглашения.
    pub code: String,
    /// План, если он указан в ссылке.
    pub plan_id: Option<i64>,
}

impl InviteLink {
    /// Разбирает URL приглашения.
    ///
    /// Код берётся из параметра `code` (или `inviteCode`), план из
    /// `tripId`/`planId`/`id` или из последнего числового сегмента пути.
    pub fn parse(raw: &str) -> PlannerResult<Self> {
        let url = Url::parse(raw.trim())
            .map_err(|err| PlannerError::InvalidInvite(format!("{raw}: {err}")))?;
        Self::from_url(url, raw)
    }

    /// Как [`InviteLink::parse`], но относительная ссылка разрешается от `base`.
    pub fn parse_with_base(raw: &str, base: &str) -> PlannerResult<Self> {
        let url = Url::parse(base)
            .and_then(|base| base.join(raw.trim()))
            .map_err(|err| PlannerError::InvalidInvite(format!("{raw}: {err}")))?;
        Self::from_url(url, raw)
    }

    fn from_url(url: Url, raw: &str) -> PlannerResult<Self> {
        let query_value = |names: &[&str]| {
            url.query_pairs()
                .find(|(key, value)| {
                    names.iter().any(|name| key == name) && !value.trim().is_empty()
                })
                .map(|(_, value)| value.trim().to_string())
        };

        let code = query_value(&CODE_PARAMS[..])
            .ok_or_else(|| PlannerError::InvalidInvite(format!("{raw}: missing invite code")))?;

        let plan_id = query_value(&PLAN_PARAMS[..])
            .and_then(|value| value.parse::<i64>().ok())
            .or_else(|| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back())
                    .and_then(|segment| segment.parse::<i64>().ok())
            });

        Ok(Self {
            url: url.to_string(),
            code,
            plan_id,
        })
    }

    /// План приглашения: из ссылки или явно переданный.
    pub fn resolve_plan_id(&self, fallback: Option<i64>) -> PlannerResult<i64> {
        self.plan_id.or(fallback).ok_or_else(|| {
            PlannerError::InvalidInvite(format!("{}: plan id is missing", self.url))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Результат принятия приглашения.
pub struct InviteOutcome {
    /// План, к которому присоединился пользователь.
    pub plan_id: i64,
    /// Сообщение сервера.
    pub message: Option<String>,
    /// План, если сервер его вернул.
    pub plan: Option<Schedule>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_reads_code_and_trip_id_from_query() {
        let link = InviteLink::parse("https://planner.example/join?tripId=12&code=abc123")
            .expect("valid link");
        assert_eq!(link.code, "abc123");
        assert_eq!(link.plan_id, Some(12));
    }

    #[test]
    fn parse_falls_back_to_numeric_path_segment() {
        let link = InviteLink::parse("https://planner.example/invite/34?inviteCode=xyz")
            .expect("valid link");
        assert_eq!(link.code, "xyz");
        assert_eq!(link.plan_id, Some(34));
    }

    #[test]
    fn parse_without_plan_needs_fallback() {
        let link = InviteLink::parse("https://planner.example/join?code=only").expect("valid");
        assert_eq!(link.plan_id, None);
        assert!(link.resolve_plan_id(None).is_err());
        assert_eq!(link.resolve_plan_id(Some(5)).expect("fallback"), 5);
    }

    #[test]
    fn parse_rejects_missing_or_blank_code() {
        let err = InviteLink::parse("https://planner.example/join?tripId=1&code=%20")
            .expect_err("blank code");
        assert!(matches!(err, PlannerError::InvalidInvite(_)));
    }

    #[test]
    fn parse_with_base_resolves_relative_link() {
        let link = InviteLink::parse_with_base("/join?tripId=8&code=rel", "http://127.0.0.1:8080")
            .expect("relative link");
        assert_eq!(link.url, "http://127.0.0.1:8080/join?tripId=8&code=rel");
        assert_eq!(link.plan_id, Some(8));
    }

    #[test]
    fn parse_rejects_non_url() {
        let err = InviteLink::parse("not a url").expect_err("not a url");
        assert!(matches!(err, PlannerError::InvalidInvite(_)));
    }
}
