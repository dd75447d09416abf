//! Локальное зеркало постов, планов и участников.
//!
//! Все изменения идут через методы `LocalStore`; после каждого изменения
//! затронутая коллекция целиком записывается в `Storage` (последняя запись
//! побеждает, изменения из других процессов не отслеживаются).

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::PlannerResult;
use crate::models::{Participant, Post, Schedule};
use crate::storage::{
    NEXT_IDS_KEY, PARTICIPANTS_KEY, PLANS_KEY, POSTS_KEY, Storage, StorageResult, read_json,
    write_json,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
/// Что происходит с идентификаторами после удаления.
pub enum IdPolicy {
    /// Идентификаторы не переиспользуются: новый id берётся из сохранённого
    /// счётчика, который только растёт, даже после удаления максимального id.
    #[default]
    Stable,
    /// Оставшиеся элементы перенумеровываются `1..N` в исходном порядке.
    ///
    /// Совместимость со старыми данными; ссылки на перенумерованные планы
    /// внутри стора (участники, `trip_id` постов) переписываются.
    Reindex,
}

impl FromStr for IdPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Self::Stable),
            "reindex" => Ok(Self::Reindex),
            other => Err(format!("unknown id policy '{other}', expected stable|reindex")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collection {
    Posts,
    Plans,
    Participants,
    NextIds,
}

/// Следующие свободные id. Хранятся отдельно от коллекций, чтобы удаление
/// последнего элемента не откатывало счётчик.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
struct NextIds {
    #[serde(default)]
    posts: i64,
    #[serde(default)]
    plans: i64,
}

/// Зеркало коллекций с синхронизацией в хранилище.
pub struct LocalStore {
    storage: Arc<dyn Storage>,
    policy: IdPolicy,
    posts: Vec<Post>,
    plans: Vec<Schedule>,
    participants: Vec<Participant>,
    next_ids: NextIds,
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("policy", &self.policy)
            .field("posts", &self.posts.len())
            .field("plans", &self.plans.len())
            .field("participants", &self.participants.len())
            .field("next_ids", &self.next_ids)
            .finish()
    }
}

fn next_id(ids: impl Iterator<Item = i64>) -> i64 {
    ids.max().unwrap_or(0).max(0) + 1
}

/// Перенумеровывает элементы `1..N`, возвращает пары `(старый, новый)`.
fn reindex<T>(items: &mut [T], id: impl Fn(&mut T) -> &mut i64) -> Vec<(i64, i64)> {
    items
        .iter_mut()
        .zip(1..)
        .map(|(item, new_id)| {
            let slot = id(item);
            let old_id = *slot;
            *slot = new_id;
            (old_id, new_id)
        })
        .collect()
}

impl LocalStore {
    /// Загружает коллекции из хранилища; отсутствующий ключ даёт пустую коллекцию.
    pub fn load(storage: Arc<dyn Storage>, policy: IdPolicy) -> PlannerResult<Self> {
        let posts: Vec<Post> = read_json(storage.as_ref(), POSTS_KEY)?.unwrap_or_default();
        let plans: Vec<Schedule> = read_json(storage.as_ref(), PLANS_KEY)?.unwrap_or_default();
        let participants = read_json(storage.as_ref(), PARTICIPANTS_KEY)?.unwrap_or_default();

        // Данные без счётчика (или с отставшим) поднимаются до `max + 1`.
        let stored: NextIds = read_json(storage.as_ref(), NEXT_IDS_KEY)?.unwrap_or_default();
        let next_ids = NextIds {
            posts: stored.posts.max(next_id(posts.iter().map(|post| post.id))),
            plans: stored.plans.max(next_id(plans.iter().map(|plan| plan.id))),
        };

        Ok(Self {
            storage,
            policy,
            posts,
            plans,
            participants,
            next_ids,
        })
    }

    fn sync(&self, collections: &[Collection]) -> StorageResult<()> {
        let storage = self.storage.as_ref();
        for collection in collections {
            match collection {
                Collection::Posts => write_json(storage, POSTS_KEY, &self.posts)?,
                Collection::Plans => write_json(storage, PLANS_KEY, &self.plans)?,
                Collection::Participants => {
                    write_json(storage, PARTICIPANTS_KEY, &self.participants)?
                }
                Collection::NextIds => write_json(storage, NEXT_IDS_KEY, &self.next_ids)?,
            }
        }
        Ok(())
    }

    /// Политика идентификаторов.
    pub fn policy(&self) -> IdPolicy {
        self.policy
    }

    /// Посты.
    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    /// Планы.
    pub fn plans(&self) -> &[Schedule] {
        &self.plans
    }

    /// Все участники.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    /// Пост по id.
    pub fn post(&self, id: i64) -> Option<&Post> {
        self.posts.iter().find(|post| post.id == id)
    }

    /// План по id.
    pub fn plan(&self, id: i64) -> Option<&Schedule> {
        self.plans.iter().find(|plan| plan.id == id)
    }

    /// Заменяет посты свежим списком с сервера.
    pub fn replace_posts(&mut self, posts: Vec<Post>) -> PlannerResult<()> {
        self.posts = posts;
        self.next_ids.posts = self
            .next_ids
            .posts
            .max(next_id(self.posts.iter().map(|post| post.id)));
        self.sync(&[Collection::Posts, Collection::NextIds])?;
        Ok(())
    }

    /// Заменяет планы свежим списком с сервера.
    pub fn replace_plans(&mut self, plans: Vec<Schedule>) -> PlannerResult<()> {
        self.plans = plans;
        self.next_ids.plans = self
            .next_ids
            .plans
            .max(next_id(self.plans.iter().map(|plan| plan.id)));
        self.sync(&[Collection::Plans, Collection::NextIds])?;
        Ok(())
    }

    /// Добавляет пост или заменяет пост с тем же id.
    ///
    /// Пост с `id <= 0` получает следующий свободный id. Возвращает id поста.
    pub fn add_post(&mut self, mut post: Post) -> PlannerResult<i64> {
        if post.id <= 0 {
            post.id = self.next_ids.posts;
        }
        let id = post.id;
        self.next_ids.posts = self.next_ids.posts.max(id + 1);
        match self.posts.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = post,
            None => self.posts.push(post),
        }
        self.sync(&[Collection::Posts, Collection::NextIds])?;
        Ok(id)
    }

    /// Меняет заголовок и текст поста. `false`, если поста нет.
    pub fn edit_post(&mut self, id: i64, title: &str, content: &str) -> PlannerResult<bool> {
        let Some(post) = self.posts.iter_mut().find(|post| post.id == id) else {
            return Ok(false);
        };
        post.title = title.to_string();
        post.content = content.to_string();
        self.sync(&[Collection::Posts])?;
        Ok(true)
    }

    /// Увеличивает счётчик лайков, возвращает новое значение.
    pub fn like_post(&mut self, id: i64) -> PlannerResult<Option<u32>> {
        let Some(post) = self.posts.iter_mut().find(|post| post.id == id) else {
            return Ok(None);
        };
        post.likes = post.likes.saturating_add(1);
        let likes = post.likes;
        self.sync(&[Collection::Posts])?;
        Ok(Some(likes))
    }

    /// Выставляет счётчик лайков из ответа сервера.
    pub fn set_likes(&mut self, id: i64, likes: u32) -> PlannerResult<bool> {
        let Some(post) = self.posts.iter_mut().find(|post| post.id == id) else {
            return Ok(false);
        };
        post.likes = likes;
        self.sync(&[Collection::Posts])?;
        Ok(true)
    }

    /// Удаляет пост. `false`, если поста нет.
    pub fn delete_post(&mut self, id: i64) -> PlannerResult<bool> {
        let before = self.posts.len();
        self.posts.retain(|post| post.id != id);
        if self.posts.len() == before {
            return Ok(false);
        }
        if self.policy == IdPolicy::Reindex {
            reindex(&mut self.posts, |post| &mut post.id);
            self.next_ids.posts = next_id(self.posts.iter().map(|post| post.id));
            self.sync(&[Collection::Posts, Collection::NextIds])?;
        } else {
            self.sync(&[Collection::Posts])?;
        }
        Ok(true)
    }

    /// Добавляет план или заменяет план с тем же id; при `id <= 0` выдаётся новый id.
    pub fn add_plan(&mut self, mut plan: Schedule) -> PlannerResult<i64> {
        if plan.id <= 0 {
            plan.id = self.next_ids.plans;
        }
        let id = plan.id;
        self.next_ids.plans = self.next_ids.plans.max(id + 1);
        match self.plans.iter_mut().find(|existing| existing.id == id) {
            Some(existing) => *existing = plan,
            None => self.plans.push(plan),
        }
        self.sync(&[Collection::Plans, Collection::NextIds])?;
        Ok(id)
    }

    /// Заменяет содержимое плана, сохраняя его id.
    pub fn edit_plan(&mut self, id: i64, mut plan: Schedule) -> PlannerResult<bool> {
        let Some(existing) = self.plans.iter_mut().find(|existing| existing.id == id) else {
            return Ok(false);
        };
        plan.id = id;
        *existing = plan;
        self.sync(&[Collection::Plans])?;
        Ok(true)
    }

    /// Удаляет план вместе с его участниками.
    pub fn delete_plan(&mut self, id: i64) -> PlannerResult<bool> {
        let before = self.plans.len();
        self.plans.retain(|plan| plan.id != id);
        if self.plans.len() == before {
            return Ok(false);
        }
        self.participants.retain(|participant| participant.plan_id != id);

        let mut touched = vec![Collection::Plans, Collection::Participants];
        if self.policy == IdPolicy::Reindex {
            let mapping = reindex(&mut self.plans, |plan| &mut plan.id);
            self.next_ids.plans = next_id(self.plans.iter().map(|plan| plan.id));
            let remap = |plan_id: i64| {
                mapping
                    .iter()
                    .find(|(old, _)| *old == plan_id)
                    .map(|(_, new)| *new)
            };
            for participant in &mut self.participants {
                if let Some(new_id) = remap(participant.plan_id) {
                    participant.plan_id = new_id;
                }
            }
            // Ссылка на план, которого нет в зеркале, после перенумерации
            // может указать на чужой план, поэтому она сбрасывается.
            for post in &mut self.posts {
                post.trip_id = post.trip_id.and_then(remap);
            }
            touched.push(Collection::Posts);
            touched.push(Collection::NextIds);
        }
        self.sync(&touched)?;
        Ok(true)
    }

    /// Участники плана.
    pub fn participants_of(&self, plan_id: i64) -> Vec<&Participant> {
        self.participants
            .iter()
            .filter(|participant| participant.plan_id == plan_id)
            .collect()
    }

    /// Добавляет участника. `false`, если он уже есть.
    pub fn add_participant(&mut self, participant: Participant) -> PlannerResult<bool> {
        let exists = self.participants.iter().any(|existing| {
            existing.plan_id == participant.plan_id && existing.user_id == participant.user_id
        });
        if exists {
            return Ok(false);
        }
        self.participants.push(participant);
        self.sync(&[Collection::Participants])?;
        Ok(true)
    }

    /// Заменяет участников плана списком с сервера.
    pub fn replace_participants(
        &mut self,
        plan_id: i64,
        participants: Vec<Participant>,
    ) -> PlannerResult<()> {
        self.participants
            .retain(|participant| participant.plan_id != plan_id);
        self.participants.extend(
            participants
                .into_iter()
                .map(|participant| Participant {
                    plan_id,
                    ..participant
                }),
        );
        self.sync(&[Collection::Participants])?;
        Ok(())
    }

    /// Удаляет участника. `false`, если его не было.
    pub fn remove_participant(&mut self, plan_id: i64, user_id: i64) -> PlannerResult<bool> {
        let before = self.participants.len();
        self.participants.retain(|participant| {
            !(participant.plan_id == plan_id && participant.user_id == user_id)
        });
        if self.participants.len() == before {
            return Ok(false);
        }
        self.sync(&[Collection::Participants])?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::models::UserSummary;
    use crate::storage::MemoryStorage;

    fn post(id: i64, title: &str) -> Post {
        Post {
            id,
            title: title.to_string(),
            content: format!("{title} content"),
            author: UserSummary {
                id: 1,
                nick: "nick".to_string(),
                profile: None,
            },
            created_at: Utc
                .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
                .single()
                .expect("valid ts"),
            likes: 0,
            trip_id: None,
            photo_url: None,
        }
    }

    fn plan(id: i64, title: &str) -> Schedule {
        let start = Utc
            .with_ymd_and_hms(2024, 6, 1, 0, 0, 0)
            .single()
            .expect("valid ts");
        Schedule {
            id,
            title: title.to_string(),
            destination: "Seoul".to_string(),
            start_date: start,
            end_date: start,
            photo_url: None,
            owner: 1,
            guests: Vec::new(),
        }
    }

    fn participant(plan_id: i64, user_id: i64) -> Participant {
        Participant {
            plan_id,
            user_id,
            nick: format!("user{user_id}"),
        }
    }

    fn store(policy: IdPolicy) -> (Arc<dyn Storage>, LocalStore) {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        let store = LocalStore::load(storage.clone(), policy).expect("load");
        (storage, store)
    }

    fn ids(posts: &[Post]) -> Vec<i64> {
        posts.iter().map(|post| post.id).collect()
    }

    #[test]
    fn add_assigns_next_id_and_persists() {
        let (storage, mut store) = store(IdPolicy::Stable);

        assert_eq!(store.add_post(post(0, "a")).expect("add"), 1);
        assert_eq!(store.add_post(post(0, "b")).expect("add"), 2);

        let reloaded = LocalStore::load(storage, IdPolicy::Stable).expect("reload");
        assert_eq!(ids(reloaded.posts()), vec![1, 2]);
    }

    #[test]
    fn add_with_existing_id_replaces() {
        let (_, mut store) = store(IdPolicy::Stable);
        store.add_post(post(5, "old")).expect("add");
        store.add_post(post(5, "new")).expect("upsert");

        assert_eq!(store.posts().len(), 1);
        assert_eq!(store.post(5).map(|p| p.title.as_str()), Some("new"));
    }

    #[test]
    fn delete_with_reindex_renumbers_in_original_order() {
        let (_, mut store) = store(IdPolicy::Reindex);
        for title in ["a", "b", "c", "d"] {
            store.add_post(post(0, title)).expect("add");
        }

        assert!(store.delete_post(2).expect("delete"));

        assert_eq!(ids(store.posts()), vec![1, 2, 3]);
        let titles: Vec<&str> = store.posts().iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["a", "c", "d"]);
    }

    #[test]
    fn delete_with_stable_policy_keeps_ids() {
        let (_, mut store) = store(IdPolicy::Stable);
        for title in ["a", "b", "c"] {
            store.add_post(post(0, title)).expect("add");
        }

        store.delete_post(1).expect("delete");
        assert_eq!(ids(store.posts()), vec![2, 3]);

        assert_eq!(store.add_post(post(0, "d")).expect("add"), 4);
    }

    #[test]
    fn stable_policy_never_reuses_deleted_max_id() {
        let (_, mut store) = store(IdPolicy::Stable);
        for title in ["a", "b", "c"] {
            store.add_post(post(0, title)).expect("add");
        }

        assert!(store.delete_post(3).expect("delete"));

        assert_eq!(store.add_post(post(0, "d")).expect("add"), 4);
        assert_eq!(ids(store.posts()), vec![1, 2, 4]);
    }

    #[test]
    fn next_id_mark_survives_reload() {
        let (storage, mut store) = store(IdPolicy::Stable);
        for title in ["one", "two", "three"] {
            store.add_plan(plan(0, title)).expect("add");
        }
        store.delete_plan(3).expect("delete");

        let mut reloaded = LocalStore::load(storage, IdPolicy::Stable).expect("reload");
        assert_eq!(reloaded.add_plan(plan(0, "four")).expect("add"), 4);
    }

    #[test]
    fn load_without_next_ids_key_continues_after_max() {
        let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::new());
        write_json(storage.as_ref(), POSTS_KEY, &vec![post(7, "legacy")]).expect("seed");

        let mut store = LocalStore::load(storage, IdPolicy::Stable).expect("load");
        assert_eq!(store.add_post(post(0, "fresh")).expect("add"), 8);
    }

    #[test]
    fn upsert_keeps_trip_and_likes() {
        let (_, mut store) = store(IdPolicy::Stable);
        let mut original = post(0, "a");
        original.trip_id = Some(2);
        let id = store.add_post(original).expect("add");

        let mut updated = post(id, "a2");
        updated.trip_id = Some(5);
        updated.likes = 3;
        store.add_post(updated).expect("upsert");

        let stored = store.post(id).expect("stored");
        assert_eq!(stored.trip_id, Some(5));
        assert_eq!(stored.likes, 3);
    }

    #[test]
    fn delete_missing_post_reports_false() {
        let (_, mut store) = store(IdPolicy::Reindex);
        store.add_post(post(0, "a")).expect("add");
        assert!(!store.delete_post(99).expect("delete"));
        assert_eq!(ids(store.posts()), vec![1]);
    }

    #[test]
    fn like_and_edit_update_single_post() {
        let (storage, mut store) = store(IdPolicy::Stable);
        store.add_post(post(0, "a")).expect("add");
        store.add_post(post(0, "b")).expect("add");

        assert_eq!(store.like_post(2).expect("like"), Some(1));
        assert_eq!(store.like_post(2).expect("like"), Some(2));
        assert_eq!(store.like_post(42).expect("like"), None);
        assert!(store.edit_post(1, "A", "body").expect("edit"));

        let reloaded = LocalStore::load(storage, IdPolicy::Stable).expect("reload");
        assert_eq!(reloaded.post(2).map(|p| p.likes), Some(2));
        assert_eq!(reloaded.post(1).map(|p| p.content.as_str()), Some("body"));
    }

    #[test]
    fn delete_plan_drops_its_participants() {
        let (_, mut store) = store(IdPolicy::Stable);
        store.add_plan(plan(0, "one")).expect("add");
        store.add_plan(plan(0, "two")).expect("add");
        store.add_participant(participant(1, 10)).expect("add");
        store.add_participant(participant(2, 20)).expect("add");

        assert!(store.delete_plan(1).expect("delete"));

        assert!(store.participants_of(1).is_empty());
        assert_eq!(store.participants_of(2).len(), 1);
    }

    #[test]
    fn reindex_plan_delete_remaps_references() {
        let (_, mut store) = store(IdPolicy::Reindex);
        for title in ["one", "two", "three"] {
            store.add_plan(plan(0, title)).expect("add");
        }
        store.add_participant(participant(3, 30)).expect("add");
        let mut linked = post(0, "linked");
        linked.trip_id = Some(3);
        store.add_post(linked).expect("add");

        store.delete_plan(1).expect("delete");

        assert_eq!(store.plan(2).map(|p| p.title.as_str()), Some("three"));
        assert_eq!(store.participants_of(2).len(), 1);
        assert_eq!(store.posts()[0].trip_id, Some(2));
    }

    #[test]
    fn reindex_plan_delete_clears_unknown_trip_reference() {
        let (_, mut store) = store(IdPolicy::Reindex);
        store.add_plan(plan(0, "one")).expect("add");
        store.add_plan(plan(0, "two")).expect("add");
        let mut orphan = post(0, "orphan");
        orphan.trip_id = Some(9);
        store.add_post(orphan).expect("add");

        store.delete_plan(1).expect("delete");

        assert_eq!(store.posts()[0].trip_id, None);
        assert_eq!(store.add_plan(plan(0, "three")).expect("add"), 2);
    }

    #[test]
    fn participants_are_unique_per_plan() {
        let (_, mut store) = store(IdPolicy::Stable);
        assert!(store.add_participant(participant(1, 10)).expect("add"));
        assert!(!store.add_participant(participant(1, 10)).expect("add"));
        assert!(store.remove_participant(1, 10).expect("remove"));
        assert!(!store.remove_participant(1, 10).expect("remove"));
    }

    #[test]
    fn id_policy_parses_from_config_values() {
        assert_eq!("Reindex".parse::<IdPolicy>(), Ok(IdPolicy::Reindex));
        assert_eq!(" stable ".parse::<IdPolicy>(), Ok(IdPolicy::Stable));
        assert!("random".parse::<IdPolicy>().is_err());
    }
}
