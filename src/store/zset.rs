use super::value::{Entry, SortedSet, Value};
use super::Store;
use crate::errors::StoreError;

impl Store {
    /// ZADD. Returns true iff the member is new to the set.
    pub async fn zadd(&self, key: &str, score: f64, member: &str) -> Result<bool, StoreError> {
        let inserted;
        {
            let mut map = self.map().write().await;
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::SortedSet(SortedSet::default())));
            if entry.is_expired() {
                *entry = Entry::new(Value::SortedSet(SortedSet::default()));
            }
            let Value::SortedSet(set) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };
            inserted = set.insert(score, member);
        }
        self.notify(key).await;
        Ok(inserted)
    }

    pub async fn zrem(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let removed;
        {
            let mut map = self.map().write().await;
            let Some(entry) = map.get_mut(key) else {
                return Ok(false);
            };
            if entry.is_expired() {
                return Ok(false);
            }
            let Value::SortedSet(set) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };
            removed = set.remove(member);
        }
        if removed {
            self.notify(key).await;
        }
        Ok(removed)
    }

    pub async fn zrank(&self, key: &str, member: &str) -> Result<Option<usize>, StoreError> {
        Ok(self.sorted_set(key).await?.and_then(|set| set.rank(member)))
    }

    pub async fn zscore(&self, key: &str, member: &str) -> Result<Option<f64>, StoreError> {
        Ok(self.sorted_set(key).await?.and_then(|set| set.score(member)))
    }

    pub async fn zcard(&self, key: &str) -> Result<usize, StoreError> {
        Ok(self.sorted_set(key).await?.map_or(0, |set| set.len()))
    }

    pub async fn zrange(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        Ok(self
            .sorted_set(key)
            .await?
            .map_or_else(Vec::new, |set| set.members_in_range(start, stop)))
    }

    async fn sorted_set(&self, key: &str) -> Result<Option<SortedSet>, StoreError> {
        match self.get(key).await {
            None => Ok(None),
            Some(entry) => match entry.value {
                Value::SortedSet(set) => Ok(Some(set)),
                _ => Err(StoreError::WrongType),
            },
        }
    }
}
