use super::value::{normalize_range, Entry, Value};
use super::Store;
use crate::errors::StoreError;
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

impl Store {
    /// RPUSH. Returns the new list length.
    pub async fn list_push_back(&self, key: &str, items: Vec<String>) -> Result<usize, StoreError> {
        let len = self
            .push(key, items, |list, items| list.extend(items))
            .await?;
        self.notify(key).await;
        Ok(len)
    }

    /// LPUSH. Items land head-first, so `LPUSH k a b c` yields `c b a`.
    pub async fn list_push_front(
        &self,
        key: &str,
        items: Vec<String>,
    ) -> Result<usize, StoreError> {
        let len = self
            .push(key, items, |list, items| {
                for item in items {
                    list.push_front(item);
                }
            })
            .await?;
        self.notify(key).await;
        Ok(len)
    }

    pub async fn list_len(&self, key: &str) -> Result<usize, StoreError> {
        match self.get(key).await {
            None => Ok(0),
            Some(entry) => match entry.value {
                Value::List(list) => Ok(list.len()),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    pub async fn list_range(
        &self,
        key: &str,
        start: i64,
        stop: i64,
    ) -> Result<Vec<String>, StoreError> {
        match self.get(key).await {
            None => Ok(Vec::new()),
            Some(entry) => match entry.value {
                Value::List(list) => Ok(match normalize_range(start, stop, list.len()) {
                    Some((lo, hi)) => list.iter().skip(lo).take(hi - lo + 1).cloned().collect(),
                    None => Vec::new(),
                }),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// Pop up to `count` elements from the head. With a timeout, parks on the
    /// key's wakeup handle until enough elements arrive or the deadline
    /// passes; a zero timeout waits forever. Returns `(timed_out, popped)`.
    pub async fn list_pop_front(
        &self,
        key: &str,
        count: usize,
        timeout: Option<Duration>,
    ) -> Result<(bool, Vec<String>), StoreError> {
        let mut popped = Vec::new();
        self.drain_front(key, count, &mut popped).await?;
        let Some(timeout) = timeout else {
            return Ok((false, popped));
        };
        if popped.len() >= count {
            return Ok((false, popped));
        }

        let deadline = if timeout.is_zero() {
            None
        } else {
            Some(Instant::now() + timeout)
        };
        let wakeup = self.wakeup_handle(key).await;
        while popped.len() < count {
            let notified = wakeup.notified();
            tokio::pin!(notified);
            // Re-probe between arming the waiter and parking; a push that
            // landed in the gap left a stored permit.
            self.drain_front(key, count, &mut popped).await?;
            if popped.len() >= count {
                break;
            }
            match deadline {
                None => notified.await,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline
                        || tokio::time::timeout(deadline - now, notified).await.is_err()
                    {
                        return Ok((true, popped));
                    }
                }
            }
            self.drain_front(key, count, &mut popped).await?;
        }
        Ok((false, popped))
    }

    async fn drain_front(
        &self,
        key: &str,
        count: usize,
        popped: &mut Vec<String>,
    ) -> Result<(), StoreError> {
        let mut map = self.map().write().await;
        let Some(entry) = map.get_mut(key) else {
            return Ok(());
        };
        if entry.is_expired() {
            return Ok(());
        }
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };
        while popped.len() < count {
            match list.pop_front() {
                Some(item) => popped.push(item),
                None => break,
            }
        }
        Ok(())
    }

    async fn push(
        &self,
        key: &str,
        items: Vec<String>,
        apply: impl FnOnce(&mut VecDeque<String>, Vec<String>),
    ) -> Result<usize, StoreError> {
        let mut map = self.map().write().await;
        let entry = map
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(Value::List(VecDeque::new())));
        if entry.is_expired() {
            *entry = Entry::new(Value::List(VecDeque::new()));
        }
        let Value::List(list) = &mut entry.value else {
            return Err(StoreError::WrongType);
        };
        apply(list, items);
        Ok(list.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn push_orders_match_redis() {
        let store = Store::new();
        assert_eq!(
            store
                .list_push_back("k", vec!["a".into(), "b".into()])
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store.list_push_front("k", vec!["x".into(), "y".into()]).await.unwrap(),
            4
        );
        assert_eq!(
            store.list_range("k", 0, -1).await.unwrap(),
            vec!["y", "x", "a", "b"]
        );
        assert_eq!(store.list_len("k").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn push_onto_string_fails_without_mutation() {
        let store = Store::new();
        store.set_string("k", "v", None).await;
        assert_eq!(
            store.list_push_back("k", vec!["a".into()]).await.unwrap_err(),
            StoreError::WrongType
        );
        assert_eq!(store.type_name("k").await, "string");
    }

    #[tokio::test]
    async fn nonblocking_pop_drains_what_exists() {
        let store = Store::new();
        store
            .list_push_back("k", vec!["a".into(), "b".into()])
            .await
            .unwrap();
        let (timed_out, popped) = store.list_pop_front("k", 5, None).await.unwrap();
        assert!(!timed_out);
        assert_eq!(popped, vec!["a", "b"]);
        let (timed_out, popped) = store.list_pop_front("k", 1, None).await.unwrap();
        assert!(!timed_out);
        assert!(popped.is_empty());
    }

    #[tokio::test]
    async fn blocking_pop_times_out_empty() {
        let store = Store::new();
        let (timed_out, popped) = store
            .list_pop_front("q", 1, Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(timed_out);
        assert!(popped.is_empty());
    }

    #[tokio::test]
    async fn blocking_pop_wakes_on_push() {
        let store = Arc::new(Store::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .list_pop_front("q", 1, Some(Duration::from_secs(5)))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.list_push_back("q", vec!["hello".into()]).await.unwrap();
        let (timed_out, popped) = waiter.await.unwrap();
        assert!(!timed_out);
        assert_eq!(popped, vec!["hello"]);
    }

    #[tokio::test]
    async fn blocking_pop_zero_timeout_waits_for_data() {
        let store = Arc::new(Store::new());
        let waiter = {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .list_pop_front("q", 1, Some(Duration::ZERO))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.list_push_front("q", vec!["x".into()]).await.unwrap();
        let (timed_out, popped) = waiter.await.unwrap();
        assert!(!timed_out);
        assert_eq!(popped, vec!["x"]);
    }
}
