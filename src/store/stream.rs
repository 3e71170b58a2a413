use super::value::{Entry, Stream, StreamFields, StreamId, Value};
use super::Store;
use crate::errors::StoreError;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// XADD id argument: `*`, `ms-*`, or `ms-seq`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdSpec {
    Auto,
    Partial(u64),
    Explicit(u64, u64),
}

fn parse_id_spec(spec: &str) -> Result<IdSpec, StoreError> {
    if spec == "*" {
        return Ok(IdSpec::Auto);
    }
    let Some((ms_part, seq_part)) = spec.split_once('-') else {
        return Err(StoreError::InvalidStreamId);
    };
    let ms: u64 = ms_part.parse().map_err(|_| StoreError::InvalidStreamId)?;
    if seq_part == "*" {
        return Ok(IdSpec::Partial(ms));
    }
    let seq: u64 = seq_part.parse().map_err(|_| StoreError::InvalidStreamId)?;
    Ok(IdSpec::Explicit(ms, seq))
}

/// `ms` or `ms-seq`, as given to XREAD and as the non-sentinel XRANGE bounds.
pub fn parse_stream_id(s: &str) -> Result<StreamId, StoreError> {
    match s.split_once('-') {
        Some((ms, seq)) => Ok(StreamId::new(
            ms.parse().map_err(|_| StoreError::InvalidStreamId)?,
            seq.parse().map_err(|_| StoreError::InvalidStreamId)?,
        )),
        None => Ok(StreamId::new(
            s.parse().map_err(|_| StoreError::InvalidStreamId)?,
            0,
        )),
    }
}

/// XRANGE start bound: `-` is the minimum id, a bare `ms` means `ms-0`.
pub fn parse_range_start(s: &str) -> Result<StreamId, StoreError> {
    if s == "-" {
        return Ok(StreamId::ZERO);
    }
    parse_stream_id(s)
}

/// XRANGE end bound: `+` is the maximum id, a bare `ms` means `ms-MAX`.
pub fn parse_range_end(s: &str) -> Result<StreamId, StoreError> {
    if s == "+" {
        return Ok(StreamId::MAX);
    }
    match s.split_once('-') {
        Some(_) => parse_stream_id(s),
        None => Ok(StreamId::new(
            s.parse().map_err(|_| StoreError::InvalidStreamId)?,
            u64::MAX,
        )),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// A fresh stream starts at seq 1 when ms is 0 (0-0 is unusable), else 0.
fn first_seq(ms: u64) -> u64 {
    if ms == 0 {
        1
    } else {
        0
    }
}

impl Store {
    /// XADD. Resolves the id spec against the stream top, validates
    /// monotonicity, inserts and wakes blocked readers.
    pub async fn stream_add(
        &self,
        key: &str,
        id_spec: &str,
        fields: StreamFields,
    ) -> Result<StreamId, StoreError> {
        let spec = parse_id_spec(id_spec)?;
        if spec == IdSpec::Explicit(0, 0) {
            return Err(StoreError::StreamIdZero);
        }
        match spec {
            IdSpec::Partial(ms) | IdSpec::Explicit(ms, _) if ms > now_ms() => {
                return Err(StoreError::StreamIdFromFuture);
            }
            _ => {}
        }

        let id;
        {
            let mut map = self.map().write().await;
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Entry::new(Value::Stream(Stream::default())));
            if entry.is_expired() {
                *entry = Entry::new(Value::Stream(Stream::default()));
            }
            let Value::Stream(stream) = &mut entry.value else {
                return Err(StoreError::WrongType);
            };

            id = match (spec, stream.top_id()) {
                (IdSpec::Auto, None) => {
                    let ms = now_ms();
                    StreamId::new(ms, first_seq(ms))
                }
                (IdSpec::Auto, Some(top)) => {
                    let ms = now_ms();
                    if ms < top.ms {
                        return Err(StoreError::ClockWentBackwards);
                    }
                    if ms == top.ms {
                        StreamId::new(ms, top.seq + 1)
                    } else {
                        StreamId::new(ms, first_seq(ms))
                    }
                }
                (IdSpec::Partial(ms), None) => StreamId::new(ms, first_seq(ms)),
                (IdSpec::Partial(ms), Some(top)) => {
                    if ms < top.ms {
                        return Err(StoreError::StreamIdTooSmall);
                    }
                    if ms == top.ms {
                        StreamId::new(ms, top.seq + 1)
                    } else {
                        StreamId::new(ms, first_seq(ms))
                    }
                }
                (IdSpec::Explicit(ms, seq), None) => StreamId::new(ms, seq),
                (IdSpec::Explicit(ms, seq), Some(top)) => {
                    let id = StreamId::new(ms, seq);
                    if id <= top {
                        return Err(StoreError::StreamIdTooSmall);
                    }
                    id
                }
            };
            stream.insert(id, fields);
        }
        self.notify(key).await;
        Ok(id)
    }

    /// XRANGE: inclusive `[start, end]`. A missing key reads as empty.
    pub async fn stream_range(
        &self,
        key: &str,
        start: StreamId,
        end: StreamId,
    ) -> Result<Vec<(StreamId, StreamFields)>, StoreError> {
        match self.get(key).await {
            None => Ok(Vec::new()),
            Some(entry) => match entry.value {
                Value::Stream(stream) => Ok(stream.range(start, end)),
                _ => Err(StoreError::WrongType),
            },
        }
    }

    /// XREAD over several keys. `ids` are the raw id arguments (`$` resolves
    /// to the current top of an existing stream, else `0-0`). With a timeout
    /// (`Some(0)` = forever) the call parks on every key's wakeup handle and
    /// rescans when any fires. Returns `(timed_out, per-key entries)` with
    /// only the keys that produced entries, in argument order.
    pub async fn stream_read_any(
        &self,
        keys: &[String],
        ids: &[String],
        timeout_ms: Option<u64>,
    ) -> Result<(bool, Vec<(String, Vec<(StreamId, StreamFields)>)>), StoreError> {
        let bases = self.resolve_bases(keys, ids).await?;

        let found = self.collect_after(keys, &bases).await?;
        if !found.is_empty() {
            return Ok((false, found));
        }
        let Some(timeout_ms) = timeout_ms else {
            return Ok((false, found));
        };

        let deadline = if timeout_ms == 0 {
            None
        } else {
            Some(Instant::now() + Duration::from_millis(timeout_ms))
        };
        let mut wakeups = Vec::with_capacity(keys.len());
        for key in keys {
            wakeups.push(self.wakeup_handle(key).await);
        }

        loop {
            // One helper per key funnels any wakeup into a single channel,
            // like waiting on several queues with one condition variable.
            let (tx, mut rx) = mpsc::channel::<()>(1);
            let helpers: Vec<_> = wakeups
                .iter()
                .cloned()
                .map(|wakeup| {
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        wakeup.notified().await;
                        let _ = tx.try_send(());
                    })
                })
                .collect();
            drop(tx);

            // Rescan after arming so a write in the gap is not lost.
            let found = self.collect_after(keys, &bases).await?;
            if !found.is_empty() {
                abort_all(&helpers);
                return Ok((false, found));
            }

            let woke = match deadline {
                None => rx.recv().await.is_some(),
                Some(deadline) => {
                    let now = Instant::now();
                    now < deadline
                        && tokio::time::timeout(deadline - now, rx.recv())
                            .await
                            .is_ok()
                }
            };
            abort_all(&helpers);
            if !woke {
                return Ok((true, Vec::new()));
            }
            let found = self.collect_after(keys, &bases).await?;
            if !found.is_empty() {
                return Ok((false, found));
            }
        }
    }

    async fn resolve_bases(
        &self,
        keys: &[String],
        ids: &[String],
    ) -> Result<Vec<StreamId>, StoreError> {
        let map = self.map().read().await;
        let mut bases = Vec::with_capacity(keys.len());
        for (key, id) in keys.iter().zip(ids) {
            if id == "$" {
                let base = match map.get(key).filter(|entry| !entry.is_expired()) {
                    Some(entry) => match &entry.value {
                        Value::Stream(stream) => stream.top_id().unwrap_or(StreamId::ZERO),
                        _ => return Err(StoreError::WrongType),
                    },
                    None => StreamId::ZERO,
                };
                bases.push(base);
            } else {
                bases.push(parse_stream_id(id)?);
            }
        }
        Ok(bases)
    }

    async fn collect_after(
        &self,
        keys: &[String],
        bases: &[StreamId],
    ) -> Result<Vec<(String, Vec<(StreamId, StreamFields)>)>, StoreError> {
        let map = self.map().read().await;
        let mut out = Vec::new();
        for (key, base) in keys.iter().zip(bases) {
            let Some(entry) = map.get(key).filter(|entry| !entry.is_expired()) else {
                continue;
            };
            let Value::Stream(stream) = &entry.value else {
                return Err(StoreError::WrongType);
            };
            let entries = stream.entries_after(*base);
            if !entries.is_empty() {
                out.push((key.clone(), entries));
            }
        }
        Ok(out)
    }
}

fn abort_all(helpers: &[tokio::task::JoinHandle<()>]) {
    for helper in helpers {
        helper.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fields() -> StreamFields {
        vec![("f".into(), "v".into())]
    }

    #[tokio::test]
    async fn explicit_ids_must_strictly_increase() {
        let store = Store::new();
        assert_eq!(
            store.stream_add("s", "1-1", fields()).await.unwrap(),
            StreamId::new(1, 1)
        );
        assert_eq!(
            store.stream_add("s", "1-2", fields()).await.unwrap(),
            StreamId::new(1, 2)
        );
        assert_eq!(
            store.stream_add("s", "1-1", fields()).await.unwrap_err(),
            StoreError::StreamIdTooSmall
        );
        assert_eq!(
            store.stream_add("s", "0-0", fields()).await.unwrap_err(),
            StoreError::StreamIdZero
        );
    }

    #[tokio::test]
    async fn partial_ids_fill_the_sequence() {
        let store = Store::new();
        assert_eq!(
            store.stream_add("s", "0-*", fields()).await.unwrap(),
            StreamId::new(0, 1)
        );
        assert_eq!(
            store.stream_add("s", "0-*", fields()).await.unwrap(),
            StreamId::new(0, 2)
        );
        assert_eq!(
            store.stream_add("s", "5-5", fields()).await.unwrap(),
            StreamId::new(5, 5)
        );
        assert_eq!(
            store.stream_add("s", "5-*", fields()).await.unwrap(),
            StreamId::new(5, 6)
        );
    }

    #[tokio::test]
    async fn auto_ids_use_the_clock() {
        let store = Store::new();
        let first = store.stream_add("s", "*", fields()).await.unwrap();
        let second = store.stream_add("s", "*", fields()).await.unwrap();
        assert!(second > first);
        assert!(first.ms > 0);
    }

    #[tokio::test]
    async fn future_timestamps_are_rejected() {
        let store = Store::new();
        let future_ms = now_ms() + 60_000;
        let id = format!("{}-1", future_ms);
        assert_eq!(
            store.stream_add("s", &id, fields()).await.unwrap_err(),
            StoreError::StreamIdFromFuture
        );
    }

    #[tokio::test]
    async fn range_bounds_parse_sentinels() {
        assert_eq!(parse_range_start("-").unwrap(), StreamId::ZERO);
        assert_eq!(parse_range_end("+").unwrap(), StreamId::MAX);
        assert_eq!(parse_range_start("5").unwrap(), StreamId::new(5, 0));
        assert_eq!(parse_range_end("5").unwrap(), StreamId::new(5, u64::MAX));
        assert_eq!(parse_range_end("5-7").unwrap(), StreamId::new(5, 7));
        assert!(parse_stream_id("abc").is_err());
    }

    #[tokio::test]
    async fn read_any_resolves_dollar_to_top() {
        let store = Store::new();
        store.stream_add("s", "1-1", fields()).await.unwrap();
        let keys = vec!["s".to_string()];
        let ids = vec!["$".to_string()];
        // Nothing after the current top.
        let (timed_out, found) = store.stream_read_any(&keys, &ids, None).await.unwrap();
        assert!(!timed_out);
        assert!(found.is_empty());
        // Everything after 0-0.
        let ids = vec!["0-0".to_string()];
        let (_, found) = store.stream_read_any(&keys, &ids, None).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].1[0].0, StreamId::new(1, 1));
    }

    #[tokio::test]
    async fn blocking_read_wakes_on_add() {
        let store = Arc::new(Store::new());
        store.stream_add("s", "1-1", fields()).await.unwrap();
        let reader = {
            let store = store.clone();
            tokio::spawn(async move {
                let keys = vec!["s".to_string()];
                let ids = vec!["1-1".to_string()];
                store
                    .stream_read_any(&keys, &ids, Some(5_000))
                    .await
                    .unwrap()
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.stream_add("s", "2-0", fields()).await.unwrap();
        let (timed_out, found) = reader.await.unwrap();
        assert!(!timed_out);
        assert_eq!(found[0].1[0].0, StreamId::new(2, 0));
    }

    #[tokio::test]
    async fn blocking_read_times_out() {
        let store = Store::new();
        let keys = vec!["missing".to_string()];
        let ids = vec!["$".to_string()];
        let (timed_out, found) = store.stream_read_any(&keys, &ids, Some(30)).await.unwrap();
        assert!(timed_out);
        assert!(found.is_empty());
    }
}
