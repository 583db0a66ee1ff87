//! crates/ev_tracker_core/src/geocache.rs
//!
//! A memoizing decorator for any `Geocoder`. Answers (including "not found")
//! are kept for the life of the process; failed lookups are not cached.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::domain::Coordinates;
use crate::ports::{Geocoder, PortResult};

pub struct CachingGeocoder<G> {
    inner: G,
    answers: Mutex<HashMap<String, Option<Coordinates>>>,
}

impl<G: Geocoder> CachingGeocoder<G> {
    pub fn new(inner: G) -> Self {
        Self {
            inner,
            answers: Mutex::new(HashMap::new()),
        }
    }

    pub fn cached_len(&self) -> usize {
        self.answers().len()
    }

    fn answers(&self) -> MutexGuard<'_, HashMap<String, Option<Coordinates>>> {
        self.answers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<G: Geocoder> Geocoder for CachingGeocoder<G> {
    async fn geocode(&self, place: &str) -> PortResult<Option<Coordinates>> {
        let key = place.trim();
        let cached = self.answers().get(key).copied();
        if let Some(answer) = cached {
            debug!("Geocode cache hit for '{}'", key);
            return Ok(answer);
        }

        let answer = self.inner.geocode(key).await?;
        self.answers().insert(key.to_string(), answer);
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::PortError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingGeocoder {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Geocoder for CountingGeocoder {
        async fn geocode(&self, place: &str) -> PortResult<Option<Coordinates>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Lookup("offline".to_string()));
            }
            Ok((place == "KLCC").then(|| Coordinates::new(3.158, 101.712)))
        }
    }

    fn counting(fail: bool) -> CachingGeocoder<CountingGeocoder> {
        CachingGeocoder::new(CountingGeocoder {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn repeated_lookups_hit_the_provider_once() {
        let geocoder = counting(false);
        for place in ["KLCC", " KLCC ", "KLCC"] {
            assert_eq!(
                geocoder.geocode(place).await.unwrap(),
                Some(Coordinates::new(3.158, 101.712))
            );
        }
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn not_found_is_cached_too() {
        let geocoder = counting(false);
        assert_eq!(geocoder.geocode("Nowhere").await.unwrap(), None);
        assert_eq!(geocoder.geocode("Nowhere").await.unwrap(), None);
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 1);
        assert_eq!(geocoder.cached_len(), 1);
    }

    #[tokio::test]
    async fn failures_are_retried_on_the_next_call() {
        let geocoder = counting(true);
        assert!(geocoder.geocode("KLCC").await.is_err());
        assert!(geocoder.geocode("KLCC").await.is_err());
        assert_eq!(geocoder.inner.calls.load(Ordering::SeqCst), 2);
        assert_eq!(geocoder.cached_len(), 0);
    }
}
