//! New-post notifications for the page.
//!
//! An [`UpdateSource`] is chosen once: posts either arrive over a push
//! channel or are polled from the backend. A [`PostFeed`] keeps the posts
//! currently on display, each expiring an hour after it was created.

use crate::error::{LiftError, Result};
use crate::http::Request;
use crate::network::DynFetcher;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Interval, MissedTickBehavior};
use tracing::{debug, warn};
use url::Url;

/// A post as returned by `/api/posts/recent`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Where the notification links to.
    pub fn link(&self) -> String {
        self.url
            .clone()
            .unwrap_or_else(|| format!("/posts/{}", self.id))
    }
}

/// Accept numeric or string ids.
fn id_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(i64),
        Text(String),
    }

    Ok(match RawId::deserialize(deserializer)? {
        RawId::Number(n) => n.to_string(),
        RawId::Text(s) => s,
    })
}

#[derive(Debug, Clone)]
pub struct PollOptions {
    pub interval: Duration,
    /// Only posts created this recently count as new.
    pub window: Duration,
    pub endpoint: String,
}

impl Default for PollOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            window: Duration::from_secs(60),
            endpoint: "/api/posts/recent".to_string(),
        }
    }
}

/// Periodically fetches recent posts from the backend.
pub struct Poller {
    fetcher: DynFetcher,
    endpoint: Url,
    window: ChronoDuration,
    ticker: Interval,
}

impl Poller {
    pub fn new(fetcher: DynFetcher, origin: &Url, options: PollOptions) -> Result<Self> {
        if options.interval.is_zero() {
            return Err(LiftError::Config {
                message: "Poll interval must be greater than zero".to_string(),
            });
        }
        let endpoint = origin
            .join(&options.endpoint)
            .map_err(|e| LiftError::InvalidUrl {
                url: options.endpoint.clone(),
                message: e.to_string(),
            })?;
        let mut ticker = interval(options.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Ok(Self {
            fetcher,
            endpoint,
            window: ChronoDuration::from_std(options.window).unwrap_or(ChronoDuration::seconds(60)),
            ticker,
        })
    }

    /// Fetch every post the endpoint returns. Errors are logged and yield
    /// an empty list.
    pub async fn fetch_all(&self) -> Vec<Post> {
        let request = match Request::get(self.endpoint.as_str()) {
            Ok(request) => request,
            Err(e) => {
                warn!("Invalid posts endpoint: {}", e);
                return Vec::new();
            }
        };

        let response = match self.fetcher.fetch(&request).await {
            Ok(response) if response.status.is_success() => response,
            Ok(response) => {
                warn!("Failed to fetch recent posts: HTTP {}", response.status);
                return Vec::new();
            }
            Err(e) => {
                warn!("Failed to fetch recent posts: {}", e);
                return Vec::new();
            }
        };

        response.json::<Vec<Post>>().unwrap_or_else(|e| {
            warn!("Malformed recent posts response: {}", e);
            Vec::new()
        })
    }

    /// Wait for the next tick, then return posts created within the window.
    pub async fn poll(&mut self) -> Vec<Post> {
        self.ticker.tick().await;
        let cutoff = Utc::now() - self.window;
        self.fetch_all()
            .await
            .into_iter()
            .filter(|p| p.created_at.is_some_and(|t| t > cutoff))
            .collect()
    }
}

/// Where new posts come from.
pub enum UpdateSource {
    Push(broadcast::Receiver<Post>),
    Poll(Poller),
}

impl UpdateSource {
    /// Next batch of new posts, or `None` once a push channel has closed.
    pub async fn next_batch(&mut self) -> Option<Vec<Post>> {
        match self {
            UpdateSource::Push(receiver) => {
                let first = loop {
                    match receiver.recv().await {
                        Ok(post) => break post,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!("Post channel lagged, {} posts skipped", skipped);
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                };
                let mut batch = vec![first];
                while let Ok(post) = receiver.try_recv() {
                    batch.push(post);
                }
                Some(batch)
            }
            UpdateSource::Poll(poller) => Some(poller.poll().await),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeedOptions {
    /// How long a post stays on display after it was created.
    pub lifetime: Duration,
    /// How far back `load_recent` reaches.
    pub recent_window: Duration,
}

impl Default for FeedOptions {
    fn default() -> Self {
        Self {
            lifetime: Duration::from_secs(60 * 60),
            recent_window: Duration::from_secs(60 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivePost {
    pub post: Post,
    pub link: String,
    pub expires_at: DateTime<Utc>,
}

impl ActivePost {
    /// Whole minutes left, rounded up.
    pub fn remaining_minutes(&self, now: DateTime<Utc>) -> i64 {
        let seconds = (self.expires_at - now).num_seconds().max(0);
        (seconds + 59) / 60
    }
}

/// Posts currently on display, keyed by id.
pub struct PostFeed {
    lifetime: ChronoDuration,
    recent_window: ChronoDuration,
    active: HashMap<String, ActivePost>,
}

impl Default for PostFeed {
    fn default() -> Self {
        Self::new(FeedOptions::default())
    }
}

impl PostFeed {
    pub fn new(options: FeedOptions) -> Self {
        Self {
            lifetime: ChronoDuration::from_std(options.lifetime)
                .unwrap_or(ChronoDuration::hours(1)),
            recent_window: ChronoDuration::from_std(options.recent_window)
                .unwrap_or(ChronoDuration::hours(1)),
            active: HashMap::new(),
        }
    }

    /// Show a post. Known ids and already expired posts are skipped.
    pub fn add(&mut self, post: Post, now: DateTime<Utc>) -> bool {
        if self.active.contains_key(&post.id) {
            return false;
        }

        let expires_at = post.created_at.unwrap_or(now) + self.lifetime;
        if expires_at <= now {
            debug!("Skipping expired post {}", post.id);
            return false;
        }

        let link = post.link();
        self.active.insert(
            post.id.clone(),
            ActivePost {
                post,
                link,
                expires_at,
            },
        );
        true
    }

    /// Add posts created within the recent window. Returns how many were added.
    pub fn load_recent(&mut self, posts: Vec<Post>, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.recent_window;
        posts
            .into_iter()
            .filter(|p| p.created_at.is_some_and(|t| t > cutoff))
            .filter(|p| self.add(p.clone(), now))
            .count()
    }

    /// Drop expired posts and return their ids.
    pub fn expire(&mut self, now: DateTime<Utc>) -> Vec<String> {
        let expired: Vec<String> = self
            .active
            .iter()
            .filter(|(_, a)| a.expires_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &expired {
            self.active.remove(id);
        }
        expired
    }

    pub fn dismiss(&mut self, id: &str) -> bool {
        self.active.remove(id).is_some()
    }

    pub fn get(&self, id: &str) -> Option<&ActivePost> {
        self.active.get(id)
    }

    /// Active posts, soonest expiry first.
    pub fn active(&self) -> Vec<&ActivePost> {
        let mut posts: Vec<&ActivePost> = self.active.values().collect();
        posts.sort_by_key(|a| a.expires_at);
        posts
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
