//! Feed ordering and age labels.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Post;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedOrder {
    /// Newest first.
    #[default]
    Recent,
    /// Highest likes + comments first.
    Popular,
}

impl std::str::FromStr for FeedOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "recent" | "new" => Ok(Self::Recent),
            "popular" | "top" => Ok(Self::Popular),
            other => Err(format!("unknown feed order: {other}")),
        }
    }
}

/// Stable in-place sort; ties keep their incoming order.
pub fn sort_posts(posts: &mut [Post], order: FeedOrder) {
    match order {
        FeedOrder::Recent => posts.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        FeedOrder::Popular => posts.sort_by(|a, b| b.engagement().cmp(&a.engagement())),
    }
}

/// Coarse age bucket of a post, for list rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAge {
    UnderAnHour,
    Hours(i64),
    Yesterday,
    /// Older than two days; render the date itself.
    On(DateTime<Utc>),
}

pub fn post_age(created_at: DateTime<Utc>, now: DateTime<Utc>) -> PostAge {
    let hours = (now - created_at).num_hours();
    match hours {
        h if h < 1 => PostAge::UnderAnHour,
        h if h < 24 => PostAge::Hours(h),
        h if h < 48 => PostAge::Yesterday,
        _ => PostAge::On(created_at),
    }
}
