use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::models::Photo;

/// Display order requested by a visitor of a public album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Stored,
    Latest,
    Popular,
    Random,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Stored => "stored",
            SortOrder::Latest => "latest",
            SortOrder::Popular => "popular",
            SortOrder::Random => "random",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stored" => Ok(SortOrder::Stored),
            "latest" => Ok(SortOrder::Latest),
            "popular" => Ok(SortOrder::Popular),
            "random" => Ok(SortOrder::Random),
            _ => Err(()),
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Returns a display copy of the photos; stored order is left alone.
/// Secret albums always keep upload order.
pub fn sort_for_display(photos: &[Photo], order: SortOrder, is_secret: bool) -> Vec<Photo> {
    let mut sorted = photos.to_vec();
    if is_secret {
        return sorted;
    }

    match order {
        SortOrder::Stored => {}
        // None sorts last, as the oldest
        SortOrder::Latest => sorted.sort_by(|a, b| b.added_at.cmp(&a.added_at)),
        SortOrder::Popular => sorted.sort_by(|a, b| b.likes.cmp(&a.likes)),
        // Fisher-Yates
        SortOrder::Random => sorted.shuffle(&mut rand::rng()),
    }
    sorted
}
