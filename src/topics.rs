// src/topics.rs
//! Browse-by-topic classification: a fixed, curated taxonomy matched by tag.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::post::Post;

pub const DEFAULT_MAX_TOPICS: usize = 6;
pub const DEFAULT_MAX_POSTS_PER_TOPIC: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicDefinition {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub match_tags: Vec<String>,
}

impl TopicDefinition {
    pub fn new(id: &str, title: &str, description: &str, match_tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            match_tags: match_tags.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// One non-empty topic with its posts, newest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicBucket {
    #[serde(flatten)]
    pub topic: TopicDefinition,
    pub posts: Vec<Post>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TopicLimits {
    pub max_topics: usize,
    pub max_posts_per_topic: usize,
}

impl Default for TopicLimits {
    fn default() -> Self {
        Self {
            max_topics: DEFAULT_MAX_TOPICS,
            max_posts_per_topic: DEFAULT_MAX_POSTS_PER_TOPIC,
        }
    }
}

/// Built-in felt-need taxonomy.
pub fn default_topics() -> Vec<TopicDefinition> {
    vec![
        TopicDefinition::new(
            "loss-grief",
            "Loss & Grief",
            "Resources for those walking through loss, sadness, or deep hurt.",
            &["Loss", "Grief", "Pain", "Death", "Hurting", "Trauma"],
        ),
        TopicDefinition::new(
            "anxiety-stress",
            "Anxiety & Overwhelm",
            "Help when your mind won't stop racing and your heart feels heavy.",
            &["Anxiety", "Stress", "Overwhelmed", "Fear", "Worry"],
        ),
        TopicDefinition::new(
            "healing-trauma",
            "Healing & Recovery",
            "Finding hope and healing from what you've been through.",
            &["Trauma", "Healing", "Hurting", "Weary", "Tired"],
        ),
        TopicDefinition::new(
            "purpose-meaning",
            "Purpose & Calling",
            "For when you're asking, \"Why am I here?\" and \"Does my life matter?\"",
            &["Purpose", "Meaning", "Goals", "Discovery", "Personal Growth"],
        ),
        TopicDefinition::new(
            "marriage-family",
            "Marriage & Family",
            "Encouragement for the relationships that matter most.",
            &["Marriage", "Family", "Parenting", "Kids", "Relationships"],
        ),
        TopicDefinition::new(
            "faith-doubt",
            "Faith & Doubt",
            "Honest answers for big questions about God and Christianity.",
            &["Faith", "Doubts", "Christianity", "Christian Faith", "Apologetics"],
        ),
    ]
}

/// Bucket posts by topic, in definition order. Within a topic posts are
/// sorted newest first (ties keep feed order) and truncated independently.
/// Topics without matches are omitted, then the list is truncated.
pub fn classify(
    posts: &[Post],
    topics: &[TopicDefinition],
    limits: TopicLimits,
    fold_case: bool,
) -> Vec<TopicBucket> {
    let key = |t: &str| {
        if fold_case {
            t.to_lowercase()
        } else {
            t.to_string()
        }
    };

    topics
        .iter()
        .filter_map(|topic| {
            let wanted: HashSet<String> = topic.match_tags.iter().map(|t| key(t.as_str())).collect();
            let mut matches: Vec<&Post> = posts
                .iter()
                .filter(|p| p.tags.iter().any(|t| wanted.contains(&key(t.as_str()))))
                .collect();
            if matches.is_empty() {
                return None;
            }
            // `sort_by` is stable: equal timestamps keep feed order.
            matches.sort_by(|a, b| b.published_at.cmp(&a.published_at));
            matches.truncate(limits.max_posts_per_topic);
            Some(TopicBucket {
                topic: topic.clone(),
                posts: matches.into_iter().cloned().collect(),
            })
        })
        .take(limits.max_topics)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(title: &str, tags: &[&str], published_at: i64) -> Post {
        Post {
            url: format!("/blog/{}", title.to_lowercase()),
            title: title.to_string(),
            slug: title.to_lowercase(),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            excerpt: String::new(),
            thumbnail: String::new(),
            published_at,
        }
    }

    fn titles(b: &TopicBucket) -> Vec<&str> {
        b.posts.iter().map(|p| p.title.as_str()).collect()
    }

    #[test]
    fn untagged_post_lands_nowhere() {
        let posts = vec![post("Bare", &[], 10)];
        assert!(classify(&posts, &default_topics(), TopicLimits::default(), false).is_empty());
    }

    #[test]
    fn post_can_sit_in_two_topics() {
        // "Trauma" belongs to both loss-grief and healing-trauma.
        let posts = vec![post("T", &["Trauma"], 1)];
        let out = classify(&posts, &default_topics(), TopicLimits::default(), false);
        let ids: Vec<_> = out.iter().map(|b| b.topic.id.as_str()).collect();
        assert_eq!(ids, vec!["loss-grief", "healing-trauma"]);
    }

    #[test]
    fn newest_first_with_stable_ties_and_per_topic_cap() {
        let posts = vec![
            post("Old", &["Grief"], 1),
            post("TieA", &["Loss"], 5),
            post("New", &["Death"], 9),
            post("TieB", &["Pain"], 5),
        ];
        let limits = TopicLimits {
            max_topics: 6,
            max_posts_per_topic: 3,
        };
        let out = classify(&posts, &default_topics(), limits, false);
        assert_eq!(out.len(), 1);
        assert_eq!(titles(&out[0]), vec!["New", "TieA", "TieB"]);
    }

    #[test]
    fn topic_count_is_capped_in_definition_order() {
        let posts = vec![
            post("F", &["Faith"], 1),
            post("M", &["Marriage"], 1),
            post("G", &["Grief"], 1),
        ];
        let limits = TopicLimits {
            max_topics: 2,
            max_posts_per_topic: 3,
        };
        let out = classify(&posts, &default_topics(), limits, false);
        let ids: Vec<_> = out.iter().map(|b| b.topic.id.as_str()).collect();
        assert_eq!(ids, vec!["loss-grief", "marriage-family"]);
    }

    #[test]
    fn tag_match_is_exact_unless_folded() {
        let posts = vec![post("g", &["grief"], 1)];
        assert!(classify(&posts, &default_topics(), TopicLimits::default(), false).is_empty());
        assert_eq!(
            classify(&posts, &default_topics(), TopicLimits::default(), true).len(),
            1
        );
    }
}
