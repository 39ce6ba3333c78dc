//! Shuffle target selection
//!
//! A shuffle rule does not name a target. The source is classified into a
//! distraction category, the category is paired with a productive
//! counterpart, and one site is drawn at random from that counterpart.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::url::normalize;

/// Resolves the shuffle sentinel to a concrete URL.
pub trait ShufflePicker {
    /// Pick a target URL for a shuffle rule whose source is `source`.
    fn pick(&mut self, source: &str) -> String;
}

impl<F> ShufflePicker for F
where
    F: FnMut(&str) -> String,
{
    fn pick(&mut self, source: &str) -> String {
        self(source)
    }
}

// =============================================================================
// Categories
// =============================================================================

/// What kind of time sink a source is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DistractionCategory {
    Social,
    Video,
    News,
    Shopping,
    Gaming,
    Forums,
    Other,
}

/// Where to send someone instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProductiveCategory {
    Writing,
    Learning,
    Reading,
    Finance,
    Puzzles,
    Coding,
    Wellbeing,
}

const SOCIAL: &[&str] = &[
    "facebook.com", "instagram.com", "twitter.com", "x.com", "tiktok.com",
    "snapchat.com", "linkedin.com", "pinterest.com", "threads.net", "bsky.app",
];
const VIDEO: &[&str] = &[
    "youtube.com", "youtu.be", "netflix.com", "twitch.tv", "hulu.com",
    "disneyplus.com", "primevideo.com", "vimeo.com",
];
const NEWS: &[&str] = &[
    "cnn.com", "bbc.com", "bbc.co.uk", "foxnews.com", "nytimes.com",
    "theguardian.com", "news.google.com", "bloomberg.com",
];
const SHOPPING: &[&str] = &[
    "amazon.com", "ebay.com", "etsy.com", "aliexpress.com", "walmart.com",
    "target.com", "temu.com", "shein.com",
];
const GAMING: &[&str] = &[
    "store.steampowered.com", "steamcommunity.com", "roblox.com", "epicgames.com",
    "ign.com", "miniclip.com", "chess.com",
];
const FORUMS: &[&str] = &[
    "reddit.com", "news.ycombinator.com", "9gag.com", "4chan.org", "quora.com",
    "tumblr.com",
];

const WRITING: &[&str] = &[
    "https://750words.com",
    "https://www.grammarly.com/blog",
    "https://www.poetryfoundation.org",
];
const LEARNING: &[&str] = &[
    "https://www.khanacademy.org",
    "https://www.coursera.org",
    "https://www.edx.org",
    "https://ocw.mit.edu",
    "https://www.duolingo.com",
];
const READING: &[&str] = &[
    "https://en.wikipedia.org/wiki/Special:Random",
    "https://www.gutenberg.org",
    "https://arxiv.org",
    "https://aeon.co",
];
const FINANCE: &[&str] = &[
    "https://www.investopedia.com",
    "https://www.khanacademy.org/college-careers-more/personal-finance",
];
const PUZZLES: &[&str] = &[
    "https://lichess.org/training",
    "https://brilliant.org",
    "https://projecteuler.net",
];
const CODING: &[&str] = &[
    "https://exercism.org",
    "https://www.codewars.com",
    "https://leetcode.com",
    "https://doc.rust-lang.org/book",
];
const WELLBEING: &[&str] = &[
    "https://www.calm.com/breathe",
    "https://www.headspace.com",
];

impl DistractionCategory {
    /// Classify a source URL or domain.
    ///
    /// A source belongs to a category when its host equals a listed domain
    /// or is a subdomain of one.
    pub fn classify(source: &str) -> Self {
        let normalized = normalize(source);
        let host = normalized
            .split(|c| c == '/' || c == '?' || c == '#' || c == ':')
            .next()
            .unwrap_or("");

        let table: [(&[&str], Self); 6] = [
            (SOCIAL, Self::Social),
            (VIDEO, Self::Video),
            (NEWS, Self::News),
            (SHOPPING, Self::Shopping),
            (GAMING, Self::Gaming),
            (FORUMS, Self::Forums),
        ];

        for (domains, category) in table {
            if domains.iter().any(|d| host_matches(host, d)) {
                return category;
            }
        }
        Self::Other
    }

    /// Thematic counterpart of a distraction.
    pub fn antidote(self) -> ProductiveCategory {
        match self {
            Self::Social => ProductiveCategory::Writing,
            Self::Video => ProductiveCategory::Learning,
            Self::News => ProductiveCategory::Reading,
            Self::Shopping => ProductiveCategory::Finance,
            Self::Gaming => ProductiveCategory::Puzzles,
            Self::Forums => ProductiveCategory::Coding,
            Self::Other => ProductiveCategory::Wellbeing,
        }
    }
}

impl ProductiveCategory {
    /// Candidate sites for this category.
    pub fn sites(self) -> &'static [&'static str] {
        match self {
            Self::Writing => WRITING,
            Self::Learning => LEARNING,
            Self::Reading => READING,
            Self::Finance => FINANCE,
            Self::Puzzles => PUZZLES,
            Self::Coding => CODING,
            Self::Wellbeing => WELLBEING,
        }
    }
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || (host.len() > domain.len()
            && host.ends_with(domain)
            && host.as_bytes()[host.len() - domain.len() - 1] == b'.')
}

// =============================================================================
// Selector
// =============================================================================

/// Random shuffle picker backed by the category tables.
pub struct AntidoteSelector<R: Rng> {
    rng: R,
}

impl<R: Rng> AntidoteSelector<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> ShufflePicker for AntidoteSelector<R> {
    fn pick(&mut self, source: &str) -> String {
        let category = DistractionCategory::classify(source).antidote();
        let site = category
            .sites()
            .choose(&mut self.rng)
            .copied()
            .unwrap_or(WELLBEING[0]);
        log::debug!("shuffle: {} -> {:?} -> {}", source, category, site);
        site.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_classify() {
        assert_eq!(DistractionCategory::classify("https://www.youtube.com/watch?v=1"), DistractionCategory::Video);
        assert_eq!(DistractionCategory::classify("m.facebook.com"), DistractionCategory::Social);
        assert_eq!(DistractionCategory::classify("old.reddit.com/r/rust"), DistractionCategory::Forums);
        assert_eq!(DistractionCategory::classify("x.com"), DistractionCategory::Social);
        assert_eq!(DistractionCategory::classify("example.org"), DistractionCategory::Other);
    }

    #[test]
    fn test_classify_requires_label_boundary() {
        // "notx.com" must not be treated as x.com
        assert_eq!(DistractionCategory::classify("notx.com"), DistractionCategory::Other);
    }

    #[test]
    fn test_every_category_has_sites() {
        for category in [
            ProductiveCategory::Writing,
            ProductiveCategory::Learning,
            ProductiveCategory::Reading,
            ProductiveCategory::Finance,
            ProductiveCategory::Puzzles,
            ProductiveCategory::Coding,
            ProductiveCategory::Wellbeing,
        ] {
            assert!(!category.sites().is_empty(), "{:?}", category);
        }
    }

    #[test]
    fn test_selector_picks_from_antidote_category() {
        let mut selector = AntidoteSelector::new(StdRng::seed_from_u64(7));
        for _ in 0..20 {
            let site = selector.pick("youtube.com");
            assert!(LEARNING.contains(&site.as_str()), "{}", site);
        }
    }

    #[test]
    fn test_closure_picker() {
        let mut picker = |_: &str| "https://fixed.example".to_string();
        assert_eq!(picker.pick("a.com"), "https://fixed.example");
    }
}
