//! Al Jazeera search scraper.
//!
//! Searches [aljazeera.com](https://www.aljazeera.com) sorted by date. The
//! results page renders ten articles at a time and appends more each time
//! the "Show more" button is clicked; the cursor skips the articles it has
//! already read.
//!
//! # URL Pattern
//!
//! `https://www.aljazeera.com/search/<escaped phrase>?sort=date`

use super::NewsSite;
use crate::locator::ArticleLocator;
use once_cell::sync::Lazy;
use regex::Regex;

/// "2 hours ago ..." or "19 Aug 2024 ..." stamped in front of the excerpt.
static STAMP_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:\d+\s+\w+\s+ago|\d{1,2}\s+\w{3}\s+\d{4})\s*(?:\.{3}|…)?\s*")
        .expect("valid stamp regex")
});

#[derive(Debug, Clone, Copy, Default)]
pub struct Aljazeera;

impl ArticleLocator for Aljazeera {
    const DATE: &'static str = ".//footer//span[2]";
    const TITLE: &'static str = ".//h3[@class='gc__title']";
    const LINK: &'static str = ".//a";
    const DESCRIPTION: &'static str = ".//div[@class='gc__body-wrap']//p";
    const PICTURE: &'static str = ".//img";

    fn clean_description(text: &str) -> String {
        STAMP_PREFIX
            .replace(text, "")
            .trim_end()
            .trim_end_matches(['.', '…'])
            .trim()
            .to_string()
    }
}

impl NewsSite for Aljazeera {
    const NAME: &'static str = "aljazeera";
    const BASE_URL: &'static str = "https://www.aljazeera.com";
    const RESULT_LIST: &'static str = "//div[@class='search-result__list']";
    const CONTENT_NODE: &'static str = ".//article";
    const NEXT_PAGE: &'static str = "//button[contains(@class, 'show-more-button')]";
    const LOADING: &'static str = "//div[contains(@class, 'show-more-button--loading')]";
    // The search page offers no section filter.
    const SECTION_CONTROL: Option<&'static str> = None;
    const SECTION_OPTION: &'static str = ".//button";

    fn search_url(phrase: &str) -> String {
        format!(
            "{}/search/{}?sort=date",
            Self::BASE_URL,
            urlencoding::encode(phrase.trim())
        )
    }
}
