//! Release and file name parser.
//!
//! Understands scene-style names such as:
//! - "Show.Name.S01E05.1080p.WEB-DL-GROUP"
//! - "Show Name S01E01-E08 720p"
//! - "Show Name Season 1-3 Complete 1080p BluRay"
//! - "Show Name 1x05 HDTV"
//! - "Movie Title 2019 2160p UHD BluRay Remux"

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use super::{EpisodeSet, MediaType};

static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bS(\d{1,2})\s?((?:EP|E)\d{1,4}(?:\s?-\s?(?:EP|E)?\d{1,4}|(?:EP|E)\d{1,4})*)\b")
        .unwrap()
});
static CROSS_FORMAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})x(\d{2,3})\b").unwrap());
static SEASON_RANGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\s?-\s?S?(\d{1,2})\b").unwrap());
static SEASON_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bSeason\s?(\d{1,2})(?:\s?-\s?(\d{1,2}))?\b").unwrap());
static SEASON_SINGLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bS(\d{1,2})\b").unwrap());
static EPISODE_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:Episode|EP|E)\s?(\d{1,4})(?:\s?-\s?(?:EP|E)?(\d{1,4}))?\b").unwrap()
});
static YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static RESOLUTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(2160p|4k|uhd|1080[pi]|720p|576p|480p)\b").unwrap());
static SOURCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(blu-?ray|bdrip|brrip|remux|web-?dl|webrip|hdtv|dvdrip|web)\b").unwrap()
});
static GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"-([A-Za-z0-9]+)$").unwrap());
static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "ts", "m2ts", "wmv", "mov", "flv", "rmvb", "iso", "webm", "mpg", "mpeg",
    "m4v",
];

/// Vertical resolution class of a release.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    #[serde(rename = "480p")]
    Sd480,
    #[serde(rename = "576p")]
    Sd576,
    #[serde(rename = "720p")]
    Hd720,
    #[serde(rename = "1080p")]
    Hd1080,
    #[serde(rename = "2160p")]
    Uhd2160,
}

impl Resolution {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "480p" => Some(Resolution::Sd480),
            "576p" => Some(Resolution::Sd576),
            "720p" => Some(Resolution::Hd720),
            "1080p" | "1080i" => Some(Resolution::Hd1080),
            "2160p" | "4k" | "uhd" => Some(Resolution::Uhd2160),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::Sd480 => "480p",
            Resolution::Sd576 => "576p",
            Resolution::Hd720 => "720p",
            Resolution::Hd1080 => "1080p",
            Resolution::Uhd2160 => "2160p",
        }
    }
}

/// Structured metadata parsed out of a release or file name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseMeta {
    /// Title text before the first season/episode/year/quality marker.
    pub title: String,
    pub year: Option<u32>,
    pub seasons: EpisodeSet,
    pub episodes: EpisodeSet,
    pub resolution: Option<Resolution>,
    pub source: Option<String>,
    pub group: Option<String>,
}

impl ReleaseMeta {
    /// TV when any season or episode marker was found.
    pub fn media_type(&self) -> MediaType {
        if self.seasons.is_empty() && self.episodes.is_empty() {
            MediaType::Movie
        } else {
            MediaType::Tv
        }
    }

    pub fn is_parsable(&self) -> bool {
        !self.title.is_empty()
    }
}

/// Whether a path names a video file, judged by extension.
pub fn is_video_file(path: &str) -> bool {
    extension(path)
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn extension(path: &str) -> Option<&str> {
    let file = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (stem, ext) = file.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext)
}

/// Parse a release title or a file path inside a payload.
pub fn parse_release(name: &str) -> ReleaseMeta {
    let file = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let stem = if is_video_file(file) {
        file.rsplit_once('.').map(|(s, _)| s).unwrap_or(file)
    } else {
        file
    };

    let normalized = normalize(stem);
    let mut meta = ReleaseMeta::default();
    // Byte offsets of every marker; the title ends at the earliest one.
    let mut markers: Vec<usize> = Vec::new();

    if let Some(caps) = SEASON_EPISODE.captures(&normalized) {
        if let (Some(whole), Some(season)) = (caps.get(0), caps.get(1)) {
            markers.push(whole.start());
            if let Ok(s) = season.as_str().parse() {
                meta.seasons.insert(s);
            }
            if let Some(eps) = caps.get(2) {
                meta.episodes = episode_numbers(eps.as_str());
            }
        }
    } else if let Some(caps) = CROSS_FORMAT.captures(&normalized) {
        if let (Some(whole), Some(season), Some(episode)) = (caps.get(0), caps.get(1), caps.get(2))
        {
            markers.push(whole.start());
            if let (Ok(s), Ok(e)) = (season.as_str().parse(), episode.as_str().parse()) {
                meta.seasons.insert(s);
                meta.episodes.insert(e);
            }
        }
    } else {
        if let Some((start, seasons)) = parse_seasons(&normalized) {
            markers.push(start);
            meta.seasons = seasons;
        }
        if let Some(caps) = EPISODE_WORD.captures(&normalized) {
            if let (Some(whole), Some(first)) = (caps.get(0), caps.get(1)) {
                markers.push(whole.start());
                let first: u32 = first.as_str().parse().unwrap_or(0);
                let last: u32 = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(first);
                meta.episodes = inclusive_range(first, last);
            }
        }
        if !meta.episodes.is_empty() && meta.seasons.is_empty() {
            meta.seasons.insert(1);
        }
    }

    if let Some(m) = RESOLUTION.find(&normalized) {
        markers.push(m.start());
        meta.resolution = Resolution::parse(m.as_str());
    }
    if let Some(m) = SOURCE.find(&normalized) {
        markers.push(m.start());
        meta.source = Some(m.as_str().to_string());
    }

    // A year at the very start is part of the title ("1917", "2012").
    let first_quality_marker = markers.iter().copied().min().unwrap_or(normalized.len());
    let year_match = YEAR
        .find_iter(&normalized)
        .filter(|m| m.start() > 0 && m.start() < first_quality_marker)
        .last()
        .or_else(|| {
            YEAR.find_iter(&normalized)
                .find(|m| m.start() > first_quality_marker)
        });
    if let Some(m) = year_match {
        meta.year = m.as_str().parse().ok();
        markers.push(m.start());
    }

    let title_end = markers.iter().copied().min().unwrap_or(normalized.len());
    meta.title = normalized[..title_end]
        .trim()
        .trim_end_matches(['-', ' '])
        .trim()
        .to_string();

    meta.group = GROUP
        .captures(stem.trim())
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|g| !g.chars().all(|c| c.is_ascii_digit()));

    meta
}

fn normalize(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| match c {
            '.' | '_' | '[' | ']' | '(' | ')' | '【' | '】' | '+' => ' ',
            other => other,
        })
        .collect();
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn parse_seasons(normalized: &str) -> Option<(usize, EpisodeSet)> {
    for re in [&*SEASON_RANGE, &*SEASON_WORD] {
        if let Some(caps) = re.captures(normalized) {
            let whole = caps.get(0)?;
            let first: u32 = caps.get(1)?.as_str().parse().ok()?;
            let last: u32 = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .unwrap_or(first);
            return Some((whole.start(), inclusive_range(first, last)));
        }
    }
    let caps = SEASON_SINGLE.captures(normalized)?;
    let whole = caps.get(0)?;
    let season: u32 = caps.get(1)?.as_str().parse().ok()?;
    Some((whole.start(), EpisodeSet::from([season])))
}

/// Episode numbers from the tail of an `SxxEyy` marker: `E05`, `E05E06`, `E05-E08`, `E05-08`.
fn episode_numbers(text: &str) -> EpisodeSet {
    let numbers: Vec<u32> = NUMBER
        .find_iter(text)
        .filter_map(|m| m.as_str().parse().ok())
        .collect();
    if text.contains('-') && numbers.len() == 2 {
        inclusive_range(numbers[0], numbers[1])
    } else {
        numbers.into_iter().collect()
    }
}

fn inclusive_range(first: u32, last: u32) -> EpisodeSet {
    if last < first {
        EpisodeSet::from([first])
    } else {
        (first..=last).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[u32]) -> EpisodeSet {
        items.iter().copied().collect()
    }

    #[test]
    fn test_single_episode() {
        let meta = parse_release("Show.Name.S01E05.1080p.WEB-DL.x264-GROUP");
        assert_eq!(meta.title, "Show Name");
        assert_eq!(meta.seasons, set(&[1]));
        assert_eq!(meta.episodes, set(&[5]));
        assert_eq!(meta.resolution, Some(Resolution::Hd1080));
        assert_eq!(meta.group.as_deref(), Some("GROUP"));
        assert_eq!(meta.media_type(), MediaType::Tv);
    }

    #[test]
    fn test_episode_range() {
        let meta = parse_release("Show Name S02E01-E04 720p");
        assert_eq!(meta.seasons, set(&[2]));
        assert_eq!(meta.episodes, set(&[1, 2, 3, 4]));

        let meta = parse_release("Show Name S02E03-06 720p");
        assert_eq!(meta.episodes, set(&[3, 4, 5, 6]));
    }

    #[test]
    fn test_multi_episode() {
        let meta = parse_release("Show.S03E07E08.HDTV");
        assert_eq!(meta.seasons, set(&[3]));
        assert_eq!(meta.episodes, set(&[7, 8]));
    }

    #[test]
    fn test_whole_season() {
        let meta = parse_release("Show Name S01 1080p BluRay");
        assert_eq!(meta.title, "Show Name");
        assert_eq!(meta.seasons, set(&[1]));
        assert!(meta.episodes.is_empty());
        assert_eq!(meta.media_type(), MediaType::Tv);
    }

    #[test]
    fn test_season_range() {
        let meta = parse_release("Show Name S01-S03 1080p");
        assert_eq!(meta.seasons, set(&[1, 2, 3]));

        let meta = parse_release("Show Name Season 2-3 Complete");
        assert_eq!(meta.seasons, set(&[2, 3]));
    }

    #[test]
    fn test_cross_format() {
        let meta = parse_release("Show Name 2x05 HDTV");
        assert_eq!(meta.title, "Show Name");
        assert_eq!(meta.seasons, set(&[2]));
        assert_eq!(meta.episodes, set(&[5]));
    }

    #[test]
    fn test_episode_word_implies_season_one() {
        let meta = parse_release("Show Name Episode 12 720p");
        assert_eq!(meta.seasons, set(&[1]));
        assert_eq!(meta.episodes, set(&[12]));
    }

    #[test]
    fn test_movie_with_year() {
        let meta = parse_release("Movie.Title.2019.2160p.UHD.BluRay.Remux-GRP");
        assert_eq!(meta.title, "Movie Title");
        assert_eq!(meta.year, Some(2019));
        assert_eq!(meta.resolution, Some(Resolution::Uhd2160));
        assert_eq!(meta.media_type(), MediaType::Movie);
    }

    #[test]
    fn test_leading_year_is_title() {
        let meta = parse_release("1917.2019.1080p.BluRay");
        assert_eq!(meta.title, "1917");
        assert_eq!(meta.year, Some(2019));
    }

    #[test]
    fn test_numeric_title_with_year() {
        let meta = parse_release("Blade Runner 2049 2017 1080p");
        assert_eq!(meta.title, "Blade Runner 2049");
        assert_eq!(meta.year, Some(2017));
    }

    #[test]
    fn test_file_path() {
        let meta = parse_release("Show.S01.1080p/Show.S01E02.1080p.mkv");
        assert_eq!(meta.episodes, set(&[2]));
        assert_eq!(meta.seasons, set(&[1]));
    }

    #[test]
    fn test_unparsable_title() {
        let meta = parse_release("S01E01");
        assert!(!meta.is_parsable());
        let meta = parse_release("");
        assert!(!meta.is_parsable());
    }

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file("Show/Show.S01E01.mkv"));
        assert!(is_video_file("movie.MP4"));
        assert!(!is_video_file("Show/Show.S01E01.srt"));
        assert!(!is_video_file("README"));
        assert!(!is_video_file("sample.nfo"));
    }
}
