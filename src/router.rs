//! URL classification, resolved once per call before any fetching.

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::social::status_id;

static SPOTIFY_EPISODE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/episode/([A-Za-z0-9]+)").unwrap());

static APPLE_SHOW_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"/id(\d+)").unwrap());

static YOUTUBE_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^/(?:shorts|live|embed|v)/([A-Za-z0-9_-]{6,})").unwrap());

const YOUTUBE_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
];

const PODCAST_HOSTS: &[&str] = &[
    "podcasts.apple.com",
    "open.spotify.com",
    "podcasts.google.com",
    "overcast.fm",
    "pocketcasts.com",
    "pca.st",
    "castbox.fm",
    "podbean.com",
    "buzzsprout.com",
    "simplecast.com",
    "transistor.fm",
    "captivate.fm",
    "anchor.fm",
    "megaphone.fm",
    "libsyn.com",
    "podcasters.spotify.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    SpotifyEpisode {
        episode_id: String,
    },
    ApplePodcast {
        show_id: String,
        episode_id: Option<String>,
    },
    YouTube {
        video_id: String,
    },
    SocialStatus {
        status_id: String,
    },
    Generic,
}

fn host_of(parsed: &Url) -> String {
    parsed.host_str().unwrap_or("").to_lowercase()
}

fn host_matches(host: &str, allowed: &str) -> bool {
    host == allowed || host.ends_with(&format!(".{}", allowed))
}

impl Route {
    /// Classify `url`, checking podcast directories, then YouTube, then social posts.
    pub fn resolve(url: &str) -> Route {
        let Ok(parsed) = Url::parse(url) else {
            return Route::Generic;
        };
        let host = host_of(&parsed);

        if host == "open.spotify.com" {
            if let Some(caps) = SPOTIFY_EPISODE_RE.captures(parsed.path()) {
                return Route::SpotifyEpisode {
                    episode_id: caps[1].to_string(),
                };
            }
        }

        if host == "podcasts.apple.com" || host == "itunes.apple.com" {
            if let Some(caps) = APPLE_SHOW_RE.captures(parsed.path()) {
                let episode_id = parsed
                    .query_pairs()
                    .find(|(k, _)| k == "i")
                    .map(|(_, v)| v.into_owned())
                    .filter(|v| !v.is_empty());
                return Route::ApplePodcast {
                    show_id: caps[1].to_string(),
                    episode_id,
                };
            }
        }

        if let Some(video_id) = youtube_video_id(&parsed) {
            return Route::YouTube { video_id };
        }

        if let Some(status_id) = status_id(url) {
            return Route::SocialStatus { status_id };
        }

        Route::Generic
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Route::YouTube { .. })
    }

    pub fn podcast_platform(&self) -> Option<&'static str> {
        match self {
            Route::SpotifyEpisode { .. } => Some("Spotify"),
            Route::ApplePodcast { .. } => Some("Apple Podcasts"),
            _ => None,
        }
    }
}

fn youtube_video_id(parsed: &Url) -> Option<String> {
    let host = host_of(parsed);
    if host == "youtu.be" {
        return parsed
            .path_segments()
            .and_then(|mut segments| segments.next())
            .filter(|id| !id.is_empty())
            .map(str::to_string);
    }
    if !YOUTUBE_HOSTS.contains(&host.as_str()) {
        return None;
    }
    if parsed.path() == "/watch" {
        return parsed
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty());
    }
    YOUTUBE_PATH_RE
        .captures(parsed.path())
        .map(|caps| caps[1].to_string())
}

pub fn is_youtube_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .map(|parsed| {
            let host = host_of(&parsed);
            host == "youtu.be" || YOUTUBE_HOSTS.contains(&host.as_str())
        })
        .unwrap_or(false)
}

/// Hosts whose pages are podcast episodes even without structured data.
pub fn is_podcast_host(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .map(|parsed| {
            let host = host_of(&parsed);
            PODCAST_HOSTS.iter().any(|allowed| host_matches(&host, allowed))
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_spotify_episodes() {
        assert_eq!(
            Route::resolve("https://open.spotify.com/episode/4rOoJ6Egrf8K2IrywzwOMk?si=abc"),
            Route::SpotifyEpisode {
                episode_id: "4rOoJ6Egrf8K2IrywzwOMk".into()
            }
        );
        assert_eq!(
            Route::resolve("https://open.spotify.com/show/abc"),
            Route::Generic
        );
    }

    #[test]
    fn resolves_apple_podcasts() {
        assert_eq!(
            Route::resolve("https://podcasts.apple.com/us/podcast/some-show/id1234567890?i=1000654321"),
            Route::ApplePodcast {
                show_id: "1234567890".into(),
                episode_id: Some("1000654321".into()),
            }
        );
        assert_eq!(
            Route::resolve("https://podcasts.apple.com/us/podcast/some-show/id42"),
            Route::ApplePodcast {
                show_id: "42".into(),
                episode_id: None,
            }
        );
    }

    #[test]
    fn resolves_youtube() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ&t=10",
        ] {
            assert_eq!(
                Route::resolve(url),
                Route::YouTube {
                    video_id: "dQw4w9WgXcQ".into()
                },
                "{url}"
            );
        }
        assert_eq!(Route::resolve("https://www.youtube.com/@channel"), Route::Generic);
        assert!(is_youtube_url("https://www.youtube.com/@channel"));
    }

    #[test]
    fn resolves_social_statuses() {
        assert_eq!(
            Route::resolve("https://x.com/user/status/12345"),
            Route::SocialStatus {
                status_id: "12345".into()
            }
        );
        assert_eq!(Route::resolve("https://x.com/user"), Route::Generic);
    }

    #[test]
    fn everything_else_is_generic() {
        assert_eq!(Route::resolve("https://example.com/post"), Route::Generic);
        assert_eq!(Route::resolve("not a url"), Route::Generic);
    }

    #[test]
    fn recognises_podcast_hosts() {
        assert!(is_podcast_host("https://feeds.buzzsprout.com/123"));
        assert!(is_podcast_host("https://overcast.fm/+abc"));
        assert!(!is_podcast_host("https://example.com"));
    }
}
