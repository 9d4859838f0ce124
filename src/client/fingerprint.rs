//! 浏览器指纹：模拟的浏览器身份与对应的请求头集合。
//!
//! Simulated browser identity.
//!
//! [`FingerprintStore`] holds the process-wide [`FingerprintProfile`] behind an
//! `ArcSwap`: readers take a whole snapshot, `refresh` swaps in a whole new profile,
//! so no reader can observe a mix of old and new fields.

use crate::config::FingerprintSeed;
use crate::{Error, ErrorContext, Result};
use arc_swap::ArcSwap;
use rand::seq::SliceRandom;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Header carrying the proof token.
pub const PROOF_TOKEN_HEADER: &str = "x-is-human";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FingerprintProfile {
    /// Client-hint platform (`Windows`, `macOS`, `Linux`).
    pub platform: String,
    /// Major Chrome version, e.g. `140`.
    pub chrome_version: String,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
    pub user_agent: String,
}

struct PlatformCandidate {
    platform: &'static str,
    ua_os: &'static str,
    webgl_vendor: &'static str,
    webgl_renderer: &'static str,
}

const PLATFORMS: &[PlatformCandidate] = &[
    PlatformCandidate {
        platform: "Windows",
        ua_os: "Windows NT 10.0; Win64; x64",
        webgl_vendor: "Google Inc. (Intel)",
        webgl_renderer: "ANGLE (Intel, Intel(R) UHD Graphics 620 Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    PlatformCandidate {
        platform: "Windows",
        ua_os: "Windows NT 10.0; Win64; x64",
        webgl_vendor: "Google Inc. (NVIDIA)",
        webgl_renderer:
            "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 (0x00002504) Direct3D11 vs_5_0 ps_5_0, D3D11)",
    },
    PlatformCandidate {
        platform: "macOS",
        ua_os: "Macintosh; Intel Mac OS X 10_15_7",
        webgl_vendor: "Google Inc. (Apple)",
        webgl_renderer: "ANGLE (Apple, ANGLE Metal Renderer: Apple M2, Unspecified Version)",
    },
    PlatformCandidate {
        platform: "Linux",
        ua_os: "X11; Linux x86_64",
        webgl_vendor: "Google Inc. (Intel)",
        webgl_renderer: "ANGLE (Intel, Mesa Intel(R) UHD Graphics 630 (CFL GT2), OpenGL 4.6)",
    },
];

const CHROME_VERSIONS: &[&str] = &["138", "139", "140", "141"];

impl FingerprintProfile {
    /// Build the initial profile from configured seed values.
    pub fn from_seed(seed: &FingerprintSeed) -> Self {
        let ua = &seed.user_agent;
        let platform = if ua.contains("Windows") {
            "Windows"
        } else if ua.contains("Mac OS X") || ua.contains("Macintosh") {
            "macOS"
        } else {
            "Linux"
        };
        let chrome_version = ua
            .split("Chrome/")
            .nth(1)
            .and_then(|rest| rest.split('.').next())
            .filter(|v| !v.is_empty() && v.chars().all(|c| c.is_ascii_digit()))
            .unwrap_or("140")
            .to_string();

        Self {
            platform: platform.to_string(),
            chrome_version,
            webgl_vendor: seed.webgl_vendor.clone(),
            webgl_renderer: seed.webgl_renderer.clone(),
            user_agent: seed.user_agent.clone(),
        }
    }

    fn from_candidate(candidate: &PlatformCandidate, version: &str) -> Self {
        Self {
            platform: candidate.platform.to_string(),
            chrome_version: version.to_string(),
            webgl_vendor: candidate.webgl_vendor.to_string(),
            webgl_renderer: candidate.webgl_renderer.to_string(),
            user_agent: format!(
                "Mozilla/5.0 ({}) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/{}.0.0.0 Safari/537.36",
                candidate.ua_os, version
            ),
        }
    }

    /// Pick a random candidate identity different from `self`.
    fn regenerate(&self) -> Self {
        let choices: Vec<FingerprintProfile> = PLATFORMS
            .iter()
            .flat_map(|p| CHROME_VERSIONS.iter().map(move |v| Self::from_candidate(p, v)))
            .filter(|p| p.user_agent != self.user_agent || p.webgl_renderer != self.webgl_renderer)
            .collect();
        choices
            .choose(&mut rand::thread_rng())
            .cloned()
            .unwrap_or_else(|| Self::from_candidate(&PLATFORMS[0], CHROME_VERSIONS[0]))
    }

    pub fn sec_ch_ua(&self) -> String {
        format!(
            "\"Chromium\";v=\"{v}\", \"Not=A?Brand\";v=\"24\", \"Google Chrome\";v=\"{v}\"",
            v = self.chrome_version
        )
    }

    fn base_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        insert(&mut headers, "user-agent", &self.user_agent)?;
        insert(&mut headers, "sec-ch-ua", &self.sec_ch_ua())?;
        insert(&mut headers, "sec-ch-ua-mobile", "?0")?;
        insert(
            &mut headers,
            "sec-ch-ua-platform",
            &format!("\"{}\"", self.platform),
        )?;
        insert(&mut headers, "accept-language", "en-US,en;q=0.9")?;
        Ok(headers)
    }

    /// Full header bundle for the chat submission.
    pub fn chat_headers(&self, token: &str, origin: &str) -> Result<HeaderMap> {
        let mut headers = self.base_headers()?;
        insert(&mut headers, "accept", "*/*")?;
        insert(&mut headers, "content-type", "application/json")?;
        insert(&mut headers, "origin", origin)?;
        insert(&mut headers, "referer", &format!("{}/", origin.trim_end_matches('/')))?;
        insert(&mut headers, "sec-fetch-dest", "empty")?;
        insert(&mut headers, "sec-fetch-mode", "cors")?;
        insert(&mut headers, "sec-fetch-site", "same-origin")?;
        insert(&mut headers, "priority", "u=1, i")?;
        let token_value = HeaderValue::from_str(token).map_err(|_| {
            Error::token_with_context(
                "proof token is not a valid header value",
                ErrorContext::new().with_source("fingerprint"),
            )
        })?;
        headers.insert(HeaderName::from_static(PROOF_TOKEN_HEADER), token_value);
        Ok(headers)
    }

    /// Reduced header bundle for the script fetch. Carries no token.
    pub fn script_headers(&self, origin: &str) -> Result<HeaderMap> {
        let mut headers = self.base_headers()?;
        insert(&mut headers, "accept", "*/*")?;
        insert(&mut headers, "referer", &format!("{}/", origin.trim_end_matches('/')))?;
        insert(&mut headers, "sec-fetch-dest", "script")?;
        insert(&mut headers, "sec-fetch-mode", "no-cors")?;
        insert(&mut headers, "sec-fetch-site", "same-origin")?;
        Ok(headers)
    }
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) -> Result<()> {
    let value = HeaderValue::from_str(value).map_err(|_| {
        Error::configuration_with_context(
            format!("invalid value for header {}", name),
            ErrorContext::new().with_source("fingerprint"),
        )
    })?;
    headers.insert(HeaderName::from_static(name), value);
    Ok(())
}

/// Process-wide, concurrently readable fingerprint.
pub struct FingerprintStore {
    profile: ArcSwap<FingerprintProfile>,
    generation: AtomicU64,
}

impl FingerprintStore {
    pub fn new(initial: FingerprintProfile) -> Self {
        Self {
            profile: ArcSwap::from_pointee(initial),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_seed(seed: &FingerprintSeed) -> Self {
        Self::new(FingerprintProfile::from_seed(seed))
    }

    /// Consistent snapshot of the current identity.
    pub fn current(&self) -> Arc<FingerprintProfile> {
        self.profile.load_full()
    }

    /// Replace the identity as a whole with a different candidate.
    pub fn refresh(&self) -> Arc<FingerprintProfile> {
        let next = Arc::new(self.current().regenerate());
        self.profile.store(next.clone());
        self.generation.fetch_add(1, Ordering::Relaxed);
        next
    }

    /// Number of refreshes performed so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
