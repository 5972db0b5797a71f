//! User-Agent parsing and classification.

use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use triva_core::Request;

use crate::signatures::{self, AgentCategory};

pub const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Unknown,
}

/// Classification summary of one User-Agent string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UaInfo {
    pub browser: String,
    pub version: String,
    pub os: String,
    pub os_version: String,
    pub device: DeviceType,
    pub is_bot: bool,
    pub is_mobile: bool,
    pub is_tablet: bool,
    pub category: AgentCategory,
}

// Browser tokens, most specific first: Edge and Opera embed "Chrome/",
// Chrome embeds "Safari/".
static BROWSERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("Edge", r"(?:Edg|EdgA|EdgiOS|Edge)/([\d.]+)"),
        ("Opera", r"(?:OPR|Opera)/([\d.]+)"),
        ("Samsung Internet", r"SamsungBrowser/([\d.]+)"),
        ("Firefox", r"(?:Firefox|FxiOS)/([\d.]+)"),
        ("Chrome", r"(?:Chrome|CriOS)/([\d.]+)"),
        ("Safari", r"Version/([\d.]+).*Safari/"),
        ("Internet Explorer", r"(?:MSIE |Trident/.*rv:)([\d.]+)"),
    ]
    .into_iter()
    .map(|(name, pattern)| (name, Regex::new(pattern).unwrap()))
    .collect()
});

static WINDOWS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Windows NT ([\d.]+)").unwrap());
static IOS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:iPhone|CPU) OS ([\d_]+)").unwrap());
static MACOS: Lazy<Regex> = Lazy::new(|| Regex::new(r"Mac OS X ([\d_.]+)").unwrap());
static ANDROID: Lazy<Regex> = Lazy::new(|| Regex::new(r"Android ([\d.]+)").unwrap());
static GENERIC_BOT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)bot\b|crawl|spider|scraper|fetcher").unwrap());

/// Classify a raw User-Agent string.
///
/// Known agent signatures win over browser parsing; anything else that
/// looks automated (`bot`, `crawler`, `spider` ...) is a generic bot, and an
/// empty or missing User-Agent is treated as a bot too.
///
/// ```
/// use triva_useragent::{AgentCategory, classify};
///
/// let info = classify("Mozilla/5.0 (compatible; ClaudeBot/1.0; +claudebot@anthropic.com)");
/// assert_eq!(info.category, AgentCategory::Ai);
/// assert_eq!(info.browser, "ClaudeBot");
/// assert_eq!(info.version, "1.0");
/// ```
pub fn classify(ua: &str) -> UaInfo {
    let ua = ua.trim();
    let lower = ua.to_ascii_lowercase();

    let (os, os_version) = parse_os(ua);
    let device = parse_device(ua, &os);

    let (browser, version, category) = if ua.is_empty() {
        (UNKNOWN.to_string(), UNKNOWN.to_string(), AgentCategory::Bot)
    } else if let Some(sig) = signatures::find(&lower) {
        let version = token_version(ua, &lower, sig.pattern).unwrap_or_else(|| UNKNOWN.to_string());
        (sig.name.to_string(), version, sig.category)
    } else if GENERIC_BOT.is_match(ua) {
        let (browser, version) = parse_browser(ua);
        (browser, version, AgentCategory::Bot)
    } else {
        let (browser, version) = parse_browser(ua);
        (browser, version, AgentCategory::Human)
    };

    UaInfo {
        browser,
        version,
        os,
        os_version,
        device,
        is_bot: category.is_automated(),
        is_mobile: device == DeviceType::Mobile,
        is_tablet: device == DeviceType::Tablet,
        category,
    }
}

/// Classification of the request's User-Agent, computed once and kept in
/// the request extensions.
pub fn agent_info(req: &mut Request) -> Arc<UaInfo> {
    if let Some(info) = req.extensions.get_arc::<UaInfo>() {
        return info;
    }
    let info = Arc::new(classify(req.user_agent()));
    req.extensions.insert_arc(Arc::clone(&info));
    info
}

/// Version following `token/` in the original string, e.g. `GPTBot/1.2`.
fn token_version(ua: &str, lower: &str, pattern: &str) -> Option<String> {
    let token = pattern.trim_end_matches('/');
    let start = lower.find(token)? + token.len();
    let rest = ua.get(start..)?.strip_prefix('/')?;
    let version: String = rest
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    (!version.is_empty()).then_some(version)
}

fn parse_browser(ua: &str) -> (String, String) {
    BROWSERS
        .iter()
        .find_map(|(name, re)| {
            re.captures(ua)
                .map(|caps| (name.to_string(), caps[1].to_string()))
        })
        .unwrap_or_else(|| (UNKNOWN.to_string(), UNKNOWN.to_string()))
}

fn parse_os(ua: &str) -> (String, String) {
    if let Some(caps) = WINDOWS.captures(ua) {
        let version = match &caps[1] {
            "10.0" => "10",
            "6.3" => "8.1",
            "6.2" => "8",
            "6.1" => "7",
            "6.0" => "Vista",
            "5.1" | "5.2" => "XP",
            other => other,
        };
        return ("Windows".to_string(), version.to_string());
    }
    if let Some(caps) = IOS.captures(ua)
        && (ua.contains("iPhone") || ua.contains("iPad") || ua.contains("iPod"))
    {
        return ("iOS".to_string(), caps[1].replace('_', "."));
    }
    if let Some(caps) = ANDROID.captures(ua) {
        return ("Android".to_string(), caps[1].to_string());
    }
    if let Some(caps) = MACOS.captures(ua) {
        return ("macOS".to_string(), caps[1].replace('_', "."));
    }
    if ua.contains("CrOS") {
        return ("Chrome OS".to_string(), UNKNOWN.to_string());
    }
    if ua.contains("Linux") || ua.contains("X11") {
        return ("Linux".to_string(), UNKNOWN.to_string());
    }
    (UNKNOWN.to_string(), UNKNOWN.to_string())
}

fn parse_device(ua: &str, os: &str) -> DeviceType {
    if ua.contains("iPad") || ua.contains("Tablet") || (os == "Android" && !ua.contains("Mobile")) {
        return DeviceType::Tablet;
    }
    if ua.contains("Mobi") || ua.contains("iPhone") || ua.contains("iPod") {
        return DeviceType::Mobile;
    }
    match os {
        "Windows" | "macOS" | "Linux" | "Chrome OS" => DeviceType::Desktop,
        _ => DeviceType::Unknown,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triva_core::HttpMethod;

    const CHROME_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.6099.109 Safari/537.36";
    const SAFARI_IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_2 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Mobile/15E148 Safari/604.1";
    const FIREFOX_MAC: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0";
    const EDGE_WIN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.2210.61";
    const ANDROID_TABLET: &str = "Mozilla/5.0 (Linux; Android 13; SM-X700) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36";
    const GOOGLEBOT: &str = "Mozilla/5.0 (compatible; Googlebot/2.1; +http://www.google.com/bot.html)";

    #[test]
    fn test_desktop_chrome() {
        let info = classify(CHROME_WIN);
        assert_eq!(info.browser, "Chrome");
        assert_eq!(info.version, "120.0.6099.109");
        assert_eq!(info.os, "Windows");
        assert_eq!(info.os_version, "10");
        assert_eq!(info.device, DeviceType::Desktop);
        assert_eq!(info.category, AgentCategory::Human);
        assert!(!info.is_bot);
    }

    #[test]
    fn test_mobile_safari() {
        let info = classify(SAFARI_IPHONE);
        assert_eq!(info.browser, "Safari");
        assert_eq!(info.version, "17.2");
        assert_eq!(info.os, "iOS");
        assert_eq!(info.os_version, "17.2");
        assert!(info.is_mobile);
        assert!(!info.is_tablet);
    }

    #[test]
    fn test_firefox_and_edge() {
        let ff = classify(FIREFOX_MAC);
        assert_eq!((ff.browser.as_str(), ff.os.as_str()), ("Firefox", "macOS"));
        assert_eq!(ff.os_version, "10.15");

        let edge = classify(EDGE_WIN);
        assert_eq!(edge.browser, "Edge");
        assert_eq!(edge.version, "120.0.2210.61");
    }

    #[test]
    fn test_android_tablet() {
        let info = classify(ANDROID_TABLET);
        assert_eq!(info.os, "Android");
        assert_eq!(info.device, DeviceType::Tablet);
        assert!(info.is_tablet);
    }

    #[test]
    fn test_search_crawler() {
        let info = classify(GOOGLEBOT);
        assert_eq!(info.category, AgentCategory::Crawler);
        assert_eq!(info.browser, "Googlebot");
        assert_eq!(info.version, "2.1");
        assert!(info.is_bot);
    }

    #[test]
    fn test_ai_agents() {
        for ua in [
            "Mozilla/5.0 ClaudeBot",
            "Mozilla/5.0 AppleWebKit/537.36 (KHTML, like Gecko; compatible; GPTBot/1.2; +https://openai.com/gptbot)",
            "Mozilla/5.0 (compatible; PerplexityBot/1.0)",
            "CCBot/2.0 (https://commoncrawl.org/faq/)",
        ] {
            assert_eq!(classify(ua).category, AgentCategory::Ai, "{}", ua);
        }
    }

    #[test]
    fn test_social_and_tools() {
        assert_eq!(
            classify("facebookexternalhit/1.1 (+http://www.facebook.com/externalhit_uatext.php)").category,
            AgentCategory::Social
        );
        assert_eq!(classify("curl/8.4.0").category, AgentCategory::Bot);
        assert_eq!(classify("curl/8.4.0").version, "8.4.0");
        assert_eq!(classify("python-requests/2.31.0").category, AgentCategory::Bot);
    }

    #[test]
    fn test_generic_bot_fallback() {
        let info = classify("Mozilla/5.0 (compatible; MyCustomBot/0.3)");
        assert_eq!(info.category, AgentCategory::Bot);
        let info = classify("SomeSpider 1.0");
        assert_eq!(info.category, AgentCategory::Bot);
    }

    #[test]
    fn test_empty_user_agent_is_bot() {
        let info = classify("   ");
        assert_eq!(info.category, AgentCategory::Bot);
        assert_eq!(info.browser, UNKNOWN);
        assert_eq!(info.device, DeviceType::Unknown);
    }

    #[test]
    fn test_serialized_shape() {
        let value = serde_json::to_value(classify(CHROME_WIN)).unwrap();
        assert_eq!(value["osVersion"], "10");
        assert_eq!(value["device"], "Desktop");
        assert_eq!(value["isBot"], false);
        assert_eq!(value["category"], "human");
    }

    #[test]
    fn test_agent_info_memoised() {
        let mut req = Request::new(HttpMethod::GET, "/").with_header("User-Agent", GOOGLEBOT);
        let first = agent_info(&mut req);
        let second = agent_info(&mut req);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.category, AgentCategory::Crawler);
    }
}
