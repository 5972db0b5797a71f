//! Known automated-agent signatures.
//!
//! Ordered table; the first entry whose pattern occurs in the lowercased
//! User-Agent wins. More specific tokens sit above the generic ones they
//! contain (`applebot-extended` before `applebot`).

use serde::{Deserialize, Serialize};

/// Classifier category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentCategory {
    /// AI assistants and model-training crawlers
    Ai,
    /// Automation, headless browsers, HTTP client libraries
    Bot,
    /// Search, SEO, archive and monitoring crawlers
    Crawler,
    /// Link-preview scrapers of social and chat platforms
    Social,
    Human,
}

impl AgentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentCategory::Ai => "ai",
            AgentCategory::Bot => "bot",
            AgentCategory::Crawler => "crawler",
            AgentCategory::Social => "social",
            AgentCategory::Human => "human",
        }
    }

    pub fn is_automated(&self) -> bool {
        !matches!(self, AgentCategory::Human)
    }
}

impl std::fmt::Display for AgentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Signature {
    /// Display name reported as the agent's "browser".
    pub name: &'static str,
    /// Lowercase substring searched for in the User-Agent.
    pub pattern: &'static str,
    pub category: AgentCategory,
}

const fn sig(name: &'static str, pattern: &'static str, category: AgentCategory) -> Signature {
    Signature {
        name,
        pattern,
        category,
    }
}

use AgentCategory::{Ai, Bot, Crawler, Social};

pub static SIGNATURES: &[Signature] = &[
    // AI assistants and training crawlers
    sig("GPTBot", "gptbot", Ai),
    sig("ChatGPT-User", "chatgpt-user", Ai),
    sig("OAI-SearchBot", "oai-searchbot", Ai),
    sig("ClaudeBot", "claudebot", Ai),
    sig("Claude-User", "claude-user", Ai),
    sig("Claude-SearchBot", "claude-searchbot", Ai),
    sig("Claude-Web", "claude-web", Ai),
    sig("anthropic-ai", "anthropic-ai", Ai),
    sig("PerplexityBot", "perplexitybot", Ai),
    sig("Perplexity-User", "perplexity-user", Ai),
    sig("Google-Extended", "google-extended", Ai),
    sig("Google-CloudVertexBot", "google-cloudvertexbot", Ai),
    sig("GoogleOther", "googleother", Ai),
    sig("Gemini-Deep-Research", "gemini-deep-research", Ai),
    sig("Bytespider", "bytespider", Ai),
    sig("CCBot", "ccbot", Ai),
    sig("cohere-training-data-crawler", "cohere-training-data-crawler", Ai),
    sig("cohere-ai", "cohere-ai", Ai),
    sig("Meta-ExternalAgent", "meta-externalagent", Ai),
    sig("Meta-ExternalFetcher", "meta-externalfetcher", Ai),
    sig("FacebookBot", "facebookbot", Ai),
    sig("Applebot-Extended", "applebot-extended", Ai),
    sig("Amazonbot", "amazonbot", Ai),
    sig("YouBot", "youbot", Ai),
    sig("Diffbot", "diffbot", Ai),
    sig("AI2Bot", "ai2bot", Ai),
    sig("img2dataset", "img2dataset", Ai),
    sig("Omgilibot", "omgilibot", Ai),
    sig("Timpibot", "timpibot", Ai),
    sig("MistralAI-User", "mistralai-user", Ai),
    sig("DuckAssistBot", "duckassistbot", Ai),
    sig("PanguBot", "pangubot", Ai),
    sig("Kangaroo Bot", "kangaroo bot", Ai),
    // Search engines
    sig("Googlebot", "googlebot", Crawler),
    sig("Google-InspectionTool", "google-inspectiontool", Crawler),
    sig("Storebot-Google", "storebot-google", Crawler),
    sig("AdsBot-Google", "adsbot-google", Crawler),
    sig("Mediapartners-Google", "mediapartners-google", Crawler),
    sig("Bingbot", "bingbot", Crawler),
    sig("BingPreview", "bingpreview", Crawler),
    sig("msnbot", "msnbot", Crawler),
    sig("Yahoo! Slurp", "slurp", Crawler),
    sig("DuckDuckBot", "duckduckbot", Crawler),
    sig("Baiduspider", "baiduspider", Crawler),
    sig("YandexBot", "yandex", Crawler),
    sig("Sogou", "sogou", Crawler),
    sig("Exabot", "exabot", Crawler),
    sig("SeznamBot", "seznambot", Crawler),
    sig("Applebot", "applebot", Crawler),
    sig("PetalBot", "petalbot", Crawler),
    sig("Qwantify", "qwantify", Crawler),
    sig("MojeekBot", "mojeekbot", Crawler),
    // SEO, archive and monitoring
    sig("ia_archiver", "ia_archiver", Crawler),
    sig("archive.org_bot", "archive.org_bot", Crawler),
    sig("AhrefsBot", "ahrefsbot", Crawler),
    sig("SemrushBot", "semrushbot", Crawler),
    sig("MJ12bot", "mj12bot", Crawler),
    sig("DotBot", "dotbot", Crawler),
    sig("rogerbot", "rogerbot", Crawler),
    sig("BLEXBot", "blexbot", Crawler),
    sig("DataForSeoBot", "dataforseobot", Crawler),
    sig("UptimeRobot", "uptimerobot", Crawler),
    sig("Pingdom", "pingdom", Crawler),
    sig("StatusCake", "statuscake", Crawler),
    sig("Site24x7", "site24x7", Crawler),
    // Social previews
    sig("facebookexternalhit", "facebookexternalhit", Social),
    sig("Facebot", "facebot", Social),
    sig("Twitterbot", "twitterbot", Social),
    sig("LinkedInBot", "linkedinbot", Social),
    sig("Slackbot", "slackbot", Social),
    sig("Slack-ImgProxy", "slack-imgproxy", Social),
    sig("Discordbot", "discordbot", Social),
    sig("TelegramBot", "telegrambot", Social),
    sig("WhatsApp", "whatsapp", Social),
    sig("Pinterestbot", "pinterest", Social),
    sig("redditbot", "redditbot", Social),
    sig("Embedly", "embedly", Social),
    sig("SkypeUriPreview", "skypeuripreview", Social),
    sig("vkShare", "vkshare", Social),
    sig("Iframely", "iframely", Social),
    // Automation and HTTP clients
    sig("HeadlessChrome", "headlesschrome", Bot),
    sig("PhantomJS", "phantomjs", Bot),
    sig("Selenium", "selenium", Bot),
    sig("Puppeteer", "puppeteer", Bot),
    sig("Playwright", "playwright", Bot),
    sig("Scrapy", "scrapy", Bot),
    sig("curl", "curl/", Bot),
    sig("Wget", "wget/", Bot),
    sig("python-requests", "python-requests", Bot),
    sig("python-urllib", "python-urllib", Bot),
    sig("aiohttp", "aiohttp", Bot),
    sig("httpx", "python-httpx", Bot),
    sig("Go-http-client", "go-http-client", Bot),
    sig("okhttp", "okhttp", Bot),
    sig("axios", "axios/", Bot),
    sig("node-fetch", "node-fetch", Bot),
    sig("libwww-perl", "libwww-perl", Bot),
    sig("Apache-HttpClient", "apache-httpclient", Bot),
    sig("Java", "java/", Bot),
    sig("PostmanRuntime", "postmanruntime", Bot),
    sig("HTTPie", "httpie", Bot),
];

/// First signature found in `ua_lower` (already lowercased).
pub fn find(ua_lower: &str) -> Option<&'static Signature> {
    SIGNATURES.iter().find(|s| ua_lower.contains(s.pattern))
}
