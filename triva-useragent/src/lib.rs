//! User-Agent classification and redirection for Triva.
//!
//! [`classify`] maps a raw `User-Agent` header to a [`UaInfo`] record:
//! browser, OS, device type and one of the [`AgentCategory`] values. Known
//! automated agents are matched against the [`SIGNATURES`] table; anything
//! else that still looks automated falls into the generic `bot` category.
//!
//! [`RedirectMiddleware`] uses the classification to send AI agents, bots
//! or crawlers elsewhere before any rate limiting happens.
//!
//! ```
//! use triva_useragent::{AgentCategory, classify};
//!
//! let info = classify("Mozilla/5.0 (compatible; GPTBot/1.2; +https://openai.com/gptbot)");
//! assert_eq!(info.category, AgentCategory::Ai);
//! assert_eq!(info.browser, "GPTBot");
//! assert!(info.is_bot);
//! ```

pub mod classifier;
pub mod redirect;
pub mod signatures;

pub use classifier::{DeviceType, UNKNOWN, UaInfo, agent_info, classify};
pub use redirect::{
    Destination, RedirectConfig, RedirectDecision, RedirectError, RedirectMiddleware,
    RedirectReason, RedirectRule, Redirector,
};
pub use signatures::{AgentCategory, SIGNATURES, Signature};
