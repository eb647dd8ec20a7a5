//! Template kinds and the cache slots and routes derived from them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Visual template a portfolio is built on.
///
/// The wire tag (`template1`, ...) is what the backend stores in
/// `templateType` and uses in `/api/portfolios/<templateKey>`. The cache
/// prefix (`templateOne`, ...) names the local durable slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemplateKind {
    #[serde(rename = "template1")]
    One,
    #[serde(rename = "template2")]
    Two,
    #[serde(rename = "template3")]
    Three,
    #[serde(rename = "template4")]
    Four,
}

impl TemplateKind {
    pub const ALL: [TemplateKind; 4] = [
        TemplateKind::One,
        TemplateKind::Two,
        TemplateKind::Three,
        TemplateKind::Four,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            TemplateKind::One => "template1",
            TemplateKind::Two => "template2",
            TemplateKind::Three => "template3",
            TemplateKind::Four => "template4",
        }
    }

    pub fn cache_prefix(self) -> &'static str {
        match self {
            TemplateKind::One => "templateOne",
            TemplateKind::Two => "templateTwo",
            TemplateKind::Three => "templateThree",
            TemplateKind::Four => "templateFour",
        }
    }

    /// Slot holding the serialized draft.
    pub fn data_key(self) -> String {
        format!("{}Data", self.cache_prefix())
    }

    /// Slot holding the last known server record id.
    pub fn portfolio_id_key(self) -> String {
        format!("{}PortfolioId", self.cache_prefix())
    }

    /// Slot holding the last known custom url.
    pub fn custom_url_key(self) -> String {
        format!("{}CustomUrl", self.cache_prefix())
    }

    pub fn edit_route(self) -> String {
        format!("/templates/{}/edit", self.tag())
    }

    pub fn view_route(self, portfolio_id: &str) -> String {
        format!("/templates/{}/view/{}", self.tag(), portfolio_id)
    }
}

impl fmt::Display for TemplateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown template: {0}")]
pub struct UnknownTemplate(pub String);

impl FromStr for TemplateKind {
    type Err = UnknownTemplate;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TemplateKind::ALL
            .into_iter()
            .find(|t| t.tag() == s)
            .ok_or_else(|| UnknownTemplate(s.to_string()))
    }
}
