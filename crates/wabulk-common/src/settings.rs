//! WhatsGate credentials

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Credentials used to reach the WhatsGate API. Only one set exists.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhatsgateSettings {
    pub whatsapp_id: String,
    pub api_key: String,
    pub base_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WhatsgateSettings {
    pub fn new(
        whatsapp_id: impl Into<String>,
        api_key: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Result<Self> {
        let now = Utc::now();
        let settings = Self {
            whatsapp_id: whatsapp_id.into().trim().to_string(),
            api_key: api_key.into().trim().to_string(),
            base_url: base_url.into().trim().trim_end_matches('/').to_string(),
            created_at: now,
            updated_at: now,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.whatsapp_id.is_empty() {
            return Err(Error::Validation("WhatsApp ID cannot be empty".to_string()));
        }
        if self.api_key.is_empty() {
            return Err(Error::Validation("API key cannot be empty".to_string()));
        }
        if !is_http_url(&self.base_url) {
            return Err(Error::Validation(format!(
                "invalid base URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }

    /// API key with everything but the last four characters hidden
    pub fn masked_api_key(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 4 {
            return "*".repeat(chars.len());
        }
        let visible: String = chars[chars.len() - 4..].iter().collect();
        format!("{}{}", "*".repeat(chars.len() - 4), visible)
    }
}

impl std::fmt::Debug for WhatsgateSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhatsgateSettings")
            .field("whatsapp_id", &self.whatsapp_id)
            .field("api_key", &self.masked_api_key())
            .field("base_url", &self.base_url)
            .finish()
    }
}

fn is_http_url(value: &str) -> bool {
    let rest = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"));
    match rest {
        Some(rest) => {
            let host = rest.split(['/', '?', '#']).next().unwrap_or_default();
            !host.is_empty() && !host.contains(char::is_whitespace)
        }
        None => false,
    }
}
