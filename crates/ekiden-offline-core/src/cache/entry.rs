use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, VARY};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::CacheError;
use crate::http::{Request, Response};

/// A request header captured because the stored response varies on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaryField {
    pub name: String,
    pub value: Option<String>,
}

/// Everything about a stored response except its body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub request_key: String,
    pub url: String,
    #[serde(default)]
    pub vary: Vec<VaryField>,
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub cached_at: DateTime<Utc>,
}

impl EntryMeta {
    /// Record the parts of `request` and `response` needed to match and rebuild it.
    /// A response with `Vary: *` could never match a lookup and is refused.
    pub fn capture(request: &Request, response: &Response) -> Result<Self, CacheError> {
        let vary = capture_vary(request, response.headers())
            .ok_or_else(|| CacheError::VaryAll(request.url().to_string()))?;

        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();

        let mut url = request.url().clone();
        url.set_fragment(None);

        Ok(Self {
            request_key: request.cache_key(),
            url: url.to_string(),
            vary,
            status: response.status().as_u16(),
            status_text: response.status_text().to_string(),
            headers,
            cached_at: Utc::now(),
        })
    }

    /// True when this entry answers `request`: same identity and same values
    /// for every header the response varies on.
    pub fn matches(&self, request: &Request) -> bool {
        if self.request_key != request.cache_key() {
            return false;
        }
        self.vary
            .iter()
            .all(|field| header_text(request.headers(), &field.name) == field.value)
    }

    /// Stable identifier for this entry's variant, used for body file names.
    pub fn variant_id(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.request_key.as_bytes());
        for field in &self.vary {
            hasher.update(b"\n");
            hasher.update(field.name.as_bytes());
            hasher.update(b":");
            hasher.update(field.value.as_deref().unwrap_or_default().as_bytes());
        }
        hex::encode(&hasher.finalize()[..16])
    }

    pub fn to_response(&self, body: Bytes) -> Result<Response, CacheError> {
        let status = StatusCode::from_u16(self.status).map_err(|_| CacheError::Corrupt {
            key: self.request_key.clone(),
            reason: format!("invalid status {}", self.status),
        })?;

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes());
            let value = HeaderValue::from_bytes(value.as_bytes());
            match (name, value) {
                (Ok(name), Ok(value)) => {
                    headers.append(name, value);
                }
                _ => {
                    return Err(CacheError::Corrupt {
                        key: self.request_key.clone(),
                        reason: "invalid header".to_string(),
                    })
                }
            }
        }

        Ok(Response::from_parts(status, self.status_text.clone(), headers, body))
    }

    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.cached_at).num_minutes()
    }

    pub fn age_display(&self) -> String {
        let minutes = self.age_minutes();
        if minutes < 1 {
            // Covers clock skew too
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            let hours = minutes / 60;
            if minutes % 60 >= 30 {
                format!("{}h ago", hours + 1)
            } else {
                format!("{}h ago", hours)
            }
        } else {
            let days = minutes / 1440;
            if (minutes % 1440) / 60 >= 12 {
                format!("{}d ago", days + 1)
            } else {
                format!("{}d ago", days)
            }
        }
    }
}

/// `None` when the response varies on `*`.
fn capture_vary(request: &Request, response_headers: &HeaderMap) -> Option<Vec<VaryField>> {
    let mut fields = Vec::new();

    for value in response_headers.get_all(VARY) {
        let Ok(text) = value.to_str() else {
            continue;
        };
        for name in text.split(',').map(str::trim).filter(|n| !n.is_empty()) {
            if name == "*" {
                return None;
            }
            let name = name.to_ascii_lowercase();
            if fields.iter().any(|f: &VaryField| f.name == name) {
                continue;
            }
            let value = header_text(request.headers(), &name);
            fields.push(VaryField { name, value });
        }
    }

    Some(fields)
}

fn header_text(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
}
