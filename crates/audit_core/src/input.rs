use std::fmt;

use thiserror::Error;
use url::Url;

pub const DEFAULT_MAX_INPUTS: usize = 5;

/// One thing to audit: a live page or a screenshot supplied by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditInput {
    Url { url: String },
    Upload { image_base64: String },
}

impl AuditInput {
    pub fn url(url: impl Into<String>) -> Self {
        AuditInput::Url { url: url.into() }
    }

    pub fn upload(image_base64: impl Into<String>) -> Self {
        AuditInput::Upload {
            image_base64: image_base64.into(),
        }
    }

    /// Name shown for the report when this input is the primary one.
    pub fn display_identity(&self) -> String {
        match self {
            AuditInput::Url { url } => url.clone(),
            AuditInput::Upload { .. } => "uploaded-screenshot".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("please enter at least one valid URL or screenshot")]
    Empty,
    #[error("too many inputs: {count} supplied, at most {max} allowed")]
    TooMany { count: usize, max: usize },
    #[error("invalid URL format: \"{input}\"")]
    InvalidUrl { input: String },
    #[error("all URLs must be from the same domain: expected \"{expected}\", found \"{found}\"")]
    DomainMismatch { expected: String, found: String },
    #[error("uploaded screenshot #{index} is empty")]
    EmptyUpload { index: usize },
}

/// Trim, add a scheme when missing, and parse a user-entered address.
pub fn normalize_url(raw: &str) -> Result<Url, InputError> {
    let trimmed = raw.trim();
    let has_scheme = trimmed
        .get(..8)
        .map(|p| p.eq_ignore_ascii_case("https://"))
        .unwrap_or(false)
        || trimmed
            .get(..7)
            .map(|p| p.eq_ignore_ascii_case("http://"))
            .unwrap_or(false);
    let candidate = if has_scheme {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };
    let parsed = Url::parse(&candidate).map_err(|_| InputError::InvalidUrl {
        input: raw.to_string(),
    })?;
    if parsed.host_str().map(str::is_empty).unwrap_or(true) {
        return Err(InputError::InvalidUrl {
            input: raw.to_string(),
        });
    }
    Ok(parsed)
}

fn bare_host(url: &Url) -> String {
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
}

/// Normalize a raw input list.
///
/// Blank URL entries are dropped, every URL must share the first URL's host
/// (ignoring `www.`), and uploads must carry data. Order is preserved; the
/// first surviving entry is the primary input.
pub fn validate_inputs(inputs: Vec<AuditInput>, max: usize) -> Result<Vec<AuditInput>, InputError> {
    let mut normalized = Vec::with_capacity(inputs.len());
    let mut primary_host: Option<String> = None;

    for input in inputs {
        match input {
            AuditInput::Url { url } => {
                if url.trim().is_empty() {
                    continue;
                }
                let parsed = normalize_url(&url)?;
                let host = bare_host(&parsed);
                match primary_host.as_deref() {
                    None => primary_host = Some(host),
                    Some(expected) if expected != host => {
                        return Err(InputError::DomainMismatch {
                            expected: expected.to_string(),
                            found: host,
                        });
                    }
                    Some(_) => {}
                }
                normalized.push(AuditInput::Url {
                    url: parsed.to_string(),
                });
            }
            AuditInput::Upload { image_base64 } => {
                if image_base64.trim().is_empty() {
                    return Err(InputError::EmptyUpload {
                        index: normalized.len() + 1,
                    });
                }
                normalized.push(AuditInput::Upload { image_base64 });
            }
        }
    }

    if normalized.is_empty() {
        return Err(InputError::Empty);
    }
    if normalized.len() > max {
        return Err(InputError::TooMany {
            count: normalized.len(),
            max,
        });
    }
    Ok(normalized)
}

/// Which URL inputs get an extra mobile capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MobilePolicy {
    /// Only the primary input, when it is a URL.
    #[default]
    PrimaryOnly,
    AllUrls,
}

/// A unit of remote capture work derived from a URL input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTask {
    pub url: String,
    pub is_mobile: bool,
    pub input_index: usize,
}

impl CaptureTask {
    pub fn device(&self) -> &'static str {
        if self.is_mobile {
            "mobile"
        } else {
            "desktop"
        }
    }

    /// Path component of the URL, used as a short label in status text.
    pub fn page_label(&self) -> String {
        Url::parse(&self.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| self.url.clone())
    }

    pub fn is_primary(&self) -> bool {
        self.input_index == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureStep {
    Remote(CaptureTask),
    Upload {
        input_index: usize,
        image_base64: String,
    },
}

impl CaptureStep {
    pub fn label(&self) -> String {
        match self {
            CaptureStep::Remote(task) => format!("{} ({})", task.page_label(), task.device()),
            CaptureStep::Upload { input_index, .. } => {
                format!("uploaded screenshot {}", input_index + 1)
            }
        }
    }
}

impl fmt::Display for CaptureStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

/// Expand inputs into the ordered capture steps executed by the coordinator.
pub fn plan_capture(inputs: &[AuditInput], policy: MobilePolicy) -> Vec<CaptureStep> {
    let mut steps = Vec::with_capacity(inputs.len() * 2);
    for (input_index, input) in inputs.iter().enumerate() {
        match input {
            AuditInput::Url { url } => {
                steps.push(CaptureStep::Remote(CaptureTask {
                    url: url.clone(),
                    is_mobile: false,
                    input_index,
                }));
                let wants_mobile = match policy {
                    MobilePolicy::PrimaryOnly => input_index == 0,
                    MobilePolicy::AllUrls => true,
                };
                if wants_mobile {
                    steps.push(CaptureStep::Remote(CaptureTask {
                        url: url.clone(),
                        is_mobile: true,
                        input_index,
                    }));
                }
            }
            AuditInput::Upload { image_base64 } => steps.push(CaptureStep::Upload {
                input_index,
                image_base64: image_base64.clone(),
            }),
        }
    }
    steps
}
