//! Origin Policy
//!
//! Decides which senders may talk to the widget across the frame boundary.
//! Every parent-window message is checked here before it reaches the
//! dispatcher.

/// Origin validation policy
#[derive(Clone, Debug)]
pub struct OriginPolicy {
    mode: OriginPolicyMode,
    allowed: Vec<String>,
}

#[derive(Clone, Debug)]
enum OriginPolicyMode {
    /// Allow all origins (standalone development only)
    AllowAll,
    /// Only allow listed origins
    AllowList,
    /// Deny all origins
    DenyAll,
}

impl OriginPolicy {
    /// Policy that allows exactly the given origins
    ///
    /// Origins are normalized (trailing `/` removed, scheme and host
    /// lowercased) so `https://Parent.example.com/` and
    /// `https://parent.example.com` compare equal.
    #[must_use]
    pub fn new(allowed_origins: Vec<String>) -> Self {
        let mut policy = Self {
            mode: OriginPolicyMode::AllowList,
            allowed: Vec::with_capacity(allowed_origins.len()),
        };
        for origin in allowed_origins {
            policy.add_origin(&origin);
        }
        policy
    }

    /// Policy that allows every origin
    ///
    /// **WARNING**: only for a widget that is not hosted in a parent page.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            mode: OriginPolicyMode::AllowAll,
            allowed: Vec::new(),
        }
    }

    /// Policy that denies every origin
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            mode: OriginPolicyMode::DenyAll,
            allowed: Vec::new(),
        }
    }

    /// Build a policy from configured origins
    ///
    /// A single `*` entry allows every origin; an empty list denies all.
    #[must_use]
    pub fn from_config(origins: &[String]) -> Self {
        if origins.iter().any(|o| o.trim() == "*") {
            Self::allow_all()
        } else if origins.is_empty() {
            Self::deny_all()
        } else {
            Self::new(origins.to_vec())
        }
    }

    /// Add an allowed origin
    pub fn add_origin(&mut self, origin: &str) {
        let origin = normalize(origin);
        if origin.is_empty() {
            return;
        }
        if !self.allowed.contains(&origin) {
            self.allowed.push(origin);
        }
    }

    /// Validate an origin against this policy
    #[must_use]
    pub fn validate(&self, origin: &str) -> OriginValidationResult {
        match self.mode {
            OriginPolicyMode::AllowAll => OriginValidationResult::Allowed,
            OriginPolicyMode::DenyAll => OriginValidationResult::Denied {
                reason: "All origins denied".to_string(),
            },
            OriginPolicyMode::AllowList => {
                let candidate = normalize(origin);
                if self.allowed.iter().any(|allowed| *allowed == candidate) {
                    OriginValidationResult::Allowed
                } else {
                    OriginValidationResult::Denied {
                        reason: format!("Origin '{origin}' not in allow list"),
                    }
                }
            }
        }
    }

    /// Allowed origins (normalized)
    #[must_use]
    pub fn allowed_origins(&self) -> &[String] {
        &self.allowed
    }

    /// Whether this policy allows all origins
    #[must_use]
    pub fn is_allow_all(&self) -> bool {
        matches!(self.mode, OriginPolicyMode::AllowAll)
    }
}

fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Result of origin validation
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OriginValidationResult {
    /// Origin is allowed
    Allowed,
    /// Origin is denied
    Denied {
        /// Reason for denial
        reason: String,
    },
}

impl OriginValidationResult {
    /// Check if the origin is allowed
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    /// Get the denial reason if denied
    #[must_use]
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            Self::Denied { reason } => Some(reason),
            Self::Allowed => None,
        }
    }
}
