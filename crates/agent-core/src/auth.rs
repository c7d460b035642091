//! Agent identity and clinic authorization derived from the auth token
//!
//! The call core never validates or refreshes tokens. It only reads two things
//! out of the bearer token's payload:
//!
//! - `sub` - the agent id used for presence polling and call notifications
//! - clinic grants - from `cognito:groups` entries shaped like
//!   `clinic_<clinicId>__<ROLE>` and from the compact `x_rbc` claim
//!   (`clinicA:A,clinicB:P`)
//!
//! # Usage Examples
//!
//! ```rust
//! use callcenter_agent_core::auth::format_clinic_name;
//!
//! assert_eq!(format_clinic_name("dentistinAustin"), "Dentist In Austin");
//! ```

use async_trait::async_trait;
use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AgentError, AgentResult};

static CLINIC_GROUP: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^clinic_([^_][^\s]*)__([A-Z_]+)$").expect("clinic group pattern is valid")
});

static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z])([A-Z])").expect("camel case pattern is valid"));

static DENTIST_IN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)dentistin").expect("dentistin pattern is valid"));

static DENTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)dental").expect("dental pattern is valid"));

/// A clinic the agent may go online for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clinic {
    pub clinic_id: String,
    /// Human readable name derived from the clinic id
    pub name: String,
    /// Role keys granted for this clinic, first-seen order
    pub roles: Vec<String>,
}

/// Authenticated agent derived from a bearer token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub token: String,
    pub clinics: Vec<Clinic>,
}

impl AgentIdentity {
    /// Decode a JWT-shaped token into an identity
    ///
    /// The signature is not checked; the backend does that on every request.
    pub fn from_token(token: &str) -> AgentResult<Self> {
        let payload = decode_payload(token)?;
        let agent_id = payload
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| AgentError::invalid_token("missing sub claim"))?
            .to_string();

        Ok(Self {
            agent_id,
            token: token.to_string(),
            clinics: clinics_from_claims(&payload),
        })
    }

    /// Ids of all clinics this agent is authorized for
    pub fn clinic_ids(&self) -> Vec<&str> {
        self.clinics.iter().map(|c| c.clinic_id.as_str()).collect()
    }

    /// Requested ids that are not in the authorized set, in request order
    pub fn unauthorized<'a>(&self, requested: &'a [String]) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|id| !self.clinics.iter().any(|c| &c.clinic_id == *id))
            .map(String::as_str)
            .collect()
    }
}

fn decode_payload(token: &str) -> AgentResult<Value> {
    let token = token.trim().trim_matches('"');
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(AgentError::invalid_token(format!(
            "expected 3 segments, found {}",
            parts.len()
        )));
    }

    let segment = parts[1].trim_end_matches('=');
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .or_else(|_| STANDARD.decode(parts[1]))
        .map_err(|e| AgentError::invalid_token(format!("payload is not base64: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| AgentError::invalid_token(format!("payload is not JSON: {}", e)))
}

fn clinics_from_claims(payload: &Value) -> Vec<Clinic> {
    let mut grants: Vec<(String, Vec<String>)> = Vec::new();
    let mut grant = |clinic_id: &str, role: String| {
        match grants.iter_mut().find(|(id, _)| id == clinic_id) {
            Some((_, roles)) => {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
            None => grants.push((clinic_id.to_string(), vec![role])),
        }
    };

    if let Some(groups) = payload.get("cognito:groups").and_then(Value::as_array) {
        for group in groups.iter().filter_map(Value::as_str) {
            if let Some(caps) = CLINIC_GROUP.captures(group) {
                grant(&caps[1], caps[2].to_string());
            }
        }
    }

    let x_rbc = match payload.get("x_rbc") {
        Some(Value::String(s)) => s.trim().to_string(),
        _ => String::new(),
    };
    for pair in x_rbc.split(',').filter(|p| !p.is_empty()) {
        let mut fields = pair.split(':');
        let (Some(clinic_id), Some(code)) = (fields.next(), fields.next()) else {
            continue;
        };
        if clinic_id.is_empty() || code.is_empty() {
            continue;
        }
        if let Some(role) = role_for_code(code) {
            grant(clinic_id, role.to_string());
        }
    }

    grants
        .into_iter()
        .map(|(clinic_id, roles)| Clinic {
            name: format_clinic_name(&clinic_id),
            clinic_id,
            roles,
        })
        .collect()
}

/// Map a compact `x_rbc` role code to its role key
pub fn role_for_code(code: &str) -> Option<&'static str> {
    match code.to_uppercase().as_str() {
        "S" => Some("SUPER_ADMIN"),
        "A" => Some("ADMIN"),
        "P" => Some("PROVIDER"),
        "D" => Some("DOCTOR"),
        "H" => Some("HYGIENIST"),
        "DA" => Some("DENTAL_ASSISTANT"),
        "TC" => Some("TRAINEE"),
        "PC" => Some("PATIENT_COORDINATOR"),
        "M" => Some("MARKETING"),
        "U" => Some("USER"),
        _ => None,
    }
}

/// Display name for a clinic id such as `dentistinAustin`
pub fn format_clinic_name(clinic_id: &str) -> String {
    let spaced = CAMEL_BOUNDARY.replace_all(clinic_id, "$1 $2");
    let spaced = DENTIST_IN.replace_all(&spaced, "Dentist in ");
    let spaced = DENTAL.replace_all(&spaced, "Dental ");

    spaced
        .split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Where the bearer token is kept between app launches
///
/// Only "a token is stored and retrieved" is modelled here.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Load the stored token, if any
    async fn load(&self) -> AgentResult<Option<String>>;

    /// Replace the stored token
    async fn save(&self, token: &str) -> AgentResult<()>;

    /// Forget the stored token
    async fn clear(&self) -> AgentResult<()>;
}

/// In-process token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: RwLock<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: RwLock::new(Some(token.into())),
        }
    }
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn load(&self) -> AgentResult<Option<String>> {
        Ok(self.token.read().clone())
    }

    async fn save(&self, token: &str) -> AgentResult<()> {
        *self.token.write() = Some(token.to_string());
        Ok(())
    }

    async fn clear(&self) -> AgentResult<()> {
        *self.token.write() = None;
        Ok(())
    }
}

/// Build an unsigned JWT-shaped token around a JSON payload
///
/// Used by tests and demos; the signature segment is a fixed placeholder.
pub fn unsigned_token(payload: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.sig", header, body)
}
