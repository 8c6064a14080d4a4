use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Prefix the identity provider puts on every raw error message
const PROVIDER_PREFIX: &str = "Firebase: ";

/// Employees allowed to register
///
/// Loaded from a JSON file of the form `{"employees": ["E100", "E101"]}`.
/// IDs are compared after trimming and ignoring case.
#[derive(Debug, Clone, Default)]
pub struct EmployeeRoster {
    allowed: HashSet<String>,
}

#[derive(Debug, Deserialize)]
struct RosterFile {
    employees: Vec<String>,
}

/// Answer to a registration-time employee check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VerifyResponse {
    fn allowed() -> Self {
        VerifyResponse {
            allowed: true,
            error: None,
        }
    }

    pub fn denied(reason: impl Into<String>) -> Self {
        VerifyResponse {
            allowed: false,
            error: Some(reason.into()),
        }
    }
}

fn normalize(id: &str) -> String {
    id.trim().to_uppercase()
}

impl EmployeeRoster {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        EmployeeRoster {
            allowed: ids
                .into_iter()
                .map(|id| normalize(id.as_ref()))
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Read the roster file
    ///
    /// # Errors
    /// * Returns an error if the file cannot be read or parsed
    pub fn load(path: impl AsRef<Path>) -> Result<Self, String> {
        let contents = match fs::read_to_string(path.as_ref()) {
            Ok(contents) => contents,
            Err(_) => {
                return Err(format!(
                    "Failed to read employee roster {}",
                    path.as_ref().display()
                ));
            }
        };
        match serde_json::from_str::<RosterFile>(&contents) {
            Ok(file) => Ok(EmployeeRoster::new(file.employees)),
            Err(_) => Err("Failed to parse employee roster".to_string()),
        }
    }

    pub fn len(&self) -> usize {
        self.allowed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.allowed.is_empty()
    }

    /// Check whether `id` may register
    pub fn verify(&self, id: &str) -> VerifyResponse {
        let id = normalize(id);
        if id.is_empty() {
            return VerifyResponse::denied("Employee ID is required");
        }
        if self.allowed.contains(&id) {
            VerifyResponse::allowed()
        } else {
            VerifyResponse::denied("Employee ID not found in office records")
        }
    }
}

/// Turn an identity-provider error into a message for the user
///
/// Known error codes get fixed wording; anything else is shown as the raw
/// provider message without its prefix.
pub fn describe_auth_error(raw: &str) -> String {
    if raw.contains("email-already-in-use") {
        return "This email is already registered. Please log in instead.".to_string();
    }
    if raw.contains("invalid-credential") {
        return "Invalid email or password.".to_string();
    }
    raw.strip_prefix(PROVIDER_PREFIX).unwrap_or(raw).to_string()
}
