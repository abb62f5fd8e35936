//! Caller identity.
//!
//! Every resolver, provider and preflight call takes the caller's [`UserContext`] explicitly and
//! forwards it to the backend as authorization context.

use cohort_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{CoreError, CoreResult};

/// The purpose under which a user is querying.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionType {
    #[default]
    Research,
    QualityImprovement,
}

impl SessionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionType::Research => "research",
            SessionType::QualityImprovement => "qualityImprovement",
        }
    }
}

impl fmt::Display for SessionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "research" => Ok(SessionType::Research),
            "qualityimprovement" | "qi" => Ok(SessionType::QualityImprovement),
            other => Err(CoreError::InvalidInput(format!(
                "unknown session type '{other}' (expected research or qualityImprovement)"
            ))),
        }
    }
}

/// The authenticated caller of a core operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub username: NonEmptyText,
    pub issuer: String,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub session_type: SessionType,
    /// Whether the session may see identified (non de-identified) data.
    #[serde(default)]
    pub identified: bool,
}

impl UserContext {
    /// Builds a non-admin research user with no group memberships.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidInput` if `username` is blank or too long.
    pub fn new(username: &str, issuer: impl Into<String>) -> CoreResult<Self> {
        let username = NonEmptyText::new(username)
            .map_err(|e| CoreError::InvalidInput(format!("username: {e}")))?;

        Ok(Self {
            username,
            issuer: issuer.into(),
            groups: Vec::new(),
            is_admin: false,
            session_type: SessionType::Research,
            identified: false,
        })
    }

    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = groups.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_admin(mut self, is_admin: bool) -> Self {
        self.is_admin = is_admin;
        self
    }

    pub fn with_session(mut self, session_type: SessionType, identified: bool) -> Self {
        self.session_type = session_type;
        self.identified = identified;
        self
    }

    /// Issuer-qualified name, `user@issuer`, as stored in ownership columns.
    pub fn qualified_name(&self) -> String {
        if self.issuer.is_empty() {
            self.username.to_string()
        } else {
            format!("{}@{}", self.username, self.issuer)
        }
    }

    pub fn in_group(&self, group: &str) -> bool {
        self.groups.iter().any(|g| g == group)
    }
}
