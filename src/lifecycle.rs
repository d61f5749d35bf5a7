use std::fmt;
use std::str::FromStr;

use thiserror::Error;

#[derive(Debug, Error)]
#[error("unknown {vocabulary} value: {value}")]
pub struct UnknownValue {
    vocabulary: &'static str,
    value: String,
}

impl UnknownValue {
    pub(crate) fn new(vocabulary: &'static str, value: &str) -> Self {
        Self {
            vocabulary,
            value: value.to_string(),
        }
    }
}

/// Resolution step of a grievance. The API accepts any known step in any
/// order; only unknown strings are rejected (corrections are allowed to move
/// a case backwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrievanceStep {
    Filed,
    InformalStepA,
    FormalStepA,
    StepB,
    Arbitration,
    Resolved,
}

impl GrievanceStep {
    pub const ALL: [GrievanceStep; 6] = [
        GrievanceStep::Filed,
        GrievanceStep::InformalStepA,
        GrievanceStep::FormalStepA,
        GrievanceStep::StepB,
        GrievanceStep::Arbitration,
        GrievanceStep::Resolved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrievanceStep::Filed => "filed",
            GrievanceStep::InformalStepA => "informal_step_a",
            GrievanceStep::FormalStepA => "formal_step_a",
            GrievanceStep::StepB => "step_b",
            GrievanceStep::Arbitration => "arbitration",
            GrievanceStep::Resolved => "resolved",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrievanceStep::Filed => "Filed",
            GrievanceStep::InformalStepA => "Informal Step A",
            GrievanceStep::FormalStepA => "Formal Step A",
            GrievanceStep::StepB => "Step B",
            GrievanceStep::Arbitration => "Arbitration",
            GrievanceStep::Resolved => "Resolved",
        }
    }
}

impl FromStr for GrievanceStep {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "filed" => Ok(GrievanceStep::Filed),
            "informal_step_a" => Ok(GrievanceStep::InformalStepA),
            "formal_step_a" => Ok(GrievanceStep::FormalStepA),
            "step_b" => Ok(GrievanceStep::StepB),
            "arbitration" => Ok(GrievanceStep::Arbitration),
            "resolved" => Ok(GrievanceStep::Resolved),
            other => Err(UnknownValue::new("step", other)),
        }
    }
}

impl fmt::Display for GrievanceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Overall case status, independent of the current step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrievanceStatus {
    Active,
    Resolved,
    Settled,
    Denied,
    Withdrawn,
}

impl GrievanceStatus {
    pub const ALL: [GrievanceStatus; 5] = [
        GrievanceStatus::Active,
        GrievanceStatus::Resolved,
        GrievanceStatus::Settled,
        GrievanceStatus::Denied,
        GrievanceStatus::Withdrawn,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GrievanceStatus::Active => "active",
            GrievanceStatus::Resolved => "resolved",
            GrievanceStatus::Settled => "settled",
            GrievanceStatus::Denied => "denied",
            GrievanceStatus::Withdrawn => "withdrawn",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            GrievanceStatus::Active => "Active",
            GrievanceStatus::Resolved => "Resolved",
            GrievanceStatus::Settled => "Settled",
            GrievanceStatus::Denied => "Denied",
            GrievanceStatus::Withdrawn => "Withdrawn",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GrievanceStatus::Active)
    }
}

impl FromStr for GrievanceStatus {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "active" => Ok(GrievanceStatus::Active),
            "resolved" => Ok(GrievanceStatus::Resolved),
            "settled" => Ok(GrievanceStatus::Settled),
            "denied" => Ok(GrievanceStatus::Denied),
            "withdrawn" => Ok(GrievanceStatus::Withdrawn),
            other => Err(UnknownValue::new("status", other)),
        }
    }
}

impl fmt::Display for GrievanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account role vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserRole {
    Employee,
    Steward,
    Representative,
}

impl UserRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Employee => "employee",
            UserRole::Steward => "steward",
            UserRole::Representative => "representative",
        }
    }
}

impl FromStr for UserRole {
    type Err = UnknownValue;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "employee" => Ok(UserRole::Employee),
            "steward" => Ok(UserRole::Steward),
            "representative" => Ok(UserRole::Representative),
            other => Err(UnknownValue::new("role", other)),
        }
    }
}
