//! Static configuration for the supported USPS unions: NALC, APWU and NRLCA.
//! Craft determines affiliation; affiliation determines terminology and the
//! contractual time limit attached to each resolution step.

use crate::lifecycle::GrievanceStep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnionAffiliation {
    Nalc,
    Apwu,
    Nrlca,
}

#[derive(Debug)]
pub struct StepTimeLimit {
    pub step: GrievanceStep,
    pub days: i64,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct UnionConfig {
    pub name: &'static str,
    pub full_name: &'static str,
    pub crafts: &'static [&'static str],
    pub employee_term: &'static str,
    pub representative_term: &'static str,
    pub chapter_term: &'static str,
    pub time_limits: &'static [StepTimeLimit],
}

static NALC: UnionConfig = UnionConfig {
    name: "NALC",
    full_name: "National Association of Letter Carriers",
    crafts: &["city_carrier", "cca"],
    employee_term: "Carrier",
    representative_term: "Steward",
    chapter_term: "Branch",
    time_limits: &[
        StepTimeLimit {
            step: GrievanceStep::InformalStepA,
            days: 14,
            description: "Discussion with supervisor",
        },
        StepTimeLimit {
            step: GrievanceStep::FormalStepA,
            days: 7,
            description: "Formal written grievance",
        },
        StepTimeLimit {
            step: GrievanceStep::StepB,
            days: 10,
            description: "Appeal to Step B",
        },
        StepTimeLimit {
            step: GrievanceStep::Arbitration,
            days: 15,
            description: "Request arbitration",
        },
    ],
};

static APWU: UnionConfig = UnionConfig {
    name: "APWU",
    full_name: "American Postal Workers Union",
    crafts: &["clerk", "maintenance", "mvs"],
    employee_term: "Member",
    representative_term: "Steward",
    chapter_term: "Local",
    time_limits: &[
        StepTimeLimit {
            step: GrievanceStep::InformalStepA,
            days: 14,
            description: "Discussion with supervisor",
        },
        StepTimeLimit {
            step: GrievanceStep::FormalStepA,
            days: 10,
            description: "Formal written grievance",
        },
        StepTimeLimit {
            step: GrievanceStep::StepB,
            days: 8,
            description: "Appeal to Step B",
        },
        StepTimeLimit {
            step: GrievanceStep::Arbitration,
            days: 15,
            description: "Request arbitration",
        },
    ],
};

static NRLCA: UnionConfig = UnionConfig {
    name: "NRLCA",
    full_name: "National Rural Letter Carriers Association",
    crafts: &["rural_carrier", "rca"],
    employee_term: "Rural Carrier",
    representative_term: "Steward",
    chapter_term: "State Association",
    time_limits: &[
        StepTimeLimit {
            step: GrievanceStep::InformalStepA,
            days: 14,
            description: "Discussion with supervisor",
        },
        StepTimeLimit {
            step: GrievanceStep::FormalStepA,
            days: 7,
            description: "Formal written grievance",
        },
        StepTimeLimit {
            step: GrievanceStep::StepB,
            days: 10,
            description: "Appeal to Step B",
        },
        StepTimeLimit {
            step: GrievanceStep::Arbitration,
            days: 15,
            description: "Request arbitration",
        },
    ],
};

pub const KNOWN_CRAFTS: &[&str] = &[
    "city_carrier",
    "cca",
    "clerk",
    "maintenance",
    "mvs",
    "rural_carrier",
    "rca",
    "other",
];

pub fn is_known_craft(craft: &str) -> bool {
    KNOWN_CRAFTS.iter().any(|known| *known == craft)
}

pub fn union_for_craft(craft: &str) -> Option<UnionAffiliation> {
    for (affiliation, config) in [
        (UnionAffiliation::Nalc, &NALC),
        (UnionAffiliation::Apwu, &APWU),
        (UnionAffiliation::Nrlca, &NRLCA),
    ] {
        if config.crafts.iter().any(|entry| *entry == craft) {
            return Some(affiliation);
        }
    }
    None
}

pub fn config_for(affiliation: UnionAffiliation) -> &'static UnionConfig {
    match affiliation {
        UnionAffiliation::Nalc => &NALC,
        UnionAffiliation::Apwu => &APWU,
        UnionAffiliation::Nrlca => &NRLCA,
    }
}

/// Union configuration for a craft. Crafts without an affiliation (e.g.
/// `other`) fall back to NALC, matching how filings for mixed facilities are
/// administered.
pub fn config_for_craft(craft: &str) -> &'static UnionConfig {
    union_for_craft(craft)
        .map(config_for)
        .unwrap_or(&NALC)
}

pub fn time_limit_for_step(craft: &str, step: GrievanceStep) -> Option<&'static StepTimeLimit> {
    config_for_craft(craft)
        .time_limits
        .iter()
        .find(|limit| limit.step == step)
}

pub fn craft_label(craft: &str) -> &str {
    match craft {
        "city_carrier" => "City Carrier",
        "cca" => "CCA (City Carrier Assistant)",
        "clerk" => "Clerk",
        "maintenance" => "Maintenance",
        "mvs" => "Motor Vehicle Service",
        "rural_carrier" => "Rural Carrier",
        "rca" => "RCA (Rural Carrier Associate)",
        "other" => "Other",
        other => other,
    }
}
