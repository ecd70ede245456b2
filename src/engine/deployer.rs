//! Deployer reputation scoring
//!
//! `score = 100 - 80 * rug_ratio - 20 * dead_ratio`, clamped to 0..=100.
//! The score is a heuristic over the outcomes of a wallet's past launches.

use crate::types::{DeployedToken, DeployerScore, Grade, RiskLevel, TokenStatus};

const RUG_WEIGHT: f64 = 80.0;
const DEAD_WEIGHT: f64 = 20.0;

pub fn grade_for_score(score: f64) -> Grade {
    if score >= 80.0 {
        Grade::A
    } else if score >= 60.0 {
        Grade::B
    } else if score >= 40.0 {
        Grade::C
    } else if score >= 20.0 {
        Grade::D
    } else {
        Grade::F
    }
}

/// Risk from rug ratio. Exactly 0.2 is still medium.
pub fn risk_for_rug_ratio(rug_ratio: f64) -> RiskLevel {
    if rug_ratio <= 0.0 {
        RiskLevel::Low
    } else if rug_ratio <= 0.2 {
        RiskLevel::Medium
    } else if rug_ratio < 0.5 {
        RiskLevel::High
    } else {
        RiskLevel::Critical
    }
}

pub fn score_deployer(tokens: &[DeployedToken]) -> DeployerScore {
    let count = |status: TokenStatus| tokens.iter().filter(|t| t.status == status).count();
    let active = count(TokenStatus::Active);
    let rugged = count(TokenStatus::Rugged);
    let dead = count(TokenStatus::Dead);
    let unknown = count(TokenStatus::Unknown);

    let total_tokens = tokens.len();
    let (rug_ratio, dead_ratio) = if total_tokens == 0 {
        (0.0, 0.0)
    } else {
        (
            rugged as f64 / total_tokens as f64,
            dead as f64 / total_tokens as f64,
        )
    };

    let score = (100.0 - RUG_WEIGHT * rug_ratio - DEAD_WEIGHT * dead_ratio).clamp(0.0, 100.0);

    DeployerScore {
        total_tokens,
        active,
        rugged,
        dead,
        unknown,
        rug_ratio,
        dead_ratio,
        score,
        grade: grade_for_score(score),
        risk_level: risk_for_rug_ratio(rug_ratio),
    }
}
