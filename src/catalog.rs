//! Static reference data: investment plans and copy-trading leaders.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

/// Fixed-rate investment plan. `name_key` is a translation key rendered by clients.
#[derive(Debug, Clone, Serialize)]
pub struct InvestmentPlan {
    pub id: &'static str,
    pub name_key: &'static str,
    pub min_investment: Decimal,
    pub daily_profit_rate: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// A trader whose simulated daily return can be mirrored.
#[derive(Debug, Clone, Serialize)]
pub struct CopyTrader {
    pub id: &'static str,
    pub name: &'static str,
    pub daily_roi: Decimal,
    pub min_allocation: Decimal,
    pub risk_level: RiskLevel,
}

#[must_use]
pub fn plans() -> Vec<InvestmentPlan> {
    vec![
        InvestmentPlan {
            id: "starter",
            name_key: "plans.starter",
            min_investment: dec!(100),
            daily_profit_rate: dec!(0.015),
        },
        InvestmentPlan {
            id: "silver",
            name_key: "plans.silver",
            min_investment: dec!(1000),
            daily_profit_rate: dec!(0.020),
        },
        InvestmentPlan { id: "gold", name_key: "plans.gold", min_investment: dec!(5000), daily_profit_rate: dec!(0.025) },
        InvestmentPlan {
            id: "platinum",
            name_key: "plans.platinum",
            min_investment: dec!(25000),
            daily_profit_rate: dec!(0.030),
        },
    ]
}

#[must_use]
pub fn find_plan(id: &str) -> Option<InvestmentPlan> {
    plans().into_iter().find(|p| p.id == id)
}

#[must_use]
pub fn traders() -> Vec<CopyTrader> {
    vec![
        CopyTrader {
            id: "steady-eddie",
            name: "Steady Eddie",
            daily_roi: dec!(0.004),
            min_allocation: dec!(50),
            risk_level: RiskLevel::Low,
        },
        CopyTrader {
            id: "swing-queen",
            name: "Swing Queen",
            daily_roi: dec!(0.011),
            min_allocation: dec!(250),
            risk_level: RiskLevel::Medium,
        },
        CopyTrader {
            id: "degen-dan",
            name: "Degen Dan",
            daily_roi: dec!(-0.007),
            min_allocation: dec!(100),
            risk_level: RiskLevel::High,
        },
    ]
}

#[must_use]
pub fn find_trader(id: &str) -> Option<CopyTrader> {
    traders().into_iter().find(|t| t.id == id)
}
