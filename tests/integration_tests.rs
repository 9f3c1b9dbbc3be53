use anyhow::Result;
use financial_model_engine::*;
use std::collections::BTreeMap;

/// A small three-statement model: P&L with growing revenue, a balance sheet
/// driven by receivables, fixed assets with capex and depreciation
/// movements, and retained earnings absorbing profit. Cash has no rule of
/// its own; the engine derives it.
fn three_statement_config() -> ModelConfig {
    let accounts = vec![
        Account {
            sheet_type: Some(SheetType::Pl),
            ..Account::new("revenue", "Revenue")
        },
        Account {
            sheet_type: Some(SheetType::Pl),
            ..Account::new("cogs", "Cost of goods sold")
        },
        Account {
            sheet_type: Some(SheetType::Pl),
            ..Account::new("depreciation", "Depreciation")
        },
        Account {
            sheet_type: Some(SheetType::Pl),
            is_credit: true,
            is_cf_base_profit: true,
            ..Account::new("net_income", "Net income")
        },
        Account {
            sheet_type: Some(SheetType::Ppe),
            ..Account::new("capex", "Capital expenditure")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            is_cash_account: true,
            ..Account::new("cash", "Cash")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            ..Account::new("account_receivable", "Accounts receivable")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            ..Account::new("tangible_assets", "Tangible assets")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            is_credit: true,
            ..Account::new("debt", "Debt")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            is_credit: true,
            ..Account::new("retained_earnings", "Retained earnings")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            ignored_for_cf: true,
            ..Account::new(ASSETS_TOTAL, "Total assets")
        },
        Account {
            sheet_type: Some(SheetType::Bs),
            is_credit: true,
            ignored_for_cf: true,
            ..Account::new(EQUITY_AND_LIABILITIES_TOTAL, "Total equity and liabilities")
        },
    ];

    let mut rules = BTreeMap::new();
    rules.insert("revenue".to_string(), Rule::GrowthRate { rate: 0.10 });
    rules.insert(
        "cogs".to_string(),
        Rule::Percentage {
            rate: 0.6,
            of: "revenue".to_string(),
        },
    );
    rules.insert("depreciation".to_string(), Rule::FixedValue);
    rules.insert("capex".to_string(), Rule::FixedValue);
    rules.insert(
        "net_income".to_string(),
        Rule::Calculation {
            formula: Formula::account("revenue")
                .sub(Formula::account("cogs"))
                .sub(Formula::account("depreciation")),
        },
    );
    rules.insert(
        "account_receivable".to_string(),
        Rule::Proportionate {
            driver: "revenue".to_string(),
        },
    );
    rules.insert(
        "tangible_assets".to_string(),
        Rule::BalanceChange {
            flows: vec![Flow::plus("capex"), Flow::minus("depreciation")],
        },
    );
    rules.insert("debt".to_string(), Rule::FixedValue);
    rules.insert(
        "retained_earnings".to_string(),
        Rule::BalanceChange {
            flows: vec![Flow::plus("net_income")],
        },
    );
    rules.insert(
        ASSETS_TOTAL.to_string(),
        Rule::Calculation {
            formula: Formula::account("cash")
                .add(Formula::account("account_receivable"))
                .add(Formula::account("tangible_assets")),
        },
    );
    rules.insert(
        EQUITY_AND_LIABILITIES_TOTAL.to_string(),
        Rule::Calculation {
            formula: Formula::account("debt").add(Formula::account("retained_earnings")),
        },
    );

    let fy2024 = "2024-12-ANNUAL";
    let inputs = vec![
        InputValue::new(fy2024, "revenue", 500_000.0),
        InputValue::new(fy2024, "cogs", 300_000.0),
        InputValue::new(fy2024, "depreciation", 50_000.0),
        InputValue::new(fy2024, "net_income", 150_000.0),
        InputValue::new(fy2024, "capex", 80_000.0),
        InputValue::new(fy2024, "cash", 100_000.0),
        InputValue::new(fy2024, "account_receivable", 50_000.0),
        InputValue::new(fy2024, "tangible_assets", 400_000.0),
        InputValue::new(fy2024, "debt", 200_000.0),
        InputValue::new(fy2024, "retained_earnings", 350_000.0),
        InputValue::new(fy2024, ASSETS_TOTAL, 550_000.0),
        InputValue::new(fy2024, EQUITY_AND_LIABILITIES_TOTAL, 550_000.0),
    ];

    ModelConfig {
        accounts,
        periods: vec![Period::annual(2024, 12)],
        rules,
        inputs,
    }
}

#[test]
fn test_three_statement_forecast() -> Result<()> {
    let mut engine = ModelEngine::from_config(three_statement_config())?;
    let results = engine.compute()?;
    let forecast = &results["2025-12-ANNUAL"];

    // P&L
    assert_eq!(forecast["revenue"], 550_000.0);
    assert_eq!(forecast["cogs"], 330_000.0);
    assert_eq!(forecast["depreciation"], 50_000.0);
    assert_eq!(forecast["net_income"], 170_000.0);

    // Balance sheet
    assert_eq!(forecast["account_receivable"], 55_000.0);
    assert_eq!(forecast["tangible_assets"], 430_000.0);
    assert_eq!(forecast["debt"], 200_000.0);
    assert_eq!(forecast["retained_earnings"], 520_000.0);

    // Derived cash flow
    assert_eq!(forecast["baseProfit_cf"], 170_000.0);
    assert_eq!(forecast["depreciation_cf_adj"], 50_000.0);
    assert_eq!(forecast["capex_cf_adj"], -80_000.0);
    assert_eq!(forecast["account_receivable_cf_wc"], -5_000.0);
    assert_eq!(forecast["debt_cf_wc"], 0.0);
    assert_eq!(forecast["cash_change_cf"], 135_000.0);
    assert_eq!(forecast["cash"], 235_000.0);

    // Totals balance to the unit
    assert_eq!(forecast[ASSETS_TOTAL], 720_000.0);
    assert_eq!(forecast[EQUITY_AND_LIABILITIES_TOTAL], 720_000.0);
    engine.verify_balance("2025-12-ANNUAL", 1.0)?;

    Ok(())
}

#[test]
fn test_cash_change_matches_its_components() -> Result<()> {
    let mut engine = ModelEngine::from_config(three_statement_config())?;
    engine.compute()?;

    let period = "2025-12-ANNUAL";
    let get = |account: &str| engine.value(period, account).unwrap();

    let expected = get("baseProfit_cf")
        + get("depreciation_cf_adj")
        + get("account_receivable_cf_wc")
        + get("debt_cf_wc")
        + get("capex_cf_adj");
    assert!(
        (get("cash_change_cf") - expected).abs() < 0.01,
        "cash change {} != component sum {}",
        get("cash_change_cf"),
        expected
    );

    Ok(())
}

#[test]
fn test_derived_accounts_are_registered() -> Result<()> {
    let mut engine = ModelEngine::from_config(three_statement_config())?;
    engine.compute()?;

    for id in [
        BASE_PROFIT_CF,
        "depreciation_cf_adj",
        "capex_cf_adj",
        "account_receivable_cf_wc",
        "debt_cf_wc",
        CASH_CHANGE_CF,
    ] {
        let account = engine
            .all_accounts()
            .iter()
            .find(|a| a.id == id)
            .unwrap_or_else(|| panic!("missing derived account {id}"));
        assert_eq!(account.sheet_type, Some(SheetType::Cf));
        assert!(account.ignored_for_cf);
    }

    Ok(())
}

#[test]
fn test_two_period_horizon_stays_balanced() -> Result<()> {
    let mut engine = ModelEngine::from_config(three_statement_config())?;
    let results = engine.compute_horizon(2)?;

    assert_eq!(results.len(), 2);

    let fy2026 = &results["2026-12-ANNUAL"];
    assert_eq!(fy2026["revenue"], 605_000.0);
    assert_eq!(fy2026["cogs"], 363_000.0);
    assert_eq!(fy2026["net_income"], 192_000.0);
    assert_eq!(fy2026["account_receivable"], 60_500.0);
    assert_eq!(fy2026["tangible_assets"], 460_000.0);
    assert_eq!(fy2026["retained_earnings"], 712_000.0);
    assert_eq!(fy2026["cash_change_cf"], 156_500.0);
    assert_eq!(fy2026["cash"], 391_500.0);
    assert_eq!(fy2026[ASSETS_TOTAL], 912_000.0);
    assert_eq!(fy2026[EQUITY_AND_LIABILITIES_TOTAL], 912_000.0);

    engine.verify_balance("2025-12-ANNUAL", 1.0)?;
    engine.verify_balance("2026-12-ANNUAL", 1.0)?;

    Ok(())
}

#[test]
fn test_repeated_computes_do_not_duplicate_derived_accounts() -> Result<()> {
    let mut engine = ModelEngine::from_config(three_statement_config())?;

    engine.compute()?;
    let accounts_after_first = engine.all_accounts().to_vec();

    engine.compute()?;
    assert_eq!(engine.all_accounts(), accounts_after_first.as_slice());

    Ok(())
}

#[test]
fn test_identical_models_produce_identical_results() -> Result<()> {
    let mut first = ModelEngine::from_config(three_statement_config())?;
    let mut second = ModelEngine::from_config(three_statement_config())?;

    assert_eq!(first.compute_horizon(3)?, second.compute_horizon(3)?);

    Ok(())
}

#[test]
fn test_config_round_trips_through_json() -> Result<()> {
    let config = three_statement_config();
    let json = config.to_json()?;
    let restored = ModelConfig::from_json(&json)?;
    assert_eq!(restored, config);

    let mut from_restored = ModelEngine::from_config(restored)?;
    let mut from_original = ModelEngine::from_config(config)?;
    assert_eq!(from_restored.compute()?, from_original.compute()?);

    Ok(())
}
