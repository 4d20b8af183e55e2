use crate::db::enums::EstimatedCategory;

pub const DEPOSIT_RULE_VERSION: &str = "v1";

/// Inputs gathered during qualification that feed the category/days/deposit formulas in §4.10.
#[derive(Debug, Clone)]
pub struct EstimationInput {
    pub width_cm: f64,
    pub height_cm: f64,
    pub coverup: bool,
    pub complexity_level: u8,
    pub placement: Option<String>,
}

const HARD_PLACEMENTS: &[&str] = &["ribs", "stomach", "side", "spine", "back", "sleeve", "thigh"];

fn is_hard_placement(placement: Option<&str>) -> bool {
    placement
        .map(|p| HARD_PLACEMENTS.iter().any(|hard| p.contains(hard)))
        .unwrap_or(false)
}

fn base_category(area_cm2: f64) -> EstimatedCategory {
    if area_cm2 < 50.0 {
        EstimatedCategory::Small
    } else if area_cm2 < 150.0 {
        EstimatedCategory::Medium
    } else if area_cm2 < 300.0 {
        EstimatedCategory::Large
    } else {
        EstimatedCategory::Xl
    }
}

fn bump(category: EstimatedCategory) -> EstimatedCategory {
    match category {
        EstimatedCategory::Small => EstimatedCategory::Medium,
        EstimatedCategory::Medium => EstimatedCategory::Large,
        EstimatedCategory::Large | EstimatedCategory::Xl => EstimatedCategory::Xl,
    }
}

/// `category` from area, with coverup/complexity-3/hard-placement bumps, per §4.10.
pub fn estimate_category(input: &EstimationInput) -> EstimatedCategory {
    let area = input.width_cm * input.height_cm;
    let mut category = base_category(area);
    if input.coverup {
        category = bump(category);
    }
    if input.complexity_level >= 3 {
        category = bump(category);
    }
    if is_hard_placement(input.placement.as_deref()) {
        category = bump(category);
    }
    category
}

/// `estimated_days` for XL only, multiple of 0.5, clamped to `1.0..=4.0`, per §4.10.
pub fn estimate_days(input: &EstimationInput, category: EstimatedCategory) -> Option<f64> {
    if category != EstimatedCategory::Xl {
        return None;
    }
    let area = input.width_cm * input.height_cm;
    let mut days = if area < 350.0 {
        1.5
    } else if area < 500.0 {
        2.0
    } else if area < 700.0 {
        2.5
    } else {
        3.0
    };
    if input.coverup {
        days += 0.5;
    }
    if input.complexity_level >= 3 {
        days += 0.5;
    }
    if is_hard_placement(input.placement.as_deref()) {
        days += 0.5;
    }
    Some(days.clamp(1.0, 4.0))
}

/// Deposit in pence, per §4.10.
pub fn estimate_deposit_pence(category: EstimatedCategory, estimated_days: Option<f64>) -> i64 {
    match category {
        EstimatedCategory::Small | EstimatedCategory::Medium => 15_000,
        EstimatedCategory::Large => 20_000,
        EstimatedCategory::Xl => {
            let days = estimated_days.unwrap_or(1.0);
            (20_000.0 * days) as i64
        }
    }
}

/// Internal-only price range (hours) multiplied by the region hourly rate, per §4.10. Not
/// surfaced to the client; used for operator summaries.
pub fn price_range_hours(category: EstimatedCategory) -> (f64, f64) {
    match category {
        EstimatedCategory::Small => (4.0, 5.0),
        EstimatedCategory::Medium => (5.0, 7.0),
        EstimatedCategory::Large => (7.5, 10.0),
        EstimatedCategory::Xl => (9.5, 11.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(w: f64, h: f64) -> EstimationInput {
        EstimationInput {
            width_cm: w,
            height_cm: h,
            coverup: false,
            complexity_level: 1,
            placement: None,
        }
    }

    #[test]
    fn category_thresholds() {
        assert_eq!(estimate_category(&input(5.0, 5.0)), EstimatedCategory::Small);
        assert_eq!(estimate_category(&input(10.0, 10.0)), EstimatedCategory::Medium);
        assert_eq!(estimate_category(&input(15.0, 15.0)), EstimatedCategory::Large);
        assert_eq!(estimate_category(&input(20.0, 20.0)), EstimatedCategory::Xl);
    }

    #[test]
    fn hard_placement_bumps_one_step() {
        let mut i = input(5.0, 5.0);
        i.placement = Some("ribs".to_string());
        assert_eq!(estimate_category(&i), EstimatedCategory::Medium);
    }

    #[test]
    fn xl_days_clamped_and_bumped() {
        let mut i = input(30.0, 30.0); // area 900 -> base 3.0
        i.coverup = true;
        i.complexity_level = 3;
        i.placement = Some("back".to_string());
        let category = estimate_category(&i);
        assert_eq!(category, EstimatedCategory::Xl);
        // 3.0 + 0.5*3 = 4.5, clamped to 4.0
        assert_eq!(estimate_days(&i, category), Some(4.0));
    }

    #[test]
    fn deposit_for_xl_scales_with_days() {
        assert_eq!(estimate_deposit_pence(EstimatedCategory::Xl, Some(2.0)), 40_000);
        assert_eq!(estimate_deposit_pence(EstimatedCategory::Large, None), 20_000);
    }
}
