//! Custom Test Assertions
//!
//! Provides assertion helpers for previews that report which bill or total
//! broke the expectation, rather than a bare `assertion failed`.

use core_kernel::MinorUnits;
use domain_billing::{BillStatus, ModuleType, UnifiedPreview};

/// Asserts that every unit of available money is allocated or kept as credit
///
/// # Panics
///
/// Panics if `total_allocated + final_credit != incoming_payment + existing_credit`
pub fn assert_conservation(preview: &UnifiedPreview) {
    let available = preview.funds.incoming_payment.value() + preview.funds.existing_credit.value();
    let accounted = preview.totals.total_allocated.value() + preview.credit.final_balance.value();
    assert_eq!(
        accounted, available,
        "Conservation violated: allocated={} final_credit={} payment={} credit={}",
        preview.totals.total_allocated,
        preview.credit.final_balance,
        preview.funds.incoming_payment,
        preview.funds.existing_credit
    );

    let module_sum: MinorUnits = preview.dues.total_paid.value().checked_add(preview.utility.total_paid.value())
        .map(MinorUnits::new)
        .expect("module totals overflow");
    assert_eq!(
        module_sum, preview.totals.total_allocated,
        "Module totals do not add up to total allocated"
    );
}

/// Asserts the amount paid toward a bill in the preview
///
/// # Panics
///
/// Panics if the bill is missing or the amount differs
pub fn assert_bill_paid(preview: &UnifiedPreview, module: ModuleType, period: &str, expected: i64) {
    let bill = preview
        .module(module)
        .find(period)
        .unwrap_or_else(|| panic!("No allocation for {}:{} in preview", module, period));
    assert_eq!(
        bill.amount_paid,
        MinorUnits::new(expected),
        "Unexpected amount paid on {}:{}",
        module,
        period
    );
}

/// Asserts the status a bill ends up with
pub fn assert_bill_status(preview: &UnifiedPreview, module: ModuleType, period: &str, expected: BillStatus) {
    let bill = preview
        .module(module)
        .find(period)
        .unwrap_or_else(|| panic!("No allocation for {}:{} in preview", module, period));
    assert_eq!(bill.new_status, expected, "Unexpected status on {}:{}", module, period);
}

/// Asserts that a bill receives nothing
pub fn assert_bill_untouched(preview: &UnifiedPreview, module: ModuleType, period: &str) {
    assert!(
        preview.module(module).find(period).is_none(),
        "Expected {}:{} to receive nothing",
        module,
        period
    );
}

/// Asserts the unit's final credit balance
pub fn assert_final_credit(preview: &UnifiedPreview, expected: i64) {
    assert_eq!(
        preview.credit.final_balance,
        MinorUnits::new(expected),
        "Unexpected final credit: {:?}",
        preview.credit
    );
}
