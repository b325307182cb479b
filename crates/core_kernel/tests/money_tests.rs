//! Integration tests for minor-unit money
//!
//! Tests cover conversion at the major/minor boundary, checked arithmetic,
//! and the rounding rule used when a rate produces fractional minor units.

use core_kernel::{Currency, MinorUnits, MoneyError, Rate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

mod conversion {
    use super::*;

    #[test]
    fn test_from_major_whole_amount() {
        let m = MinorUnits::from_major(dec!(1500), Currency::MXN).unwrap();
        assert_eq!(m.value(), 150_000);
    }

    #[test]
    fn test_from_major_jpy_has_no_minor_units() {
        let m = MinorUnits::from_major(dec!(10000), Currency::JPY).unwrap();
        assert_eq!(m.value(), 10_000);
        assert!(MinorUnits::from_major(dec!(0.5), Currency::JPY).is_err());
    }

    #[test]
    fn test_from_major_overflow() {
        let result = MinorUnits::from_major(dec!(999999999999999999999), Currency::USD);
        assert_eq!(result, Err(MoneyError::Overflow));
    }

    #[test]
    fn test_from_major_at_decimal_limit_is_an_error() {
        let largest = Decimal::from_str("79228162514264337593543950335").unwrap();
        assert_eq!(
            MinorUnits::from_major(largest, Currency::MXN),
            Err(MoneyError::Overflow)
        );
        assert_eq!(
            MinorUnits::from_major(largest, Currency::JPY),
            Err(MoneyError::Overflow)
        );
    }

    #[test]
    fn test_display_in_currency() {
        let m = MinorUnits::new(123_456);
        assert_eq!(m.display_in(Currency::MXN), "MX$ 1234.56");
    }

    #[test]
    fn test_currency_parse_is_case_insensitive() {
        assert_eq!("mxn".parse::<Currency>().unwrap(), Currency::MXN);
        assert!(matches!(
            "XYZ".parse::<Currency>(),
            Err(MoneyError::UnknownCurrency(_))
        ));
    }
}

mod arithmetic {
    use super::*;

    #[test]
    fn test_checked_sum_overflow_is_reported() {
        let amounts = vec![MinorUnits::new(i64::MAX), MinorUnits::new(1)];
        assert_eq!(MinorUnits::checked_sum(amounts), Err(MoneyError::Overflow));
    }

    #[test]
    fn test_abs_diff_is_symmetric() {
        let a = MinorUnits::new(5_000);
        let b = MinorUnits::new(4_999);
        assert_eq!(a.abs_diff(b), MinorUnits::new(1));
        assert_eq!(b.abs_diff(a), MinorUnits::new(1));
    }

    #[test]
    fn test_serializes_as_plain_integer() {
        let json = serde_json::to_string(&MinorUnits::new(4_500)).unwrap();
        assert_eq!(json, "4500");
    }
}

mod rates {
    use super::*;

    #[test]
    fn test_rate_round_trip_percentage() {
        let rate = Rate::from_percentage(dec!(3));
        assert_eq!(rate.as_decimal(), dec!(0.03));
        assert_eq!(rate.as_percentage(), dec!(3));
    }

    #[test]
    fn test_rate_applied_then_rounded() {
        let rate = Rate::from_percentage(dec!(3));
        let raw = rate.apply(MinorUnits::new(1_250));
        assert_eq!(raw, dec!(37.5));
        assert_eq!(
            MinorUnits::from_decimal_minor_rounded(raw).unwrap(),
            MinorUnits::new(38)
        );
    }
}
