//! Payment reconciliation.
//!
//! Every service and product records a price together with the payment entries
//! that settled it. The entries must add up to the price to the cent; there is
//! no tolerance.

use crate::core::money::{Money, PaymentEntry, PaymentMethod};
use crate::errors::ValidationError;

/// Anything that declares a price and the payments covering it.
pub trait PaymentReconciled {
    /// Declared total price.
    fn price(&self) -> Money;

    /// Payment breakdown.
    fn payments(&self) -> &[PaymentEntry];

    /// Checks the breakdown against the price.
    ///
    /// # Errors
    /// See [`validate_payments`].
    fn validate_payments(&self) -> Result<(), ValidationError> {
        validate_payments(self.price(), self.payments())
    }
}

/// Verifies that `payments` settles `price` exactly.
///
/// Rules, checked in order:
/// 1. at least one entry is present
/// 2. the price is not negative
/// 3. no entry is negative
/// 4. `other` entries carry a non-empty label
/// 5. the entries sum to the price
///
/// # Errors
/// Returns the [`ValidationError`] for the first rule that fails.
pub fn validate_payments(price: Money, payments: &[PaymentEntry]) -> Result<(), ValidationError> {
    if payments.is_empty() {
        return Err(ValidationError::MissingPayments);
    }

    if price.is_negative() {
        return Err(ValidationError::NegativePrice { price });
    }

    for entry in payments {
        if entry.amount.is_negative() {
            return Err(ValidationError::NegativeAmount {
                method: entry.method,
                amount: entry.amount,
            });
        }
        if entry.method == PaymentMethod::Other
            && entry.label.as_deref().is_none_or(|l| l.trim().is_empty())
        {
            return Err(ValidationError::MissingOtherLabel);
        }
    }

    let paid = payments
        .iter()
        .try_fold(Money::ZERO, |acc, entry| acc.checked_add(entry.amount))
        .ok_or_else(|| ValidationError::InvalidMoney {
            input: format!("{} payment entries", payments.len()),
            reason: "payment total is out of range".to_string(),
        })?;

    if paid != price {
        return Err(ValidationError::PaymentSumMismatch { price, paid });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(c: i64) -> Money {
        Money::from_cents(c)
    }

    #[test]
    fn test_exact_split_is_accepted() {
        let payments = [
            PaymentEntry::new(PaymentMethod::Card, cents(4000)),
            PaymentEntry::new(PaymentMethod::Cash, cents(2000)),
        ];
        assert_eq!(validate_payments(cents(6000), &payments), Ok(()));
    }

    #[test]
    fn test_one_cent_short_is_rejected() {
        let payments = [
            PaymentEntry::new(PaymentMethod::Cash, cents(2000)),
            PaymentEntry::new(PaymentMethod::Card, cents(2999)),
        ];
        assert_eq!(
            validate_payments(cents(5000), &payments),
            Err(ValidationError::PaymentSumMismatch {
                price: cents(5000),
                paid: cents(4999),
            })
        );
    }

    #[test]
    fn test_overpayment_is_rejected() {
        let payments = [PaymentEntry::new(PaymentMethod::Zelle, cents(5001))];
        assert!(matches!(
            validate_payments(cents(5000), &payments),
            Err(ValidationError::PaymentSumMismatch { .. })
        ));
    }

    #[test]
    fn test_empty_payments_are_rejected() {
        assert_eq!(
            validate_payments(cents(0), &[]),
            Err(ValidationError::MissingPayments)
        );
    }

    #[test]
    fn test_negative_entry_is_reported_before_sum() {
        let payments = [
            PaymentEntry::new(PaymentMethod::Cash, cents(7000)),
            PaymentEntry::new(PaymentMethod::CashApp, cents(-1000)),
        ];
        assert_eq!(
            validate_payments(cents(6000), &payments),
            Err(ValidationError::NegativeAmount {
                method: PaymentMethod::CashApp,
                amount: cents(-1000),
            })
        );
    }

    #[test]
    fn test_negative_price_is_rejected() {
        let payments = [PaymentEntry::new(PaymentMethod::Cash, cents(0))];
        assert!(matches!(
            validate_payments(cents(-100), &payments),
            Err(ValidationError::NegativePrice { .. })
        ));
    }

    #[test]
    fn test_other_requires_label() {
        let unlabeled = [PaymentEntry::new(PaymentMethod::Other, cents(1500))];
        assert_eq!(
            validate_payments(cents(1500), &unlabeled),
            Err(ValidationError::MissingOtherLabel)
        );

        let blank = [PaymentEntry::other(cents(1500), "   ")];
        assert_eq!(
            validate_payments(cents(1500), &blank),
            Err(ValidationError::MissingOtherLabel)
        );

        let labeled = [PaymentEntry::other(cents(1500), "gift card")];
        assert_eq!(validate_payments(cents(1500), &labeled), Ok(()));
    }

    #[test]
    fn test_zero_price_with_zero_payment() {
        let payments = [PaymentEntry::new(PaymentMethod::Cash, Money::ZERO)];
        assert_eq!(validate_payments(Money::ZERO, &payments), Ok(()));
    }

    #[test]
    fn test_trait_default_delegates() {
        struct Ticket(Vec<PaymentEntry>);
        impl PaymentReconciled for Ticket {
            fn price(&self) -> Money {
                cents(2500)
            }
            fn payments(&self) -> &[PaymentEntry] {
                &self.0
            }
        }

        let ok = Ticket(vec![PaymentEntry::new(PaymentMethod::Card, cents(2500))]);
        assert!(ok.validate_payments().is_ok());
        let short = Ticket(vec![PaymentEntry::new(PaymentMethod::Card, cents(2400))]);
        assert!(short.validate_payments().is_err());
    }
}
