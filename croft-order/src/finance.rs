use croft_core::{Error, Result};
use croft_shared::money::{apply_rate, Cents};

use crate::models::{FulfillmentMethod, NewOrderItem};

/// The four money fields persisted on every order.
///
/// Invariant: `total == subtotal + tax + shipping`. Amounts are integer
/// cents, so the check is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal_cents: Cents,
    pub tax_cents: Cents,
    pub shipping_cents: Cents,
    pub total_cents: Cents,
}

impl OrderTotals {
    /// Compute totals from captured line prices and caller-supplied tax and
    /// shipping. Pickup orders never carry a shipping charge.
    pub fn compute(
        items: &[NewOrderItem],
        tax_cents: Cents,
        shipping_cents: Cents,
        method: FulfillmentMethod,
    ) -> Self {
        let subtotal_cents: Cents = items
            .iter()
            .map(|item| item.unit_price_cents * item.quantity)
            .sum();
        let shipping_cents = if method.is_pickup() { 0 } else { shipping_cents };
        Self {
            subtotal_cents,
            tax_cents,
            shipping_cents,
            total_cents: subtotal_cents + tax_cents + shipping_cents,
        }
    }

    /// Tax at a configured rate, rounded to the nearest cent. Used when the
    /// caller does not price tax itself.
    pub fn tax_for(subtotal_cents: Cents, rate: f64) -> Cents {
        apply_rate(subtotal_cents, rate)
    }

    pub fn verify(&self) -> Result<()> {
        if self.subtotal_cents < 0
            || self.tax_cents < 0
            || self.shipping_cents < 0
            || self.total_cents < 0
        {
            return Err(Error::validation("Order totals must be non-negative"));
        }
        if self.total_cents != self.subtotal_cents + self.tax_cents + self.shipping_cents {
            return Err(Error::validation("Order totals do not add up"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn item(quantity: i64, unit_price_cents: Cents) -> NewOrderItem {
        NewOrderItem {
            product_id: Uuid::new_v4(),
            product_name: "Heirloom Tomatoes".to_string(),
            quantity,
            unit_price_cents,
        }
    }

    #[test]
    fn test_checkout_totals() {
        // qty 2 @ $10 plus qty 1 @ $20, tax $4, shipping $5.
        let totals = OrderTotals::compute(
            &[item(2, 1000), item(1, 2000)],
            400,
            500,
            FulfillmentMethod::Delivery,
        );
        assert_eq!(totals.subtotal_cents, 4000);
        assert_eq!(totals.total_cents, 4900);
        totals.verify().unwrap();
    }

    #[test]
    fn test_pickup_orders_ship_free() {
        let totals =
            OrderTotals::compute(&[item(3, 250)], 60, 599, FulfillmentMethod::FarmPickup);
        assert_eq!(totals.shipping_cents, 0);
        assert_eq!(totals.total_cents, 810);
        totals.verify().unwrap();
    }

    #[test]
    fn test_mismatched_totals_rejected() {
        let totals = OrderTotals {
            subtotal_cents: 4000,
            tax_cents: 400,
            shipping_cents: 500,
            total_cents: 5000,
        };
        let err = totals.verify().unwrap_err();
        assert_eq!(err.to_string(), "Order totals do not add up");
    }

    #[test]
    fn test_tax_rounds_to_nearest_cent() {
        // 8% of $1.31 is 10.48 cents.
        assert_eq!(OrderTotals::tax_for(131, 0.08), 10);
        assert_eq!(OrderTotals::tax_for(4000, 0.08), 320);
    }
}
