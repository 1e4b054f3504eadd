//! The purchase aggregate.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::delivery::Delivery;
use crate::error::{FulfilmentError, OrderError};
use crate::fulfilment::{Unfulfilled, delete_date_after};
use crate::order::Order;
use crate::types::{AccessKey, Cents, CountryId, Notify, PaymentKey, PurchaseId, PurchaseStatus};

/// A customer's purchase: what was ordered, what was delivered, and where it
/// stands in the payment lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    /// Public, human-typable ID (six characters).
    pub id: PurchaseId,
    /// Grants the customer access to the purchase page.
    pub access_key: AccessKey,
    /// Identifies the purchase towards payment providers.
    pub payment_key: PaymentKey,
    pub status: PurchaseStatus,
    pub ordered: Order,
    pub delivered: Delivery,
    /// Tax country: ISO code or `non-EU`.
    pub country_code: CountryId,
    pub notify: Option<Notify>,
    pub create_date: NaiveDate,
    /// Removed by the cleanup sweep after this date. `None` keeps it forever.
    pub delete_date: Option<NaiveDate>,
}

impl Purchase {
    /// Ordered minus delivered, per key.
    ///
    /// # Errors
    ///
    /// Returns a `FulfilmentError` if the delivery does not fit the order.
    pub fn unfulfilled(&self) -> Result<Unfulfilled, FulfilmentError> {
        Unfulfilled::compute(&self.ordered, &self.delivered)
    }

    /// Total price of the order.
    #[must_use]
    pub fn sum(&self) -> Cents {
        self.ordered.sum()
    }

    /// Total price of what has been delivered so far, at frozen order prices.
    #[must_use]
    pub fn delivered_sum(&self) -> Cents {
        self.delivered
            .iter()
            .filter_map(|item| item.key().ok())
            .filter_map(|key| self.ordered.item_price(&key))
            .sum()
    }

    /// Whether the customer may still change the tax country.
    #[must_use]
    pub const fn country_editable(&self) -> bool {
        self.status.is_unpaid()
    }
}

/// Input for creating a purchase. ID and keys are assigned on insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPurchase {
    pub ordered: Order,
    pub country_code: CountryId,
    pub notify: Option<Notify>,
    pub create_date: NaiveDate,
    pub delete_date: NaiveDate,
}

impl NewPurchase {
    /// A fresh `new` purchase created on `today`.
    ///
    /// # Errors
    ///
    /// - `OrderError::Empty` for an empty order.
    /// - `OrderError::InvalidTaxCountry` if the country is neither an ISO code
    ///   nor `non-EU`.
    pub fn new(
        ordered: Order,
        country_code: CountryId,
        notify: Option<Notify>,
        today: NaiveDate,
    ) -> Result<Self, OrderError> {
        if ordered.is_empty() {
            return Err(OrderError::Empty);
        }
        if !country_code.is_valid_tax_country() {
            return Err(OrderError::InvalidTaxCountry(country_code));
        }
        Ok(Self {
            ordered,
            country_code,
            notify,
            create_date: today,
            delete_date: delete_date_after(today),
        })
    }

    /// The purchase as it will be stored under the given ID and keys.
    #[must_use]
    pub fn into_purchase(
        self,
        id: PurchaseId,
        access_key: AccessKey,
        payment_key: PaymentKey,
    ) -> Purchase {
        Purchase {
            id,
            access_key,
            payment_key,
            status: PurchaseStatus::New,
            ordered: self.ordered,
            delivered: Delivery::default(),
            country_code: self.country_code,
            notify: self.notify,
            create_date: self.create_date,
            delete_date: Some(self.delete_date),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::order::OrderRow;
    use crate::types::VariantId;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 1).unwrap()
    }

    fn order() -> Order {
        Order(vec![OrderRow {
            variant_id: VariantId::new("gift-10"),
            country_id: CountryId::all(),
            quantity: 3,
            item_price: Cents::new(1000),
        }])
    }

    #[test]
    fn test_new_purchase_dates() {
        let new = NewPurchase::new(order(), CountryId::new("DE"), None, today()).unwrap();
        assert_eq!(new.create_date, today());
        assert_eq!(
            new.delete_date,
            NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
        );

        let purchase = new.into_purchase(
            PurchaseId::new("ABC123"),
            AccessKey::new("a"),
            PaymentKey::new("p"),
        );
        assert_eq!(purchase.status, PurchaseStatus::New);
        assert!(purchase.delivered.is_empty());
        assert_eq!(purchase.sum(), Cents::new(3000));
        assert_eq!(purchase.delivered_sum(), Cents::ZERO);
    }

    #[test]
    fn test_new_purchase_validation() {
        assert_eq!(
            NewPurchase::new(Order::default(), CountryId::new("DE"), None, today()),
            Err(OrderError::Empty)
        );
        assert_eq!(
            NewPurchase::new(order(), CountryId::new("Germany"), None, today()),
            Err(OrderError::InvalidTaxCountry(CountryId::new("Germany")))
        );
    }
}
