// ABOUTME: Price resolution for products and order lines
// ABOUTME: Combines base price, sale price and selected option modifiers
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Async-IO.org

//! # Price Resolver
//!
//! Pure price computation over in-memory models. The effective price is the
//! sale price when set, else the list price. An order line adds the chosen
//! option contributions on top: choice options add the selected value's
//! modifier, number options add `price_per_unit x quantity` within their
//! bounds. Required options must be selected.

use crate::database::product_options::{OptionType, ProductOption};
use crate::database::products::Product;
use crate::errors::{AppError, AppResult};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One chosen option on an order line
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    /// The option being configured
    pub option_id: Uuid,
    /// Chosen value for radio/dropdown/checkbox options
    #[serde(default)]
    pub value_id: Option<Uuid>,
    /// Chosen quantity for number options
    #[serde(default)]
    pub quantity: Option<i64>,
}

/// The price actually charged absent option modifiers: sale price when set,
/// else list price
#[must_use]
pub fn effective_price(product: &Product) -> Decimal {
    product.final_price()
}

/// Compute the order-time price of one unit of a product with the given
/// option selections.
///
/// `options` must be the product's live options with live values - exactly
/// what the read path returns. Number options carry no values, so their
/// contribution comes from `price_per_unit` alone.
///
/// # Errors
///
/// Returns `SelectionRejected` when a selection references an unknown option
/// or value, a number quantity is missing or violates the option's bounds,
/// or a required option has no matching selection.
pub fn line_item_price(
    product: &Product,
    options: &[ProductOption],
    selections: &[Selection],
) -> AppResult<Decimal> {
    let mut total = effective_price(product);

    for selection in selections {
        let option = options
            .iter()
            .find(|option| option.id == selection.option_id)
            .ok_or_else(|| {
                AppError::rejected_selection(format!(
                    "Selection references unknown option {}",
                    selection.option_id
                ))
            })?;

        total += match option.option_type {
            OptionType::Radio | OptionType::Dropdown | OptionType::Checkbox => {
                choice_contribution(option, selection)?
            }
            OptionType::Number => number_contribution(option, selection)?,
        };
    }

    for option in options {
        if option.is_required
            && !selections
                .iter()
                .any(|selection| selection.option_id == option.id)
        {
            return Err(AppError::rejected_selection(format!(
                "Required option '{}' has no selection",
                option.name
            )));
        }
    }

    Ok(total)
}

/// Modifier of the selected value for a choice option
fn choice_contribution(option: &ProductOption, selection: &Selection) -> AppResult<Decimal> {
    let value_id = selection.value_id.ok_or_else(|| {
        AppError::rejected_selection(format!(
            "Option '{}' requires a value selection",
            option.name
        ))
    })?;

    let value = option
        .values
        .iter()
        .find(|value| value.id == value_id)
        .ok_or_else(|| {
            AppError::rejected_selection(format!(
                "Value {value_id} does not belong to option '{}'",
                option.name
            ))
        })?;

    Ok(value.price_modifier)
}

/// `price_per_unit x quantity` within the option's bounds
fn number_contribution(option: &ProductOption, selection: &Selection) -> AppResult<Decimal> {
    let quantity = selection.quantity.ok_or_else(|| {
        AppError::rejected_selection(format!("Option '{}' requires a quantity", option.name))
    })?;

    if option.min_value.is_some_and(|min| quantity < min)
        || option.max_value.is_some_and(|max| quantity > max)
    {
        return Err(AppError::rejected_selection(format!(
            "Quantity {quantity} is outside the bounds of option '{}'",
            option.name
        )));
    }

    let per_unit = option.price_per_unit.unwrap_or(Decimal::ZERO);
    Ok(per_unit * Decimal::from(quantity))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::database::product_options::OptionValue;
    use crate::database::products::ProductStatus;
    use chrono::Utc;

    fn product(price: Decimal, sale_price: Option<Decimal>) -> Product {
        Product {
            id: Uuid::new_v4(),
            category_id: Uuid::new_v4(),
            name: "Amigurumi Bear".into(),
            slug: "amigurumi-bear".into(),
            description: None,
            price,
            sale_price,
            stock: 5,
            sku: None,
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn number_option(per_unit: Decimal, min: i64, max: i64, required: bool) -> ProductOption {
        ProductOption {
            id: Uuid::new_v4(),
            product_id: Uuid::new_v4(),
            name: "Flower Count".into(),
            option_type: OptionType::Number,
            is_required: required,
            min_value: Some(min),
            max_value: Some(max),
            price_per_unit: Some(per_unit),
            values: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    fn choice_option(modifiers: &[Decimal]) -> ProductOption {
        let option_id = Uuid::new_v4();
        ProductOption {
            id: option_id,
            product_id: Uuid::new_v4(),
            name: "Size".into(),
            option_type: OptionType::Radio,
            is_required: false,
            min_value: None,
            max_value: None,
            price_per_unit: None,
            values: modifiers
                .iter()
                .map(|modifier| OptionValue {
                    id: Uuid::new_v4(),
                    product_option_id: option_id,
                    label: "Choice".into(),
                    value: "choice".into(),
                    price_modifier: *modifier,
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                    deleted_at: None,
                })
                .collect(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        }
    }

    #[test]
    fn test_effective_price_prefers_sale_price() {
        let p = product(Decimal::from(100), Some(Decimal::from(80)));
        assert_eq!(effective_price(&p), Decimal::from(80));

        let p = product(Decimal::from(100), None);
        assert_eq!(effective_price(&p), Decimal::from(100));
    }

    #[test]
    fn test_number_option_price() {
        let p = product(Decimal::from(50), None);
        let option = number_option(Decimal::from(5), 1, 10, false);
        let selections = vec![Selection {
            option_id: option.id,
            value_id: None,
            quantity: Some(3),
        }];

        let total = line_item_price(&p, &[option], &selections).unwrap();
        assert_eq!(total, Decimal::from(65));
    }

    #[test]
    fn test_number_option_rejects_out_of_bounds_quantity() {
        let p = product(Decimal::from(50), None);
        let option = number_option(Decimal::from(5), 1, 10, false);
        let selections = vec![Selection {
            option_id: option.id,
            value_id: None,
            quantity: Some(15),
        }];

        let err = line_item_price(&p, &[option], &selections).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::SelectionRejected);
    }

    #[test]
    fn test_choice_option_adds_modifier() {
        let p = product(Decimal::from(30), None);
        let option = choice_option(&[Decimal::from(2), Decimal::from(7)]);
        let value_id = option.values[1].id;
        let selections = vec![Selection {
            option_id: option.id,
            value_id: Some(value_id),
            quantity: None,
        }];

        let total = line_item_price(&p, &[option], &selections).unwrap();
        assert_eq!(total, Decimal::from(37));
    }

    #[test]
    fn test_required_option_must_be_selected() {
        let p = product(Decimal::from(50), None);
        let option = number_option(Decimal::from(5), 1, 10, true);

        let err = line_item_price(&p, &[option], &[]).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::SelectionRejected);
    }

    #[test]
    fn test_foreign_value_is_rejected() {
        let p = product(Decimal::from(30), None);
        let option = choice_option(&[Decimal::from(2)]);
        let selections = vec![Selection {
            option_id: option.id,
            value_id: Some(Uuid::new_v4()),
            quantity: None,
        }];

        let err = line_item_price(&p, &[option], &selections).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::SelectionRejected);
    }

    #[test]
    fn test_unknown_option_is_rejected() {
        let p = product(Decimal::from(30), None);
        let selections = vec![Selection {
            option_id: Uuid::new_v4(),
            value_id: None,
            quantity: Some(1),
        }];

        let err = line_item_price(&p, &[], &selections).unwrap_err();
        assert_eq!(err.code, crate::errors::ErrorCode::SelectionRejected);
    }

    #[test]
    fn test_checkbox_allows_multiple_selections() {
        let p = product(Decimal::from(10), None);
        let mut option = choice_option(&[Decimal::from(1), Decimal::from(2)]);
        option.option_type = OptionType::Checkbox;
        let selections = vec![
            Selection {
                option_id: option.id,
                value_id: Some(option.values[0].id),
                quantity: None,
            },
            Selection {
                option_id: option.id,
                value_id: Some(option.values[1].id),
                quantity: None,
            },
        ];

        let total = line_item_price(&p, &[option], &selections).unwrap();
        assert_eq!(total, Decimal::from(13));
    }
}
